use thiserror::Error;

#[derive(Debug, Error)]
pub enum CfbError {
    #[error("i/o error: {0}")]
    StdIo(#[from] std::io::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(HeaderErrorType),
    #[error("unexpected end of data: {0}")]
    UnexpectedEof(String),
    #[error("invalid directory entry field `{0}`: {1}")]
    InvalidDirectoryEntry(&'static str, String),
    #[error("invalid utf-16 in directory entry name: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),
    #[error("directory entry not found")]
    DirectoryEntryNotFound,
    #[error("directory entry is not a stream object")]
    NotAStream,
    #[error("corrupt sector chain: {0}")]
    CorruptSectorChain(String),
    #[error("corrupt directory tree: cycle involving stream id {0}")]
    CorruptDirectoryTree(u32),
    #[error("seek out of bounds: target {0}, stream size {1}")]
    SeekOutOfBounds(i64, u64),
}

#[derive(Debug, Error)]
pub enum HeaderErrorType {
    #[error("expected {0} bytes, read {1}")]
    NotEnoughBytes(usize, usize),
    #[error("failed parsing field `{0}`: {1}")]
    Parsing(&'static str, String),
    #[error("wrong magic bytes: {0:x?}")]
    WrongMagicBytes(Vec<u8>),
}
