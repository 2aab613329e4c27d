/// Format-mandated constants for the Compound File Binary container.
/// https://winprotocoldoc.blob.core.windows.net/productionwindowsarchives/MS-CFB/%5bMS-CFB%5d.pdf
pub const HEADER_LENGTH: usize = 512;

/// Identification signature for the compound file structure. MUST be
/// set to the value 0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1.
pub const MAGIC_BYTES: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub const MAJOR_VERSION_3: [u8; 2] = [0x03, 0x00];
pub const MAJOR_VERSION_4: [u8; 2] = [0x04, 0x00];
pub const MAJOR_VERSION_3_VALUE: u16 = 3;

/// Sector Shift field values: 0x0009 for major version 3 (512-byte sectors),
/// 0x000C for major version 4 (4096-byte sectors).
pub const SECTOR_SHIFT_VERSION_3: [u8; 2] = [0x09, 0x00];
pub const SECTOR_SHIFT_VERSION_4: [u8; 2] = [0x0C, 0x00];

/// Mini Stream Cutoff Size MUST be 0x00001000 (4096 bytes).
pub const CORRECT_MINI_STREAM_CUTOFF: [u8; 4] = [0x00, 0x10, 0x00, 0x00];

// Sector number sentinels. Everything above MAX_REGULAR_SECTOR is reserved.
pub const MAX_REGULAR_SECTOR: u32 = 0xFFFF_FFFA;
pub const DIFAT_SECTOR: u32 = 0xFFFF_FFFC;
pub const FAT_SECTOR: u32 = 0xFFFF_FFFD;
pub const CHAIN_END: u32 = 0xFFFF_FFFE;
pub const UNALLOCATED_SECTOR: u32 = 0xFFFF_FFFF;

// Stream ID sentinels used by the sibling/child fields of directory entries.
pub const MAX_REG_STREAM_ID_VALUE: u32 = 0xFFFF_FFFA;
pub const NO_STREAM: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

pub const SIZE_OF_DIRECTORY_ENTRY: usize = 128;

pub const OBJECT_TYPE_UNKNOWN_OR_UNALLOCATED: [u8; 1] = [0x00];
pub const OBJECT_TYPE_STORAGE: [u8; 1] = [0x01];
pub const OBJECT_TYPE_STREAM: [u8; 1] = [0x02];
pub const OBJECT_TYPE_ROOT_STORAGE: [u8; 1] = [0x05];

pub const NODE_COLOR_RED: [u8; 1] = [0x00];
pub const NODE_COLOR_BLACK: [u8; 1] = [0x01];

/// Mini-sectors are always 64 bytes (Mini Sector Shift MUST be 0x0006).
pub const MINI_SECTOR_SIZE: usize = 64;

/// Separator used in the backslash-joined entry paths, mirroring the OLE
/// storage convention (`\Storage1\Inner`).
pub const PATH_SEPARATOR: char = '\\';
