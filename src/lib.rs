use std::array::TryFromSliceError;
use std::collections::{HashMap, HashSet};
use std::marker::Unpin;

use chrono::NaiveDateTime;
use derivative::Derivative;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{CfbError, HeaderErrorType};
use crate::stream::StreamReader;

pub mod constants;
pub mod error;
pub mod stream;

pub trait Readable: Unpin + AsyncRead {}

impl Readable for tokio::fs::File {}
impl Readable for &[u8] {}

/// A parsed Compound File Binary container: header, allocation tables,
/// directory entries and the path index over the reachable entries.
///
/// The whole backing file is sliced into sectors once during [`CfbFile::parse`];
/// every stream opened afterwards reads from those in-memory sectors, so open
/// streams never contend for a shared file cursor.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct CfbFile {
    header: CfbHeader,
    #[derivative(Debug = "ignore")]
    pub(crate) sectors: Vec<Vec<u8>>,
    #[derivative(Debug = "ignore")]
    sector_allocation_table: Vec<u32>,
    #[derivative(Debug = "ignore")]
    short_sector_allocation_table: Vec<u32>,
    #[derivative(Debug = "ignore")]
    directory_stream_data: Vec<u8>,
    pub(crate) directory_entries: Vec<DirectoryEntry>,
    #[derivative(Debug = "ignore")]
    pub(crate) mini_stream: Vec<[u8; constants::MINI_SECTOR_SIZE]>,
    entry_paths: Vec<String>,
    #[derivative(Debug = "ignore")]
    path_index: HashMap<String, usize>,
}

impl CfbFile {
    pub fn root(&self) -> &DirectoryEntry {
        &self.directory_entries[0]
    }

    pub fn header(&self) -> &CfbHeader {
        &self.header
    }

    /// Every reachable directory entry path (storages and streams), in
    /// first-visited order of the directory tree walk. Paths are
    /// backslash-joined and root-relative, e.g. `\Storage1\Inner`.
    pub fn list_entries(&self) -> Vec<String> {
        self.entry_paths.clone()
    }

    pub fn list_streams(&self) -> Vec<String> {
        self.list_entries_of_type(ObjectType::Stream)
    }

    pub fn list_storages(&self) -> Vec<String> {
        self.list_entries_of_type(ObjectType::Storage)
    }

    fn list_entries_of_type(&self, object_type: ObjectType) -> Vec<String> {
        self.entry_paths
            .iter()
            .filter(|path| {
                self.path_index
                    .get(*path)
                    .map(|index| self.directory_entries[*index].object_type == object_type)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Looks up a directory entry by path. The leading separator is optional:
    /// `\Storage1\Inner` and `Storage1\Inner` name the same entry.
    pub fn get_entry(&self, path: &str) -> Option<&DirectoryEntry> {
        let index = self.path_index.get(&Self::normalize_path(path))?;
        self.directory_entries.get(*index)
    }

    /// Opens the stream at `path` for seek/read access.
    ///
    /// Fails with [`CfbError::DirectoryEntryNotFound`] if no entry has that
    /// path and [`CfbError::NotAStream`] if the path names a storage.
    pub fn open_stream(&self, path: &str) -> Result<StreamReader<'_>, CfbError> {
        let normalized = Self::normalize_path(path);
        let index = *self
            .path_index
            .get(&normalized)
            .ok_or(CfbError::DirectoryEntryNotFound)?;
        let entry = &self.directory_entries[index];
        if entry.object_type != ObjectType::Stream {
            return Err(CfbError::NotAStream);
        }
        let (sector_chain, mini) = self.resolve_sector_chain(entry)?;
        Ok(StreamReader::new(self, normalized, index, sector_chain, mini))
    }

    fn normalize_path(path: &str) -> String {
        if path.starts_with(constants::PATH_SEPARATOR) {
            path.to_string()
        } else {
            format!("{}{}", constants::PATH_SEPARATOR, path)
        }
    }

    /// Resolves the ordered sector chain backing a stream, choosing the
    /// regular FAT or the mini-FAT by comparing the stream size against the
    /// mini stream cutoff (at or above the cutoff goes to regular sectors).
    /// The declared size is authoritative for termination, so the chain always
    /// holds exactly `ceil(size / sector_size)` entries.
    pub(crate) fn resolve_sector_chain(
        &self,
        entry: &DirectoryEntry,
    ) -> Result<(Vec<u32>, bool), CfbError> {
        // the root storage's own stream (the mini stream container) is always
        // allocated from regular sectors, whatever its size
        let mini = entry.object_type != ObjectType::RootStorage
            && entry.stream_size < self.header.mini_stream_cutoff as u64;
        let (table, table_name, sector_size, storage_len) = if mini {
            (
                &self.short_sector_allocation_table,
                "mini-FAT",
                constants::MINI_SECTOR_SIZE as u64,
                self.mini_stream.len(),
            )
        } else {
            (
                &self.sector_allocation_table,
                "FAT",
                self.header.sector_size as u64,
                self.sectors.len(),
            )
        };

        let mut chain = Vec::new();
        let mut remaining = entry.stream_size;
        if remaining == 0 {
            return Ok((chain, mini));
        }
        let mut sector = entry.starting_sector_location.ok_or_else(|| {
            CfbError::CorruptSectorChain(
                "nonzero stream size without a starting sector".to_string(),
            )
        })?;
        while remaining > 0 {
            if sector as usize >= storage_len {
                return Err(CfbError::CorruptSectorChain(format!(
                    "{} sector {:#x} out of range",
                    table_name, sector
                )));
            }
            chain.push(sector);
            remaining = remaining.saturating_sub(sector_size);
            if remaining > 0 {
                sector = table.get(sector as usize).copied().ok_or_else(|| {
                    CfbError::CorruptSectorChain(format!(
                        "no {} entry for sector {:#x}",
                        table_name, sector
                    ))
                })?;
                if sector > constants::MAX_REGULAR_SECTOR {
                    return Err(CfbError::CorruptSectorChain(format!(
                        "{} chain ended before {} bytes were mapped",
                        table_name, entry.stream_size
                    )));
                }
            }
        }
        Ok((chain, mini))
    }

    pub async fn parse<R>(mut read: R) -> Result<Self, CfbError>
    where
        R: Readable,
    {
        // read the header
        let raw_file_header = parse_raw_header(&mut read).await?;
        let file_header = CfbHeader::from_raw(raw_file_header);
        let sector_size = file_header.sector_size as usize;

        // a version 4 header occupies a full 4096-byte sector; everything
        // past the 512 header bytes must be zero filled
        if sector_size > constants::HEADER_LENGTH {
            let should_read_size = sector_size - constants::HEADER_LENGTH;
            let mut should_read = vec![0u8; should_read_size];
            let did_read_size = read_full(&mut read, &mut should_read).await?;
            if did_read_size != should_read_size {
                return Err(CfbError::InvalidHeader(HeaderErrorType::NotEnoughBytes(
                    should_read_size,
                    did_read_size,
                )));
            } else if should_read != vec![0u8; should_read_size] {
                return Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "header_padding",
                    "all bytes must be zero for larger header sizes".to_string(),
                )));
            }
        }

        let mut sectors = vec![];
        loop {
            let mut buf = vec![0u8; sector_size];
            match read_full(&mut read, &mut buf).await {
                Ok(actually_read_size) if actually_read_size == sector_size => {
                    sectors.push(buf);
                }
                Ok(wrong_size) if wrong_size != 0 => {
                    // the file must be a whole number of sectors
                    return Err(CfbError::UnexpectedEof(format!(
                        "short read when parsing sector number: {}",
                        sectors.len()
                    )));
                }
                Ok(_empty) => {
                    break;
                }
                Err(error) => {
                    return Err(CfbError::StdIo(error));
                }
            }
        }

        let mut self_to_init = CfbFile {
            header: file_header,
            sectors,
            sector_allocation_table: vec![],
            short_sector_allocation_table: vec![],
            directory_stream_data: vec![],
            directory_entries: vec![],
            mini_stream: vec![],
            entry_paths: vec![],
            path_index: HashMap::new(),
        };

        self_to_init.initialize_sector_allocation_table()?;
        self_to_init.initialize_short_sector_allocation_table()?;
        self_to_init.initialize_directory_stream()?;
        self_to_init.initialize_mini_stream()?;
        self_to_init.initialize_path_index()?;
        Ok(self_to_init)
    }

    fn initialize_sector_allocation_table(&mut self) -> Result<(), CfbError> {
        // the first 109 FAT sector locations are listed inline in the header
        for sector_index in self.header.difat_head.iter() {
            if *sector_index > constants::MAX_REGULAR_SECTOR {
                break;
            }
            let Some(fat_sector) = self.sectors.get(*sector_index as usize) else {
                return Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "difat",
                    format!("FAT sector {:#x} out of range", sector_index),
                )));
            };
            let entries = fat_sector
                .chunks_exact(4)
                .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]));
            self.sector_allocation_table.extend(entries);
        }

        // DIFAT sectors carry the remaining FAT sector locations; the last
        // dword of each DIFAT sector points at the next one
        // https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/0afa4e43-b18f-432a-9917-4f276eca7a73
        if self.header.number_of_difat_sectors > 0 {
            let difat_entries_per_sector = self.header.sector_size as usize / 4 - 1;
            let mut next_difat_sector = self.header.first_difat_sector_location;

            for _ in 0..self.header.number_of_difat_sectors {
                if next_difat_sector > constants::MAX_REGULAR_SECTOR {
                    // malformed tail, tolerated: stop following the chain
                    break;
                }
                let Some(difat_sector) = self.sectors.get(next_difat_sector as usize) else {
                    return Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                        "difat",
                        format!("DIFAT sector {:#x} out of range", next_difat_sector),
                    )));
                };
                let difat_block = difat_sector
                    .chunks_exact(4)
                    .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
                    .collect::<Vec<_>>();

                for sector_index in difat_block.iter().take(difat_entries_per_sector) {
                    if *sector_index > constants::MAX_REGULAR_SECTOR {
                        break;
                    }
                    let Some(fat_sector) = self.sectors.get(*sector_index as usize) else {
                        return Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                            "difat",
                            format!("FAT sector {:#x} out of range", sector_index),
                        )));
                    };
                    let entries = fat_sector
                        .chunks_exact(4)
                        .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
                        .collect::<Vec<_>>();
                    self.sector_allocation_table.extend(entries);
                }

                // the trailing entry is the chain pointer, never a FAT location
                next_difat_sector = *difat_block.last().unwrap_or(&constants::CHAIN_END);
            }
        }

        Ok(())
    }

    fn initialize_short_sector_allocation_table(&mut self) -> Result<(), CfbError> {
        if self.header.number_of_mini_fat_sectors == 0
            || self.header.first_mini_fat_sector_location > constants::MAX_REGULAR_SECTOR
        {
            return Ok(()); //no mini stream here
        }

        // mini-FAT sectors are regular sectors, chained through the FAT
        let mut next_index = self.header.first_mini_fat_sector_location;
        let mut short_sector_allocation_table_raw_data: Vec<u8> = vec![];
        let mut hops = 0usize;
        loop {
            if next_index == constants::CHAIN_END {
                break;
            }
            let Some(sector) = self.sectors.get(next_index as usize) else {
                return Err(CfbError::CorruptSectorChain(format!(
                    "mini-FAT sector {:#x} out of range",
                    next_index
                )));
            };
            short_sector_allocation_table_raw_data.extend(sector.iter());
            next_index = self.next_in_fat(next_index)?;
            hops += 1;
            if hops > self.sectors.len() {
                return Err(CfbError::CorruptSectorChain(
                    "mini-FAT chain does not terminate".to_string(),
                ));
            }
        }

        self.short_sector_allocation_table.extend(
            short_sector_allocation_table_raw_data
                .chunks_exact(4)
                .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]])),
        );

        Ok(())
    }

    fn initialize_directory_stream(&mut self) -> Result<(), CfbError> {
        let mut next_directory_index = self.header.first_directory_sector_location;
        let mut hops = 0usize;
        loop {
            if next_directory_index == constants::CHAIN_END {
                break;
            }
            let Some(sector) = self.sectors.get(next_directory_index as usize) else {
                return Err(CfbError::CorruptSectorChain(format!(
                    "directory sector {:#x} out of range",
                    next_directory_index
                )));
            };
            self.directory_stream_data.extend(sector.iter());
            next_directory_index = self.next_in_fat(next_directory_index)?;
            hops += 1;
            if hops > self.sectors.len() {
                return Err(CfbError::CorruptSectorChain(
                    "directory chain does not terminate".to_string(),
                ));
            }
        }

        self.initialize_directory_entries()?;

        Ok(())
    }

    fn initialize_directory_entries(&mut self) -> Result<(), CfbError> {
        if self.directory_stream_data.len() % constants::SIZE_OF_DIRECTORY_ENTRY != 0 {
            return Err(CfbError::InvalidDirectoryEntry(
                "directory_stream_size",
                format!(
                    "size of directory stream data is not correct? {}",
                    self.directory_stream_data.len()
                ),
            ));
        }

        // every 128-byte record is kept, unallocated ones included, so that
        // sibling/child stream IDs index this list directly
        self.directory_entries = Vec::with_capacity(
            self.directory_stream_data.len() / constants::SIZE_OF_DIRECTORY_ENTRY,
        );
        for (index, unparsed_entry) in self
            .directory_stream_data
            .chunks(constants::SIZE_OF_DIRECTORY_ENTRY)
            .enumerate()
        {
            let raw_directory_entry = DirectoryEntryRaw::parse(unparsed_entry)?;
            let directory_entry =
                DirectoryEntry::from_raw(&self.header, raw_directory_entry, index)?;
            self.directory_entries.push(directory_entry);
        }

        if self.directory_entries.is_empty() {
            return Err(CfbError::InvalidDirectoryEntry(
                "root",
                "directory stream holds no entries".to_string(),
            ));
        }

        Ok(())
    }

    fn initialize_mini_stream(&mut self) -> Result<(), CfbError> {
        let (mut next_sector, mini_stream_size) = {
            let root_entry = &self.directory_entries[0];
            match root_entry.starting_sector_location {
                None => return Ok(()), //no mini-stream here
                Some(starting_sector_location) => {
                    (starting_sector_location, root_entry.stream_size)
                }
            }
        };

        let mut raw_mini_stream_data: Vec<u8> = vec![];
        let mut hops = 0usize;
        loop {
            if next_sector == constants::CHAIN_END {
                break;
            }
            let Some(sector) = self.sectors.get(next_sector as usize) else {
                return Err(CfbError::CorruptSectorChain(format!(
                    "mini stream sector {:#x} out of range",
                    next_sector
                )));
            };
            raw_mini_stream_data.extend(sector.iter());
            next_sector = self.next_in_fat(next_sector)?;
            hops += 1;
            if hops > self.sectors.len() {
                return Err(CfbError::CorruptSectorChain(
                    "mini stream chain does not terminate".to_string(),
                ));
            }
        }
        raw_mini_stream_data.truncate(mini_stream_size as usize);

        // the root storage's stream size is validated to be a multiple of 64,
        // so chunks_exact drops nothing here
        for chunk in raw_mini_stream_data.chunks_exact(constants::MINI_SECTOR_SIZE) {
            let mut mini_sector = [0u8; constants::MINI_SECTOR_SIZE];
            mini_sector.copy_from_slice(chunk);
            self.mini_stream.push(mini_sector);
        }

        Ok(())
    }

    /// Flattens the sibling/child binary tree into the backslash-joined path
    /// index, in pre-order: each entry is recorded before its left-sibling
    /// subtree, then the right-sibling subtree, then (for storages) the child
    /// subtree one level down.
    ///
    /// The walk uses an explicit stack and a visited set instead of recursion:
    /// a crafted file with cyclic sibling/child pointers fails with
    /// [`CfbError::CorruptDirectoryTree`] rather than overflowing the call
    /// stack. Out-of-range and unallocated stream IDs silently end their
    /// subtree, which tolerates the slack-space garbage common in old files.
    fn initialize_path_index(&mut self) -> Result<(), CfbError> {
        let root_child = match self.directory_entries.first().and_then(|root| root.child_id) {
            Some(child_id) => child_id,
            None => return Ok(()), // empty container
        };

        let mut visited: HashSet<u32> = HashSet::new();
        let mut pending: Vec<(u32, String)> = vec![(root_child, String::new())];
        while let Some((stream_id, path_prefix)) = pending.pop() {
            let entry = match self.directory_entries.get(stream_id as usize) {
                Some(entry) if !entry.is_empty() => entry,
                _ => continue,
            };
            if !visited.insert(stream_id) {
                return Err(CfbError::CorruptDirectoryTree(stream_id));
            }

            let entry_path = format!(
                "{}{}{}",
                path_prefix,
                constants::PATH_SEPARATOR,
                entry.name
            );

            // pushed in reverse so the left sibling subtree pops first
            if entry.is_directory() {
                if let Some(child_id) = entry.child_id {
                    pending.push((child_id, entry_path.clone()));
                }
            }
            if let Some(right_sibling_id) = entry.right_sibling_id {
                pending.push((right_sibling_id, path_prefix.clone()));
            }
            if let Some(left_sibling_id) = entry.left_sibling_id {
                pending.push((left_sibling_id, path_prefix));
            }

            self.entry_paths.push(entry_path.clone());
            self.path_index
                .entry(entry_path)
                .or_insert(stream_id as usize);
        }

        Ok(())
    }

    fn next_in_fat(&self, sector: u32) -> Result<u32, CfbError> {
        self.sector_allocation_table
            .get(sector as usize)
            .copied()
            .ok_or_else(|| {
                CfbError::CorruptSectorChain(format!("no FAT entry for sector {:#x}", sector))
            })
    }
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct CfbHeader {
    minor_version: u16,
    major_version: u16,
    sector_size: u32,
    mini_sector_size: u16,
    directory_sectors_len: u32,
    mini_stream_cutoff: u32,
    first_directory_sector_location: u32,
    number_of_fat_sectors: u32,
    first_mini_fat_sector_location: u32,
    number_of_mini_fat_sectors: u32,
    first_difat_sector_location: u32,
    number_of_difat_sectors: u32,
    // the first 109 FAT sector locations, inline in the header
    #[derivative(Debug = "ignore")]
    difat_head: Vec<u32>,
}

impl CfbHeader {
    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    /// Sector size in bytes (`1 << sector_shift`): 512 for major version 3,
    /// 4096 for major version 4.
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Streams below this size are allocated from the mini-FAT.
    pub fn mini_stream_cutoff(&self) -> u32 {
        self.mini_stream_cutoff
    }

    fn from_raw(raw_file_header: RawFileHeader) -> Self {
        let minor_version = u16::from_le_bytes(raw_file_header.minor_version);
        let major_version = u16::from_le_bytes(raw_file_header.major_version);
        // the shifts are bit shift amounts, not byte counts
        let sector_size = 1u32 << u16::from_le_bytes(raw_file_header.sector_shift);
        let mini_sector_size = 1u16 << u16::from_le_bytes(raw_file_header.mini_sector_shift);
        let directory_sectors_len = u32::from_le_bytes(raw_file_header.directory_sectors_len);
        let mini_stream_cutoff = u32::from_le_bytes(raw_file_header.mini_stream_cutoff);
        let first_directory_sector_location =
            u32::from_le_bytes(raw_file_header.first_directory_sector_location);
        let number_of_fat_sectors = u32::from_le_bytes(raw_file_header.number_of_fat_sectors);
        let first_mini_fat_sector_location =
            u32::from_le_bytes(raw_file_header.first_mini_fat_sector_location);
        let number_of_mini_fat_sectors =
            u32::from_le_bytes(raw_file_header.number_of_mini_fat_sectors);
        let first_difat_sector_location =
            u32::from_le_bytes(raw_file_header.first_difat_sector_location);
        let number_of_difat_sectors = u32::from_le_bytes(raw_file_header.number_of_difat_sectors);
        let difat_head = raw_file_header.difat_head;

        CfbHeader {
            minor_version,
            major_version,
            sector_size,
            mini_sector_size,
            directory_sectors_len,
            mini_stream_cutoff,
            first_directory_sector_location,
            number_of_fat_sectors,
            first_mini_fat_sector_location,
            number_of_mini_fat_sectors,
            first_difat_sector_location,
            number_of_difat_sectors,
            difat_head,
        }
    }
}

/**
 * https://github.com/libyal/libolecf/blob/main/documentation/OLE%20Compound%20File%20format.asciidoc
 * https://winprotocoldoc.blob.core.windows.net/productionwindowsarchives/MS-CFB/%5bMS-CFB%5d.pdf
 */
#[derive(Clone, Derivative)]
#[derivative(Debug)]
struct RawFileHeader {
    minor_version: [u8; 2],
    /**
    Version number of the file format. MUST be 0x0003 (version 3) or
    0x0004 (version 4).
     */
    major_version: [u8; 2],
    /**
    Sector size of the compound file as a power of 2. MUST be 0x0009 for
    major version 3 (512-byte sectors) and 0x000C for major version 4
    (4096-byte sectors).
     */
    sector_shift: [u8; 2],
    /**
    Sector size of the mini stream as a power of 2. MUST be 0x0006
    (64-byte mini-sectors).
     */
    mini_sector_shift: [u8; 2],
    /**
    Count of directory sectors. Not supported for version 3 compound files,
    where it MUST be zero.
     */
    directory_sectors_len: [u8; 4],
    /**
    Total number of sectors holding the FAT.
     */
    number_of_fat_sectors: [u8; 4],
    /**
    Starting sector of the directory stream (chained through the FAT).
     */
    first_directory_sector_location: [u8; 4],
    /**
    Maximum size of a stream allocated from the mini-FAT; streams of this
    size or larger use regular sectors. MUST be 0x00001000 (4096 bytes).
     */
    mini_stream_cutoff: [u8; 4],
    /**
    Starting sector of the mini-FAT (chained through the regular FAT).
     */
    first_mini_fat_sector_location: [u8; 4],
    number_of_mini_fat_sectors: [u8; 4],
    /**
    Starting sector of the DIFAT chain; ENDOFCHAIN when the 109 inline
    entries suffice.
     */
    first_difat_sector_location: [u8; 4],
    number_of_difat_sectors: [u8; 4],
    /**
    The first 109 FAT sector locations of the compound file.
     */
    #[derivative(Debug = "ignore")]
    difat_head: Vec<u32>,
}

async fn read_full<R>(read: &mut R, buf: &mut [u8]) -> Result<usize, std::io::Error>
where
    R: Readable,
{
    // a single read may legitimately return fewer bytes than asked for;
    // keep going until the buffer is full or the source is exhausted
    let mut total = 0;
    while total < buf.len() {
        let bytes_read = read.read(&mut buf[total..]).await?;
        if bytes_read == 0 {
            break;
        }
        total += bytes_read;
    }
    Ok(total)
}

async fn parse_raw_header<R>(read: &mut R) -> Result<RawFileHeader, CfbError>
where
    R: Readable,
{
    let mut header = [0u8; constants::HEADER_LENGTH];
    let bytes_read = read_full(read, &mut header).await?;
    if bytes_read != constants::HEADER_LENGTH {
        return Err(CfbError::InvalidHeader(HeaderErrorType::NotEnoughBytes(
            constants::HEADER_LENGTH,
            bytes_read,
        )));
    }

    //Identification signature for the compound file structure, and MUST be
    // set to the value 0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1.
    let _: [u8; 8] = (&header[0..8])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing("signature", err.to_string()))
        })
        .and_then(|signature: [u8; 8]| {
            if signature != constants::MAGIC_BYTES {
                Err(CfbError::InvalidHeader(HeaderErrorType::WrongMagicBytes(
                    signature.into(),
                )))
            } else {
                Ok(signature)
            }
        })?;

    //Reserved class ID. The reference documents say all zeroes here, but
    // real-world writers are not consistent, so the field is read and ignored.
    let _clsid: [u8; 16] = (&header[8..24])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "class_identifier",
                err.to_string(),
            ))
        })?;

    let minor_version: [u8; 2] =
        (&header[24..26])
            .try_into()
            .map_err(|err: TryFromSliceError| {
                CfbError::InvalidHeader(HeaderErrorType::Parsing("minor_version", err.to_string()))
            })?;

    //This field MUST be set to either 0x0003 (version 3) or 0x0004 (version 4).
    let major_version: [u8; 2] = (&header[26..28])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing("major_version", err.to_string()))
        })
        .and_then(|major_version: [u8; 2]| match major_version {
            constants::MAJOR_VERSION_3 | constants::MAJOR_VERSION_4 => Ok(major_version),
            _ => Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "major_version",
                format!("incorrect major version {:x?}", major_version),
            ))),
        })?;

    //This field MUST be set to 0xFFFE, a byte order mark specifying
    // little-endian byte order for all integer fields.
    let _: [u8; 2] = (&header[28..30])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "byte_order_identifier",
                err.to_string(),
            ))
        })
        .and_then(
            |byte_order_identifier: [u8; 2]| match byte_order_identifier {
                [0xFE, 0xFF] => Ok(byte_order_identifier),
                _ => Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "byte_order_identifier",
                    format!(
                        "incorrect byte order identifier {:x?}",
                        byte_order_identifier
                    ),
                ))),
            },
        )?;

    //The Sector Shift MUST match the major version: 0x0009 (512-byte
    // sectors) for version 3, 0x000C (4096-byte sectors) for version 4.
    let sector_shift: [u8; 2] = (&header[30..32])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing("sector_shift", err.to_string()))
        })
        .and_then(|sector_shift: [u8; 2]| match major_version {
            constants::MAJOR_VERSION_3 if sector_shift == constants::SECTOR_SHIFT_VERSION_3 => {
                Ok(sector_shift)
            }
            constants::MAJOR_VERSION_4 if sector_shift == constants::SECTOR_SHIFT_VERSION_4 => {
                Ok(sector_shift)
            }
            _ => Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "sector_shift",
                format!(
                    "incorrect sector shift {:x?} for major version {:x?}",
                    sector_shift, major_version
                ),
            ))),
        })?;

    //This field MUST be set to 0x0006: the sector size of the mini stream
    // is always 64 bytes.
    let mini_sector_shift: [u8; 2] = (&header[32..34])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "mini_sector_shift",
                err.to_string(),
            ))
        })
        .and_then(|mini_sector_shift: [u8; 2]| match mini_sector_shift {
            [0x06, 0x00] => Ok(mini_sector_shift),
            _ => Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "mini_sector_shift",
                format!("incorrect mini sector shift {:x?}", mini_sector_shift),
            ))),
        })?;

    let _: [u8; 6] = (&header[34..40])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing("first_reserved", err.to_string()))
        })
        .and_then(|reserved: [u8; 6]| {
            if reserved != [0u8; 6] {
                Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "first_reserved",
                    "non-zero entries in reserved field".to_string(),
                )))
            } else {
                Ok(reserved)
            }
        })?;

    //If Major Version is 3, the Number of Directory Sectors MUST be zero.
    let directory_sectors_len: [u8; 4] = (&header[40..44])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "directory_sectors_len",
                err.to_string(),
            ))
        })
        .and_then(|directory_sectors_len: [u8; 4]| {
            if directory_sectors_len != [0u8; 4] && major_version == constants::MAJOR_VERSION_3 {
                Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "directory_sectors_len",
                    "non-zero number of directory sectors with major version 3".to_string(),
                )))
            } else {
                Ok(directory_sectors_len)
            }
        })?;

    let number_of_fat_sectors: [u8; 4] =
        (&header[44..48])
            .try_into()
            .map_err(|err: TryFromSliceError| {
                CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "number_of_fat_sectors",
                    err.to_string(),
                ))
            })?;
    let first_directory_sector_location: [u8; 4] =
        (&header[48..52])
            .try_into()
            .map_err(|err: TryFromSliceError| {
                CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "first_directory_sector_location",
                    err.to_string(),
                ))
            })?;

    // transaction signature number, unused by a read-only consumer
    let _: [u8; 4] = (&header[52..56])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "transaction_signature_number",
                err.to_string(),
            ))
        })?;

    //This integer field MUST be set to 0x00001000: streams of 4,096 bytes or
    // more are allocated as normal sectors from the FAT, smaller ones from
    // the mini FAT and mini stream.
    let mini_stream_cutoff: [u8; 4] = (&header[56..60])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "mini_stream_cutoff",
                err.to_string(),
            ))
        })
        .and_then(|mini_stream_cutoff: [u8; 4]| {
            if mini_stream_cutoff != constants::CORRECT_MINI_STREAM_CUTOFF {
                Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "mini_stream_cutoff",
                    format!("incorrect mini_stream_cutoff {:x?}", mini_stream_cutoff),
                )))
            } else {
                Ok(mini_stream_cutoff)
            }
        })?;

    let first_mini_fat_sector_location: [u8; 4] = (&header[60..64])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "first_mini_fat_sector_location",
                err.to_string(),
            ))
        })?;
    let number_of_mini_fat_sectors: [u8; 4] =
        (&header[64..68])
            .try_into()
            .map_err(|err: TryFromSliceError| {
                CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "number_of_mini_fat_sectors",
                    err.to_string(),
                ))
            })?;
    let first_difat_sector_location: [u8; 4] = (&header[68..72])
        .try_into()
        .map_err(|err: TryFromSliceError| {
            CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "first_difat_sector_location",
                err.to_string(),
            ))
        })?;
    let number_of_difat_sectors: [u8; 4] =
        (&header[72..76])
            .try_into()
            .map_err(|err: TryFromSliceError| {
                CfbError::InvalidHeader(HeaderErrorType::Parsing(
                    "number_of_difat_sectors",
                    err.to_string(),
                ))
            })?;

    let difat_head = header[76..512]
        .chunks_exact(4)
        .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect::<Vec<_>>();

    Ok(RawFileHeader {
        minor_version,
        major_version,
        sector_shift,
        mini_sector_shift,
        directory_sectors_len,
        number_of_fat_sectors,
        first_directory_sector_location,
        mini_stream_cutoff,
        first_mini_fat_sector_location,
        number_of_mini_fat_sectors,
        first_difat_sector_location,
        number_of_difat_sectors,
        difat_head,
    })
}

/**
Each storage object or stream object within a compound file is represented by
a single 128-byte directory entry. The valid values for a stream ID, used in
the Child ID, Right Sibling ID and Left Sibling ID fields, are 0 through
MAXREGSID (0xFFFFFFFA); the special value NOSTREAM (0xFFFFFFFF) is used as a
terminator.
 */
#[derive(Clone, Derivative)]
#[derivative(Debug)]
struct DirectoryEntryRaw {
    /**
    UTF-16 name of the storage or stream, null terminated: at most 32 code
    units including the terminator.
     */
    name: [u8; 64],
    /**
    Length of the name in bytes, terminating null included.
     */
    name_len: [u8; 2],
    /**
    0x00 unknown/unallocated, 0x01 storage, 0x02 stream, 0x05 root storage.
     */
    object_type: [u8; 1],
    /**
    0x00 (red) or 0x01 (black); red-black balance of the sibling tree, not
    load-bearing for a reader.
     */
    color_flag: [u8; 1],
    left_sibling_id: [u8; 4],
    right_sibling_id: [u8; 4],
    /**
    Stream ID of the first child when this entry is a storage, NOSTREAM
    otherwise.
     */
    child_id: [u8; 4],
    class_id: [u8; 16],
    state_bits: [u8; 4],
    /**
    Windows FILETIME, all zeroes when the time was not recorded.
     */
    creation_time: [u8; 8],
    modification_time: [u8; 8],
    /**
    First sector of the stream. For the root storage object this is the first
    sector of the mini stream, if the mini stream exists.
     */
    starting_sector_location: [u8; 4],
    /**
    Stream size in bytes. For the root storage object, the size of the mini
    stream.
     */
    stream_size: [u8; 8],
}

impl DirectoryEntryRaw {
    pub fn parse(unparsed_entry: &[u8]) -> Result<Self, CfbError> {
        let name: [u8; 64] =
            unparsed_entry[0..64]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("name", err.to_string())
                })?;
        let name_len: [u8; 2] =
            unparsed_entry[64..66]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("name_len", err.to_string())
                })?;
        let object_type: [u8; 1] =
            unparsed_entry[66..67]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("object_type", err.to_string())
                })?;
        let color_flag: [u8; 1] =
            unparsed_entry[67..68]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("color_flag", err.to_string())
                })?;
        let left_sibling_id: [u8; 4] =
            unparsed_entry[68..72]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("left_sibling_id", err.to_string())
                })?;
        let right_sibling_id: [u8; 4] =
            unparsed_entry[72..76]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("right_sibling_id", err.to_string())
                })?;
        let child_id: [u8; 4] =
            unparsed_entry[76..80]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("child_id", err.to_string())
                })?;
        let class_id: [u8; 16] =
            unparsed_entry[80..96]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("class_id", err.to_string())
                })?;
        let state_bits: [u8; 4] =
            unparsed_entry[96..100]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("state_bits", err.to_string())
                })?;
        let creation_time: [u8; 8] =
            unparsed_entry[100..108]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("creation_time", err.to_string())
                })?;
        let modification_time: [u8; 8] =
            unparsed_entry[108..116]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("modification_time", err.to_string())
                })?;
        let starting_sector_location: [u8; 4] =
            unparsed_entry[116..120]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("starting_sector_location", err.to_string())
                })?;
        let stream_size: [u8; 8] =
            unparsed_entry[120..128]
                .try_into()
                .map_err(|err: TryFromSliceError| {
                    CfbError::InvalidDirectoryEntry("stream_size", err.to_string())
                })?;

        Ok(DirectoryEntryRaw {
            name,
            name_len,
            object_type,
            color_flag,
            left_sibling_id,
            right_sibling_id,
            child_id,
            class_id,
            state_bits,
            creation_time,
            modification_time,
            starting_sector_location,
            stream_size,
        })
    }
}

#[derive(Clone, Derivative, Copy, PartialEq)]
#[derivative(Debug)]
pub enum ObjectType {
    /// Unallocated slack in the directory stream, or a residual garbage
    /// entry. Never reachable through the path index.
    Unknown,
    Storage,
    Stream,
    RootStorage,
}

#[derive(Clone, Derivative, Copy, PartialEq)]
#[derivative(Debug)]
pub enum NodeColor {
    RED,
    BLACK,
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct DirectoryEntry {
    //the index in the directory array, which is also the entry's stream ID
    index: usize,
    object_type: ObjectType,
    name: String,
    color: NodeColor,
    left_sibling_id: Option<u32>,
    right_sibling_id: Option<u32>,
    child_id: Option<u32>,

    class_id: Option<String>,

    #[derivative(Debug = "ignore")]
    _state_bits: [u8; 4],

    creation_time: Option<NaiveDateTime>,
    modification_time: Option<NaiveDateTime>,
    starting_sector_location: Option<u32>,
    stream_size: u64,
}

impl DirectoryEntry {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn color(&self) -> NodeColor {
        self.color
    }

    pub fn class_id(&self) -> Option<&str> {
        self.class_id.as_deref()
    }

    pub fn creation_time(&self) -> Option<NaiveDateTime> {
        self.creation_time
    }

    pub fn modification_time(&self) -> Option<NaiveDateTime> {
        self.modification_time
    }

    pub fn starting_sector_location(&self) -> Option<u32> {
        self.starting_sector_location
    }

    pub fn stream_size(&self) -> u64 {
        self.stream_size
    }

    pub fn left_sibling_id(&self) -> Option<u32> {
        self.left_sibling_id
    }

    pub fn right_sibling_id(&self) -> Option<u32> {
        self.right_sibling_id
    }

    pub fn child_id(&self) -> Option<u32> {
        self.child_id
    }

    pub fn is_empty(&self) -> bool {
        self.object_type == ObjectType::Unknown
    }

    pub fn is_directory(&self) -> bool {
        matches!(
            self.object_type,
            ObjectType::Storage | ObjectType::RootStorage
        )
    }

    fn unallocated(index: usize) -> Self {
        Self {
            index,
            object_type: ObjectType::Unknown,
            name: String::new(),
            color: NodeColor::RED,
            left_sibling_id: None,
            right_sibling_id: None,
            child_id: None,
            class_id: None,
            _state_bits: [0u8; 4],
            creation_time: None,
            modification_time: None,
            starting_sector_location: None,
            stream_size: 0,
        }
    }

    fn from_raw(
        file_header: &CfbHeader,
        raw_directory_entry: DirectoryEntryRaw,
        index: usize,
    ) -> Result<Self, CfbError> {
        let object_type = match raw_directory_entry.object_type {
            constants::OBJECT_TYPE_ROOT_STORAGE => ObjectType::RootStorage,
            constants::OBJECT_TYPE_STORAGE => ObjectType::Storage,
            constants::OBJECT_TYPE_STREAM => ObjectType::Stream,
            // unallocated slack and residual garbage both land here; the
            // tree walk treats such entries as absent
            _ => return Ok(Self::unallocated(index)),
        };

        // the length counts bytes and includes the terminating null, so the
        // name proper is the first (length - 2) bytes
        let name_len = u16::from_le_bytes(raw_directory_entry.name_len) as usize;
        let name = if name_len < 2 {
            String::new()
        } else {
            let name_bytes = (name_len - 2).min(raw_directory_entry.name.len());
            let name_units = raw_directory_entry.name[0..name_bytes]
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect::<Vec<_>>();
            String::from_utf16(&name_units)?
        };

        let color = match raw_directory_entry.color_flag {
            constants::NODE_COLOR_RED => Ok(NodeColor::RED),
            constants::NODE_COLOR_BLACK => Ok(NodeColor::BLACK),
            anything_else => Err(CfbError::InvalidDirectoryEntry(
                "node_color",
                format!("invalid value: {:x?}", anything_else),
            )),
        }?;

        let left_sibling_id =
            parse_stream_id(raw_directory_entry.left_sibling_id, "left_sibling_id")?;
        let right_sibling_id =
            parse_stream_id(raw_directory_entry.right_sibling_id, "right_sibling_id")?;
        let child_id = parse_stream_id(raw_directory_entry.child_id, "child_id")?;

        let creation_time = match i64::from_le_bytes(raw_directory_entry.creation_time) {
            0 => None,
            time => epochs::windows_file(time),
        };
        let modification_time = match i64::from_le_bytes(raw_directory_entry.modification_time) {
            0 => None,
            time => epochs::windows_file(time),
        };

        // For a stream this is the first sector of its chain; for the root
        // storage, the first sector of the mini stream. Storage entries have
        // no stream of their own (known writers leave garbage here, so the
        // field is dropped for them), and a sentinel value means the stream
        // has no sectors at all.
        let starting_sector_location = match (
            object_type,
            u32::from_le_bytes(raw_directory_entry.starting_sector_location),
        ) {
            (ObjectType::Storage, _assumed_zero) => None,
            (_, location) if location > constants::MAX_REGULAR_SECTOR => None,
            (_, location) => Some(location),
        };

        let stream_size = if file_header.major_version == constants::MAJOR_VERSION_3_VALUE {
            // a version 3 stream is at most 2 GB and older writers leave
            // garbage in the upper half of this field, so mask it off
            let mut stream_size_modified = raw_directory_entry.stream_size;
            stream_size_modified[4] = 0x00;
            stream_size_modified[5] = 0x00;
            stream_size_modified[6] = 0x00;
            stream_size_modified[7] = 0x00;

            stream_size_modified
        } else {
            raw_directory_entry.stream_size
        };
        let stream_size = u64::from_le_bytes(stream_size);
        if stream_size != 0 && object_type == ObjectType::Storage {
            return Err(CfbError::InvalidDirectoryEntry(
                "stream_size",
                "storage object type has non-zero stream size".to_string(),
            ));
        } else if object_type == ObjectType::RootStorage
            && stream_size % constants::MINI_SECTOR_SIZE as u64 != 0
        {
            return Err(CfbError::InvalidDirectoryEntry(
                "stream_size",
                "root storage object type must have stream size % 64 === 0".to_string(),
            ));
        }

        let class_id = match raw_directory_entry.class_id {
            empty if empty == [0x00; 16] => None,
            bytes => Some(format_guid(bytes)),
        };

        Ok(Self {
            index,
            object_type,
            name,
            color,
            left_sibling_id,
            right_sibling_id,
            child_id,
            class_id,
            _state_bits: raw_directory_entry.state_bits,
            creation_time,
            modification_time,
            starting_sector_location,
            stream_size,
        })
    }
}

fn parse_stream_id(raw: [u8; 4], field: &'static str) -> Result<Option<u32>, CfbError> {
    match raw {
        constants::NO_STREAM => Ok(None),
        potential_value => {
            let potential_value = u32::from_le_bytes(potential_value);
            if potential_value > constants::MAX_REG_STREAM_ID_VALUE {
                Err(CfbError::InvalidDirectoryEntry(
                    field,
                    format!("invalid value: {:x?}", potential_value),
                ))
            } else {
                Ok(Some(potential_value))
            }
        }
    }
}

/// Formats a little-endian 16-byte class identifier as the conventional
/// uppercase GUID string.
pub fn format_guid(bytes: [u8; 16]) -> String {
    let a = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let b = i16::from_le_bytes([bytes[4], bytes[5]]);
    let c = i16::from_le_bytes([bytes[6], bytes[7]]);

    format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        a,
        b,
        c,
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15]
    )
    .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;

    const FREE: u32 = constants::UNALLOCATED_SECTOR;
    const END: u32 = constants::CHAIN_END;
    const NO_SIBLING: u32 = 0xFFFF_FFFF;

    fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
        buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
        buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn directory_entry_bytes(
        name: &str,
        object_type: u8,
        left: u32,
        right: u32,
        child: u32,
        start: u32,
        size: u64,
    ) -> [u8; 128] {
        let mut entry = [0u8; 128];
        let units: Vec<u16> = name.encode_utf16().collect();
        assert!(units.len() < 32);
        for (i, unit) in units.iter().enumerate() {
            put_u16(&mut entry, i * 2, *unit);
        }
        put_u16(&mut entry, 64, ((units.len() + 1) * 2) as u16);
        entry[66] = object_type;
        entry[67] = 0x01; // black
        put_u32(&mut entry, 68, left);
        put_u32(&mut entry, 72, right);
        put_u32(&mut entry, 76, child);
        put_u32(&mut entry, 116, start);
        put_u64(&mut entry, 120, size);
        entry
    }

    fn big_byte(i: usize) -> u8 {
        (i % 251) as u8
    }

    fn inner_byte(i: usize) -> u8 {
        (i * 7 % 256) as u8
    }

    /// A version 3 container, 13 sectors:
    ///   0: FAT, 1-2: directory, 3: mini-FAT, 4: mini stream, 5-12: "Big".
    /// Directory tree: Root -> Storage1 (left sibling "Small", right sibling
    /// "Big", child "Inner"). "Small" (10 bytes) and "Inner" (100 bytes) live
    /// in the mini stream, "Big" (4096 bytes, exactly the cutoff) in regular
    /// sectors.
    fn build_fixture() -> Vec<u8> {
        let sector_size = 512usize;

        let mut header = vec![0u8; sector_size];
        header[0..8].copy_from_slice(&constants::MAGIC_BYTES);
        put_u16(&mut header, 24, 0x003E); // minor version
        put_u16(&mut header, 26, 0x0003); // major version 3
        put_u16(&mut header, 28, 0xFFFE); // byte order mark
        put_u16(&mut header, 30, 9); // sector shift
        put_u16(&mut header, 32, 6); // mini sector shift
        put_u32(&mut header, 44, 1); // one FAT sector
        put_u32(&mut header, 48, 1); // directory chain starts at sector 1
        put_u32(&mut header, 56, 4096); // mini stream cutoff
        put_u32(&mut header, 60, 3); // mini-FAT at sector 3
        put_u32(&mut header, 64, 1); // one mini-FAT sector
        put_u32(&mut header, 68, END); // no DIFAT extension
        put_u32(&mut header, 72, 0);
        put_u32(&mut header, 76, 0); // DIFAT[0]: the FAT lives in sector 0
        for i in 1..109 {
            put_u32(&mut header, 76 + i * 4, FREE);
        }

        let mut fat = vec![FREE; 128];
        fat[0] = constants::FAT_SECTOR;
        fat[1] = 2; // directory: 1 -> 2
        fat[2] = END;
        fat[3] = END; // mini-FAT
        fat[4] = END; // mini stream container
        for s in 5..12 {
            fat[s] = (s + 1) as u32; // "Big": 5 -> 6 -> ... -> 12
        }
        fat[12] = END;
        let mut fat_sector = vec![0u8; sector_size];
        for (i, value) in fat.iter().enumerate() {
            put_u32(&mut fat_sector, i * 4, *value);
        }

        let mut dir = Vec::new();
        dir.extend_from_slice(&directory_entry_bytes(
            "Root Entry",
            5,
            NO_SIBLING,
            NO_SIBLING,
            1,
            4,
            192,
        ));
        dir.extend_from_slice(&directory_entry_bytes("Storage1", 1, 2, 3, 5, 0, 0));
        dir.extend_from_slice(&directory_entry_bytes(
            "Small", 2, NO_SIBLING, NO_SIBLING, NO_SIBLING, 0, 10,
        ));
        dir.extend_from_slice(&directory_entry_bytes(
            "Big", 2, NO_SIBLING, NO_SIBLING, NO_SIBLING, 5, 4096,
        ));
        dir.extend_from_slice(&[0u8; 128]); // unallocated slack
        dir.extend_from_slice(&directory_entry_bytes(
            "Inner", 2, NO_SIBLING, NO_SIBLING, NO_SIBLING, 1, 100,
        ));
        dir.extend_from_slice(&[0u8; 256]);
        assert_eq!(dir.len(), 2 * sector_size);

        let mut mini_fat = vec![FREE; 128];
        mini_fat[0] = END; // "Small": one mini-sector
        mini_fat[1] = 2; // "Inner": 1 -> 2
        mini_fat[2] = END;
        let mut mini_fat_sector = vec![0u8; sector_size];
        for (i, value) in mini_fat.iter().enumerate() {
            put_u32(&mut mini_fat_sector, i * 4, *value);
        }

        let mut mini_stream_sector = vec![0u8; sector_size];
        mini_stream_sector[..10].copy_from_slice(b"HelloWorld");
        for i in 0..100 {
            mini_stream_sector[64 + i] = inner_byte(i);
        }

        let mut file = header;
        file.extend_from_slice(&fat_sector);
        file.extend_from_slice(&dir);
        file.extend_from_slice(&mini_fat_sector);
        file.extend_from_slice(&mini_stream_sector);
        let big: Vec<u8> = (0..4096).map(big_byte).collect();
        file.extend_from_slice(&big);
        assert_eq!(file.len(), 14 * sector_size);
        file
    }

    async fn parse_fixture() -> CfbFile {
        let fixture = build_fixture();
        CfbFile::parse(fixture.as_slice())
            .await
            .expect("fixture should parse")
    }

    #[tokio::test]
    async fn parses_header_fields() {
        let cfb_file = parse_fixture().await;
        let header = cfb_file.header();
        assert_eq!(header.major_version(), 3);
        assert_eq!(header.minor_version(), 0x3E);
        assert_eq!(header.sector_size(), 512);
        assert_eq!(header.mini_stream_cutoff(), 4096);
        assert_eq!(cfb_file.root().object_type(), ObjectType::RootStorage);
        assert_eq!(cfb_file.root().name(), "Root Entry");
    }

    #[tokio::test]
    async fn lists_entries_in_first_visited_order() {
        let cfb_file = parse_fixture().await;
        assert_eq!(
            cfb_file.list_entries(),
            vec!["\\Storage1", "\\Small", "\\Big", "\\Storage1\\Inner"]
        );
        assert_eq!(
            cfb_file.list_streams(),
            vec!["\\Small", "\\Big", "\\Storage1\\Inner"]
        );
        assert_eq!(cfb_file.list_storages(), vec!["\\Storage1"]);
    }

    #[tokio::test]
    async fn reads_known_vector_from_mini_stream() {
        let cfb_file = parse_fixture().await;
        let mut stream = cfb_file.open_stream("\\Small").unwrap();
        assert_eq!(stream.size(), 10);
        assert_eq!(stream.read(10), b"HelloWorld");
        // reads are repeatable given the same cursor position
        stream.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(stream.read(10), b"HelloWorld");
        assert_eq!(stream.tell(), 10);
        assert!(stream.read(1).is_empty());
    }

    #[tokio::test]
    async fn reads_regular_stream_across_sectors() {
        let cfb_file = parse_fixture().await;
        let mut stream = cfb_file.open_stream("\\Big").unwrap();
        assert_eq!(stream.size(), 4096);
        assert_eq!(
            stream.size(),
            cfb_file.get_entry("\\Big").unwrap().stream_size()
        );
        let data = stream.read_to_end();
        assert_eq!(data.len(), 4096);
        for (i, byte) in data.iter().enumerate() {
            assert_eq!(*byte, big_byte(i));
        }
    }

    #[tokio::test]
    async fn mini_stream_spans_mini_sectors() {
        let cfb_file = parse_fixture().await;
        let mut stream = cfb_file.open_stream("\\Storage1\\Inner").unwrap();
        assert_eq!(stream.size(), 100);
        let data = stream.read(100);
        assert_eq!(data.len(), 100);
        for (i, byte) in data.iter().enumerate() {
            assert_eq!(*byte, inner_byte(i));
        }
    }

    #[tokio::test]
    async fn chain_length_is_size_over_sector_size_rounded_up() {
        let cfb_file = parse_fixture().await;

        // 4096 bytes is exactly the cutoff, which goes to regular sectors
        let big = cfb_file.open_stream("\\Big").unwrap();
        assert!(!big.is_mini());
        assert_eq!(big.sector_size(), 512);
        assert_eq!(big.sector_chain().len(), 8);

        let small = cfb_file.open_stream("\\Small").unwrap();
        assert!(small.is_mini());
        assert_eq!(small.sector_size(), 64);
        assert_eq!(small.sector_chain(), &[0]);

        let inner = cfb_file.open_stream("\\Storage1\\Inner").unwrap();
        assert!(inner.is_mini());
        assert_eq!(inner.sector_chain(), &[1, 2]);
    }

    #[tokio::test]
    async fn seeks_are_bounded_by_stream_size() {
        let cfb_file = parse_fixture().await;
        let mut stream = cfb_file.open_stream("\\Small").unwrap();

        // seeking to the very end is allowed and reads return nothing
        assert_eq!(stream.seek(SeekFrom::Start(10)).unwrap(), 10);
        assert!(stream.read(1).is_empty());

        assert!(matches!(
            stream.seek(SeekFrom::Start(11)),
            Err(CfbError::SeekOutOfBounds(11, 10))
        ));
        assert_eq!(stream.seek(SeekFrom::End(0)).unwrap(), 10);
        assert_eq!(stream.seek(SeekFrom::End(-10)).unwrap(), 0);
        assert!(matches!(
            stream.seek(SeekFrom::Current(-1)),
            Err(CfbError::SeekOutOfBounds(-1, 10))
        ));
    }

    #[tokio::test]
    async fn reads_little_endian_primitives() {
        let cfb_file = parse_fixture().await;
        let mut stream = cfb_file.open_stream("\\Big").unwrap();

        // "Big" starts with bytes 0, 1, 2, ...
        assert_eq!(stream.read_u8().unwrap(), 0x00);
        assert_eq!(stream.read_u16().unwrap(), 0x0201);
        assert_eq!(stream.read_u32().unwrap(), 0x06050403);
        assert_eq!(stream.read_u64().unwrap(), 0x0E0D0C0B0A090807);
        assert_eq!(stream.tell(), 15);

        // fixed-width reads fail when fewer bytes remain than the width
        stream.seek(SeekFrom::End(-2)).unwrap();
        assert!(matches!(stream.read_u32(), Err(CfbError::UnexpectedEof(_))));
    }

    #[tokio::test]
    async fn looks_up_entries_by_path() {
        let cfb_file = parse_fixture().await;

        let small = cfb_file.get_entry("\\Small").unwrap();
        assert_eq!(small.object_type(), ObjectType::Stream);
        assert!(!small.is_directory());
        assert_eq!(small.stream_size(), 10);

        // the leading separator is optional
        assert!(cfb_file.get_entry("Storage1").unwrap().is_directory());
        assert!(cfb_file.get_entry("\\Nope").is_none());
    }

    #[tokio::test]
    async fn opening_a_storage_or_missing_path_fails() {
        let cfb_file = parse_fixture().await;
        assert!(matches!(
            cfb_file.open_stream("\\Storage1"),
            Err(CfbError::NotAStream)
        ));
        assert!(matches!(
            cfb_file.open_stream("\\Missing"),
            Err(CfbError::DirectoryEntryNotFound)
        ));
    }

    #[tokio::test]
    async fn rejects_wrong_magic_bytes() {
        let mut fixture = build_fixture();
        fixture[0] = 0x00;
        assert!(matches!(
            CfbFile::parse(fixture.as_slice()).await,
            Err(CfbError::InvalidHeader(HeaderErrorType::WrongMagicBytes(_)))
        ));
    }

    #[tokio::test]
    async fn rejects_unsupported_major_version() {
        let mut fixture = build_fixture();
        put_u16(&mut fixture, 26, 0x0007);
        assert!(matches!(
            CfbFile::parse(fixture.as_slice()).await,
            Err(CfbError::InvalidHeader(HeaderErrorType::Parsing(
                "major_version",
                _
            )))
        ));
    }

    #[tokio::test]
    async fn rejects_truncated_container() {
        let mut fixture = build_fixture();
        fixture.truncate(700);
        assert!(matches!(
            CfbFile::parse(fixture.as_slice()).await,
            Err(CfbError::UnexpectedEof(_))
        ));
    }

    #[tokio::test]
    async fn detects_sibling_cycle_in_directory_tree() {
        let mut fixture = build_fixture();
        // point Storage1's (entry 1, directory stream starts at byte 1024)
        // left sibling back at itself
        put_u32(&mut fixture, 1024 + 128 + 68, 1);
        assert!(matches!(
            CfbFile::parse(fixture.as_slice()).await,
            Err(CfbError::CorruptDirectoryTree(1))
        ));
    }

    #[tokio::test]
    async fn tolerates_out_of_range_sibling_ids() {
        let mut fixture = build_fixture();
        // "Small" (entry 2) gets a left sibling id far past the entry list
        put_u32(&mut fixture, 1024 + 2 * 128 + 68, 42);
        let cfb_file = CfbFile::parse(fixture.as_slice())
            .await
            .expect("dangling sibling ids end the subtree, not the parse");
        assert_eq!(
            cfb_file.list_entries(),
            vec!["\\Storage1", "\\Small", "\\Big", "\\Storage1\\Inner"]
        );
    }
}
