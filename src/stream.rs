use std::io::SeekFrom;

use derivative::Derivative;

use crate::constants;
use crate::error::CfbError;
use crate::{CfbFile, DirectoryEntry};

/// Seek/read access to one logical stream whose bytes are scattered across
/// possibly non-contiguous sectors. Whether those are regular sectors or
/// mini-sectors was decided when the stream was opened, and reads consult
/// the parsed file's in-memory sector tables, so any number of readers can
/// be open over the same [`CfbFile`] at once.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct StreamReader<'a> {
    #[derivative(Debug = "ignore")]
    file: &'a CfbFile,
    path: String,
    entry_index: usize,
    sector_chain: Vec<u32>,
    sector_size: usize,
    mini: bool,
    position: u64,
}

impl<'a> StreamReader<'a> {
    pub(crate) fn new(
        file: &'a CfbFile,
        path: String,
        entry_index: usize,
        sector_chain: Vec<u32>,
        mini: bool,
    ) -> Self {
        let sector_size = if mini {
            constants::MINI_SECTOR_SIZE
        } else {
            file.header().sector_size() as usize
        };
        Self {
            file,
            path,
            entry_index,
            sector_chain,
            sector_size,
            mini,
            position: 0,
        }
    }

    /// The stream's declared size in bytes. Reads never return data past it,
    /// whatever the chain's last sector has in its slack.
    pub fn size(&self) -> u64 {
        self.directory_entry().stream_size()
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn path_name(&self) -> &str {
        &self.path
    }

    pub fn directory_entry(&self) -> &DirectoryEntry {
        &self.file.directory_entries[self.entry_index]
    }

    pub fn sector_chain(&self) -> &[u32] {
        &self.sector_chain
    }

    /// The sector size reads are striped over: 64 for mini-stream-backed
    /// streams, the container's regular sector size otherwise.
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn is_mini(&self) -> bool {
        self.mini
    }

    /// Moves the cursor. End-relative targets resolve to `size + offset`,
    /// and any target outside `[0, size]` fails with
    /// [`CfbError::SeekOutOfBounds`], leaving the cursor where it was.
    pub fn seek(&mut self, position: SeekFrom) -> Result<u64, CfbError> {
        let target = match position {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(offset) => self.position as i128 + offset as i128,
            SeekFrom::End(offset) => self.size() as i128 + offset as i128,
        };
        if target < 0 || target > self.size() as i128 {
            return Err(CfbError::SeekOutOfBounds(target as i64, self.size()));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    /// Reads up to `count` bytes from the cursor, advancing it. Short reads
    /// are not an error: fewer bytes come back when the stream ends first,
    /// and a cursor at the end yields an empty result.
    pub fn read(&mut self, count: usize) -> Vec<u8> {
        let available = self.size().saturating_sub(self.position);
        let want = (count as u64).min(available) as usize;

        let mut data = Vec::with_capacity(want);
        while data.len() < want {
            let chain_index = (self.position / self.sector_size as u64) as usize;
            let intra_sector = (self.position % self.sector_size as u64) as usize;
            let sector = match self.sector_chain.get(chain_index) {
                Some(sector) => *sector as usize,
                None => break,
            };
            let sector_data: &[u8] = if self.mini {
                match self.file.mini_stream.get(sector) {
                    Some(mini_sector) => mini_sector,
                    None => break,
                }
            } else {
                match self.file.sectors.get(sector) {
                    Some(sector) => sector,
                    None => break,
                }
            };
            let take = (self.sector_size - intra_sector).min(want - data.len());
            data.extend_from_slice(&sector_data[intra_sector..intra_sector + take]);
            self.position += take as u64;
        }
        data
    }

    pub fn read_to_end(&mut self) -> Vec<u8> {
        let remaining = self.size().saturating_sub(self.position) as usize;
        self.read(remaining)
    }

    pub fn read_u8(&mut self) -> Result<u8, CfbError> {
        Ok(u8::from_le_bytes(self.read_exact_array::<1>()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, CfbError> {
        Ok(u16::from_le_bytes(self.read_exact_array::<2>()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CfbError> {
        Ok(u32::from_le_bytes(self.read_exact_array::<4>()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CfbError> {
        Ok(u64::from_le_bytes(self.read_exact_array::<8>()?))
    }

    /// Reads a raw 16-byte class identifier. Callers wanting the usual
    /// uppercase GUID string can pass the result through
    /// [`crate::format_guid`].
    pub fn read_clsid(&mut self) -> Result<[u8; 16], CfbError> {
        self.read_exact_array::<16>()
    }

    // fixed-width reads treat a short read as an error, unlike `read`
    fn read_exact_array<const N: usize>(&mut self) -> Result<[u8; N], CfbError> {
        let data = self.read(N);
        if data.len() != N {
            return Err(CfbError::UnexpectedEof(format!(
                "wanted {} bytes from stream `{}`, got {}",
                N,
                self.path,
                data.len()
            )));
        }
        data.as_slice().try_into().map_err(|_| {
            CfbError::UnexpectedEof(format!(
                "wanted {} bytes from stream `{}`",
                N, self.path
            ))
        })
    }
}
