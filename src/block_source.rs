//! Block sources.
//!
//! Everything that reads a volume takes any `Read + Seek` value: a `File` over a
//! raw image, a `Cursor` in tests, or a [`SectorAlignedReader`] in front of a
//! device that only accepts whole, aligned sectors.

use std::io::{self, Read, Seek, SeekFrom};

use log::trace;

/// Number of sectors fetched from the inner reader at once.
pub const DEFAULT_SECTORS_PER_FILL: usize = 8;

/// Buffers reads so that the inner reader is only ever asked for sector-aligned
/// runs of whole sectors, whatever the offset and length requested by the caller.
#[derive(Debug)]
pub struct SectorAlignedReader<R> {
    inner: R,
    sector_size: usize,
    fill_size: usize,
    buffer: Vec<u8>,
    /// Offset on the inner reader of `buffer[0]`, always a multiple of the sector size
    buffer_start: u64,
    pos: u64,
}

impl<R: Read + Seek> SectorAlignedReader<R> {
    pub fn new(inner: R, sector_size: usize) -> Self {
        Self::with_capacity(inner, sector_size, DEFAULT_SECTORS_PER_FILL)
    }

    /// Creates a reader fetching `sectors_per_fill` sectors per inner read.
    pub fn with_capacity(inner: R, sector_size: usize, sectors_per_fill: usize) -> Self {
        let sector_size = sector_size.max(1);
        Self {
            inner,
            sector_size,
            fill_size: sector_size * sectors_per_fill.max(1),
            buffer: vec![],
            buffer_start: 0,
            pos: 0,
        }
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn buffered(&self) -> bool {
        self.pos >= self.buffer_start && self.pos < self.buffer_start + self.buffer.len() as u64
    }

    /// Loads the aligned run of sectors holding the current position.
    fn fill(&mut self) -> io::Result<()> {
        let sector_size = self.sector_size as u64;
        let aligned = self.pos / sector_size * sector_size;
        trace!("Filling {} bytes at {aligned}", self.fill_size);

        self.inner.seek(SeekFrom::Start(aligned))?;
        self.buffer.resize(self.fill_size, 0);
        let mut filled = 0;
        while filled < self.fill_size {
            match self.inner.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buffer.clear();
                    return Err(err);
                }
            }
        }
        self.buffer.truncate(filled);
        self.buffer_start = aligned;
        Ok(())
    }
}

impl<R: Read + Seek> Read for SectorAlignedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.buffered() {
            self.fill()?;
            if !self.buffered() {
                // End of the medium
                return Ok(0);
            }
        }

        let offset = (self.pos - self.buffer_start) as usize;
        let n = buf.len().min(self.buffer.len() - offset);
        buf[..n].copy_from_slice(&self.buffer[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for SectorAlignedReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let len = self.inner.seek(SeekFrom::End(0))?;
                len.checked_add_signed(delta)
            }
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            )),
        }
    }
}
