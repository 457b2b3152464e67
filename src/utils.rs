//! Small helpers for reading raw bytes out of a disk image.

use std::io::{self, Read, Seek, SeekFrom};

/// Reads a specific sector from a block source into a buffer.
///
/// # Arguments
///
/// - `source`: The readable and seekable medium.
/// - `sector`: The sector number to read, counted from the start of the medium.
/// - `sector_size`: The size in bytes of a sector.
/// - `buffer`: A mutable reference to a vector where the sector data will be stored.
///
/// The buffer will be resized to match the sector size.
///
/// # Errors
///
/// Returns an `io::Error` if the sector cannot be read.
pub fn read_sector<T: Read + Seek>(
    source: &mut T,
    sector: u64,
    sector_size: usize,
    buffer: &mut Vec<u8>,
) -> io::Result<()> {
    buffer.resize(sector_size, 0);

    source.seek(SeekFrom::Start(sector_size as u64 * sector))?;

    source.read_exact(buffer).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Failed to read sector {sector}: {err}"),
        )
    })
}

/// Reads up to `len` bytes from the current position of `source`.
///
/// Fewer bytes are returned only when the medium ends first. `len` often comes
/// from on-disk fields, so the buffer grows with what is actually read.
pub fn read_up_to<T: Read>(source: &mut T, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Extracts a 32-bit unsigned integer from a buffer at a given offset.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u32_at(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(
        buffer[offset..offset + 4]
            .try_into()
            .expect("invalid slice"),
    )
}

/// Extracts a 16-bit unsigned integer from a buffer at a given offset.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u16_at(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(
        buffer[offset..offset + 2]
            .try_into()
            .expect("invalid slice"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_requested_sector() {
        let mut data = vec![0u8; 1024];
        data[512..].fill(0xAB);
        let mut cursor = Cursor::new(data);

        let mut buf = vec![];
        read_sector(&mut cursor, 1, 512, &mut buf).unwrap();
        assert_eq!(buf.len(), 512);
        assert!(buf.iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn reading_past_the_end_fails() {
        let mut cursor = Cursor::new(vec![0u8; 512]);
        let mut buf = vec![];
        assert!(read_sector(&mut cursor, 1, 512, &mut buf).is_err());
    }

    #[test]
    fn short_read_at_end_of_medium() {
        let mut cursor = Cursor::new(vec![7u8; 10]);
        cursor.set_position(6);
        assert_eq!(read_up_to(&mut cursor, 32).unwrap(), vec![7u8; 4]);
    }

    #[test]
    fn huge_request_on_a_short_medium() {
        let mut cursor = Cursor::new(vec![1u8; 64]);
        assert_eq!(read_up_to(&mut cursor, usize::MAX).unwrap().len(), 64);
    }

    #[test]
    fn decodes_little_endian_fields() {
        let buf = [0x78, 0x56, 0x34, 0x12];
        assert_eq!(u32_at(&buf, 0), 0x12345678);
        assert_eq!(u16_at(&buf, 2), 0x1234);
    }
}
