//! Error types for FAT32 volume parsing.
//!
//! These are the structural failures that abort opening or reading a volume.
//! Per-entry problems met while walking directories are not errors: they are
//! reported as [`Diagnostic`](super::diagnostic::Diagnostic)s and the walk goes on.

use std::io;
use thiserror::Error;

/// Errors that can occur while parsing a FAT32 volume.
#[derive(Error, Debug)]
pub enum FATError {
    /// The boot sector does not end with the 0x55AA signature within the scanned window.
    #[error("Malformed boot sector: {0}")]
    MalformedBootSector(String),

    /// The FS information sector does not carry its lead or trail signature.
    #[error("Invalid FS information sector signature: {0}")]
    InvalidFsInfoSignature(String),

    /// One of the two reserved FAT entries holds an unexpected value.
    #[error("Corrupt FAT header: entry {entry} holds 0x{value:08X}")]
    CorruptFatHeader { entry: u8, value: u32 },

    /// A cluster-chain stream was read after its last cluster.
    #[error("Cluster chain exhausted")]
    ChainExhausted,

    /// The operation is not offered by this reader.
    #[error("Unsupported operation: `{0}`")]
    UnsupportedOperation(&'static str),

    /// The first three bytes of a FAT volume must contain a valid x86 jump instruction.
    #[error("Invalid jump instruction `{0}`")]
    InvalidJmp(String),

    /// Bytes per sector must be 512, 1024, 2048 or 4096.
    #[error("Invalid count of bytes per sector: `{0}`. Legal values: 512, 1024, 2048 or 4096")]
    InvalidBytesPerSec(u16),

    /// Sectors per cluster must be a power of 2: 1, 2, 4, 8, 16, 32, 64, or 128.
    #[error(
        "Invalid number of sector per cluster: `{0}`. Legal values: 1, 2, 4, 8, 16, 32, 64, 128"
    )]
    InvalidSecPerClus(u8),

    /// Total cluster size (bytes per sector × sectors per cluster) must not exceed 32 KiB.
    #[error("Invalid cluster size: `{0}`. Any value greater than 32K is invalid.")]
    InvalidClusSz(u32),

    /// The count of reserved sectors must be greater than 0.
    #[error("Invalid count of reserved sectors: `{0}`. Any value greater than 0 is valid.")]
    InvalidRsvdSecCnt(u16),

    /// The number of File Allocation Tables must be greater than 0.
    #[error("Invalid number of FATs on this volume: `{0}`.")]
    InvalidNumFat(u8),

    /// For FAT32 volumes, the root directory is a regular cluster chain.
    #[error(
        "Invalid count of directory entries in the root directory: `{0}`. It should be 0 for a FAT32 volume."
    )]
    InvalidRootEntCnt(u16),

    /// The total sector count must be valid for the volume size.
    #[error("Invalid total count of sectors on the volume: `{0}`")]
    InvalidTotSec(String),

    /// The FAT size in sectors must be valid and consistent with the volume layout.
    #[error("Invalid FAT size: `{0}`")]
    InvalidFatSz(String),

    /// Clusters 0 and 1 are reserved, the data area starts at cluster 2.
    #[error(
        "Invalid cluster number of the first cluster of the root directory: `{0}`. This value should be at least 2."
    )]
    InvalidRootClus(u32),

    /// Only FAT32 is supported.
    #[error("Unsupported FAT type: `{0}`")]
    UnsupportedFATType(String),

    /// Underlying I/O errors.
    #[error("IO Error: `{0}`")]
    IOError(io::Error),

    /// Parsing error occured during structure initialization
    #[error("BinRead Error: `{0}`")]
    BinReadError(binread::Error),
}

/// Converts standard I/O errors into FATError.
impl From<io::Error> for FATError {
    fn from(err: io::Error) -> Self {
        FATError::IOError(err)
    }
}

/// Converts BinRead errors into FATError.
impl From<binread::Error> for FATError {
    fn from(err: binread::Error) -> Self {
        FATError::BinReadError(err)
    }
}
