//! Error types for disk and partition operations.
//!
//! This module provides error handling for disk-level operations: I/O errors,
//! partition table validation and boot signature verification.

use std::io;
use thiserror;

use crate::filesystem::fat_error::FATError;

/// Represents errors that can occur while reading a partitioned disk.
#[derive(thiserror::Error, Debug)]
pub enum DiskError {
    /// Wraps an I/O error that occurred during disk operations.
    #[error("I/O error: {0}")]
    Io(io::Error),
    /// Indicates that the partition table entries are not in ascending order by starting sector.
    #[error("Partition table is not sorted")]
    PartitionTableNotSorted,
    /// Indicates that two or more partitions have overlapping sectors.
    #[error("Some partitions are overlapping")]
    OverlappingPartitions,
    /// Indicates that the boot signature is not valid.
    /// Contains the invalid signature value that was found.
    #[error("Invalid signature: 0x{0:04X}")]
    InvalidSignature(u16),
    /// Sectors must be a power of two of at least 512 bytes.
    #[error("Invalid sector size: {0} bytes")]
    InvalidSectorSize(usize),
    /// No partition table entry has this index.
    #[error("No partition #{0}")]
    NoSuchPartition(usize),
    /// The partition holds no readable FAT32 volume.
    #[error("Partition #{index} is not a readable FAT32 volume")]
    NotFat32 { index: usize },
    /// A FAT32 volume failed while being read.
    #[error("Volume error: {0}")]
    Volume(#[from] FATError),
}

/// Converts standard I/O errors into DiskError.
impl From<io::Error> for DiskError {
    fn from(err: io::Error) -> Self {
        DiskError::Io(err)
    }
}
