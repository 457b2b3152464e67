//!
//! fat_inspect: A read-only library and CLI for inspecting FAT32 volumes in raw disk images.
//!
//! This crate provides tools for:
//! - Parsing and validating Master Boot Records (MBR)
//! - Decoding the boot sector, FS information sector and FAT of a FAT32 volume
//! - Walking the directory tree, long file names included, into a table of files
//! - Reporting damaged directories as diagnostics instead of failing
//!
//! Nothing is ever written to the inspected medium.
//!
//! # Re-exports
//! - [`Fat32Volume`]: FAT32 volume abstraction
//! - [`open_fat32_volume`]: Opens a volume on any `Read + Seek` block source
//! - [`FileTable`]: Files and directories found on a volume
//! - [`Disk`]: Disk abstraction with partition and volume management
//! - [`Volume`]: Enum for the kinds of partitions found on a disk

pub mod block_source;
pub mod commands;
pub mod filesystem;
pub mod partition;
pub mod traits;
pub mod utils;

/// FAT32 volume abstraction (see [`filesystem::fat::Fat32Volume`]).
pub use crate::filesystem::fat::Fat32Volume;
/// Opens a FAT32 volume (see [`filesystem::fat::open_fat32_volume`]).
pub use crate::filesystem::fat::open_fat32_volume;
/// Files and directories of a volume (see [`filesystem::file_table::FileTable`]).
pub use crate::filesystem::file_table::FileTable;
/// Disk abstraction with partition and volume management (see [`partition::disk::Disk`]).
pub use crate::partition::disk::Disk;
/// Enum for the partitions found on a disk (see [`partition::disk::Volume`]).
pub use crate::partition::disk::Volume;
