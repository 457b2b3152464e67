//! FAT variant detection.
//!
//! The variant of a FAT volume is determined by its count of data clusters only,
//! never by the filesystem type string of the boot sector.

use std::fmt;

/// The different types of FAT filesystems. Only FAT32 volumes are walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FATType {
    FAT12,
    FAT16,
    FAT32,
}

impl FATType {
    /// Classifies a volume from its count of data clusters.
    pub fn from_cluster_count(clus_cnt: u32) -> Self {
        if clus_cnt < 4085 {
            FATType::FAT12
        } else if clus_cnt < 65525 {
            FATType::FAT16
        } else {
            FATType::FAT32
        }
    }
}

impl fmt::Display for FATType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FATType::FAT12 => "FAT12",
            FATType::FAT16 => "FAT16",
            FATType::FAT32 => "FAT32",
        };
        write!(f, "{s}")
    }
}
