//! Partitioned disks: the MBR partition table and the volumes it points to.

pub mod disk;
pub mod disk_error;
pub mod mbr;
