//! Disk image parsing and analysis.
//!
//! This module provides functionality for:
//! - Opening a raw disk image or device
//! - Reading its MBR partition table
//! - Opening every FAT32 volume found in the table
//! - Displaying the disk layout and the directory tree of its volumes

use getset::Getters;
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::disk_error::DiskError;
use super::mbr::{Mbr, PTEntry, PTType};
use crate::block_source::SectorAlignedReader;
use crate::filesystem::fat::{Fat32Volume, VolumeOptions};
use crate::filesystem::fat_error::FATError;
use crate::filesystem::file_table::FileTable;
use crate::traits::LayoutDisplay;

/// Block source used for every volume of a disk.
pub type DiskSource = SectorAlignedReader<File>;

/// What was found in one partition table entry.
pub enum Volume {
    FAT32 {
        entry: PTEntry,
        volume: Box<Fat32Volume<DiskSource>>,
    },
    /// A FAT32 entry whose volume could not be opened.
    Damaged { entry: PTEntry, error: FATError },
    /// Any other partition type; not interpreted.
    Unsupported { entry: PTEntry },
}

impl Volume {
    pub fn entry(&self) -> &PTEntry {
        match self {
            Volume::FAT32 { entry, .. }
            | Volume::Damaged { entry, .. }
            | Volume::Unsupported { entry } => entry,
        }
    }
}

/// Represents a disk image with its partition table and volumes.
#[derive(Getters)]
pub struct Disk {
    /// The open disk image file path.
    #[get = "pub"]
    file_path: PathBuf,
    /// The partition table found on the disk
    #[get = "pub"]
    part_table: Mbr,
    /// One volume per non-empty partition table entry
    #[get = "pub"]
    volumes: Vec<Volume>,
    /// The size in bytes of a sector
    #[get = "pub"]
    sector_size: usize,
}

impl Disk {
    /// Opens a disk image file and analyzes its structure.
    ///
    /// The image is only ever opened for reading. A FAT32 partition whose volume cannot
    /// be opened is kept as [`Volume::Damaged`] so the other partitions stay usable.
    ///
    /// # Parameters
    /// - `path`: Path to the disk image file or device
    /// - `sector_size`: Size of each sector in bytes
    /// - `options`: How FAT32 volumes are opened and walked
    ///
    /// # Errors
    /// - Returns `DiskError::Io` if the file cannot be opened or read
    /// - Returns a validation variant if the MBR is not usable
    pub fn from_file(
        path: &Path,
        sector_size: usize,
        options: VolumeOptions,
    ) -> Result<Self, DiskError> {
        let mut source = SectorAlignedReader::new(File::open(path)?, sector_size);
        let mbr = Mbr::from_reader(&mut source, sector_size)?;

        let mut volumes = vec![];
        for entry in mbr.pt_entries() {
            let entry = entry.clone();
            if *entry.pt_type() != PTType::Fat32 {
                info!("Partition #{} ({}) is not interpreted", entry.index(), entry.pt_type());
                volumes.push(Volume::Unsupported { entry });
                continue;
            }

            let source = SectorAlignedReader::new(File::open(path)?, sector_size);
            match Fat32Volume::open_with(source, entry.first_byte_address(), options) {
                Ok(volume) => volumes.push(Volume::FAT32 {
                    volume: Box::new(volume.with_partition_sectors(*entry.sector_cnt() as u64)),
                    entry,
                }),
                Err(error) => {
                    warn!("Partition #{} cannot be opened: {error}", entry.index());
                    volumes.push(Volume::Damaged { entry, error });
                }
            }
        }

        Ok(Disk {
            file_path: path.to_path_buf(),
            part_table: mbr,
            volumes,
            sector_size,
        })
    }

    /// Returns the FAT32 volume of the partition table entry numbered `index` (from 1).
    pub fn fat32_volume(&mut self, index: usize) -> Result<&mut Fat32Volume<DiskSource>, DiskError> {
        let volume = self
            .volumes
            .iter_mut()
            .find(|v| *v.entry().index() == index)
            .ok_or(DiskError::NoSuchPartition(index))?;

        match volume {
            Volume::FAT32 { volume, .. } => Ok(volume.as_mut()),
            _ => Err(DiskError::NotFat32 { index }),
        }
    }

    /// Prints a hierarchical layout of the disk structure.
    ///
    /// The layout includes the partition table followed by the layout of every
    /// FAT32 volume.
    pub fn print_layout(&self, indent: u8) -> Result<(), std::fmt::Error> {
        print!("{}", self.part_table.display_layout(indent)?);

        for vol in self.volumes.iter() {
            match vol {
                Volume::FAT32 { volume, .. } => print!("\n{}", volume.display_layout(indent + 3)?),
                Volume::Damaged { entry, error } => {
                    println!("\n{}Partition #{}: {error}", " ".repeat(indent as usize + 3), entry.index())
                }
                Volume::Unsupported { .. } => {}
            }
        }

        Ok(())
    }

    /// Walks the directory tree of every FAT32 volume.
    pub fn read_file_tables(&mut self) -> Vec<(usize, Result<FileTable, FATError>)> {
        self.volumes
            .iter_mut()
            .filter_map(|vol| match vol {
                Volume::FAT32 { entry, volume } => Some((*entry.index(), volume.read_file_table())),
                _ => None,
            })
            .collect()
    }

    /// Prints the directory tree of every FAT32 volume.
    pub fn print_tree(&mut self) -> Result<(), DiskError> {
        for (index, table) in self.read_file_tables() {
            println!("Partition #{index}");
            print!("{}", table?.tree());
        }

        Ok(())
    }
}
