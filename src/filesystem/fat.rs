//! FAT32 volume access.
//!
//! A [`Fat32Volume`] owns its block source and locates the reserved area, the FATs
//! and the data region from the boot sector. It walks the directory tree on demand
//! and can draw the on-disk layout of the volume.

use log::{info, warn};
use std::fmt::Write;
use std::io::{Read, Seek, SeekFrom};

use getset::Getters;

use super::bpb::{Bpb, FsInfo, read_boot_region};
use super::cluster_stream::DataRegion;
use super::diagnostic::{DiagnosticSink, LogSink};
use super::fat_error::FATError;
use super::fat_table::FatTable;
use super::file_table::{FileTable, Traversal};
use crate::traits::LayoutDisplay;

/// Options controlling how a volume is opened and walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeOptions {
    /// Reject boot sectors whose parameters are out of their legal ranges.
    pub validate_bpb: bool,
    /// Also decode the second FAT and warn when it disagrees with the first.
    pub read_second_fat: bool,
    /// Stop the directory walk after this many directories.
    pub max_directories: Option<usize>,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            validate_bpb: true,
            read_second_fat: false,
            max_directories: None,
        }
    }
}

/// An opened FAT32 volume.
///
/// Opening reads the boot sector, the FS information sector and the first FAT. The
/// directory tree is only walked on request, see [`Fat32Volume::read_file_table`].
#[derive(Getters)]
pub struct Fat32Volume<T: Read + Seek> {
    source: T,
    #[get = "pub"]
    bpb: Bpb,
    #[get = "pub"]
    fs_info: FsInfo,
    /// Byte offset of the volume on its block source
    #[get = "pub"]
    preceding_bytes: u64,
    #[get = "pub"]
    fat: FatTable,
    #[get = "pub"]
    second_fat: Option<FatTable>,
    /// Size of the enclosing partition in sectors, when known
    #[get = "pub"]
    partition_sectors: Option<u64>,
    options: VolumeOptions,
}

impl<T: Read + Seek> Fat32Volume<T> {
    /// Opens the volume starting `preceding_bytes` into `source` with default options.
    pub fn open(source: T, preceding_bytes: u64) -> Result<Self, FATError> {
        Self::open_with(source, preceding_bytes, VolumeOptions::default())
    }

    /// Opens the volume starting `preceding_bytes` into `source`.
    ///
    /// # Errors
    /// - `FATError::MalformedBootSector` or a validation error if the boot sector is unusable
    /// - `FATError::InvalidFsInfoSignature` if the FS information sector is damaged
    /// - `FATError::CorruptFatHeader` if the reserved FAT entries are wrong
    /// - `FATError::IOError` if the medium is too short or unreadable
    pub fn open_with(
        mut source: T,
        preceding_bytes: u64,
        options: VolumeOptions,
    ) -> Result<Self, FATError> {
        source.seek(SeekFrom::Start(preceding_bytes))?;
        let (bpb, fs_info) = read_boot_region(&mut source, options.validate_bpb)?;
        info!(
            "{} volume at byte {preceding_bytes}: {} bytes per sector, {} bytes per cluster",
            bpb.fat_type(),
            bpb.bytes_per_sec(),
            bpb.bytes_per_cluster()
        );

        let mut volume = Self {
            source,
            bpb,
            fs_info,
            preceding_bytes,
            fat: FatTable::default(),
            second_fat: None,
            partition_sectors: None,
            options,
        };

        volume.fat = volume.read_fat(0)?;
        info!(
            "FAT holds {} chains, {} bad clusters",
            volume.fat.chain_count(),
            volume.fat.bad_count()
        );

        if options.read_second_fat && *volume.bpb.num_fat() >= 2 {
            let second = volume.read_fat(1)?;
            if !second.same_chains(&volume.fat) {
                warn!("The two copies of the FAT disagree, using the first one");
            }
            volume.second_fat = Some(second);
        }

        Ok(volume)
    }

    /// Records the size of the enclosing partition, used to show the volume slack.
    pub fn with_partition_sectors(mut self, sectors: u64) -> Self {
        self.partition_sectors = Some(sectors);
        self
    }

    fn read_fat(&mut self, index: u8) -> Result<FatTable, FATError> {
        let start = self.fat_offset() + index as u64 * self.bpb.bytes_per_fat();
        self.source.seek(SeekFrom::Start(start))?;
        FatTable::from_reader(&mut self.source, self.bpb.bytes_per_fat())
    }

    /// Absolute byte offset of the first FAT.
    pub fn fat_offset(&self) -> u64 {
        self.preceding_bytes + *self.bpb.rsvd_sec_cnt() as u64 * *self.bpb.bytes_per_sec() as u64
    }

    /// Absolute byte offset of cluster 2.
    pub fn data_offset(&self) -> u64 {
        self.fat_offset() + *self.bpb.num_fat() as u64 * self.bpb.bytes_per_fat()
    }

    pub fn data_region(&self) -> DataRegion {
        DataRegion {
            offset: self.data_offset(),
            bytes_per_cluster: self.bpb.bytes_per_cluster(),
        }
    }

    /// Absolute byte offset of the first byte of `cluster`.
    pub fn cluster_address(&self, cluster: u32) -> u64 {
        self.data_region().cluster_address(cluster)
    }

    /// Walks the directory tree, logging every diagnostic.
    pub fn read_file_table(&mut self) -> Result<FileTable, FATError> {
        self.read_file_table_with(&mut LogSink)
    }

    /// Walks the directory tree, handing every diagnostic to `sink`.
    pub fn read_file_table_with<S: DiagnosticSink>(
        &mut self,
        sink: &mut S,
    ) -> Result<FileTable, FATError> {
        let traversal = Traversal::new(
            &self.fat,
            self.data_region(),
            sink,
            self.options.max_directories,
        );
        traversal.walk(&mut self.source, *self.bpb.root_clus())
    }

    /// Gives the block source back.
    pub fn into_inner(self) -> T {
        self.source
    }

    fn sector_of(&self, byte: u64) -> u64 {
        byte / *self.bpb.bytes_per_sec() as u64
    }

    fn data_end(&self) -> u64 {
        self.sector_of(self.data_offset())
            + self.bpb.cluster_count() as u64 * *self.bpb.sec_per_clus() as u64
    }
}

/// Opens the FAT32 volume starting `preceding_bytes` into `source`.
pub fn open_fat32_volume<T: Read + Seek>(
    source: T,
    preceding_bytes: u64,
) -> Result<Fat32Volume<T>, FATError> {
    Fat32Volume::open(source, preceding_bytes)
}

impl<T: Read + Seek> LayoutDisplay for Fat32Volume<T> {
    fn display_layout(&self, indent: u8) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        let indent = " ".repeat(indent.into());
        let row = |out: &mut String, region: &str, start: u64, end: u64, what: &str| {
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent, region, start, end, what
            )
        };

        writeln!(out, "{}┌{:─^55}┐", indent, " FAT32 Volume Layout ")?;
        writeln!(
            out,
            "{}├{:^12}┬{:^12}┬{:^12}┬{:^16}┤",
            indent, "Region", "Start", "End", "Description"
        )?;
        writeln!(
            out,
            "{}├{:─<12}┼{:─<12}┼{:─<12}┼{:─<16}┤",
            indent, "", "", "", ""
        )?;

        let start = self.sector_of(self.preceding_bytes);
        let fat_start = self.sector_of(self.fat_offset());
        let fat_sz = self.bpb.fat_sz() as u64;
        row(&mut out, "Reserved", start, fat_start, "Boot + FS info")?;
        for i in 0..*self.bpb.num_fat() as u64 {
            let fat_i_start = fat_start + i * fat_sz;
            row(
                &mut out,
                &format!("FAT #{i}"),
                fat_i_start,
                fat_i_start + fat_sz,
                "Allocation table",
            )?;
        }
        let data_start = self.sector_of(self.data_offset());
        row(&mut out, "Data", data_start, self.data_end(), "Cluster data")?;
        if let Some(sectors) = self.partition_sectors {
            let end = start + sectors;
            if self.data_end() < end {
                row(&mut out, "", self.data_end(), end, "Volume slack")?;
            }
        }

        writeln!(
            out,
            "{}└{:─<12}┴{:─<12}┴{:─<12}┴{:─<16}┘",
            indent, "", "", "", ""
        )?;

        Ok(out)
    }
}
