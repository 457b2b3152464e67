//! This module provides functionality for parsing and handling the classical
//! Master Boot Record (MBR) partition table.
//!
//! It defines structures and methods to interpret partition table entries,
//! validate partition tables, and locate the volumes they describe.
use getset::Getters;
use std::io::{Read, Seek, SeekFrom};

use super::disk_error::DiskError;
use crate::traits::LayoutDisplay;
use crate::utils;
use std::fmt::Write;
use std::fmt::{self, Display};

/// The number of primary partitions supported by MBR.
pub const PART_CNT: usize = 4;
/// Offset of the partition table inside the MBR.
const PART_TABLE_OFFSET: usize = 0x1BE;
/// Size of a partition table entry.
const PART_ENTRY_SIZE: usize = 16;
/// The table and its signature fill the first 512 bytes of the disk.
pub const MIN_SECTOR_SIZE: usize = 512;

/// Represents the type of a partition table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PTType {
    /// Unused slot.
    Empty,
    /// FAT32, CHS (0x0B) or LBA (0x0C) addressed.
    Fat32,
    /// NTFS or exFAT.
    Ntfs,
    /// Extended partition, CHS (0x05) or LBA (0x0F) addressed.
    Extended,
    /// Unsupported partition type, encapsulating the raw type byte.
    Unsupported(u8),
}

impl Display for PTType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PTType::Empty => write!(f, "Empty"),
            PTType::Fat32 => write!(f, "FAT32"),
            PTType::Ntfs => write!(f, "NTFS"),
            PTType::Extended => write!(f, "Extended"),
            PTType::Unsupported(b) => write!(f, "Unknown 0x{:02X}", b),
        }
    }
}

impl PTType {
    /// Creates a `PTType` instance from a raw byte.
    fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => PTType::Empty,
            0x0B | 0x0C => PTType::Fat32,
            0x07 => PTType::Ntfs,
            0x05 | 0x0F => PTType::Extended,
            _ => PTType::Unsupported(byte),
        }
    }
}

/// Cylinder-head-sector address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Chs {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

impl Chs {
    /// Decodes the packed on-disk form `[head, sector | cylinder high bits, cylinder low]`.
    fn from_bytes(raw: &[u8]) -> Self {
        let (head, sector, cylinder) = (raw[0], raw[1], raw[2]);
        Chs {
            cylinder: ((sector as u16 & 0xC0) << 2) | cylinder as u16,
            head,
            sector: sector & 0x3F,
        }
    }
}

impl Display for Chs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cylinder, self.head, self.sector)
    }
}

/// Represents a single partition table entry.
#[derive(Debug, Clone, Getters)]
#[get = "pub"]
pub struct PTEntry {
    /// Position of the entry in the table, from 1.
    index: usize,
    /// 0x80 for the bootable partition.
    status: u8,
    start_chs: Chs,
    /// The type of the partition.
    pt_type: PTType,
    end_chs: Chs,
    /// The starting Logical Block Address (LBA) of the partition.
    lba_start: u32,
    /// The number of sectors in the partition.
    sector_cnt: u32,
    /// Size in bytes of the sectors `lba_start` and `sector_cnt` count.
    sector_size: u64,
}

impl PTEntry {
    fn from_bytes(index: usize, raw: &[u8], sector_size: u64) -> Self {
        PTEntry {
            index,
            status: raw[0x00],
            start_chs: Chs::from_bytes(&raw[0x01..0x04]),
            pt_type: PTType::from_byte(raw[0x04]),
            end_chs: Chs::from_bytes(&raw[0x05..0x08]),
            lba_start: utils::u32_at(raw, 0x08),
            sector_cnt: utils::u32_at(raw, 0x0C),
            sector_size,
        }
    }

    /// Absolute byte offset of the first sector of the partition.
    pub fn first_byte_address(&self) -> u64 {
        self.lba_start as u64 * self.sector_size
    }

    pub fn is_bootable(&self) -> bool {
        self.status == 0x80
    }
}

/// Represents the boot signature of a Master Boot Record (MBR).
#[derive(Debug)]
enum BootSignature {
    /// Standard MBR boot signature (0x55AA).
    Mbr(u16),
    /// Unsupported boot signature, encapsulating the raw value.
    Unsupported(u16),
}

impl BootSignature {
    fn from_u16(sig: u16) -> BootSignature {
        match sig {
            // The signature 0x55AA is stored on disk in little-endian byte order.
            0xAA55 => BootSignature::Mbr(0xAA55),
            other => BootSignature::Unsupported(other),
        }
    }
}

impl fmt::Display for BootSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootSignature::Mbr(sig) | BootSignature::Unsupported(sig) => write!(f, "0x{:04X}", sig),
        }
    }
}

/// Represents a Master Boot Record (MBR), including partition table entries
/// and the boot signature.
#[derive(Debug)]
pub struct Mbr {
    /// The partition table entries in the MBR.
    pt_entries: [PTEntry; PART_CNT],
    /// The boot signature of the MBR.
    boot_signature: BootSignature,
    /// Size of the medium in sectors.
    sector_cnt: u64,
}

impl Mbr {
    /// Reads and parses the MBR held by the first sector of `source`.
    ///
    /// # Errors
    /// - `DiskError::InvalidSectorSize` if `sector_size` is not a power of two of at
    ///   least 512 bytes
    /// - `DiskError::Io` if the first sector cannot be read
    /// - `DiskError::InvalidSignature` if the sector does not end with 0x55AA
    /// - `DiskError::PartitionTableNotSorted` or `DiskError::OverlappingPartitions` if the
    ///   table is inconsistent
    pub fn from_reader<T: Read + Seek>(source: &mut T, sector_size: usize) -> Result<Mbr, DiskError> {
        if sector_size < MIN_SECTOR_SIZE || !sector_size.is_power_of_two() {
            return Err(DiskError::InvalidSectorSize(sector_size));
        }

        let mut buffer = vec![0; sector_size];
        utils::read_sector(source, 0, sector_size, &mut buffer)?;

        let pt_entries: [PTEntry; PART_CNT] = core::array::from_fn(|i| {
            let offset = PART_TABLE_OFFSET + i * PART_ENTRY_SIZE;
            PTEntry::from_bytes(
                i + 1,
                &buffer[offset..offset + PART_ENTRY_SIZE],
                sector_size as u64,
            )
        });

        let mbr = Mbr {
            pt_entries,
            boot_signature: BootSignature::from_u16(utils::u16_at(&buffer, 510)),
            sector_cnt: source.seek(SeekFrom::End(0))? / sector_size as u64,
        };

        mbr.validate()
    }

    /// Returns the non-empty partition table entries.
    ///
    /// Entries with a sector count of zero or an empty type are left out.
    pub fn pt_entries(&self) -> Vec<&PTEntry> {
        self.pt_entries
            .iter()
            .filter(|entry| entry.sector_cnt != 0 && entry.pt_type != PTType::Empty)
            .collect()
    }

    /// Returns the size of the disk in sectors.
    pub fn sector_cnt(&self) -> u64 {
        self.sector_cnt
    }

    fn validate(self) -> Result<Self, DiskError> {
        self.check_signature()?
            .check_partition_table_sorted()?
            .check_partitions_non_overlapping()
    }

    fn check_signature(self) -> Result<Self, DiskError> {
        match self.boot_signature {
            BootSignature::Unsupported(sig) => Err(DiskError::InvalidSignature(sig)),
            _ => Ok(self),
        }
    }

    /// Checks if the partition table entries are sorted by their starting LBA.
    fn check_partition_table_sorted(self) -> Result<Self, DiskError> {
        match self
            .pt_entries()
            .windows(2)
            .all(|pair| pair[0].lba_start <= pair[1].lba_start)
        {
            true => Ok(self),
            false => Err(DiskError::PartitionTableNotSorted),
        }
    }

    /// Checks if the partition table entries are non-overlapping.
    fn check_partitions_non_overlapping(self) -> Result<Self, DiskError> {
        match self.pt_entries().windows(2).any(|pair| {
            pair[0].lba_start as u64 + pair[0].sector_cnt as u64 > pair[1].lba_start as u64
        }) {
            true => Err(DiskError::OverlappingPartitions),
            false => Ok(self),
        }
    }
}

impl LayoutDisplay for Mbr {
    fn display_layout(&self, indent: u8) -> Result<String, fmt::Error> {
        let mut out = String::from("");
        let indent = " ".repeat(indent.into());

        let mut last_end = 0;
        let disk_end = self.sector_cnt;

        writeln!(out, "{}┌{:─^55}┐", indent, " Master Boot Record Layout ")?;
        writeln!(out, "{}├{:<45}{:>10}┤", indent, "Disk Size", disk_end)?;
        writeln!(
            out,
            "{}├{:<45}{:>10}┤",
            indent,
            "Boot Signature",
            self.boot_signature.to_string()
        )?;
        writeln!(out, "{}├{:─^55}┤", indent, "")?;

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

        for entry in self.pt_entries() {
            let start = u64::from(entry.lba_start);
            let end = start + u64::from(entry.sector_cnt);

            if start > last_end {
                writeln!(
                    out,
                    "{}│{:^12}│{:>12}│{:>12}│{:^16}│",
                    indent, "", last_end, start, "Unallocated"
                )?;
            }

            writeln!(
                out,
                "{}│{:^12}│{:>12}│{:>12}│{:^16}│",
                indent,
                format!("Part #{}", entry.index),
                start,
                end,
                entry.pt_type.to_string()
            )?;

            last_end = end;
        }

        if last_end < disk_end {
            writeln!(
                out,
                "{}│{:^12}│{:>12}│{:>12}│{:^16}│",
                indent, "", last_end, disk_end, "Unallocated"
            )?;
        }

        writeln!(
            out,
            "{}└{:─<12}┴{:─<12}┴{:─<12}┴{:─<16}┘",
            indent, "", "", "", ""
        )?;

        Ok(out)
    }
}
