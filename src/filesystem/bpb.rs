//! FAT32 boot sector and FS information sector.
//!
//! This module implements:
//! - BIOS Parameter Block (Bpb) parsing, including the scan for the 0x55AA terminator
//! - FS information sector signature checks
//! - Optional structural validation according to Microsoft's FAT specification

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use super::fat_error::FATError;
use super::fat_type::FATType;

/// Boot sector signature.
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
/// Lead signature of the FS information sector ("RRaA").
pub const FS_INFO_LEAD_SIGNATURE: [u8; 4] = [0x52, 0x52, 0x61, 0x41];
/// Size in bytes of the fixed part of the FAT32 boot sector.
pub const BPB_HEADER_SIZE: usize = 90;
/// Upper bound of the signature scan, the largest legal sector size.
pub const BOOT_SECTOR_SCAN_LIMIT: usize = 4096;

/// BIOS Parameter Block of a FAT32 volume.
///
/// Parsed once when a volume is opened and immutable afterwards: every byte offset
/// computed on the volume derives from it.
#[derive(BinRead, Debug, Getters)]
#[br(little)]
pub struct Bpb {
    /// Jump instruction to boot code (0xEB ?? 0x90 or 0xE9 ?? ??)
    #[get = "pub"]
    jmp: [u8; 3],
    /// OEM identifier (e.g., "MSWIN4.1")
    #[get = "pub"]
    oem_name: [u8; 8],
    /// Number of bytes per sector
    #[get = "pub"]
    bytes_per_sec: u16,
    /// Number of sectors per cluster
    #[get = "pub"]
    sec_per_clus: u8,
    /// Number of reserved sectors from start of volume
    #[get = "pub"]
    rsvd_sec_cnt: u16,
    /// Number of FAT copies
    #[get = "pub"]
    num_fat: u8,
    /// Maximum number of root directory entries (0 for FAT32)
    #[get = "pub"]
    root_ent_cnt: u16,
    /// Total sectors for volumes < 32MB (0 for FAT32)
    #[get = "pub"]
    tot_sec_16: u16,
    /// Media descriptor (0xF8 for fixed disk)
    #[get = "pub"]
    media: u8,
    /// Sectors per FAT for FAT12/FAT16 (0 for FAT32)
    #[get = "pub"]
    fat_sz_16: u16,
    #[get = "pub"]
    sec_per_trk: u16,
    #[get = "pub"]
    num_heads: u16,
    /// Number of hidden sectors preceding the partition
    #[get = "pub"]
    hidd_sec: u32,
    #[get = "pub"]
    tot_sec_32: u32,

    // FAT32-specific fields
    /// Sectors per FAT
    #[get = "pub"]
    fat_sz_32: u32,
    /// Mirroring flags, kept as the raw on-disk bits
    #[get = "pub"]
    #[br(big)]
    ext_flags: u16,
    #[get = "pub"]
    fs_ver: u16,
    /// First cluster of root directory (typically 2)
    #[get = "pub"]
    root_clus: u32,
    /// Sector number of FSINFO structure
    #[get = "pub"]
    fs_info: u16,
    /// Sector number of backup boot sector
    #[get = "pub"]
    bk_boot_sec: u16,
    reserved: [u8; 12],
    /// Drive number (0x80 for hard disk)
    #[get = "pub"]
    drv_num: u8,
    reserved_1: u8,
    /// Extended boot signature (0x29)
    #[get = "pub"]
    boot_sig: u8,
    /// Volume serial number
    #[get = "pub"]
    vol_id: u32,
    vol_lab: [u8; 11],
    fil_sys_type: [u8; 8],

    /// Bytes between the fixed header and the signature
    #[br(default)]
    #[get = "pub"]
    boot_code: Vec<u8>,
}

impl Bpb {
    /// Reads a Bpb from the current position of `source`.
    ///
    /// The fixed header is decoded first, then the remainder of the sector is consumed
    /// two bytes at a time until the 0x55AA signature shows up. On success `source`
    /// is left right after the signature.
    ///
    /// # Errors
    /// - `FATError::MalformedBootSector` if the signature is not found within
    ///   the boot sector, at most [`BOOT_SECTOR_SCAN_LIMIT`] bytes, or the medium ends first
    /// - Various validation variants when `validate` is true
    /// - `FATError::InvalidBytesPerSec`, `FATError::InvalidSecPerClus` or
    ///   `FATError::InvalidFatSz` even without validation when the geometry cannot
    ///   be used to address the volume
    pub fn from_reader<T: Read + Seek>(source: &mut T, validate: bool) -> Result<Bpb, FATError> {
        let mut bpb: Bpb = source.read_le().map_err(|err| match err {
            binread::Error::Io(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                FATError::MalformedBootSector(String::from(
                    "the medium ends inside the boot sector header",
                ))
            }
            other => FATError::from(other),
        })?;
        // The signature closes the boot sector itself, never a later sector
        let limit = (bpb.bytes_per_sec as usize).clamp(BPB_HEADER_SIZE + 2, BOOT_SECTOR_SCAN_LIMIT);
        bpb.boot_code = Self::scan_for_signature(source, limit)?;

        if validate {
            bpb.validate()
        } else {
            bpb.check_geometry()?;
            Ok(bpb)
        }
    }

    fn scan_for_signature<T: Read>(source: &mut T, limit: usize) -> Result<Vec<u8>, FATError> {
        let mut tail = vec![];
        let mut pair = [0u8; 2];

        while BPB_HEADER_SIZE + tail.len() + 2 <= limit {
            match source.read_exact(&mut pair) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(FATError::MalformedBootSector(format!(
                        "the medium ends {} bytes into the boot sector without a 0x55AA signature",
                        BPB_HEADER_SIZE + tail.len()
                    )));
                }
                Err(err) => return Err(err.into()),
            }

            if pair == BOOT_SIGNATURE {
                return Ok(tail);
            }
            tail.extend_from_slice(&pair);
        }

        Err(FATError::MalformedBootSector(format!(
            "no 0x55AA signature within the first {limit} bytes"
        )))
    }

    /// Checks what every offset computation relies on, validation or not.
    fn check_geometry(&self) -> Result<(), FATError> {
        if self.bytes_per_sec == 0 {
            return Err(FATError::InvalidBytesPerSec(self.bytes_per_sec));
        }
        if self.sec_per_clus == 0 {
            return Err(FATError::InvalidSecPerClus(self.sec_per_clus));
        }

        let fat_region_end =
            self.rsvd_sec_cnt as u64 + self.num_fat as u64 * self.fat_sz() as u64;
        if fat_region_end > self.tot_sec() as u64 {
            return Err(FATError::InvalidFatSz(format!(
                "{} FATs of {} sectors after {} reserved sectors exceed the {} sectors of the volume",
                self.num_fat,
                self.fat_sz(),
                self.rsvd_sec_cnt,
                self.tot_sec()
            )));
        }

        Ok(())
    }

    /// Number of bytes in a cluster.
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sec as u32 * self.sec_per_clus as u32
    }

    /// Number of bytes of one FAT copy.
    pub fn bytes_per_fat(&self) -> u64 {
        self.fat_sz() as u64 * self.bytes_per_sec as u64
    }

    /// Determines the number of clusters in the data section.
    pub fn cluster_count(&self) -> u32 {
        let root_dir_sectors =
            (self.root_ent_cnt as u64 * 32).div_ceil((self.bytes_per_sec as u64).max(1));
        let overhead = self.rsvd_sec_cnt as u64
            + self.num_fat as u64 * self.fat_sz() as u64
            + root_dir_sectors;

        // Never more than the 32-bit sector count
        let data_sec = (self.tot_sec() as u64).saturating_sub(overhead);
        (data_sec / (self.sec_per_clus as u64).max(1)) as u32
    }

    pub fn fat_sz(&self) -> u32 {
        if self.fat_sz_16 > 0 {
            self.fat_sz_16 as u32
        } else {
            self.fat_sz_32
        }
    }

    pub fn tot_sec(&self) -> u32 {
        if self.tot_sec_16 != 0 {
            self.tot_sec_16 as u32
        } else {
            self.tot_sec_32
        }
    }

    /// Determines the FAT type based on the number of clusters in the filesystem.
    pub fn fat_type(&self) -> FATType {
        FATType::from_cluster_count(self.cluster_count())
    }

    /// Volume label with its space padding removed.
    pub fn volume_label(&self) -> String {
        String::from_utf8_lossy(&self.vol_lab).trim_end().to_string()
    }

    /// Filesystem type string of the boot sector (e.g. "FAT32").
    pub fn filesystem_type(&self) -> String {
        String::from_utf8_lossy(&self.fil_sys_type)
            .trim_end()
            .to_string()
    }

    /// Validates the Bpb structure according to FAT32 specification requirements.
    fn validate(self) -> Result<Self, FATError> {
        if !((self.jmp[0] == 0xEB && self.jmp[2] == 0x90) || self.jmp[0] == 0xE9) {
            return Err(FATError::InvalidJmp(format!(
                "0x{:02X}{:02X}{:02X}",
                self.jmp[0], self.jmp[1], self.jmp[2],
            )));
        }

        const VALID_BYTES_PER_SEC: [u16; 4] = [512, 1024, 2048, 4096];
        if !VALID_BYTES_PER_SEC.contains(&self.bytes_per_sec) {
            return Err(FATError::InvalidBytesPerSec(self.bytes_per_sec));
        }

        const VALID_SEC_PER_CLUS: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];
        if !VALID_SEC_PER_CLUS.contains(&self.sec_per_clus) {
            return Err(FATError::InvalidSecPerClus(self.sec_per_clus));
        }

        if self.bytes_per_cluster() > 32 * 1024 {
            return Err(FATError::InvalidClusSz(self.bytes_per_cluster()));
        }

        if self.rsvd_sec_cnt == 0 {
            return Err(FATError::InvalidRsvdSecCnt(self.rsvd_sec_cnt));
        }

        if self.num_fat == 0 {
            return Err(FATError::InvalidNumFat(self.num_fat));
        }

        if self.root_ent_cnt != 0 {
            return Err(FATError::InvalidRootEntCnt(self.root_ent_cnt));
        }

        if self.tot_sec_16 != 0 {
            return Err(FATError::InvalidTotSec(String::from(
                "BPB_TotSec16 should be 0 for a FAT32 volume.",
            )));
        }
        if self.tot_sec_32 == 0 {
            return Err(FATError::InvalidTotSec(String::from(
                "BPB_TotSec32 should be greater than 0 for a FAT32 volume.",
            )));
        }

        if self.fat_sz_16 != 0 {
            return Err(FATError::InvalidFatSz(String::from(
                "BPB_FATSz16 should be 0 for a FAT32 volume.",
            )));
        }
        if self.fat_sz_32 == 0 {
            return Err(FATError::InvalidFatSz(String::from(
                "BPB_FATSz32 should be greater than 0 for a FAT32 volume.",
            )));
        }
        self.check_geometry()?;

        if self.root_clus < 2 {
            return Err(FATError::InvalidRootClus(self.root_clus));
        }

        match self.fat_type() {
            FATType::FAT32 => Ok(self),
            fat_type => Err(FATError::UnsupportedFATType(fat_type.to_string())),
        }
    }
}

/// FS information sector.
///
/// Only its signatures are checked; the free-cluster hints it carries are kept for
/// display and never trusted.
#[derive(BinRead, Debug, Getters)]
#[br(little)]
pub struct FsInfo {
    lead_sig: [u8; 4],
    #[br(count = 480)]
    _reserved: Vec<u8>,
    _struc_sig: [u8; 4],
    /// Last known count of free clusters (0xFFFFFFFF if unknown)
    #[get = "pub"]
    free_count: u32,
    /// Hint for the next free cluster (0xFFFFFFFF if unknown)
    #[get = "pub"]
    nxt_free: u32,
    _reserved_2: [u8; 12],
    _trail_pad: [u8; 2],
    trail_sig: [u8; 2],
}

impl FsInfo {
    /// Reads the FS information sector at the current position of `source`.
    ///
    /// # Errors
    /// - `FATError::InvalidFsInfoSignature` if either signature does not match
    pub fn from_reader<T: Read + Seek>(source: &mut T) -> Result<FsInfo, FATError> {
        let fs_info: FsInfo = source.read_le()?;

        if fs_info.lead_sig != FS_INFO_LEAD_SIGNATURE {
            return Err(FATError::InvalidFsInfoSignature(format!(
                "lead signature {:02X?}, expected {:02X?}",
                fs_info.lead_sig, FS_INFO_LEAD_SIGNATURE
            )));
        }
        if fs_info.trail_sig != BOOT_SIGNATURE {
            return Err(FATError::InvalidFsInfoSignature(format!(
                "trail signature {:02X?}, expected {:02X?}",
                fs_info.trail_sig, BOOT_SIGNATURE
            )));
        }

        Ok(fs_info)
    }
}

/// Parses the boot sector at the current position of `source`, then the FS
/// information sector in the sector right after it.
///
/// On success `source` is positioned immediately after the FS information sector.
pub fn read_boot_region<T: Read + Seek>(
    source: &mut T,
    validate: bool,
) -> Result<(Bpb, FsInfo), FATError> {
    let start = source.stream_position()?;

    let bpb = Bpb::from_reader(source, validate)?;
    source.seek(SeekFrom::Start(start + *bpb.bytes_per_sec() as u64))?;
    let fs_info = FsInfo::from_reader(source)?;

    Ok((bpb, fs_info))
}

/// Implements the Display trait for Bpb
impl fmt::Display for Bpb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;

        macro_rules! field {
            ($name:expr, $val:expr, $size:expr) => {{
                writeln!(f, "  {:<20} 0x{:>04X}: {}", $name, offset, $val)?;
                offset += $size;
            }};
        }

        writeln!(f, "BIOS Parameter Block (Bpb):")?;

        field!("jmp", format!("{:02X?}", self.jmp), 3);
        field!("oem_name", String::from_utf8_lossy(&self.oem_name), 8);
        field!("bytes_per_sec", self.bytes_per_sec, 2);
        field!("sec_per_clus", self.sec_per_clus, 1);
        field!("rsvd_sec_cnt", self.rsvd_sec_cnt, 2);
        field!("num_fat", self.num_fat, 1);
        field!("root_ent_cnt", self.root_ent_cnt, 2);
        field!("tot_sec_16", self.tot_sec_16, 2);
        field!("media", format!("0x{:X}", self.media), 1);
        field!("fat_sz_16", self.fat_sz_16, 2);
        field!("sec_per_trk", self.sec_per_trk, 2);
        field!("num_heads", self.num_heads, 2);
        field!("hidd_sec", self.hidd_sec, 4);
        field!("tot_sec_32", self.tot_sec_32, 4);
        field!("fat_sz_32", self.fat_sz_32, 4);
        field!("ext_flags", format!("0x{:04X}", self.ext_flags), 2);
        field!("fs_ver", self.fs_ver, 2);
        field!("root_clus", self.root_clus, 4);
        field!("fs_info", self.fs_info, 2);
        field!("bk_boot_sec", self.bk_boot_sec, 2);
        field!("reserved", format!("{:02X?}", &self.reserved[..]), 12);
        field!("drv_num", format!("0x{:X}", self.drv_num), 1);
        field!("reserved_1", self.reserved_1, 1);
        field!("boot_sig", format!("0x{:X}", self.boot_sig), 1);
        field!("vol_id", format!("0x{:X}", self.vol_id), 4);
        field!("vol_lab", self.volume_label(), 11);
        field!("fil_sys_type", self.filesystem_type(), 8);

        writeln!(f, "  {:<20} 0x{:>04X}: {} bytes", "boot_code", offset, self.boot_code.len())?;
        offset += self.boot_code.len();

        writeln!(f, "  {:<20} 0x{:>04X}: {:02X?}", "signature", offset, BOOT_SIGNATURE)
    }
}
