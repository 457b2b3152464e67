//! Builder of small synthetic FAT32 volumes.
//!
//! The geometry is the smallest that still classifies as FAT32: 512-byte sectors,
//! one sector per cluster and a little over 65525 data clusters. Images are written
//! into sparse temporary files so only the touched sectors take space.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

pub const BPS: u64 = 512;
pub const RSVD_SEC: u64 = 32;
pub const NUM_FAT: u64 = 2;
pub const FAT_SZ: u64 = 546;
pub const TOT_SEC: u64 = 70_000;
pub const ROOT_CLUSTER: u32 = 2;

pub const EOC: u32 = 0x0FFF_FFFF;
pub const ATTR_DIR: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_VOLUME: u8 = 0x08;

/// Byte offset of cluster 2 relative to the start of the volume.
pub const DATA_OFFSET: u64 = (RSVD_SEC + NUM_FAT * FAT_SZ) * BPS;

pub struct VolumeBuilder {
    pub fat: Vec<u32>,
    pub second_fat: Option<Vec<u32>>,
    pub clusters: BTreeMap<u32, Vec<u8>>,
    pub boot_sector: Vec<u8>,
}

impl VolumeBuilder {
    /// Empty volume whose root directory is the single cluster 2.
    pub fn new() -> Self {
        let mut fat = vec![0u32; (FAT_SZ * BPS / 4) as usize];
        fat[0] = 0x0FFF_FFF8;
        fat[1] = 0xFFFF_FFFF;
        fat[ROOT_CLUSTER as usize] = EOC;

        Self {
            fat,
            second_fat: None,
            clusters: BTreeMap::new(),
            boot_sector: boot_sector(),
        }
    }

    /// Links `clusters` into one chain ending with an end-of-chain marker.
    pub fn chain(&mut self, clusters: &[u32]) -> &mut Self {
        for pair in clusters.windows(2) {
            self.fat[pair[0] as usize] = pair[1];
        }
        if let Some(last) = clusters.last() {
            self.fat[*last as usize] = EOC;
        }
        self
    }

    /// Writes directory slots into the clusters of `chain`, back to back.
    pub fn directory(&mut self, chain: &[u32], slots: &[[u8; 32]]) -> &mut Self {
        let mut bytes: Vec<u8> = slots.iter().flatten().copied().collect();
        bytes.resize(chain.len() * BPS as usize, 0);
        for (cluster, chunk) in chain.iter().zip(bytes.chunks(BPS as usize)) {
            self.clusters.insert(*cluster, chunk.to_vec());
        }
        self
    }

    /// Writes the volume into `file`, `offset` bytes from its start.
    pub fn write_to(&self, file: &mut File, offset: u64) {
        let end = offset + TOT_SEC * BPS;
        if file.metadata().unwrap().len() < end {
            file.set_len(end).unwrap();
        }

        write_at(file, offset, &self.boot_sector);
        write_at(file, offset + BPS, &fs_info_sector());

        let fat_start = offset + RSVD_SEC * BPS;
        let first: Vec<u8> = self.fat.iter().flat_map(|e| e.to_le_bytes()).collect();
        let second: Vec<u8> = self
            .second_fat
            .as_ref()
            .unwrap_or(&self.fat)
            .iter()
            .flat_map(|e| e.to_le_bytes())
            .collect();
        write_at(file, fat_start, &first);
        write_at(file, fat_start + FAT_SZ * BPS, &second);

        for (cluster, data) in &self.clusters {
            write_at(file, offset + DATA_OFFSET + (*cluster as u64 - 2) * BPS, data);
        }
    }

    /// Writes the volume at the start of a fresh temporary file.
    pub fn build(&self) -> File {
        let mut file = tempfile::tempfile().unwrap();
        self.write_to(&mut file, 0);
        file
    }
}

pub fn write_at(file: &mut File, offset: u64, data: &[u8]) {
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(data).unwrap();
}

pub fn boot_sector() -> Vec<u8> {
    let mut buf = vec![0u8; 512];
    buf[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    buf[3..11].copy_from_slice(b"MSWIN4.1");
    buf[11..13].copy_from_slice(&(BPS as u16).to_le_bytes());
    buf[13] = 1;
    buf[14..16].copy_from_slice(&(RSVD_SEC as u16).to_le_bytes());
    buf[16] = NUM_FAT as u8;
    buf[21] = 0xF8;
    buf[32..36].copy_from_slice(&(TOT_SEC as u32).to_le_bytes());
    buf[36..40].copy_from_slice(&(FAT_SZ as u32).to_le_bytes());
    buf[44..48].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
    buf[48..50].copy_from_slice(&1u16.to_le_bytes());
    buf[50..52].copy_from_slice(&6u16.to_le_bytes());
    buf[66] = 0x29;
    buf[67..71].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    buf[71..82].copy_from_slice(b"EVIDENCE   ");
    buf[82..90].copy_from_slice(b"FAT32   ");
    buf[510] = 0x55;
    buf[511] = 0xAA;
    buf
}

pub fn fs_info_sector() -> Vec<u8> {
    let mut buf = vec![0u8; 512];
    buf[0..4].copy_from_slice(&[0x52, 0x52, 0x61, 0x41]);
    buf[484..488].copy_from_slice(&[0x72, 0x72, 0x41, 0x61]);
    buf[488..492].copy_from_slice(&60_000u32.to_le_bytes());
    buf[492..496].copy_from_slice(&40u32.to_le_bytes());
    buf[510] = 0x55;
    buf[511] = 0xAA;
    buf
}

/// 2020-01-01
pub const SOME_DATE: u16 = (40 << 9) | (1 << 5) | 1;

/// 8.3 directory slot created and last written on [`SOME_DATE`].
pub fn short_entry(name: &[u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut slot = [0u8; 32];
    slot[0..11].copy_from_slice(name);
    slot[11] = attr;
    slot[16..18].copy_from_slice(&SOME_DATE.to_le_bytes());
    slot[24..26].copy_from_slice(&SOME_DATE.to_le_bytes());
    slot[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    slot[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    slot[28..32].copy_from_slice(&size.to_le_bytes());
    slot
}

/// Sets the last write date and time of an 8.3 slot.
pub fn with_modified(mut slot: [u8; 32], date: u16, time: u16) -> [u8; 32] {
    slot[22..24].copy_from_slice(&time.to_le_bytes());
    slot[24..26].copy_from_slice(&date.to_le_bytes());
    slot
}

pub fn checksum(short: &[u8; 11]) -> u8 {
    short
        .iter()
        .fold(0u8, |sum, b| sum.rotate_right(1).wrapping_add(*b))
}

/// Long name records for `name`, in on-disk order, followed by its 8.3 slot.
pub fn named_entry(name: &str, short: [u8; 32]) -> Vec<[u8; 32]> {
    let mut short_name = [0u8; 11];
    short_name.copy_from_slice(&short[0..11]);
    let sum = checksum(&short_name);

    let units: Vec<u16> = name.encode_utf16().collect();
    let fragments: Vec<&[u16]> = units.chunks(13).collect();
    let mut slots = vec![];
    for (i, fragment) in fragments.iter().enumerate().rev() {
        let mut sequence = i as u8 + 1;
        if i == fragments.len() - 1 {
            sequence |= 0x40;
        }
        slots.push(long_record(sequence, fragment, sum));
    }
    slots.push(short);
    slots
}

fn long_record(sequence: u8, fragment: &[u16], checksum: u8) -> [u8; 32] {
    let mut units = fragment.to_vec();
    if units.len() < 13 {
        units.push(0x0000);
    }
    units.resize(13, 0xFFFF);

    let mut slot = [0u8; 32];
    slot[0] = sequence;
    slot[11] = 0x0F;
    slot[13] = checksum;
    let offsets = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];
    for (unit, offset) in units.iter().zip(offsets) {
        slot[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
    }
    slot
}
