//! FAT directory entry structures and parsing.
//!
//! A directory is a sequence of 32-byte slots. Every slot is either an 8.3 entry
//! describing a file or directory, or one fragment of a long file name. The slot
//! kind is decided once from the attribute byte, see [`DirSlot`].

use binread::{BinRead, BinReaderExt};
use chrono::{NaiveDate, NaiveDateTime};
use getset::Getters;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::string::FromUtf16Error;

use super::cluster_chain::ClusterChain;
use super::fat_error::FATError;

/// Size in bytes of a directory slot.
pub const DIR_ENTRY_SIZE: usize = 32;
/// First name byte of a deleted entry, also the sequence byte of a deleted long name record.
pub const DELETED_MARKER: u8 = 0xE5;
/// First name byte of the slot closing a directory.
pub const END_OF_DIRECTORY: u8 = 0x00;
/// Prefix given to the names of deleted 8.3 entries.
pub const DELETED_PREFIX: &str = "(deleted)";

/// Attribute byte of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes(u8);

impl Attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    /// Combination marking a long name record.
    pub const LONG_NAME: u8 = 0x0F;

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    fn has(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.has(Self::READ_ONLY)
    }

    pub fn is_hidden(&self) -> bool {
        self.has(Self::HIDDEN)
    }

    pub fn is_system(&self) -> bool {
        self.has(Self::SYSTEM)
    }

    /// True for the volume label entry. Long name records also carry this bit.
    pub fn is_volume_label(&self) -> bool {
        self.has(Self::VOLUME_ID) && !self.is_long_name()
    }

    pub fn is_directory(&self) -> bool {
        self.has(Self::DIRECTORY)
    }

    pub fn is_archive(&self) -> bool {
        self.has(Self::ARCHIVE)
    }

    pub fn is_long_name(&self) -> bool {
        self.0 & 0x3F == Self::LONG_NAME
    }
}

impl fmt::Display for Attributes {
    /// Formats the attributes as a fixed-width flag string such as `-H--D-`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (Self::READ_ONLY, 'R'),
            (Self::HIDDEN, 'H'),
            (Self::SYSTEM, 'S'),
            (Self::VOLUME_ID, 'V'),
            (Self::DIRECTORY, 'D'),
            (Self::ARCHIVE, 'A'),
        ];
        for (flag, letter) in flags {
            write!(f, "{}", if self.has(flag) { letter } else { '-' })?;
        }
        Ok(())
    }
}

/// Decodes a DOS date word. Month and day count from 1, so a zero word is invalid.
fn decode_date(date: u16) -> Result<NaiveDate, String> {
    let year = 1980 + (date >> 9) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("date {year:04}-{month:02}-{day:02} does not exist"))
}

/// Decodes a DOS date and time pair. `hundredths` refines the 2-second time resolution
/// and ranges over 0..=199.
fn decode_timestamp(date: u16, time: u16, hundredths: u8) -> Result<NaiveDateTime, String> {
    let day = decode_date(date)?;
    if hundredths > 199 {
        return Err(format!("{hundredths} hundredths of a second is out of range"));
    }

    let hour = (time >> 11) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = (time & 0x1F) as u32 * 2 + hundredths as u32 / 100;
    let milli = (hundredths as u32 % 100) * 10;

    day.and_hms_milli_opt(hour, minute, second, milli)
        .ok_or_else(|| format!("time {hour:02}:{minute:02}:{second:02} does not exist"))
}

/// 8.3 directory entry, exactly as stored on disk.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(little)]
pub struct ShortEntry {
    /// Base name, space padded
    #[get = "pub"]
    name: [u8; 8],
    /// Extension, space padded
    #[get = "pub"]
    ext: [u8; 3],
    attr: u8,
    _nt_res: u8,
    /// Creation time refinement in 10ms units
    #[get = "pub"]
    crt_time_tenth: u8,
    #[get = "pub"]
    crt_time: u16,
    #[get = "pub"]
    crt_date: u16,
    #[get = "pub"]
    lst_acc_date: u16,
    fst_clus_hi: u16,
    #[get = "pub"]
    wrt_time: u16,
    #[get = "pub"]
    wrt_date: u16,
    fst_clus_lo: u16,
    #[get = "pub"]
    file_size: u32,
}

impl ShortEntry {
    pub fn attributes(&self) -> Attributes {
        Attributes(self.attr)
    }

    /// First cluster, combining the high and low 16-bit halves.
    pub fn cluster_number(&self) -> u32 {
        ((self.fst_clus_hi as u32) << 16) | self.fst_clus_lo as u32
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_MARKER
    }

    /// Builds the displayed name: lowercase, padding trimmed, name and extension joined by
    /// a dot. Deleted entries lose their first character to the deletion marker, it is
    /// shown as `_` behind the `(deleted)` prefix.
    pub fn short_name(&self) -> Result<String, Utf8Error> {
        let mut raw_name = self.name;
        if self.is_deleted() {
            raw_name[0] = b'_';
        }

        let name = std::str::from_utf8(&raw_name)?.trim_end().to_ascii_lowercase();
        let ext = std::str::from_utf8(&self.ext)?.trim_end().to_ascii_lowercase();

        let joined = if ext.is_empty() {
            name
        } else {
            format!("{name}.{ext}")
        };

        if self.is_deleted() {
            Ok(format!("{DELETED_PREFIX}{joined}"))
        } else {
            Ok(joined)
        }
    }

    /// Checksum of the on-disk 8.3 name, stored in every long name record of the entry.
    pub fn checksum(&self) -> u8 {
        self.name
            .iter()
            .chain(self.ext.iter())
            .fold(0u8, |sum, byte| {
                (sum >> 1)
                    .wrapping_add((sum & 1) << 7)
                    .wrapping_add(*byte)
            })
    }

    /// The `.` and `..` entries of a subdirectory.
    pub fn is_dot_entry(&self) -> bool {
        self.name[0] == b'.' && self.name[1..].iter().chain(&self.ext).all(|b| *b == b' ' || *b == b'.')
    }

    pub fn created(&self) -> Result<NaiveDateTime, String> {
        decode_timestamp(self.crt_date, self.crt_time, self.crt_time_tenth)
    }

    pub fn modified(&self) -> Result<NaiveDateTime, String> {
        decode_timestamp(self.wrt_date, self.wrt_time, 0)
    }

    /// Last access date. Informational only: many writers never set it.
    pub fn accessed(&self) -> Option<NaiveDate> {
        decode_date(self.lst_acc_date).ok()
    }

    /// First creation or modification timestamp that fails to decode, if any.
    pub fn timestamp_error(&self) -> Option<String> {
        self.created().err().or_else(|| self.modified().err())
    }
}

/// One fragment of a long file name.
///
/// Records are stored in reverse order just before the 8.3 entry they name; each one
/// carries 13 UTF-16 code units.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(little)]
pub struct LongNameEntry {
    /// Position of the fragment, `0x40` set on the record holding the end of the name
    #[get = "pub"]
    sequence: u8,
    name_1: [u16; 5],
    _attr: u8,
    _entry_type: u8,
    /// Checksum of the 8.3 name this record belongs to
    #[get = "pub"]
    checksum: u8,
    name_2: [u16; 6],
    _first_cluster: u16,
    name_3: [u16; 2],
}

impl LongNameEntry {
    /// Decodes the characters held by this record, stopping at the NUL terminator and
    /// dropping the `0xFFFF` padding.
    pub fn fragment(&self) -> Result<String, FromUtf16Error> {
        let units: Vec<u16> = self
            .name_1
            .iter()
            .chain(self.name_2.iter())
            .chain(self.name_3.iter())
            .copied()
            .take_while(|u| *u != 0x0000)
            .filter(|u| *u != 0xFFFF)
            .collect();
        String::from_utf16(&units)
    }
}

/// A directory slot, tagged by kind.
#[derive(Debug, Clone)]
pub enum DirSlot {
    /// No further entry in this directory.
    End,
    LongName(LongNameEntry),
    Short(ShortEntry),
}

impl DirSlot {
    /// Decodes a 32-byte slot.
    pub fn from_slice(buf: &[u8]) -> Result<Self, FATError> {
        if buf.len() < DIR_ENTRY_SIZE {
            return Err(FATError::IOError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("directory slot of {} bytes", buf.len()),
            )));
        }
        if buf[0] == END_OF_DIRECTORY {
            return Ok(DirSlot::End);
        }

        let mut reader = io::Cursor::new(buf);
        if Attributes(buf[11]).is_long_name() {
            Ok(DirSlot::LongName(reader.read_le()?))
        } else {
            Ok(DirSlot::Short(reader.read_le()?))
        }
    }
}

/// File or directory, as recorded in the file table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File { cluster_chain: ClusterChain },
    Directory,
}

/// A named entry recovered from a directory.
#[derive(Debug, Clone, Getters)]
#[get = "pub"]
pub struct DirectoryEntry {
    kind: EntryKind,
    /// Long name when one is attached, otherwise the 8.3 name
    name: String,
    extension: String,
    full_path: String,
    attributes: Attributes,
    first_cluster: u32,
    file_size: u32,
    created: Option<NaiveDateTime>,
    modified: Option<NaiveDateTime>,
    accessed: Option<NaiveDate>,
    deleted: bool,
    /// Set when the creation or modification timestamp could not be decoded
    skip: bool,
}

impl DirectoryEntry {
    /// Builds the entry described by `short`, named `name` and located at `full_path`.
    pub fn new(
        short: &ShortEntry,
        name: String,
        full_path: String,
        deleted: bool,
        kind: EntryKind,
    ) -> Self {
        let created = short.created();
        let modified = short.modified();
        let accessed = short.accessed();
        let skip = created.is_err() || modified.is_err();
        let extension = extension_of(&name).to_string();

        Self {
            kind,
            name,
            extension,
            full_path,
            attributes: short.attributes(),
            first_cluster: short.cluster_number(),
            file_size: *short.file_size(),
            created: created.ok(),
            modified: modified.ok(),
            accessed,
            deleted,
            skip,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Clusters holding the file content; `None` for directories.
    pub fn cluster_chain(&self) -> Option<&ClusterChain> {
        match &self.kind {
            EntryKind::File { cluster_chain } => Some(cluster_chain),
            EntryKind::Directory => None,
        }
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.attributes, self.full_path)?;
        match &self.kind {
            EntryKind::File { cluster_chain } => write!(f, "{}B {}", self.file_size, cluster_chain)?,
            EntryKind::Directory => write!(f, "<DIR>")?,
        }
        if let Some(modified) = self.modified {
            write!(f, " {}", modified.format("%Y-%m-%d %H:%M:%S"))?;
        }
        Ok(())
    }
}

/// Text after the last dot of `name`; empty for names without one and for dot files.
fn extension_of(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => "",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    /// 2020-01-01
    pub(crate) const SOME_DATE: u16 = (40 << 9) | (1 << 5) | 1;

    /// Raw 8.3 slot with the given name, attributes and first cluster, created and
    /// modified on [`SOME_DATE`].
    pub(crate) fn short_slot(name: &[u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
        let mut slot = [0u8; 32];
        slot[0..11].copy_from_slice(name);
        slot[11] = attr;
        slot[16..18].copy_from_slice(&SOME_DATE.to_le_bytes());
        slot[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
        slot[24..26].copy_from_slice(&SOME_DATE.to_le_bytes());
        slot[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
        slot[28..32].copy_from_slice(&size.to_le_bytes());
        slot
    }

    /// Raw long name record holding up to 13 characters of `text`.
    pub(crate) fn long_slot(sequence: u8, text: &str, checksum: u8) -> [u8; 32] {
        let mut units: Vec<u16> = text.encode_utf16().collect();
        if units.len() < 13 {
            units.push(0x0000);
        }
        units.resize(13, 0xFFFF);

        let mut slot = [0u8; 32];
        slot[0] = sequence;
        slot[11] = Attributes::LONG_NAME;
        slot[13] = checksum;
        let offsets = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];
        for (unit, offset) in units.iter().zip(offsets) {
            slot[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
        }
        slot
    }

    fn short_of(slot: &[u8]) -> ShortEntry {
        match DirSlot::from_slice(slot).unwrap() {
            DirSlot::Short(entry) => entry,
            other => panic!("expected an 8.3 entry, got {other:?}"),
        }
    }

    #[test]
    fn decodes_short_entry_fields() {
        let entry = short_of(&short_slot(b"README  TXT", 0x20, 0x0001_0005, 1234));
        assert_eq!(entry.short_name().unwrap(), "readme.txt");
        assert_eq!(entry.cluster_number(), 0x0001_0005);
        assert_eq!(*entry.file_size(), 1234);
        assert!(entry.attributes().is_archive());
        assert!(!entry.is_deleted());
    }

    #[test]
    fn short_name_without_extension() {
        let entry = short_of(&short_slot(b"DOCS       ", 0x10, 3, 0));
        assert_eq!(entry.short_name().unwrap(), "docs");
        assert!(entry.attributes().is_directory());
    }

    #[test]
    fn deleted_short_name_is_prefixed() {
        let mut slot = short_slot(b"XOTES   TXT", 0x20, 8, 10);
        slot[0] = DELETED_MARKER;
        let entry = short_of(&slot);
        assert!(entry.is_deleted());
        assert_eq!(entry.short_name().unwrap(), "(deleted)_otes.txt");
    }

    #[test]
    fn computes_short_name_checksum() {
        // Checksum of "FILE    TXT" computed by hand with the rotate-and-add rule
        let entry = short_of(&short_slot(b"FILE    TXT", 0x20, 3, 0));
        let mut sum = 0u8;
        for b in b"FILE    TXT" {
            sum = sum.rotate_right(1).wrapping_add(*b);
        }
        assert_eq!(entry.checksum(), sum);
    }

    #[test]
    fn recognises_dot_entries() {
        assert!(short_of(&short_slot(b".          ", 0x10, 3, 0)).is_dot_entry());
        assert!(short_of(&short_slot(b"..         ", 0x10, 0, 0)).is_dot_entry());
        assert!(!short_of(&short_slot(b".HIDDEN    ", 0x20, 4, 0)).is_dot_entry());
    }

    #[test]
    fn end_of_directory_slot() {
        assert!(matches!(DirSlot::from_slice(&[0u8; 32]).unwrap(), DirSlot::End));
    }

    #[test]
    fn long_name_fragment_stops_at_terminator() {
        let slot = long_slot(0x41, "notes.md", 0x12);
        match DirSlot::from_slice(&slot).unwrap() {
            DirSlot::LongName(entry) => {
                assert_eq!(*entry.sequence(), 0x41);
                assert_eq!(*entry.checksum(), 0x12);
                assert_eq!(entry.fragment().unwrap(), "notes.md");
            }
            other => panic!("expected a long name record, got {other:?}"),
        }
    }

    #[test]
    fn full_long_name_fragment() {
        let slot = long_slot(0x01, "abcdefghijklm", 0);
        let DirSlot::LongName(entry) = DirSlot::from_slice(&slot).unwrap() else {
            panic!("expected a long name record");
        };
        assert_eq!(entry.fragment().unwrap(), "abcdefghijklm");
    }

    #[test]
    fn unpaired_surrogate_fails_to_decode() {
        let mut slot = long_slot(0x41, "a", 0);
        slot[1..3].copy_from_slice(&0xD800u16.to_le_bytes());
        let DirSlot::LongName(entry) = DirSlot::from_slice(&slot).unwrap() else {
            panic!("expected a long name record");
        };
        assert!(entry.fragment().is_err());
    }

    #[test]
    fn decodes_timestamps() {
        let mut slot = short_slot(b"A       BIN", 0x20, 3, 0);
        // 2021-06-15 13:45:30.5
        let date: u16 = (41 << 9) | (6 << 5) | 15;
        let time: u16 = (13 << 11) | (45 << 5) | 15;
        slot[13] = 50;
        slot[14..16].copy_from_slice(&time.to_le_bytes());
        slot[16..18].copy_from_slice(&date.to_le_bytes());
        slot[18..20].copy_from_slice(&date.to_le_bytes());
        slot[22..24].copy_from_slice(&time.to_le_bytes());
        slot[24..26].copy_from_slice(&date.to_le_bytes());

        let entry = short_of(&slot);
        let created = entry.created().unwrap();
        assert_eq!((created.year(), created.month(), created.day()), (2021, 6, 15));
        assert_eq!((created.hour(), created.minute(), created.second()), (13, 45, 30));
        assert_eq!(created.nanosecond(), 500_000_000);
        assert_eq!(entry.modified().unwrap().second(), 30);
        assert_eq!(entry.accessed().unwrap().month(), 6);
        assert!(entry.timestamp_error().is_none());
    }

    fn file_entry(entry: &ShortEntry) -> DirectoryEntry {
        DirectoryEntry::new(
            entry,
            "a.bin".to_string(),
            "/a.bin".to_string(),
            false,
            EntryKind::File {
                cluster_chain: ClusterChain::new(),
            },
        )
    }

    #[test]
    fn zero_dates_are_invalid() {
        let mut slot = short_slot(b"A       BIN", 0x20, 3, 0);
        slot[16..18].fill(0);
        let entry = short_of(&slot);
        assert!(entry.created().is_err());
        assert!(entry.modified().is_ok());
        assert!(*file_entry(&entry).skip());

        let mut slot = short_slot(b"A       BIN", 0x20, 3, 0);
        slot[24..26].fill(0);
        let entry = short_of(&slot);
        assert!(entry.modified().is_err());
        assert!(entry.timestamp_error().is_some());
        assert!(*file_entry(&entry).skip());
    }

    #[test]
    fn month_or_day_zero_is_invalid() {
        for date in [(41u16 << 9) | 15, (41 << 9) | (6 << 5)] {
            let mut slot = short_slot(b"A       BIN", 0x20, 3, 0);
            slot[24..26].copy_from_slice(&date.to_le_bytes());
            assert!(*file_entry(&short_of(&slot)).skip());
        }
    }

    #[test]
    fn access_date_never_skips() {
        let mut slot = short_slot(b"A       BIN", 0x20, 3, 0);
        // Month 13
        let date: u16 = (41 << 9) | (13 << 5) | 1;
        slot[18..20].copy_from_slice(&date.to_le_bytes());
        let entry = short_of(&slot);
        assert_eq!(entry.accessed(), None);
        assert!(entry.timestamp_error().is_none());

        let dir_entry = file_entry(&entry);
        assert!(!*dir_entry.skip());
        assert_eq!(*dir_entry.accessed(), None);
        assert!(dir_entry.created().is_some());
    }

    #[test]
    fn invalid_dates_are_reported() {
        let mut slot = short_slot(b"A       BIN", 0x20, 3, 0);
        // Month 13
        let date: u16 = (41 << 9) | (13 << 5) | 1;
        slot[24..26].copy_from_slice(&date.to_le_bytes());
        let entry = short_of(&slot);
        assert!(entry.modified().is_err());
        assert!(entry.timestamp_error().is_some());
        assert!(*file_entry(&entry).skip());
    }

    #[test]
    fn extension_follows_the_last_dot() {
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".bashrc"), "");
    }

    #[test]
    fn displays_attribute_flags() {
        assert_eq!(Attributes::new(0x12).to_string(), "-H--D-");
        assert!(Attributes::new(0x0F).is_long_name());
        assert!(!Attributes::new(0x0F).is_volume_label());
        assert!(Attributes::new(0x08).is_volume_label());
    }
}
