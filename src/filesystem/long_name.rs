//! Reassembly of long file names.
//!
//! Long name records precede the 8.3 entry they belong to, last fragment first.
//! The accumulator prepends each fragment it is fed and hands the complete name
//! over when the 8.3 entry arrives.

use super::dir_entry::{DELETED_MARKER, LongNameEntry};

/// Sequence bit set on the first stored record of a long name.
pub const LAST_LONG_ENTRY: u8 = 0x40;

/// Position of the parser relative to long name records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfnState {
    /// Nothing seen yet in this directory.
    Start,
    /// Inside a run of long name records.
    LongName,
    /// The last slot was an 8.3 entry.
    DosEntry,
}

/// Side effects of accepting a long name record.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Accepted {
    /// Name in progress discarded because a new long name started.
    pub overwritten: Option<String>,
    /// The fragment of this record could not be decoded.
    pub decode_failed: bool,
}

/// A continuation record whose checksum differs from the one of the name in progress.
#[derive(Debug, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub expected: u8,
    pub found: u8,
}

/// A reassembled long name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongName {
    pub name: String,
    pub checksum: u8,
    pub deleted: bool,
    /// At least one fragment failed to decode, `name` is incomplete.
    pub broken: bool,
}

#[derive(Debug)]
pub struct LongNameAccumulator {
    state: LfnState,
    name: String,
    checksum: u8,
    deleted: bool,
    broken: bool,
}

impl Default for LongNameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl LongNameAccumulator {
    pub fn new() -> Self {
        Self {
            state: LfnState::Start,
            name: String::new(),
            checksum: 0,
            deleted: false,
            broken: false,
        }
    }

    pub fn state(&self) -> LfnState {
        self.state
    }

    fn reset(&mut self) {
        self.name.clear();
        self.checksum = 0;
        self.deleted = false;
        self.broken = false;
    }

    /// Feeds one long name record.
    ///
    /// A deleted record (sequence `0xE5`) opens a new name unless one is already in
    /// progress, and marks the name as deleted. A record with the `0x40` bit always opens
    /// a new name. Any other record continues the name in progress and must share its
    /// checksum.
    ///
    /// # Errors
    /// - `ChecksumMismatch` for a continuation record with a foreign checksum. The
    ///   accumulator is left untouched.
    pub fn feed(&mut self, entry: &LongNameEntry) -> Result<Accepted, ChecksumMismatch> {
        let sequence = *entry.sequence();
        let checksum = *entry.checksum();
        let mut accepted = Accepted::default();

        if sequence == DELETED_MARKER {
            if self.state != LfnState::LongName {
                self.reset();
                self.checksum = checksum;
            }
            self.deleted = true;
        } else if sequence & LAST_LONG_ENTRY != 0 {
            if self.state == LfnState::LongName {
                accepted.overwritten = Some(self.name.clone());
            }
            self.reset();
            self.checksum = checksum;
        } else if checksum != self.checksum {
            return Err(ChecksumMismatch {
                expected: self.checksum,
                found: checksum,
            });
        }

        self.state = LfnState::LongName;
        match entry.fragment() {
            Ok(fragment) => self.name.insert_str(0, &fragment),
            Err(_) => {
                self.broken = true;
                accepted.decode_failed = true;
            }
        }

        Ok(accepted)
    }

    /// Called on every 8.3 entry. Returns the long name gathered for it, if any, and
    /// clears the accumulator.
    pub fn finish(&mut self) -> Option<LongName> {
        let name = (self.state == LfnState::LongName).then(|| LongName {
            name: std::mem::take(&mut self.name),
            checksum: self.checksum,
            deleted: self.deleted,
            broken: self.broken,
        });
        self.reset();
        self.state = LfnState::DosEntry;
        name
    }
}
