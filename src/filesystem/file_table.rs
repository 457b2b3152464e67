//! Breadth-first walk of the directory tree.
//!
//! Starting at the root cluster, every directory is read through a
//! [`ClusterStream`](super::cluster_stream::ClusterStream) and its entries are
//! decoded slot by slot. Subdirectories are queued and walked in FIFO order, files
//! are recorded together with their resolved cluster chain.

use log::{debug, info};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::{Read, Seek};

use super::cluster_chain::ClusterChain;
use super::cluster_stream::DataRegion;
use super::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink};
use super::dir_entry::{DIR_ENTRY_SIZE, DirSlot, DirectoryEntry, EntryKind, ShortEntry};
use super::fat_error::FATError;
use super::fat_table::FatTable;
use super::long_name::{LongName, LongNameAccumulator};

/// Directories holding this text in their path (case-insensitively) are not walked.
const SYSTEM_DIRECTORY: &str = "system volume information";

/// Every live file and directory found on a volume, keyed by absolute path.
#[derive(Debug, Default, Clone)]
pub struct FileTable {
    files: BTreeMap<String, DirectoryEntry>,
    directories: BTreeMap<String, ClusterChain>,
}

impl FileTable {
    pub fn files(&self) -> &BTreeMap<String, DirectoryEntry> {
        &self.files
    }

    /// Path of every directory mapped to the clusters holding its entries.
    pub fn directories(&self) -> &BTreeMap<String, ClusterChain> {
        &self.directories
    }

    pub fn file(&self, path: &str) -> Option<&DirectoryEntry> {
        self.files.get(path)
    }

    pub fn directory(&self, path: &str) -> Option<&ClusterChain> {
        self.directories.get(path)
    }

    /// Renders the table as an indented tree, directories before their content.
    pub fn tree(&self) -> String {
        let mut paths: Vec<(&str, String)> = self
            .directories
            .keys()
            .map(|p| (p.as_str(), format!("{}/", name_of(p))))
            .chain(self.files.iter().map(|(p, entry)| {
                let size = entry.file_size();
                let chain = entry
                    .cluster_chain()
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                (p.as_str(), format!("{} ({size}B) {chain}", name_of(p)))
            }))
            .collect();
        paths.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        for (path, line) in paths {
            let depth = path.matches('/').count().saturating_sub(1);
            let depth = if path == "/" { 0 } else { depth + 1 };
            out.push_str(&format!("{}{}\n", "  ".repeat(depth), line));
        }
        out
    }
}

fn name_of(path: &str) -> &str {
    if path == "/" {
        return "";
    }
    path.rsplit('/').next().unwrap_or(path)
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// A directory waiting to be walked.
#[derive(Debug)]
struct DirTask {
    path: String,
    first_cluster: u32,
    chain: ClusterChain,
    deleted: bool,
}

/// State of one walk over a volume.
pub struct Traversal<'a, S: DiagnosticSink> {
    fat: &'a FatTable,
    region: DataRegion,
    sink: &'a mut S,
    max_directories: Option<usize>,
    queue: VecDeque<DirTask>,
    visited: HashSet<u32>,
    table: FileTable,
}

impl<'a, S: DiagnosticSink> Traversal<'a, S> {
    /// # Parameters
    /// - `fat`: The decoded allocation table of the volume
    /// - `region`: Where the data clusters live on the block source
    /// - `sink`: Receives every diagnostic raised by the walk
    /// - `max_directories`: Stops the walk after this many directories when set
    pub fn new(
        fat: &'a FatTable,
        region: DataRegion,
        sink: &'a mut S,
        max_directories: Option<usize>,
    ) -> Self {
        Self {
            fat,
            region,
            sink,
            max_directories,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            table: FileTable::default(),
        }
    }

    /// Walks the tree rooted at `root_cluster` and returns the table of every live entry.
    ///
    /// # Errors
    /// Only failures of the block source abort the walk. Damaged directories raise
    /// diagnostics instead.
    pub fn walk<T: Read + Seek>(
        mut self,
        source: &mut T,
        root_cluster: u32,
    ) -> Result<FileTable, FATError> {
        let root_chain = self.fat.resolve(root_cluster);
        self.table
            .directories
            .insert("/".to_string(), root_chain.clone());
        self.queue.push_back(DirTask {
            path: "/".to_string(),
            first_cluster: root_cluster,
            chain: root_chain,
            deleted: false,
        });

        let mut walked = 0usize;
        while let Some(task) = self.queue.pop_front() {
            if task.deleted {
                debug!("Not walking deleted directory {}", task.path);
                continue;
            }
            if task.path.to_lowercase().contains(SYSTEM_DIRECTORY) {
                debug!("Not walking system directory {}", task.path);
                continue;
            }
            if task.chain.is_empty() {
                debug!("Directory {} owns no cluster", task.path);
                continue;
            }
            if !self.visited.insert(task.first_cluster) {
                self.report(
                    &task.path,
                    None,
                    DiagnosticKind::CyclicDirectory {
                        cluster: task.first_cluster,
                    },
                );
                continue;
            }
            if self.max_directories.is_some_and(|max| walked >= max) {
                self.report(
                    &task.path,
                    None,
                    DiagnosticKind::TraversalLimit {
                        pending: self.queue.len() + 1,
                    },
                );
                break;
            }

            walked += 1;
            debug!("Walking {} {}", task.path, task.chain);
            self.parse_directory(source, &task)?;
        }

        info!(
            "Found {} files in {} directories",
            self.table.files.len(),
            self.table.directories.len()
        );
        Ok(self.table)
    }

    fn report(&mut self, path: &str, offset: Option<u64>, kind: DiagnosticKind) {
        self.sink.report(Diagnostic::new(path, offset, kind));
    }

    /// Reads the slots of one directory until its end marker.
    fn parse_directory<T: Read + Seek>(
        &mut self,
        source: &mut T,
        task: &DirTask,
    ) -> Result<(), FATError> {
        let region = self.region;
        let slot_address = |slot: u64| region.chain_address(&task.chain, slot * DIR_ENTRY_SIZE as u64);

        let mut stream = region.stream(source, &task.chain);
        let mut long_name = LongNameAccumulator::new();
        let mut slot = 0u64;

        loop {
            let raw = match stream.read_bytes(DIR_ENTRY_SIZE) {
                Ok(raw) => raw,
                Err(FATError::ChainExhausted) => {
                    // The missing slot lies past the chain, point at where it would start
                    let offset = slot_address(slot).or_else(|| region.chain_end(&task.chain));
                    self.report(&task.path, offset, DiagnosticKind::Truncated { bytes_read: 0 });
                    break;
                }
                Err(err) => return Err(err),
            };
            if raw.len() < DIR_ENTRY_SIZE {
                self.report(
                    &task.path,
                    slot_address(slot),
                    DiagnosticKind::Truncated {
                        bytes_read: raw.len(),
                    },
                );
                break;
            }

            match DirSlot::from_slice(&raw)? {
                DirSlot::End => break,
                DirSlot::LongName(entry) => match long_name.feed(&entry) {
                    Ok(accepted) => {
                        if let Some(discarded) = accepted.overwritten {
                            self.report(
                                &task.path,
                                slot_address(slot),
                                DiagnosticKind::OverwrittenLongName { discarded },
                            );
                        }
                        if accepted.decode_failed {
                            self.report(&task.path, slot_address(slot), DiagnosticKind::NameDecode);
                        }
                    }
                    Err(mismatch) => {
                        self.report(
                            &task.path,
                            slot_address(slot),
                            DiagnosticKind::ChecksumMismatch {
                                expected: mismatch.expected,
                                found: mismatch.found,
                            },
                        );
                        break;
                    }
                },
                DirSlot::Short(entry) => {
                    let name = long_name.finish();
                    self.record_entry(task, &entry, name, slot_address(slot));
                }
            }
            slot += 1;
        }

        Ok(())
    }

    /// Picks the displayed name of an 8.3 entry, preferring its long name.
    ///
    /// Returns `None` when no usable name exists; such entries are dropped.
    fn entry_name(
        &mut self,
        task: &DirTask,
        entry: &ShortEntry,
        long_name: Option<LongName>,
        offset: Option<u64>,
    ) -> Option<String> {
        match long_name {
            Some(long) if long.broken => None,
            Some(long) if entry.is_deleted() || long.deleted || long.checksum == entry.checksum() => {
                Some(long.name)
            }
            Some(long) => {
                self.report(
                    &task.path,
                    offset,
                    DiagnosticKind::LongNameMismatch {
                        long_name: long.name,
                    },
                );
                self.short_name(task, entry, offset)
            }
            None => self.short_name(task, entry, offset),
        }
    }

    fn short_name(&mut self, task: &DirTask, entry: &ShortEntry, offset: Option<u64>) -> Option<String> {
        match entry.short_name() {
            Ok(name) => Some(name),
            Err(_) => {
                self.report(&task.path, offset, DiagnosticKind::NameDecode);
                None
            }
        }
    }

    /// Records one 8.3 entry, queueing it when it is a directory.
    fn record_entry(
        &mut self,
        task: &DirTask,
        entry: &ShortEntry,
        long_name: Option<LongName>,
        offset: Option<u64>,
    ) {
        if entry.is_dot_entry() {
            return;
        }
        let deleted = entry.is_deleted() || long_name.as_ref().is_some_and(|l| l.deleted);

        let attributes = entry.attributes();
        if attributes.is_volume_label() && !attributes.is_directory() {
            if let Ok(label) = entry.short_name() {
                self.report(
                    &task.path,
                    offset,
                    DiagnosticKind::VolumeLabel(label.to_uppercase()),
                );
            }
            return;
        }

        let Some(name) = self.entry_name(task, entry, long_name, offset) else {
            return;
        };
        let path = join_path(&task.path, &name);

        if let Some(detail) = entry.timestamp_error() {
            self.report(&task.path, offset, DiagnosticKind::InvalidTimestamp(detail));
        }

        let first_cluster = entry.cluster_number();
        let chain = self.fat.resolve(first_cluster);

        if attributes.is_directory() {
            let dir_entry =
                DirectoryEntry::new(entry, name, path.clone(), deleted, EntryKind::Directory);
            debug!("{dir_entry}");
            if !dir_entry.skip() && !deleted {
                self.table.directories.insert(path.clone(), chain.clone());
            }
            self.queue.push_back(DirTask {
                path,
                first_cluster,
                chain,
                deleted,
            });
        } else {
            let dir_entry = DirectoryEntry::new(
                entry,
                name,
                path.clone(),
                deleted,
                EntryKind::File {
                    cluster_chain: chain,
                },
            );
            if !dir_entry.skip() && !deleted {
                self.table.files.insert(path, dir_entry);
            }
        }
    }
}
