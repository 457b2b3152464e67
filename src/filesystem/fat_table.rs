//! File Allocation Table decoding and cluster chain resolution.
//!
//! The raw table is a flat array of 32-bit slots in which slot `n` names the cluster
//! following `n`. It is turned into a map from chain head to [`ClusterChain`] in a
//! single forward sweep: instead of following pointers, the head a cluster belongs to
//! is carried forward to the slot of its successor, which is always visited later
//! when the chain is written in ascending order.

use getset::Getters;
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{self, Read};

use super::cluster_chain::{ClusterChain, ClusterRange};
use super::fat_error::FATError;
use crate::utils::{read_up_to, u32_at};

/// Masked value shared by every end-of-chain marker.
pub const EOC_MAGIC: u32 = 0x0FFF_FFF8;
/// Only the low 28 bits of a FAT32 slot are meaningful.
pub const CLUSTER_MASK: u32 = 0x0FFF_FFFF;
/// Marker of a cluster flagged as unusable.
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;
/// Values accepted for the second reserved entry.
pub const RESERVED_ENTRY_VALUES: [u32; 2] = [0xFFFF_FFFF, 0x0FFF_FFFF];

const FAT_ENTRY_SIZE: usize = 4;

/// Returns true if a FAT slot value marks the end of a chain.
pub fn is_eoc(value: u32) -> bool {
    value & EOC_MAGIC == EOC_MAGIC
}

/// Decoded File Allocation Table.
///
/// Built once from the raw table and never modified afterwards.
#[derive(Debug, Default, Getters)]
pub struct FatTable {
    /// Chains keyed by their head cluster
    chains: HashMap<u32, ClusterChain>,
    /// Head of the chain every non-head cluster belongs to
    owners: HashMap<u32, u32>,
    /// Number of slots in the table, reserved ones included
    #[get = "pub"]
    entry_count: u32,
    /// Number of end-of-chain markers met
    #[get = "pub"]
    eoc_count: u32,
    /// Number of clusters marked as bad
    #[get = "pub"]
    bad_count: u32,
}

impl FatTable {
    /// Reads `bytes_per_fat` bytes from the current position of `source` and decodes them.
    ///
    /// # Errors
    /// - `FATError::IOError` if the medium ends before the whole table is read
    /// - `FATError::CorruptFatHeader` if a reserved entry fails validation
    pub fn from_reader<T: Read>(source: &mut T, bytes_per_fat: u64) -> Result<FatTable, FATError> {
        let raw = read_up_to(source, bytes_per_fat as usize)?;
        if (raw.len() as u64) < bytes_per_fat {
            return Err(FATError::IOError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "FAT truncated: {} bytes available out of {bytes_per_fat}",
                    raw.len()
                ),
            )));
        }

        Self::from_bytes(&raw)
    }

    /// Decodes a raw little-endian table.
    pub fn from_bytes(raw: &[u8]) -> Result<FatTable, FATError> {
        let entry_count = (raw.len() / FAT_ENTRY_SIZE) as u32;
        let slot = |i: u32| u32_at(raw, i as usize * FAT_ENTRY_SIZE);

        if entry_count < 2 {
            return Err(FATError::InvalidFatSz(format!(
                "{} bytes cannot hold the two reserved entries",
                raw.len()
            )));
        }
        Self::check_header(slot(0), slot(1))?;

        let mut table = FatTable {
            entry_count,
            ..Default::default()
        };

        let mut cluster_head: HashMap<u32, u32> = HashMap::new();
        for i in 2..entry_count {
            let value = slot(i);
            let head = cluster_head.remove(&i).unwrap_or(i);

            if is_eoc(value) {
                table.eoc_count += 1;
                table
                    .chains
                    .entry(head)
                    .or_insert_with(|| ClusterChain::from_ranges(vec![ClusterRange::single(head)]));
                continue;
            }

            let next = value & CLUSTER_MASK;
            if next == BAD_CLUSTER {
                table.bad_count += 1;
                if head != i {
                    warn!("Chain {head} runs into bad cluster {i}");
                }
                continue;
            }
            if next == 0 {
                if head != i {
                    warn!("Chain {head} runs into free cluster {i}");
                }
                continue;
            }
            if next < 2 || next >= entry_count {
                warn!("Cluster {i} of chain {head} links to out-of-range cluster {next}");
                table
                    .chains
                    .entry(head)
                    .or_insert_with(|| ClusterChain::from_ranges(vec![ClusterRange::single(head)]));
                continue;
            }

            table
                .chains
                .entry(head)
                .or_insert_with(|| ClusterChain::from_ranges(vec![ClusterRange::single(head)]))
                .push(next);
            table.owners.insert(next, head);
            if let Some(other) = cluster_head.insert(next, head) {
                warn!("Cluster {next} is cross-linked between chains {other} and {head}");
            }
        }

        table.stitch_backward_links(cluster_head);

        debug!(
            "Decoded FAT: {} entries, {} chains, {} EOC(s), {} bad cluster(s)",
            table.entry_count,
            table.chains.len(),
            table.eoc_count,
            table.bad_count
        );

        Ok(table)
    }

    fn check_header(first: u32, second: u32) -> Result<(), FATError> {
        if !is_eoc(first) {
            return Err(FATError::CorruptFatHeader {
                entry: 0,
                value: first,
            });
        }
        if !RESERVED_ENTRY_VALUES.contains(&second) {
            return Err(FATError::CorruptFatHeader {
                entry: 1,
                value: second,
            });
        }
        Ok(())
    }

    /// Attaches chains whose link points to a lower slot.
    ///
    /// The sweep only carries heads forward, so when slot `i` links to `c < i`, slot `c`
    /// was already visited as the head of its own chain. Every such leftover is resolved
    /// here by moving the chain headed by `c` to the end of the chain linking to it.
    fn stitch_backward_links(&mut self, leftovers: HashMap<u32, u32>) {
        let mut leftovers: Vec<(u32, u32)> = leftovers.into_iter().collect();
        leftovers.sort_unstable();

        let mut absorbed: HashMap<u32, u32> = HashMap::new();
        for (cluster, head) in leftovers {
            let mut root = head;
            while let Some(&next_root) = absorbed.get(&root) {
                root = next_root;
            }
            if root == cluster {
                warn!("Chain {root} loops back onto itself");
                continue;
            }

            let Some(tail) = self.chains.remove(&cluster) else {
                continue;
            };
            let Some(target) = self.chains.get_mut(&root) else {
                self.chains.insert(cluster, tail);
                continue;
            };

            for c in tail.clusters().skip(1) {
                target.push(c);
                self.owners.insert(c, root);
            }
            self.owners.insert(cluster, root);
            absorbed.insert(cluster, root);
        }
    }

    /// Returns the chain starting at `cluster`.
    ///
    /// - If `cluster` heads a chain, that chain is returned.
    /// - If `cluster` sits in the middle of another chain, the result starts with the
    ///   single range `[cluster, cluster]` followed by the rest of that chain.
    /// - Otherwise (free, reserved or unknown cluster) the chain is empty.
    pub fn resolve(&self, cluster: u32) -> ClusterChain {
        if let Some(chain) = self.chains.get(&cluster) {
            return chain.clone();
        }

        let rest = self
            .owners
            .get(&cluster)
            .and_then(|head| self.chains.get(head))
            .and_then(|chain| chain.after(cluster));

        match rest {
            Some(rest) => {
                let mut ranges = vec![ClusterRange::single(cluster)];
                ranges.extend_from_slice(rest.ranges());
                ClusterChain::from_ranges(ranges)
            }
            None => ClusterChain::new(),
        }
    }

    /// Returns the chain headed by `head`, if any.
    pub fn chain(&self, head: u32) -> Option<&ClusterChain> {
        self.chains.get(&head)
    }

    /// Iterates over `(head, chain)` pairs in no particular order.
    pub fn chains(&self) -> impl Iterator<Item = (u32, &ClusterChain)> {
        self.chains.iter().map(|(head, chain)| (*head, chain))
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Returns true if both tables describe the same chains.
    pub fn same_chains(&self, other: &FatTable) -> bool {
        self.chains == other.chains
    }
}
