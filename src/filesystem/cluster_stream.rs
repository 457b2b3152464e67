//! Sequential reader over the clusters of one chain.
//!
//! Directory data is consumed strictly front to back, one 32-byte slot at a time,
//! so the stream only ever buffers a single cluster and offers no seeking.

use std::io::{Read, Seek, SeekFrom};

use super::cluster_chain::{ClusterChain, Clusters};
use super::fat_error::FATError;
use crate::utils::read_up_to;

/// Location of the data region of a volume on its block source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRegion {
    /// Absolute byte offset of cluster 2
    pub offset: u64,
    pub bytes_per_cluster: u32,
}

impl DataRegion {
    /// Absolute byte offset of the first byte of `cluster`.
    pub fn cluster_address(&self, cluster: u32) -> u64 {
        self.offset + (cluster.saturating_sub(2) as u64) * self.bytes_per_cluster as u64
    }

    /// Absolute byte offset of the `index`-th byte of the data held by `chain`.
    pub fn chain_address(&self, chain: &ClusterChain, index: u64) -> Option<u64> {
        let bpc = self.bytes_per_cluster as u64;
        if bpc == 0 {
            return None;
        }
        let cluster = chain.nth_cluster(index / bpc)?;
        Some(self.cluster_address(cluster) + index % bpc)
    }

    /// Absolute byte offset just past the last cluster of `chain`.
    pub fn chain_end(&self, chain: &ClusterChain) -> Option<u64> {
        let last = chain.ranges().last()?.end;
        Some(self.cluster_address(last) + self.bytes_per_cluster as u64)
    }

    /// Opens a stream over `chain`.
    pub fn stream<'a, T: Read + Seek>(
        &self,
        source: &'a mut T,
        chain: &'a ClusterChain,
    ) -> ClusterStream<'a, T, impl Fn(u32) -> u64 + use<'a, T>> {
        let region = *self;
        ClusterStream::new(
            source,
            chain,
            move |cluster| region.cluster_address(cluster),
            self.bytes_per_cluster as usize,
        )
    }
}

/// Forward-only view over the data of a cluster chain.
///
/// The block source is borrowed for the lifetime of the stream, so only one stream can
/// read from it at a time and the borrow is released when the stream is dropped.
pub struct ClusterStream<'a, T, F>
where
    T: Read + Seek,
    F: Fn(u32) -> u64,
{
    source: &'a mut T,
    clusters: Clusters<'a>,
    cluster_address: F,
    bytes_per_cluster: usize,
    buffer: Vec<u8>,
    pos: usize,
    exhausted: bool,
}

impl<'a, T, F> ClusterStream<'a, T, F>
where
    T: Read + Seek,
    F: Fn(u32) -> u64,
{
    /// Creates a stream over `chain`.
    ///
    /// # Parameters
    /// - `source`: The block source holding the volume
    /// - `chain`: The clusters to read, in order
    /// - `cluster_address`: Maps a cluster number to its absolute byte offset in `source`
    /// - `bytes_per_cluster`: Size in bytes of a cluster
    pub fn new(
        source: &'a mut T,
        chain: &'a ClusterChain,
        cluster_address: F,
        bytes_per_cluster: usize,
    ) -> Self {
        Self {
            source,
            clusters: chain.clusters(),
            cluster_address,
            bytes_per_cluster,
            buffer: vec![],
            pos: 0,
            exhausted: false,
        }
    }

    /// Reads up to `n` bytes.
    ///
    /// Fewer than `n` bytes are returned only when the chain ends in the middle of the
    /// request; callers detect truncation by comparing lengths.
    ///
    /// # Errors
    /// - `FATError::ChainExhausted` if the chain had already ended before this call
    /// - `FATError::IOError` if the block source fails
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, FATError> {
        if self.exhausted {
            return Err(FATError::ChainExhausted);
        }

        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if self.pos == self.buffer.len() && !self.load_next_cluster()? {
                self.exhausted = true;
                if out.is_empty() {
                    return Err(FATError::ChainExhausted);
                }
                break;
            }

            let take = (n - out.len()).min(self.buffer.len() - self.pos);
            out.extend_from_slice(&self.buffer[self.pos..self.pos + take]);
            self.pos += take;
        }

        Ok(out)
    }

    /// Refills the buffer with the next cluster. Returns false once the chain is over.
    fn load_next_cluster(&mut self) -> Result<bool, FATError> {
        let Some(cluster) = self.clusters.next() else {
            return Ok(false);
        };

        self.source
            .seek(SeekFrom::Start((self.cluster_address)(cluster)))?;
        self.buffer = read_up_to(self.source, self.bytes_per_cluster)?;
        self.pos = 0;

        // The medium ended inside the cluster, nothing further can be read
        Ok(!self.buffer.is_empty())
    }

    /// Cluster streams are sequential only.
    pub fn seek(&mut self, _pos: SeekFrom) -> Result<u64, FATError> {
        Err(FATError::UnsupportedOperation("seek"))
    }

    /// Cluster streams are sequential only.
    pub fn tell(&self) -> Result<u64, FATError> {
        Err(FATError::UnsupportedOperation("tell"))
    }
}
