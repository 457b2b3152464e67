//! Compact representation of cluster chains.
//!
//! A chain is stored as the ordered list of runs of contiguous clusters it visits,
//! so a file written in one piece costs a single [`ClusterRange`] whatever its size.

use std::fmt;

/// Inclusive run `[start, end]` of contiguous cluster numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterRange {
    pub start: u32,
    pub end: u32,
}

impl ClusterRange {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn single(cluster: u32) -> Self {
        Self::new(cluster, cluster)
    }

    /// Number of clusters in the run.
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, cluster: u32) -> bool {
        (self.start..=self.end).contains(&cluster)
    }
}

impl fmt::Display for ClusterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Ordered sequence of cluster ranges holding one file or directory.
///
/// Ranges are kept in traversal order. Appending a cluster that directly follows
/// the last range extends it instead of opening a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterChain {
    ranges: Vec<ClusterRange>,
}

impl ClusterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain from ranges taken as-is, without merging.
    pub fn from_ranges(ranges: Vec<ClusterRange>) -> Self {
        Self { ranges }
    }

    /// Appends the next cluster visited by the chain.
    pub fn push(&mut self, cluster: u32) {
        match self.ranges.last_mut() {
            Some(last) if last.end.checked_add(1) == Some(cluster) => last.end = cluster,
            _ => self.ranges.push(ClusterRange::single(cluster)),
        }
    }

    pub fn ranges(&self) -> &[ClusterRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of clusters visited by the chain.
    pub fn cluster_count(&self) -> u64 {
        self.ranges.iter().map(|r| r.len() as u64).sum()
    }

    /// The first cluster of the chain.
    pub fn first(&self) -> Option<u32> {
        self.ranges.first().map(|r| r.start)
    }

    pub fn contains(&self, cluster: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(cluster))
    }

    /// Returns the `n`-th cluster visited by the chain (0-based).
    pub fn nth_cluster(&self, mut n: u64) -> Option<u32> {
        for range in &self.ranges {
            if n < range.len() as u64 {
                return Some(range.start + n as u32);
            }
            n -= range.len() as u64;
        }
        None
    }

    /// Part of the chain visited strictly after the first occurrence of `cluster`.
    pub fn after(&self, cluster: u32) -> Option<ClusterChain> {
        let idx = self.ranges.iter().position(|r| r.contains(cluster))?;

        let mut rest = vec![];
        let current = self.ranges[idx];
        if cluster < current.end {
            rest.push(ClusterRange::new(cluster + 1, current.end));
        }
        rest.extend_from_slice(&self.ranges[idx + 1..]);

        Some(ClusterChain::from_ranges(rest))
    }

    /// Iterates over every cluster of the chain, in traversal order.
    pub fn clusters(&self) -> Clusters<'_> {
        Clusters {
            ranges: self.ranges.iter(),
            current: None,
        }
    }
}

impl fmt::Display for ClusterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{range}")?;
        }
        write!(f, "]")
    }
}

/// Lazy iterator flattening the ranges of a chain into cluster numbers.
pub struct Clusters<'a> {
    ranges: std::slice::Iter<'a, ClusterRange>,
    current: Option<std::ops::RangeInclusive<u32>>,
}

impl Iterator for Clusters<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some(cluster) = self.current.as_mut().and_then(|r| r.next()) {
                return Some(cluster);
            }
            let range = self.ranges.next()?;
            self.current = Some(range.start..=range.end);
        }
    }
}
