//! FAT32 volume reading.
//!
//! From the bottom up: the boot region ([`bpb`]), the allocation table compressed into
//! cluster chains ([`fat_table`], [`cluster_chain`]), a sequential reader over a chain
//! ([`cluster_stream`]), directory slots and long names ([`dir_entry`], [`long_name`]),
//! and the breadth-first walk producing a [`file_table::FileTable`]. [`fat`] ties them
//! together behind [`fat::Fat32Volume`].

pub mod bpb;
pub mod cluster_chain;
pub mod cluster_stream;
pub mod diagnostic;
pub mod dir_entry;
pub mod fat;
pub mod fat_error;
pub mod fat_table;
pub mod fat_type;
pub mod file_table;
pub mod long_name;
