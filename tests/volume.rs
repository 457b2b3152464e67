mod common;

use common::*;
use fat_inspect::block_source::SectorAlignedReader;
use fat_inspect::filesystem::diagnostic::{Diagnostic, DiagnosticKind};
use fat_inspect::filesystem::fat::VolumeOptions;
use fat_inspect::filesystem::fat_error::FATError;
use fat_inspect::traits::LayoutDisplay;
use fat_inspect::{Fat32Volume, open_fat32_volume};

use chrono::{Datelike, Timelike};

/// Root with a label, a long-named file, a subdirectory and a deleted file.
fn sample_volume() -> VolumeBuilder {
    let mut builder = VolumeBuilder::new();
    builder.chain(&[3]).chain(&[10, 11, 12, 20]).chain(&[30]);

    // 2023-03-14 09:26:52
    let date = (43 << 9) | (3 << 5) | 14;
    let time = (9 << 11) | (26 << 5) | 26;

    let mut root = vec![short_entry(b"EVIDENCE   ", ATTR_VOLUME, 0, 0)];
    root.extend(named_entry(
        "Quarterly Report.docx",
        with_modified(short_entry(b"QUARTE~1DOC", ATTR_ARCHIVE, 10, 1500), date, time),
    ));
    root.push(short_entry(b"PHOTOS     ", ATTR_DIR, 3, 0));
    let mut deleted = short_entry(b"XLDLOG  TXT", ATTR_ARCHIVE, 40, 12);
    deleted[0] = 0xE5;
    root.push(deleted);
    builder.directory(&[ROOT_CLUSTER], &root);

    let mut photos = vec![
        short_entry(b".          ", ATTR_DIR, 3, 0),
        short_entry(b"..         ", ATTR_DIR, 0, 0),
    ];
    photos.extend(named_entry(
        "beach day.jpg",
        short_entry(b"BEACHD~1JPG", ATTR_ARCHIVE, 30, 100),
    ));
    builder.directory(&[3], &photos);

    builder
}

#[test]
fn opens_the_boot_region() {
    let volume = open_fat32_volume(sample_volume().build(), 0).unwrap();

    assert_eq!(*volume.bpb().bytes_per_sec(), 512);
    assert_eq!(*volume.bpb().root_clus(), ROOT_CLUSTER);
    assert_eq!(volume.bpb().volume_label(), "EVIDENCE");
    assert_eq!(*volume.fs_info().free_count(), 60_000);
    assert_eq!(*volume.fs_info().nxt_free(), 40);
    assert_eq!(volume.data_offset(), DATA_OFFSET);
    assert_eq!(volume.cluster_address(5), DATA_OFFSET + 3 * BPS);
    assert!(volume.second_fat().is_none());
}

#[test]
fn walks_the_directory_tree() {
    let mut volume = open_fat32_volume(sample_volume().build(), 0).unwrap();
    let mut diagnostics = vec![];
    let table = volume
        .read_file_table_with(&mut |d: Diagnostic| diagnostics.push(d))
        .unwrap();

    assert_eq!(
        table.files().keys().collect::<Vec<_>>(),
        vec!["/Quarterly Report.docx", "/photos/beach day.jpg"]
    );
    assert_eq!(
        table.directories().keys().collect::<Vec<_>>(),
        vec!["/", "/photos"]
    );

    let report = table.file("/Quarterly Report.docx").unwrap();
    assert_eq!(report.cluster_chain().unwrap().to_string(), "[10-12, 20]");
    assert_eq!(*report.file_size(), 1500);
    assert_eq!(report.extension(), "docx");
    let modified = report.modified().unwrap();
    assert_eq!((modified.year(), modified.month(), modified.day()), (2023, 3, 14));
    assert_eq!((modified.hour(), modified.minute(), modified.second()), (9, 26, 52));

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].kind(),
        &DiagnosticKind::VolumeLabel("EVIDENCE".to_string())
    );
}

#[test]
fn directories_spanning_fragmented_chains() {
    let mut builder = VolumeBuilder::new();
    builder.chain(&[4, 9]);
    builder.directory(&[ROOT_CLUSTER], &[short_entry(b"MANY       ", ATTR_DIR, 4, 0)]);
    let files: Vec<[u8; 32]> = (0..20u32)
        .map(|i| {
            let name = format!("FILE{i:02}  TXT");
            let mut raw = [0u8; 11];
            raw.copy_from_slice(name.as_bytes());
            short_entry(&raw, ATTR_ARCHIVE, 0, i)
        })
        .collect();
    builder.directory(&[4, 9], &files);

    let mut volume = open_fat32_volume(builder.build(), 0).unwrap();
    let mut diagnostics = vec![];
    let table = volume
        .read_file_table_with(&mut |d: Diagnostic| diagnostics.push(d))
        .unwrap();

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(table.files().len(), 20);
    assert_eq!(*table.file("/many/file19.txt").unwrap().file_size(), 19);
    assert_eq!(table.directory("/many").unwrap().to_string(), "[4, 9]");
}

#[test]
fn chains_cover_every_allocated_cluster() {
    let mut builder = sample_volume();
    builder.chain(&[100, 101, 50, 51]);
    builder.fat[60] = 0x0FFF_FFF7;
    let volume = open_fat32_volume(builder.build(), 0).unwrap();

    let allocated = builder.fat[2..]
        .iter()
        .filter(|e| **e != 0 && **e & 0x0FFF_FFFF != 0x0FFF_FFF7)
        .count() as u64;
    let covered: u64 = volume.fat().chains().map(|(_, c)| c.cluster_count()).sum();
    assert_eq!(covered, allocated);
    assert_eq!(*volume.fat().bad_count(), 1);
    assert_eq!(
        volume.fat().resolve(100).to_string(),
        "[100-101, 50-51]"
    );
}

#[test]
fn volume_at_an_offset() {
    let offset = 2048 * BPS;
    let mut file = tempfile::tempfile().unwrap();
    sample_volume().write_to(&mut file, offset);

    let mut volume = Fat32Volume::open(file, offset).unwrap();
    assert_eq!(volume.cluster_address(2), offset + DATA_OFFSET);
    let table = volume.read_file_table().unwrap();
    assert!(table.file("/photos/beach day.jpg").is_some());
}

#[test]
fn reads_through_a_sector_aligned_source() {
    let source = SectorAlignedReader::new(sample_volume().build(), 512);
    let mut volume = open_fat32_volume(source, 0).unwrap();
    let table = volume.read_file_table().unwrap();
    assert_eq!(table.files().len(), 2);
}

#[test]
fn compares_the_second_fat_on_request() {
    let mut builder = sample_volume();
    let mut second = builder.fat.clone();
    second[30] = 31;
    second[31] = EOC;
    builder.second_fat = Some(second);

    let options = VolumeOptions {
        read_second_fat: true,
        ..VolumeOptions::default()
    };
    let volume = Fat32Volume::open_with(builder.build(), 0, options).unwrap();
    let second = volume.second_fat().as_ref().unwrap();
    assert!(!second.same_chains(volume.fat()));
    assert_eq!(volume.fat().resolve(30).cluster_count(), 1);
}

#[test]
fn identical_fat_copies_agree() {
    let options = VolumeOptions {
        read_second_fat: true,
        ..VolumeOptions::default()
    };
    let volume = Fat32Volume::open_with(sample_volume().build(), 0, options).unwrap();
    assert!(volume.second_fat().as_ref().unwrap().same_chains(volume.fat()));
}

#[test]
fn rejects_a_boot_sector_without_signature() {
    let mut file = sample_volume().build();
    write_at(&mut file, 510, &[0, 0]);
    assert!(matches!(
        open_fat32_volume(file, 0),
        Err(FATError::MalformedBootSector(_))
    ));
}

#[test]
fn rejects_a_fat_larger_than_the_volume() {
    let mut builder = sample_volume();
    builder.boot_sector[36..40].copy_from_slice(&0x8000_0001u32.to_le_bytes());
    assert!(matches!(
        open_fat32_volume(builder.build(), 0),
        Err(FATError::InvalidFatSz(_))
    ));
}

#[test]
fn rejects_zero_sectors_per_cluster_without_validation() {
    let mut builder = sample_volume();
    builder.boot_sector[13] = 0;
    let options = VolumeOptions {
        validate_bpb: false,
        ..VolumeOptions::default()
    };
    assert!(matches!(
        Fat32Volume::open_with(builder.build(), 0, options),
        Err(FATError::InvalidSecPerClus(0))
    ));
}

#[test]
fn rejects_a_damaged_fs_info_sector() {
    let mut file = sample_volume().build();
    write_at(&mut file, BPS, &[0u8; 4]);
    assert!(matches!(
        open_fat32_volume(file, 0),
        Err(FATError::InvalidFsInfoSignature(_))
    ));
}

#[test]
fn rejects_a_corrupt_fat_header() {
    let mut builder = sample_volume();
    builder.fat[1] = 0x1234_5678;
    assert!(matches!(
        open_fat32_volume(builder.build(), 0),
        Err(FATError::CorruptFatHeader { entry: 1, .. })
    ));
}

#[test]
fn lays_out_the_volume() {
    let volume = open_fat32_volume(sample_volume().build(), 0)
        .unwrap()
        .with_partition_sectors(TOT_SEC + 100);
    let layout = volume.display_layout(0).unwrap();
    assert!(layout.contains("FAT #0"));
    assert!(layout.contains("FAT #1"));
    assert!(layout.contains("Volume slack"));
}

#[test]
fn stops_at_the_directory_limit() {
    let options = VolumeOptions {
        max_directories: Some(1),
        ..VolumeOptions::default()
    };
    let mut volume = Fat32Volume::open_with(sample_volume().build(), 0, options).unwrap();
    let mut diagnostics = vec![];
    let table = volume
        .read_file_table_with(&mut |d: Diagnostic| diagnostics.push(d))
        .unwrap();

    assert!(table.file("/Quarterly Report.docx").is_some());
    assert!(table.file("/photos/beach day.jpg").is_none());
    assert!(
        diagnostics
            .iter()
            .any(|d| matches!(d.kind(), DiagnosticKind::TraversalLimit { .. }))
    );
}
