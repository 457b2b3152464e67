//! This is the main entry point of the FAT32 inspector.
//!
//! The program provides an interactive command-line interface over raw disk images.
//! Users can open an image, print its layout, select a partition and list the files
//! of its FAT32 volume. The image is never written to.

use fat_inspect::commands::Command;
use fat_inspect::filesystem::fat::VolumeOptions;
use fat_inspect::Disk;
use log::{error, warn};
use std::{
    env,
    io::{self, Write},
    path::Path,
};

/// Represents the runtime state of the program.
///
/// This struct keeps track of the currently opened disk and the selected partition.
struct RunState {
    /// The currently opened disk image.
    disk: Option<Disk>,
    /// Partition in inspection mode
    vol_nb: Option<u8>,
    /// How volumes are opened
    options: VolumeOptions,
    /// The size of a sector
    sector_size: usize,
}

impl RunState {
    fn tree(&mut self) {
        let Some(disk) = self.disk.as_mut() else {
            warn!("Open disk image first");
            return;
        };

        let result = match self.vol_nb {
            Some(nb) => disk
                .fat32_volume(nb as usize)
                .and_then(|vol| Ok(vol.read_file_table()?))
                .map(|table| print!("{}", table.tree())),
            None => disk.print_tree(),
        };
        if let Err(err) = result {
            error!("Tree printing failed: {err}");
        }
    }
}

fn main() {
    // -v adds a level of verbosity, -q keeps errors only
    let args: Vec<String> = env::args().skip(1).collect();
    let verbosity = match args.iter().map(String::as_str).find(|a| a.starts_with('-')) {
        Some("-q") => 0,
        Some(flag) if flag.chars().skip(1).all(|c| c == 'v') => 1 + flag.len(),
        _ => 2,
    };
    stderrlog::new()
        .module(module_path!())
        .module("fat_inspect")
        .verbosity(verbosity)
        .init()
        .unwrap();

    let mut run_state = RunState {
        disk: None,
        vol_nb: None,
        options: VolumeOptions::default(),
        sector_size: 512,
    };

    if let Some(path) = args.iter().find(|a| !a.starts_with('-')) {
        open(&mut run_state, path);
    }

    loop {
        print!("> ");
        io::stdout().flush().unwrap();

        let mut s = String::new();
        match io::stdin().read_line(&mut s) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                error!("Failed to read command: {err}");
                break;
            }
        }

        match Command::from_string(&s) {
            Command::Open(path) => open(&mut run_state, &path),
            Command::Quit => break,
            Command::Print => match &run_state.disk {
                Some(disk) => {
                    if let Err(e) = disk.print_layout(3) {
                        error!("Print layout error: {e}");
                    }
                }
                None => error!("Open disk image first"),
            },
            Command::Partition(vol_nb) => match run_state.disk.as_mut() {
                Some(disk) => match disk.fat32_volume(vol_nb as usize) {
                    Ok(_) => run_state.vol_nb = Some(vol_nb),
                    Err(err) => error!("{err}"),
                },
                None => warn!("Open disk image first"),
            },
            Command::Tree => run_state.tree(),
            Command::Skip => run_state.options.validate_bpb = false,
            Command::Unknown(s) => error!("Unknown command: {s:?}"),
            Command::Invalid(s) => error!("{s}"),
            Command::Empty => {}
        }
    }
}

fn open(run_state: &mut RunState, path: &str) {
    match Disk::from_file(Path::new(path), run_state.sector_size, run_state.options) {
        Ok(disk) => {
            run_state.disk = Some(disk);
            run_state.vol_nb = None;
        }
        Err(err) => error!("{err}"),
    }
}
