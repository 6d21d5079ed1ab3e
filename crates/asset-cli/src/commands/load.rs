//! `asset-pipeline load` — loads one file through a real
//! [`asset_loader::Loader`] against a directory on disk and prints what
//! the registered `raw` filetype read back.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use asset_core::{ContentId, FileSystemConfig};
use asset_fs::FileSystem;
use asset_loader::Loader;
use asset_scheduler::Scheduler;
use clap::Args;

use crate::output::hex_preview;

#[derive(Debug, Args)]
pub struct LoadCommand {
    /// Directory to register as a library root.
    #[arg(long)]
    dir: PathBuf,

    /// Logical filename to load (relative to `--dir`), full name or stem.
    file: String,

    /// Keep running and print further ready/unready events as the file
    /// is edited on disk, instead of unloading and exiting immediately.
    #[arg(long)]
    watch: bool,
}

/// A filetype that copies the entire stream into memory and hands it
/// back to the caller untouched — stands in for the opaque, plug-in
/// filetypes real callers register (the core itself only ever sees
/// raw bytes).
fn register_raw_filetype(loader: &Loader, bytes: Arc<Mutex<Vec<u8>>>) -> Result<ContentId> {
    let filetype = ContentId::from_name("raw");
    let load_bytes = Arc::clone(&bytes);
    let load: asset_loader::LoadFn = Arc::new(move |mut stream, _file_id, _ctx| {
        let mut chunk = [0u8; 4096];
        let mut contents = Vec::new();
        loop {
            let n = stream.read_some(&mut chunk);
            if n == 0 {
                break;
            }
            contents.extend_from_slice(&chunk[..n]);
        }
        *load_bytes.lock().unwrap() = contents;
    });
    let unload: asset_loader::UnloadFn = Arc::new(|_file_id| {});
    loader.register_filetype(filetype, load, unload)?;
    Ok(filetype)
}

impl LoadCommand {
    pub fn run(&self, worker_threads: usize, fs_config: FileSystemConfig) -> Result<()> {
        if !self.dir.is_dir() {
            bail!("{} is not a directory", self.dir.display());
        }

        let scheduler = Arc::new(Scheduler::new(worker_threads)?);
        let fs = Arc::new(FileSystem::new(Arc::clone(&scheduler), self.dir.clone(), fs_config)?);
        let loader = Loader::new(Arc::clone(&scheduler), Arc::clone(&fs));

        let bytes: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let filetype = register_raw_filetype(&loader, Arc::clone(&bytes))?;
        loader.register_library("root")?;
        // The initial recursive scan runs asynchronously on the loader
        // strand; give it a moment to populate Known/Unique entries
        // before requesting a load against them.
        std::thread::sleep(Duration::from_millis(200));

        let ready = Arc::new(AtomicBool::new(false));
        let file = ContentId::from_name(&self.file);
        let watch_bytes = Arc::clone(&bytes);
        let signal_ready = Arc::clone(&ready);
        loader.load_global(
            filetype,
            file,
            Arc::new(move |resolved| {
                println!("ready: {resolved} — {}", hex_preview(&watch_bytes.lock().unwrap()));
                signal_ready.store(true, Ordering::SeqCst);
            }),
            Arc::new(move |resolved| println!("unready: {resolved}")),
        )?;

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !ready.load(Ordering::SeqCst) {
            if std::time::Instant::now() >= deadline {
                bail!("timed out waiting for {} to load", self.file);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        if self.watch {
            println!("watching {} for changes — Ctrl+C to exit", self.dir.display());
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }

        loader.unload_global(file)?;
        std::thread::sleep(Duration::from_millis(100));
        Ok(())
    }
}
