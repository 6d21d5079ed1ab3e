//! Watch Backend: one dedicated I/O thread per [`crate::FileSystem`]
//! driving the per-directory subscription state machine on top of the
//! `notify` crate.
//!
//! A directory absent from `dirs` is *Idle*; inserting its first watch
//! arms a `notify` watch and is the Idle -> Watching transition. Removing
//! its last watch un-arms it (Watching -> Idle). All mutation of that
//! state happens exclusively on this thread, reached only through the
//! control channel — never touched directly by callers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asset_core::ContentId;
use asset_scheduler::Scheduler;
use crossbeam_channel::{Receiver, Sender};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::FsError;
use crate::stream::ReadStream;
use crate::{enumerate_relative, ReadCallback, ScanCallback};

struct ReadWatchEntry {
    id: ContentId,
    filename: String,
    strand: ContentId,
    cb: ReadCallback,
    report_missing: bool,
}

struct ScanWatchEntry {
    id: ContentId,
    directory_hash: ContentId,
    strand: ContentId,
    cb: ScanCallback,
}

struct DirState {
    path: PathBuf,
    read_watches: Vec<ReadWatchEntry>,
    scan_watches: Vec<ScanWatchEntry>,
}

impl DirState {
    fn is_empty(&self) -> bool {
        self.read_watches.is_empty() && self.scan_watches.is_empty()
    }
}

enum ControlMessage {
    AddRead {
        directory: PathBuf,
        entry: ReadWatchEntry,
    },
    AddScan {
        directory: PathBuf,
        entry: ScanWatchEntry,
    },
    Remove {
        id: ContentId,
    },
    Shutdown,
}

enum Event {
    Control(ControlMessage),
    Notify(notify::Result<notify::Event>),
}

pub(crate) struct WatchBackend {
    control_tx: Sender<ControlMessage>,
    io_thread: Option<std::thread::JoinHandle<()>>,
}

impl WatchBackend {
    pub(crate) fn spawn(scheduler: Arc<Scheduler>) -> Result<Self, FsError> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<Event>();
        let (control_tx, control_rx) = crossbeam_channel::unbounded::<ControlMessage>();

        // Control messages and notify's own callback both feed the same
        // channel, so the I/O thread can block on a single receiver.
        let forward_tx = event_tx.clone();
        std::thread::Builder::new()
            .name("asset-fs-watch-control".into())
            .spawn(move || {
                while let Ok(msg) = control_rx.recv() {
                    let shutdown = matches!(msg, ControlMessage::Shutdown);
                    if forward_tx.send(Event::Control(msg)).is_err() || shutdown {
                        break;
                    }
                }
            })
            .map_err(FsError::Io)?;

        let notify_tx = event_tx;
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(Event::Notify(res));
        })
        .map_err(|err| FsError::Io(std::io::Error::other(err)))?;

        let io_thread = std::thread::Builder::new()
            .name("asset-fs-watch-io".into())
            .spawn(move || run_io_thread(&mut watcher, event_rx, scheduler))
            .map_err(FsError::Io)?;

        Ok(Self {
            control_tx,
            io_thread: Some(io_thread),
        })
    }

    pub(crate) fn add_read_watch(
        &self,
        id: ContentId,
        directory: PathBuf,
        filename: String,
        strand: ContentId,
        cb: ReadCallback,
        report_missing: bool,
    ) -> Result<(), FsError> {
        self.control_tx
            .send(ControlMessage::AddRead {
                directory,
                entry: ReadWatchEntry {
                    id,
                    filename,
                    strand,
                    cb,
                    report_missing,
                },
            })
            .map_err(|_| FsError::BackendUnavailable)
    }

    pub(crate) fn add_scan_watch(
        &self,
        id: ContentId,
        directory: PathBuf,
        directory_hash: ContentId,
        strand: ContentId,
        cb: ScanCallback,
    ) -> Result<(), FsError> {
        self.control_tx
            .send(ControlMessage::AddScan {
                directory,
                entry: ScanWatchEntry {
                    id,
                    directory_hash,
                    strand,
                    cb,
                },
            })
            .map_err(|_| FsError::BackendUnavailable)
    }

    pub(crate) fn remove(&self, id: ContentId) -> Result<(), FsError> {
        self.control_tx
            .send(ControlMessage::Remove { id })
            .map_err(|_| FsError::BackendUnavailable)
    }
}

impl Drop for WatchBackend {
    fn drop(&mut self) {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

fn arm(watcher: &mut RecommendedWatcher, dirs: &mut HashMap<PathBuf, DirState>, directory: &Path) {
    if dirs.contains_key(directory) {
        return;
    }
    if let Err(err) = watcher.watch(directory, RecursiveMode::Recursive) {
        tracing::warn!(path = %directory.display(), error = %err, "failed to arm directory watch");
    }
    dirs.insert(
        directory.to_path_buf(),
        DirState {
            path: directory.to_path_buf(),
            read_watches: Vec::new(),
            scan_watches: Vec::new(),
        },
    );
}

fn disarm_if_empty(watcher: &mut RecommendedWatcher, dirs: &mut HashMap<PathBuf, DirState>) {
    let empty: Vec<PathBuf> = dirs
        .iter()
        .filter(|(_, state)| state.is_empty())
        .map(|(path, _)| path.clone())
        .collect();
    for path in empty {
        let _ = watcher.unwatch(&path);
        dirs.remove(&path);
    }
}

fn run_io_thread(watcher: &mut RecommendedWatcher, events: Receiver<Event>, scheduler: Arc<Scheduler>) {
    let mut dirs: HashMap<PathBuf, DirState> = HashMap::new();

    while let Ok(event) = events.recv() {
        match event {
            Event::Control(ControlMessage::Shutdown) => break,
            Event::Control(ControlMessage::AddRead { directory, entry }) => {
                arm(watcher, &mut dirs, &directory);
                dirs.get_mut(&directory).expect("just armed").read_watches.push(entry);
            }
            Event::Control(ControlMessage::AddScan { directory, entry }) => {
                arm(watcher, &mut dirs, &directory);
                dirs.get_mut(&directory).expect("just armed").scan_watches.push(entry);
            }
            Event::Control(ControlMessage::Remove { id }) => {
                for state in dirs.values_mut() {
                    state.read_watches.retain(|w| w.id != id);
                    state.scan_watches.retain(|w| w.id != id);
                }
                disarm_if_empty(watcher, &mut dirs);
            }
            Event::Notify(Ok(notify_event)) => handle_event(&dirs, &scheduler, &notify_event),
            Event::Notify(Err(err)) => {
                tracing::warn!(error = %err, "watch backend signalled overflow/error, rescanning watched directories");
                rescan_all(&dirs, &scheduler);
            }
        }
    }
}

fn find_dir<'a>(dirs: &'a HashMap<PathBuf, DirState>, event_path: &Path) -> Option<&'a DirState> {
    dirs.iter()
        .filter(|(dir, _)| event_path.starts_with(dir))
        .max_by_key(|(dir, _)| dir.as_os_str().len())
        .map(|(_, state)| state)
}

fn handle_event(dirs: &HashMap<PathBuf, DirState>, scheduler: &Arc<Scheduler>, event: &notify::Event) {
    for path in &event.paths {
        let Some(state) = find_dir(dirs, path) else {
            continue;
        };
        let Ok(relative) = path.strip_prefix(&state.path) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");

        match event.kind {
            EventKind::Remove(_) => {
                for watch in state.read_watches.iter().filter(|w| w.filename == relative && w.report_missing) {
                    let cb = Arc::clone(&watch.cb);
                    let _ = scheduler.post_work(watch.strand, move || cb(None));
                }
                for watch in &state.scan_watches {
                    let cb = Arc::clone(&watch.cb);
                    let directory_hash = watch.directory_hash;
                    let removed = relative.clone();
                    let _ = scheduler.post_work(watch.strand, move || {
                        cb(directory_hash, String::new(), format!("-{removed}"));
                    });
                }
            }
            EventKind::Create(_) => {
                for watch in &state.scan_watches {
                    let cb = Arc::clone(&watch.cb);
                    let directory_hash = watch.directory_hash;
                    let added = relative.clone();
                    let _ = scheduler.post_work(watch.strand, move || {
                        cb(directory_hash, format!("+{added}"), String::new());
                    });
                }
            }
            EventKind::Modify(_) => {
                for watch in state.read_watches.iter().filter(|w| w.filename == relative) {
                    let cb = Arc::clone(&watch.cb);
                    let full_path = state.path.join(&relative);
                    let origin = full_path.display().to_string();
                    let _ = scheduler.post_work(watch.strand, move || {
                        let stream = ReadStream::open(&full_path, origin.clone()).ok();
                        cb(stream);
                    });
                }
            }
            _ => {}
        }
    }
}

fn rescan_all(dirs: &HashMap<PathBuf, DirState>, scheduler: &Arc<Scheduler>) {
    for state in dirs.values() {
        if state.scan_watches.is_empty() {
            continue;
        }
        let path = state.path.clone();
        let watches: Vec<(ContentId, ContentId, ScanCallback)> = state
            .scan_watches
            .iter()
            .map(|w| (w.directory_hash, w.strand, Arc::clone(&w.cb)))
            .collect();
        let scheduler = Arc::clone(scheduler);
        let _ = scheduler.post_work(ContentId::EMPTY, move || {
            let existing = enumerate_relative(&path, true).join(";");
            for (directory_hash, strand, cb) in watches {
                let existing = existing.clone();
                let scheduler = Arc::clone(&scheduler);
                let _ = scheduler.post_work(strand, move || cb(directory_hash, existing, String::new()));
            }
        });
    }
}
