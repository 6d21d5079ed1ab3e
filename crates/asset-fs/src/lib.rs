//! Directory-alias registry, read/write/scan primitives and the OS-level
//! change-watch facility sitting underneath the asset loader.

mod error;
mod flags;
mod stream;
mod watch;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asset_core::{contract, ContentId, FileSystemConfig};
use asset_scheduler::Scheduler;
use parking_lot::Mutex;

pub use error::FsError;
pub use flags::Flags;
pub use stream::{ReadStream, WriteStream};

use watch::WatchBackend;

/// Invoked with `Some(stream)` for a successful open (`stream.fail()` is
/// set if the subsequent read itself errored) or `None` when
/// [`Flags::REPORT_MISSING`] is set and the file is absent or was
/// deleted after being watched.
pub type ReadCallback = Arc<dyn Fn(Option<ReadStream>) + Send + Sync>;

/// Invoked with `(directory_hash, existing_files, removed_files)`, each a
/// `;`-separated relative-path list. The initial scan reports everything
/// as existing with no prefix; subsequent watched deltas prefix paths
/// with `+`/`-` inside the relevant list.
pub type ScanCallback = Arc<dyn Fn(ContentId, String, String) + Send + Sync>;

/// Invoked exactly once with a freshly opened write stream.
pub type WriteCallback = Box<dyn FnOnce(WriteStream) + Send>;

struct DirectoryEntry {
    path: PathBuf,
    share_count: usize,
    _temp: Option<tempfile::TempDir>,
}

/// Binds directory aliases to real paths, serves read/write/scan
/// requests against them, and owns the [`WatchBackend`] that turns OS
/// change notifications into scheduled callbacks.
pub struct FileSystem {
    scheduler: Arc<Scheduler>,
    directories: Mutex<HashMap<ContentId, DirectoryEntry>>,
    watch: WatchBackend,
    config: FileSystemConfig,
    /// Which directory alias each live `ADD_WATCH` subscription belongs
    /// to, purely so [`FileSystem::unregister_directory`] can detect and
    /// force-stop watches that still reference an alias being torn down.
    watch_owners: Mutex<HashMap<ContentId, ContentId>>,
}

impl FileSystem {
    /// `root_directory` is pre-registered under the alias `"root"`.
    /// `config` supplies ambient defaults (e.g.
    /// [`FileSystemConfig::watch_recursive_by_default`]) consulted by
    /// [`FileSystem::default_scan_flags`].
    pub fn new(scheduler: Arc<Scheduler>, root_directory: PathBuf, config: FileSystemConfig) -> Result<Self, FsError> {
        let watch = WatchBackend::spawn(Arc::clone(&scheduler))?;
        let mut directories = HashMap::new();
        directories.insert(
            ContentId::from_name("root"),
            DirectoryEntry {
                path: root_directory,
                share_count: 1,
                _temp: None,
            },
        );
        Ok(Self {
            scheduler,
            directories: Mutex::new(directories),
            watch,
            config,
            watch_owners: Mutex::new(HashMap::new()),
        })
    }

    /// The `ADD_WATCH` flags a caller should use when it has no explicit
    /// recursion preference of its own: honors
    /// [`FileSystemConfig::watch_recursive_by_default`].
    pub fn default_scan_flags(&self) -> Flags {
        let mut flags = Flags::ADD_WATCH;
        if self.config.watch_recursive_by_default {
            flags |= Flags::RECURSE_DIRECTORIES;
        }
        flags
    }

    fn dir_path(&self, directory: &str) -> Result<PathBuf, FsError> {
        let id = ContentId::from_name(directory);
        self.directories
            .lock()
            .get(&id)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| FsError::UnknownAlias(directory.to_string()))
    }

    /// Binds `name` to `parent_path ⧺ filepath`.
    /// `filepath` must end in `/`, must not be absolute, and must not
    /// contain `..` components. Re-registering an already-bound name
    /// reuses its record and increments its share count.
    pub fn register_directory(&self, name: &str, filepath: &str, parent: Option<&str>) -> Result<(), FsError> {
        if !filepath.ends_with('/') || filepath.starts_with('/') || has_dotdot(filepath) {
            return Err(FsError::InvalidPath(filepath.to_string()));
        }

        let id = ContentId::from_name(name);
        let mut directories = self.directories.lock();
        if let Some(entry) = directories.get_mut(&id) {
            entry.share_count += 1;
            return Ok(());
        }

        let parent_path = match parent {
            Some(parent_name) => {
                let parent_id = ContentId::from_name(parent_name);
                directories
                    .get(&parent_id)
                    .map(|entry| entry.path.clone())
                    .ok_or_else(|| FsError::UnknownAlias(parent_name.to_string()))?
            }
            None => directories
                .get(&ContentId::from_name("root"))
                .map(|entry| entry.path.clone())
                .expect("root alias always registered"),
        };

        let full_path = parent_path.join(filepath);
        if !full_path.is_dir() {
            return Err(FsError::NotADirectory(full_path.display().to_string()));
        }

        directories.insert(
            id,
            DirectoryEntry {
                path: full_path,
                share_count: 1,
                _temp: None,
            },
        );
        Ok(())
    }

    /// Creates a uniquely named directory under the OS temp location and
    /// binds `name` to it. The directory (and everything under it) is
    /// deleted when the alias's share count reaches zero.
    pub fn register_temporary_directory(&self, name: &str) -> Result<(), FsError> {
        let id = ContentId::from_name(name);
        let mut directories = self.directories.lock();
        if directories.contains_key(&id) {
            return Err(FsError::AliasInUse(name.to_string()));
        }
        let temp = tempfile::tempdir()?;
        directories.insert(
            id,
            DirectoryEntry {
                path: temp.path().to_path_buf(),
                share_count: 1,
                _temp: Some(temp),
            },
        );
        Ok(())
    }

    /// Decrements `name`'s share count; purges temporary directories and
    /// removes the record once it reaches zero. It is a contract
    /// violation to unregister a directory with live watches still
    /// referencing it: such watches are force-stopped and the process
    /// survives, but the caller is told via [`FsError::AliasInUseByWatch`].
    pub fn unregister_directory(&self, name: &str) -> Result<(), FsError> {
        let id = ContentId::from_name(name);
        let mut directories = self.directories.lock();
        let remove = {
            let entry = directories
                .get_mut(&id)
                .ok_or_else(|| FsError::UnknownAlias(name.to_string()))?;
            if !contract::verify(entry.share_count > 0, "unregister_directory: share count underflow") {
                return Ok(());
            }
            entry.share_count -= 1;
            entry.share_count == 0
        };
        if !remove {
            return Ok(());
        }

        let live_watches: Vec<ContentId> = {
            let mut watch_owners = self.watch_owners.lock();
            let live: Vec<ContentId> = watch_owners.iter().filter(|(_, owner)| **owner == id).map(|(watch_id, _)| *watch_id).collect();
            for watch_id in &live {
                watch_owners.remove(watch_id);
            }
            live
        };

        directories.remove(&id);
        drop(directories);

        if live_watches.is_empty() {
            return Ok(());
        }

        // In debug builds this panics (caller bug, fail fast); release
        // builds log and fall through to force-stopping every watch that
        // still referenced this alias before reporting it to the caller.
        contract::verify(false, &format!("unregister_directory: alias {name:?} still had {} live watch(es); force-stopping", live_watches.len()));
        for watch_id in &live_watches {
            let _ = self.watch.remove(*watch_id);
        }
        Err(FsError::AliasInUseByWatch(name.to_string()))
    }

    /// Opens `directory/filepath` and invokes `cb` on `strand` with the
    /// resulting stream. See [`ReadCallback`] for the missing-file
    /// convention.
    pub fn read(
        &self,
        id: ContentId,
        directory: &str,
        filepath: &str,
        strand: ContentId,
        flags: Flags,
        cb: ReadCallback,
    ) -> Result<(), FsError> {
        validate_relative_path(filepath)?;
        let dir_path = self.dir_path(directory)?;
        let full_path = dir_path.join(filepath);

        if flags.contains(Flags::ADD_WATCH) {
            let directory_id = ContentId::from_name(directory);
            self.watch.add_read_watch(
                id,
                dir_path,
                filepath.to_string(),
                strand,
                Arc::clone(&cb),
                flags.contains(Flags::REPORT_MISSING),
            )?;
            self.watch_owners.lock().insert(id, directory_id);
        }

        let scheduler = Arc::clone(&self.scheduler);
        let report_missing = flags.contains(Flags::REPORT_MISSING);
        self.scheduler.post_work(ContentId::EMPTY, move || {
            let origin = full_path.display().to_string();
            match ReadStream::open(&full_path, origin.clone()) {
                Ok(stream) => {
                    let _ = scheduler.post_work(strand, move || cb(Some(stream)));
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    if report_missing {
                        let _ = scheduler.post_work(strand, move || cb(None));
                    }
                }
                Err(_) => {
                    let stream = ReadStream::failed(origin);
                    let _ = scheduler.post_work(strand, move || cb(Some(stream)));
                }
            }
        })?;
        Ok(())
    }

    /// Enumerates files under `directory` and invokes `cb` on `strand`
    /// with the initial listing. With [`Flags::ADD_WATCH`], subsequent
    /// create/delete events produce additional delta callbacks.
    pub fn scan(&self, id: ContentId, directory: &str, strand: ContentId, flags: Flags, cb: ScanCallback) -> Result<(), FsError> {
        let dir_path = self.dir_path(directory)?;
        let directory_hash = ContentId::from_name(directory);
        let recursive = flags.contains(Flags::RECURSE_DIRECTORIES);

        if flags.contains(Flags::ADD_WATCH) {
            self.watch
                .add_scan_watch(id, dir_path.clone(), directory_hash, strand, Arc::clone(&cb))?;
            self.watch_owners.lock().insert(id, directory_hash);
        }

        let scheduler = Arc::clone(&self.scheduler);
        self.scheduler.post_work(ContentId::EMPTY, move || {
            let existing = enumerate_relative(&dir_path, recursive).join(";");
            let _ = scheduler.post_work(strand, move || cb(directory_hash, existing, String::new()));
        })?;
        Ok(())
    }

    /// Cancels a previously installed watch. Idempotent.
    pub fn remove_watch(&self, id: ContentId) -> Result<(), FsError> {
        self.watch_owners.lock().remove(&id);
        self.watch.remove(id)
    }

    /// Opens `directory/filepath` for writing and invokes `cb` on
    /// `strand` once the stream is ready.
    pub fn write(&self, directory: &str, filepath: &str, strand: ContentId, flags: Flags, cb: WriteCallback) -> Result<(), FsError> {
        validate_relative_path(filepath)?;
        let dir_path = self.dir_path(directory)?;
        let full_path = dir_path.join(filepath);
        let scheduler = Arc::clone(&self.scheduler);

        self.scheduler.post_work(ContentId::EMPTY, move || {
            if flags.contains(Flags::CREATE_DIRECTORIES) {
                if let Some(parent) = full_path.parent() {
                    if let Err(err) = std::fs::create_dir_all(parent) {
                        tracing::warn!(path = %parent.display(), error = %err, "failed to create intermediate directories");
                    }
                }
            }

            let mut open_options = std::fs::OpenOptions::new();
            open_options.write(true);
            if flags.contains(Flags::APPEND_EXISTING) {
                open_options.append(true).create(true);
            } else if flags.contains(Flags::OVERWRITE_EXISTING) {
                open_options.create(true).truncate(true);
            } else {
                open_options.create_new(true);
            }

            match open_options.open(&full_path) {
                Ok(file) => {
                    let origin = full_path.display().to_string();
                    let stream = WriteStream::create(file, origin);
                    let _ = scheduler.post_work(strand, move || cb(stream));
                }
                Err(err) => {
                    tracing::warn!(path = %full_path.display(), error = %err, "write open failed");
                }
            }
        })?;
        Ok(())
    }
}

fn validate_relative_path(path: &str) -> Result<(), FsError> {
    if path.starts_with('/') || has_dotdot(path) {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn has_dotdot(path: &str) -> bool {
    path.split('/').any(|component| component == "..")
}

/// Lists paths under `root` relative to it, using `/` exclusively. Used
/// both for the initial scan and for full rescans after a watch
/// overflow.
fn enumerate_relative(root: &Path, recursive: bool) -> Vec<String> {
    let mut out = Vec::new();
    enumerate_into(root, root, recursive, &mut out);
    out.sort();
    out
}

fn enumerate_into(root: &Path, dir: &Path, recursive: bool, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_dir = path.is_dir();
        if is_dir {
            if recursive {
                enumerate_into(root, &path, recursive, out);
            }
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}
