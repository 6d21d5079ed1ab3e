//! Dependency-tracking asset loader.
//!
//! Sits atop [`asset_fs::FileSystem`] and [`asset_scheduler::Scheduler`],
//! maintains the File Entry graph and drives ready/unready notifications
//! in a strict, invariant-preserving order. Every mutation of that graph
//! happens inside closures posted to one dedicated loader strand, so the
//! whole state machine behaves as if single-threaded regardless of how
//! many scheduler workers are running.

mod context;
mod entry;
mod error;
mod ops;

use std::sync::Arc;

use asset_core::ContentId;
use asset_fs::FileSystem;
use asset_scheduler::Scheduler;
use parking_lot::Mutex;

pub use context::LoadContext;
pub use error::LoaderError;

use entry::LoaderInner;

/// Fired once a file (or the aggregate of a reload) finishes loading.
/// Reports the identifier the caller originally asked to load, not
/// necessarily the one backing it on disk (stem references resolve
/// silently).
pub type ReadyFn = Arc<dyn Fn(ContentId) + Send + Sync>;

/// Fired once for every preceding `ReadyFn` invocation, in the same
/// order, whenever a file is unloaded or about to be reloaded.
pub type UnreadyFn = Arc<dyn Fn(ContentId) + Send + Sync>;

/// Parses a file's bytes. May call [`LoadContext::load_dependency`] zero
/// or more times to assert dependencies that gate this file's own
/// "loaded" transition.
pub type LoadFn = Arc<dyn Fn(asset_fs::ReadStream, ContentId, &mut LoadContext<'_>) + Send + Sync>;

/// Releases whatever state a matching [`LoadFn`] built up.
pub type UnloadFn = Arc<dyn Fn(ContentId) + Send + Sync>;

/// The dedicated strand every loader mutation runs on.
fn loader_strand() -> ContentId {
    ContentId::from_name("__asset_loader_strand__")
}

pub(crate) struct Handles {
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) fs: Arc<FileSystem>,
    pub(crate) inner: Arc<Mutex<LoaderInner>>,
}

impl Clone for Handles {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
            fs: Arc::clone(&self.fs),
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Dependency-tracking loader: the single entry point for registering
/// filetypes and libraries and for requesting files be loaded or
/// unloaded.
pub struct Loader {
    handles: Handles,
    strand: ContentId,
}

impl Loader {
    pub fn new(scheduler: Arc<Scheduler>, fs: Arc<FileSystem>) -> Self {
        Self {
            handles: Handles {
                scheduler,
                fs,
                inner: Arc::new(Mutex::new(LoaderInner::default())),
            },
            strand: loader_strand(),
        }
    }

    /// Binds an opaque filetype identifier to a load/unload pair. A
    /// second registration under the same identifier is a contract
    /// violation.
    pub fn register_filetype(&self, filetype: ContentId, load: LoadFn, unload: UnloadFn) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                ops::register_filetype(&mut inner, filetype, load, unload);
            })
            .map_err(LoaderError::from)
    }

    /// Unregisters a previously registered filetype. Unregistering an
    /// unknown filetype is a contract violation.
    pub fn unregister_filetype(&self, filetype: ContentId) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                ops::unregister_filetype(&mut inner, filetype);
            })
            .map_err(LoaderError::from)
    }

    /// Registers `directory_alias` as a library root: performs an
    /// initial recursive scan and keeps the resulting Known/Unique/
    /// Ambiguous entries current as files are added or removed on disk.
    pub fn register_library(&self, directory_alias: &str) -> Result<(), LoaderError> {
        ops::register_library(&self.handles, self.strand, directory_alias)
    }

    /// Inverse of [`Loader::register_library`]: files the library alone
    /// discovered fall back to Known with no owners, cascading unloads.
    pub fn unregister_library(&self, directory_alias: &str) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        let directory_alias = directory_alias.to_string();
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                ops::unregister_library(&mut inner, &handles, &directory_alias);
            })
            .map_err(LoaderError::from)
    }

    /// Requests `file` be loaded under `filetype` with the global
    /// sentinel as owner.
    pub fn load_global(&self, filetype: ContentId, file: ContentId, ready: ReadyFn, unready: UnreadyFn) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        let strand = self.strand;
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                if let Err(err) = ops::load_global(&mut inner, &handles, strand, filetype, file, ready, unready) {
                    tracing::error!(file = %file, error = %err, "load_global failed");
                }
            })
            .map_err(LoaderError::from)
    }

    /// Like [`Loader::load_global`] but owned by `owner`; does not gate
    /// `owner`'s own "loaded" transition.
    pub fn load_local(&self, filetype: ContentId, owner: ContentId, file: ContentId, ready: ReadyFn, unready: UnreadyFn) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        let strand = self.strand;
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                if let Err(err) = ops::load_local(&mut inner, &handles, strand, filetype, owner, file, ready, unready) {
                    tracing::error!(file = %file, error = %err, "load_local failed");
                }
            })
            .map_err(LoaderError::from)
    }

    /// Unloads a file previously requested via [`Loader::load_global`].
    pub fn unload_global(&self, file: ContentId) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                if let Err(err) = ops::unload_global(&mut inner, &handles, file) {
                    tracing::error!(file = %file, error = %err, "unload_global failed");
                }
            })
            .map_err(LoaderError::from)
    }

    /// Unloads a file previously requested via [`Loader::load_local`].
    pub fn unload_local(&self, owner: ContentId, file: ContentId) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                if let Err(err) = ops::unload_local(&mut inner, &handles, owner, file, false) {
                    tracing::error!(file = %file, error = %err, "unload_local failed");
                }
            })
            .map_err(LoaderError::from)
    }

    /// Unloads a dependency previously asserted via
    /// [`LoadContext::load_dependency`].
    pub fn unload_dependency(&self, owner: ContentId, file: ContentId) -> Result<(), LoaderError> {
        let handles = self.handles.clone();
        self.handles
            .scheduler
            .post_work(self.strand, move || {
                let mut inner = handles.inner.lock();
                if let Err(err) = ops::unload_local(&mut inner, &handles, owner, file, true) {
                    tracing::error!(file = %file, error = %err, "unload_dependency failed");
                }
            })
            .map_err(LoaderError::from)
    }

    /// The strand every loader mutation and every ready/unready delivery
    /// related to loader bookkeeping runs on. Exposed so callers can post
    /// their own strictly-ordered follow-up work relative to it.
    pub fn strand(&self) -> ContentId {
        self.strand
    }
}
