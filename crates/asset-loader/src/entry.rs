//! File Entry state machine: every file the loader knows about is keyed
//! by the hash of its logical name and sits in exactly one of these
//! states at a time.

use asset_core::ContentId;

use crate::{ReadyFn, UnloadFn, UnreadyFn};

/// High bit of [`LoadingEntry::remaining_count`]: set while the file's own
/// body read is still outstanding, cleared once it completes. The low
/// bits count outstanding dependency assertions, packed into one counter
/// so a single decrement-and-check covers both.
pub(crate) const BODY_IN_FLIGHT: i32 = i32::MIN;

pub(crate) fn dependency_count(remaining: i32) -> i32 {
    remaining & !BODY_IN_FLIGHT
}

pub(crate) fn is_body_in_flight(remaining: i32) -> bool {
    remaining & BODY_IN_FLIGHT != 0
}

pub(crate) fn is_fully_loaded(remaining: i32) -> bool {
    dependency_count(remaining) == 0 && !is_body_in_flight(remaining)
}

/// One registered `load_global`/`load_local`/`load_dependency` call.
/// `gating` marks dependency calls whose completion must decrement the
/// owner's `remaining_count`; plain global/local calls never gate.
///
/// `calls` accumulates every registration a file has ever received and is
/// only ever fired as a batch by the finish-loading/unload algorithms: it
/// is deliberately *not* pruned when an individual `unload_*` call removes
/// that owner's reference, so that a file shared by several owners
/// reports the same number of ready and unready invocations rather than
/// one pair per owner. `owners` is the separate, live reference count: it
/// shrinks immediately on `unload_*` and drives the
/// Known/Loaded/Loading transition.
#[derive(Clone)]
pub(crate) struct CallEntry {
    pub(crate) owner: ContentId,
    pub(crate) gating: bool,
    pub(crate) ready: ReadyFn,
    pub(crate) unready: UnreadyFn,
}

pub(crate) struct LoadingEntry {
    pub(crate) directory: String,
    pub(crate) filepath: String,
    pub(crate) filetype: ContentId,
    pub(crate) calls: Vec<CallEntry>,
    pub(crate) owners: Vec<ContentId>,
    pub(crate) new_attachments: Vec<ContentId>,
    pub(crate) previous_attachments: Vec<ContentId>,
    pub(crate) remaining_count: i32,
}

pub(crate) struct LoadedEntry {
    pub(crate) directory: String,
    pub(crate) filepath: String,
    pub(crate) filetype: ContentId,
    pub(crate) calls: Vec<CallEntry>,
    pub(crate) owners: Vec<ContentId>,
    pub(crate) attachments: Vec<ContentId>,
}

pub(crate) enum Entry {
    /// A registered library root; not itself loadable.
    Directory,
    /// A real file discovered by a library scan, not currently requested.
    Known { directory: String, filepath: String },
    /// A stem that currently resolves to exactly one extensioned file.
    Unique { target: ContentId },
    /// A stem shared by more than one extensioned file; resolving it is a
    /// contract violation.
    Ambiguous { candidates: Vec<ContentId> },
    Loading(LoadingEntry),
    Loaded(LoadedEntry),
}

pub(crate) struct Filetype {
    pub(crate) load: crate::LoadFn,
    pub(crate) unload: UnloadFn,
}

pub(crate) struct LibraryState {
    pub(crate) alias: String,
    pub(crate) scan_id: ContentId,
}

#[derive(Default)]
pub(crate) struct LoaderInner {
    pub(crate) entries: std::collections::HashMap<ContentId, Entry>,
    pub(crate) filetypes: std::collections::HashMap<ContentId, Filetype>,
    pub(crate) libraries: std::collections::HashMap<ContentId, LibraryState>,
}

/// The stem of a logical filename: everything before the last `.`, or the
/// whole name if there is no extension.
pub(crate) fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}
