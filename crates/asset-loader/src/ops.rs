//! The File Entry state machine itself: every operation the public
//! [`crate::Loader`] exposes is a thin wrapper that posts one of these
//! functions onto the loader strand. Built around an explicit
//! `entries: HashMap<ContentId, Entry>` rather than separate
//! loading/loaded tables, so a file's state transitions are a single
//! map mutation.

use std::collections::hash_map::Entry as MapEntry;
use std::sync::Arc;

use asset_core::{contract, ContentId};
use asset_fs::{Flags, ReadCallback, ReadStream, ScanCallback};

use crate::context::LoadContext;
use crate::entry::{self, LoaderInner};
use crate::error::LoaderError;
use crate::{Handles, LoadFn, ReadyFn, UnloadFn, UnreadyFn};

// ---------------------------------------------------------------------
// Filetypes
// ---------------------------------------------------------------------

pub(crate) fn register_filetype(inner: &mut LoaderInner, filetype: ContentId, load: LoadFn, unload: UnloadFn) {
    match inner.filetypes.entry(filetype) {
        MapEntry::Occupied(_) => {
            contract::verify(false, "register_filetype: filetype is already registered");
        }
        MapEntry::Vacant(slot) => {
            slot.insert(entry::Filetype { load, unload });
        }
    }
}

pub(crate) fn unregister_filetype(inner: &mut LoaderInner, filetype: ContentId) {
    if inner.filetypes.remove(&filetype).is_none() {
        contract::verify(false, "unregister_filetype: filetype was not registered");
    }
}

// ---------------------------------------------------------------------
// Libraries
// ---------------------------------------------------------------------

/// Registers a library root and kicks off its initial recursive scan. The
/// scan's own delivery runs on `strand` (the loader strand), so by the
/// time `process_scan` touches `inner.entries` the directory bookkeeping
/// task posted just below has already run (same strand, FIFO).
pub(crate) fn register_library(handles: &Handles, strand: ContentId, directory_alias: &str) -> Result<(), LoaderError> {
    let directory_hash = ContentId::from_name(directory_alias);
    let alias_owned = directory_alias.to_string();

    let inner_arc = Arc::clone(&handles.inner);
    let bookkeeping_alias = alias_owned.clone();
    handles
        .scheduler
        .post_work(strand, move || {
            let mut inner = inner_arc.lock();
            inner.entries.entry(directory_hash).or_insert(entry::Entry::Directory);
            inner.libraries.insert(
                directory_hash,
                entry::LibraryState {
                    alias: bookkeeping_alias,
                    scan_id: directory_hash,
                },
            );
        })
        .map_err(LoaderError::from)?;

    let scan_inner = Arc::clone(&handles.inner);
    let scan_alias = alias_owned;
    let cb: ScanCallback = Arc::new(move |_directory_hash, existing, removed| {
        let mut inner = scan_inner.lock();
        process_scan(&mut inner, &scan_alias, &existing, &removed);
    });
    handles
        .fs
        .scan(directory_hash, directory_alias, strand, handles.fs.default_scan_flags(), cb)
        .map_err(LoaderError::from)
}

pub(crate) fn unregister_library(inner: &mut LoaderInner, handles: &Handles, directory_alias: &str) {
    let directory_hash = ContentId::from_name(directory_alias);
    if inner.libraries.remove(&directory_hash).is_none() {
        contract::verify(false, "unregister_library: library was not registered");
        return;
    }
    let _ = handles.fs.remove_watch(directory_hash);

    let affected: Vec<ContentId> = inner
        .entries
        .iter()
        .filter_map(|(id, e)| {
            let directory = match e {
                entry::Entry::Known { directory, .. } => directory.as_str(),
                entry::Entry::Loading(loading) => loading.directory.as_str(),
                entry::Entry::Loaded(loaded) => loaded.directory.as_str(),
                _ => return None,
            };
            (directory == directory_alias).then_some(*id)
        })
        .collect();

    for file in affected {
        force_teardown(inner, handles, file);
    }
    inner.entries.remove(&directory_hash);
}

/// Tears a file all the way down regardless of its remaining owners,
/// because the library that ever knew about it is gone: pending loads
/// cascade into unloads rather than being left dangling. For files that
/// were never requested (`Known`) there is nothing to fire, so it just
/// disappears outright.
fn force_teardown(inner: &mut LoaderInner, handles: &Handles, file: ContentId) {
    let is_loading = matches!(inner.entries.get(&file), Some(entry::Entry::Loading(_)));
    let is_loaded = matches!(inner.entries.get(&file), Some(entry::Entry::Loaded(_)));

    if is_loading {
        let Some(entry::Entry::Loading(loading)) = inner.entries.remove(&file) else {
            unreachable!()
        };
        let _ = handles.fs.remove_watch(file);
        fire_calls(handles, &loading.calls, file, Direction::Unready);
        for attachment in loading.new_attachments.into_iter().chain(loading.previous_attachments) {
            release_owner(inner, handles, file, attachment);
        }
    } else if is_loaded {
        let Some(entry::Entry::Loaded(loaded)) = inner.entries.remove(&file) else {
            unreachable!()
        };
        let _ = handles.fs.remove_watch(file);
        fire_calls(handles, &loaded.calls, file, Direction::Unready);
        invoke_unload(inner, handles, loaded.filetype, file);
        for attachment in loaded.attachments {
            release_owner(inner, handles, file, attachment);
        }
    } else {
        inner.entries.remove(&file);
    }
}

/// Applies one scan delivery: `existing`/`removed` are `;`-separated
/// relative paths, each optionally `+`/`-` prefixed for deltas (see
/// `asset_fs::ScanCallback`).
fn process_scan(inner: &mut LoaderInner, alias: &str, existing: &str, removed: &str) {
    for raw in split_paths(existing) {
        add_known_file(inner, alias, raw.trim_start_matches('+'));
    }
    for raw in split_paths(removed) {
        remove_known_file(inner, raw.trim_start_matches('-'));
    }
}

fn split_paths(s: &str) -> impl Iterator<Item = &str> {
    s.split(';').filter(|p| !p.is_empty())
}

fn add_known_file(inner: &mut LoaderInner, alias: &str, filepath: &str) {
    let file_id = ContentId::from_name(filepath);
    if let MapEntry::Vacant(slot) = inner.entries.entry(file_id) {
        slot.insert(entry::Entry::Known {
            directory: alias.to_string(),
            filepath: filepath.to_string(),
        });
    }
    update_stem(inner, filepath, file_id);
}

/// Erases a `Known` entry that vanished from disk. Files already
/// `Loading`/`Loaded` under this name are left alone here: their own read
/// watch (armed with [`Flags::REPORT_MISSING`]) is what tears them down,
/// exactly once, via [`force_known_on_delete`].
fn remove_known_file(inner: &mut LoaderInner, filepath: &str) {
    let file_id = ContentId::from_name(filepath);
    if let Some(entry::Entry::Known { .. }) = inner.entries.get(&file_id) {
        inner.entries.remove(&file_id);
    }
    demote_stem(inner, filepath, file_id);
}

fn stem_id(filepath: &str) -> Option<ContentId> {
    let stem = entry::stem_of(filepath);
    (stem != filepath).then(|| ContentId::from_name(stem))
}

fn update_stem(inner: &mut LoaderInner, filepath: &str, file_id: ContentId) {
    let Some(stem_id) = stem_id(filepath) else { return };
    match inner.entries.get_mut(&stem_id) {
        None => {
            inner.entries.insert(stem_id, entry::Entry::Unique { target: file_id });
        }
        Some(entry::Entry::Unique { target }) if *target != file_id => {
            let existing = *target;
            inner.entries.insert(stem_id, entry::Entry::Ambiguous { candidates: vec![existing, file_id] });
        }
        Some(entry::Entry::Ambiguous { candidates }) => {
            if !candidates.contains(&file_id) {
                candidates.push(file_id);
            }
        }
        _ => {}
    }
}

fn demote_stem(inner: &mut LoaderInner, filepath: &str, file_id: ContentId) {
    let Some(stem_id) = stem_id(filepath) else { return };
    match inner.entries.get_mut(&stem_id) {
        Some(entry::Entry::Ambiguous { candidates }) => {
            candidates.retain(|c| *c != file_id);
            match candidates.len() {
                1 => {
                    let remaining = candidates[0];
                    inner.entries.insert(stem_id, entry::Entry::Unique { target: remaining });
                }
                0 => {
                    inner.entries.remove(&stem_id);
                }
                _ => {}
            }
        }
        Some(entry::Entry::Unique { target }) if *target == file_id => {
            inner.entries.remove(&stem_id);
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------
// Name resolution
// ---------------------------------------------------------------------

/// Resolves stem references to the extensioned file they currently name;
/// anything already concrete resolves to itself.
fn resolve(inner: &LoaderInner, file: ContentId) -> Result<ContentId, LoaderError> {
    match inner.entries.get(&file) {
        None => Err(LoaderError::UnknownFile),
        Some(entry::Entry::Unique { target }) => Ok(*target),
        Some(entry::Entry::Ambiguous { .. }) => {
            contract::verify(false, "resolve: stem reference is ambiguous");
            Err(LoaderError::AmbiguousStem)
        }
        Some(entry::Entry::Directory) => Err(LoaderError::IsDirectory),
        Some(_) => Ok(file),
    }
}

// ---------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------

enum EntryKind {
    Known,
    Loading,
    Loaded,
}

/// The Known/Loading/Loaded row of spec.md's load table, applied to
/// `file` (already resolved). `owner`/`gating` describe the call being
/// registered; `gating` calls decrement the owner's own `remaining_count`
/// once this file finishes loading (asserted only via
/// [`LoadContext::load_dependency`]).
fn request_load(
    inner: &mut LoaderInner,
    handles: &Handles,
    strand: ContentId,
    filetype: ContentId,
    owner: ContentId,
    file: ContentId,
    gating: bool,
    ready: ReadyFn,
    unready: UnreadyFn,
) -> Result<(), LoaderError> {
    let call = entry::CallEntry { owner, gating, ready, unready };

    let kind = match inner.entries.get(&file) {
        Some(entry::Entry::Known { .. }) => EntryKind::Known,
        Some(entry::Entry::Loading(_)) => EntryKind::Loading,
        Some(entry::Entry::Loaded(_)) => EntryKind::Loaded,
        Some(entry::Entry::Directory) => return Err(LoaderError::IsDirectory),
        Some(entry::Entry::Unique { .. }) | Some(entry::Entry::Ambiguous { .. }) => {
            contract::verify(false, "request_load: file reference must already be resolved");
            return Err(LoaderError::AmbiguousStem);
        }
        None => return Err(LoaderError::UnknownFile),
    };

    match kind {
        EntryKind::Known => {
            if !inner.filetypes.contains_key(&filetype) {
                return Err(LoaderError::UnknownFiletype);
            }
            let Some(entry::Entry::Known { directory, filepath }) = inner.entries.remove(&file) else {
                unreachable!()
            };
            let loading = entry::LoadingEntry {
                directory: directory.clone(),
                filepath: filepath.clone(),
                filetype,
                calls: vec![call],
                owners: vec![owner],
                new_attachments: Vec::new(),
                previous_attachments: Vec::new(),
                remaining_count: entry::BODY_IN_FLIGHT,
            };
            inner.entries.insert(file, entry::Entry::Loading(loading));
            spawn_body_read(handles, strand, file, directory, filepath);
            Ok(())
        }
        EntryKind::Loading => {
            let Some(entry::Entry::Loading(loading)) = inner.entries.get_mut(&file) else {
                unreachable!()
            };
            if !contract::verify(loading.filetype == filetype, "load: filetype mismatch for an in-flight file") {
                return Err(LoaderError::FiletypeMismatch);
            }
            loading.calls.push(call);
            loading.owners.push(owner);
            Ok(())
        }
        EntryKind::Loaded => {
            let Some(entry::Entry::Loaded(loaded)) = inner.entries.get_mut(&file) else {
                unreachable!()
            };
            if !contract::verify(loaded.filetype == filetype, "load: filetype mismatch for an already-loaded file") {
                return Err(LoaderError::FiletypeMismatch);
            }
            loaded.calls.push(call.clone());
            loaded.owners.push(owner);
            let scheduler = Arc::clone(&handles.scheduler);
            let ready_fn = call.ready;
            let _ = scheduler.post_work(file, move || ready_fn(file));
            Ok(())
        }
    }
}

fn spawn_body_read(handles: &Handles, strand: ContentId, file: ContentId, directory: String, filepath: String) {
    let inner = Arc::clone(&handles.inner);
    let handles_for_cb = handles.clone();
    let cb: ReadCallback = Arc::new(move |stream| {
        let mut inner = inner.lock();
        on_body_event(&mut inner, &handles_for_cb, strand, file, stream);
    });
    if let Err(err) = handles.fs.read(file, &directory, &filepath, strand, Flags::ADD_WATCH | Flags::REPORT_MISSING, cb) {
        tracing::error!(file = %file, error = %err, "failed to start file read for load");
    }
}

/// Dispatches a file-system callback for `file` to whichever transition
/// applies: the initial body read while `Loading`, or either a hot-reload
/// or a delete-triggered teardown while already `Loaded`.
fn on_body_event(inner: &mut LoaderInner, handles: &Handles, strand: ContentId, file: ContentId, stream: Option<ReadStream>) {
    let is_loading = matches!(inner.entries.get(&file), Some(entry::Entry::Loading(_)));
    let is_loaded = matches!(inner.entries.get(&file), Some(entry::Entry::Loaded(_)));

    if is_loading {
        complete_body(inner, handles, strand, file, stream);
    } else if is_loaded {
        match stream {
            Some(stream) => reload(inner, handles, strand, file, stream),
            None => force_known_on_delete(inner, handles, file),
        }
    } else {
        tracing::warn!(file = %file, "file-system event for an entry the loader no longer tracks");
    }
}

fn complete_body(inner: &mut LoaderInner, handles: &Handles, strand: ContentId, file: ContentId, stream: Option<ReadStream>) {
    let filetype_id = match inner.entries.get(&file) {
        Some(entry::Entry::Loading(loading)) => loading.filetype,
        _ => return,
    };

    if let Some(stream) = stream {
        run_load_callback(inner, handles, strand, file, filetype_id, stream);
    } else {
        tracing::warn!(file = %file, "file disappeared before its initial load completed");
    }

    let now_fully_loaded = {
        let Some(entry::Entry::Loading(loading)) = inner.entries.get_mut(&file) else {
            return;
        };
        loading.remaining_count &= !entry::BODY_IN_FLIGHT;
        entry::is_fully_loaded(loading.remaining_count)
    };
    if now_fully_loaded {
        finish_loading(inner, handles, file);
    }
}

/// Underlying file changed while `file` was `Loaded` (spec.md Scenario C:
/// "unready then ready fire on x's own strand with no intervening work").
fn reload(inner: &mut LoaderInner, handles: &Handles, strand: ContentId, file: ContentId, stream: ReadStream) {
    let is_loaded = matches!(inner.entries.get(&file), Some(entry::Entry::Loaded(_)));
    if !is_loaded {
        return;
    }
    let Some(entry::Entry::Loaded(loaded)) = inner.entries.remove(&file) else {
        unreachable!()
    };

    fire_calls(handles, &loaded.calls, file, Direction::Unready);

    let filetype_id = loaded.filetype;
    let loading = entry::LoadingEntry {
        directory: loaded.directory,
        filepath: loaded.filepath,
        filetype: loaded.filetype,
        calls: loaded.calls,
        owners: loaded.owners,
        new_attachments: Vec::new(),
        previous_attachments: loaded.attachments,
        remaining_count: entry::BODY_IN_FLIGHT,
    };
    inner.entries.insert(file, entry::Entry::Loading(loading));

    run_load_callback(inner, handles, strand, file, filetype_id, stream);

    let now_fully_loaded = {
        let Some(entry::Entry::Loading(loading)) = inner.entries.get_mut(&file) else {
            return;
        };
        loading.remaining_count &= !entry::BODY_IN_FLIGHT;
        entry::is_fully_loaded(loading.remaining_count)
    };
    if now_fully_loaded {
        finish_loading(inner, handles, file);
    }
}

/// Underlying file was deleted while `file` was `Loaded`: falls back to
/// `Known` with no owners, cascading unloads, same as
/// `unregister_library`'s effect on a single file.
fn force_known_on_delete(inner: &mut LoaderInner, handles: &Handles, file: ContentId) {
    let is_loaded = matches!(inner.entries.get(&file), Some(entry::Entry::Loaded(_)));
    if !is_loaded {
        return;
    }
    let Some(entry::Entry::Loaded(loaded)) = inner.entries.remove(&file) else {
        unreachable!()
    };
    fire_calls(handles, &loaded.calls, file, Direction::Unready);
    invoke_unload(inner, handles, loaded.filetype, file);
    let attachments = loaded.attachments;
    inner.entries.insert(
        file,
        entry::Entry::Known {
            directory: loaded.directory,
            filepath: loaded.filepath,
        },
    );
    for attachment in attachments {
        release_owner(inner, handles, file, attachment);
    }
}

fn run_load_callback(inner: &mut LoaderInner, handles: &Handles, strand: ContentId, file: ContentId, filetype_id: ContentId, stream: ReadStream) {
    let Some(load_fn) = inner.filetypes.get(&filetype_id).map(|ft| Arc::clone(&ft.load)) else {
        tracing::error!(file = %file, "filetype was unregistered mid-load");
        return;
    };
    let mut ctx = LoadContext { inner, handles, strand, owner: file };
    load_fn(stream, file, &mut ctx);
}

/// Finishes every `Loading` entry whose dependencies and body read have
/// all completed, propagating completion to owners that were themselves
/// waiting on it. A worklist (not recursion) makes dependency cycles
/// terminate deterministically, grounded on `loader.cpp`'s
/// `finish_loading`.
fn finish_loading(inner: &mut LoaderInner, handles: &Handles, file: ContentId) {
    let mut worklist = vec![file];
    while let Some(current) = worklist.pop() {
        let Some(entry::Entry::Loading(loading)) = inner.entries.remove(&current) else {
            continue;
        };
        let entry::LoadingEntry {
            directory,
            filepath,
            filetype,
            calls,
            owners,
            new_attachments,
            previous_attachments,
            ..
        } = loading;

        let stale: Vec<ContentId> = previous_attachments.into_iter().filter(|a| !new_attachments.contains(a)).collect();
        let gating_owners: Vec<ContentId> = calls.iter().filter(|c| c.gating).map(|c| c.owner).collect();

        fire_calls(handles, &calls, current, Direction::Ready);

        inner.entries.insert(
            current,
            entry::Entry::Loaded(entry::LoadedEntry {
                directory,
                filepath,
                filetype,
                calls,
                owners,
                attachments: new_attachments,
            }),
        );

        for attachment in stale {
            release_owner(inner, handles, current, attachment);
        }

        for owner in gating_owners {
            if let Some(entry::Entry::Loading(owner_loading)) = inner.entries.get_mut(&owner) {
                owner_loading.remaining_count -= 1;
                if entry::is_fully_loaded(owner_loading.remaining_count) {
                    worklist.push(owner);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// Unloading
// ---------------------------------------------------------------------

/// Detaches `file` from `owner`'s attachment list; if the attachment was
/// gating (a `load_dependency`), decrements and possibly completes
/// `owner`'s own pending load.
fn detach(inner: &mut LoaderInner, owner: ContentId, file: ContentId, gating: bool) -> Result<(), LoaderError> {
    match inner.entries.get_mut(&owner) {
        Some(entry::Entry::Loading(loading)) => {
            if let Some(pos) = loading.new_attachments.iter().position(|a| *a == file) {
                loading.new_attachments.remove(pos);
            } else if let Some(pos) = loading.previous_attachments.iter().position(|a| *a == file) {
                loading.previous_attachments.remove(pos);
            } else {
                contract::verify(false, "unload: file is not attached to this owner");
                return Err(LoaderError::UnknownFile);
            }
            if gating {
                loading.remaining_count -= 1;
            }
            Ok(())
        }
        Some(entry::Entry::Loaded(loaded)) => {
            if let Some(pos) = loaded.attachments.iter().position(|a| *a == file) {
                loaded.attachments.remove(pos);
                Ok(())
            } else {
                contract::verify(false, "unload: file is not attached to this owner");
                Err(LoaderError::UnknownFile)
            }
        }
        _ => Err(LoaderError::UnknownFile),
    }
}

/// Removes `owner`'s reference to `file` and, once `file`'s owners list
/// empties, tears it all the way back down to `Known`: fires every
/// accumulated call's `unready` once, invokes the filetype's unload, and
/// cascades the same release through `file`'s own attachments. A
/// worklist replaces recursion, grounded on `loader.cpp`'s
/// `remove_attachments`.
fn release_owner(inner: &mut LoaderInner, handles: &Handles, owner: ContentId, file: ContentId) {
    let mut pending = vec![(owner, file)];
    while let Some((owner, file)) = pending.pop() {
        release_one(inner, handles, owner, file, &mut pending);
    }
}

fn release_one(inner: &mut LoaderInner, handles: &Handles, owner: ContentId, file: ContentId, pending: &mut Vec<(ContentId, ContentId)>) {
    let is_loading = matches!(inner.entries.get(&file), Some(entry::Entry::Loading(_)));
    let is_loaded = matches!(inner.entries.get(&file), Some(entry::Entry::Loaded(_)));

    if is_loading {
        let owners_empty = {
            let Some(entry::Entry::Loading(loading)) = inner.entries.get_mut(&file) else {
                return;
            };
            match loading.owners.iter().position(|o| *o == owner) {
                Some(pos) => {
                    loading.owners.remove(pos);
                }
                None => {
                    contract::verify(false, "release: owner is not on this in-flight file's owners list");
                    return;
                }
            }
            loading.owners.is_empty()
        };
        if owners_empty {
            let Some(entry::Entry::Loading(loading)) = inner.entries.remove(&file) else {
                unreachable!()
            };
            let _ = handles.fs.remove_watch(file);
            fire_calls(handles, &loading.calls, file, Direction::Unready);
            let attachments: Vec<ContentId> = loading.new_attachments.into_iter().chain(loading.previous_attachments).collect();
            inner.entries.insert(
                file,
                entry::Entry::Known {
                    directory: loading.directory,
                    filepath: loading.filepath,
                },
            );
            for attachment in attachments {
                pending.push((file, attachment));
            }
        }
        return;
    }

    if is_loaded {
        let owners_empty = {
            let Some(entry::Entry::Loaded(loaded)) = inner.entries.get_mut(&file) else {
                return;
            };
            match loaded.owners.iter().position(|o| *o == owner) {
                Some(pos) => {
                    loaded.owners.remove(pos);
                }
                None => {
                    contract::verify(false, "release: owner is not on this loaded file's owners list");
                    return;
                }
            }
            loaded.owners.is_empty()
        };
        if owners_empty {
            let Some(entry::Entry::Loaded(loaded)) = inner.entries.remove(&file) else {
                unreachable!()
            };
            let _ = handles.fs.remove_watch(file);
            fire_calls(handles, &loaded.calls, file, Direction::Unready);
            invoke_unload(inner, handles, loaded.filetype, file);
            let attachments = loaded.attachments;
            inner.entries.insert(
                file,
                entry::Entry::Known {
                    directory: loaded.directory,
                    filepath: loaded.filepath,
                },
            );
            for attachment in attachments {
                pending.push((file, attachment));
            }
        }
        return;
    }

    contract::verify(false, "release: target file is neither loading nor loaded");
}

fn invoke_unload(inner: &LoaderInner, handles: &Handles, filetype_id: ContentId, file: ContentId) {
    let Some(ft) = inner.filetypes.get(&filetype_id) else {
        return;
    };
    let unload_fn = Arc::clone(&ft.unload);
    let scheduler = Arc::clone(&handles.scheduler);
    let _ = scheduler.post_work(file, move || unload_fn(file));
}

#[derive(Clone, Copy)]
enum Direction {
    Ready,
    Unready,
}

/// Posts every call's ready/unready, in registration order, as one task
/// on `file`'s own strand (spec.md §4.4/§8 invariant 1: these are the
/// only callbacks that ever run there, so nothing can interleave between
/// the unready and ready halves of a reload).
fn fire_calls(handles: &Handles, calls: &[entry::CallEntry], file: ContentId, direction: Direction) {
    if calls.is_empty() {
        return;
    }
    let calls = calls.to_vec();
    let scheduler = Arc::clone(&handles.scheduler);
    let _ = scheduler.post_work(file, move || {
        for call in calls {
            match direction {
                Direction::Ready => (call.ready)(file),
                Direction::Unready => (call.unready)(file),
            }
        }
    });
}

// ---------------------------------------------------------------------
// Public operation entry points (invoked from within a posted closure
// already holding the `LoaderInner` lock; see `crate::Loader`)
// ---------------------------------------------------------------------

pub(crate) fn load_global(
    inner: &mut LoaderInner,
    handles: &Handles,
    strand: ContentId,
    filetype: ContentId,
    file: ContentId,
    ready: ReadyFn,
    unready: UnreadyFn,
) -> Result<(), LoaderError> {
    let resolved = resolve(inner, file)?;
    request_load(inner, handles, strand, filetype, ContentId::GLOBAL, resolved, false, ready, unready)
}

pub(crate) fn load_local(
    inner: &mut LoaderInner,
    handles: &Handles,
    strand: ContentId,
    filetype: ContentId,
    owner: ContentId,
    file: ContentId,
    ready: ReadyFn,
    unready: UnreadyFn,
) -> Result<(), LoaderError> {
    let resolved_owner = resolve(inner, owner)?;
    let resolved_file = resolve(inner, file)?;
    attach_local(inner, resolved_owner, resolved_file)?;
    request_load(inner, handles, strand, filetype, resolved_owner, resolved_file, false, ready, unready)
}

/// `owner` is already concrete here: it is [`LoadContext::owner`], the
/// file whose own `LoadFn` is asserting the dependency, never a stem.
pub(crate) fn load_dependency(
    inner: &mut LoaderInner,
    handles: &Handles,
    strand: ContentId,
    filetype: ContentId,
    owner: ContentId,
    file: ContentId,
    ready: ReadyFn,
    unready: UnreadyFn,
) -> Result<(), LoaderError> {
    let resolved_file = resolve(inner, file)?;
    attach_dependency(inner, owner, resolved_file)?;
    request_load(inner, handles, strand, filetype, owner, resolved_file, true, ready, unready)
}

fn attach_local(inner: &mut LoaderInner, owner: ContentId, file: ContentId) -> Result<(), LoaderError> {
    match inner.entries.get_mut(&owner) {
        Some(entry::Entry::Loading(loading)) => {
            loading.new_attachments.push(file);
            Ok(())
        }
        Some(entry::Entry::Loaded(loaded)) => {
            loaded.attachments.push(file);
            Ok(())
        }
        Some(entry::Entry::Directory) => Err(LoaderError::IsDirectory),
        Some(_) => {
            contract::verify(false, "load_local: owner is neither loading nor loaded");
            Err(LoaderError::NotInLoadCallback)
        }
        None => Err(LoaderError::UnknownFile),
    }
}

fn attach_dependency(inner: &mut LoaderInner, owner: ContentId, file: ContentId) -> Result<(), LoaderError> {
    let dependency_already_loaded = matches!(inner.entries.get(&file), Some(entry::Entry::Loaded(_)));
    match inner.entries.get_mut(&owner) {
        Some(entry::Entry::Loading(loading)) => {
            loading.new_attachments.push(file);
            if !dependency_already_loaded {
                loading.remaining_count += 1;
            }
            Ok(())
        }
        Some(entry::Entry::Loaded(_)) => {
            contract::verify(false, "load_dependency: owner has already finished loading");
            Err(LoaderError::NotInLoadCallback)
        }
        Some(entry::Entry::Directory) => Err(LoaderError::IsDirectory),
        Some(_) => {
            contract::verify(false, "load_dependency: owner is not mid-load");
            Err(LoaderError::NotInLoadCallback)
        }
        None => Err(LoaderError::UnknownFile),
    }
}

pub(crate) fn unload_global(inner: &mut LoaderInner, handles: &Handles, file: ContentId) -> Result<(), LoaderError> {
    let resolved = resolve(inner, file)?;
    release_owner(inner, handles, ContentId::GLOBAL, resolved);
    Ok(())
}

/// Shared by `unload_local`/`unload_dependency`: `gating` tells
/// [`detach`] whether to decrement the owner's `remaining_count`.
pub(crate) fn unload_local(inner: &mut LoaderInner, handles: &Handles, owner: ContentId, file: ContentId, gating: bool) -> Result<(), LoaderError> {
    let resolved_owner = resolve(inner, owner)?;
    let resolved_file = resolve(inner, file)?;
    detach(inner, resolved_owner, resolved_file, gating)?;

    if gating {
        let completed = matches!(
            inner.entries.get(&resolved_owner),
            Some(entry::Entry::Loading(loading)) if entry::is_fully_loaded(loading.remaining_count)
        );
        if completed {
            finish_loading(inner, handles, resolved_owner);
        }
    }

    release_owner(inner, handles, resolved_owner, resolved_file);
    Ok(())
}
