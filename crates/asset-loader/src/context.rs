//! Handle passed to a filetype's load callback so it can assert
//! dependencies that gate its own completion. Only valid for the
//! duration of that one call.

use asset_core::ContentId;

use crate::entry::LoaderInner;
use crate::error::LoaderError;
use crate::ops;
use crate::{Handles, ReadyFn, UnreadyFn};

/// Handed to a filetype's [`crate::LoadFn`] for the duration of one call.
/// Only valid there: the loader entry for `owner` is guaranteed to be
/// `Loading` while this exists, which is what makes asserting a
/// dependency against it safe.
pub struct LoadContext<'a> {
    pub(crate) inner: &'a mut LoaderInner,
    pub(crate) handles: &'a Handles,
    pub(crate) strand: ContentId,
    pub(crate) owner: ContentId,
}

impl<'a> LoadContext<'a> {
    /// The file currently being loaded; dependencies asserted through this
    /// context are attributed to it as their owner.
    pub fn owner(&self) -> ContentId {
        self.owner
    }

    /// Requests `file` be loaded under `filetype`, gated against this
    /// file's own completion: the owner does not finish loading (and its
    /// `ready` does not fire) until `file` is fully loaded too.
    pub fn load_dependency(&mut self, filetype: ContentId, file: ContentId, ready: ReadyFn, unready: UnreadyFn) -> Result<(), LoaderError> {
        ops::load_dependency(self.inner, self.handles, self.strand, filetype, self.owner, file, ready, unready)
    }
}
