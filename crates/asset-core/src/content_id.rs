//! Content identifiers shared by every asset-pipeline crate.
//!
//! Every file, directory, strand and filetype is named by a 32-bit hash of
//! its UTF-8 name. Collisions are assumed absent by production code; in
//! debug builds (or with the `debug-names` feature) a side table maps
//! hashes back to their originating strings so a collision or an unknown
//! hash can be diagnosed by name instead of by a bare integer.

use std::fmt;

#[cfg(feature = "debug-names")]
use dashmap::DashMap;

/// A 32-bit hash of a UTF-8 name, used as the identifier for strands,
/// files, directories and filetypes throughout the pipeline.
///
/// The all-zero value is a deliberate sentinel reused for two distinct
/// purposes: the scheduler's "no ordering" strand ([`ContentId::EMPTY`])
/// and the loader's "global" owner for top-level loads
/// ([`ContentId::GLOBAL`]). Both constants name the same value; which
/// meaning applies depends on which API accepts it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentId(u32);

impl ContentId {
    /// The empty strand: "any worker, no ordering".
    pub const EMPTY: ContentId = ContentId(0);

    /// The sentinel owner used for top-level loads.
    pub const GLOBAL: ContentId = ContentId(0);

    /// Wraps an already-computed hash value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        ContentId(value)
    }

    /// Hashes `name` into a [`ContentId`], recording the source string in
    /// the debug side table when the `debug-names` feature is enabled.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let id = ContentId(fnv1a32(name.as_bytes()));
        #[cfg(feature = "debug-names")]
        id.intern(name);
        id
    }

    /// The raw 32-bit hash value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True for [`ContentId::EMPTY`] / [`ContentId::GLOBAL`].
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[cfg(feature = "debug-names")]
    fn intern(self, name: &str) {
        debug_names().entry(self).or_insert_with(|| name.to_owned());
    }

    /// Best-effort lookup of the source string that produced this id, if
    /// the `debug-names` feature recorded one. Always `None` without the
    /// feature; production code must never depend on this returning
    /// `Some`.
    #[must_use]
    pub fn debug_name(self) -> Option<String> {
        #[cfg(feature = "debug-names")]
        {
            return debug_names().get(&self).map(|s| s.clone());
        }
        #[cfg(not(feature = "debug-names"))]
        {
            None
        }
    }
}

#[cfg(feature = "debug-names")]
fn debug_names() -> &'static DashMap<ContentId, String> {
    static TABLE: std::sync::OnceLock<DashMap<ContentId, String>> = std::sync::OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.debug_name() {
            Some(name) => write!(f, "ContentId({:#010x} /* {name} */)", self.0),
            None => write!(f, "ContentId({:#010x})", self.0),
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.debug_name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl From<&str> for ContentId {
    fn from(name: &str) -> Self {
        ContentId::from_name(name)
    }
}

impl From<u32> for ContentId {
    fn from(value: u32) -> Self {
        ContentId::from_raw(value)
    }
}

/// FNV-1a, 32-bit variant. Deterministic across platforms and process
/// runs; exact collision behavior is not part of the public contract.
const fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_global_share_the_zero_value() {
        assert_eq!(ContentId::EMPTY, ContentId::GLOBAL);
        assert!(ContentId::EMPTY.is_empty());
    }

    #[test]
    fn from_name_is_deterministic() {
        assert_eq!(ContentId::from_name("sprite.png"), ContentId::from_name("sprite.png"));
        assert_ne!(ContentId::from_name("sprite.png"), ContentId::from_name("sprite.jpg"));
    }

    #[test]
    fn nonzero_name_is_not_empty() {
        assert!(!ContentId::from_name("x").is_empty());
    }

    #[cfg(feature = "debug-names")]
    #[test]
    fn debug_name_round_trips() {
        let id = ContentId::from_name("dependency.1");
        assert_eq!(id.debug_name().as_deref(), Some("dependency.1"));
    }

    #[test]
    fn display_falls_back_to_hex_without_a_name() {
        let id = ContentId::from_raw(0xdead_beef);
        // Only assert the fallback form when nothing has interned this
        // exact value under a name.
        if id.debug_name().is_none() {
            assert_eq!(format!("{id}"), "0xdeadbeef");
        }
    }
}
