//! Sequence lock guarding the tile mapping.
//!
//! The counter is even while the mapping is stable and odd while a writer is
//! inside its critical section. Readers never block: they remember the
//! version they started with and discard their work when it moved.

use std::sync::atomic::{AtomicU64, Ordering};

pub type Version = u64;

#[derive(Debug, Default)]
pub struct VersionTag {
    sequence: AtomicU64,
}

/// Ends the write section when dropped.
#[must_use = "the mapping is only locked while the guard is alive"]
#[derive(Debug)]
pub struct VersionWriteGuard<'a> {
    tag: &'a VersionTag,
}

impl VersionTag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the write section. There is exactly one writer, the interactive
    /// thread, so nested or concurrent locking is a programming error.
    pub fn lock(&self) -> VersionWriteGuard<'_> {
        let previous = self.sequence.fetch_add(1, Ordering::AcqRel);
        assert!(
            !Self::is_locked(previous),
            "version tag locked twice; the mapping has a single writer"
        );
        VersionWriteGuard { tag: self }
    }

    pub fn version(&self) -> Version {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn is_locked(version: Version) -> bool {
        version % 2 == 1
    }

    /// Whether the mapping was touched since `version` was read.
    pub fn changed(&self, version: Version) -> bool {
        self.version() != version
    }
}

impl Drop for VersionWriteGuard<'_> {
    fn drop(&mut self) {
        self.tag.sequence.fetch_add(1, Ordering::Release);
    }
}
