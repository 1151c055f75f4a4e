//! Override registry: which host tasks get a different entry point

use super::Registry;
use crate::host::{EntryPoint, TaskFn};

/// Most host tasks Ember can stand in for
pub const MAX_OVERRIDES: usize = 16;

/// Replace the host task starting at `original` with `replacement`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideEntry {
    pub original: EntryPoint,
    pub replacement: EntryPoint,
}

impl OverrideEntry {
    pub const fn new(original: EntryPoint, replacement: EntryPoint) -> Self {
        Self { original, replacement }
    }

    /// Override the host task at address `original` with an Ember task
    pub fn task(original: usize, replacement: TaskFn) -> Self {
        Self::new(EntryPoint::from_addr(original), EntryPoint::of(replacement))
    }
}

pub type OverrideTable = Registry<OverrideEntry, MAX_OVERRIDES>;

impl<const N: usize> Registry<OverrideEntry, N> {
    /// Replacement for `candidate`; the first matching entry wins
    pub fn lookup(&self, candidate: EntryPoint) -> Option<EntryPoint> {
        self.iter()
            .find(|entry| entry.original == candidate)
            .map(|entry| entry.replacement)
    }

    /// Whether `entry` is something a host task was redirected to
    pub fn is_replacement(&self, entry: EntryPoint) -> bool {
        self.iter().any(|e| e.replacement == entry)
    }
}
