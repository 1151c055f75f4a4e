//! # Registries
//!
//! Fixed-capacity tables the firmware image fills in before the host
//! starts dispatching, then seals. After sealing they are read without
//! locks from any task and from the dispatch hook.
//!
//! - [`overrides`]: original task entry -> replacement entry
//! - [`autostart`]: tasks the Bootstrap Task creates, and one-shot init
//!   routines it runs

pub mod autostart;
pub mod overrides;

pub use autostart::{AutoStartEntry, AutoStartSummary, AutoStartTable, InitFunc, InitTable};
pub use overrides::{OverrideEntry, OverrideTable};

use core::fmt;
use spin::Once;

/// Registration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The table has no room for another entry
    Full,
    /// The table was already handed to the framework
    AlreadySealed,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::Full => write!(f, "registry is full"),
            RegistryError::AlreadySealed => write!(f, "registry is already sealed"),
        }
    }
}

/// An ordered table of at most `N` entries
pub struct Registry<T, const N: usize> {
    entries: heapless::Vec<T, N>,
}

impl<T, const N: usize> Registry<T, N> {
    pub const fn new() -> Self {
        Self { entries: heapless::Vec::new() }
    }

    /// Append an entry; registration order is preserved
    pub fn push(&mut self, entry: T) -> Result<(), RegistryError> {
        self.entries.push(entry).map_err(|_| RegistryError::Full)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for Registry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a Registry<T, N> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A value that is written once and read-only afterwards
pub struct Sealed<T> {
    cell: Once<T>,
}

impl<T> Sealed<T> {
    pub const fn new() -> Self {
        Self { cell: Once::new() }
    }

    /// Store `value`; a second seal is refused and the value dropped
    pub fn seal(&self, value: T) -> Result<&T, RegistryError> {
        let mut fresh = false;
        let sealed = self.cell.call_once(|| {
            fresh = true;
            value
        });
        if fresh {
            Ok(sealed)
        } else {
            Err(RegistryError::AlreadySealed)
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_sealed(&self) -> bool {
        self.cell.is_completed()
    }
}

impl<T> Default for Sealed<T> {
    fn default() -> Self {
        Self::new()
    }
}
