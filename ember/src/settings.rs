//! Persisted boolean settings
//!
//! A flag is a file on the card: present means set. This is read before
//! the configuration subsystem is up, so it only needs a size query.

use crate::host::{Storage, StorageError};
use crate::uart_println;

/// Whether the flag file at `path` exists
///
/// An unreadable card counts as "not set".
pub fn load_flag(storage: &dyn Storage, path: &str) -> bool {
    match storage.file_size(path) {
        Ok(_) => true,
        Err(StorageError::NotFound) => false,
        Err(e) => {
            uart_println!("[BOOT] Could not read {}: {}", path, e);
            false
        }
    }
}
