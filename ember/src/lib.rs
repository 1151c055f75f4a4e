//! # Ember - the spark under the host's scheduler
//!
//! Ember lives inside a closed camera RTOS it cannot modify. It rides the
//! host's task-dispatch notification to swap in its own entry points for a
//! few host tasks, then brings its own services up in a strict order while
//! the host finishes booting around it.
//!
//! ## Architecture
//! - **Registries**: override, auto-start and init-function tables, sealed
//!   before the host starts dispatching
//! - **Dispatch Interceptor**: redirects tasks that enter through the
//!   host's start trampoline
//! - **Boot Sequencer**: `pre_init` / `post_init`, called around the host's
//!   own init task
//! - **Bootstrap Task**: ordered bring-up ending in the auto-start tasks
//! - **Readiness Gate**: "configuration is loaded", shared with every task
//! - **Crash Interceptor**: chains onto the host's assert handler
//!
//! The firmware image provides a [`boot::Environment`] through
//! [`boot::entry::attach`] and links against the `extern "C"` shims in
//! [`boot::entry`].

#![cfg_attr(not(test), no_std)]

pub mod console;
pub mod config;
pub mod host;
pub mod registry;
pub mod dispatch;
pub mod boot;
pub mod crash;
pub mod indicator;
pub mod settings;
pub mod version;
#[cfg(feature = "task-monitor")]
pub mod monitor;

// Re-export key types
pub use boot::{Environment, Framework, FRAMEWORK};
pub use boot::state::{BootPhase, BootState, InstalledHooks};
pub use boot::bootstrap::{BootOutcome, BootReport, BootStep, StepStatus};
pub use config::BootConfig;
pub use dispatch::{DispatchOutcome, DispatchedTask, ScanPolicy};
pub use host::{EntryPoint, Host, HostError, Storage, StorageError, Subsystems, SubsystemError, TaskFn, TaskSpec};
pub use registry::{AutoStartEntry, AutoStartTable, InitFunc, InitTable, OverrideEntry, OverrideTable, RegistryError};

/// Panic handler for bare-metal images
///
/// A panic is an internal invariant violation, so it lands in the
/// diagnostic buffer the same way `ember_assert!` does.
#[cfg(all(not(test), feature = "panic-handler"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    boot::entry::panicked(info);
    loop {
        core::hint::spin_loop();
    }
}
