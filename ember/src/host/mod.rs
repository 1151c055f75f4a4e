//! # Host Interface
//!
//! Everything Ember consumes from the camera firmware. The host is closed:
//! we only see a handful of entry points, two function-pointer slots and a
//! task control block we are allowed to peek at while it is being
//! dispatched.
//!
//! - [`Host`]: task creation, timing, display and LED, hook slots
//! - [`Storage`]: the few file operations boot needs
//! - [`Subsystems`]: Ember's own services that the Bootstrap Task brings up
//!   (memory pool, card, fonts, configuration)

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

pub mod raw;
#[cfg(test)]
pub mod mock;

/// Entry point of a host task
pub type TaskFn = extern "C" fn(arg: usize);

/// High-precision timer callback; `arg` is whatever was passed when scheduling
pub type TimerCallback = fn(host: &dyn Host, arg: usize);

/// The address a task starts at
///
/// The host only tells tasks apart by their entry address, so that is what
/// identifies a task here. Keeping the comparison behind this type means a
/// different identification scheme only has to change this one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryPoint(usize);

impl EntryPoint {
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub fn of(entry: TaskFn) -> Self {
        Self(entry as usize)
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Everything the host's `task_create` needs
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub name: &'static str,
    pub priority: u32,
    pub stack_size: u32,
    pub entry: TaskFn,
    pub arg: usize,
}

/// Coarse camera state recorded with crash messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShootingState {
    pub live_view: bool,
    pub mode: i32,
}

/// Errors reported by the host firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostError {
    /// `task_create` refused the task (out of task slots or stack)
    TaskCreateFailed,
    /// The timer pool is exhausted
    TimerUnavailable,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HostError::TaskCreateFailed => write!(f, "task creation failed"),
            HostError::TimerUnavailable => write!(f, "no timer available"),
        }
    }
}

/// Errors from the storage card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    NoCard,
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "file not found"),
            StorageError::NoCard => write!(f, "no card selected"),
            StorageError::Io => write!(f, "I/O error"),
        }
    }
}

/// Errors from Ember's own subsystems during bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemError {
    /// The memory pool could not be set up
    NoMemory,
    /// No usable storage volume
    NoCard,
    /// A required file is missing
    NotFound,
    /// Anything else the subsystem could not recover from
    Failed,
}

impl fmt::Display for SubsystemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubsystemError::NoMemory => write!(f, "out of memory"),
            SubsystemError::NoCard => write!(f, "no card"),
            SubsystemError::NotFound => write!(f, "not found"),
            SubsystemError::Failed => write!(f, "failed"),
        }
    }
}

/// A word-sized function-pointer cell owned by the host
///
/// The host has exactly one dispatch-notification slot and one assert
/// handler slot. Ember reads the old value (to chain) and writes its own.
pub trait HookSlot: Sync {
    fn load(&self) -> usize;
    fn store(&self, value: usize);
}

impl HookSlot for AtomicUsize {
    fn load(&self) -> usize {
        AtomicUsize::load(self, Ordering::Acquire)
    }

    fn store(&self, value: usize) {
        AtomicUsize::store(self, value, Ordering::Release)
    }
}

/// A slot at a fixed address in host memory
pub struct MemorySlot {
    addr: usize,
}

impl MemorySlot {
    /// # Safety
    /// `addr` must be a valid, aligned, word-sized location that stays
    /// mapped for the life of the firmware.
    pub const unsafe fn new(addr: usize) -> Self {
        Self { addr }
    }

    pub const fn addr(&self) -> usize {
        self.addr
    }
}

impl HookSlot for MemorySlot {
    fn load(&self) -> usize {
        // SAFETY: validity of `addr` is the contract of `MemorySlot::new`
        unsafe { core::ptr::read_volatile(self.addr as *const usize) }
    }

    fn store(&self, value: usize) {
        // SAFETY: see `load`
        unsafe { core::ptr::write_volatile(self.addr as *mut usize, value) }
    }
}

/// The host firmware as seen from Ember
pub trait Host: Sync {
    fn create_task(&self, spec: &TaskSpec) -> Result<(), HostError>;

    /// Suspend the calling task
    fn sleep_ms(&self, ms: u32);

    /// Whether the host has set up its display memory yet
    fn display_ready(&self) -> bool;

    fn disable_power_save(&self);

    fn set_card_led(&self, on: bool);

    /// Run `callback(host, arg)` from timer context after `delay_us`
    fn schedule_timer(&self, delay_us: u32, callback: TimerCallback, arg: usize) -> Result<(), HostError>;

    fn current_task_name(&self) -> &str;

    fn shooting_state(&self) -> ShootingState;

    /// Text appended to the version string the host displays
    fn set_version_suffix(&self, suffix: &str);

    /// Best-effort backtrace of the current task
    fn backtrace(&self, out: &mut dyn fmt::Write) {
        let _ = out;
    }

    fn dispatch_slot(&self) -> &dyn HookSlot;

    fn assert_slot(&self) -> &dyn HookSlot;
}

/// The card, as far as boot is concerned
pub trait Storage: Sync {
    /// Size of `path` in bytes
    fn file_size(&self, path: &str) -> Result<u32, StorageError>;

    /// Create or truncate `path` and write `data` to it
    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;
}

/// Ember's own services, brought up by the Bootstrap Task in this order
pub trait Subsystems: Sync {
    fn init_memory(&self) -> Result<(), SubsystemError>;

    fn find_card(&self) -> Result<(), SubsystemError>;

    fn load_fonts(&self) -> Result<(), SubsystemError>;

    fn load_config(&self) -> Result<(), SubsystemError>;

    /// Tweaks that need the configuration (location services and such)
    fn post_config(&self) -> Result<(), SubsystemError> {
        Ok(())
    }
}
