//! # Crash and Assert Interception
//!
//! The host has a single assert handler slot. Ember puts its own handler
//! there and keeps the old one: on every host assert the message, location
//! and camera state are captured into the diagnostic buffer, then the old
//! handler gets the untouched arguments so the host still shows its own
//! error screen.
//!
//! Ember's own assertions (`ember_assert!`) take the same capture path but
//! are not forwarded anywhere.
//!
//! Everything here may run with the rest of the system broken. It formats
//! into a fixed buffer and touches nothing else.

pub mod diagnostic;

use core::ffi::{c_char, CStr};
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::{Mutex, MutexGuard};

use self::diagnostic::{DiagnosticBuffer, DIAGNOSTIC_CAPACITY};
use crate::host::{Host, ShootingState, Storage, StorageError};
use crate::qprintln;

/// Signature of the host's assert handler
pub type AssertFn =
    unsafe extern "C" fn(msg: *const c_char, file: *const c_char, line: i32, arg4: i32) -> i32;

/// Attempts a reader makes before treating the buffer lock as abandoned
const READ_SPIN_LIMIT: u32 = 100_000;

/// Why a crash log is waiting to be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CrashSeverity {
    /// An assert raised inside the host (or caught by its handler)
    HostAssert = 1,
    /// An `ember_assert!` or a panic inside Ember
    SelfAssert = 2,
}

impl CrashSeverity {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(CrashSeverity::HostAssert),
            2 => Some(CrashSeverity::SelfAssert),
            _ => None,
        }
    }
}

/// Arguments of one host assert, exactly as the host passed them
#[derive(Debug, Clone, Copy)]
pub struct AssertArgs<'a> {
    pub msg: &'a CStr,
    pub file: &'a CStr,
    pub line: i32,
    pub arg4: i32,
}

impl AssertArgs<'_> {
    pub fn msg_str(&self) -> &str {
        self.msg.to_str().unwrap_or("?")
    }

    pub fn file_str(&self) -> &str {
        self.file.to_str().unwrap_or("?")
    }
}

/// Something that can take a host assert
pub trait AssertHandler: Sync {
    fn handle(&self, args: &AssertArgs) -> i32;
}

/// The handler that was in the host slot before Ember
pub struct ForeignAssert {
    func: AssertFn,
}

impl ForeignAssert {
    /// # Safety
    /// A non-zero `addr` must be the address of a function with the
    /// [`AssertFn`] signature.
    pub unsafe fn from_addr(addr: usize) -> Option<Self> {
        if addr == 0 {
            return None;
        }
        Some(Self {
            func: core::mem::transmute::<usize, AssertFn>(addr),
        })
    }

    pub fn addr(&self) -> usize {
        self.func as usize
    }
}

impl AssertHandler for ForeignAssert {
    fn handle(&self, args: &AssertArgs) -> i32 {
        // SAFETY: `func` came out of the host slot, see `from_addr`
        unsafe { (self.func)(args.msg.as_ptr(), args.file.as_ptr(), args.line, args.arg4) }
    }
}

/// Capture first, then hand the assert on to whatever was there before
pub struct ChainedAssertHandler<H> {
    previous: Option<H>,
}

impl<H: AssertHandler> ChainedAssertHandler<H> {
    pub const fn new(previous: Option<H>) -> Self {
        Self { previous }
    }

    pub fn previous(&self) -> Option<&H> {
        self.previous.as_ref()
    }

    /// Returns the previous handler's result, 0 when there was none
    pub fn handle(&self, log: &CrashLog, host: &dyn Host, args: &AssertArgs, return_address: usize) -> i32 {
        log.capture_host_assert(host, args, return_address);
        match &self.previous {
            Some(previous) => previous.handle(args),
            None => 0,
        }
    }
}

/// The diagnostic buffer plus the "please persist me" flag
pub struct CrashLog {
    buffer: Mutex<DiagnosticBuffer>,
    pending: AtomicU8,
}

impl CrashLog {
    pub const fn new() -> Self {
        Self {
            buffer: Mutex::new(DiagnosticBuffer::new()),
            pending: AtomicU8::new(0),
        }
    }

    /// Lock the buffer from fault context
    ///
    /// A writer that faulted (or was interrupted by the fault) will never
    /// release the lock, so it is taken over. Last write wins.
    fn lock_for_fault(&self) -> MutexGuard<'_, DiagnosticBuffer> {
        if let Some(guard) = self.buffer.try_lock() {
            return guard;
        }
        // SAFETY: the previous holder is the interrupted writer; the buffer
        // holds plain bytes and a length that is always in bounds
        unsafe { self.buffer.force_unlock() };
        self.buffer.lock()
    }

    /// Lock the buffer from task context
    ///
    /// A live writer only holds the lock for one formatted capture. Still
    /// held after [`READ_SPIN_LIMIT`] tries means the writer died inside a
    /// capture, and the lock is taken over the same way a fault would.
    fn lock_for_read(&self) -> MutexGuard<'_, DiagnosticBuffer> {
        for _ in 0..READ_SPIN_LIMIT {
            if let Some(guard) = self.buffer.try_lock() {
                return guard;
            }
            core::hint::spin_loop();
        }
        self.lock_for_fault()
    }

    fn mark_pending(&self, severity: CrashSeverity) {
        self.pending.store(severity as u8, Ordering::Release);
    }

    pub fn capture_host_assert(&self, host: &dyn Host, args: &AssertArgs, return_address: usize) {
        let ShootingState { live_view, mode } = host.shooting_state();
        {
            let mut buffer = self.lock_for_fault();
            buffer.capture(format_args!(
                "ASSERT: {}\nat {}:{}, {}:{:x}\nlv:{} mode:{}\n\n",
                args.msg_str(),
                args.file_str(),
                args.line,
                host.current_task_name(),
                return_address,
                live_view as u8,
                mode,
            ));
            buffer.append_with(|out| host.backtrace(out));
        }
        self.mark_pending(CrashSeverity::HostAssert);
        qprintln!("[CRASH] {} at {}:{}", args.msg_str(), args.file_str(), args.line);
    }

    /// Capture an assertion raised by Ember itself
    ///
    /// `host` is `None` when the platform was never attached; the task name
    /// and camera state are then unknown.
    pub fn capture_self_assert(
        &self,
        host: Option<&dyn Host>,
        msg: &dyn fmt::Display,
        file: &str,
        line: u32,
        func: &str,
    ) {
        let task = host.map(|h| h.current_task_name()).unwrap_or("?");
        let ShootingState { live_view, mode } = host.map(|h| h.shooting_state()).unwrap_or_default();
        {
            let mut buffer = self.lock_for_fault();
            buffer.capture(format_args!(
                "EMBER ASSERT:\n{}\nat {}:{} ({}), task {}\nlv:{} mode:{}\n\n",
                msg, file, line, func, task, live_view as u8, mode,
            ));
            if let Some(host) = host {
                buffer.append_with(|out| host.backtrace(out));
            }
        }
        self.mark_pending(CrashSeverity::SelfAssert);
        qprintln!("[CRASH] Ember assert at {}:{}", file, line);
    }

    /// Store a plain crash message
    pub fn record_message(&self, msg: &str) {
        self.lock_for_fault().capture(format_args!("{}", msg));
        self.mark_pending(CrashSeverity::HostAssert);
    }

    pub fn pending(&self) -> Option<CrashSeverity> {
        CrashSeverity::from_u8(self.pending.load(Ordering::Acquire))
    }

    /// Clear and return the pending request
    pub fn take_request(&self) -> Option<CrashSeverity> {
        CrashSeverity::from_u8(self.pending.swap(0, Ordering::AcqRel))
    }

    /// Copy of the current diagnostic text
    pub fn snapshot(&self) -> heapless::String<DIAGNOSTIC_CAPACITY> {
        let mut text = heapless::String::new();
        let _ = text.push_str(self.lock_for_read().as_str());
        text
    }

    /// Write the pending diagnostic to `path`
    ///
    /// Returns the number of bytes written, 0 when nothing was pending. A
    /// failed write leaves the request pending for the next attempt.
    pub fn persist(&self, storage: &dyn Storage, path: &str) -> Result<usize, StorageError> {
        let Some(severity) = self.take_request() else {
            return Ok(0);
        };
        let text = self.snapshot();
        match storage.write_file(path, text.as_bytes()) {
            Ok(()) => Ok(text.len()),
            Err(e) => {
                // Keep the request unless a newer fault already replaced it
                let _ = self.pending.compare_exchange(
                    0,
                    severity as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                Err(e)
            }
        }
    }
}

impl Default for CrashLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Address the current function will return to, 0 where unknown
#[inline(always)]
pub fn return_address() -> usize {
    #[cfg(target_arch = "arm")]
    {
        let lr: usize;
        // SAFETY: reads a register, touches no memory
        unsafe {
            core::arch::asm!("mov {}, lr", out(reg) lr, options(nomem, nostack, preserves_flags));
        }
        lr
    }
    #[cfg(not(target_arch = "arm"))]
    {
        0
    }
}

/// Check an invariant; on failure capture it into the crash log
///
/// Unlike `assert!` this never panics: the failure is recorded and
/// execution continues.
#[macro_export]
macro_rules! ember_assert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::boot::entry::assert_failed(&stringify!($cond), file!(), line!(), module_path!());
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::boot::entry::assert_failed(&format_args!($($arg)+), file!(), line!(), module_path!());
        }
    };
}
