//! Firmware entry points
//!
//! The firmware image calls `attach` once with its platform bindings, then
//! links the host's boot hooks to `boot_pre_init_task` and
//! `boot_post_init_task`. Everything else is reached through the hook
//! slots or from Ember's own tasks.

use core::ffi::{c_char, c_void, CStr};
use core::fmt;
use spin::Once;

use super::{Environment, FRAMEWORK};
use crate::crash::{self, AssertArgs};
use crate::host::raw::RawTask;
use crate::uart_println;

static PLATFORM: Once<Environment<'static>> = Once::new();

/// Bind the platform; returns `false` if one was already bound
pub fn attach(env: Environment<'static>) -> bool {
    let mut fresh = false;
    PLATFORM.call_once(|| {
        fresh = true;
        env
    });
    fresh
}

pub fn platform() -> Option<&'static Environment<'static>> {
    PLATFORM.get()
}

/// Called by the host before its init task
#[no_mangle]
pub extern "C" fn boot_pre_init_task() {
    if let Some(env) = platform() {
        FRAMEWORK.pre_init(env);
    }
}

/// Called by the host right after its init task
#[no_mangle]
pub extern "C" fn boot_post_init_task() {
    if let Some(env) = platform() {
        // Already logged; the host boots on without Ember
        let _ = FRAMEWORK.post_init(env);
    }
}

/// Entry of the Bootstrap Task
pub extern "C" fn bootstrap_task_entry(_arg: usize) {
    let Some(env) = platform() else {
        return;
    };
    let report = FRAMEWORK.run_bootstrap(env);
    if report.is_degraded() {
        for record in report.steps.iter() {
            uart_println!("[BOOT] {:?}: {:?}", record.step, record.status);
        }
    }
}

/// Installed into the host's dispatch notification slot
///
/// # Safety
/// Called by the host scheduler only; `next` is null or the task about to
/// run, and nothing else touches it until this returns.
pub unsafe extern "C" fn dispatch_hook(_context: *mut c_void, _prev: *mut RawTask, next: *mut RawTask) {
    FRAMEWORK.on_dispatch(next.as_mut());
}

/// Installed into the host's assert handler slot
///
/// # Safety
/// Called by the host with NUL-terminated (or null) `msg` and `file`.
pub unsafe extern "C" fn assert_hook(msg: *const c_char, file: *const c_char, line: i32, arg4: i32) -> i32 {
    let lr = crash::return_address();
    let args = AssertArgs {
        msg: c_str_or(msg, c"?"),
        file: c_str_or(file, c"?"),
        line,
        arg4,
    };
    FRAMEWORK.on_host_assert(platform().map(|env| env.host), &args, lr)
}

unsafe fn c_str_or<'a>(ptr: *const c_char, fallback: &'a CStr) -> &'a CStr {
    if ptr.is_null() {
        fallback
    } else {
        CStr::from_ptr(ptr)
    }
}

/// Backend of `ember_assert!`
pub fn assert_failed(msg: &dyn fmt::Display, file: &str, line: u32, func: &str) {
    FRAMEWORK.self_assert(platform().map(|env| env.host), msg, file, line, func);
}

/// Record a panic the same way a failed `ember_assert!` is recorded
pub fn panicked(info: &core::panic::PanicInfo) {
    let (file, line) = info
        .location()
        .map(|loc| (loc.file(), loc.line()))
        .unwrap_or(("?", 0));
    FRAMEWORK.self_assert(platform().map(|env| env.host), info, file, line, "panic");
}

/// Block until configuration is loaded
///
/// For overridden host tasks that need settings before doing anything.
pub fn wait_for_config() {
    match platform() {
        Some(env) => FRAMEWORK.state().wait_until_ready(env.host, env.config.ready_poll_ms),
        None => {
            while !FRAMEWORK.state().is_ready() {
                core::hint::spin_loop();
            }
        }
    }
}

/// Early button check: skip (or require) loading Ember this boot
pub fn request_bypass() -> bool {
    FRAMEWORK.state().request_bypass()
}

/// The overridden GUI task reports in
pub fn mark_gui_initialized() {
    FRAMEWORK.state().mark_gui_initialized();
}

pub fn is_disabled() -> bool {
    FRAMEWORK.state().is_disabled()
}

pub fn is_started() -> bool {
    FRAMEWORK.state().is_started()
}

/// Write a pending crash log to the card
pub fn persist_crash_log() -> usize {
    let Some(env) = platform() else {
        return 0;
    };
    match FRAMEWORK.persist_crash_log(env) {
        Ok(written) => written,
        Err(e) => {
            uart_println!("[CRASH] Could not save crash log: {}", e);
            0
        }
    }
}
