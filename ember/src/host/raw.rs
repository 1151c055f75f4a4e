//! Raw host task control block
//!
//! Only the fields Ember touches are named, the rest is padding. Offsets
//! are those of the 32-bit ARM control block the scheduler passes to its
//! dispatch notification.

use core::ffi::{c_char, CStr};

use super::EntryPoint;
use crate::dispatch::DispatchedTask;

/// Saved register file of a task that is not running
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RawContext {
    pub cpsr: u32,
    pub r: [u32; 13],
    pub lr: u32,
    /// Where the task resumes; the start trampoline for a fresh task
    pub pc: u32,
}

/// Host task control block
#[repr(C)]
pub struct RawTask {
    pub prev: *mut RawTask,
    pub next: *mut RawTask,
    pub run_prio: u32,
    pub entry: usize,
    pub arg: usize,
    pub wait_obj: u32,
    _reserved0: u32,
    pub stack_start: u32,
    pub stack_size: u32,
    pub name: *const c_char,
    _reserved1: [u32; 11],
    pub context: *mut RawContext,
}

impl RawTask {
    /// A detached control block, as the host lays one out before linking it in
    pub const fn new(entry: usize, arg: usize, name: *const c_char, context: *mut RawContext) -> Self {
        Self {
            prev: core::ptr::null_mut(),
            next: core::ptr::null_mut(),
            run_prio: 0,
            entry,
            arg,
            wait_obj: 0,
            _reserved0: 0,
            stack_start: 0,
            stack_size: 0,
            name,
            _reserved1: [0; 11],
            context,
        }
    }
}

impl DispatchedTask for RawTask {
    fn entry(&self) -> EntryPoint {
        EntryPoint::from_addr(self.entry)
    }

    fn set_entry(&mut self, entry: EntryPoint) {
        self.entry = entry.addr();
    }

    fn arg(&self) -> usize {
        self.arg
    }

    fn name(&self) -> &str {
        if self.name.is_null() {
            return "?";
        }
        // SAFETY: task names are static NUL-terminated strings in host ROM
        unsafe { CStr::from_ptr(self.name) }.to_str().unwrap_or("?")
    }

    fn resume_pc(&self) -> Option<usize> {
        // SAFETY: while the task is being dispatched its context is either
        // null or the live saved register file
        unsafe { self.context.as_ref() }.map(|ctx| ctx.pc as usize)
    }
}
