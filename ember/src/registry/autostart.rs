//! Auto-start tasks and one-shot init routines
//!
//! Both tables are consumed by the Bootstrap Task: init routines run
//! before configuration is loaded, auto-start tasks are created after the
//! Readiness Gate opens. Order is registration order in both.

use super::Registry;
use crate::host::{Host, TaskFn, TaskSpec};
use crate::uart_println;

pub const MAX_AUTOSTART: usize = 32;
pub const MAX_INIT_FUNCS: usize = 32;

/// A task created unconditionally during bring-up
#[derive(Debug, Clone, Copy)]
pub struct AutoStartEntry {
    pub name: &'static str,
    pub priority: u32,
    pub stack_size: u32,
    pub entry: TaskFn,
    pub arg: usize,
}

impl AutoStartEntry {
    pub const fn new(name: &'static str, priority: u32, stack_size: u32, entry: TaskFn) -> Self {
        Self { name, priority, stack_size, entry, arg: 0 }
    }

    pub const fn with_arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            name: self.name,
            priority: self.priority,
            stack_size: self.stack_size,
            entry: self.entry,
            arg: self.arg,
        }
    }
}

pub type AutoStartTable = Registry<AutoStartEntry, MAX_AUTOSTART>;

/// A routine run once, synchronously, before configuration is loaded
#[derive(Debug, Clone, Copy)]
pub struct InitFunc {
    pub name: &'static str,
    pub entry: fn(),
}

impl InitFunc {
    pub const fn new(name: &'static str, entry: fn()) -> Self {
        Self { name, entry }
    }
}

pub type InitTable = Registry<InitFunc, MAX_INIT_FUNCS>;

/// What happened when the auto-start tasks were created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoStartSummary {
    pub created: u32,
    pub failed: u32,
}

/// Create every task in `table`, in order
///
/// A task the host refuses is logged and counted; the rest are still
/// created.
pub fn create_all<const N: usize>(host: &dyn Host, table: &Registry<AutoStartEntry, N>) -> AutoStartSummary {
    let mut summary = AutoStartSummary::default();
    for entry in table {
        match host.create_task(&entry.spec()) {
            Ok(()) => summary.created += 1,
            Err(e) => {
                uart_println!("[INIT] Could not start task {}: {}", entry.name, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Run every init routine in `table`, in order; returns how many ran
pub fn run_all<const N: usize>(table: &Registry<InitFunc, N>) -> usize {
    for func in table {
        uart_println!("[INIT] {}", func.name);
        (func.entry)();
    }
    table.len()
}
