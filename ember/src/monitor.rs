//! Task monitor - counts what the dispatch hook sees
//!
//! Cheap enough to run on every activation: three relaxed counters. Armed
//! by pre-init; until then nothing is counted.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::dispatch::DispatchOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub activations: u32,
    pub fresh_starts: u32,
    pub redirects: u32,
}

pub struct TaskMonitor {
    armed: AtomicBool,
    activations: AtomicU32,
    fresh_starts: AtomicU32,
    redirects: AtomicU32,
}

impl TaskMonitor {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            activations: AtomicU32::new(0),
            fresh_starts: AtomicU32::new(0),
            redirects: AtomicU32::new(0),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn record(&self, outcome: &DispatchOutcome) {
        if !self.is_armed() {
            return;
        }
        self.activations.fetch_add(1, Ordering::Relaxed);
        match outcome {
            DispatchOutcome::Started | DispatchOutcome::Dormant => {
                self.fresh_starts.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::Redirected { .. } => {
                self.fresh_starts.fetch_add(1, Ordering::Relaxed);
                self.redirects.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            activations: self.activations.load(Ordering::Relaxed),
            fresh_starts: self.fresh_starts.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
        }
    }
}

impl Default for TaskMonitor {
    fn default() -> Self {
        Self::new()
    }
}
