//! Boot configuration
//!
//! Model-specific addresses and the timing of the boot sequence. The
//! defaults are the values every supported body has shipped with; only
//! the trampoline address differs per firmware.

use crate::boot::entry;
use crate::dispatch::ScanPolicy;
use crate::host::TaskFn;

#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Address every new host task enters through
    pub trampoline: usize,
    pub scan_policy: ScanPolicy,

    /// Display memory readiness poll
    pub display_poll_ms: u32,
    /// GUI-initialized poll interval and attempts before giving up
    pub gui_poll_ms: u32,
    pub gui_poll_attempts: u32,
    /// Extra wait once the GUI poll ends
    pub gui_settle_ms: u32,
    /// Readiness Gate poll for tasks waiting on configuration
    pub ready_poll_ms: u32,

    pub bootstrap_name: &'static str,
    pub bootstrap_priority: u32,
    pub bootstrap_stack: u32,
    pub bootstrap_entry: TaskFn,

    /// Property handlers settle after init functions ran
    pub property_settle_ms: u32,
    /// Delay between creating the auto-start tasks and `Started`
    pub started_settle_ms: u32,
    /// LED fade start after a veto
    pub fade_delay_us: u32,

    /// Present when the bypass button must be held to *enable* Ember
    pub require_trigger_path: &'static str,
    pub crash_log_path: &'static str,
}

impl BootConfig {
    pub const fn new(trampoline: usize) -> Self {
        Self {
            trampoline,
            scan_policy: ScanPolicy::StopWhenStarted,
            display_poll_ms: 100,
            gui_poll_ms: 50,
            gui_poll_attempts: 50,
            gui_settle_ms: 50,
            ready_poll_ms: 100,
            bootstrap_name: "ember_init",
            bootstrap_priority: 0x1e,
            bootstrap_stack: 0x4000,
            bootstrap_entry: entry::bootstrap_task_entry,
            property_settle_ms: 200,
            started_settle_ms: 500,
            fade_delay_us: 1000,
            require_trigger_path: "EMBER/SETTINGS/REQUIRE.SET",
            crash_log_path: "EMBER/LOGS/CRASH.LOG",
        }
    }

    pub const fn with_scan_policy(mut self, policy: ScanPolicy) -> Self {
        self.scan_policy = policy;
        self
    }

    pub const fn with_bootstrap_entry(mut self, entry: TaskFn) -> Self {
        self.bootstrap_entry = entry;
        self
    }
}

impl Default for BootConfig {
    /// No trampoline: nothing is redirected until one is set
    fn default() -> Self {
        Self::new(0)
    }
}
