//! # Boot Sequencer
//!
//! The host calls into Ember twice while it boots:
//!
//! - **pre-init**, before the host's own init task: the dispatch hook goes
//!   in, so every host task started from then on passes the interceptor
//! - **post-init**, right after the host's init task returned while the
//!   host keeps initializing in the background: the assert handler is
//!   chained, the version string is tagged, and once display and GUI are
//!   up the Bootstrap Task is created to do the rest
//!
//! All state lives in one [`Framework`]. The firmware image uses the
//! [`FRAMEWORK`] static through the shims in [`entry`]; tests build their
//! own.

pub mod bootstrap;
pub mod entry;
pub mod state;


use core::fmt;
use spin::Once;

use self::state::{BootState, InstalledHooks};
use crate::config::BootConfig;
use crate::crash::diagnostic::DIAGNOSTIC_CAPACITY;
use crate::crash::{AssertArgs, AssertHandler, ChainedAssertHandler, CrashLog, CrashSeverity, ForeignAssert};
use crate::dispatch::{DispatchInterceptor, DispatchOutcome, DispatchedTask};
use crate::host::{HookSlot, Host, HostError, Storage, StorageError, Subsystems, TaskSpec};
#[cfg(feature = "task-monitor")]
use crate::monitor::{MonitorStats, TaskMonitor};
use crate::registry::{AutoStartTable, InitTable, OverrideTable, RegistryError, Sealed};
use crate::{qprintln, uart_println, version};

/// Everything Ember needs from the firmware image
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub host: &'a dyn Host,
    pub storage: &'a dyn Storage,
    pub subsystems: &'a dyn Subsystems,
    pub config: BootConfig,
}

/// Result of putting a hook into a host slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookInstall {
    Installed,
    /// The slot already held our hook; nothing was written
    AlreadyInstalled,
}

/// The framework: boot state, registries, interceptor and crash log
pub struct Framework {
    state: BootState,
    interceptor: DispatchInterceptor,
    overrides: Sealed<OverrideTable>,
    autostart: Sealed<AutoStartTable>,
    init_funcs: Sealed<InitTable>,
    crash: CrashLog,
    assert_chain: Once<ChainedAssertHandler<ForeignAssert>>,
    #[cfg(feature = "task-monitor")]
    monitor: TaskMonitor,
}

/// The instance behind the firmware entry points
pub static FRAMEWORK: Framework = Framework::new();

impl Framework {
    pub const fn new() -> Self {
        Self {
            state: BootState::new(),
            interceptor: DispatchInterceptor::new(),
            overrides: Sealed::new(),
            autostart: Sealed::new(),
            init_funcs: Sealed::new(),
            crash: CrashLog::new(),
            assert_chain: Once::new(),
            #[cfg(feature = "task-monitor")]
            monitor: TaskMonitor::new(),
        }
    }

    pub fn state(&self) -> &BootState {
        &self.state
    }

    pub fn interceptor(&self) -> &DispatchInterceptor {
        &self.interceptor
    }

    /// Hand over the override table; must happen before pre-init
    pub fn register_overrides(&self, table: OverrideTable) -> Result<(), RegistryError> {
        self.overrides.seal(table).map(|_| ())
    }

    pub fn register_autostart(&self, table: AutoStartTable) -> Result<(), RegistryError> {
        self.autostart.seal(table).map(|_| ())
    }

    pub fn register_init_funcs(&self, table: InitTable) -> Result<(), RegistryError> {
        self.init_funcs.seal(table).map(|_| ())
    }

    /// Before the host init task: hook task dispatch
    pub fn pre_init(&self, env: &Environment) -> HookInstall {
        self.interceptor.configure(env.config.trampoline, env.config.scan_policy);

        let hook = entry::dispatch_hook as usize;
        let result = install_hook(env.host.dispatch_slot(), hook);
        qprintln!("[BOOT] task dispatch hook at {:#x}: {:?}", hook, result);
        self.state.record_hook(InstalledHooks::DISPATCH);

        #[cfg(feature = "task-monitor")]
        {
            self.monitor.arm();
            self.state.record_hook(InstalledHooks::TASK_MONITOR);
        }

        result
    }

    /// After the host init task: chain the assert handler, wait for the
    /// host to come up, then start the Bootstrap Task
    pub fn post_init(&self, env: &Environment) -> Result<(), HostError> {
        let host = env.host;
        let config = &env.config;

        #[cfg(feature = "crash-log")]
        self.install_crash_interceptor(host.assert_slot());

        uart_println!("[BOOT] {}", version::Banner);

        #[cfg(feature = "version-suffix")]
        host.set_version_suffix(&version::build_suffix(version::BUILD_VERSION));

        while !host.display_ready() {
            host.sleep_ms(config.display_poll_ms);
        }

        if !self.wait_for_gui(host, config) {
            uart_println!("[BOOT] GUI task did not report in, continuing");
        }
        host.sleep_ms(config.gui_settle_ms);

        let spec = TaskSpec {
            name: config.bootstrap_name,
            priority: config.bootstrap_priority,
            stack_size: config.bootstrap_stack,
            entry: config.bootstrap_entry,
            arg: 0,
        };
        host.create_task(&spec).map_err(|e| {
            uart_println!("[BOOT] Could not start {}: {}", spec.name, e);
            e
        })
    }

    /// Poll the GUI-initialized flag within the configured budget
    fn wait_for_gui(&self, host: &dyn Host, config: &BootConfig) -> bool {
        for _ in 0..config.gui_poll_attempts {
            if self.state.gui_initialized() {
                return true;
            }
            host.sleep_ms(config.gui_poll_ms);
        }
        self.state.gui_initialized()
    }

    /// Put the assert hook into `slot`, keeping the handler found there
    pub fn install_crash_interceptor(&self, slot: &dyn HookSlot) -> HookInstall {
        let hook = entry::assert_hook as usize;
        let current = slot.load();
        if current == hook {
            return HookInstall::AlreadyInstalled;
        }

        self.assert_chain.call_once(|| {
            // SAFETY: the slot holds the host's assert handler or nothing
            ChainedAssertHandler::new(unsafe { ForeignAssert::from_addr(current) })
        });
        slot.store(hook);
        self.state.record_hook(InstalledHooks::CRASH);
        HookInstall::Installed
    }

    /// The dispatch hook body
    pub fn on_dispatch<T: DispatchedTask + ?Sized>(&self, task: Option<&mut T>) -> DispatchOutcome {
        let outcome = self.interceptor.intercept(task, self.overrides.get(), &self.state);
        #[cfg(feature = "task-monitor")]
        self.monitor.record(&outcome);
        outcome
    }

    /// The assert hook body: capture, then forward to the previous handler
    pub fn on_host_assert(&self, host: Option<&dyn Host>, args: &AssertArgs, return_address: usize) -> i32 {
        match (host, self.assert_chain.get()) {
            (Some(host), Some(chain)) => chain.handle(&self.crash, host, args, return_address),
            (Some(host), None) => {
                self.crash.capture_host_assert(host, args, return_address);
                0
            }
            (None, chain) => chain
                .and_then(|chain| chain.previous())
                .map(|previous| previous.handle(args))
                .unwrap_or(0),
        }
    }

    /// Record a failed Ember assertion
    pub fn self_assert(&self, host: Option<&dyn Host>, msg: &dyn fmt::Display, file: &str, line: u32, func: &str) {
        self.crash.capture_self_assert(host, msg, file, line, func);
    }

    pub fn record_crash_message(&self, msg: &str) {
        self.crash.record_message(msg);
    }

    /// The current diagnostic text
    pub fn crash_message(&self) -> heapless::String<DIAGNOSTIC_CAPACITY> {
        self.crash.snapshot()
    }

    pub fn take_crash_request(&self) -> Option<CrashSeverity> {
        self.crash.take_request()
    }

    pub fn persist_crash_log(&self, env: &Environment) -> Result<usize, StorageError> {
        self.crash.persist(env.storage, env.config.crash_log_path)
    }

    #[cfg(feature = "task-monitor")]
    pub fn monitor_stats(&self) -> MonitorStats {
        self.monitor.stats()
    }
}

impl Default for Framework {
    fn default() -> Self {
        Self::new()
    }
}

fn install_hook(slot: &dyn HookSlot, hook: usize) -> HookInstall {
    if slot.load() == hook {
        return HookInstall::AlreadyInstalled;
    }
    slot.store(hook);
    HookInstall::Installed
}
