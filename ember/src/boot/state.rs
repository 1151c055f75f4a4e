//! Boot state and the Readiness Gate
//!
//! One writer (the boot sequence), any number of readers. Every field is a
//! single atomic word so readers never see a torn value and never lock.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::host::Host;

/// Where the boot sequence is
///
/// `NotStarted -> Disabled` when vetoed, otherwise
/// `NotStarted -> ConfigLoading -> Ready -> AllTasksCreated -> Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootPhase {
    NotStarted = 0,
    ConfigLoading = 1,
    Ready = 2,
    AllTasksCreated = 3,
    Started = 4,
    Disabled = 5,
}

impl BootPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BootPhase::ConfigLoading,
            2 => BootPhase::Ready,
            3 => BootPhase::AllTasksCreated,
            4 => BootPhase::Started,
            5 => BootPhase::Disabled,
            _ => BootPhase::NotStarted,
        }
    }

    /// Whether configuration has been loaded by this phase
    pub fn config_loaded(self) -> bool {
        matches!(self, BootPhase::Ready | BootPhase::AllTasksCreated | BootPhase::Started)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BootPhase::Started | BootPhase::Disabled)
    }

    fn can_advance_to(self, next: BootPhase) -> bool {
        matches!(
            (self, next),
            (BootPhase::NotStarted, BootPhase::ConfigLoading)
                | (BootPhase::NotStarted, BootPhase::Disabled)
                | (BootPhase::ConfigLoading, BootPhase::Ready)
                | (BootPhase::Ready, BootPhase::AllTasksCreated)
                | (BootPhase::AllTasksCreated, BootPhase::Started)
        )
    }
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            BootPhase::NotStarted => "not started",
            BootPhase::ConfigLoading => "loading config",
            BootPhase::Ready => "ready",
            BootPhase::AllTasksCreated => "all tasks created",
            BootPhase::Started => "started",
            BootPhase::Disabled => "disabled",
        };
        write!(f, "{}", name)
    }
}

bitflags::bitflags! {
    /// Hooks currently installed into host slots
    pub struct InstalledHooks: u8 {
        const DISPATCH     = 0b001;
        const CRASH        = 0b010;
        const TASK_MONITOR = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStateError {
    IllegalTransition { from: BootPhase, to: BootPhase },
}

impl fmt::Display for BootStateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BootStateError::IllegalTransition { from, to } => {
                write!(f, "cannot go from {} to {}", from, to)
            }
        }
    }
}

/// Set in the phase word once the power-on bypass was requested
const BYPASS_BIT: u8 = 0x80;
const PHASE_MASK: u8 = !BYPASS_BIT;

/// Process-wide boot state
pub struct BootState {
    /// Phase in the low bits, bypass request in `BYPASS_BIT`
    phase: AtomicU8,
    gui_initialized: AtomicBool,
    hooks: AtomicU8,
}

impl BootState {
    pub const fn new() -> Self {
        Self {
            phase: AtomicU8::new(BootPhase::NotStarted as u8),
            gui_initialized: AtomicBool::new(false),
            hooks: AtomicU8::new(0),
        }
    }

    pub fn phase(&self) -> BootPhase {
        BootPhase::from_u8(self.phase.load(Ordering::Acquire) & PHASE_MASK)
    }

    /// Move to `next`; returns the phase that was left
    pub fn advance(&self, next: BootPhase) -> Result<BootPhase, BootStateError> {
        let mut raw = self.phase.load(Ordering::Acquire);
        loop {
            let current = BootPhase::from_u8(raw & PHASE_MASK);
            if !current.can_advance_to(next) {
                return Err(BootStateError::IllegalTransition { from: current, to: next });
            }
            let wanted = (raw & BYPASS_BIT) | next as u8;
            match self.phase.compare_exchange(raw, wanted, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(current),
                Err(actual) => raw = actual,
            }
        }
    }

    /// Leave `NotStarted` according to the bypass request
    ///
    /// Goes to `Disabled` when the request disagrees with `require_trigger`,
    /// to `ConfigLoading` otherwise. The request is read and the phase moved
    /// in one step, so a bypass either lands before this and is acted on, or
    /// is refused.
    pub fn resolve_bypass(&self, require_trigger: bool) -> Result<BootPhase, BootStateError> {
        let mut raw = self.phase.load(Ordering::Acquire);
        loop {
            let current = BootPhase::from_u8(raw & PHASE_MASK);
            let requested = raw & BYPASS_BIT != 0;
            let next = if requested != require_trigger {
                BootPhase::Disabled
            } else {
                BootPhase::ConfigLoading
            };
            if current != BootPhase::NotStarted {
                return Err(BootStateError::IllegalTransition { from: current, to: next });
            }
            let wanted = (raw & BYPASS_BIT) | next as u8;
            match self.phase.compare_exchange(raw, wanted, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(next),
                Err(actual) => raw = actual,
            }
        }
    }

    /// The Readiness Gate: configuration is loaded
    pub fn is_ready(&self) -> bool {
        self.phase().config_loaded()
    }

    pub fn is_started(&self) -> bool {
        self.phase() == BootPhase::Started
    }

    pub fn is_disabled(&self) -> bool {
        self.phase() == BootPhase::Disabled
    }

    /// Block the calling task until configuration is loaded
    pub fn wait_until_ready(&self, host: &dyn Host, poll_ms: u32) {
        while !self.is_ready() {
            host.sleep_ms(poll_ms);
        }
    }

    /// Record the power-on bypass request
    ///
    /// Only honoured before configuration loading starts; returns whether
    /// the request was taken.
    pub fn request_bypass(&self) -> bool {
        let mut raw = self.phase.load(Ordering::Acquire);
        loop {
            if BootPhase::from_u8(raw & PHASE_MASK) != BootPhase::NotStarted {
                return false;
            }
            match self.phase.compare_exchange(
                raw,
                raw | BYPASS_BIT,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => raw = actual,
            }
        }
    }

    pub fn bypass_requested(&self) -> bool {
        self.phase.load(Ordering::Acquire) & BYPASS_BIT != 0
    }

    pub fn mark_gui_initialized(&self) {
        self.gui_initialized.store(true, Ordering::Release);
    }

    pub fn gui_initialized(&self) -> bool {
        self.gui_initialized.load(Ordering::Acquire)
    }

    pub fn record_hook(&self, hook: InstalledHooks) {
        self.hooks.fetch_or(hook.bits(), Ordering::AcqRel);
    }

    pub fn hooks(&self) -> InstalledHooks {
        InstalledHooks::from_bits_truncate(self.hooks.load(Ordering::Acquire))
    }
}

impl Default for BootState {
    fn default() -> Self {
        Self::new()
    }
}
