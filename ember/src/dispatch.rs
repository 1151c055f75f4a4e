//! # Dispatch Interceptor
//!
//! Called by the host scheduler every time it is about to switch to a
//! task. Most activations are a task resuming where it left off and are
//! ignored at once. A task whose saved program counter is the host's start
//! trampoline is about to run for the first time; if its entry point is in
//! the override table, the entry is rewritten before the host jumps to it.
//!
//! This runs in scheduler context: no blocking, no allocation, and nothing
//! here may ever stop the host from dispatching.

use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::boot::state::BootState;
use crate::host::EntryPoint;
use crate::qprintln;
use crate::registry::OverrideTable;

/// What the interceptor needs from a task being dispatched
pub trait DispatchedTask {
    fn entry(&self) -> EntryPoint;

    fn set_entry(&mut self, entry: EntryPoint);

    fn arg(&self) -> usize;

    fn name(&self) -> &str;

    /// Saved program counter, `None` if the context cannot be read
    fn resume_pc(&self) -> Option<usize>;
}

/// When the interceptor stops looking at the override table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ScanPolicy {
    /// Go dormant once the framework reports `Started`
    #[default]
    StopWhenStarted = 0,
    /// Keep redirecting for the whole uptime
    Always = 1,
}

impl ScanPolicy {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ScanPolicy::Always,
            _ => ScanPolicy::StopWhenStarted,
        }
    }
}

/// What one activation amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No task handle
    Ignored,
    /// The task context could not be read
    Unreadable,
    /// A task resuming, not starting
    Resumed,
    /// A fresh start after the framework went dormant
    Dormant,
    /// A fresh start with no override
    Started,
    /// A fresh start whose entry was replaced
    Redirected { from: EntryPoint, to: EntryPoint },
}

/// The interceptor state: where the trampoline is and how to scan
pub struct DispatchInterceptor {
    trampoline: AtomicUsize,
    policy: AtomicU8,
    redirects: AtomicU32,
}

impl DispatchInterceptor {
    pub const fn new() -> Self {
        Self {
            trampoline: AtomicUsize::new(0),
            policy: AtomicU8::new(ScanPolicy::StopWhenStarted as u8),
            redirects: AtomicU32::new(0),
        }
    }

    pub fn configure(&self, trampoline: usize, policy: ScanPolicy) {
        self.trampoline.store(trampoline, Ordering::Release);
        self.policy.store(policy as u8, Ordering::Release);
    }

    pub fn trampoline(&self) -> usize {
        self.trampoline.load(Ordering::Acquire)
    }

    pub fn policy(&self) -> ScanPolicy {
        ScanPolicy::from_u8(self.policy.load(Ordering::Acquire))
    }

    /// Entries rewritten so far
    pub fn redirects(&self) -> u32 {
        self.redirects.load(Ordering::Relaxed)
    }

    /// Inspect one activation and redirect it if it is a fresh start of an
    /// overridden task
    pub fn intercept<T: DispatchedTask + ?Sized>(
        &self,
        task: Option<&mut T>,
        overrides: Option<&OverrideTable>,
        state: &BootState,
    ) -> DispatchOutcome {
        let Some(task) = task else {
            return DispatchOutcome::Ignored;
        };

        let Some(pc) = task.resume_pc() else {
            return DispatchOutcome::Unreadable;
        };

        let trampoline = self.trampoline();
        if trampoline == 0 || pc != trampoline {
            return DispatchOutcome::Resumed;
        }

        if self.policy() == ScanPolicy::StopWhenStarted && state.is_started() {
            return DispatchOutcome::Dormant;
        }

        let from = task.entry();
        let Some(table) = overrides else {
            return DispatchOutcome::Started;
        };
        // Already rewritten but not yet run: redirect at most once
        if table.is_replacement(from) {
            return DispatchOutcome::Started;
        }
        let Some(to) = table.lookup(from) else {
            return DispatchOutcome::Started;
        };

        task.set_entry(to);
        self.redirects.fetch_add(1, Ordering::Relaxed);
        qprintln!("[DISPATCH] {} {} -> {}", task.name(), from, to);
        DispatchOutcome::Redirected { from, to }
    }
}

impl Default for DispatchInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::state::BootPhase;
    use crate::registry::OverrideEntry;

    const TRAMPOLINE: usize = 0xff81_0894;
    const GUI_MAIN: usize = 0xff0c_5a10;
    const EMBER_GUI: usize = 0x0040_1000;
    const DISP_CHECK: usize = 0xff0c_7000;

    struct FakeTask {
        entry: EntryPoint,
        pc: Option<usize>,
    }

    impl FakeTask {
        fn fresh(entry: usize) -> Self {
            Self { entry: EntryPoint::from_addr(entry), pc: Some(TRAMPOLINE) }
        }
    }

    impl DispatchedTask for FakeTask {
        fn entry(&self) -> EntryPoint {
            self.entry
        }

        fn set_entry(&mut self, entry: EntryPoint) {
            self.entry = entry;
        }

        fn arg(&self) -> usize {
            0
        }

        fn name(&self) -> &str {
            "fake"
        }

        fn resume_pc(&self) -> Option<usize> {
            self.pc
        }
    }

    fn table() -> OverrideTable {
        let mut table = OverrideTable::new();
        table
            .push(OverrideEntry::new(EntryPoint::from_addr(GUI_MAIN), EntryPoint::from_addr(EMBER_GUI)))
            .unwrap();
        table
    }

    fn interceptor(policy: ScanPolicy) -> DispatchInterceptor {
        let interceptor = DispatchInterceptor::new();
        interceptor.configure(TRAMPOLINE, policy);
        interceptor
    }

    fn start(state: &BootState) {
        state.advance(BootPhase::ConfigLoading).unwrap();
        state.advance(BootPhase::Ready).unwrap();
        state.advance(BootPhase::AllTasksCreated).unwrap();
        state.advance(BootPhase::Started).unwrap();
    }

    #[test]
    fn test_fresh_start_is_redirected_once() {
        let interceptor = interceptor(ScanPolicy::StopWhenStarted);
        let state = BootState::new();
        let overrides = table();
        let mut task = FakeTask::fresh(GUI_MAIN);

        let outcome = interceptor.intercept(Some(&mut task), Some(&overrides), &state);
        assert_eq!(
            outcome,
            DispatchOutcome::Redirected {
                from: EntryPoint::from_addr(GUI_MAIN),
                to: EntryPoint::from_addr(EMBER_GUI),
            }
        );
        assert_eq!(task.entry, EntryPoint::from_addr(EMBER_GUI));

        // The task now resumes from its own code; no further rewrite
        task.pc = Some(EMBER_GUI + 0x40);
        for _ in 0..5 {
            assert_eq!(interceptor.intercept(Some(&mut task), Some(&overrides), &state), DispatchOutcome::Resumed);
        }
        assert_eq!(task.entry, EntryPoint::from_addr(EMBER_GUI));
        assert_eq!(interceptor.redirects(), 1);
    }

    #[test]
    fn test_resumed_task_is_never_touched() {
        let interceptor = interceptor(ScanPolicy::Always);
        let state = BootState::new();
        let overrides = table();
        let mut task = FakeTask { entry: EntryPoint::from_addr(GUI_MAIN), pc: Some(GUI_MAIN + 0x88) };

        assert_eq!(interceptor.intercept(Some(&mut task), Some(&overrides), &state), DispatchOutcome::Resumed);
        assert_eq!(task.entry, EntryPoint::from_addr(GUI_MAIN));
    }

    #[test]
    fn test_no_override_leaves_task_alone() {
        let interceptor = interceptor(ScanPolicy::StopWhenStarted);
        let state = BootState::new();
        let overrides = table();
        let mut task = FakeTask::fresh(DISP_CHECK);

        assert_eq!(interceptor.intercept(Some(&mut task), Some(&overrides), &state), DispatchOutcome::Started);
        assert_eq!(task.entry, EntryPoint::from_addr(DISP_CHECK));

        // Nothing registered at all behaves the same
        assert_eq!(interceptor.intercept(Some(&mut task), None, &state), DispatchOutcome::Started);
    }

    #[test]
    fn test_missing_task_or_context_is_a_no_op() {
        let interceptor = interceptor(ScanPolicy::StopWhenStarted);
        let state = BootState::new();
        let overrides = table();

        assert_eq!(
            interceptor.intercept::<FakeTask>(None, Some(&overrides), &state),
            DispatchOutcome::Ignored
        );

        let mut task = FakeTask { entry: EntryPoint::from_addr(GUI_MAIN), pc: None };
        assert_eq!(interceptor.intercept(Some(&mut task), Some(&overrides), &state), DispatchOutcome::Unreadable);
        assert_eq!(task.entry, EntryPoint::from_addr(GUI_MAIN));
    }

    #[test]
    fn test_dormant_after_start_unless_always() {
        let state = BootState::new();
        start(&state);
        let overrides = table();

        let stopping = interceptor(ScanPolicy::StopWhenStarted);
        let mut task = FakeTask::fresh(GUI_MAIN);
        assert_eq!(stopping.intercept(Some(&mut task), Some(&overrides), &state), DispatchOutcome::Dormant);
        assert_eq!(task.entry, EntryPoint::from_addr(GUI_MAIN));

        let always = interceptor(ScanPolicy::Always);
        assert!(matches!(
            always.intercept(Some(&mut task), Some(&overrides), &state),
            DispatchOutcome::Redirected { .. }
        ));
    }

    #[test]
    fn test_redirect_does_not_chain_before_first_run() {
        const EMBER_GUI_V2: usize = 0x0040_2000;

        let interceptor = interceptor(ScanPolicy::Always);
        let state = BootState::new();
        let mut overrides = table();
        overrides
            .push(OverrideEntry::new(EntryPoint::from_addr(EMBER_GUI), EntryPoint::from_addr(EMBER_GUI_V2)))
            .unwrap();
        let mut task = FakeTask::fresh(GUI_MAIN);

        assert!(matches!(
            interceptor.intercept(Some(&mut task), Some(&overrides), &state),
            DispatchOutcome::Redirected { .. }
        ));

        // Switched away before running, still parked on the trampoline
        for _ in 0..3 {
            assert_eq!(interceptor.intercept(Some(&mut task), Some(&overrides), &state), DispatchOutcome::Started);
        }
        assert_eq!(task.entry, EntryPoint::from_addr(EMBER_GUI));
        assert_eq!(interceptor.redirects(), 1);
    }

    #[test]
    fn test_unconfigured_trampoline_never_redirects() {
        let interceptor = DispatchInterceptor::new();
        let state = BootState::new();
        let overrides = table();
        let mut task = FakeTask { entry: EntryPoint::from_addr(GUI_MAIN), pc: Some(0) };

        assert_eq!(interceptor.intercept(Some(&mut task), Some(&overrides), &state), DispatchOutcome::Resumed);
    }
}
