//! Mock host - in-memory camera firmware for testing
//!
//! Time is simulated: `sleep_ms` advances a clock instead of blocking, and
//! display or GUI readiness flips once the clock passes a configured mark.
//! Everything Ember asks of the host is recorded for inspection.

use std::collections::{BTreeMap, VecDeque};

use core::fmt;
use core::sync::atomic::AtomicUsize;
use spin::Mutex;

use super::{
    Host, HookSlot, HostError, ShootingState, Storage, StorageError, SubsystemError, Subsystems,
    TaskSpec, TimerCallback,
};
use crate::boot::state::BootState;

#[derive(Default)]
struct MockState {
    created: Vec<TaskSpec>,
    /// Gate state at the moment each task was created
    ready_at_create: Vec<bool>,
    failing: Vec<&'static str>,
    sleeps: Vec<u32>,
    clock_ms: u64,
    display_ready_at_ms: u64,
    gui_ready_at_ms: Option<u64>,
    power_save_disabled: bool,
    led: Vec<bool>,
    timers: VecDeque<(u32, TimerCallback, usize)>,
    timer_delays: Vec<u32>,
    no_timers: bool,
    version_suffix: String,
    shooting: ShootingState,
    backtrace: String,
    watched: Option<&'static BootState>,
}

/// Mock host implementation
pub struct MockHost {
    state: Mutex<MockState>,
    task_name: Mutex<&'static str>,
    dispatch: AtomicUsize,
    assert: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            task_name: Mutex::new("init"),
            dispatch: AtomicUsize::new(0),
            assert: AtomicUsize::new(0),
        }
    }

    /// Record gate state on every task creation and drive the GUI flag
    pub fn watch(&self, boot: &'static BootState) {
        self.state.lock().watched = Some(boot);
    }

    /// Display memory becomes available after `ms` of simulated time
    pub fn display_ready_after(&self, ms: u64) {
        self.state.lock().display_ready_at_ms = ms;
    }

    /// The overridden GUI task reports in after `ms` (needs `watch`)
    pub fn gui_ready_after(&self, ms: u64) {
        self.state.lock().gui_ready_at_ms = Some(ms);
    }

    /// `create_task` refuses tasks with this name
    pub fn fail_task(&self, name: &'static str) {
        self.state.lock().failing.push(name);
    }

    pub fn refuse_timers(&self) {
        self.state.lock().no_timers = true;
    }

    pub fn set_task_name(&self, name: &'static str) {
        *self.task_name.lock() = name;
    }

    pub fn set_shooting(&self, live_view: bool, mode: i32) {
        self.state.lock().shooting = ShootingState { live_view, mode };
    }

    pub fn set_backtrace(&self, text: &str) {
        self.state.lock().backtrace = text.into();
    }

    pub fn created_names(&self) -> Vec<&'static str> {
        self.state.lock().created.iter().map(|t| t.name).collect()
    }

    pub fn created(&self) -> Vec<TaskSpec> {
        self.state.lock().created.clone()
    }

    pub fn ready_at_create(&self) -> Vec<bool> {
        self.state.lock().ready_at_create.clone()
    }

    pub fn sleeps(&self) -> Vec<u32> {
        self.state.lock().sleeps.clone()
    }

    pub fn clock_ms(&self) -> u64 {
        self.state.lock().clock_ms
    }

    pub fn power_save_disabled(&self) -> bool {
        self.state.lock().power_save_disabled
    }

    pub fn led_history(&self) -> Vec<bool> {
        self.state.lock().led.clone()
    }

    /// Delays of every timer ever scheduled, in order
    pub fn timer_delays(&self) -> Vec<u32> {
        self.state.lock().timer_delays.clone()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    pub fn version_suffix(&self) -> String {
        self.state.lock().version_suffix.clone()
    }

    /// Fire due timers one at a time until none are left or `limit` fired
    pub fn run_timers(&self, limit: usize) -> usize {
        let mut fired = 0;
        while fired < limit {
            let next = {
                let mut state = self.state.lock();
                let next = state.timers.pop_front();
                if let Some((delay, _, _)) = next {
                    state.clock_ms += u64::from(delay) / 1000;
                }
                next
            };
            let Some((_, callback, arg)) = next else {
                break;
            };
            // Lock released: the callback may schedule the next tick
            callback(self, arg);
            fired += 1;
        }
        fired
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MockHost {
    fn create_task(&self, spec: &TaskSpec) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.failing.contains(&spec.name) {
            return Err(HostError::TaskCreateFailed);
        }
        let ready = state.watched.map(|boot| boot.is_ready()).unwrap_or(false);
        state.ready_at_create.push(ready);
        state.created.push(*spec);
        Ok(())
    }

    fn sleep_ms(&self, ms: u32) {
        let mut state = self.state.lock();
        state.sleeps.push(ms);
        state.clock_ms += u64::from(ms);
        if let (Some(at), Some(boot)) = (state.gui_ready_at_ms, state.watched) {
            if state.clock_ms >= at {
                boot.mark_gui_initialized();
            }
        }
    }

    fn display_ready(&self) -> bool {
        let state = self.state.lock();
        state.clock_ms >= state.display_ready_at_ms
    }

    fn disable_power_save(&self) {
        self.state.lock().power_save_disabled = true;
    }

    fn set_card_led(&self, on: bool) {
        self.state.lock().led.push(on);
    }

    fn schedule_timer(&self, delay_us: u32, callback: TimerCallback, arg: usize) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.no_timers {
            return Err(HostError::TimerUnavailable);
        }
        state.timer_delays.push(delay_us);
        state.timers.push_back((delay_us, callback, arg));
        Ok(())
    }

    fn current_task_name(&self) -> &str {
        *self.task_name.lock()
    }

    fn shooting_state(&self) -> ShootingState {
        self.state.lock().shooting
    }

    fn set_version_suffix(&self, suffix: &str) {
        self.state.lock().version_suffix = suffix.into();
    }

    fn backtrace(&self, out: &mut dyn fmt::Write) {
        let text = self.state.lock().backtrace.clone();
        let _ = out.write_str(&text);
    }

    fn dispatch_slot(&self) -> &dyn HookSlot {
        &self.dispatch
    }

    fn assert_slot(&self) -> &dyn HookSlot {
        &self.assert
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StorageMode {
    Normal,
    NoCard,
    Broken,
}

/// Mock card: files are path -> bytes
pub struct MockStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    mode: Mutex<StorageMode>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            mode: Mutex::new(StorageMode::Normal),
        }
    }

    pub fn with_file(path: &str, data: &[u8]) -> Self {
        let storage = Self::new();
        storage.files.lock().insert(path.into(), data.to_vec());
        storage
    }

    /// Every operation fails with `NoCard`
    pub fn without_card() -> Self {
        let storage = Self::new();
        *storage.mode.lock() = StorageMode::NoCard;
        storage
    }

    /// Every operation fails with `Io`
    pub fn broken() -> Self {
        let storage = Self::new();
        *storage.mode.lock() = StorageMode::Broken;
        storage
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    fn check(&self) -> Result<(), StorageError> {
        match *self.mode.lock() {
            StorageMode::Normal => Ok(()),
            StorageMode::NoCard => Err(StorageError::NoCard),
            StorageMode::Broken => Err(StorageError::Io),
        }
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MockStorage {
    fn file_size(&self, path: &str) -> Result<u32, StorageError> {
        self.check()?;
        self.files
            .lock()
            .get(path)
            .map(|data| data.len() as u32)
            .ok_or(StorageError::NotFound)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.check()?;
        self.files.lock().insert(path.into(), data.to_vec());
        Ok(())
    }
}

/// Mock subsystems: records the order they were brought up in
pub struct MockSubsystems {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<Vec<(&'static str, SubsystemError)>>,
    watched: Mutex<Option<&'static BootState>>,
    ready_during: Mutex<Vec<(&'static str, bool)>>,
}

impl MockSubsystems {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            watched: Mutex::new(None),
            ready_during: Mutex::new(Vec::new()),
        }
    }

    /// `name` reports `error` when brought up
    pub fn fail(&self, name: &'static str, error: SubsystemError) {
        self.failing.lock().push((name, error));
    }

    /// Record the gate state as each subsystem comes up
    pub fn watch(&self, boot: &'static BootState) {
        *self.watched.lock() = Some(boot);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn ready_during(&self) -> Vec<(&'static str, bool)> {
        self.ready_during.lock().clone()
    }

    fn record(&self, name: &'static str) -> Result<(), SubsystemError> {
        self.calls.lock().push(name);
        if let Some(boot) = *self.watched.lock() {
            self.ready_during.lock().push((name, boot.is_ready()));
        }
        match self.failing.lock().iter().find(|(n, _)| *n == name) {
            Some((_, error)) => Err(*error),
            None => Ok(()),
        }
    }
}

impl Default for MockSubsystems {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystems for MockSubsystems {
    fn init_memory(&self) -> Result<(), SubsystemError> {
        self.record("memory")
    }

    fn find_card(&self) -> Result<(), SubsystemError> {
        self.record("card")
    }

    fn load_fonts(&self) -> Result<(), SubsystemError> {
        self.record("fonts")
    }

    fn load_config(&self) -> Result<(), SubsystemError> {
        self.record("config")
    }

    fn post_config(&self) -> Result<(), SubsystemError> {
        self.record("post_config")
    }
}
