//! Bootstrap Task - ordered bring-up of Ember's own services
//!
//! Runs once, in its own host task, after post-init. Soft failures are
//! logged and recorded in the [`BootReport`]; the sequence keeps going.
//! The only early exit is the veto, where Ember disables itself and
//! leaves nothing running but the LED fade.

use heapless::Vec;

use super::state::{BootPhase, BootStateError};
use super::{Environment, Framework};
use crate::host::SubsystemError;
use crate::registry::{autostart, AutoStartSummary};
use crate::{indicator, settings, uart_println};
#[cfg(feature = "version-suffix")]
use crate::version;

/// The bring-up steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStep {
    Memory,
    Card,
    RequireTrigger,
    Fonts,
    PowerSave,
    InitFuncs,
    PropertySettle,
    Config,
    PostConfig,
    Ready,
    AutoStart,
    Started,
}

const STEP_COUNT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    /// The subsystem failed; boot carried on without it
    Degraded(SubsystemError),
    /// Some of the work was done
    Partial { failed: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRecord {
    pub step: BootStep,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Every step ran and the framework is `Started`
    Started,
    /// Bypass state disagreed with the trigger setting; Ember is disabled
    Vetoed,
    /// The boot state was not where this step expected it
    Rejected { phase: BootPhase },
}

/// What the Bootstrap Task did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub outcome: BootOutcome,
    pub require_trigger: bool,
    pub steps: Vec<StepRecord, STEP_COUNT>,
    pub autostart: AutoStartSummary,
    pub init_funcs_run: usize,
}

impl BootReport {
    fn new() -> Self {
        Self {
            outcome: BootOutcome::Rejected { phase: BootPhase::NotStarted },
            require_trigger: false,
            steps: Vec::new(),
            autostart: AutoStartSummary::default(),
            init_funcs_run: 0,
        }
    }

    fn record(&mut self, step: BootStep, status: StepStatus) {
        if let StepStatus::Degraded(e) = status {
            uart_println!("[BOOT] {:?} degraded: {}", step, e);
        }
        // One record per step, never more than STEP_COUNT
        let _ = self.steps.push(StepRecord { step, status });
    }

    fn record_result(&mut self, step: BootStep, result: Result<(), SubsystemError>) {
        let status = match result {
            Ok(()) => StepStatus::Ok,
            Err(e) => StepStatus::Degraded(e),
        };
        self.record(step, status);
    }

    pub fn status_of(&self, step: BootStep) -> Option<StepStatus> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.status)
    }

    /// The steps that ran, in order
    pub fn step_order(&self) -> impl Iterator<Item = BootStep> + '_ {
        self.steps.iter().map(|r| r.step)
    }

    pub fn is_degraded(&self) -> bool {
        self.steps.iter().any(|r| r.status != StepStatus::Ok)
    }
}

impl Framework {
    /// Run the bring-up sequence
    pub fn run_bootstrap(&self, env: &Environment) -> BootReport {
        let mut report = BootReport::new();
        report.outcome = match self.bring_up(env, &mut report) {
            Ok(outcome) => outcome,
            Err(BootStateError::IllegalTransition { from, to }) => {
                uart_println!("[BOOT] Bootstrap refused: cannot go from {} to {}", from, to);
                BootOutcome::Rejected { phase: from }
            }
        };
        report
    }

    fn bring_up(&self, env: &Environment, report: &mut BootReport) -> Result<BootOutcome, BootStateError> {
        let host = env.host;
        let subsystems = env.subsystems;
        let config = &env.config;

        let phase = self.state.phase();
        if phase != BootPhase::NotStarted {
            return Err(BootStateError::IllegalTransition { from: phase, to: BootPhase::ConfigLoading });
        }

        report.record_result(BootStep::Memory, subsystems.init_memory());
        report.record_result(BootStep::Card, subsystems.find_card());

        let require_trigger = settings::load_flag(env.storage, config.require_trigger_path);
        report.require_trigger = require_trigger;
        report.record(BootStep::RequireTrigger, StepStatus::Ok);

        // Button presses after this point are refused
        if self.state.resolve_bypass(require_trigger)? == BootPhase::Disabled {
            return Ok(self.veto(env));
        }

        report.record_result(BootStep::Fonts, subsystems.load_fonts());

        host.disable_power_save();
        report.record(BootStep::PowerSave, StepStatus::Ok);

        report.init_funcs_run = self.init_funcs.get().map(|table| autostart::run_all(table)).unwrap_or(0);
        report.record(BootStep::InitFuncs, StepStatus::Ok);

        host.sleep_ms(config.property_settle_ms);
        report.record(BootStep::PropertySettle, StepStatus::Ok);

        report.record_result(BootStep::Config, subsystems.load_config());
        report.record_result(BootStep::PostConfig, subsystems.post_config());

        self.state.advance(BootPhase::Ready)?;
        uart_println!("[BOOT] Configuration loaded");
        report.record(BootStep::Ready, StepStatus::Ok);

        let summary = self
            .autostart
            .get()
            .map(|table| autostart::create_all(host, table))
            .unwrap_or_default();
        report.autostart = summary;
        let status = match summary.failed {
            0 => StepStatus::Ok,
            failed => StepStatus::Partial { failed },
        };
        report.record(BootStep::AutoStart, status);
        self.state.advance(BootPhase::AllTasksCreated)?;

        host.sleep_ms(config.started_settle_ms);
        self.state.advance(BootPhase::Started)?;
        report.record(BootStep::Started, StepStatus::Ok);
        uart_println!(
            "[BOOT] Started: {} tasks created, {} failed",
            summary.created,
            summary.failed
        );

        Ok(BootOutcome::Started)
    }

    /// Disable Ember for this boot; only the LED fade is left running
    fn veto(&self, env: &Environment) -> BootOutcome {
        uart_println!("[BOOT] Disabled for this boot");

        #[cfg(feature = "version-suffix")]
        env.host.set_version_suffix(&version::disabled_suffix());

        if let Err(e) = indicator::start_fade(env.host, env.config.fade_delay_us) {
            uart_println!("[BOOT] No LED fade: {}", e);
        }
        BootOutcome::Vetoed
    }
}
