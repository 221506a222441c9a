//! Setup wizard state machine.
//!
//! Drives the UI/CLI through `detecting → mode_select | advanced_config →
//! confirming → running → passcode_setup → finalizing → complete`. The
//! privileged steps themselves (user creation, launchd, shell wiring) run
//! behind the [`StepRunner`] seam - the machine owns ordering, resumption,
//! and error surfacing. Steps are idempotent; a failed run can be retried
//! and already-completed steps are skipped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardPhase {
    Detecting,
    ModeSelect,
    AdvancedConfig,
    Confirming,
    Running,
    PasscodeSetup,
    Finalizing,
    Complete,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupMode {
    Quick,
    Advanced,
}

/// The ordered, idempotent step catalog executed during `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    Prerequisites,
    Detect,
    Configure,
    CreateGroups,
    CreateAgentUser,
    CreateBrokerUser,
    CreateDirectories,
    SetupSocket,
    InstallHomebrew,
    InstallNvm,
    ConfigureShell,
    InstallWrappers,
    GenerateSeatbelt,
    InstallBroker,
    InstallDaemonConfig,
    InstallPolicies,
    SetupLaunchdaemon,
    InstallOpenclaw,
    CopyOpenclawConfig,
    StopHostOpenclaw,
    OnboardOpenclaw,
    Verify,
    StartOpenclaw,
    SetupPasscode,
    OpenDashboard,
    Complete,
}

pub const SETUP_STEPS: &[WizardStep] = &[
    WizardStep::Prerequisites,
    WizardStep::Detect,
    WizardStep::Configure,
    WizardStep::CreateGroups,
    WizardStep::CreateAgentUser,
    WizardStep::CreateBrokerUser,
    WizardStep::CreateDirectories,
    WizardStep::SetupSocket,
    WizardStep::InstallHomebrew,
    WizardStep::InstallNvm,
    WizardStep::ConfigureShell,
    WizardStep::InstallWrappers,
    WizardStep::GenerateSeatbelt,
    WizardStep::InstallBroker,
    WizardStep::InstallDaemonConfig,
    WizardStep::InstallPolicies,
    WizardStep::SetupLaunchdaemon,
    WizardStep::InstallOpenclaw,
    WizardStep::CopyOpenclawConfig,
    WizardStep::StopHostOpenclaw,
    WizardStep::OnboardOpenclaw,
    WizardStep::Verify,
    WizardStep::StartOpenclaw,
    WizardStep::SetupPasscode,
    WizardStep::OpenDashboard,
    WizardStep::Complete,
];

/// Outcome of one step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Executes one step. Implementations must be idempotent: re-running a
/// completed step is a no-op.
pub trait StepRunner {
    fn run(&mut self, step: WizardStep) -> StepResult;
}

/// Snapshot surfaced to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardContext {
    pub phase: WizardPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SetupMode>,
    pub completed_steps: Vec<WizardStep>,
    pub total_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<WizardStep>,
}

pub struct SetupWizard {
    phase: WizardPhase,
    mode: Option<SetupMode>,
    completed: Vec<WizardStep>,
    error: Option<String>,
    failed_step: Option<WizardStep>,
}

impl Default for SetupWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupWizard {
    pub fn new() -> Self {
        Self {
            phase: WizardPhase::Detecting,
            mode: None,
            completed: Vec::new(),
            error: None,
            failed_step: None,
        }
    }

    pub fn context(&self) -> WizardContext {
        WizardContext {
            phase: self.phase,
            mode: self.mode,
            completed_steps: self.completed.clone(),
            total_steps: SETUP_STEPS.len(),
            error: self.error.clone(),
            failed_step: self.failed_step,
        }
    }

    fn transition(&mut self, from: &[WizardPhase], to: WizardPhase) -> Result<(), String> {
        if !from.contains(&self.phase) {
            return Err(format!(
                "invalid transition to {:?} from {:?}",
                to, self.phase
            ));
        }
        self.phase = to;
        Ok(())
    }

    /// Detection finished; hand control to mode selection.
    pub fn detection_done(&mut self) -> Result<(), String> {
        self.transition(&[WizardPhase::Detecting], WizardPhase::ModeSelect)
    }

    pub fn choose_mode(&mut self, mode: SetupMode) -> Result<(), String> {
        self.transition(
            &[WizardPhase::ModeSelect],
            match mode {
                SetupMode::Quick => WizardPhase::Confirming,
                SetupMode::Advanced => WizardPhase::AdvancedConfig,
            },
        )?;
        self.mode = Some(mode);
        Ok(())
    }

    /// Advanced configuration captured; move on to confirmation.
    pub fn advanced_config_done(&mut self) -> Result<(), String> {
        self.transition(&[WizardPhase::AdvancedConfig], WizardPhase::Confirming)
    }

    pub fn confirm(&mut self) -> Result<(), String> {
        self.transition(&[WizardPhase::Confirming], WizardPhase::Running)
    }

    /// Execute the step catalog in order, skipping completed steps. A step
    /// failure marks the phase errored and surfaces the step + message; a
    /// retry resumes from the failed step.
    pub fn run_steps(&mut self, runner: &mut dyn StepRunner) -> Result<(), String> {
        if !matches!(self.phase, WizardPhase::Running | WizardPhase::Errored) {
            return Err(format!("cannot run steps in phase {:?}", self.phase));
        }
        self.phase = WizardPhase::Running;
        self.error = None;
        self.failed_step = None;

        for &step in SETUP_STEPS {
            if self.completed.contains(&step) {
                continue;
            }
            tracing::info!(step = ?step, "running setup step");
            let result = runner.run(step);
            if !result.success {
                let message = result
                    .error
                    .unwrap_or_else(|| "step failed without a message".to_string());
                tracing::error!(step = ?step, error = %message, "setup step failed");
                self.phase = WizardPhase::Errored;
                self.failed_step = Some(step);
                self.error = Some(message.clone());
                return Err(message);
            }
            self.completed.push(step);
        }
        self.phase = WizardPhase::PasscodeSetup;
        Ok(())
    }

    pub fn passcode_done(&mut self) -> Result<(), String> {
        self.transition(&[WizardPhase::PasscodeSetup], WizardPhase::Finalizing)
    }

    pub fn finalize(&mut self) -> Result<(), String> {
        self.transition(&[WizardPhase::Finalizing], WizardPhase::Complete)
    }
}
