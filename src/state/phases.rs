// Terminal status resolution across setup / call / teardown reports

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::recorder::Verdict;
use crate::model::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Call,
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseOutcome {
    Passed,
    Failed,
    Skipped,
}

/// Captured output of one phase, e.g. `Captured stdout call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedSection {
    pub title: String,
    pub content: String,
}

/// What the host reports when one phase of a test completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub outcome: PhaseOutcome,
    /// The phase was skipped because the test is expected to fail.
    #[serde(default)]
    pub expected_failure: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
    #[serde(default)]
    pub sections: Vec<CapturedSection>,
}

impl PhaseReport {
    pub fn new(phase: Phase, outcome: PhaseOutcome) -> Self {
        Self {
            phase,
            outcome,
            expected_failure: false,
            message: None,
            trace: None,
            sections: Vec::new(),
        }
    }

    pub fn passed(phase: Phase) -> Self {
        Self::new(phase, PhaseOutcome::Passed)
    }

    pub fn failed(phase: Phase, message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self::new(phase, PhaseOutcome::Failed)
            .with_message(message)
            .with_trace(trace)
    }

    pub fn skipped(phase: Phase, reason: impl Into<String>) -> Self {
        Self::new(phase, PhaseOutcome::Skipped).with_message(reason)
    }

    pub fn expected_failure(mut self) -> Self {
        self.expected_failure = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn with_section(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.sections.push(CapturedSection {
            title: title.into(),
            content: content.into(),
        });
        self
    }

    fn verdict(&self, status: Status) -> Verdict {
        Verdict {
            status,
            message: self.message.clone(),
            trace: self.trace.clone(),
        }
    }
}

/// What the listener must do after a phase report was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    /// Keep the case open.
    Continue,
    /// Send a copy of the case now and keep it open; the final report
    /// follows at teardown and supersedes this one.
    ReportEarly,
    /// Close the case and hand it off.
    Finalize,
}

/// Folds the phase reports of one test into a single verdict.
///
/// | setup  | call              | teardown | verdict  |
/// |--------|-------------------|----------|----------|
/// | passed | passed            | passed   | PASSED   |
/// | passed | failed            | any      | FAILED   |
/// | passed | skipped, expected | any      | PENDING  |
/// | passed | skipped           | any      | CANCELED |
/// | failed | none              | any      | BROKEN   |
/// | passed | any               | failed   | BROKEN, unless already failed |
/// | any    | any               | skipped  | unchanged, CANCELED if undecided |
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    verdict: Option<Verdict>,
    double_report: bool,
}

impl PhaseTracker {
    /// `double_report` re-sends failed cases right after the call phase,
    /// for hosts that may exit before teardown under a stop-on-failure
    /// policy.
    pub fn new(double_report: bool) -> Self {
        Self {
            verdict: None,
            double_report,
        }
    }

    pub fn current(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    pub fn observe(&mut self, report: &PhaseReport) -> PhaseAction {
        let mut action = PhaseAction::Continue;

        match (report.outcome, report.phase) {
            (PhaseOutcome::Passed, Phase::Call) => {
                self.verdict = Some(report.verdict(Status::Passed));
            }
            (PhaseOutcome::Passed, _) => {}
            (PhaseOutcome::Failed, Phase::Call) => {
                self.verdict = Some(report.verdict(Status::Failed));
                if self.double_report {
                    action = PhaseAction::ReportEarly;
                }
            }
            (PhaseOutcome::Failed, Phase::Setup) => {
                self.verdict = Some(report.verdict(Status::Broken));
            }
            (PhaseOutcome::Failed, Phase::Teardown) => match self.verdict.as_mut() {
                // a failed test stays failed; the teardown error is kept
                // alongside for visibility
                Some(verdict) if verdict.status.is_failure() => {
                    append_teardown_failure(verdict, report);
                }
                _ => self.verdict = Some(report.verdict(Status::Broken)),
            },
            // a skipped teardown never overrides what setup or call decided
            (PhaseOutcome::Skipped, Phase::Teardown) if self.verdict.is_some() => {}
            (PhaseOutcome::Skipped, _) => {
                let status = if report.expected_failure {
                    Status::Pending
                } else {
                    Status::Canceled
                };
                self.verdict = Some(report.verdict(status));
            }
        }

        if report.phase == Phase::Teardown {
            action = PhaseAction::Finalize;
        }

        debug!(
            "Observed {:?} {:?}, verdict now {:?}",
            report.phase,
            report.outcome,
            self.verdict.as_ref().map(|v| v.status)
        );
        action
    }

    /// The verdict to finalize with. A test that reached teardown without
    /// any deciding phase is broken.
    pub fn resolve(&self) -> Verdict {
        self.verdict.clone().unwrap_or_else(|| {
            Verdict::new(Status::Broken).with_message("test finished without reporting a call phase")
        })
    }
}

fn append_teardown_failure(verdict: &mut Verdict, report: &PhaseReport) {
    let mut extra = String::from("Teardown failed");
    if let Some(message) = &report.message {
        extra.push_str(": ");
        extra.push_str(message);
    }
    if let Some(trace) = &report.trace {
        extra.push('\n');
        extra.push_str(trace);
    }

    verdict.trace = Some(match verdict.trace.take() {
        Some(trace) => format!("{}\n\n{}", trace, extra),
        None => extra,
    });
}
