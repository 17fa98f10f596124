// Per-test recorder
// Tracks the stack of currently open report nodes of one test invocation

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::RecorderError;
use crate::model::{
    Attachment, AttachmentPayload, AttachmentType, CaseId, Failure, Label, Status, TestCase,
    TestStep,
};
use crate::time::now_unix_millis;

/// Longest skip message kept on the failure before it is cut.
const SKIP_MESSAGE_LIMIT: usize = 89;

/// How the body of a step exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    #[default]
    Passed,
    Skipped,
    ExpectedFailure,
    Failed,
}

impl StepOutcome {
    pub fn status(self) -> Status {
        match self {
            StepOutcome::Passed => Status::Passed,
            StepOutcome::Skipped => Status::Canceled,
            StepOutcome::ExpectedFailure => Status::Pending,
            StepOutcome::Failed => Status::Failed,
        }
    }
}

/// Terminal classification of a whole test together with its error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: Status,
    pub message: Option<String>,
    pub trace: Option<String>,
}

impl Verdict {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            message: None,
            trace: None,
        }
    }

    pub fn passed() -> Self {
        Self::new(Status::Passed)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Failure entity recorded for this verdict, if its status carries one.
    pub fn failure(&self) -> Option<Failure> {
        if self.status.is_failure() {
            let message = self
                .message
                .clone()
                .unwrap_or_else(|| self.status.as_str().to_string());
            return Some(Failure::new(message, self.trace.clone()));
        }

        if self.status.is_skip() {
            let reason = self
                .message
                .as_deref()
                .or(self.trace.as_deref())
                .unwrap_or("skipped");
            let first_line = reason.lines().next().unwrap_or_default();
            let mut short: String = first_line.chars().take(SKIP_MESSAGE_LIMIT).collect();
            let trace = (short != reason).then(|| reason.to_string());
            if reason.chars().count() > SKIP_MESSAGE_LIMIT {
                short.push_str("...");
            }
            return Some(Failure::new(short, trace));
        }

        None
    }
}

/// An entry of the open-node stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenNode {
    Case(TestCase),
    Step(TestStep),
}

impl OpenNode {
    pub fn name(&self) -> &str {
        match self {
            OpenNode::Case(case) => &case.name,
            OpenNode::Step(step) => &step.name,
        }
    }

    fn attachments_mut(&mut self) -> &mut Vec<Attachment> {
        match self {
            OpenNode::Case(case) => &mut case.attachments,
            OpenNode::Step(step) => &mut step.attachments,
        }
    }

    fn steps_mut(&mut self) -> &mut Vec<TestStep> {
        match self {
            OpenNode::Case(case) => &mut case.steps,
            OpenNode::Step(step) => &mut step.steps,
        }
    }
}

/// Builds one [`TestCase`] out of the calls made while a test runs.
///
/// The bottom of the stack is always the case; steps are pushed on top of
/// it. Attachments land on whatever node is on top, while labels and the
/// description always go to the case.
#[derive(Debug, Default)]
pub struct Recorder {
    stack: Vec<OpenNode>,
    /// Name of the last finalized case, until the next one begins.
    finalized: Option<String>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a case is currently open.
    pub fn is_open(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Number of open steps above the case.
    pub fn open_steps(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    pub fn case(&self) -> Option<&TestCase> {
        match self.stack.first() {
            Some(OpenNode::Case(case)) => Some(case),
            _ => None,
        }
    }

    fn no_case(&self) -> RecorderError {
        match &self.finalized {
            Some(name) => RecorderError::CaseFinalized(name.clone()),
            None => RecorderError::NoOpenCase,
        }
    }

    fn case_mut(&mut self) -> Result<&mut TestCase, RecorderError> {
        if self.stack.is_empty() {
            return Err(self.no_case());
        }
        match self.stack.first_mut() {
            Some(OpenNode::Case(case)) => Ok(case),
            _ => Err(RecorderError::NoOpenCase),
        }
    }

    /// Opens a fresh case as the sole element of the stack.
    ///
    /// If the previous case was never finalized it is discarded, the
    /// violation is logged, and the error is returned for the caller to
    /// inspect. The new case is opened either way.
    pub fn begin_case(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        labels: Vec<Label>,
    ) -> Result<CaseId, RecorderError> {
        let name = name.into();
        let stale = self.stack.first().map(|node| node.name().to_string());
        self.stack.clear();
        self.finalized = None;

        let mut case = TestCase::new(name.clone(), now_unix_millis());
        case.description = description;
        case.labels = labels;
        let id = case.id.clone();
        self.stack.push(OpenNode::Case(case));

        match stale {
            Some(open) => {
                error!(
                    "Test case '{}' began while '{}' was still open; the open case is dropped",
                    name, open
                );
                Err(RecorderError::CaseAlreadyOpen {
                    open,
                    requested: name,
                })
            }
            None => {
                debug!("Began case '{}' ({})", name, id);
                Ok(id)
            }
        }
    }

    pub fn begin_step(&mut self, name: impl Into<String>) -> Result<(), RecorderError> {
        if self.stack.is_empty() {
            return Err(self.no_case());
        }
        self.stack
            .push(OpenNode::Step(TestStep::new(name, now_unix_millis())));
        Ok(())
    }

    /// Closes the innermost step and hands it to its parent.
    pub fn end_step(&mut self, outcome: StepOutcome) -> Result<Status, RecorderError> {
        let status = outcome.status();
        self.close_top_step(status)?;
        Ok(status)
    }

    fn close_top_step(&mut self, status: Status) -> Result<(), RecorderError> {
        match self.stack.last() {
            None => return Err(self.no_case()),
            Some(OpenNode::Case(_)) => return Err(RecorderError::NoOpenStep),
            Some(OpenNode::Step(_)) => {}
        }

        if let Some(OpenNode::Step(mut step)) = self.stack.pop() {
            step.stop = Some(now_unix_millis().max(step.start));
            step.status = Some(status);
            debug!("Ended step '{}' as {}", step.name, status);
            // the stack still holds at least the case
            if let Some(parent) = self.stack.last_mut() {
                parent.steps_mut().push(step);
            }
        }
        Ok(())
    }

    /// Appends an attachment to the node on top of the stack.
    pub fn attach(
        &mut self,
        title: impl Into<String>,
        payload: impl Into<AttachmentPayload>,
        kind: AttachmentType,
    ) -> Result<(), RecorderError> {
        if self.stack.is_empty() {
            return Err(self.no_case());
        }
        let top = self.stack.last_mut().ok_or(RecorderError::NoOpenCase)?;
        top.attachments_mut()
            .push(Attachment::pending(title, payload, kind));
        Ok(())
    }

    pub fn add_label<V: Into<String>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<(), RecorderError> {
        let case = self.case_mut()?;
        case.labels
            .extend(values.into_iter().map(|value| Label::new(name, value)));
        Ok(())
    }

    pub fn set_description(&mut self, text: impl Into<String>) -> Result<(), RecorderError> {
        self.case_mut()?.description = Some(text.into());
        Ok(())
    }

    /// Copy of the case as it would look finalized with `verdict`, leaving
    /// the recorder untouched.
    pub fn snapshot(&self, verdict: &Verdict) -> Result<TestCase, RecorderError> {
        let mut case = self.case().cloned().ok_or_else(|| self.no_case())?;
        apply_verdict(&mut case, verdict);
        Ok(case)
    }

    /// Closes the case and yields it. Steps still open are closed as
    /// broken first.
    pub fn finalize(&mut self, verdict: &Verdict) -> Result<TestCase, RecorderError> {
        if self.stack.is_empty() {
            return Err(self.no_case());
        }

        while self.open_steps() > 0 {
            if let Some(OpenNode::Step(step)) = self.stack.last() {
                warn!("Step '{}' was still open at finalization", step.name);
            }
            self.close_top_step(Status::Broken)?;
        }

        match self.stack.pop() {
            Some(OpenNode::Case(mut case)) => {
                apply_verdict(&mut case, verdict);
                debug!("Finalized case '{}' as {}", case.name, verdict.status);
                self.finalized = Some(case.name.clone());
                Ok(case)
            }
            _ => Err(RecorderError::NoOpenCase),
        }
    }
}

fn apply_verdict(case: &mut TestCase, verdict: &Verdict) {
    case.status = Some(verdict.status);
    case.stop = Some(now_unix_millis().max(case.start));
    case.failure = verdict.failure();
}
