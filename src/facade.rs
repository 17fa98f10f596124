// Facade - instrumentation calls made from test code
//
// Test code reports through free functions. They forward to a listener
// installed once the session is configured; before that, and in
// processes that never install one, they do nothing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error};

use crate::error::AdaptorError;
use crate::host::{TestId, TestListener};
use crate::model::{AttachmentPayload, AttachmentType, Label, Severity, Status, label_names};
use crate::state::StepOutcome;

static DELEGATE: Lazy<RwLock<Option<Arc<TestListener>>>> = Lazy::new(|| RwLock::new(None));

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*|[0-9]+)?\}").expect("Invalid regex"));

/// Binds the facade to `listener`, returning the previous one.
pub fn install(listener: Arc<TestListener>) -> Option<Arc<TestListener>> {
    let mut delegate = DELEGATE.write().unwrap_or_else(PoisonError::into_inner);
    delegate.replace(listener)
}

/// Unbinds the facade; later calls are no-ops again.
pub fn uninstall() -> Option<Arc<TestListener>> {
    let mut delegate = DELEGATE.write().unwrap_or_else(PoisonError::into_inner);
    delegate.take()
}

pub fn delegate() -> Option<Arc<TestListener>> {
    DELEGATE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// The listener and the test bound to this thread. `Ok(None)` when no
/// listener is installed.
fn target() -> Result<Option<(Arc<TestListener>, TestId)>, AdaptorError> {
    let Some(listener) = delegate() else {
        return Ok(None);
    };
    let id = listener.current_test().ok_or(AdaptorError::Unbound)?;
    Ok(Some((listener, id)))
}

/// Test bound to the calling thread, if a listener is installed.
pub fn current_test() -> Option<TestId> {
    delegate().and_then(|listener| listener.current_test())
}

/// Attaches `contents` to the innermost open step of the current test, or
/// to the test itself outside of steps.
pub fn attach(
    title: impl Into<String>,
    contents: impl Into<AttachmentPayload>,
    kind: AttachmentType,
) -> Result<(), AdaptorError> {
    match target()? {
        Some((listener, id)) => listener.attach(&id, title, contents, kind),
        None => Ok(()),
    }
}

/// Adds labels to the running test.
pub fn dynamic_label<V: Into<String>>(
    name: &str,
    values: impl IntoIterator<Item = V>,
) -> Result<(), AdaptorError> {
    match target()? {
        Some((listener, id)) => listener.add_label(&id, name, values),
        None => Ok(()),
    }
}

pub fn dynamic_issue<V: Into<String>>(issues: impl IntoIterator<Item = V>) -> Result<(), AdaptorError> {
    dynamic_label(label_names::ISSUE, issues)
}

pub fn description(text: impl Into<String>) -> Result<(), AdaptorError> {
    match target()? {
        Some((listener, id)) => listener.set_description(&id, text),
        None => Ok(()),
    }
}

/// Merges parameters into the session environment. Inside a test they
/// travel with that test's report.
pub fn environment<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Result<(), AdaptorError>
where
    K: Into<String>,
    V: Into<String>,
{
    let Some(listener) = delegate() else {
        return Ok(());
    };
    let delta: BTreeMap<String, String> = parameters
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    let id = listener.current_test();
    listener.add_environment(id.as_ref(), delta)
}

// Declarative labels, for test descriptors.

pub fn label<V: Into<String>>(name: &str, values: impl IntoIterator<Item = V>) -> Vec<Label> {
    values.into_iter().map(|v| Label::new(name, v)).collect()
}

pub fn feature<V: Into<String>>(features: impl IntoIterator<Item = V>) -> Vec<Label> {
    label(label_names::FEATURE, features)
}

pub fn story<V: Into<String>>(stories: impl IntoIterator<Item = V>) -> Vec<Label> {
    label(label_names::STORY, stories)
}

pub fn severity(severity: Severity) -> Label {
    Label::new(label_names::SEVERITY, severity.as_str())
}

pub fn issue<V: Into<String>>(issues: impl IntoIterator<Item = V>) -> Vec<Label> {
    label(label_names::ISSUE, issues)
}

pub fn testcase<V: Into<String>>(ids: impl IntoIterator<Item = V>) -> Vec<Label> {
    label(label_names::TESTCASE, ids)
}

/// Signals test code raises to steer step and test statuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestSignal {
    #[error("skipped: {0}")]
    Skip(String),

    #[error("expected failure: {0}")]
    ExpectedFailure(String),

    #[error("{0}")]
    Failure(String),
}

/// How an error leaving a step body closes that step.
pub trait ClassifyOutcome {
    fn step_outcome(&self) -> StepOutcome;
}

impl ClassifyOutcome for TestSignal {
    fn step_outcome(&self) -> StepOutcome {
        match self {
            TestSignal::Skip(_) => StepOutcome::Skipped,
            TestSignal::ExpectedFailure(_) => StepOutcome::ExpectedFailure,
            TestSignal::Failure(_) => StepOutcome::Failed,
        }
    }
}

impl ClassifyOutcome for anyhow::Error {
    fn step_outcome(&self) -> StepOutcome {
        self.downcast_ref::<TestSignal>()
            .map_or(StepOutcome::Failed, TestSignal::step_outcome)
    }
}

impl ClassifyOutcome for AdaptorError {
    fn step_outcome(&self) -> StepOutcome {
        StepOutcome::Failed
    }
}

impl ClassifyOutcome for Box<dyn std::error::Error + Send + Sync> {
    fn step_outcome(&self) -> StepOutcome {
        self.downcast_ref::<TestSignal>()
            .map_or(StepOutcome::Failed, TestSignal::step_outcome)
    }
}

/// An open step. Closing it explicitly records the given outcome;
/// dropping it records passed, or failed while the thread unwinds.
#[must_use = "the step closes as soon as the guard is dropped"]
pub struct StepGuard {
    target: Option<(Arc<TestListener>, TestId)>,
}

impl StepGuard {
    /// Whether the step is actually being recorded.
    pub fn is_recording(&self) -> bool {
        self.target.is_some()
    }

    pub fn finish(mut self, outcome: StepOutcome) -> Option<Status> {
        self.close(outcome)
    }

    fn close(&mut self, outcome: StepOutcome) -> Option<Status> {
        let (listener, id) = self.target.take()?;
        match listener.end_step(&id, outcome) {
            Ok(status) => Some(status),
            Err(e) => {
                error!("Could not close step of {}: {}", id, e);
                None
            }
        }
    }
}

impl Drop for StepGuard {
    fn drop(&mut self) {
        let outcome = if std::thread::panicking() {
            StepOutcome::Failed
        } else {
            StepOutcome::Passed
        };
        self.close(outcome);
    }
}

/// Opens a step in the current test. Without a listener or a bound test
/// the guard records nothing.
pub fn start_step(title: impl Into<String>) -> StepGuard {
    let title = title.into();
    let target = match target() {
        Ok(Some((listener, id))) => match listener.begin_step(&id, title.clone()) {
            Ok(()) => Some((listener, id)),
            Err(e) => {
                error!("Could not open step '{}': {}", title, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            debug!("Step '{}' not recorded: {}", title, e);
            None
        }
    };
    StepGuard { target }
}

/// Runs `body` as one step. The step fails, skips or is pending according
/// to the error `body` returns; the error itself is handed back unchanged.
pub fn step<T, E, F>(title: impl Into<String>, body: F) -> Result<T, E>
where
    E: ClassifyOutcome,
    F: FnOnce() -> Result<T, E>,
{
    let guard = start_step(title);
    let result = body();
    let outcome = match &result {
        Ok(_) => StepOutcome::Passed,
        Err(e) => e.step_outcome(),
    };
    guard.finish(outcome);
    result
}

/// [`step`] with a title filled in from `args`.
pub fn step_with<T, E, F>(template: &str, args: &StepArgs, body: F) -> Result<T, E>
where
    E: ClassifyOutcome,
    F: FnOnce() -> Result<T, E>,
{
    step(args.format(template), body)
}

/// Records an empty passed step, e.g. a checkpoint.
pub fn single_step(text: impl Into<String>) {
    start_step(text).finish(StepOutcome::Passed);
}

/// Arguments of a step call, used to fill in its title template.
///
/// `{}` takes the next positional argument, `{0}` a positional argument
/// by index and `{name}` a named one. Placeholders without a value are
/// left as written.
#[derive(Debug, Clone, Default)]
pub struct StepArgs {
    positional: Vec<String>,
    named: Vec<(String, String)>,
}

impl StepArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    pub fn named(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.named.push((name.into(), value.to_string()));
        self
    }

    pub fn format(&self, template: &str) -> String {
        let mut next = 0;
        PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let whole = caps[0].to_string();
                let value = match caps.get(1).map(|m| m.as_str()) {
                    None => {
                        let value = self.positional.get(next);
                        next += 1;
                        value
                    }
                    Some(key) => match key.parse::<usize>() {
                        Ok(index) => self.positional.get(index),
                        Err(_) => self.named.iter().find(|(n, _)| n == key).map(|(_, v)| v),
                    },
                };
                value.cloned().unwrap_or(whole)
            })
            .into_owned()
    }
}
