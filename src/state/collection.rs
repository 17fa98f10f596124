// Collection-failure recorder
// Reports units that failed before any of their tests could start

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::phases::PhaseOutcome;
use super::recorder::{Recorder, Verdict};
use crate::model::{Status, TestSuite};
use crate::report::{ReportWriter, Reporter, SessionSummary};
use crate::time::now_unix_millis;

pub const COLLECTION_SUITE_NAME: &str = "test_collection_phase";
pub const COLLECTION_SUITE_TITLE: &str = "Collection phase";
pub const COLLECTION_SUITE_DESCRIPTION: &str =
    "This is the tests collection phase. Failures are modules that failed to collect.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectFail {
    pub name: String,
    pub status: Status,
    pub message: String,
    #[serde(default)]
    pub trace: Option<String>,
}

/// Accumulates collection failures into one synthetic suite.
#[derive(Debug, Default)]
pub struct CollectionFailures {
    fails: Vec<CollectFail>,
}

impl CollectionFailures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed (broken) or skipped (canceled) unit. Passed
    /// outcomes are not failures and are ignored.
    pub fn record(
        &mut self,
        name: impl Into<String>,
        outcome: PhaseOutcome,
        message: impl Into<String>,
        trace: Option<String>,
    ) {
        let status = match outcome {
            PhaseOutcome::Failed => Status::Broken,
            PhaseOutcome::Skipped => Status::Canceled,
            PhaseOutcome::Passed => {
                warn!("Ignoring passed collection report");
                return;
            }
        };
        let fail = CollectFail {
            name: name.into(),
            status,
            message: message.into(),
            trace,
        };
        self.push(fail);
    }

    /// Adds a failure recorded elsewhere, e.g. by a worker process.
    pub fn push(&mut self, fail: CollectFail) {
        debug!("Collection of '{}' ended as {}", fail.name, fail.status);
        self.fails.push(fail);
    }

    pub fn drain(&mut self) -> Vec<CollectFail> {
        std::mem::take(&mut self.fails)
    }

    pub fn len(&self) -> usize {
        self.fails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fails.is_empty()
    }

    /// The collection suite, if anything failed.
    pub fn build_suite(&self) -> Option<TestSuite> {
        if self.fails.is_empty() {
            return None;
        }

        let mut suite = TestSuite::new(COLLECTION_SUITE_NAME, now_unix_millis());
        suite.title = Some(COLLECTION_SUITE_TITLE.to_string());
        suite.description = Some(COLLECTION_SUITE_DESCRIPTION.to_string());

        for fail in &self.fails {
            let mut recorder = Recorder::new();
            let verdict = Verdict {
                status: fail.status,
                message: Some(fail.message.clone()),
                trace: fail.trace.clone(),
            };
            let closed = recorder
                .begin_case(fail.name.clone(), None, Vec::new())
                .and_then(|_| recorder.finalize(&verdict));
            match closed {
                Ok(case) => suite.cases.push(case),
                Err(e) => error!("Could not close collection case '{}': {}", fail.name, e),
            }
        }

        suite.stop = suite.last_stop();
        Some(suite)
    }
}

impl Reporter for CollectionFailures {
    fn on_session_end(&mut self, writer: &ReportWriter) -> SessionSummary {
        let mut summary = SessionSummary::default();
        if let Some(suite) = self.build_suite() {
            match writer.write_suite(&suite) {
                Ok(path) => {
                    summary.cases = suite.cases.len();
                    summary.suites.push(path);
                    self.fails.clear();
                }
                Err(e) => {
                    error!("Failed to write collection suite: {:#}", e);
                    summary.failures.push(format!("collection suite: {:#}", e));
                }
            }
        }
        summary
    }
}
