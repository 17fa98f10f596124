// Report module - persisting finished suites and the session environment

pub mod writer;

pub use writer::{ENVIRONMENT_FILE, ReportWriter};

use serde::Serialize;
use std::path::PathBuf;

/// Anything that buffers report data until the session ends.
pub trait Reporter {
    /// Called once when the session ends; writes everything buffered.
    fn on_session_end(&mut self, writer: &ReportWriter) -> SessionSummary;
}

/// What a session end produced. Per-suite failures are collected here
/// instead of aborting the remaining writes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub suites: Vec<PathBuf>,
    pub environment: Option<PathBuf>,
    pub cases: usize,
    pub attachments: usize,
    pub failures: Vec<String>,
}

impl SessionSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: SessionSummary) {
        self.suites.extend(other.suites);
        if other.environment.is_some() {
            self.environment = other.environment;
        }
        self.cases += other.cases;
        self.attachments += other.attachments;
        self.failures.extend(other.failures);
    }
}
