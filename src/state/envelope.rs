// Hand-off of finished cases from recorders to the aggregator

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::aggregator::Aggregator;
use crate::model::TestCase;

/// The source module a case belongs to. `id` groups cases into suites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
}

impl ModuleInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            doc: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// A finished case together with everything the aggregator needs to file it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseEnvelope {
    pub module: ModuleInfo,
    pub case: TestCase,
    pub environment: BTreeMap<String, String>,
}

/// Receiver of finished cases. The coordinator's aggregator is one;
/// a worker writing envelopes for a remote coordinator is another.
pub trait CaseSink: Send + Sync {
    fn deliver(&self, envelope: CaseEnvelope) -> Result<()>;

    /// Session-wide environment parameters set outside any test.
    fn record_environment(&self, delta: BTreeMap<String, String>) -> Result<()>;
}

impl CaseSink for Mutex<Aggregator> {
    fn deliver(&self, envelope: CaseEnvelope) -> Result<()> {
        let mut aggregator = self
            .lock()
            .map_err(|_| anyhow::anyhow!("aggregator lock poisoned"))?;
        aggregator.record_envelope(envelope);
        Ok(())
    }

    fn record_environment(&self, delta: BTreeMap<String, String>) -> Result<()> {
        let mut aggregator = self
            .lock()
            .map_err(|_| anyhow::anyhow!("aggregator lock poisoned"))?;
        aggregator.record_environment(delta);
        Ok(())
    }
}
