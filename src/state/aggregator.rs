// Session aggregator
// Groups finished cases into suites by module and writes them at session end

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

use super::envelope::{CaseEnvelope, ModuleInfo};
use super::wire::WireRecord;
use crate::model::{CaseId, Environment, Status, TestCase, TestSuite};
use crate::report::{ReportWriter, Reporter, SessionSummary};

#[derive(Debug)]
struct PendingSuite {
    suite: TestSuite,
    positions: HashMap<CaseId, usize>,
}

impl PendingSuite {
    fn new(module: &ModuleInfo, start: u64) -> Self {
        let mut suite = TestSuite::new(module.name.clone(), start);
        suite.description = module.doc.clone();
        Self {
            suite,
            positions: HashMap::new(),
        }
    }

    /// A case with a known identity replaces the earlier one in place.
    fn insert(&mut self, case: TestCase) {
        match self.positions.get(&case.id) {
            Some(&index) => {
                debug!(
                    "Case '{}' ({}) reported again; keeping the latest report",
                    case.name, case.id
                );
                self.suite.cases[index] = case;
            }
            None => {
                self.positions.insert(case.id.clone(), self.suite.cases.len());
                self.suite.cases.push(case);
            }
        }
    }
}

/// Owns the in-progress suites of one session.
#[derive(Debug, Default)]
pub struct Aggregator {
    suites: Vec<PendingSuite>,
    by_module: HashMap<String, usize>,
    environment: Environment,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `case` under the suite of `module`, creating the suite on
    /// first sight, and merges `environment_delta` into the session
    /// environment.
    pub fn record(
        &mut self,
        mut case: TestCase,
        module: &ModuleInfo,
        environment_delta: BTreeMap<String, String>,
    ) {
        self.environment.merge(environment_delta);

        if !case.is_terminal() {
            warn!(
                "Case '{}' arrived without a terminal status; recording it as broken",
                case.name
            );
            case.status.get_or_insert(Status::Broken);
            case.stop.get_or_insert(case.start);
        }

        let index = match self.by_module.get(&module.id) {
            Some(&index) => index,
            None => {
                debug!("Opened suite '{}' for module {}", module.name, module.id);
                self.suites.push(PendingSuite::new(module, case.start));
                self.by_module
                    .insert(module.id.clone(), self.suites.len() - 1);
                self.suites.len() - 1
            }
        };
        self.suites[index].insert(case);
    }

    pub fn record_envelope(&mut self, envelope: CaseEnvelope) {
        self.record(envelope.case, &envelope.module, envelope.environment);
    }

    pub fn record_wire(&mut self, record: WireRecord) {
        match record {
            WireRecord::Case(envelope) => self.record_envelope(envelope.into()),
            WireRecord::Environment { parameters } => self.record_environment(parameters),
            WireRecord::CollectionFailed(fail) => {
                warn!(
                    "Collection failure of '{}' is not a case; it belongs to a collection suite",
                    fail.name
                );
            }
        }
    }

    pub fn record_environment(&mut self, delta: BTreeMap<String, String>) {
        self.environment.merge(delta);
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn suite_count(&self) -> usize {
        self.suites.len()
    }

    /// Number of distinct cases currently held.
    pub fn case_count(&self) -> usize {
        self.suites.iter().map(|s| s.suite.cases.len()).sum()
    }

    /// Suite of `module_id`, if any case was filed under it.
    pub fn suite(&self, module_id: &str) -> Option<&TestSuite> {
        self.by_module
            .get(module_id)
            .map(|&index| &self.suites[index].suite)
    }

    /// Persists attachments, writes one document per non-empty suite and the
    /// environment document. A suite that fails to write is reported in
    /// the summary without stopping the others. Everything written is
    /// dropped from memory, so a second call writes nothing.
    pub fn finish_session(&mut self, writer: &ReportWriter) -> SessionSummary {
        let mut summary = SessionSummary::default();
        self.by_module.clear();

        for pending in std::mem::take(&mut self.suites) {
            let mut suite = pending.suite;
            if suite.cases.is_empty() {
                continue;
            }
            suite.stop = suite.last_stop();

            match write_suite(writer, &mut suite) {
                Ok((path, attachments)) => {
                    summary.cases += suite.cases.len();
                    summary.attachments += attachments;
                    summary.suites.push(path);
                }
                Err(e) => {
                    error!("Failed to write suite '{}': {:#}", suite.name, e);
                    summary
                        .failures
                        .push(format!("suite '{}': {:#}", suite.name, e));
                }
            }
        }

        let environment = std::mem::take(&mut self.environment);
        match writer.write_environment(&environment) {
            Ok(path) => summary.environment = path,
            Err(e) => {
                error!("Failed to write environment: {:#}", e);
                summary.failures.push(format!("environment: {:#}", e));
            }
        }

        info!(
            "Wrote {} suites with {} cases and {} attachments",
            summary.suites.len(),
            summary.cases,
            summary.attachments
        );
        summary
    }
}

fn write_suite(
    writer: &ReportWriter,
    suite: &mut TestSuite,
) -> anyhow::Result<(std::path::PathBuf, usize)> {
    let mut attachments = 0;
    for case in &mut suite.cases {
        attachments += writer.persist_attachments(case)?;
    }
    let path = writer.write_suite(suite)?;
    Ok((path, attachments))
}

impl Reporter for Aggregator {
    fn on_session_end(&mut self, writer: &ReportWriter) -> SessionSummary {
        self.finish_session(writer)
    }
}
