// Host listener
// Turns host lifecycle notifications into recorder calls and hands
// finished cases to a sink

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tracing::{debug, error, warn};

use super::descriptor::{TestDescriptor, TestId};
use crate::config::Config;
use crate::error::{AdaptorError, RecorderError};
use crate::filter::LabelFilter;
use crate::model::{AttachmentPayload, AttachmentType, Label, Status, TestCase, label_names};
use crate::report::{ReportWriter, Reporter, SessionSummary};
use crate::state::{
    CaseEnvelope, CaseSink, CollectFail, CollectionFailures, ModuleInfo, Phase, PhaseAction, PhaseOutcome,
    PhaseReport, PhaseTracker, Recorder, StepOutcome, Verdict,
};

const DANGLING_MESSAGE: &str = "test was started but never finished";

#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub double_report: bool,
    pub framework: String,
    pub language: String,
    pub thread_label: bool,
    pub filter: LabelFilter,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ListenerOptions {
    fn from(config: &Config) -> Self {
        Self {
            double_report: config.report.double_report,
            framework: config.labels.framework.clone(),
            language: config.labels.language.clone(),
            thread_label: config.labels.thread,
            filter: config.filter.to_filter(),
        }
    }
}

/// State of one test between `test_started` and its final phase.
struct InFlight {
    recorder: Recorder,
    module: ModuleInfo,
    phases: PhaseTracker,
    environment: BTreeMap<String, String>,
    sections_seen: HashSet<String>,
}

impl InFlight {
    fn envelope(&self, case: TestCase) -> CaseEnvelope {
        CaseEnvelope {
            module: self.module.clone(),
            case,
            environment: self.environment.clone(),
        }
    }
}

/// One listener serves a whole worker process. Tests may run on several
/// threads at once; each thread is bound to the test it is executing so
/// that facade calls find the right recorder.
pub struct TestListener {
    options: ListenerOptions,
    sink: Arc<dyn CaseSink>,
    in_flight: Mutex<HashMap<TestId, InFlight>>,
    bindings: Mutex<HashMap<ThreadId, TestId>>,
    collection: Mutex<CollectionFailures>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TestListener {
    pub fn new(sink: Arc<dyn CaseSink>, options: ListenerOptions) -> Self {
        Self {
            options,
            sink,
            in_flight: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
            collection: Mutex::new(CollectionFailures::new()),
        }
    }

    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    /// Number of tests started and not yet finalized.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Opens the case of `descriptor` and binds the calling thread to it.
    ///
    /// When the label filter rejects the test, the case is recorded right
    /// away as canceled and the skip reason is returned for the host to
    /// honor; later notifications for that id are then unknown.
    pub fn test_started(&self, descriptor: &TestDescriptor) -> Result<Option<String>, AdaptorError> {
        let declared = descriptor.resolved_labels();
        let skip = self.options.filter.check(&declared);

        let mut labels = declared;
        labels.push(Label::new(label_names::FRAMEWORK, &self.options.framework));
        labels.push(Label::new(label_names::LANGUAGE, &self.options.language));
        if self.options.thread_label {
            labels.push(Label::new(label_names::THREAD, thread_label()));
        }

        let id = descriptor.id.clone();
        let opened = {
            let mut in_flight = lock(&self.in_flight);
            let entry = in_flight.entry(id.clone()).or_insert_with(|| InFlight {
                recorder: Recorder::new(),
                module: descriptor.module.clone(),
                phases: PhaseTracker::new(self.options.double_report),
                environment: BTreeMap::new(),
                sections_seen: HashSet::new(),
            });
            // a restarted id begins from scratch
            entry.module = descriptor.module.clone();
            entry.phases = PhaseTracker::new(self.options.double_report);
            entry.environment.clear();
            entry.sections_seen.clear();
            entry.recorder.begin_case(
                descriptor.case_name(),
                descriptor.description.clone(),
                labels,
            )
        };

        if let Some(reason) = skip {
            debug!("Deselected {}: {}", id, reason);
            self.test_finished(&id, PhaseReport::skipped(Phase::Setup, reason.clone()))?;
            self.test_finished(&id, PhaseReport::passed(Phase::Teardown))?;
            return Ok(Some(reason));
        }

        self.bind_current_thread(&id);
        opened?;
        Ok(None)
    }

    /// Routes facade calls made on this thread to `id`.
    pub fn bind_current_thread(&self, id: &TestId) {
        lock(&self.bindings).insert(thread::current().id(), id.clone());
    }

    pub fn unbind_current_thread(&self) {
        lock(&self.bindings).remove(&thread::current().id());
    }

    /// The test the calling thread is executing, if any.
    pub fn current_test(&self) -> Option<TestId> {
        lock(&self.bindings).get(&thread::current().id()).cloned()
    }

    fn with_test<R>(
        &self,
        id: &TestId,
        f: impl FnOnce(&mut InFlight) -> Result<R, RecorderError>,
    ) -> Result<R, AdaptorError> {
        let mut in_flight = lock(&self.in_flight);
        let entry = in_flight
            .get_mut(id)
            .ok_or_else(|| AdaptorError::UnknownTest(id.clone()))?;
        Ok(f(entry)?)
    }

    pub fn begin_step(&self, id: &TestId, name: impl Into<String>) -> Result<(), AdaptorError> {
        self.with_test(id, |t| t.recorder.begin_step(name))
    }

    pub fn end_step(&self, id: &TestId, outcome: StepOutcome) -> Result<Status, AdaptorError> {
        self.with_test(id, |t| t.recorder.end_step(outcome))
    }

    pub fn attach(
        &self,
        id: &TestId,
        title: impl Into<String>,
        payload: impl Into<AttachmentPayload>,
        kind: AttachmentType,
    ) -> Result<(), AdaptorError> {
        self.with_test(id, |t| t.recorder.attach(title, payload, kind))
    }

    pub fn add_label<V: Into<String>>(
        &self,
        id: &TestId,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<(), AdaptorError> {
        self.with_test(id, |t| t.recorder.add_label(name, values))
    }

    pub fn set_description(&self, id: &TestId, text: impl Into<String>) -> Result<(), AdaptorError> {
        self.with_test(id, |t| t.recorder.set_description(text))
    }

    /// Merges `delta` into the environment sent along with test `id`, or
    /// straight into the session environment when no test is given.
    pub fn add_environment(
        &self,
        id: Option<&TestId>,
        delta: BTreeMap<String, String>,
    ) -> Result<(), AdaptorError> {
        match id {
            Some(id) => self.with_test(id, |t| {
                t.environment.extend(delta);
                Ok(())
            }),
            None => self
                .sink
                .record_environment(delta)
                .map_err(AdaptorError::Sink),
        }
    }

    /// Feeds one phase report. Returns the final status once the case has
    /// been finalized and delivered.
    pub fn test_finished(
        &self,
        id: &TestId,
        report: PhaseReport,
    ) -> Result<Option<Status>, AdaptorError> {
        let (action, early) = {
            let mut in_flight = lock(&self.in_flight);
            let entry = in_flight
                .get_mut(id)
                .ok_or_else(|| AdaptorError::UnknownTest(id.clone()))?;

            for section in &report.sections {
                if entry.sections_seen.insert(section.title.clone()) {
                    entry.recorder.attach(
                        section.title.clone(),
                        section.content.clone(),
                        AttachmentType::Text,
                    )?;
                }
            }

            let action = entry.phases.observe(&report);
            let early = match action {
                PhaseAction::ReportEarly => {
                    let case = entry.recorder.snapshot(&entry.phases.resolve())?;
                    Some(entry.envelope(case))
                }
                _ => None,
            };
            (action, early)
        };

        if let Some(envelope) = early {
            debug!("Reporting failed case '{}' ahead of teardown", envelope.case.name);
            self.sink.deliver(envelope).map_err(AdaptorError::Sink)?;
        }

        if action != PhaseAction::Finalize {
            return Ok(None);
        }

        let entry = lock(&self.in_flight).remove(id);
        let Some(mut entry) = entry else {
            return Err(AdaptorError::UnknownTest(id.clone()));
        };
        lock(&self.bindings).retain(|_, bound| bound != id);

        let verdict = entry.phases.resolve();
        let case = entry.recorder.finalize(&verdict)?;
        let status = verdict.status;
        self.sink
            .deliver(entry.envelope(case))
            .map_err(AdaptorError::Sink)?;
        Ok(Some(status))
    }

    /// Records a unit that failed before any of its tests could start.
    pub fn collection_failed(
        &self,
        name: impl Into<String>,
        outcome: PhaseOutcome,
        message: impl Into<String>,
        trace: Option<String>,
    ) {
        lock(&self.collection).record(name, outcome, message, trace);
    }

    /// Hands over the collection failures recorded so far, e.g. for a
    /// worker to forward them to its coordinator.
    pub fn take_collection_failures(&self) -> Vec<CollectFail> {
        lock(&self.collection).drain()
    }

    /// Closes every test still in flight as broken and delivers it.
    /// Returns how many were closed.
    pub fn finish_dangling(&self) -> usize {
        let dangling: Vec<(TestId, InFlight)> = lock(&self.in_flight).drain().collect();
        lock(&self.bindings).clear();

        let mut closed = 0;
        for (id, mut entry) in dangling {
            warn!("Test {} never finished; recording it as broken", id);
            let verdict = Verdict::new(Status::Broken).with_message(DANGLING_MESSAGE);
            let delivered = entry
                .recorder
                .finalize(&verdict)
                .map_err(AdaptorError::from)
                .and_then(|case| {
                    self.sink
                        .deliver(entry.envelope(case))
                        .map_err(AdaptorError::Sink)
                });
            match delivered {
                Ok(()) => closed += 1,
                Err(e) => error!("Could not close dangling test {}: {}", id, e),
            }
        }
        closed
    }

    /// Closes dangling tests and writes the collection suite. Cases go to
    /// the sink, so the aggregator behind it must finish afterwards.
    pub fn finish_session(&self, writer: &ReportWriter) -> SessionSummary {
        self.finish_dangling();
        lock(&self.collection).on_session_end(writer)
    }
}

impl Reporter for TestListener {
    fn on_session_end(&mut self, writer: &ReportWriter) -> SessionSummary {
        self.finish_session(writer)
    }
}

/// `<pid>-<thread name>`, the way worker threads are told apart in the
/// report timeline.
fn thread_label() -> String {
    let current = thread::current();
    let name = match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    };
    format!("{}-{}", std::process::id(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Aggregator;

    fn listener(options: ListenerOptions) -> (TestListener, Arc<Mutex<Aggregator>>) {
        let aggregator = Arc::new(Mutex::new(Aggregator::new()));
        let listener = TestListener::new(aggregator.clone(), options);
        (listener, aggregator)
    }

    fn descriptor(id: &str) -> TestDescriptor {
        TestDescriptor::new(id, ModuleInfo::new("tests/test_m.py", "tests.test_m"))
    }

    #[test]
    fn test_started_binds_thread_and_adds_host_labels() {
        let (listener, _) = listener(ListenerOptions::default());
        let started = listener.test_started(&descriptor("t1")).unwrap();
        assert!(started.is_none());
        assert_eq!(listener.current_test(), Some(TestId::from("t1")));
    }

    #[test]
    fn test_finalize_unbinds_and_delivers() {
        let (listener, aggregator) = listener(ListenerOptions::default());
        let id = TestId::from("t1");
        listener.test_started(&descriptor("t1")).unwrap();
        listener.test_finished(&id, PhaseReport::passed(Phase::Setup)).unwrap();
        listener.test_finished(&id, PhaseReport::passed(Phase::Call)).unwrap();
        let status = listener
            .test_finished(&id, PhaseReport::passed(Phase::Teardown))
            .unwrap();

        assert_eq!(status, Some(Status::Passed));
        assert_eq!(listener.current_test(), None);
        assert_eq!(listener.in_flight(), 0);

        let aggregator = aggregator.lock().unwrap();
        let case = &aggregator.suite("tests/test_m.py").unwrap().cases[0];
        assert_eq!(case.label_values("framework").collect::<Vec<_>>(), ["rust"]);
        assert_eq!(case.label_values("severity").collect::<Vec<_>>(), ["normal"]);
        assert_eq!(case.label_values("thread").count(), 1);
    }

    #[test]
    fn test_unknown_test_is_reported() {
        let (listener, _) = listener(ListenerOptions::default());
        let err = listener
            .test_finished(&TestId::from("ghost"), PhaseReport::passed(Phase::Call))
            .unwrap_err();
        assert!(matches!(err, AdaptorError::UnknownTest(_)));
    }

    #[test]
    fn test_sections_attached_once_per_title() {
        let (listener, aggregator) = listener(ListenerOptions::default());
        let id = TestId::from("t1");
        listener.test_started(&descriptor("t1")).unwrap();
        listener
            .test_finished(
                &id,
                PhaseReport::passed(Phase::Call).with_section("Captured stdout call", "hi"),
            )
            .unwrap();
        listener
            .test_finished(
                &id,
                PhaseReport::passed(Phase::Teardown)
                    .with_section("Captured stdout call", "hi")
                    .with_section("Captured stderr teardown", "bye"),
            )
            .unwrap();

        let aggregator = aggregator.lock().unwrap();
        let case = &aggregator.suite("tests/test_m.py").unwrap().cases[0];
        let titles: Vec<&str> = case.attachments.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["Captured stdout call", "Captured stderr teardown"]);
    }

    #[test]
    fn test_filtered_test_is_recorded_as_canceled() {
        let options = ListenerOptions {
            filter: LabelFilter::new().with_features(["checkout"]),
            ..ListenerOptions::default()
        };
        let (listener, aggregator) = listener(options);

        let reason = listener.test_started(&descriptor("t1")).unwrap();

        assert!(reason.unwrap().starts_with("Not suitable with selected labels"));
        assert_eq!(listener.current_test(), None);
        let aggregator = aggregator.lock().unwrap();
        let case = &aggregator.suite("tests/test_m.py").unwrap().cases[0];
        assert_eq!(case.status, Some(Status::Canceled));
    }

    #[test]
    fn test_double_report_delivers_twice_with_same_identity() {
        let options = ListenerOptions {
            double_report: true,
            ..ListenerOptions::default()
        };
        let (listener, aggregator) = listener(options);
        let id = TestId::from("t1");
        listener.test_started(&descriptor("t1")).unwrap();
        listener
            .test_finished(&id, PhaseReport::failed(Phase::Call, "E", "T"))
            .unwrap();
        assert_eq!(aggregator.lock().unwrap().case_count(), 1);

        listener
            .test_finished(&id, PhaseReport::failed(Phase::Teardown, "cleanup", "T2"))
            .unwrap();

        let aggregator = aggregator.lock().unwrap();
        assert_eq!(aggregator.case_count(), 1);
        let case = &aggregator.suite("tests/test_m.py").unwrap().cases[0];
        assert_eq!(case.status, Some(Status::Failed));
    }

    #[test]
    fn test_dangling_tests_closed_as_broken() {
        let (listener, aggregator) = listener(ListenerOptions::default());
        listener.test_started(&descriptor("t1")).unwrap();
        listener.begin_step(&TestId::from("t1"), "never ends").unwrap();

        assert_eq!(listener.finish_dangling(), 1);

        let aggregator = aggregator.lock().unwrap();
        let case = &aggregator.suite("tests/test_m.py").unwrap().cases[0];
        assert_eq!(case.status, Some(Status::Broken));
        assert_eq!(case.steps[0].status, Some(Status::Broken));
    }

    #[test]
    fn test_environment_without_test_goes_to_session() {
        let (listener, aggregator) = listener(ListenerOptions::default());
        listener
            .add_environment(None, BTreeMap::from([("os".to_string(), "linux".to_string())]))
            .unwrap();
        assert_eq!(aggregator.lock().unwrap().environment().get("os"), Some("linux"));
    }
}
