// Replay command - drives a listener from recorded host events

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::BufRead;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::cli::ReplayArgs;
use crate::config::Config;
use crate::error::AdaptorError;
use crate::filter::{LabelFilter, split_list};
use crate::host::{ListenerOptions, TestDescriptor, TestId, TestListener};
use crate::model::{AttachmentPayload, AttachmentType, Severity};
use crate::report::{ReportWriter, SessionSummary};
use crate::state::{Aggregator, EnvelopeWriter, PhaseOutcome, PhaseReport, StepOutcome};
use crate::utils::FileUtils;

/// One lifecycle notification, as a line of an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    TestStarted(TestDescriptor),
    StepStarted {
        test: TestId,
        name: String,
    },
    StepFinished {
        test: TestId,
        #[serde(default)]
        outcome: StepOutcome,
    },
    Attach {
        test: TestId,
        title: String,
        #[serde(rename = "type", default)]
        kind: AttachmentType,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        bytes: Option<Vec<u8>>,
    },
    Label {
        test: TestId,
        name: String,
        values: Vec<String>,
    },
    Description {
        test: TestId,
        text: String,
    },
    Environment {
        #[serde(default)]
        test: Option<TestId>,
        parameters: BTreeMap<String, String>,
    },
    TestFinished {
        test: TestId,
        #[serde(flatten)]
        report: PhaseReport,
    },
    CollectionFailed {
        name: String,
        outcome: PhaseOutcome,
        #[serde(default)]
        message: String,
        #[serde(default)]
        trace: Option<String>,
    },
}

impl HostEvent {
    fn test(&self) -> Option<&TestId> {
        match self {
            HostEvent::TestStarted(descriptor) => Some(&descriptor.id),
            HostEvent::StepStarted { test, .. }
            | HostEvent::StepFinished { test, .. }
            | HostEvent::Attach { test, .. }
            | HostEvent::Label { test, .. }
            | HostEvent::Description { test, .. }
            | HostEvent::TestFinished { test, .. } => Some(test),
            HostEvent::Environment { test, .. } => test.as_ref(),
            HostEvent::CollectionFailed { .. } => None,
        }
    }
}

/// Reads an event stream. Blank lines are skipped.
pub fn read_events(reader: impl BufRead) -> Result<Vec<HostEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read event line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .with_context(|| format!("Malformed event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn read_event_file(path: &Path) -> Result<Vec<HostEvent>> {
    let reader = FileUtils::open_reader(path)?;
    read_events(reader).with_context(|| format!("Failed to read events from {}", path.display()))
}

/// Listener options: config file, overridden by command line flags.
pub fn listener_options(args: &ReplayArgs, config: &Config) -> Result<ListenerOptions> {
    let mut options = ListenerOptions::from(config);
    options.double_report |= args.double_report;

    let cli_filter_given = args.allure_severities.is_some()
        || args.allure_features.is_some()
        || args.allure_stories.is_some();
    if cli_filter_given {
        let severities = args
            .allure_severities
            .as_deref()
            .map(split_list)
            .unwrap_or_default()
            .iter()
            .map(|s| s.parse::<Severity>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(anyhow::Error::msg)?;
        options.filter = LabelFilter::new()
            .with_severities(severities)
            .with_features(args.allure_features.as_deref().map(split_list).unwrap_or_default())
            .with_stories(args.allure_stories.as_deref().map(split_list).unwrap_or_default());
    }
    Ok(options)
}

/// Feeds `events` into `listener`. Notifications the listener rejects are
/// logged and skipped. Returns how many were rejected.
pub fn replay_events(listener: &TestListener, events: Vec<HostEvent>) -> usize {
    let mut deselected: HashSet<TestId> = HashSet::new();
    let mut rejected = 0;

    for event in events {
        if let Some(id) = event.test() {
            if deselected.contains(id) && !matches!(event, HostEvent::TestStarted(_)) {
                debug!("Dropping event of deselected test {}", id);
                continue;
            }
        }

        let result = match event {
            HostEvent::TestStarted(descriptor) => {
                listener.test_started(&descriptor).map(|skip| {
                    match skip {
                        Some(reason) => {
                            info!("Deselected {}: {}", descriptor.id, reason);
                            deselected.insert(descriptor.id.clone());
                        }
                        None => {
                            deselected.remove(&descriptor.id);
                        }
                    }
                })
            }
            HostEvent::StepStarted { test, name } => listener.begin_step(&test, name),
            HostEvent::StepFinished { test, outcome } => {
                listener.end_step(&test, outcome).map(|_| ())
            }
            HostEvent::Attach {
                test,
                title,
                kind,
                text,
                bytes,
            } => {
                let payload = match (text, bytes) {
                    (Some(text), _) => AttachmentPayload::Text(text),
                    (None, Some(bytes)) => AttachmentPayload::Bytes(bytes),
                    (None, None) => AttachmentPayload::Bytes(Vec::new()),
                };
                listener.attach(&test, title, payload, kind)
            }
            HostEvent::Label { test, name, values } => listener.add_label(&test, &name, values),
            HostEvent::Description { test, text } => listener.set_description(&test, text),
            HostEvent::Environment { test, parameters } => {
                listener.add_environment(test.as_ref(), parameters)
            }
            HostEvent::TestFinished { test, report } => {
                listener.test_finished(&test, report).map(|_| ())
            }
            HostEvent::CollectionFailed {
                name,
                outcome,
                message,
                trace,
            } => {
                listener.collection_failed(name, outcome, message, trace);
                Ok(())
            }
        };

        if let Err(e) = result {
            rejected += 1;
            log_rejection(&e);
        }
    }

    rejected
}

fn log_rejection(e: &AdaptorError) {
    match e {
        AdaptorError::Sink(_) => error!("{}", e),
        _ => warn!("Rejected event: {}", e),
    }
}

/// Handle the replay command
pub fn handle_replay(args: &ReplayArgs, config: &Config) -> Result<SessionSummary> {
    let options = listener_options(args, config)?;

    let mut events = Vec::new();
    for path in &args.events {
        events.extend(read_event_file(path)?);
    }
    info!("Replaying {} events from {} files", events.len(), args.events.len());

    match &args.worker_output {
        Some(output) => replay_as_worker(options, events, output),
        None => replay_as_coordinator(args, config, options, events),
    }
}

fn claim_output_dir(dir: &Path, clean: bool) -> Result<ReportWriter> {
    if clean {
        ReportWriter::create(dir)
    } else {
        ReportWriter::open(dir)
    }
}

fn replay_as_coordinator(
    args: &ReplayArgs,
    config: &Config,
    options: ListenerOptions,
    events: Vec<HostEvent>,
) -> Result<SessionSummary> {
    let dir = config.results_dir(args.alluredir.as_deref());
    let writer = claim_output_dir(&dir, config.report.clean && !args.no_clean)?;

    let aggregator = Arc::new(Mutex::new(Aggregator::new()));
    let listener = TestListener::new(aggregator.clone(), options);

    let rejected = replay_events(&listener, events);
    let mut summary = listener.finish_session(&writer);

    let mut aggregator = aggregator
        .lock()
        .map_err(|_| anyhow::anyhow!("aggregator lock poisoned"))?;
    summary.merge(aggregator.finish_session(&writer));

    if rejected > 0 {
        summary
            .failures
            .push(format!("{} events were rejected", rejected));
    }
    Ok(summary)
}

// A worker never touches the report directory; everything it saw goes
// into the envelope stream for `merge` to write.
fn replay_as_worker(
    options: ListenerOptions,
    events: Vec<HostEvent>,
    output: &Path,
) -> Result<SessionSummary> {
    let sink = Arc::new(EnvelopeWriter::new(FileUtils::create_writer(output)?));
    let listener = TestListener::new(sink.clone(), options);

    let rejected = replay_events(&listener, events);
    let closed = listener.finish_dangling();
    debug!("Closed {} dangling tests", closed);

    let mut summary = SessionSummary::default();
    for fail in listener.take_collection_failures() {
        let name = fail.name.clone();
        if let Err(e) = sink.collection_failed(fail) {
            error!("Could not forward collection failure of '{}': {:#}", name, e);
            summary
                .failures
                .push(format!("collection failure '{}': {:#}", name, e));
        }
    }

    info!("Wrote worker envelopes to {}", output.display());
    if rejected > 0 {
        summary
            .failures
            .push(format!("{} events were rejected", rejected));
    }
    Ok(summary)
}
