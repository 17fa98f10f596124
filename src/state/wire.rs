// Wire snapshot of case envelopes for cross-process transport
//
// Workers serialize finished cases and collection failures as JSON lines;
// the coordinator reads them back into an aggregator. The snapshot types are kept apart from the
// in-memory entities so either side can change on its own.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::sync::Mutex;
use tracing::warn;

use super::collection::CollectFail;
use super::envelope::{CaseEnvelope, CaseSink, ModuleInfo};
use crate::model::{
    Attachment, AttachmentPayload, AttachmentSource, AttachmentType, CaseId, Failure, Label,
    Status, TestCase, TestStep,
};

/// One line of a worker's envelope stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireRecord {
    Case(WireEnvelope),
    Environment { parameters: BTreeMap<String, String> },
    CollectionFailed(CollectFail),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub module: ModuleInfo,
    pub case: WireCase,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCase {
    pub id: CaseId,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub failure: Option<Failure>,
    pub start: u64,
    #[serde(default)]
    pub stop: Option<u64>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub steps: Vec<WireStep>,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireStep {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    pub start: u64,
    #[serde(default)]
    pub stop: Option<u64>,
    #[serde(default)]
    pub steps: Vec<WireStep>,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
}

/// Exactly one of `text`, `bytes` or `file` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAttachment {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl From<Attachment> for WireAttachment {
    fn from(attachment: Attachment) -> Self {
        let (text, bytes, file) = match attachment.source {
            AttachmentSource::Pending(AttachmentPayload::Text(text)) => (Some(text), None, None),
            AttachmentSource::Pending(AttachmentPayload::Bytes(bytes)) => {
                (None, Some(bytes), None)
            }
            AttachmentSource::File(file) => (None, None, Some(file)),
        };
        Self {
            title: attachment.title,
            kind: attachment.kind,
            text,
            bytes,
            file,
        }
    }
}

impl From<WireAttachment> for Attachment {
    fn from(wire: WireAttachment) -> Self {
        let source = match (wire.text, wire.bytes, wire.file) {
            (_, _, Some(file)) => AttachmentSource::File(file),
            (Some(text), _, _) => AttachmentSource::Pending(AttachmentPayload::Text(text)),
            (None, Some(bytes), _) => AttachmentSource::Pending(AttachmentPayload::Bytes(bytes)),
            (None, None, None) => {
                warn!("Attachment '{}' arrived without contents", wire.title);
                AttachmentSource::Pending(AttachmentPayload::Bytes(Vec::new()))
            }
        };
        Self {
            title: wire.title,
            kind: wire.kind,
            source,
        }
    }
}

impl From<TestStep> for WireStep {
    fn from(step: TestStep) -> Self {
        Self {
            name: step.name,
            title: step.title,
            status: step.status,
            start: step.start,
            stop: step.stop,
            steps: step.steps.into_iter().map(Into::into).collect(),
            attachments: step.attachments.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<WireStep> for TestStep {
    fn from(wire: WireStep) -> Self {
        Self {
            name: wire.name,
            title: wire.title,
            status: wire.status,
            start: wire.start,
            stop: wire.stop,
            steps: wire.steps.into_iter().map(Into::into).collect(),
            attachments: wire.attachments.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<TestCase> for WireCase {
    fn from(case: TestCase) -> Self {
        Self {
            id: case.id,
            name: case.name,
            title: case.title,
            description: case.description,
            status: case.status,
            failure: case.failure,
            start: case.start,
            stop: case.stop,
            labels: case.labels,
            steps: case.steps.into_iter().map(Into::into).collect(),
            attachments: case.attachments.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<WireCase> for TestCase {
    fn from(wire: WireCase) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            title: wire.title,
            description: wire.description,
            steps: wire.steps.into_iter().map(Into::into).collect(),
            attachments: wire.attachments.into_iter().map(Into::into).collect(),
            labels: wire.labels,
            status: wire.status,
            failure: wire.failure,
            start: wire.start,
            stop: wire.stop,
        }
    }
}

impl From<CaseEnvelope> for WireEnvelope {
    fn from(envelope: CaseEnvelope) -> Self {
        Self {
            module: envelope.module,
            case: envelope.case.into(),
            environment: envelope.environment,
        }
    }
}

impl From<WireEnvelope> for CaseEnvelope {
    fn from(wire: WireEnvelope) -> Self {
        Self {
            module: wire.module,
            case: wire.case.into(),
            environment: wire.environment,
        }
    }
}

/// Sink that streams envelopes as JSON lines instead of aggregating them.
pub struct EnvelopeWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> EnvelopeWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|_| anyhow::anyhow!("envelope writer lock poisoned"))
    }

    /// Forwards a collection failure so the coordinator can report it.
    pub fn collection_failed(&self, fail: CollectFail) -> Result<()> {
        self.emit(&WireRecord::CollectionFailed(fail))
    }

    fn emit(&self, record: &WireRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize envelope")?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("envelope writer lock poisoned"))?;
        writeln!(out, "{}", line).context("Failed to write envelope")?;
        out.flush().context("Failed to flush envelope stream")
    }
}

impl<W: Write + Send> CaseSink for EnvelopeWriter<W> {
    fn deliver(&self, envelope: CaseEnvelope) -> Result<()> {
        self.emit(&WireRecord::Case(envelope.into()))
    }

    fn record_environment(&self, delta: BTreeMap<String, String>) -> Result<()> {
        self.emit(&WireRecord::Environment { parameters: delta })
    }
}

/// Reads an envelope stream. Blank lines are skipped.
pub fn read_records(reader: impl BufRead) -> Result<Vec<WireRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read envelope line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Malformed envelope on line {}", index + 1))?;
        records.push(record);
    }
    Ok(records)
}
