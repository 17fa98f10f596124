// Case-level report entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::constants::{AttachmentType, Status};
use crate::xml::{ToXml, XmlNode, Xmlfied};

/// Identity token of one logical test invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(String);

impl CaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CaseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `(name, value)` metadata tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.value)
    }
}

impl ToXml for Label {
    fn to_xml(&self) -> XmlNode {
        Xmlfied::new("label")
            .attribute("name", &self.name)
            .attribute("value", &self.value)
            .build()
    }
}

/// Error text recorded on a failed, broken or skipped node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    pub trace: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>, trace: Option<String>) -> Self {
        Self {
            message: message.into(),
            trace,
        }
    }
}

impl ToXml for Failure {
    fn to_xml(&self) -> XmlNode {
        Xmlfied::new("failure")
            .element("message", &self.message)
            .element_named_if("trace", "stack-trace", self.trace.as_deref())
            .build()
    }
}

/// Raw attachment contents. Text is written UTF-8 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentPayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl AttachmentPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttachmentPayload::Text(text) => text.as_bytes(),
            AttachmentPayload::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for AttachmentPayload {
    fn from(value: String) -> Self {
        AttachmentPayload::Text(value)
    }
}

impl From<&str> for AttachmentPayload {
    fn from(value: &str) -> Self {
        AttachmentPayload::Text(value.to_string())
    }
}

impl From<Vec<u8>> for AttachmentPayload {
    fn from(value: Vec<u8>) -> Self {
        AttachmentPayload::Bytes(value)
    }
}

impl From<&[u8]> for AttachmentPayload {
    fn from(value: &[u8]) -> Self {
        AttachmentPayload::Bytes(value.to_vec())
    }
}

/// Where the attachment contents currently live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Held in memory until the report writer persists it.
    Pending(AttachmentPayload),
    /// File name inside the report directory.
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub title: String,
    pub kind: AttachmentType,
    pub source: AttachmentSource,
}

impl Attachment {
    pub fn pending(
        title: impl Into<String>,
        payload: impl Into<AttachmentPayload>,
        kind: AttachmentType,
    ) -> Self {
        Self {
            title: title.into(),
            kind,
            source: AttachmentSource::Pending(payload.into()),
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.source, AttachmentSource::File(_))
    }

    /// File name once persisted.
    pub fn file_name(&self) -> Option<&str> {
        match &self.source {
            AttachmentSource::File(name) => Some(name),
            AttachmentSource::Pending(_) => None,
        }
    }
}

impl ToXml for Attachment {
    fn to_xml(&self) -> XmlNode {
        Xmlfied::new("attachment")
            .attribute("source", self.file_name().unwrap_or_default())
            .attribute("title", &self.title)
            .attribute("type", self.kind.mime_type())
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestStep {
    pub name: String,
    pub title: Option<String>,
    pub steps: Vec<TestStep>,
    pub attachments: Vec<Attachment>,
    pub status: Option<Status>,
    pub start: u64,
    pub stop: Option<u64>,
}

impl TestStep {
    pub fn new(name: impl Into<String>, start: u64) -> Self {
        let name = name.into();
        Self {
            title: Some(name.clone()),
            name,
            steps: Vec::new(),
            attachments: Vec::new(),
            status: None,
            start,
            stop: None,
        }
    }

    /// Depth of the deepest nested step chain, counting this step.
    pub fn depth(&self) -> usize {
        1 + self.steps.iter().map(TestStep::depth).max().unwrap_or(0)
    }
}

impl ToXml for TestStep {
    fn to_xml(&self) -> XmlNode {
        Xmlfied::new("step")
            .element("name", &self.name)
            .element_if("title", self.title.as_deref())
            .wrapped_many("attachments", &self.attachments)
            .wrapped_many("steps", &self.steps)
            .attribute("start", self.start)
            .attribute("stop", self.stop.unwrap_or(self.start))
            .attribute("status", self.status.unwrap_or(Status::Broken))
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub id: CaseId,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub steps: Vec<TestStep>,
    pub attachments: Vec<Attachment>,
    pub labels: Vec<Label>,
    pub status: Option<Status>,
    pub failure: Option<Failure>,
    pub start: u64,
    pub stop: Option<u64>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, start: u64) -> Self {
        Self {
            id: CaseId::new(),
            name: name.into(),
            title: None,
            description: None,
            steps: Vec::new(),
            attachments: Vec::new(),
            labels: Vec::new(),
            status: None,
            failure: None,
            start,
            stop: None,
        }
    }

    /// Status and stop timestamp are both set.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some() && self.stop.is_some()
    }

    /// Values of all labels with the given name, in insertion order.
    pub fn label_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.labels
            .iter()
            .filter(move |l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Every attachment of the case and its steps, depth first.
    pub fn attachments_mut(&mut self) -> Vec<&mut Attachment> {
        fn collect<'a>(steps: &'a mut [TestStep], out: &mut Vec<&'a mut Attachment>) {
            for step in steps {
                out.extend(step.attachments.iter_mut());
                collect(&mut step.steps, out);
            }
        }

        let mut out: Vec<&mut Attachment> = self.attachments.iter_mut().collect();
        collect(&mut self.steps, &mut out);
        out
    }
}

impl ToXml for TestCase {
    fn to_xml(&self) -> XmlNode {
        Xmlfied::new("test-case")
            .ignored("id")
            .element("name", &self.name)
            .element_if("title", self.title.as_deref())
            .element_if("description", self.description.as_deref())
            .nested_if("failure", self.failure.as_ref())
            .wrapped_many("steps", &self.steps)
            .wrapped_many("attachments", &self.attachments)
            .wrapped_many("labels", &self.labels)
            .attribute("status", self.status.unwrap_or(Status::Broken))
            .attribute("start", self.start)
            .attribute("stop", self.stop.unwrap_or(self.start))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_xml_layout() {
        let mut case = TestCase::new("test_a", 10);
        case.status = Some(Status::Failed);
        case.stop = Some(20);
        case.failure = Some(Failure::new("boom", Some("trace".to_string())));
        case.labels.push(Label::new("feature", "login"));

        let node = case.to_xml();
        let tags: Vec<&str> = node.children.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(
            tags,
            vec!["name", "failure", "attachments", "labels", "steps"]
        );
        assert_eq!(node.attribute("status"), Some("failed"));
        assert_eq!(node.attribute("start"), Some("10"));
        assert_eq!(node.attribute("stop"), Some("20"));
        assert!(node.attribute("id").is_none());

        let failure = node.child("failure").expect("failure");
        assert_eq!(
            failure.child("stack-trace").and_then(|t| t.text.as_deref()),
            Some("trace")
        );
    }

    #[test]
    fn test_step_title_mirrors_name() {
        let step = TestStep::new("load data", 1);
        let node = step.to_xml();
        assert_eq!(node.child("name").and_then(|n| n.text.as_deref()), Some("load data"));
        assert_eq!(node.child("title").and_then(|n| n.text.as_deref()), Some("load data"));
    }

    #[test]
    fn test_attachment_xml_uses_mime_type() {
        let mut attachment = Attachment::pending("log", "hello", AttachmentType::Json);
        attachment.source = AttachmentSource::File("abc-attachment.json".to_string());
        let node = attachment.to_xml();
        assert_eq!(node.attribute("source"), Some("abc-attachment.json"));
        assert_eq!(node.attribute("type"), Some("application/json"));
    }

    #[test]
    fn test_collect_nested_attachments() {
        let mut case = TestCase::new("t", 0);
        case.attachments
            .push(Attachment::pending("a", "1", AttachmentType::Text));
        let mut outer = TestStep::new("outer", 0);
        let mut inner = TestStep::new("inner", 0);
        inner
            .attachments
            .push(Attachment::pending("b", "2", AttachmentType::Text));
        outer.steps.push(inner);
        case.steps.push(outer);

        let titles: Vec<String> = case
            .attachments_mut()
            .into_iter()
            .map(|a| a.title.clone())
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(case.steps[0].depth(), 2);
    }
}
