// Constants shared with the report schema

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace of suite and environment documents.
pub const ALLURE_NAMESPACE: &str = "urn:model.allure.qatools.yandex.ru";

/// Terminal status of a case or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Broken,
    Canceled,
    Pending,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Broken => "broken",
            Status::Canceled => "canceled",
            Status::Pending => "pending",
        }
    }

    /// Failed and broken cases carry the full error as their failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed | Status::Broken)
    }

    /// Canceled and pending cases carry the skip reason as their failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, Status::Canceled | Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity levels understood by the report renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Blocker,
    Critical,
    #[default]
    Normal,
    Minor,
    Trivial,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Blocker,
        Severity::Critical,
        Severity::Normal,
        Severity::Minor,
        Severity::Trivial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Blocker => "blocker",
            Severity::Critical => "critical",
            Severity::Normal => "normal",
            Severity::Minor => "minor",
            Severity::Trivial => "trivial",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s.trim())
            .ok_or_else(|| {
                let allowed: Vec<&str> = Severity::ALL.iter().map(Severity::as_str).collect();
                format!(
                    "Illegal severity value [{}], only values from [{}] are allowed.",
                    s,
                    allowed.join(", ")
                )
            })
    }
}

/// Kind of an attachment, fixing its file extension and MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    #[default]
    Text,
    Html,
    Xml,
    Png,
    Jpg,
    Json,
    Other,
}

impl AttachmentType {
    pub fn extension(&self) -> &'static str {
        match self {
            AttachmentType::Text => "txt",
            AttachmentType::Html => "html",
            AttachmentType::Xml => "xml",
            AttachmentType::Png => "png",
            AttachmentType::Jpg => "jpg",
            AttachmentType::Json => "json",
            AttachmentType::Other => "other",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AttachmentType::Text => "text/plain",
            AttachmentType::Html => "application/html",
            AttachmentType::Xml => "application/xml",
            AttachmentType::Png => "image/png",
            AttachmentType::Jpg => "image/jpg",
            AttachmentType::Json => "application/json",
            AttachmentType::Other => "other",
        }
    }
}

/// Well-known label names.
pub mod label_names {
    pub const FEATURE: &str = "feature";
    pub const STORY: &str = "story";
    pub const SEVERITY: &str = "severity";
    pub const ISSUE: &str = "issue";
    pub const TESTCASE: &str = "testId";
    pub const THREAD: &str = "thread";
    pub const FRAMEWORK: &str = "framework";
    pub const LANGUAGE: &str = "language";
}
