// Report writer - owns the output directory and everything written into it

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{
    AttachmentPayload, AttachmentSource, AttachmentType, Environment, TestCase, TestSuite,
};
use crate::xml::{ToXml, render_document};

/// File name of the session environment document.
pub const ENVIRONMENT_FILE: &str = "environment.xml";

/// Writes suite documents, the environment document and attachment files.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    /// Claims `output_dir` for this session: creates it if missing and
    /// removes files left there by earlier runs. Only the coordinating
    /// process may call this, once, before anything is written.
    pub fn create(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let writer = Self::open(output_dir)?;
        let removed = writer.clean()?;
        if removed > 0 {
            info!(
                "Removed {} stale report files from {}",
                removed,
                writer.output_dir.display()
            );
        }
        Ok(writer)
    }

    /// Uses `output_dir` as is, creating it if missing.
    pub fn open(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!(
                "Failed to create report directory: {}",
                output_dir.display()
            )
        })?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn clean(&self) -> Result<usize> {
        let mut removed = 0;
        let entries = walkdir::WalkDir::new(&self.output_dir)
            .min_depth(1)
            .max_depth(1);
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to list report directory: {}", self.output_dir.display())
            })?;
            if entry.file_type().is_file() {
                fs::remove_file(entry.path()).with_context(|| {
                    format!("Failed to remove stale report file: {}", entry.path().display())
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn unique_name(suffix: &str) -> String {
        format!("{}-{}", Uuid::new_v4(), suffix)
    }

    /// Writes raw attachment contents and returns the new file's name.
    pub fn write_attachment(
        &self,
        payload: &AttachmentPayload,
        kind: AttachmentType,
    ) -> Result<String> {
        let file_name = Self::unique_name(&format!("attachment.{}", kind.extension()));
        let path = self.output_dir.join(&file_name);
        fs::write(&path, payload.as_bytes())
            .with_context(|| format!("Failed to write attachment: {}", path.display()))?;
        debug!("Wrote attachment {} ({} bytes)", file_name, payload.len());
        Ok(file_name)
    }

    /// Writes every in-memory attachment of `case` and its steps to disk,
    /// leaving only file references behind. Returns how many were written.
    pub fn persist_attachments(&self, case: &mut TestCase) -> Result<usize> {
        let mut written = 0;
        for attachment in case.attachments_mut() {
            if let AttachmentSource::Pending(payload) = &attachment.source {
                let file_name = self.write_attachment(payload, attachment.kind)?;
                // drops the payload
                attachment.source = AttachmentSource::File(file_name);
                written += 1;
            }
        }
        Ok(written)
    }

    /// Serializes one suite into its own uniquely named document.
    pub fn write_suite(&self, suite: &TestSuite) -> Result<PathBuf> {
        let xml = render_document(&suite.to_xml())
            .with_context(|| format!("Failed to render suite '{}'", suite.name))?;
        let path = self.output_dir.join(Self::unique_name("testsuite.xml"));
        fs::write(&path, xml)
            .with_context(|| format!("Failed to write suite report: {}", path.display()))?;
        debug!("Wrote suite '{}' to {}", suite.name, path.display());
        Ok(path)
    }

    /// Writes `environment.xml`, unless the environment is empty.
    pub fn write_environment(&self, environment: &Environment) -> Result<Option<PathBuf>> {
        if environment.is_empty() {
            return Ok(None);
        }
        let xml = render_document(&environment.to_xml())
            .context("Failed to render environment parameters")?;
        let path = self.output_dir.join(ENVIRONMENT_FILE);
        fs::write(&path, xml)
            .with_context(|| format!("Failed to write environment: {}", path.display()))?;
        Ok(Some(path))
    }
}
