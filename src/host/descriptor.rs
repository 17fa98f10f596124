// Test descriptors as handed over by the host runtime

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Label, Severity, label_names};
use crate::state::ModuleInfo;

/// The host's identifier of a test item, e.g. `tests/test_x.py::TestA::test_b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One level of the ancestry below the module: a class, a group, the
/// test function itself. Labels declared on a level apply to every test
/// beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.labels.extend(labels);
        self
    }
}

/// Everything the listener reads about a test when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub id: TestId,
    pub module: ModuleInfo,
    /// Labels declared on the module itself.
    #[serde(default)]
    pub module_labels: Vec<Label>,
    /// Ancestry below the module, outermost first; the last entry is the
    /// test itself.
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TestDescriptor {
    pub fn new(id: impl Into<String>, module: ModuleInfo) -> Self {
        Self {
            id: TestId::new(id),
            module,
            module_labels: Vec::new(),
            scopes: Vec::new(),
            description: None,
        }
    }

    pub fn with_module_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.module_labels.extend(labels);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Dotted path of the scopes below the module; falls back to the id.
    pub fn case_name(&self) -> String {
        if self.scopes.is_empty() {
            return self.id.to_string();
        }
        self.scopes
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Labels visible on the test: module labels first, then every scope
    /// from the outermost in. Exactly one severity label survives, the
    /// innermost declared one or `normal`.
    pub fn resolved_labels(&self) -> Vec<Label> {
        let mut labels = Vec::new();
        let mut severity = None;

        let declared = self
            .module_labels
            .iter()
            .chain(self.scopes.iter().flat_map(|s| s.labels.iter()));
        for label in declared {
            if label.name == label_names::SEVERITY {
                severity = Some(label.value.clone());
            } else {
                labels.push(label.clone());
            }
        }

        labels.push(Label::new(
            label_names::SEVERITY,
            severity.unwrap_or_else(|| Severity::default().to_string()),
        ));
        labels
    }
}
