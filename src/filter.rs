// Label-based test selection

use crate::model::{Label, Severity, label_names};

/// Selects tests by severity and by feature / story labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    severities: Vec<Severity>,
    selected: Vec<Label>,
}

impl LabelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities.extend(severities);
        self
    }

    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.selected.extend(
            features
                .into_iter()
                .map(|f| Label::new(label_names::FEATURE, f)),
        );
        self
    }

    pub fn with_stories<S: Into<String>>(mut self, stories: impl IntoIterator<Item = S>) -> Self {
        self.selected
            .extend(stories.into_iter().map(|s| Label::new(label_names::STORY, s)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.severities.is_empty() && self.selected.is_empty()
    }

    /// Reason to skip a test carrying `labels`, or `None` if it is selected.
    pub fn check(&self, labels: &[Label]) -> Option<String> {
        if !self.severities.is_empty() {
            let severity = labels
                .iter()
                .rev()
                .find(|l| l.name == label_names::SEVERITY)
                .map(|l| l.value.clone())
                .unwrap_or_else(|| Severity::default().to_string());
            if !self.severities.iter().any(|s| s.as_str() == severity) {
                return Some(format!("Not running test of severity {}.", severity));
            }
        }

        if !self.selected.is_empty() && !labels.iter().any(|l| self.selected.contains(l)) {
            let selected: Vec<String> = self.selected.iter().map(Label::to_string).collect();
            return Some(format!(
                "Not suitable with selected labels: {}.",
                selected.join(", ")
            ));
        }

        None
    }
}

/// Splits a comma-separated command line list, dropping empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
