// Configuration file handling

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::filter::LabelFilter;
use crate::model::Severity;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub labels: LabelsConfig,

    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output directory for report documents and attachments
    #[serde(default = "default_dir")]
    pub dir: String,

    /// Remove files left in the output directory by an earlier run
    #[serde(default = "default_clean")]
    pub clean: bool,

    /// Send failed cases right after the call phase as well as at teardown
    #[serde(default)]
    pub double_report: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            clean: default_clean(),
            double_report: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsConfig {
    #[serde(default = "default_framework")]
    pub framework: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Add a label naming the worker thread a case ran on
    #[serde(default = "default_thread")]
    pub thread: bool,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            framework: default_framework(),
            language: default_language(),
            thread: default_thread(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FilterConfig {
    #[serde(default)]
    pub severities: Vec<Severity>,

    #[serde(default)]
    pub features: Vec<String>,

    #[serde(default)]
    pub stories: Vec<String>,
}

impl FilterConfig {
    pub fn to_filter(&self) -> LabelFilter {
        LabelFilter::new()
            .with_severities(self.severities.iter().copied())
            .with_features(self.features.iter().cloned())
            .with_stories(self.stories.iter().cloned())
    }
}

// Default values
pub const ENV_ALLURE_RESULTS_DIR: &str = "ALLURE_RESULTS_DIR";

pub fn default_dir() -> String {
    String::from("allure-results")
}

fn default_clean() -> bool {
    true
}

pub fn default_framework() -> String {
    String::from("rust")
}

pub fn default_language() -> String {
    String::from("rust")
}

fn default_thread() -> bool {
    true
}

impl Config {
    /// Load configuration from default locations
    pub fn load() -> Option<Self> {
        // Check locations in order:
        // 1. .allurerc (current directory)
        // 2. ~/.allurerc (home directory)
        // 3. .allurerc.toml (current directory)
        // 4. ~/.allurerc.toml (home directory)

        let cwd = std::env::current_dir().ok();
        let home = dirs::home_dir();
        Self::search_paths(cwd.as_deref(), home.as_deref())
            .iter()
            .find(|path| path.exists())
            .and_then(|path| Self::load_from_file(path))
    }

    /// Candidate config files in lookup order. A missing directory only
    /// drops its own candidates.
    pub fn search_paths(cwd: Option<&Path>, home: Option<&Path>) -> Vec<PathBuf> {
        [".allurerc", ".allurerc.toml"]
            .iter()
            .flat_map(|name| [cwd, home].into_iter().flatten().map(move |dir| dir.join(name)))
            .collect()
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        let config = Self::parse(&content);
        if config.is_none() {
            warn!("Ignoring unreadable config file {}", path.display());
        }
        config
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Option<Self> {
        toml::from_str(content).ok()
    }

    /// Generate default configuration as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|_| String::new())
    }

    /// Output directory: command line first, then `ALLURE_RESULTS_DIR`,
    /// then the config file.
    pub fn results_dir(&self, cli: Option<&Path>) -> PathBuf {
        if let Some(dir) = cli {
            return dir.to_path_buf();
        }
        match std::env::var(ENV_ALLURE_RESULTS_DIR) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(&self.report.dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[report]
dir = "out/allure"
clean = false
double_report = true

[labels]
framework = "nextest"
thread = false

[filter]
severities = ["critical", "blocker"]
features = ["checkout"]
"#;

        let config = Config::parse(toml).expect("Failed to parse config");
        assert_eq!(config.report.dir, "out/allure");
        assert!(!config.report.clean);
        assert!(config.report.double_report);
        assert_eq!(config.labels.framework, "nextest");
        assert_eq!(config.labels.language, "rust");
        assert!(!config.labels.thread);
        assert_eq!(
            config.filter.severities,
            vec![Severity::Critical, Severity::Blocker]
        );
        assert_eq!(config.filter.features, vec!["checkout".to_string()]);
        assert!(config.filter.stories.is_empty());
    }

    #[test]
    fn test_unknown_severity_is_rejected() {
        assert!(Config::parse("[filter]\nseverities = [\"urgent\"]\n").is_none());
    }

    #[test]
    fn test_search_paths_without_home() {
        let cwd = Path::new("/work");
        assert_eq!(
            Config::search_paths(Some(cwd), None),
            vec![cwd.join(".allurerc"), cwd.join(".allurerc.toml")]
        );
    }

    #[test]
    fn test_search_paths_order() {
        let (cwd, home) = (Path::new("/work"), Path::new("/home/u"));
        assert_eq!(
            Config::search_paths(Some(cwd), Some(home)),
            vec![
                cwd.join(".allurerc"),
                home.join(".allurerc"),
                cwd.join(".allurerc.toml"),
                home.join(".allurerc.toml"),
            ]
        );
    }

    #[test]
    fn test_cli_dir_wins() {
        let config = Config::default();
        assert_eq!(
            config.results_dir(Some(Path::new("explicit"))),
            PathBuf::from("explicit")
        );
    }
}
