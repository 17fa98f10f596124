// Cross-platform file utilities

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Extension of event and envelope streams.
pub const JSONL_EXTENSION: &str = "jsonl";

/// File utilities for cross-platform operations
pub struct FileUtils;

impl FileUtils {
    /// Collect all .jsonl files from a file or directory, sorted by path.
    /// An explicitly named file is taken whatever its extension.
    pub fn collect_jsonl_files(path: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();

        if path.is_file() {
            files.push(path.to_path_buf());
        } else if path.is_dir() {
            // Use walkdir for cross-platform traversal
            let walker = walkdir::WalkDir::new(path).into_iter().filter_entry(|e| {
                // Always include the root directory itself, even if it starts with '.'
                if e.depth() == 0 {
                    return true;
                }
                !e.file_name().to_string_lossy().starts_with('.')
            });

            for entry in walker.flatten() {
                if entry.file_type().is_file() && Self::is_jsonl_file(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        }

        files.sort();
        files
    }

    /// Check if file has .jsonl extension
    pub fn is_jsonl_file(path: &Path) -> bool {
        path.extension().is_some_and(|e| e == JSONL_EXTENSION)
    }

    /// Open a file for buffered line reading
    pub fn open_reader(path: &Path) -> Result<BufReader<File>> {
        let file =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        Ok(BufReader::new(file))
    }

    /// Create (or truncate) a file for buffered writing, creating parent
    /// directories as needed
    pub fn create_writer(path: &Path) -> Result<BufWriter<File>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        Ok(BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_jsonl_files_single() {
        let file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
        let path = file.path();

        let files = FileUtils::collect_jsonl_files(path);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0], path);
    }

    #[test]
    fn test_collect_jsonl_files_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("gw1");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("gw0.jsonl"), "").unwrap();
        std::fs::write(nested.join("cases.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join(".cache").join("old.jsonl"), "").unwrap();

        let files = FileUtils::collect_jsonl_files(dir.path());
        assert_eq!(
            files,
            vec![dir.path().join("gw0.jsonl"), nested.join("cases.jsonl")]
        );
    }

    #[test]
    fn test_create_writer_makes_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.jsonl");
        drop(FileUtils::create_writer(&path).unwrap());
        assert!(path.exists());
    }
}
