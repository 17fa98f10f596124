// Merge command - aggregates worker envelope files into one report

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::MergeArgs;
use crate::config::Config;
use crate::report::{ReportWriter, Reporter, SessionSummary};
use crate::state::{Aggregator, CollectionFailures, WireRecord, read_records};
use crate::utils::FileUtils;

/// Handle the merge command
pub fn handle_merge(args: &MergeArgs, config: &Config) -> Result<SessionSummary> {
    let files: Vec<_> = args
        .paths
        .iter()
        .flat_map(|path| FileUtils::collect_jsonl_files(path))
        .collect();
    if files.is_empty() {
        anyhow::bail!("No envelope files found in the given paths");
    }

    let mut aggregator = Aggregator::new();
    let mut collection = CollectionFailures::new();
    for file in &files {
        let reader = FileUtils::open_reader(file)?;
        let records = read_records(reader)
            .with_context(|| format!("Failed to read envelopes from {}", file.display()))?;
        debug!("Read {} records from {}", records.len(), file.display());
        for record in records {
            match record {
                WireRecord::CollectionFailed(fail) => collection.push(fail),
                other => aggregator.record_wire(other),
            }
        }
    }

    // envelopes are fully read before the directory is cleaned, so they
    // may live inside it
    let dir = config.results_dir(args.alluredir.as_deref());
    let writer = if config.report.clean && !args.no_clean {
        ReportWriter::create(&dir)?
    } else {
        ReportWriter::open(&dir)?
    };

    info!(
        "Merged {} cases in {} suites and {} collection failures from {} files",
        aggregator.case_count(),
        aggregator.suite_count(),
        collection.len(),
        files.len()
    );
    let mut summary = collection.on_session_end(&writer);
    summary.merge(aggregator.finish_session(&writer));
    Ok(summary)
}
