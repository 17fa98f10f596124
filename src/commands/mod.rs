// Commands module - handles CLI command execution

use anyhow::Result;

use crate::cli::SummaryFormat;
use crate::report::SessionSummary;

pub mod merge;
pub mod replay;

pub use merge::handle_merge;
pub use replay::handle_replay;

/// Handle shell completion
pub fn handle_completion(shell_type: &str) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{Shell, generate};

    let shell = match shell_type.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "elvish" => Shell::Elvish,
        "powershell" => Shell::PowerShell,
        _ => {
            anyhow::bail!(
                "Unsupported shell: {}. Supported: bash, zsh, fish, elvish, powershell",
                shell_type
            );
        }
    };

    let mut cmd = crate::cli::Cli::command();
    let name = cmd.get_name().to_string();
    let mut stdout = std::io::stdout();

    generate(shell, &mut cmd, name, &mut stdout);

    Ok(())
}

/// Render a session summary for the terminal
pub fn render_summary(summary: &SessionSummary, format: SummaryFormat) -> Result<String> {
    match format {
        SummaryFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
        SummaryFormat::Text => {
            let mut out = format!(
                "Wrote {} suites, {} cases, {} attachments",
                summary.suites.len(),
                summary.cases,
                summary.attachments
            );
            if let Some(environment) = &summary.environment {
                out.push_str(&format!("\nEnvironment: {}", environment.display()));
            }
            for failure in &summary.failures {
                out.push_str(&format!("\nFailed: {}", failure));
            }
            Ok(out)
        }
    }
}
