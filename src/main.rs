// Main entry point for allure-adaptor

use anyhow::Result;
use clap::Parser;
use tracing::info;

use allure_adaptor::cli::{Cli, Commands};
use allure_adaptor::commands::{handle_completion, handle_merge, handle_replay, render_summary};
use allure_adaptor::config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        "allure_adaptor=debug"
    } else {
        "allure_adaptor=warn"
    };

    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .event_format(allure_adaptor::logging::CustomFormatter)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    if cli.verbose {
        info!("Starting allure-adaptor v{}", env!("CARGO_PKG_VERSION"));
    }

    // Load configuration from file (if exists)
    let loaded = config::Config::load();

    // Handle config flag
    if cli.config {
        print_config(loaded.as_ref());
        return Ok(());
    }

    // Handle init_config flag
    if let Some(config_file) = cli.init_config {
        let config = config::Config::default();
        let toml_content = config.to_toml();
        std::fs::write(&config_file, toml_content)?;
        println!("Configuration file created: {}", config_file.display());
        println!("\nYou can now edit the file to customize your settings.");
        return Ok(());
    }

    // Handle completion flag
    if let Some(shell_type) = cli.completion {
        handle_completion(&shell_type)?;
        return Ok(());
    }

    let config = loaded.unwrap_or_default();
    let (summary, format) = match &cli.command {
        Some(Commands::Replay(args)) => (handle_replay(args, &config)?, args.format),
        Some(Commands::Merge(args)) => (handle_merge(args, &config)?, args.format),
        None => {
            println!("No command given. Use 'allure-adaptor --help' for usage.");
            return Ok(());
        }
    };

    println!("{}", render_summary(&summary, format)?);
    if !summary.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_config(loaded: Option<&config::Config>) {
    println!("Current configuration:");
    match loaded {
        Some(cfg) => {
            println!("\n  Configuration file loaded:");
            println!("    Report dir: {}", cfg.report.dir);
            println!("    Clean on start: {}", cfg.report.clean);
            println!("    Double report: {}", cfg.report.double_report);
            println!("    Framework label: {}", cfg.labels.framework);
            println!("    Language label: {}", cfg.labels.language);
            println!("    Thread label: {}", cfg.labels.thread);
            if !cfg.filter.severities.is_empty() {
                let severities: Vec<&str> =
                    cfg.filter.severities.iter().map(|s| s.as_str()).collect();
                println!("    Severities: {}", severities.join(", "));
            }
            if !cfg.filter.features.is_empty() {
                println!("    Features: {}", cfg.filter.features.join(", "));
            }
            if !cfg.filter.stories.is_empty() {
                println!("    Stories: {}", cfg.filter.stories.join(", "));
            }
        }
        None => {
            println!("\n  No configuration file loaded");
            println!("  Create one with: allure-adaptor --init-config .allurerc.toml");
        }
    }

    println!("\n  Environment variables:");
    match std::env::var(config::ENV_ALLURE_RESULTS_DIR) {
        Ok(dir) => println!("    {}: {}", config::ENV_ALLURE_RESULTS_DIR, dir),
        Err(_) => println!(
            "    {}: not set (default: {})",
            config::ENV_ALLURE_RESULTS_DIR,
            config::default_dir()
        ),
    }

    println!("\nConfiguration precedence:");
    println!("  1. Command-line arguments (highest)");
    println!("  2. Environment variables");
    println!("  3. Configuration file");
    println!("  4. Built-in defaults (lowest)");
}
