mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{formatters, Cli};
use colored::Colorize;
use dre::config::Config;
use dre::pipeline::DreGenerator;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n{} {:?}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let (Some(start), Some(end)) = (&cli.start, &cli.end) {
        config.period.auto_detect = false;
        config.period.start = start.clone();
        config.period.end = end.clone();
    }
    if let Some(rate) = cli.tax_rate {
        config.tax_rate = rate;
    }
    config.validate()?;

    let output = cli.output_path();
    info!("Building DRE from {:?} into {:?}", cli.file, output);

    let summary = DreGenerator::new(config).run(&cli.file, &output)?;

    if cli.json {
        println!("{}", formatters::format_summary_json(&summary));
    } else {
        print!("{}", formatters::format_summary(&summary));
    }

    if !cli.no_open {
        match open::that(&output) {
            Ok(()) => info!("Opened {:?}", output),
            Err(e) => warn!("Could not open {}: {}", output.display(), e),
        }
    }

    if !cli.json {
        print!("{}", formatters::format_invalid_dates(&summary.invalid_dates));
    }

    Ok(())
}
