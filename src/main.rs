mod backend;
mod columnar;
mod config;
mod dataset;
mod group;
mod profile;
mod report;
mod stats;
mod summary;
mod table;

use crate::backend::{BackendKind, backends};
use crate::config::Config;
use crate::report::Report;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{
    io::{BufWriter, Write},
    path::PathBuf,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// CSV file to analyze (overrides the config file).
    #[arg(long)]
    input: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendKind::All)]
    backend: BackendKind,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mut cfg = match &args.config {
        Some(file) => Config::from_file(file).context("failed to construct cfg")?,
        None => Config::default(),
    };
    if let Some(input) = args.input {
        cfg.input = input;
    }
    log::info!("{cfg:#?}");

    let mut analyses = Vec::new();
    for backend in backends(args.backend) {
        log::info!("running {} backend", backend.name());
        let analysis = backend
            .analyze(&cfg)
            .with_context(|| format!("failed to run {} backend", backend.name()))?;
        log::info!(
            "{} backend finished in {:.3} s",
            analysis.backend,
            analysis.elapsed_secs
        );
        analyses.push(analysis);
    }

    let report = Report::new(analyses, &cfg);

    let stdout = std::io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    match args.format {
        Format::Text => report.write_text(&mut writer, &cfg)?,
        Format::Json => report.write_json(&mut writer)?,
    }
    writer.flush().context("failed to flush writer stream")?;

    Ok(())
}
