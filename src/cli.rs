use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use crate::build::CommandDocBuilder;
use crate::command::SystemCommandRunner;
use crate::contract::CommandRunner;
use crate::fetch::HttpFetcher;
use crate::load_config::load_config;
use crate::workflow::Workflow;

/// CLI for pdf-manuals: build versioned PDF manuals and publish them.
#[derive(Parser)]
#[clap(
    name = "pdf-manuals",
    version,
    about = "Build PDF manuals for every release and the nightly snapshot, and publish them to an assets branch"
)]
pub struct Cli {
    /// Workflow keywords: releases, nightly, commit. Other words are
    /// ignored. When several keywords are given only the first of
    /// releases, nightly, commit (in that order) runs.
    #[clap(required = true)]
    pub words: Vec<String>,

    /// Path to an optional YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Mode {
    /// Build every eligible release that is not yet published
    Releases,
    /// Build the nightly snapshot
    Nightly,
    /// Publish staged PDFs to the assets branch
    Commit,
}

impl Cli {
    /// The mode that runs, by precedence releases > nightly > commit.
    pub fn selected_mode(&self) -> Option<Mode> {
        self.words
            .iter()
            .filter_map(|word| Mode::from_str(word, true).ok())
            .min()
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let Some(mode) = cli.selected_mode() else {
        anyhow::bail!(
            "no mode keyword in {:?}, expected one of releases, nightly, commit",
            cli.words
        );
    };
    let config = load_config(cli.config.as_deref())?;
    tracing::info!(mode = ?mode, "Selected mode");

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
    let fetcher = HttpFetcher::new(config.artifacts.clone(), config.paths.build_root.clone())?;
    let builder = CommandDocBuilder::new(runner.clone(), config.docs.clone());
    let workflow = Workflow::new(config, runner, fetcher, builder);

    match mode {
        Mode::Releases => {
            let report = workflow.build_all_releases().await?;
            tracing::info!(built = ?report.built, skipped = ?report.skipped, "Releases complete");
        }
        Mode::Nightly => {
            let version = workflow.build_nightly().await?;
            tracing::info!(version = %version, "Nightly complete");
        }
        Mode::Commit => {
            let outcome = workflow.commit().await?;
            tracing::info!(outcome = ?outcome, "Commit complete");
        }
    }
    Ok(())
}
