//! Documentation build: source checkout, the external build command with a
//! liveness heartbeat, and locating the PDF it produced.

use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::DocsConfig;
use crate::contract::{CommandRunner, CommandSpec, DocBuilder};
use crate::error::{PdfError, Result};

/// Await `operation` while a separate task logs a line every `every`.
///
/// The heartbeat only exists so CI logs keep moving during long builds; it
/// stops as soon as `operation` completes. Returns the operation's output and
/// the number of heartbeats emitted.
pub async fn with_heartbeat<F, T>(label: &str, every: Duration, operation: F) -> (T, u64)
where
    F: Future<Output = T>,
{
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let label = label.to_string();

    let heartbeat = tokio::spawn(async move {
        let started = Instant::now();
        // interval() panics on a zero period
        let mut ticker = interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        let mut beats = 0u64;
        loop {
            tokio::select! {
                _ = &mut done_rx => break,
                _ = ticker.tick() => {
                    beats += 1;
                    info!(
                        task = %label,
                        elapsed_secs = started.elapsed().as_secs(),
                        "Still running"
                    );
                }
            }
        }
        beats
    });

    let output = operation.await;
    let _ = done_tx.send(());
    let beats = heartbeat_count(heartbeat.await);
    (output, beats)
}

fn heartbeat_count(joined: std::result::Result<u64, JoinError>) -> u64 {
    match joined {
        Ok(beats) => beats,
        Err(e) => {
            warn!(error = %e, "Heartbeat task did not finish cleanly");
            0
        }
    }
}

/// Runs the configured documentation build command.
pub struct CommandDocBuilder {
    runner: Arc<dyn CommandRunner>,
    config: DocsConfig,
}

impl CommandDocBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>, config: DocsConfig) -> Self {
        Self { runner, config }
    }

    /// Expand the argv template for a checkout and executable.
    ///
    /// The command runs in the caller's working directory, so the substituted
    /// paths resolve the same way for the child as they do here.
    pub fn command_for(&self, source: &Path, executable: &Path) -> Result<CommandSpec> {
        let source = source.display().to_string();
        let executable = executable.display().to_string();
        let mut argv = self.config.command.iter().map(|arg| {
            arg.replace("{source}", &source)
                .replace("{executable}", &executable)
        });
        let program = argv
            .next()
            .ok_or_else(|| PdfError::config("docs.command is empty"))?;
        Ok(CommandSpec::new(program).args(argv).inherit_output())
    }
}

#[async_trait]
impl DocBuilder for CommandDocBuilder {
    async fn build(&self, source: &Path, executable: &Path) -> Result<()> {
        let spec = self.command_for(source, executable)?;
        info!(
            command = %spec.display(),
            source = %source.display(),
            executable = %executable.display(),
            "Starting documentation build"
        );

        let every = Duration::from_secs(self.config.heartbeat_secs);
        let (result, beats) = with_heartbeat("pdf build", every, self.runner.run(&spec)).await;

        match result {
            Ok(_) => {
                info!(source = %source.display(), heartbeats = beats, "Documentation build finished");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, source = %source.display(), "Documentation build failed");
                Err(PdfError::build(e.to_string()))
            }
        }
    }
}

/// Find the PDF the toolchain wrote into `output_dir`.
///
/// Matches files named `<prefix>*.pdf`; when several match the
/// lexicographically first one wins so the choice is stable.
pub fn find_output_pdf(output_dir: &Path, prefix: &str) -> Result<PathBuf> {
    let entries = std::fs::read_dir(output_dir).map_err(|e| {
        PdfError::build(format!(
            "cannot read build output directory {}: {e}",
            output_dir.display()
        ))
    })?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with(prefix) && name.ends_with(".pdf"))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();

    matches.into_iter().next().ok_or_else(|| {
        PdfError::build(format!(
            "no {prefix}*.pdf found in {}",
            output_dir.display()
        ))
    })
}

/// The source repository checkout the docs are built from.
pub struct SourceCheckout {
    runner: Arc<dyn CommandRunner>,
    repo_url: String,
    dir: PathBuf,
}

impl SourceCheckout {
    pub fn new(runner: Arc<dyn CommandRunner>, repo_url: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            runner,
            repo_url: repo_url.into(),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bring the checkout to `reference` (a tag or commit), cloning on first use.
    pub async fn prepare(&self, reference: &str) -> Result<()> {
        if self.dir.join(".git").exists() {
            info!(path = %self.dir.display(), "Updating existing source checkout");
            self.git(["fetch", "--tags", "--force", "origin"]).await?;
        } else {
            info!(repo_url = %self.repo_url, path = %self.dir.display(), "Cloning source repository");
            let spec = CommandSpec::new("git")
                .arg("clone")
                .arg(&self.repo_url)
                .arg(self.dir.display().to_string());
            self.runner.run(&spec).await?;
        }

        self.git(["checkout", "--force", reference]).await?;
        self.git(["clean", "-fdx"]).await?;
        info!(reference = %reference, path = %self.dir.display(), "Checked out source reference");
        Ok(())
    }

    /// Read the version string recorded in the checkout, e.g. `1.12.0-DEV`.
    pub fn read_version(&self, version_file: &Path) -> Result<String> {
        let path = self.dir.join(version_file);
        let raw = std::fs::read_to_string(&path)?;
        let version = raw.trim();
        if version.is_empty() {
            return Err(PdfError::build(format!("{} is empty", path.display())));
        }
        Ok(version.to_string())
    }

    async fn git<const N: usize>(&self, args: [&str; N]) -> Result<()> {
        let spec = CommandSpec::new("git")
            .arg("-C")
            .arg(self.dir.display().to_string())
            .args(args);
        self.runner.run(&spec).await?;
        Ok(())
    }
}
