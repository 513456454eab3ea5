//! # contract: seams between the pipeline and the outside world
//!
//! Every external effect the workflows depend on goes through one of the traits
//! defined here:
//!
//! - [`CommandRunner`]: runs an external process (git, the documentation build).
//! - [`ArtifactFetcher`]: downloads, verifies and extracts binary distributions.
//! - [`DocBuilder`]: drives the external documentation toolchain.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`, so tests inject `MockCommandRunner`,
//!   `MockArtifactFetcher` and `MockDocBuilder` instead of touching the network
//!   or spawning processes.
//! - Mocks are exported behind the default `test-export-mocks` feature so
//!   integration tests under `tests/` can use them too.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::Result;
use crate::version::ReleaseVersion;

/// A single external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, inherited from the parent when `None`.
    pub cwd: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Stream stdout/stderr to the parent instead of capturing them.
    pub inherit_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            inherit_output: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }

    /// Human-readable command line, used in logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a successful process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            status: 0,
        }
    }
}

/// Runs external processes.
///
/// A non-zero exit status is reported as [`crate::error::PdfError::Process`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// A nightly distribution after download and extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightlyArtifact {
    pub executable: PathBuf,
    /// Source commit the nightly was built from, taken from the archive layout.
    pub commit: String,
}

/// Downloads binary distributions for a version, verifies and extracts them.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch a tagged release and return the path of the contained executable.
    async fn fetch_release(&self, version: &ReleaseVersion) -> Result<PathBuf>;

    /// Fetch the rolling nightly build.
    async fn fetch_nightly(&self) -> Result<NightlyArtifact>;
}

/// Drives the external documentation toolchain.
///
/// On success the PDF has been written somewhere under `source`; locating it is
/// up to the caller.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocBuilder: Send + Sync {
    async fn build(&self, source: &Path, executable: &Path) -> Result<()>;
}
