// pdf-manuals/src/config.rs

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::catalog::EligibilityPolicy;

/// Fully resolved settings for one run. Built once by
/// [`crate::load_config::load_config`] and handed to every component.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub paths: PathsConfig,
    pub source: SourceConfig,
    pub policy: EligibilityPolicy,
    pub artifacts: ArtifactConfig,
    pub docs: DocsConfig,
    pub publish: PublishConfig,
    /// Secrets and CI context, only ever taken from the environment.
    pub secrets: Secrets,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            build_root = %self.paths.build_root.display(),
            source_dir = %self.paths.source_dir.display(),
            publish_dir = %self.paths.publish_dir.display(),
            staging_dir = %self.paths.staging_dir.display(),
            repo_url = %self.source.repo_url,
            branch = %self.publish.branch,
            deploy_key = self.secrets.deploy_key.is_some(),
            token = self.secrets.token.is_some(),
            pull_request = self.secrets.pull_request,
            "Loaded Config"
        );
        debug!(policy = ?self.policy, artifacts = ?self.artifacts, docs = ?self.docs, "Config loaded (full debug)");
    }
}

/// Resolved paths. The loader makes them absolute; the file form with
/// optional entries lives there too.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub build_root: PathBuf,
    pub source_dir: PathBuf,
    /// Working copy of the docs repository, checked out on the assets branch.
    pub publish_dir: PathBuf,
    pub staging_dir: PathBuf,
}

impl PathsConfig {
    /// Paths laid out under a single build root.
    pub fn under(build_root: impl Into<PathBuf>) -> Self {
        let build_root = build_root.into();
        PathsConfig {
            source_dir: build_root.join("source"),
            publish_dir: build_root.join("docs"),
            staging_dir: build_root.join("staging"),
            build_root,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig::under(".")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub repo_url: String,
    /// File in the checkout holding the version string, read for nightly builds.
    pub version_file: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            repo_url: "https://github.com/JuliaLang/julia.git".to_string(),
            version_file: PathBuf::from("VERSION"),
        }
    }
}

/// Where binary distributions live.
///
/// URL templates understand `{minor}` (`MAJOR.MINOR`) and `{version}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub release_url: String,
    pub checksum_url: String,
    pub nightly_url: String,
    /// Executable path inside the extracted distribution folder.
    pub executable: PathBuf,
    /// Published file name, `{version}` is substituted.
    pub pdf_name: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        ArtifactConfig {
            release_url:
                "https://julialang-s3.julialang.org/bin/linux/x64/{minor}/julia-{version}-linux-x86_64.tar.gz"
                    .to_string(),
            checksum_url: "https://julialang-s3.julialang.org/bin/checksums/julia-{version}.sha256"
                .to_string(),
            nightly_url:
                "https://julialangnightlies-s3.julialang.org/bin/linux/x64/julia-latest-linux64.tar.gz"
                    .to_string(),
            executable: PathBuf::from("bin/julia"),
            pdf_name: "julia-{version}.pdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    /// Build command argv; `{source}` and `{executable}` are substituted.
    pub command: Vec<String>,
    /// Directory, relative to the checkout, the toolchain writes PDFs into.
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub heartbeat_secs: u64,
}

impl Default for DocsConfig {
    fn default() -> Self {
        DocsConfig {
            command: vec![
                "make".into(),
                "-C".into(),
                "{source}/doc".into(),
                "pdf".into(),
                "texplatform=docker".into(),
                "JULIA_EXECUTABLE={executable}".into(),
            ],
            output_dir: PathBuf::from("doc/_build/pdf/en"),
            output_prefix: "TheJuliaLanguage".to_string(),
            heartbeat_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub remote: String,
    pub branch: String,
    pub commit_message: String,
    pub author_name: String,
    pub author_email: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            remote: "origin".to_string(),
            branch: "assets".to_string(),
            commit_message: "PDF versions of the manual.".to_string(),
            author_name: "pdf-manuals".to_string(),
            author_email: "pdf-manuals@users.noreply.github.com".to_string(),
        }
    }
}

/// Values that never come from the config file.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Base64-encoded private SSH key with push access to the docs repository.
    pub deploy_key: Option<String>,
    pub token: Option<String>,
    /// Set when the run was triggered by a pull request.
    pub pull_request: bool,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("deploy_key", &self.deploy_key.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("pull_request", &self.pull_request)
            .finish()
    }
}
