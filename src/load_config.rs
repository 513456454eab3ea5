/// `load_config` module: turns an optional YAML file plus the process environment
/// into the single [`Config`] every component is constructed from.
///
/// # Responsibilities
/// - Parse the (optional) YAML file; every section has defaults so an empty or
///   missing file is valid
/// - Apply environment overrides for paths; the environment always wins
/// - Inject secrets and CI context (deploy key, token, pull-request marker) from
///   the environment only
/// - Reject configurations that cannot work before any download starts
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::catalog::EligibilityPolicy;
use crate::config::{
    ArtifactConfig, Config, DocsConfig, PathsConfig, PublishConfig, Secrets, SourceConfig,
};

pub const ENV_BUILD_ROOT: &str = "BUILDROOT";
pub const ENV_SOURCE_DIR: &str = "SOURCE_DIR";
pub const ENV_PUBLISH_DIR: &str = "PUBLISH_DIR";
pub const ENV_STAGING_DIR: &str = "STAGING_DIR";
pub const ENV_DEPLOY_KEY: &str = "DEPLOY_KEY";
pub const ENV_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_EVENT_NAME: &str = "GITHUB_EVENT_NAME";
pub const ENV_PULL_REQUEST: &str = "PULL_REQUEST";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    paths: RawPaths,
    source: SourceConfig,
    policy: EligibilityPolicy,
    artifacts: ArtifactConfig,
    docs: DocsConfig,
    publish: PublishConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPaths {
    build_root: Option<PathBuf>,
    source_dir: Option<PathBuf>,
    publish_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
}

/// Load configuration from `path` (if given) and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`], with the environment supplied by the caller.
pub fn load_config_with_env<E>(path: Option<&Path>, env: E) -> Result<Config>
where
    E: Fn(&str) -> Option<String>,
{
    let raw = match path {
        Some(path) => read_raw(path)?,
        None => {
            info!("No config file given, using built-in defaults");
            RawConfig::default()
        }
    };

    // Empty variables are how CI spells "unset" for missing secrets.
    let env_var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    // Paths are made absolute once here; they are handed to child processes
    // that may run in other directories.
    let build_root = absolute(
        env_var(ENV_BUILD_ROOT)
            .map(PathBuf::from)
            .or(raw.paths.build_root)
            .unwrap_or_else(|| PathBuf::from(".")),
    )?;
    let defaults = PathsConfig::under(&build_root);
    let paths = PathsConfig {
        source_dir: absolute(
            env_var(ENV_SOURCE_DIR)
                .map(PathBuf::from)
                .or(raw.paths.source_dir)
                .unwrap_or(defaults.source_dir),
        )?,
        publish_dir: absolute(
            env_var(ENV_PUBLISH_DIR)
                .map(PathBuf::from)
                .or(raw.paths.publish_dir)
                .unwrap_or(defaults.publish_dir),
        )?,
        staging_dir: absolute(
            env_var(ENV_STAGING_DIR)
                .map(PathBuf::from)
                .or(raw.paths.staging_dir)
                .unwrap_or(defaults.staging_dir),
        )?,
        build_root,
    };

    let pull_request = matches!(
        env_var(ENV_EVENT_NAME).as_deref(),
        Some("pull_request") | Some("pull_request_target")
    ) || matches!(
        env_var(ENV_PULL_REQUEST).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("true") | Some("1")
    );

    let secrets = Secrets {
        deploy_key: env_var(ENV_DEPLOY_KEY),
        token: env_var(ENV_TOKEN),
        pull_request,
    };

    let config = Config {
        paths,
        source: raw.source,
        policy: raw.policy,
        artifacts: raw.artifacts,
        docs: raw.docs,
        publish: raw.publish,
        secrets,
    };

    validate(&config)?;
    config.trace_loaded();
    Ok(config)
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).with_context(|| format!("Failed to resolve path {path:?}"))
}

fn read_raw(path: &Path) -> Result<RawConfig> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path)
        .map_err(|e| {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            e
        })
        .with_context(|| format!("Failed to read config file {path:?}"))?;

    if content.trim().is_empty() {
        return Ok(RawConfig::default());
    }

    match serde_yaml::from_str(&content) {
        Ok(raw) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(raw)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.source.repo_url.trim().is_empty() {
        anyhow::bail!("source.repo_url must not be empty");
    }
    if !config.artifacts.pdf_name.contains("{version}") {
        anyhow::bail!(
            "artifacts.pdf_name must contain a {{version}} placeholder, got {:?}",
            config.artifacts.pdf_name
        );
    }
    if !config.artifacts.pdf_name.ends_with(".pdf") {
        anyhow::bail!("artifacts.pdf_name must end in .pdf");
    }
    if config.docs.command.is_empty() {
        anyhow::bail!("docs.command must name a program");
    }
    if config.docs.heartbeat_secs == 0 {
        anyhow::bail!("docs.heartbeat_secs must be positive");
    }
    if config.publish.branch.trim().is_empty() || config.publish.remote.trim().is_empty() {
        anyhow::bail!("publish.remote and publish.branch must not be empty");
    }
    Ok(())
}
