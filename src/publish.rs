//! Publish store: the docs repository working copy plus a staging area.
//!
//! Built PDFs are first staged under their canonical name. `publish` then
//! folds everything staged into the single commit of the assets branch and
//! force-pushes it, so the branch never grows history.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, PublishConfig, Secrets};
use crate::contract::{CommandRunner, CommandSpec};
use crate::error::{PdfError, Result};

/// What a call to [`PublishStore::publish`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Pull-request runs never touch the docs repository.
    SkippedPullRequest,
    /// No staging directory, nothing was built in this run.
    NothingStaged,
    Published { files: Vec<String> },
}

pub struct PublishStore {
    runner: Arc<dyn CommandRunner>,
    publish_dir: PathBuf,
    staging_dir: PathBuf,
    ssh_dir: PathBuf,
    pdf_name: String,
    settings: PublishConfig,
    secrets: Secrets,
}

impl PublishStore {
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            publish_dir: config.paths.publish_dir.clone(),
            staging_dir: config.paths.staging_dir.clone(),
            ssh_dir: config.paths.build_root.join(".ssh"),
            pdf_name: config.artifacts.pdf_name.clone(),
            settings: config.publish.clone(),
            secrets: config.secrets.clone(),
        }
    }

    /// Canonical file name for a version label such as `1.9.0` or `1.12.0-DEV`.
    pub fn artifact_name(&self, version: &str) -> String {
        self.pdf_name.replace("{version}", version)
    }

    pub fn is_published(&self, version: &str) -> bool {
        self.publish_dir.join(self.artifact_name(version)).is_file()
    }

    /// Copy a built PDF into the staging area under its canonical name.
    pub fn stage(&self, file: &Path, version: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.staging_dir)?;
        let target = self.staging_dir.join(self.artifact_name(version));
        std::fs::copy(file, &target)?;
        info!(
            version = %version,
            from = %file.display(),
            to = %target.display(),
            "Staged PDF"
        );
        Ok(target)
    }

    /// Fold all staged PDFs into the assets branch and force-push it.
    pub async fn publish(&self) -> Result<PublishOutcome> {
        if self.secrets.pull_request {
            info!("Pull request build, not publishing");
            return Ok(PublishOutcome::SkippedPullRequest);
        }
        if !self.staging_dir.is_dir() {
            info!(staging_dir = %self.staging_dir.display(), "Nothing staged, not publishing");
            return Ok(PublishOutcome::NothingStaged);
        }

        let env = self.git_env()?;
        let remote = self.settings.remote.as_str();
        let branch = self.settings.branch.as_str();

        let upstream = format!("{remote}/{branch}");
        let refspec = format!("HEAD:refs/heads/{branch}");

        self.git(&env, &["fetch", remote, branch]).await?;
        self.git(&env, &["reset", "--hard", upstream.as_str()]).await?;

        let files = self.copy_staged()?;
        if files.is_empty() {
            warn!(staging_dir = %self.staging_dir.display(), "Staging directory holds no PDFs");
        }

        self.git(&env, &["add", "-A", "--", "*.pdf"]).await?;
        let name = format!("user.name={}", self.settings.author_name);
        let email = format!("user.email={}", self.settings.author_email);
        self.git(
            &env,
            &[
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "commit",
                "--amend",
                "--date=now",
                "-m",
                self.settings.commit_message.as_str(),
            ],
        )
        .await?;
        self.git(&env, &["push", "--force", remote, refspec.as_str()])
            .await?;

        info!(branch = %branch, files = ?files, "Published PDFs");
        Ok(PublishOutcome::Published { files })
    }

    fn copy_staged(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.staging_dir).map_err(|e| {
            PdfError::publish(format!(
                "cannot read staging directory {}: {e}",
                self.staging_dir.display()
            ))
        })?;
        for entry in entries {
            let path = entry?.path();
            let is_pdf = path.extension().and_then(|e| e.to_str()) == Some("pdf");
            if !path.is_file() || !is_pdf {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            std::fs::copy(&path, self.publish_dir.join(name)).map_err(|e| {
                PdfError::publish(format!("cannot copy {}: {e}", path.display()))
            })?;
            debug!(file = %name, "Copied staged PDF into working copy");
            files.push(name.to_string());
        }
        files.sort();
        Ok(files)
    }

    /// Environment for git calls that talk to the docs remote.
    fn git_env(&self) -> Result<Vec<(String, String)>> {
        if let Some(encoded) = &self.secrets.deploy_key {
            let key_path = self.write_deploy_key(encoded)?;
            info!(key = %key_path.display(), "Using deploy key for publishing");
            return Ok(vec![(
                "GIT_SSH_COMMAND".to_string(),
                format!(
                    "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                    key_path.display()
                ),
            )]);
        }
        if let Some(token) = &self.secrets.token {
            info!("Using token authentication for publishing");
            let credentials = BASE64.encode(format!("x-access-token:{token}"));
            // GIT_CONFIG_* keeps the header out of the logged command line.
            return Ok(vec![
                ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
                ("GIT_CONFIG_KEY_0".to_string(), "http.extraheader".to_string()),
                (
                    "GIT_CONFIG_VALUE_0".to_string(),
                    format!("AUTHORIZATION: basic {credentials}"),
                ),
            ]);
        }
        debug!("No publishing credentials configured, relying on ambient git auth");
        Ok(Vec::new())
    }

    fn write_deploy_key(&self, encoded: &str) -> Result<PathBuf> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let mut key = BASE64
            .decode(compact)
            .map_err(|e| PdfError::config(format!("deploy key is not valid base64: {e}")))?;
        if !key.ends_with(b"\n") {
            key.push(b'\n');
        }

        std::fs::create_dir_all(&self.ssh_dir)?;
        let key_path = self.ssh_dir.join("deploy_key");
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&key_path)?;
        // The mode above only applies to new files.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(&key)?;
        Ok(key_path)
    }

    async fn git(&self, env: &[(String, String)], args: &[&str]) -> Result<()> {
        let spec = CommandSpec::new("git")
            .arg("-C")
            .arg(self.publish_dir.display().to_string())
            .args(args.iter().copied())
            .envs(env.iter().cloned());
        info!(command = %spec.display(), "Publishing step");
        self.runner.run(&spec).await.map_err(|e| {
            error!(error = %e, "Publishing step failed");
            PdfError::publish(e.to_string())
        })?;
        Ok(())
    }
}
