//! The three entry-point workflows: build every eligible release, build the
//! nightly snapshot, and publish whatever earlier runs staged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::build::{find_output_pdf, SourceCheckout};
use crate::catalog::VersionCatalog;
use crate::config::Config;
use crate::contract::{ArtifactFetcher, CommandRunner, DocBuilder};
use crate::error::Result;
use crate::publish::{PublishOutcome, PublishStore};
use crate::version::ReleaseVersion;

/// Result of a release batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Versions built and staged in this run.
    pub built: Vec<String>,
    /// Versions already present in the publish directory.
    pub skipped: Vec<String>,
}

pub struct Workflow<F, B> {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    fetcher: F,
    builder: B,
    store: PublishStore,
    checkout: SourceCheckout,
}

impl<F: ArtifactFetcher, B: DocBuilder> Workflow<F, B> {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>, fetcher: F, builder: B) -> Self {
        let store = PublishStore::new(&config, runner.clone());
        let checkout = SourceCheckout::new(
            runner.clone(),
            config.source.repo_url.clone(),
            config.paths.source_dir.clone(),
        );
        Self {
            config,
            runner,
            fetcher,
            builder,
            store,
            checkout,
        }
    }

    /// Build a PDF for every eligible release that is not yet published.
    ///
    /// Versions are processed one after another; the first failure aborts the
    /// batch.
    pub async fn build_all_releases(&self) -> Result<BuildReport> {
        let catalog = VersionCatalog::collect(
            &self.runner,
            &self.config.source.repo_url,
            &self.config.policy,
        )
        .await?;

        let mut report = BuildReport::default();
        for version in catalog.iter() {
            if self.build_release_pdf(version).await? {
                report.built.push(version.to_string());
            } else {
                report.skipped.push(version.to_string());
            }
        }

        info!(
            built = report.built.len(),
            skipped = report.skipped.len(),
            "Release batch finished"
        );
        Ok(report)
    }

    /// Build and stage the PDF for one release. Returns `false` when the
    /// version is already published and nothing was done.
    pub async fn build_release_pdf(&self, version: &ReleaseVersion) -> Result<bool> {
        let label = version.to_string();
        if self.store.is_published(&label) {
            info!(version = %label, "PDF already published, skipping");
            return Ok(false);
        }

        info!(version = %label, tag = %version.tag(), "Building release PDF");
        let executable = self.fetcher.fetch_release(version).await?;
        self.checkout.prepare(version.tag()).await?;
        let pdf = self.build_pdf(&executable).await.inspect_err(|e| {
            error!(version = %label, error = %e, "Release build failed");
        })?;
        self.store.stage(&pdf, &label)?;
        Ok(true)
    }

    /// Build the nightly snapshot and stage it under its development version.
    pub async fn build_nightly(&self) -> Result<String> {
        let nightly = self.fetcher.fetch_nightly().await?;
        self.checkout.prepare(&nightly.commit).await?;
        let version = self
            .checkout
            .read_version(&self.config.source.version_file)?;
        info!(commit = %nightly.commit, version = %version, "Building nightly PDF");

        let pdf = self.build_pdf(&nightly.executable).await?;
        self.store.stage(&pdf, &version)?;
        Ok(version)
    }

    pub async fn commit(&self) -> Result<PublishOutcome> {
        self.store.publish().await
    }

    async fn build_pdf(&self, executable: &Path) -> Result<PathBuf> {
        let source = self.checkout.dir();
        self.builder.build(source, executable).await?;
        find_output_pdf(
            &source.join(&self.config.docs.output_dir),
            &self.config.docs.output_prefix,
        )
    }
}
