//! Version catalog: which tags of the source repository get a PDF.
//!
//! The tag listing comes from `git ls-remote --tags`; every line is parsed on
//! its own and anything that is not a strict release tag is dropped. The
//! surviving versions go through an [`EligibilityPolicy`], a table of the
//! historical cases where a PDF build is impossible or known to be broken.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::contract::{CommandRunner, CommandSpec};
use crate::error::{PdfError, Result};
use crate::version::ReleaseVersion;

/// Half-open range `[from, until)` of versions that are never built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRange {
    pub from: Version,
    pub until: Version,
}

impl ExcludedRange {
    pub fn contains(&self, v: &Version) -> bool {
        &self.from <= v && v < &self.until
    }
}

/// Static exceptions table deciding whether a release is buildable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityPolicy {
    /// The docs toolchain can only produce a PDF from this version onward.
    pub minimum: Version,
    /// Prereleases (rc/beta) below this version are skipped.
    pub prerelease_minimum: Version,
    pub excluded_ranges: Vec<ExcludedRange>,
    pub excluded_versions: Vec<Version>,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        let v = |s: &str| Version::parse(s).expect("built-in policy versions are valid semver");
        EligibilityPolicy {
            minimum: v("1.1.0"),
            prerelease_minimum: v("1.6.0"),
            // pdf builds are broken for these betas
            excluded_ranges: vec![ExcludedRange {
                from: v("1.7.0-beta1"),
                until: v("1.7.0-beta3"),
            }],
            // no checksum file upstream
            excluded_versions: vec![v("1.8.0-beta2")],
        }
    }
}

impl EligibilityPolicy {
    pub fn is_eligible(&self, release: &ReleaseVersion) -> bool {
        let v = release.version();
        if v < &self.minimum {
            return false;
        }
        if release.is_prerelease() && v < &self.prerelease_minimum {
            return false;
        }
        if self.excluded_ranges.iter().any(|r| r.contains(v)) {
            return false;
        }
        !self.excluded_versions.contains(v)
    }
}

/// Buildable versions in the order the remote listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCatalog {
    versions: Vec<ReleaseVersion>,
}

impl VersionCatalog {
    /// List the remote's tags and keep the eligible release versions.
    pub async fn collect(
        runner: &Arc<dyn CommandRunner>,
        repo_url: &str,
        policy: &EligibilityPolicy,
    ) -> Result<Self> {
        info!(repo_url = %repo_url, "Listing remote tags");
        let spec = CommandSpec::new("git").args(["ls-remote", "--tags", repo_url]);
        let output = runner.run(&spec).await.map_err(|e| {
            error!(error = %e, repo_url = %repo_url, "git ls-remote failed");
            PdfError::remote_list(format!("{repo_url}: {e}"))
        })?;

        let catalog = Self::from_ls_remote(&output.stdout, policy);
        info!(
            repo_url = %repo_url,
            versions = catalog.len(),
            "Collected eligible versions"
        );
        Ok(catalog)
    }

    /// Parse `git ls-remote --tags` output (`<sha>\trefs/tags/<tag>` lines).
    pub fn from_ls_remote(listing: &str, policy: &EligibilityPolicy) -> Self {
        let tags = listing.lines().filter_map(|line| {
            let tag = line
                .split_once('\t')
                .and_then(|(_, reference)| reference.trim().strip_prefix("refs/tags/"));
            if tag.is_none() && !line.trim().is_empty() {
                debug!(line = %line, "Skipping malformed ls-remote line");
            }
            tag
        });
        Self::from_tags(tags, policy)
    }

    /// Build a catalog from bare tag names.
    pub fn from_tags<'a, I>(tags: I, policy: &EligibilityPolicy) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut versions: Vec<ReleaseVersion> = Vec::new();
        for tag in tags {
            let Some(release) = ReleaseVersion::parse_tag(tag) else {
                continue;
            };
            if !policy.is_eligible(&release) {
                debug!(tag = %tag, "Version excluded by eligibility policy");
                continue;
            }
            if versions.contains(&release) {
                continue;
            }
            versions.push(release);
        }
        VersionCatalog { versions }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReleaseVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn tags(&self) -> Vec<&str> {
        self.versions.iter().map(|v| v.tag()).collect()
    }
}
