use regex::Regex;
use semver::{Prerelease, Version};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Tags we build from: `vMAJOR.MINOR.PATCH` with an optional `-rcN`/`-betaN`.
/// Anything else (build metadata, alphas, odd prefixes) is not a release tag.
const TAG_PATTERN: &str = r"^v(\d+)\.(\d+)\.(\d+)(?:-((?:rc|beta)\d+))?$";

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TAG_PATTERN).expect("tag pattern is a valid regex"))
}

/// A release tag that passed the strict tag pattern.
///
/// Ordering and equality follow semver on the parsed version, so prereleases
/// sort before the release they lead up to.
#[derive(Debug, Clone)]
pub struct ReleaseVersion {
    tag: String,
    version: Version,
}

impl ReleaseVersion {
    /// Parse a tag name such as `v1.9.0` or `v1.9.0-rc2`.
    ///
    /// Returns `None` for tags outside the strict pattern.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let caps = tag_regex().captures(tag)?;
        let major = caps[1].parse::<u64>().ok()?;
        let minor = caps[2].parse::<u64>().ok()?;
        let patch = caps[3].parse::<u64>().ok()?;

        let mut version = Version::new(major, minor, patch);
        if let Some(pre) = caps.get(4) {
            version.pre = Prerelease::new(pre.as_str()).ok()?;
        }

        Some(ReleaseVersion {
            tag: tag.to_string(),
            version,
        })
    }

    /// The tag as it appears in the source repository, e.g. `v1.9.0`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// `MAJOR.MINOR`, the key used by the binary distribution URL layout.
    pub fn minor_series(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for ReleaseVersion {}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}
