//! Binary distribution fetcher.
//!
//! Downloads release tarballs together with their published SHA-256 checksum
//! file, and the rolling nightly tarball, then unpacks them under the build
//! root. Archives are expected to contain a single top-level folder.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{error, info};

use crate::config::ArtifactConfig;
use crate::contract::{ArtifactFetcher, NightlyArtifact};
use crate::error::{PdfError, Result};
use crate::version::ReleaseVersion;

/// Fetches distributions over HTTPS with reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: ArtifactConfig,
    extract_root: PathBuf,
}

impl HttpFetcher {
    pub fn new(config: ArtifactConfig, extract_root: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, config, extract_root))
    }

    pub fn with_client(
        client: reqwest::Client,
        config: ArtifactConfig,
        extract_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            config,
            extract_root: extract_root.into(),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!(url = %url, "Downloading");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        info!(url = %url, bytes = bytes.len(), "Download complete");
        Ok(bytes.to_vec())
    }

    /// Unpack `bytes` under the extract root and return the top-level folder name.
    async fn unpack(&self, artifact: &str, bytes: Vec<u8>) -> Result<String> {
        let root = self.extract_root.clone();
        let artifact = artifact.to_string();
        tokio::task::spawn_blocking(move || -> Result<String> {
            let top = top_level_dir(&bytes)?;
            let target = root.join(&top);
            if target.exists() {
                std::fs::remove_dir_all(&target)?;
            }
            std::fs::create_dir_all(&root)?;
            tar::Archive::new(GzDecoder::new(Cursor::new(&bytes)))
                .unpack(&root)
                .map_err(|e| PdfError::archive(format!("failed to extract {artifact}: {e}")))?;
            info!(artifact = %artifact, path = %target.display(), "Extracted archive");
            Ok(top)
        })
        .await
        .map_err(|e| PdfError::archive(format!("extraction task failed: {e}")))?
    }

    fn executable_in(&self, top: &str) -> Result<PathBuf> {
        let executable = self.extract_root.join(top).join(&self.config.executable);
        if !executable.is_file() {
            return Err(PdfError::archive(format!(
                "executable {} not found in extracted archive",
                executable.display()
            )));
        }
        Ok(executable)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch_release(&self, version: &ReleaseVersion) -> Result<PathBuf> {
        let tarball_url = expand_url(&self.config.release_url, version);
        let checksum_url = expand_url(&self.config.checksum_url, version);
        let tarball_name = file_name_of(&tarball_url).to_string();

        let tarball = self.download(&tarball_url).await?;
        let checksums = self.download(&checksum_url).await?;
        let checksums = String::from_utf8_lossy(&checksums);

        verify_release(&tarball, &tarball_name, &checksum_url, &checksums)?;
        info!(artifact = %tarball_name, version = %version, "Checksum verified");

        let top = self.unpack(&tarball_name, tarball).await?;
        self.executable_in(&top)
    }

    async fn fetch_nightly(&self) -> Result<NightlyArtifact> {
        let url = &self.config.nightly_url;
        let name = file_name_of(url).to_string();
        let tarball = self.download(url).await?;

        let top = self.unpack(&name, tarball).await?;
        let commit = nightly_commit(&top)
            .ok_or_else(|| {
                PdfError::archive(format!("cannot derive commit from archive folder {top:?}"))
            })?
            .to_string();
        info!(folder = %top, commit = %commit, "Resolved nightly commit");

        Ok(NightlyArtifact {
            executable: self.executable_in(&top)?,
            commit,
        })
    }
}

/// Substitute `{minor}` and `{version}` in a URL template.
pub fn expand_url(template: &str, version: &ReleaseVersion) -> String {
    template
        .replace("{minor}", &version.minor_series())
        .replace("{version}", &version.to_string())
}

fn file_name_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Check `bytes` against the line of a `sha256sum`-style file naming `artifact`.
pub fn verify_checksum(bytes: &[u8], artifact: &str, checksum_file: &str) -> Result<()> {
    let expected = checksum_file
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let digest = fields.next()?;
            let name = fields.next()?.trim_start_matches('*');
            (name == artifact).then_some(digest)
        })
        .next()
        .ok_or_else(|| PdfError::integrity(artifact, "no checksum line for artifact"))?;

    let actual = format!("{:x}", Sha256::digest(bytes));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PdfError::integrity(
            artifact,
            format!("sha256 mismatch: expected {expected}, got {actual}"),
        ));
    }
    Ok(())
}

/// [`verify_checksum`] for a downloaded release. On failure the checksum file
/// is logged and carried in the error so the operator sees what was published.
pub fn verify_release(
    tarball: &[u8],
    artifact: &str,
    checksum_url: &str,
    checksum_file: &str,
) -> Result<()> {
    verify_checksum(tarball, artifact, checksum_file).map_err(|e| {
        error!(
            artifact = %artifact,
            checksum_url = %checksum_url,
            checksum_file = %checksum_file,
            "Checksum verification failed"
        );
        match e {
            PdfError::Integrity { artifact, reason } => PdfError::Integrity {
                artifact,
                reason: format!(
                    "{reason}; {checksum_url} lists:\n{}",
                    checksum_file.trim_end()
                ),
            },
            other => other,
        }
    })
}

/// Name of the single folder at the root of a gzipped tarball.
pub fn top_level_dir(bytes: &[u8]) -> Result<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    let entries = archive
        .entries()
        .map_err(|e| PdfError::archive(format!("unreadable tarball: {e}")))?;

    for entry in entries {
        let entry = entry.map_err(|e| PdfError::archive(format!("unreadable entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| PdfError::archive(format!("bad entry path: {e}")))?;
        let first = path
            .components()
            .find_map(|c| match c {
                std::path::Component::Normal(name) => name.to_str().map(str::to_string),
                _ => None,
            });
        if let Some(first) = first {
            return Ok(first);
        }
    }
    Err(PdfError::archive("tarball is empty"))
}

/// Commit hash encoded in a nightly folder name such as `julia-5a1b2c3d4e`.
pub fn nightly_commit(folder: &str) -> Option<&str> {
    folder
        .trim_end_matches('/')
        .rsplit_once('-')
        .map(|(_, commit)| commit)
        .filter(|commit| !commit.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, Header};
    use tempfile::tempdir;

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (path, content) in files {
            let mut header = Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    #[test]
    fn test_expand_url_templates() {
        let v = ReleaseVersion::parse_tag("v1.9.0-rc2").unwrap();
        let config = ArtifactConfig::default();
        assert_eq!(
            expand_url(&config.release_url, &v),
            "https://julialang-s3.julialang.org/bin/linux/x64/1.9/julia-1.9.0-rc2-linux-x86_64.tar.gz"
        );
        assert_eq!(
            expand_url(&config.checksum_url, &v),
            "https://julialang-s3.julialang.org/bin/checksums/julia-1.9.0-rc2.sha256"
        );
    }

    #[test]
    fn test_verify_checksum_accepts_matching_line() {
        let data = b"tarball bytes";
        let file = format!(
            "0000  julia-1.9.0-linux-i686.tar.gz\n{}  julia-1.9.0-linux-x86_64.tar.gz\n",
            sha256_hex(data)
        );
        verify_checksum(data, "julia-1.9.0-linux-x86_64.tar.gz", &file).unwrap();
    }

    #[test]
    fn test_verify_checksum_rejects_mismatch() {
        let file = format!("{}  julia.tar.gz\n", sha256_hex(b"other"));
        let err = verify_checksum(b"tarball bytes", "julia.tar.gz", &file).unwrap_err();
        assert!(matches!(err, PdfError::Integrity { .. }));
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_verify_checksum_missing_line_is_integrity_error() {
        let file = format!("{}  something-else.tar.gz\n", sha256_hex(b"x"));
        let err = verify_checksum(b"x", "julia.tar.gz", &file).unwrap_err();
        assert!(matches!(err, PdfError::Integrity { .. }));
    }

    #[test]
    fn test_verify_checksum_binary_mode_marker() {
        let file = format!("{} *julia.tar.gz\n", sha256_hex(b"x").to_uppercase());
        verify_checksum(b"x", "julia.tar.gz", &file).unwrap();
    }

    #[test]
    fn test_top_level_dir() {
        let bytes = tarball(&[
            ("julia-1a2b3c4d5e/bin/julia", b"#!/bin/sh\n"),
            ("julia-1a2b3c4d5e/VERSION", b"1.12.0-DEV\n"),
        ]);
        assert_eq!(top_level_dir(&bytes).unwrap(), "julia-1a2b3c4d5e");
    }

    #[test]
    fn test_top_level_dir_rejects_garbage() {
        let err = top_level_dir(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, PdfError::Archive(_)));
    }

    #[test]
    fn test_nightly_commit_from_folder() {
        assert_eq!(nightly_commit("julia-1a2b3c4d5e"), Some("1a2b3c4d5e"));
        assert_eq!(nightly_commit("julia-1a2b3c4d5e/"), Some("1a2b3c4d5e"));
        assert_eq!(nightly_commit("my-dist-abc"), Some("abc"));
        assert_eq!(nightly_commit("julia"), None);
        assert_eq!(nightly_commit("julia-"), None);
    }

    #[tokio::test]
    async fn test_unpack_replaces_previous_extraction() {
        let dir = tempdir().unwrap();
        let fetcher = HttpFetcher::with_client(
            reqwest::Client::new(),
            ArtifactConfig::default(),
            dir.path(),
        );

        let stale = dir.path().join("julia-abc").join("stale.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"old").unwrap();

        let bytes = tarball(&[("julia-abc/bin/julia", b"#!/bin/sh\n")]);
        let top = fetcher.unpack("nightly.tar.gz", bytes).await.unwrap();
        assert_eq!(top, "julia-abc");
        assert!(!stale.exists());

        let executable = fetcher.executable_in(&top).unwrap();
        assert_eq!(executable, dir.path().join("julia-abc/bin/julia"));
    }

    #[test]
    fn test_missing_executable_is_archive_error() {
        let dir = tempdir().unwrap();
        let fetcher = HttpFetcher::with_client(
            reqwest::Client::new(),
            ArtifactConfig::default(),
            dir.path(),
        );
        let err = fetcher.executable_in("julia-abc").unwrap_err();
        assert!(matches!(err, PdfError::Archive(_)));
    }

    #[test]
    fn test_verify_release_reports_checksum_file() {
        let file = format!(
            "{}  julia-1.9.0-linux-x86_64.tar.gz\n{}  julia-1.9.0-win64.exe\n",
            sha256_hex(b"published"),
            sha256_hex(b"windows")
        );
        let err = verify_release(
            b"tampered",
            "julia-1.9.0-linux-x86_64.tar.gz",
            "https://example.com/julia-1.9.0.sha256",
            &file,
        )
        .unwrap_err();

        let PdfError::Integrity { artifact, reason } = err else {
            panic!("expected an integrity error");
        };
        assert_eq!(artifact, "julia-1.9.0-linux-x86_64.tar.gz");
        assert!(reason.contains("mismatch"));
        assert!(reason.contains("https://example.com/julia-1.9.0.sha256"));
        assert!(reason.contains(&sha256_hex(b"windows")));
    }

    /// Minimal HTTP/1.1 server answering GETs for fixed paths, 404 otherwise.
    async fn serve(routes: Vec<(&'static str, Vec<u8>)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = std::sync::Arc::new(routes);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&request);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");
                    let (status, body) = match routes.iter().find(|(p, _)| *p == path) {
                        Some((_, body)) => ("200 OK", body.clone()),
                        None => ("404 Not Found", Vec::new()),
                    };
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn served_config(base: &str) -> ArtifactConfig {
        ArtifactConfig {
            release_url: format!("{base}/bin/{{minor}}/julia-{{version}}-linux-x86_64.tar.gz"),
            checksum_url: format!("{base}/checksums/julia-{{version}}.sha256"),
            nightly_url: format!("{base}/nightly/julia-latest-linux64.tar.gz"),
            ..ArtifactConfig::default()
        }
    }

    fn served_fetcher(base: &str, root: &std::path::Path) -> HttpFetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpFetcher::with_client(client, served_config(base), root)
    }

    #[tokio::test]
    async fn test_fetch_release_downloads_verifies_and_extracts() {
        let archive = tarball(&[("julia-1.9.0/bin/julia", b"#!/bin/sh\n")]);
        let checksums = format!("{}  julia-1.9.0-linux-x86_64.tar.gz\n", sha256_hex(&archive));
        let base = serve(vec![
            ("/bin/1.9/julia-1.9.0-linux-x86_64.tar.gz", archive),
            ("/checksums/julia-1.9.0.sha256", checksums.into_bytes()),
        ])
        .await;

        let dir = tempdir().unwrap();
        let fetcher = served_fetcher(&base, dir.path());
        let version = ReleaseVersion::parse_tag("v1.9.0").unwrap();

        let executable = fetcher.fetch_release(&version).await.unwrap();
        assert_eq!(executable, dir.path().join("julia-1.9.0/bin/julia"));
        assert!(executable.is_file());
    }

    #[tokio::test]
    async fn test_fetch_release_checksum_mismatch_extracts_nothing() {
        let archive = tarball(&[("julia-1.9.0/bin/julia", b"#!/bin/sh\n")]);
        let checksums = format!("{}  julia-1.9.0-linux-x86_64.tar.gz\n", sha256_hex(b"other"));
        let base = serve(vec![
            ("/bin/1.9/julia-1.9.0-linux-x86_64.tar.gz", archive),
            ("/checksums/julia-1.9.0.sha256", checksums.clone().into_bytes()),
        ])
        .await;

        let dir = tempdir().unwrap();
        let fetcher = served_fetcher(&base, dir.path());
        let version = ReleaseVersion::parse_tag("v1.9.0").unwrap();

        let err = fetcher.fetch_release(&version).await.unwrap_err();
        assert!(matches!(err, PdfError::Integrity { .. }));
        assert!(err.to_string().contains(checksums.trim_end()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_release_http_error_is_download_error() {
        let base = serve(vec![]).await;
        let dir = tempdir().unwrap();
        let fetcher = served_fetcher(&base, dir.path());
        let version = ReleaseVersion::parse_tag("v1.9.0").unwrap();

        let err = fetcher.fetch_release(&version).await.unwrap_err();
        assert!(matches!(err, PdfError::Download(_)));
    }

    #[tokio::test]
    async fn test_fetch_nightly_resolves_commit_from_archive() {
        let archive = tarball(&[
            ("julia-5a1b2c3d4e/bin/julia", b"#!/bin/sh\n"),
            ("julia-5a1b2c3d4e/share/doc/README", b"docs"),
        ]);
        let base = serve(vec![("/nightly/julia-latest-linux64.tar.gz", archive)]).await;

        let dir = tempdir().unwrap();
        let fetcher = served_fetcher(&base, dir.path());

        let nightly = fetcher.fetch_nightly().await.unwrap();
        assert_eq!(nightly.commit, "5a1b2c3d4e");
        assert_eq!(
            nightly.executable,
            dir.path().join("julia-5a1b2c3d4e/bin/julia")
        );
    }
}
