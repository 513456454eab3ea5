//! Publishing against a real local bare repository.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::tempdir;

use pdf_manuals::command::SystemCommandRunner;
use pdf_manuals::config::{Config, PathsConfig};
use pdf_manuals::publish::{PublishOutcome, PublishStore};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

/// Bare remote with an `assets` branch holding a single commit, and a working
/// copy of that branch at `publish_dir`.
fn seed_remote(root: &Path, publish_dir: &Path) -> std::path::PathBuf {
    let remote = root.join("remote.git");
    let seed = root.join("seed");
    std::fs::create_dir_all(&remote).unwrap();
    std::fs::create_dir_all(&seed).unwrap();

    git(&remote, &["init", "--bare"]);
    git(&seed, &["init"]);
    git(&seed, &["checkout", "-b", "assets"]);
    std::fs::write(seed.join("README.md"), "PDF manuals\n").unwrap();
    git(&seed, &["add", "README.md"]);
    git(&seed, &["commit", "-m", "initial"]);
    git(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&seed, &["push", "origin", "assets"]);

    git(
        root,
        &[
            "clone",
            "--branch",
            "assets",
            remote.to_str().unwrap(),
            publish_dir.to_str().unwrap(),
        ],
    );
    remote
}

#[tokio::test]
async fn test_repeated_publish_keeps_single_commit_with_union_of_pdfs() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }

    let root = tempdir().unwrap();
    let config = Config {
        paths: PathsConfig::under(root.path()),
        ..Config::default()
    };
    let remote = seed_remote(root.path(), &config.paths.publish_dir);
    let store = PublishStore::new(&config, Arc::new(SystemCommandRunner::new()));

    let built = root.path().join("TheJuliaLanguage.pdf");
    let versions = ["1.9.0", "1.10.0", "1.12.0-DEV"];
    for version in versions {
        std::fs::write(&built, format!("%PDF {version}")).unwrap();
        store.stage(&built, version).unwrap();

        let outcome = store.publish().await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
        std::fs::remove_dir_all(&config.paths.staging_dir).unwrap();

        let count = git(&remote, &["rev-list", "--count", "assets"]);
        assert_eq!(count.trim(), "1");
    }

    let tree = git(&remote, &["ls-tree", "--name-only", "assets"]);
    let mut names: Vec<&str> = tree.lines().collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "README.md",
            "julia-1.10.0.pdf",
            "julia-1.12.0-DEV.pdf",
            "julia-1.9.0.pdf"
        ]
    );
    assert!(store.is_published("1.10.0"));
}

#[tokio::test]
async fn test_publish_against_missing_branch_fails() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }

    let root = tempdir().unwrap();
    let mut config = Config {
        paths: PathsConfig::under(root.path()),
        ..Config::default()
    };
    config.publish.branch = "does-not-exist".into();
    seed_remote(root.path(), &config.paths.publish_dir);

    let store = PublishStore::new(&config, Arc::new(SystemCommandRunner::new()));
    std::fs::create_dir_all(&config.paths.staging_dir).unwrap();

    let err = store.publish().await.unwrap_err();
    assert!(matches!(err, pdf_manuals::error::PdfError::Publish(_)));
}
