//! Shared scaffolding for the integration tests: scratch repositories built
//! with the real `git` binary, pinned identities and dates so object hashes
//! are stable across runs.
#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

pub const AUTHOR_DATE: &str = "1112911993 -0700";

/// The integration tests drive real git children; skip them gracefully on
/// machines without git.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

macro_rules! require_git {
    () => {
        if !crate::common::git_available() {
            eprintln!("git binary not found; skipping");
            return;
        }
    };
}

/// Route library tracing output (skip warnings and stripped-signature
/// notices) through the test harness capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Run one git command in `repo`, panicking loudly on failure.
pub fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .env("GIT_AUTHOR_NAME", "A U Thor")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("GIT_COMMITTER_NAME", "C O Mitter")
        .env("GIT_COMMITTER_EMAIL", "committer@example.com")
        .env("GIT_AUTHOR_DATE", AUTHOR_DATE)
        .env("GIT_COMMITTER_DATE", AUTHOR_DATE)
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

/// Initialize an empty repository on branch `main`.
pub fn init_repo(repo: &Path) {
    git(repo, &["init", "-q"]);
    git(repo, &["checkout", "-q", "-b", "main"]);
}

/// Write `content` at `path` (creating parent directories) and stage it.
pub fn stage_file(repo: &Path, path: &str, content: &str) {
    let full = repo.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
    git(repo, &["add", path]);
}

pub fn commit(repo: &Path, message: &str) -> String {
    git(repo, &["commit", "-q", "--allow-empty", "-m", message]);
    git(repo, &["rev-parse", "HEAD"])
}

/// `path -> hash` entries of the commit's recursive tree listing.
pub fn ls_tree(repo: &Path, commitish: &str) -> Vec<String> {
    let out = git(repo, &["ls-tree", "-r", "--name-only", commitish]);
    out.lines().map(str::to_string).collect()
}

pub fn rev_parse(repo: &Path, name: &str) -> String {
    git(repo, &["rev-parse", name])
}

pub fn parents_of(repo: &Path, commitish: &str) -> Vec<String> {
    let out = git(repo, &["show", "-s", "--format=%P", commitish]);
    out.split_whitespace().map(str::to_string).collect()
}
