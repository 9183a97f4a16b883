use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const HASH_VAR: &str = "SNAPFLOW_GIT_HASH";

fn main() {
    // Release tarballs have no .git; packagers can pass the hash in directly
    println!("cargo:rerun-if-env-changed={HASH_VAR}");
    let hash = env::var(HASH_VAR)
        .ok()
        .filter(|hash| !hash.trim().is_empty())
        .or_else(short_head)
        .unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env={HASH_VAR}={hash}");

    if let Some(git_dir) = git_dir() {
        for name in ["HEAD", "refs", "packed-refs"] {
            rerun_if_exists(&git_dir.join(name));
        }
    }
}

fn short_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !hash.is_empty()).then_some(hash)
}

/// `.git` may be a directory or, in worktrees and submodules, a file
/// holding `gitdir: <path>`.
fn git_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os("GIT_DIR") {
        return Some(PathBuf::from(dir));
    }

    let dot_git = PathBuf::from(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }

    let contents = fs::read_to_string(&dot_git).ok()?;
    let target = PathBuf::from(contents.strip_prefix("gitdir:")?.trim());
    if target.is_relative() {
        Some(Path::new(".").join(target))
    } else {
        Some(target)
    }
}

fn rerun_if_exists(path: &Path) {
    if path.exists()
        && let Some(display) = path.to_str()
    {
        println!("cargo:rerun-if-changed={display}");
    }
}
