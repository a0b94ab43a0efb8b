// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=MAGNIFIER_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = std::env::var("MAGNIFIER_VERSION")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(git_version)
        .unwrap_or_else(|| std::env::var("CARGO_PKG_VERSION").unwrap_or_default());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// "1.2.0" on a tag, "1.2.0+3.abc1234" after it, the short hash without tags
fn git_version() -> Option<String> {
    let describe = run_git(&["describe", "--tags", "--long", "--match", "v*"]);

    let Some(describe) = describe else {
        return run_git(&["rev-parse", "--short", "HEAD"]);
    };

    // v1.2.0-3-gabc1234
    let mut parts = describe.rsplitn(3, '-');
    let hash = parts.next()?.trim_start_matches('g').to_string();
    let commits: u32 = parts.next()?.parse().ok()?;
    let tag = parts.next()?;
    let base = tag.strip_prefix('v').unwrap_or(tag);

    Some(if commits == 0 {
        base.to_string()
    } else {
        format!("{}+{}.{}", base, commits, hash)
    })
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}
