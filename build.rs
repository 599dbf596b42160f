//! Build script to capture the git commit hash at compile time
//!
//! `GIT_HASH` from the build environment wins, for builds outside a checkout.

use std::env;
use std::process::Command;

fn main() {
    let git_hash = env::var("GIT_HASH").ok().filter(|h| !h.is_empty()).unwrap_or_else(|| {
        match Command::new("git").args(["rev-parse", "--short", "HEAD"]).output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            _ => String::from("unknown"),
        }
    });

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);

    println!("cargo:rerun-if-env-changed=GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
