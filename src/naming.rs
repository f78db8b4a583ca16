//! Unique, traceable names for deployed app instances.
//!
//! Names look like `remix-<target>-<revision>-<random>`: the abbreviated
//! commit hash ties an instance back to the code it runs, and the random
//! suffix keeps repeated deploys of the same commit apart.

use std::fmt;
use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Length of the abbreviated revision hash.
pub const REVISION_LEN: usize = 7;

/// An abbreviated source-control revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Creates a revision from a commit hash, keeping the first seven characters.
    pub fn new(hash: &str) -> Result<Self> {
        let hash = hash.trim();

        if hash.len() < REVISION_LEN {
            return Err(Error::Startup(format!(
                "revision '{}' is shorter than {} characters",
                hash, REVISION_LEN
            )));
        }

        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Startup(format!("revision '{}' is not a hex hash", hash)));
        }

        Ok(Self(hash[..REVISION_LEN].to_ascii_lowercase()))
    }

    /// Reads the revision checked out in `repo_path` via `git rev-parse HEAD`.
    pub fn from_git(repo_path: impl AsRef<Path>) -> Result<Self> {
        let output = Command::new("git")
            .current_dir(repo_path.as_ref())
            .args(["rev-parse", "HEAD"])
            .output()
            .map_err(|e| Error::Startup(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Startup(format!(
                "git rev-parse HEAD failed: {}",
                stderr.trim()
            )));
        }

        let revision = Self::new(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(revision = %revision, "resolved source revision");
        Ok(revision)
    }

    /// Returns the abbreviated hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates app names for one revision.
#[derive(Debug, Clone)]
pub struct AppNamer {
    prefix: String,
    revision: Revision,
}

impl AppNamer {
    /// Creates a namer for `revision` with the given prefix.
    pub fn new(prefix: impl Into<String>, revision: Revision) -> Self {
        Self {
            prefix: prefix.into(),
            revision,
        }
    }

    /// Returns the revision embedded in generated names.
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Generates a fresh name for `target`.
    pub fn app_name(&self, target: &str) -> String {
        app_name(&self.prefix, target, &self.revision)
    }
}

/// Builds `<prefix>-<target>-<revision>-<random>`, with four fresh hex characters.
pub fn app_name(prefix: &str, target: &str, revision: &Revision) -> String {
    format!("{}-{}-{}-{}", prefix, target, revision, random_suffix())
}

fn random_suffix() -> String {
    // The leading bytes of a v4 UUID are fully random.
    let bytes = uuid::Uuid::new_v4().into_bytes();
    format!("{:02x}{:02x}", bytes[0], bytes[1])
}
