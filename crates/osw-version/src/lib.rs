use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use osw_core::{ReleaseType, SemVer};
use osw_tools::GitCli;

const DEFAULT_REMOTE: &str = "origin";

/// Resolves the authoritative current version and computes the next one.
///
/// The remote tracked branch is the source of truth (the local clone may
/// be stale), but a remote that cannot be reached never blocks a run:
/// resolution degrades to the local version file with a warning. When
/// both sides are readable the higher version wins, so an out-of-sync
/// clone cannot silently regress the version number.
pub struct VersionResolver {
    git: GitCli,
    version_file: String,
    remote: String,
}

impl VersionResolver {
    pub fn new(git: GitCli, version_file: impl Into<String>) -> Self {
        Self {
            git,
            version_file: version_file.into(),
            remote: DEFAULT_REMOTE.to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Effective current version before any bump.
    pub fn current(&self, branch: Option<&str>) -> Result<SemVer> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.git.current_branch().context("determine branch for version lookup")?,
        };

        let local = self.read_local();
        match self.read_remote(&branch) {
            Ok(remote) => match local {
                Ok(local) => Ok(remote.max(local)),
                Err(_) => Ok(remote),
            },
            Err(err) => {
                warn!(
                    branch = %branch,
                    error = %err,
                    "remote version lookup failed; falling back to local {}",
                    self.version_file
                );
                local.with_context(|| {
                    format!(
                        "both remote and local version lookups failed for {}",
                        self.version_file
                    )
                })
            }
        }
    }

    pub fn resolve_next(&self, release: ReleaseType, branch: Option<&str>) -> Result<SemVer> {
        Ok(self.current(branch)?.bump(release))
    }

    pub fn version_file_path(&self) -> PathBuf {
        self.git.repo_root().join(&self.version_file)
    }

    fn read_local(&self) -> Result<SemVer> {
        let path = self.version_file_path();
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        raw.trim()
            .parse::<SemVer>()
            .with_context(|| format!("parse {}", path.display()))
    }

    fn read_remote(&self, branch: &str) -> Result<SemVer> {
        // Fetch first so the remote-tracking ref is current.
        self.git.fetch(&self.remote, branch)?;
        let raw = self
            .git
            .show_remote_file(&self.remote, branch, &self.version_file)?;
        raw.trim()
            .parse::<SemVer>()
            .with_context(|| format!("parse remote {}:{}", branch, self.version_file))
    }
}
