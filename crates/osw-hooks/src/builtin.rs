use std::time::Duration;

use osw_core::{SemVer, Stage};
use osw_tools::GitCli;

use crate::registry::{Hook, HookContext, HookRegistry};

/// Subprocess-backed probes get a short leash; a hook must never hang the
/// pipeline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum interpreter version required by the target project's tooling.
pub struct PythonToolchainHook {
    pub min_minor: u32,
}

impl Hook for PythonToolchainHook {
    fn name(&self) -> &'static str {
        "python_toolchain"
    }

    fn check(&self, ctx: &HookContext) -> (bool, String) {
        let out = match ctx.tools.run_with_timeout(
            &ctx.repo_root,
            "python3",
            &["--version"],
            PROBE_TIMEOUT,
        ) {
            Ok(out) if out.success() => out,
            _ => {
                return (
                    false,
                    "python3 not found on PATH; install Python 3 to run the workflow tooling"
                        .to_string(),
                )
            }
        };
        // "Python 3.11.4"
        let reported = out.stdout.trim();
        let minor = reported
            .strip_prefix("Python 3.")
            .and_then(|rest| rest.split('.').next())
            .and_then(|m| m.parse::<u32>().ok());
        match minor {
            Some(m) if m >= self.min_minor => (true, format!("{reported} available")),
            Some(m) => (
                false,
                format!(
                    "Python 3.{m} found but 3.{} or newer is required",
                    self.min_minor
                ),
            ),
            None => (false, format!("could not parse interpreter version from '{reported}'")),
        }
    }
}

/// Fails when any of the listed CLI tools is missing from PATH.
pub struct RequiredCliHook {
    pub programs: Vec<String>,
}

impl Hook for RequiredCliHook {
    fn name(&self) -> &'static str {
        "required_cli_tools"
    }

    fn check(&self, ctx: &HookContext) -> (bool, String) {
        let missing: Vec<&str> = self
            .programs
            .iter()
            .filter(|p| {
                !matches!(
                    ctx.tools.run_with_timeout(&ctx.repo_root, p, &["--version"], PROBE_TIMEOUT),
                    Ok(out) if out.success()
                )
            })
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            (true, format!("all required tools present: {}", self.programs.join(", ")))
        } else {
            (
                false,
                format!(
                    "missing required CLI tool(s): {}; install them before running",
                    missing.join(", ")
                ),
            )
        }
    }
}

/// The version manifest must parse as MAJOR.MINOR.PATCH before a bump is
/// attempted.
pub struct VersionFormatHook;

impl Hook for VersionFormatHook {
    fn name(&self) -> &'static str {
        "version_format"
    }

    fn check(&self, ctx: &HookContext) -> (bool, String) {
        let path = ctx.repo_root.join(&ctx.version_file);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                return (
                    false,
                    format!(
                        "{} not found; create it with an initial version like 0.1.0",
                        ctx.version_file
                    ),
                )
            }
        };
        match raw.trim().parse::<SemVer>() {
            Ok(v) => (true, format!("current version {v}")),
            Err(_) => (
                false,
                format!(
                    "{} contains '{}', expected MAJOR.MINOR.PATCH",
                    ctx.version_file,
                    raw.trim()
                ),
            ),
        }
    }
}

/// The worktree must be clean apart from the files the upcoming stage is
/// itself about to commit.
pub struct CleanWorktreeHook;

impl Hook for CleanWorktreeHook {
    fn name(&self) -> &'static str {
        "clean_worktree"
    }

    fn check(&self, ctx: &HookContext) -> (bool, String) {
        let git = GitCli::new(std::sync::Arc::clone(&ctx.tools), ctx.repo_root.clone());
        let dirty = match git.dirty_paths() {
            Ok(dirty) => dirty,
            Err(err) => return (false, format!("git status failed: {err:#}")),
        };
        let stray: Vec<String> = dirty
            .into_iter()
            .filter(|p| !ctx.allowed_dirty_prefixes.iter().any(|pre| p.starts_with(pre.as_str())))
            .collect();
        if stray.is_empty() {
            (true, "worktree clean (ignoring workflow-managed paths)".to_string())
        } else {
            (
                false,
                format!(
                    "uncommitted changes outside the change scope: {}; commit or stash them first",
                    stray.join(", ")
                ),
            )
        }
    }
}

/// The hosting-platform CLI must be present and authenticated before the
/// PR stage.
pub struct GhAuthHook;

impl Hook for GhAuthHook {
    fn name(&self) -> &'static str {
        "gh_authenticated"
    }

    fn check(&self, ctx: &HookContext) -> (bool, String) {
        match ctx.tools.run_with_timeout(&ctx.repo_root, "gh", &["auth", "status"], PROBE_TIMEOUT) {
            Ok(out) if out.success() => (true, "gh authenticated".to_string()),
            Ok(out) => (
                false,
                format!("gh is not authenticated: {}; run `gh auth login`", out.stderr.trim()),
            ),
            Err(_) => (
                false,
                "gh not found on PATH; install the GitHub CLI or skip the PR stage".to_string(),
            ),
        }
    }
}

/// Canonical stage bindings. `gate_tools` lists the analysis CLIs the
/// selected lane will actually invoke (empty for the docs lane).
pub fn default_registry(gate_tools: &[String]) -> HookRegistry {
    let mut reg = HookRegistry::empty();
    reg.register(Stage::Setup, Box::new(PythonToolchainHook { min_minor: 10 }));
    let mut programs = vec!["git".to_string()];
    programs.extend(gate_tools.iter().cloned());
    reg.register(Stage::Setup, Box::new(RequiredCliHook { programs }));
    reg.register(Stage::VersionBump, Box::new(VersionFormatHook));
    reg.register(Stage::Commit, Box::new(CleanWorktreeHook));
    reg.register(Stage::PullRequest, Box::new(GhAuthHook));
    reg
}
