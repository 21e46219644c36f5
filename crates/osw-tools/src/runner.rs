use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

/// Captured result of one external tool invocation. Non-zero exit is not
/// an error at this layer; callers decide whether it means gate failure,
/// hook failure or something fatal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { exit_code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self { exit_code, stdout: stdout.into(), stderr: stderr.into() }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Raw diagnostics suitable for attaching to an error message.
    pub fn diagnostics(&self) -> String {
        format!("stdout:{}\nstderr:{}", self.stdout, self.stderr)
    }
}

/// Capability seam for every subprocess the orchestrator shells out to
/// (git, gh, linter, type checker, test runner, security scanner). Unit
/// tests substitute a scripted implementation instead of spawning.
pub trait ToolRunner: Send + Sync {
    fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ToolOutput>;

    /// Like [`run`](ToolRunner::run) but gives up after `timeout`. Used by
    /// pre-stage hooks so a slow probe cannot hang the pipeline. Doubles
    /// that never block may keep the default passthrough.
    fn run_with_timeout(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        _timeout: std::time::Duration,
    ) -> Result<ToolOutput> {
        self.run(dir, program, args)
    }
}

/// Real implementation on `std::process::Command`.
#[derive(Clone, Debug, Default)]
pub struct SystemTools;

impl ToolRunner for SystemTools {
    fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ToolOutput> {
        let out = Command::new(program)
            .args(args)
            .current_dir(dir)
            .output()
            .with_context(|| format!("spawn {} {:?}", program, args))?;
        Ok(ToolOutput {
            exit_code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        })
    }

    fn run_with_timeout(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        timeout: std::time::Duration,
    ) -> Result<ToolOutput> {
        use std::sync::mpsc;

        let dir = dir.to_path_buf();
        let program_owned = program.to_string();
        let args_owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let args_ref: Vec<&str> = args_owned.iter().map(String::as_str).collect();
            let _ = tx.send(SystemTools.run(&dir, &program_owned, &args_ref));
        });
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            // The probe thread is detached; the process exits soon after a
            // hook failure anyway.
            Err(_) => Err(anyhow!(
                "{} did not respond within {:?}",
                program,
                timeout
            )),
        }
    }
}

/// Run and treat non-zero exit as an error, carrying the tool's raw
/// output in the message.
pub fn run_checked(tools: &dyn ToolRunner, dir: &Path, program: &str, args: &[&str]) -> Result<String> {
    let out = tools.run(dir, program, args)?;
    if !out.success() {
        return Err(anyhow!(
            "command failed: {} {:?}\n{}",
            program,
            args,
            out.diagnostics()
        ));
    }
    Ok(out.stdout.trim().to_string())
}

/// Probe for tool presence via `--version`. A spawn error (not found on
/// PATH) and a non-zero exit both count as absent.
pub fn tool_available(tools: &dyn ToolRunner, dir: &Path, program: &str) -> bool {
    matches!(tools.run(dir, program, &["--version"]), Ok(out) if out.success())
}

pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTools;

    #[test]
    fn run_checked_attaches_diagnostics_on_failure() {
        let tools = ScriptedTools::new();
        tools.expect("ruff", ToolOutput::failed(2, "", "config error"));
        let err = run_checked(&tools, Path::new("."), "ruff", &["check"]).unwrap_err();
        assert!(err.to_string().contains("config error"));
    }

    #[test]
    fn tool_available_reflects_probe_result() {
        let tools = ScriptedTools::new();
        tools.expect("git", ToolOutput::ok("git version 2.44.0"));
        assert!(tool_available(&tools, Path::new("."), "git"));
        assert!(!tool_available(&tools, Path::new("."), "gh"));
    }
}
