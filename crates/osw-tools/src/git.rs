use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::runner::{run_checked, ToolRunner};

/// Thin wrapper over the `git` CLI. Every call goes through the
/// [`ToolRunner`] seam so orchestration logic can be tested without a
/// real repository.
#[derive(Clone)]
pub struct GitCli {
    tools: Arc<dyn ToolRunner>,
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(tools: Arc<dyn ToolRunner>, repo_root: PathBuf) -> Self {
        Self { tools, repo_root }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        run_checked(self.tools.as_ref(), &self.repo_root, "git", args)
    }

    pub fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn head_rev(&self) -> Result<String> {
        self.git(&["rev-parse", "HEAD"])
    }

    /// Porcelain status; empty means clean. Parses the raw output rather
    /// than going through [`run_checked`], whose trim would eat the
    /// leading status character of the first line.
    pub fn dirty_paths(&self) -> Result<Vec<String>> {
        let out = self.tools.run(&self.repo_root, "git", &["status", "--porcelain"])?;
        if !out.success() {
            return Err(anyhow!(
                "command failed: git status --porcelain\n{}",
                out.diagnostics()
            ));
        }
        Ok(parse_porcelain(&out.stdout))
    }

    pub fn is_clean(&self) -> Result<bool> {
        Ok(self.dirty_paths()?.is_empty())
    }

    pub fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        self.git(&["fetch", remote, branch])?;
        Ok(())
    }

    /// Read a file's content as tracked on the remote branch, without
    /// touching the working copy.
    pub fn show_remote_file(&self, remote: &str, branch: &str, path: &str) -> Result<String> {
        let spec = format!("{}/{}:{}", remote, branch, path);
        self.git(&["show", &spec])
    }

    pub fn add(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Err(anyhow!("git add: no paths given"));
        }
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.git(&args)?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<String> {
        self.git(&["commit", "-m", message])?;
        self.head_rev()
    }

    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.git(&["push", "--set-upstream", remote, branch])?;
        Ok(())
    }
}

/// Paths from `git status --porcelain` output. Each line is two status
/// characters, a space, then the path; rename entries carry both sides
/// joined by ` -> ` and yield both.
pub fn parse_porcelain(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .flat_map(|line| {
            let path = line.get(3..).map(str::trim).unwrap_or("");
            if path.is_empty() {
                Vec::new()
            } else if let Some((old, new)) = path.split_once(" -> ") {
                vec![old.trim().to_string(), new.trim().to_string()]
            } else {
                vec![path.to_string()]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ToolOutput;
    use crate::scripted::ScriptedTools;

    fn git(tools: Arc<ScriptedTools>) -> GitCli {
        GitCli::new(tools, PathBuf::from("."))
    }

    #[test]
    fn dirty_paths_parses_porcelain() {
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok(" M src/lib.rs\n?? notes.txt"));
        let g = git(tools);
        assert_eq!(g.dirty_paths().unwrap(), vec!["src/lib.rs", "notes.txt"]);
    }

    #[test]
    fn dirty_paths_keeps_the_first_line_intact() {
        // The first status character must survive; a trimmed read would
        // shift the column offsets and truncate the leading path.
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok(" M src/lib.rs"));
        assert_eq!(git(tools).dirty_paths().unwrap(), vec!["src/lib.rs"]);
    }

    #[test]
    fn dirty_paths_splits_rename_entries() {
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok("R  docs/old.md -> docs/new.md\n M setup.py"));
        assert_eq!(
            git(tools).dirty_paths().unwrap(),
            vec!["docs/old.md", "docs/new.md", "setup.py"]
        );
    }

    #[test]
    fn clean_tree_yields_no_paths() {
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok(""));
        assert!(git(tools).is_clean().unwrap());
    }

    #[test]
    fn show_remote_file_uses_remote_ref() {
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok("0.1.26"));
        let g = git(tools.clone());
        let v = g.show_remote_file("origin", "main", "VERSION").unwrap();
        assert_eq!(v, "0.1.26");
        let calls = tools.calls();
        assert_eq!(calls[0].1, vec!["show", "origin/main:VERSION"]);
    }

    #[test]
    fn failed_git_calls_surface_stderr() {
        let tools = Arc::new(ScriptedTools::new());
        tools.expect(
            "git",
            ToolOutput::failed(128, "", "fatal: not a git repository"),
        );
        let err = git(tools).current_branch().unwrap_err();
        assert!(err.to_string().contains("not a git repository"));
    }
}
