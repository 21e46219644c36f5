use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::runner::{run_checked, ToolRunner};

/// Wrapper for the hosting-platform CLI (`gh`).
#[derive(Clone)]
pub struct GhCli {
    tools: Arc<dyn ToolRunner>,
    repo_root: PathBuf,
}

impl GhCli {
    pub fn new(tools: Arc<dyn ToolRunner>, repo_root: PathBuf) -> Self {
        Self { tools, repo_root }
    }

    /// `gh auth status` exits non-zero when not logged in.
    pub fn authenticated(&self) -> bool {
        matches!(
            self.tools.run(&self.repo_root, "gh", &["auth", "status"]),
            Ok(out) if out.success()
        )
    }

    /// True when an open PR already exists for the branch. Uses the JSON
    /// output so an empty list is unambiguous.
    pub fn pr_exists(&self, head_branch: &str) -> Result<bool> {
        let out = run_checked(
            self.tools.as_ref(),
            &self.repo_root,
            "gh",
            &[
                "pr", "list", "--head", head_branch, "--state", "open", "--json", "number",
            ],
        )?;
        Ok(out.trim() != "[]" && !out.trim().is_empty())
    }

    /// Create a PR and return the URL gh prints.
    pub fn pr_create(&self, title: &str, body: &str) -> Result<String> {
        run_checked(
            self.tools.as_ref(),
            &self.repo_root,
            "gh",
            &["pr", "create", "--title", title, "--body", body],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ToolOutput;
    use crate::scripted::ScriptedTools;

    fn gh(tools: Arc<ScriptedTools>) -> GhCli {
        GhCli::new(tools, PathBuf::from("."))
    }

    #[test]
    fn authenticated_only_on_zero_exit() {
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("gh", ToolOutput::failed(1, "", "not logged in"));
        assert!(!gh(tools).authenticated());

        let tools = Arc::new(ScriptedTools::new());
        tools.expect("gh", ToolOutput::ok("Logged in to github.com"));
        assert!(gh(tools).authenticated());
    }

    #[test]
    fn pr_exists_reads_json_list() {
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("gh", ToolOutput::ok("[]"));
        assert!(!gh(tools).pr_exists("change/x").unwrap());

        let tools = Arc::new(ScriptedTools::new());
        tools.expect("gh", ToolOutput::ok(r#"[{"number": 12}]"#));
        assert!(gh(tools).pr_exists("change/x").unwrap());
    }
}
