use std::path::PathBuf;
use std::sync::Arc;

use osw_core::{ChangeId, LaneName, ReleaseType};
use osw_tools::{GhCli, GitCli, ToolRunner};

use crate::config::Config;

/// Everything the CLI resolves before a run starts. Immutable for the
/// lifetime of the run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub change_id: ChangeId,
    pub title: String,
    pub owner: String,
    pub lane: LaneName,
    pub release: ReleaseType,
    pub branch: Option<String>,
    pub commit_message: Option<String>,
    pub dry_run: bool,
    pub skip_gates: bool,
    pub no_parallel: bool,
    pub force_hooks: bool,
    /// Step-selection debug flags: run only stages within this inclusive
    /// index range.
    pub stage_range: Option<(usize, usize)>,
}

impl RunOptions {
    pub fn new(change_id: ChangeId, title: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            change_id,
            title: title.into(),
            owner: owner.into(),
            lane: LaneName::Standard,
            release: ReleaseType::Patch,
            branch: None,
            commit_message: None,
            dry_run: false,
            skip_gates: false,
            no_parallel: false,
            force_hooks: false,
            stage_range: None,
        }
    }
}

/// Shared, read-only view handed to every stage handler. Band workers
/// hold it behind an `Arc`; nothing here is mutated during a run.
pub struct StageContext {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub opts: RunOptions,
    pub tools: Arc<dyn ToolRunner>,
    pub git: GitCli,
    pub gh: GhCli,
}

impl StageContext {
    pub fn new(repo_root: PathBuf, cfg: Config, opts: RunOptions, tools: Arc<dyn ToolRunner>) -> Self {
        let git = GitCli::new(Arc::clone(&tools), repo_root.clone());
        let gh = GhCli::new(Arc::clone(&tools), repo_root.clone());
        Self { repo_root, cfg, opts, tools, git, gh }
    }

    pub fn change_dir(&self) -> PathBuf {
        Config::change_dir(&self.repo_root, &self.opts.change_id)
    }

    /// Default message when the operator does not provide one; validated
    /// like any other message at the commit stage.
    pub fn commit_message(&self) -> String {
        match &self.opts.commit_message {
            Some(msg) => msg.clone(),
            None => format!("chore({}): {}", self.opts.change_id.as_str(), self.opts.title),
        }
    }
}
