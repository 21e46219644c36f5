use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use osw_core::Stage;
use osw_tools::ToolRunner;

/// Everything a hook may inspect. Hooks are read-only: they never mutate
/// repository or workflow state.
pub struct HookContext {
    pub tools: Arc<dyn ToolRunner>,
    pub repo_root: PathBuf,
    /// Path of the version manifest file, relative to the repo root.
    pub version_file: String,
    /// Worktree paths the upcoming stage is itself about to commit;
    /// dirt under these prefixes does not fail the cleanliness check.
    pub allowed_dirty_prefixes: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HookOutcome {
    pub stage_index: usize,
    pub hook_name: String,
    pub passed: bool,
    /// Diagnostic with a remediation hint when failing.
    pub message: String,
}

pub trait Hook: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns (passed, diagnostic).
    fn check(&self, ctx: &HookContext) -> (bool, String);
}

/// Stage-keyed table of validation hooks, run immediately before the
/// bound stage executes.
pub struct HookRegistry {
    bindings: Vec<(Stage, Box<dyn Hook>)>,
}

impl HookRegistry {
    pub fn empty() -> Self {
        Self { bindings: Vec::new() }
    }

    pub fn register(&mut self, stage: Stage, hook: Box<dyn Hook>) {
        self.bindings.push((stage, hook));
    }

    pub fn run_for_stage(&self, stage: Stage, ctx: &HookContext) -> Vec<HookOutcome> {
        self.bindings
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, hook)| {
                let (passed, message) = hook.check(ctx);
                HookOutcome {
                    stage_index: stage.index(),
                    hook_name: hook.name().to_string(),
                    passed,
                    message,
                }
            })
            .collect()
    }
}
