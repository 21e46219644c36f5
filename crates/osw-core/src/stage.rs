use serde::{Deserialize, Serialize};

/// The canonical 13-step change sequence. Order here is the execution
/// order; stage numbers used in checkpoints and CLI flags are indices
/// into [`Stage::ALL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    VersionBump,
    Proposal,
    SpecDefinition,
    TaskBreakdown,
    TestPlan,
    Scripts,
    Implementation,
    DocReview,
    Verification,
    Commit,
    PullRequest,
    Finalize,
}

/// Contiguous band of stages that may run concurrently: the document
/// scaffolding stages have no ordering dependencies between them.
pub const PARALLEL_BAND: std::ops::RangeInclusive<usize> = 2..=6;

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::Setup,
        Stage::VersionBump,
        Stage::Proposal,
        Stage::SpecDefinition,
        Stage::TaskBreakdown,
        Stage::TestPlan,
        Stage::Scripts,
        Stage::Implementation,
        Stage::DocReview,
        Stage::Verification,
        Stage::Commit,
        Stage::PullRequest,
        Stage::Finalize,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn from_index(i: usize) -> Option<Stage> {
        Self::ALL.get(i).copied()
    }

    pub fn in_parallel_band(self) -> bool {
        PARALLEL_BAND.contains(&self.index())
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::VersionBump => "version_bump",
            Stage::Proposal => "proposal",
            Stage::SpecDefinition => "spec_definition",
            Stage::TaskBreakdown => "task_breakdown",
            Stage::TestPlan => "test_plan",
            Stage::Scripts => "scripts",
            Stage::Implementation => "implementation",
            Stage::DocReview => "doc_review",
            Stage::Verification => "verification",
            Stage::Commit => "commit",
            Stage::PullRequest => "pull_request",
            Stage::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.index(), self.name())
    }
}
