use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stage::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneName {
    Docs,
    Standard,
    Heavy,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown lane '{0}' (expected docs, standard or heavy)")]
pub struct UnknownLane(pub String);

impl LaneName {
    pub fn parse(s: &str) -> Result<LaneName, UnknownLane> {
        match s {
            "docs" => Ok(LaneName::Docs),
            "standard" => Ok(LaneName::Standard),
            "heavy" => Ok(LaneName::Heavy),
            other => Err(UnknownLane(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LaneName::Docs => "docs",
            LaneName::Standard => "standard",
            LaneName::Heavy => "heavy",
        }
    }
}

/// Immutable execution profile. All lanes are defined at compile time;
/// there is deliberately no mutation or registration API.
#[derive(Clone, Debug)]
pub struct LaneConfig {
    pub name: LaneName,
    stages: &'static [Stage],
    pub quality_gates_enabled: bool,
    pub parallelization_enabled: bool,
    pub coverage_threshold: f64,
    pub pass_rate_threshold: f64,
    pub sla_seconds: u64,
}

/// Docs changes skip the code-generation stages (TestPlan, Scripts,
/// Implementation) but still commit, open a PR and finalize.
const DOCS_STAGES: &[Stage] = &[
    Stage::Setup,
    Stage::VersionBump,
    Stage::Proposal,
    Stage::SpecDefinition,
    Stage::TaskBreakdown,
    Stage::DocReview,
    Stage::Verification,
    Stage::Commit,
    Stage::PullRequest,
    Stage::Finalize,
];

static DOCS: LaneConfig = LaneConfig {
    name: LaneName::Docs,
    stages: DOCS_STAGES,
    quality_gates_enabled: false,
    parallelization_enabled: false,
    coverage_threshold: 0.0,
    pass_rate_threshold: 0.0,
    sla_seconds: 300,
};

static STANDARD: LaneConfig = LaneConfig {
    name: LaneName::Standard,
    stages: &Stage::ALL,
    quality_gates_enabled: true,
    parallelization_enabled: true,
    coverage_threshold: 70.0,
    pass_rate_threshold: 80.0,
    sla_seconds: 900,
};

static HEAVY: LaneConfig = LaneConfig {
    name: LaneName::Heavy,
    stages: &Stage::ALL,
    quality_gates_enabled: true,
    parallelization_enabled: true,
    coverage_threshold: 85.0,
    pass_rate_threshold: 100.0,
    sla_seconds: 1200,
};

impl LaneConfig {
    pub fn get(name: LaneName) -> &'static LaneConfig {
        match name {
            LaneName::Docs => &DOCS,
            LaneName::Standard => &STANDARD,
            LaneName::Heavy => &HEAVY,
        }
    }

    /// Stage subset for this lane, always in canonical order.
    pub fn stages(&self) -> &'static [Stage] {
        self.stages
    }
}

pub fn stages_for_lane(name: LaneName) -> &'static [Stage] {
    LaneConfig::get(name).stages()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_lane_is_an_error_not_a_default() {
        assert_eq!(
            LaneName::parse("turbo"),
            Err(UnknownLane("turbo".to_string()))
        );
    }

    #[test]
    fn lane_stage_sets_are_sorted_subsets_of_the_sequence() {
        for name in [LaneName::Docs, LaneName::Standard, LaneName::Heavy] {
            let stages = stages_for_lane(name);
            assert!(!stages.is_empty());
            for w in stages.windows(2) {
                assert!(w[0].index() < w[1].index());
            }
            assert!(stages.iter().all(|s| s.index() <= 12));
        }
    }

    #[test]
    fn docs_lane_excludes_code_generation_stages() {
        let stages = stages_for_lane(LaneName::Docs);
        assert!(!stages.contains(&Stage::TestPlan));
        assert!(!stages.contains(&Stage::Scripts));
        assert!(!stages.contains(&Stage::Implementation));
        assert!(stages.contains(&Stage::DocReview));
        assert!(stages.contains(&Stage::Finalize));
    }

    #[test]
    fn standard_and_heavy_run_the_full_sequence() {
        assert_eq!(stages_for_lane(LaneName::Standard), &Stage::ALL);
        assert_eq!(stages_for_lane(LaneName::Heavy), &Stage::ALL);
    }

    #[test]
    fn heavy_thresholds_dominate_standard() {
        let std_lane = LaneConfig::get(LaneName::Standard);
        let heavy = LaneConfig::get(LaneName::Heavy);
        assert!(heavy.coverage_threshold >= std_lane.coverage_threshold);
        assert!(heavy.pass_rate_threshold >= std_lane.pass_rate_threshold);
    }

    #[test]
    fn docs_lane_disables_gates_entirely() {
        let docs = LaneConfig::get(LaneName::Docs);
        assert!(!docs.quality_gates_enabled);
        assert!(!docs.parallelization_enabled);
        assert_eq!(docs.sla_seconds, 300);
    }
}
