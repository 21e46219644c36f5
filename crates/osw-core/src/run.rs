use serde::{Deserialize, Serialize};

use crate::ids::{AttemptId, ChangeId};
use crate::lane::{LaneConfig, LaneName};
use crate::stage::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Complete,
    Failed,
    TimedOut,
}

/// Durable record of a workflow run. This is both the in-memory state and
/// the on-disk checkpoint; the file is the source of truth because the
/// controlling process may die between CLI invocations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub change_id: ChangeId,
    pub title: String,
    pub owner: String,
    pub lane: LaneName,
    /// Regenerated on every attempt (fresh start or resume).
    pub attempt_id: AttemptId,
    pub status: RunStatus,
    /// Index of the most recently completed stage. Non-decreasing for the
    /// lifetime of the run.
    pub current_stage: usize,
    /// Append-only, kept sorted ascending.
    pub stages_completed: Vec<usize>,
    pub start_unix: i64,
    pub last_update_unix: i64,
    pub sla_seconds: u64,
    /// Derived on each update; stored so the file is inspectable as-is.
    pub progress_percent: u8,
    pub remaining_seconds: i64,
}

impl Checkpoint {
    pub fn new(change_id: ChangeId, title: &str, owner: &str, lane: &LaneConfig, now_unix: i64) -> Self {
        Self {
            change_id,
            title: title.to_string(),
            owner: owner.to_string(),
            lane: lane.name,
            attempt_id: AttemptId::new(),
            status: RunStatus::InProgress,
            current_stage: 0,
            stages_completed: Vec::new(),
            start_unix: now_unix,
            last_update_unix: now_unix,
            sla_seconds: lane.sla_seconds,
            progress_percent: 0,
            remaining_seconds: lane.sla_seconds as i64,
        }
    }

    pub fn elapsed_seconds(&self, now_unix: i64) -> i64 {
        (now_unix - self.start_unix).max(0)
    }

    pub fn sla_breached(&self, now_unix: i64) -> bool {
        self.elapsed_seconds(now_unix) > self.sla_seconds as i64
    }

    /// Record a completed stage. Keeps `current_stage` monotone and the
    /// completed set sorted/deduplicated, and recomputes derived fields.
    /// `lane_stage_count` is the size of the lane's stage set, so progress
    /// reflects the lane plan rather than the full 13-stage table.
    pub fn record_stage(&mut self, stage: Stage, lane_stage_count: usize, now_unix: i64) {
        let idx = stage.index();
        if !self.stages_completed.contains(&idx) {
            self.stages_completed.push(idx);
            self.stages_completed.sort_unstable();
        }
        self.current_stage = self.current_stage.max(idx);
        self.last_update_unix = now_unix;
        let done = self.stages_completed.len();
        let total = lane_stage_count.max(1);
        self.progress_percent = ((done * 100) / total).min(100) as u8;
        self.remaining_seconds = self.sla_seconds as i64 - self.elapsed_seconds(now_unix);
        if self.sla_breached(now_unix) && self.status == RunStatus::InProgress {
            self.status = RunStatus::TimedOut;
        }
    }

    pub fn mark(&mut self, status: RunStatus, now_unix: i64) {
        self.status = status;
        self.last_update_unix = now_unix;
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::InProgress
    }

    pub fn is_stage_done(&self, stage: Stage) -> bool {
        self.stages_completed.contains(&stage.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        Checkpoint::new(
            ChangeId::from_str("update-readme"),
            "Update README",
            "dev",
            LaneConfig::get(LaneName::Standard),
            1_000,
        )
    }

    #[test]
    fn current_stage_is_monotone() {
        let mut cp = checkpoint();
        cp.record_stage(Stage::Proposal, 13, 1_010);
        assert_eq!(cp.current_stage, 2);
        // Band results can arrive for already-accounted stages; the high
        // water mark must not regress.
        cp.record_stage(Stage::Setup, 13, 1_020);
        assert_eq!(cp.current_stage, 2);
        cp.record_stage(Stage::Verification, 13, 1_030);
        assert_eq!(cp.current_stage, 9);
    }

    #[test]
    fn stages_completed_stays_sorted_and_unique() {
        let mut cp = checkpoint();
        cp.record_stage(Stage::SpecDefinition, 13, 1_010);
        cp.record_stage(Stage::Setup, 13, 1_020);
        cp.record_stage(Stage::SpecDefinition, 13, 1_030);
        assert_eq!(cp.stages_completed, vec![0, 3]);
    }

    #[test]
    fn progress_uses_lane_stage_count() {
        let mut cp = checkpoint();
        cp.record_stage(Stage::Setup, 10, 1_010);
        assert_eq!(cp.progress_percent, 10);
        for s in [
            Stage::VersionBump,
            Stage::Proposal,
            Stage::SpecDefinition,
            Stage::TaskBreakdown,
        ] {
            cp.record_stage(s, 10, 1_020);
        }
        assert_eq!(cp.progress_percent, 50);
    }

    #[test]
    fn sla_breach_flips_status_but_is_advisory() {
        let mut cp = checkpoint();
        assert!(!cp.sla_breached(1_000 + 900));
        assert!(cp.sla_breached(1_000 + 901));
        cp.record_stage(Stage::Setup, 13, 1_000 + 901);
        assert_eq!(cp.status, RunStatus::TimedOut);
        // Further progress is still recorded.
        cp.record_stage(Stage::VersionBump, 13, 1_000 + 950);
        assert_eq!(cp.stages_completed, vec![0, 1]);
        assert!(cp.remaining_seconds < 0);
    }

    #[test]
    fn terminal_states() {
        let mut cp = checkpoint();
        assert!(!cp.is_terminal());
        cp.mark(RunStatus::Failed, 1_100);
        assert!(cp.is_terminal());
    }
}
