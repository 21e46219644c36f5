use crate::lane::LaneConfig;
use crate::run::Checkpoint;
use crate::stage::Stage;

/// One schedulable unit of the run: either a single stage executed inline
/// or a band of stages dispatched to the worker pool together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Batch {
    Single(Stage),
    Band(Vec<Stage>),
}

impl Batch {
    pub fn stages(&self) -> &[Stage] {
        match self {
            Batch::Single(s) => std::slice::from_ref(s),
            Batch::Band(v) => v,
        }
    }
}

/// Remaining stages for this run: the lane's stage set minus anything the
/// checkpoint already records as completed. Order is always canonical.
pub fn stages_to_run(lane: &LaneConfig, resume_from: Option<&Checkpoint>) -> Vec<Stage> {
    lane.stages()
        .iter()
        .copied()
        .filter(|s| match resume_from {
            Some(cp) => !cp.is_stage_done(*s),
            None => true,
        })
        .collect()
}

/// Restrict a plan to an explicit index range (the step-selection debug
/// flags). The lane's stage membership still applies.
pub fn restrict_to_range(stages: &[Stage], from: usize, to: usize) -> Vec<Stage> {
    stages
        .iter()
        .copied()
        .filter(|s| s.index() >= from && s.index() <= to)
        .collect()
}

/// Group a stage list into batches. Contiguous parallel-band stages are
/// collapsed into one `Band` batch when the lane allows it (and the
/// no-parallel debug flag is not set); everything else runs inline.
pub fn into_batches(stages: &[Stage], parallel: bool) -> Vec<Batch> {
    let mut out = Vec::new();
    let mut band: Vec<Stage> = Vec::new();
    for stage in stages.iter().copied() {
        if parallel && stage.in_parallel_band() {
            band.push(stage);
            continue;
        }
        if !band.is_empty() {
            out.push(flush_band(std::mem::take(&mut band)));
        }
        out.push(Batch::Single(stage));
    }
    if !band.is_empty() {
        out.push(flush_band(band));
    }
    out
}

fn flush_band(band: Vec<Stage>) -> Batch {
    // A band of one gains nothing from the pool.
    if band.len() == 1 {
        Batch::Single(band[0])
    } else {
        Batch::Band(band)
    }
}
