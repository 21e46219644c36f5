use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use osw_core::Stage;

use crate::context::StageContext;
use crate::stages::StageTable;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BandTaskError {
    TimedOut { timeout_secs: u64 },
    Failed { detail: String },
}

impl std::fmt::Display for BandTaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BandTaskError::TimedOut { timeout_secs } => {
                write!(f, "stage exceeded the {timeout_secs}s task timeout")
            }
            BandTaskError::Failed { detail } => write!(f, "{detail}"),
        }
    }
}

pub type BandResult = Vec<(Stage, Result<String, BandTaskError>)>;

/// Run the stages of one band on a fixed-size worker pool.
///
/// Every stage is attempted even when a sibling fails; the caller decides
/// what a partial failure means for the run. Results come back ordered by
/// stage index regardless of completion order.
pub fn run_band(
    table: Arc<StageTable>,
    ctx: Arc<StageContext>,
    stages: &[Stage],
    workers: usize,
    task_timeout: Duration,
) -> BandResult {
    let queue: Arc<Mutex<VecDeque<Stage>>> = Arc::new(Mutex::new(stages.iter().copied().collect()));
    let results: Arc<Mutex<BandResult>> = Arc::new(Mutex::new(Vec::new()));
    let pool_size = workers.max(1).min(stages.len().max(1));

    let mut handles = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        let queue = Arc::clone(&queue);
        let results = Arc::clone(&results);
        let table = Arc::clone(&table);
        let ctx = Arc::clone(&ctx);
        handles.push(thread::spawn(move || loop {
            let stage = match queue.lock().ok().and_then(|mut q| q.pop_front()) {
                Some(s) => s,
                None => break,
            };
            info!(stage = %stage, "band task starting");
            let outcome = run_one(Arc::clone(&table), Arc::clone(&ctx), stage, task_timeout);
            match &outcome {
                Ok(detail) => info!(stage = %stage, detail, "band task done"),
                Err(err) => warn!(stage = %stage, error = %err, "band task failed"),
            }
            if let Ok(mut r) = results.lock() {
                r.push((stage, outcome));
            }
        }));
    }
    for handle in handles {
        let _ = handle.join();
    }

    let mut out = match Arc::try_unwrap(results) {
        Ok(m) => m.into_inner().unwrap_or_default(),
        Err(shared) => shared.lock().map(|r| r.clone()).unwrap_or_default(),
    };
    out.sort_by_key(|(stage, _)| stage.index());
    out
}

/// One band task with its own deadline. The handler runs on a detached
/// thread so a wedged subprocess cannot hold the worker; on timeout the
/// band reports the breach and the orchestrator halts the run.
fn run_one(
    table: Arc<StageTable>,
    ctx: Arc<StageContext>,
    stage: Stage,
    timeout: Duration,
) -> Result<String, BandTaskError> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(table.run(stage, &ctx));
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(detail)) => Ok(detail),
        Ok(Err(err)) => Err(BandTaskError::Failed { detail: format!("{err:#}") }),
        Err(RecvTimeoutError::Timeout) => Err(BandTaskError::TimedOut {
            timeout_secs: timeout.as_secs(),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(BandTaskError::Failed {
            detail: "stage task aborted before reporting a result".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    use osw_core::ChangeId;
    use osw_tools::ScriptedTools;

    use crate::config::Config;
    use crate::context::RunOptions;
    use crate::stages::StageHandler;

    struct Echo(&'static str);
    impl StageHandler for Echo {
        fn run(&self, _ctx: &StageContext) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Boom;
    impl StageHandler for Boom {
        fn run(&self, _ctx: &StageContext) -> anyhow::Result<String> {
            Err(anyhow!("scripted failure"))
        }
    }

    struct Sleepy(Duration);
    impl StageHandler for Sleepy {
        fn run(&self, _ctx: &StageContext) -> anyhow::Result<String> {
            thread::sleep(self.0);
            Ok("late".to_string())
        }
    }

    fn ctx() -> Arc<StageContext> {
        let opts = RunOptions::new(ChangeId::from_str("band-test"), "Band", "dev");
        Arc::new(StageContext::new(
            std::env::temp_dir(),
            Config::default_for_repo(),
            opts,
            Arc::new(ScriptedTools::new()),
        ))
    }

    fn band_stages() -> Vec<Stage> {
        vec![
            Stage::Proposal,
            Stage::SpecDefinition,
            Stage::TaskBreakdown,
            Stage::TestPlan,
            Stage::Scripts,
        ]
    }

    fn echo_table() -> StageTable {
        let mut table = StageTable::empty();
        for stage in band_stages() {
            table.set(stage, Box::new(Echo(stage.name())));
        }
        table
    }

    #[test]
    fn all_band_stages_run_and_results_are_ordered() {
        let results = run_band(
            Arc::new(echo_table()),
            ctx(),
            &band_stages(),
            3,
            Duration::from_secs(5),
        );
        assert_eq!(results.len(), 5);
        let order: Vec<usize> = results.iter().map(|(s, _)| s.index()).collect();
        assert_eq!(order, vec![2, 3, 4, 5, 6]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[test]
    fn sibling_failure_does_not_cancel_the_rest() {
        let mut table = echo_table();
        table.set(Stage::TaskBreakdown, Box::new(Boom));
        let results = run_band(
            Arc::new(table),
            ctx(),
            &band_stages(),
            3,
            Duration::from_secs(5),
        );
        let failed: Vec<&Stage> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(s, _)| s)
            .collect();
        assert_eq!(failed, vec![&Stage::TaskBreakdown]);
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 4);
    }

    #[test]
    fn slow_task_times_out_without_stalling_the_band() {
        let mut table = echo_table();
        table.set(Stage::TestPlan, Box::new(Sleepy(Duration::from_secs(10))));
        let results = run_band(
            Arc::new(table),
            ctx(),
            &band_stages(),
            3,
            Duration::from_millis(100),
        );
        let (_, test_plan) = results
            .iter()
            .find(|(s, _)| *s == Stage::TestPlan)
            .unwrap();
        assert!(matches!(test_plan, Err(BandTaskError::TimedOut { .. })));
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 4);
    }

    #[test]
    fn single_worker_pool_still_completes_every_stage() {
        let results = run_band(
            Arc::new(echo_table()),
            ctx(),
            &band_stages(),
            1,
            Duration::from_secs(5),
        );
        assert_eq!(results.len(), 5);
    }
}
