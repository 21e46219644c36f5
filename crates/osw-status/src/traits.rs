use osw_core::{ChangeId, Checkpoint, RunStatus};
use thiserror::Error;

/// A checkpoint write that does not durably land must stop the run: the
/// orchestrator may not advance past a stage it cannot prove completed.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("checkpoint io for '{change_id}': {source}")]
    Io {
        change_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint for '{change_id}' is corrupt: {source}")]
    Corrupt {
        change_id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait StatusStore: Send + Sync {
    /// Atomic overwrite; readers never observe a partial record.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StatusError>;

    fn load(&self, change_id: &ChangeId) -> Result<Option<Checkpoint>, StatusError>;

    fn delete(&self, change_id: &ChangeId) -> Result<(), StatusError>;
}

/// A checkpoint left in `InProgress` belongs to a run whose process died
/// (this process has not started any stages yet), so it is resumable.
pub fn is_incomplete(checkpoint: &Checkpoint) -> bool {
    checkpoint.status == RunStatus::InProgress
}
