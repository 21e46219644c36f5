use std::collections::HashMap;
use std::sync::Mutex;

use osw_core::{ChangeId, Checkpoint};

use crate::traits::{StatusError, StatusStore};

/// In-memory store for tests. Not durable, but exercises the same trait
/// the orchestrator runs against.
#[derive(Default)]
pub struct MemoryStatusStore {
    inner: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves observed; used to assert checkpoint-per-stage
    /// behavior.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusStore for MemoryStatusStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StatusError> {
        self.inner
            .lock()
            .unwrap()
            .insert(checkpoint.change_id.as_str().to_string(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, change_id: &ChangeId) -> Result<Option<Checkpoint>, StatusError> {
        Ok(self.inner.lock().unwrap().get(change_id.as_str()).cloned())
    }

    fn delete(&self, change_id: &ChangeId) -> Result<(), StatusError> {
        self.inner.lock().unwrap().remove(change_id.as_str());
        Ok(())
    }
}
