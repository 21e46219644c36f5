use std::path::{Path, PathBuf};
use std::sync::Mutex;

use osw_core::{ChangeId, Checkpoint};
use tracing::debug;

use crate::traits::{StatusError, StatusStore};

/// One JSON checkpoint file per change id under a well-known state
/// directory. Writes go to a temp file in the same directory and are
/// renamed into place, so a crash mid-write can never truncate the
/// previous checkpoint. A single writer lock serializes updates arriving
/// from concurrent band completions.
pub struct FsStatusStore {
    state_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsStatusStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir, write_lock: Mutex::new(()) }
    }

    pub fn open(repo_root: &Path) -> Self {
        Self::new(repo_root.join(".openspec").join("state"))
    }

    pub fn checkpoint_path(&self, change_id: &ChangeId) -> PathBuf {
        self.state_dir.join(format!("{}.json", change_id.as_str()))
    }

    fn io_err(change_id: &ChangeId, source: std::io::Error) -> StatusError {
        StatusError::Io { change_id: change_id.as_str().to_string(), source }
    }
}

impl StatusStore for FsStatusStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StatusError> {
        let _guard = self.write_lock.lock().unwrap();
        let change_id = &checkpoint.change_id;
        std::fs::create_dir_all(&self.state_dir).map_err(|e| Self::io_err(change_id, e))?;

        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|e| StatusError::Corrupt {
            change_id: change_id.as_str().to_string(),
            source: e,
        })?;

        let tmp = tempfile::NamedTempFile::new_in(&self.state_dir)
            .map_err(|e| Self::io_err(change_id, e))?;
        std::io::Write::write_all(&mut tmp.as_file(), &bytes)
            .map_err(|e| Self::io_err(change_id, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Self::io_err(change_id, e))?;
        tmp.persist(self.checkpoint_path(change_id))
            .map_err(|e| Self::io_err(change_id, e.error))?;
        debug!(change_id = change_id.as_str(), stage = checkpoint.current_stage, "checkpoint saved");
        Ok(())
    }

    fn load(&self, change_id: &ChangeId) -> Result<Option<Checkpoint>, StatusError> {
        let path = self.checkpoint_path(change_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_err(change_id, e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StatusError::Corrupt {
                change_id: change_id.as_str().to_string(),
                source: e,
            })
    }

    fn delete(&self, change_id: &ChangeId) -> Result<(), StatusError> {
        match std::fs::remove_file(self.checkpoint_path(change_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(change_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::is_incomplete;
    use osw_core::{LaneConfig, LaneName, RunStatus, Stage};

    fn checkpoint(id: &str) -> Checkpoint {
        Checkpoint::new(
            ChangeId::from_str(id),
            "Title",
            "owner",
            LaneConfig::get(LaneName::Standard),
            1_000,
        )
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatusStore::new(dir.path().to_path_buf());
        let mut cp = checkpoint("add-auth");
        cp.record_stage(Stage::Setup, 13, 1_010);
        store.save(&cp).unwrap();

        let loaded = store.load(&ChangeId::from_str("add-auth")).unwrap().unwrap();
        assert_eq!(loaded.stages_completed, vec![0]);
        assert_eq!(loaded.current_stage, 0);
        assert!(is_incomplete(&loaded));
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatusStore::new(dir.path().to_path_buf());
        assert!(store.load(&ChangeId::from_str("nope")).unwrap().is_none());
    }

    #[test]
    fn overwrite_replaces_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatusStore::new(dir.path().to_path_buf());
        let mut cp = checkpoint("xyz");
        store.save(&cp).unwrap();
        cp.record_stage(Stage::Setup, 13, 1_010);
        cp.record_stage(Stage::VersionBump, 13, 1_020);
        cp.mark(RunStatus::Complete, 1_030);
        store.save(&cp).unwrap();

        let loaded = store.load(&ChangeId::from_str("xyz")).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Complete);
        assert_eq!(loaded.stages_completed, vec![0, 1]);
    }

    #[test]
    fn file_is_human_inspectable_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatusStore::new(dir.path().to_path_buf());
        store.save(&checkpoint("readable")).unwrap();
        let raw = std::fs::read_to_string(store.checkpoint_path(&ChangeId::from_str("readable")))
            .unwrap();
        assert!(raw.contains("\"change_id\""));
        assert!(raw.contains("\"in_progress\""));
        assert!(raw.contains('\n'), "pretty-printed for manual debugging");
    }

    #[test]
    fn corrupt_file_is_reported_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatusStore::new(dir.path().to_path_buf());
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(store.checkpoint_path(&ChangeId::from_str("bad")), "{ nope").unwrap();
        let err = store.load(&ChangeId::from_str("bad")).unwrap_err();
        assert!(matches!(err, StatusError::Corrupt { .. }));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatusStore::new(dir.path().to_path_buf());
        store.save(&checkpoint("gone")).unwrap();
        store.delete(&ChangeId::from_str("gone")).unwrap();
        store.delete(&ChangeId::from_str("gone")).unwrap();
        assert!(store.load(&ChangeId::from_str("gone")).unwrap().is_none());
    }

    #[test]
    fn concurrent_saves_keep_a_consistent_file() {
        use std::sync::Arc;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStatusStore::new(dir.path().to_path_buf()));
        let mut handles = Vec::new();
        for i in 0..4u8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let mut cp = checkpoint("racy");
                cp.record_stage(Stage::from_index(2 + i as usize).unwrap(), 13, 1_010);
                store.save(&cp).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // Whichever write won, the file parses and is a full record.
        let loaded = store.load(&ChangeId::from_str("racy")).unwrap().unwrap();
        assert_eq!(loaded.stages_completed.len(), 1);
    }
}
