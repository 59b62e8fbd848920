use std::path::{Path, PathBuf};

use tracing::info;

use crate::StorageError;

/// Periodic whole-database copies for disaster recovery. Snapshots are
/// self-contained `snapshot_<tick>.db` files kept under a rolling window;
/// normal startup never reads them.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    keep: usize,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
        }
    }

    pub fn snapshot_path(&self, tick: u64) -> PathBuf {
        self.dir.join(format!("snapshot_{tick}.db"))
    }

    /// Copies the checkpointed database file and prunes old snapshots. The
    /// caller must have flushed the WAL first.
    pub fn create(&self, database_path: &Path, tick: u64) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.snapshot_path(tick);
        std::fs::copy(database_path, &target)?;
        info!(tick, path = %target.display(), "wrote database snapshot");
        self.prune()?;
        Ok(target)
    }

    /// Snapshots ordered by tick, oldest first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, StorageError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(tick) = name
                .strip_prefix("snapshot_")
                .and_then(|rest| rest.strip_suffix(".db"))
                .and_then(|digits| digits.parse::<u64>().ok())
            else {
                continue;
            };
            snapshots.push((tick, entry.path()));
        }
        snapshots.sort_by_key(|(tick, _)| *tick);
        Ok(snapshots)
    }

    pub fn latest(&self) -> Result<Option<(u64, PathBuf)>, StorageError> {
        Ok(self.list()?.pop())
    }

    fn prune(&self) -> Result<(), StorageError> {
        let snapshots = self.list()?;
        if snapshots.len() <= self.keep {
            return Ok(());
        }
        for (tick, path) in &snapshots[..snapshots.len() - self.keep] {
            std::fs::remove_file(path)?;
            info!(tick, "pruned old snapshot");
        }
        Ok(())
    }
}
