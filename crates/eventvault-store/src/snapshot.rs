//! Filesystem snapshot export of the committed event history.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use eventvault_core::{EventCollection, IndexError, SnapshotExporter};

/// File name of the exported dataset inside the snapshot directory.
pub const SNAPSHOT_FILE: &str = "events.json";

/// Writes the committed collection to `<dir>/events.json` after every
/// successful commit, creating the directory if absent. Best-effort: the
/// store commit is the authoritative state.
pub struct FileSnapshotExporter {
    dir: PathBuf,
}

impl FileSnapshotExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Full path of the snapshot file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }
}

#[async_trait]
impl SnapshotExporter for FileSnapshotExporter {
    async fn export(&self, collection: &EventCollection) -> Result<(), IndexError> {
        let serialized = serde_json::to_vec(collection)
            .map_err(|e| IndexError::Export(format!("serialize snapshot: {e}")))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| export_io_error(&self.dir, e))?;
        let path = self.path();
        tokio::fs::write(&path, serialized)
            .await
            .map_err(|e| export_io_error(&path, e))?;

        tracing::debug!(path = %path.display(), events = collection.total(), "snapshot written");
        Ok(())
    }
}

fn export_io_error(path: &Path, err: std::io::Error) -> IndexError {
    IndexError::Export(format!("{}: {err}", path.display()))
}
