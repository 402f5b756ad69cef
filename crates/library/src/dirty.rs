//! Durable dirty marker. Existence of the file, not its contents, means
//! "tags changed since the host's media index was last reset". The engine
//! only ever marks; clearing belongs to the external reset command.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub const DIRTY_MARKER_FILE: &str = "metadata.dirty";

#[derive(Clone, Debug)]
pub struct DirtyMarker {
    path: PathBuf,
}

impl DirtyMarker {
    pub fn new(state_dir: &Path) -> DirtyMarker {
        DirtyMarker {
            path: state_dir.join(DIRTY_MARKER_FILE),
        }
    }

    pub fn default_state_dir() -> PathBuf {
        match dirs::data_local_dir() {
            Some(dir) => dir.join("tagtidy"),
            None => PathBuf::from(".tagtidy"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Idempotently creates the zero-byte marker file.
    pub fn mark(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)?;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.path.exists()
    }

    /// Removes the marker; absence is not an error.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DirtyMarker, DIRTY_MARKER_FILE};

    #[test]
    fn mark_is_idempotent_and_zero_byte() {
        let dir = tempfile::tempdir().unwrap();
        let marker = DirtyMarker::new(dir.path());
        assert!(!marker.is_dirty());

        marker.mark().unwrap();
        marker.mark().unwrap();
        assert!(marker.is_dirty());
        let len = std::fs::metadata(dir.path().join(DIRTY_MARKER_FILE))
            .unwrap()
            .len();
        assert_eq!(len, 0);
    }

    #[test]
    fn mark_creates_missing_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep").join("state");
        let marker = DirtyMarker::new(&nested);
        marker.mark().unwrap();
        assert!(marker.is_dirty());
    }

    #[test]
    fn clear_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let marker = DirtyMarker::new(dir.path());
        marker.clear().unwrap();

        marker.mark().unwrap();
        marker.clear().unwrap();
        assert!(!marker.is_dirty());
    }
}
