//! Filesystem-backed [`SegmentWriter`] and the `folder` [`Output`] driver
//! (§4.8 "folder output"): every HLS file lands as a plain file under a
//! configured directory.

use std::fs;
use std::path::{Path, PathBuf};

use hls_engine::{HlsOpenConfig, SegmentWriter};
use pipeline_core::{StageError, StageResult};

use crate::{HlsOutput, WriterConfig};

#[derive(Debug, thiserror::Error)]
pub enum FolderError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Writes segments/playlists as plain files under `root`, creating it (and
/// any missing parents) on first use. `root` defaults to the empty relative
/// path (the process's current directory) until `config("root", ...)` sets
/// one explicitly.
#[derive(Default)]
pub struct FolderWriter {
    root: PathBuf,
}

impl FolderWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

impl SegmentWriter for FolderWriter {
    type Error = FolderError;

    fn write(&mut self, filename: &str, bytes: &[u8], _mime: &str) -> Result<(), Self::Error> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)
                .map_err(|source| FolderError::Io { path: self.root.display().to_string(), source })?;
        }
        let path = self.path_for(filename);
        // Atomic-ish replace: write to a sibling temp file then rename, so a
        // playlist reader never observes a half-written file (§4.8 item 5).
        let tmp = tmp_path(&path);
        fs::write(&tmp, bytes).map_err(|source| FolderError::Io { path: tmp.display().to_string(), source })?;
        fs::rename(&tmp, &path).map_err(|source| FolderError::Io { path: path.display().to_string(), source })?;
        Ok(())
    }

    fn delete(&mut self, filename: &str) -> Result<(), Self::Error> {
        let path = self.path_for(filename);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FolderError::Io { path: path.display().to_string(), source }),
        }
    }
}

impl WriterConfig for FolderWriter {
    fn configure(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "root" => {
                self.root = PathBuf::from(value);
                Ok(())
            }
            other => Err(StageError::config("folder", format!("unknown key {other}"))),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub type FolderOutput = HlsOutput<FolderWriter>;

impl FolderOutput {
    pub fn at(root: impl Into<PathBuf>, cfg: HlsOpenConfig) -> Self {
        HlsOutput::new("folder", FolderWriter::new(root), cfg)
    }

    /// Zero-arg constructor for the stage registry (§5); `root` arrives
    /// later via `config("root", ...)`.
    pub fn create() -> Self {
        HlsOutput::create("folder")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_delete_round_trips() {
        let dir = std::env::temp_dir().join(format!("icecast-hls-outputs-test-{}", std::process::id()));
        let mut w = FolderWriter::new(&dir);
        w.write("a.txt", b"hello", "text/plain").unwrap();
        assert_eq!(fs::read(dir.join("a.txt")).unwrap(), b"hello");
        w.delete("a.txt").unwrap();
        assert!(!dir.join("a.txt").exists());
        w.delete("a.txt").unwrap();
        let _ = fs::remove_dir_all(&dir);
    }
}
