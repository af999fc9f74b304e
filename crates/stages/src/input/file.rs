//! File input driver (§4.2).

use std::fs::File;
use std::io::Read as _;

use pipeline_core::{StageError, StageResult};
use tagmodel::TagList;

use super::Input;

#[derive(Default)]
pub struct FileInput {
    path: Option<String>,
    file: Option<File>,
}

impl FileInput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Input for FileInput {
    fn name(&self) -> &'static str {
        "file"
    }

    fn config(&mut self, key: &str, value: &str) -> StageResult {
        match key {
            "path" => {
                self.path = Some(value.to_string());
                Ok(())
            }
            other => Err(StageError::config("input.file", format!("unknown key {other}"))),
        }
    }

    fn open(&mut self) -> StageResult {
        let path = self.path.as_deref().ok_or_else(|| StageError::config("input.file", "missing path"))?;
        let file = File::open(path)
            .map_err(|e| StageError::with_source(pipeline_core::ErrorKind::Format, "input.file", "open failed", e))?;
        self.file = Some(file);
        Ok(())
    }

    fn read(&mut self, dest: &mut [u8]) -> StageResult<usize> {
        let Some(file) = self.file.as_mut() else {
            return Err(StageError::lifecycle("input.file", "read before open"));
        };
        match file.read(dest) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(StageError::with_source(pipeline_core::ErrorKind::Format, "input.file", "read failed", e)),
        }
    }

    fn take_tags(&mut self) -> TagList {
        TagList::new()
    }

    fn close(&mut self) -> StageResult {
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bytes_from_configured_path() {
        let mut path = std::env::temp_dir();
        path.push(format!("icecast-hls-file-input-test-{}.bin", std::process::id()));
        std::fs::write(&path, b"hello-audio-bytes").unwrap();

        let mut input = FileInput::new();
        input.config("path", path.to_str().unwrap()).unwrap();
        input.open().unwrap();
        let mut buf = [0u8; 5];
        let n = input.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");

        input.close().unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn read_before_open_is_lifecycle_error() {
        let mut input = FileInput::new();
        let mut buf = [0u8; 4];
        assert!(input.read(&mut buf).is_err());
    }
}
