//! Stdin input driver (§4.2). `std::io::stdin()` already hands back a
//! handle to one process-wide locked buffer, so the "singleton" property
//! the spec calls out falls out of the standard library for free — this
//! driver just holds the handle rather than re-acquiring it per read.

use std::io::{Read as _, Stdin};

use pipeline_core::{StageError, StageResult};
use tagmodel::TagList;

use super::Input;

#[derive(Default)]
pub struct StdinInput {
    handle: Option<Stdin>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Input for StdinInput {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn config(&mut self, key: &str, _value: &str) -> StageResult {
        Err(StageError::config("input.stdin", format!("unknown key {key}")))
    }

    fn open(&mut self) -> StageResult {
        self.handle = Some(std::io::stdin());
        Ok(())
    }

    fn read(&mut self, dest: &mut [u8]) -> StageResult<usize> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(StageError::lifecycle("input.stdin", "read before open"));
        };
        match handle.read(dest) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(StageError::with_source(pipeline_core::ErrorKind::Format, "input.stdin", "read failed", e)),
        }
    }

    fn take_tags(&mut self) -> TagList {
        TagList::new()
    }

    fn close(&mut self) -> StageResult {
        self.handle = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_config_key_rejected() {
        let mut input = StdinInput::new();
        assert!(input.config("path", "x").is_err());
    }

    #[test]
    fn read_before_open_is_lifecycle_error() {
        let mut input = StdinInput::new();
        let mut buf = [0u8; 4];
        assert!(input.read(&mut buf).is_err());
    }
}
