//! The HEAD marker: which macro, if any, is being recorded right now.

use std::fs;
use std::path::PathBuf;

use crate::error::{MacroError, Result};

/// A single slot, not a set. Only one recording can be in flight.
pub trait RecordingTracker {
    fn read(&self) -> Result<Option<String>>;
    fn write(&mut self, name: &str) -> Result<()>;
    fn remove(&mut self) -> Result<()>;

    fn start_recording(&mut self, name: &str) -> Result<()> {
        if let Some(active) = self.read()? {
            return Err(MacroError::RecordingInProgress { name: active });
        }
        self.write(name)
    }

    fn current_recording(&self) -> Result<Option<String>> {
        self.read()
    }

    /// No-op when nothing is being recorded.
    fn clear_recording(&mut self) -> Result<()> {
        self.remove()
    }
}

/// `HEAD` file whose whole content is the macro name.
pub struct HeadFile {
    path: PathBuf,
}

impl HeadFile {
    pub fn new(path: PathBuf) -> Self {
        HeadFile { path }
    }
}

impl RecordingTracker for HeadFile {
    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let name = fs::read_to_string(&self.path)?.trim().to_string();
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    fn write(&mut self, name: &str) -> Result<()> {
        fs::write(&self.path, name)?;
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryHead {
    pub name: Option<String>,
}

#[cfg(test)]
impl RecordingTracker for MemoryHead {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.name.clone())
    }

    fn write(&mut self, name: &str) -> Result<()> {
        self.name = Some(name.to_string());
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        self.name = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_start_conflicts_until_cleared() {
        let mut head = MemoryHead::default();

        head.start_recording("x").unwrap();
        match head.start_recording("y") {
            Err(MacroError::RecordingInProgress { name }) => assert_eq!(name, "x"),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(head.current_recording().unwrap().as_deref(), Some("x"));

        head.clear_recording().unwrap();
        head.start_recording("y").unwrap();
        assert_eq!(head.current_recording().unwrap().as_deref(), Some("y"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut head = MemoryHead::default();
        head.clear_recording().unwrap();
        head.clear_recording().unwrap();
        assert!(head.current_recording().unwrap().is_none());
    }

    #[test]
    fn test_head_file_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("HEAD");
        let mut head = HeadFile::new(path.clone());

        assert!(head.current_recording().unwrap().is_none());
        head.start_recording("deploy").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "deploy");

        let reopened = HeadFile::new(path.clone());
        assert_eq!(reopened.current_recording().unwrap().as_deref(), Some("deploy"));

        head.clear_recording().unwrap();
        assert!(!path.exists());
        head.clear_recording().unwrap();
    }

    #[test]
    fn test_blank_head_file_means_no_recording() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("HEAD");
        fs::write(&path, "\n").unwrap();

        let mut head = HeadFile::new(path);
        assert!(head.current_recording().unwrap().is_none());
        head.start_recording("x").unwrap();
    }
}
