//! Recovering recorded commands from the shell history log.
//!
//! Entries look like zsh extended history, `: <epoch>:<duration>;<command>`.
//! A recording is the window between the most recent `tm new <name>` line
//! and the first `tm save` line after it.
//!
//! Matching is a plain substring search over the whole log, so a name that
//! is a prefix of another (`dep` vs `deploy`) can select the wrong window
//! when the longer name was recorded more recently.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{MacroError, Result};

pub const PROGRAM: &str = "tm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub command: String,
}

pub trait HistorySource {
    fn read_log(&self) -> Result<String>;
}

pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: PathBuf) -> Self {
        HistoryFile { path }
    }
}

impl HistorySource for HistoryFile {
    fn read_log(&self) -> Result<String> {
        if !self.path.exists() {
            return Err(MacroError::HistoryUnavailable {
                path: self.path.clone(),
            });
        }
        // zsh metafies non-ASCII bytes, so the file is not always valid UTF-8.
        let bytes = fs::read(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub fn start_token(name: &str) -> String {
    format!("{PROGRAM} new {name}")
}

pub fn end_token() -> String {
    format!("{PROGRAM} save")
}

pub fn extract_commands(name: &str, log: &str) -> Result<Vec<HistoryEntry>> {
    let lines: Vec<&str> = log.lines().collect();
    let start = start_token(name);
    let end = end_token();

    let start_index = lines
        .iter()
        .rposition(|line| line.contains(&start))
        .ok_or_else(|| MacroError::StartMarkerNotFound {
            name: name.to_string(),
        })?;

    let end_index = lines[start_index + 1..]
        .iter()
        .position(|line| line.contains(&end))
        .map(|offset| start_index + 1 + offset)
        .ok_or_else(|| MacroError::IncompleteSession {
            name: name.to_string(),
        })?;

    tracing::debug!(
        macro_name = name,
        start = start_index,
        end = end_index,
        "Recording window located"
    );

    Ok(lines[start_index + 1..end_index]
        .iter()
        .filter_map(|line| parse_entry(line))
        .collect())
}

fn parse_entry(line: &str) -> Option<HistoryEntry> {
    let (metadata, command) = line.split_once(';')?;
    Some(HistoryEntry {
        timestamp: parse_timestamp(metadata),
        command: command.trim().to_string(),
    })
}

fn parse_timestamp(metadata: &str) -> Option<DateTime<Utc>> {
    let epoch = metadata.trim().trim_start_matches(':').trim().split(':').next()?;
    DateTime::from_timestamp(epoch.trim().parse().ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commands(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.command.as_str()).collect()
    }

    #[test]
    fn test_extracts_between_markers() {
        let log = "\
: 1700000000:0;tm new x
: 1700000001:0;cmd1
: 1700000002:0;cmd2
: 1700000003:0;tm save
: 1700000004:0;unrelated
";
        let entries = extract_commands("x", log).unwrap();
        assert_eq!(commands(&entries), vec!["cmd1", "cmd2"]);
        assert_eq!(
            entries[0].timestamp,
            DateTime::from_timestamp(1_700_000_001, 0)
        );
    }

    #[test]
    fn test_most_recent_start_wins() {
        let log = "\
: 1:0;tm new x
: 2:0;old command
: 3:0;tm save
: 4:0;tm new x
: 5:0;new command
: 6:0;tm save
";
        let entries = extract_commands("x", log).unwrap();
        assert_eq!(commands(&entries), vec!["new command"]);
    }

    #[test]
    fn test_first_end_after_start_wins() {
        let log = "\
: 1:0;tm new x
: 2:0;first
: 3:0;tm save
: 4:0;second
: 5:0;tm save
";
        let entries = extract_commands("x", log).unwrap();
        assert_eq!(commands(&entries), vec!["first"]);
    }

    #[test]
    fn test_end_before_start_is_ignored() {
        let log = "\
: 1:0;tm save
: 2:0;tm new x
: 3:0;echo hi
";
        assert!(matches!(
            extract_commands("x", log),
            Err(MacroError::IncompleteSession { .. })
        ));
    }

    #[test]
    fn test_missing_start_marker() {
        let log = ": 1:0;ls\n: 2:0;tm save\n";
        assert!(matches!(
            extract_commands("x", log),
            Err(MacroError::StartMarkerNotFound { .. })
        ));
    }

    #[test]
    fn test_lines_without_delimiter_are_skipped() {
        let log = "\
: 1:0;tm new x
garbage line
: 2:0;echo a; echo b
: 3:0;tm save
";
        let entries = extract_commands("x", log).unwrap();
        assert_eq!(commands(&entries), vec!["echo a; echo b"]);
    }

    #[test]
    fn test_plain_history_has_no_timestamp() {
        let log = "tm new x\n;make\ntm save\n";
        let entries = extract_commands("x", log).unwrap();
        assert_eq!(commands(&entries), vec!["make"]);
        assert!(entries[0].timestamp.is_none());
    }

    #[test]
    fn test_history_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let source = HistoryFile::new(temp_dir.path().join(".zsh_history"));
        assert!(matches!(
            source.read_log(),
            Err(MacroError::HistoryUnavailable { .. })
        ));
    }

    #[test]
    fn test_history_file_tolerates_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".zsh_history");
        let mut bytes = b": 1:0;tm new x\n: 2:0;echo caf".to_vec();
        bytes.extend_from_slice(&[0x83, 0xa9]);
        bytes.extend_from_slice(b"\n: 3:0;tm save\n");
        fs::write(&path, bytes).unwrap();

        let log = HistoryFile::new(path).read_log().unwrap();
        let entries = extract_commands("x", &log).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].command.starts_with("echo caf"));
    }
}
