use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MacroError {
    #[error("Another macro recording ('{name}') is in progress. Please save or cancel it first.")]
    RecordingInProgress { name: String },

    #[error("A macro named '{name}' already exists")]
    MacroExists { name: String },

    #[error("No macro found with the name '{name}'")]
    MacroNotFound { name: String },

    #[error("No macro recording in progress.")]
    NotRecording,

    #[error("No 'tm new {name}' entry found in shell history")]
    StartMarkerNotFound { name: String },

    #[error("Recording of '{name}' has no 'tm save' entry after it in shell history")]
    IncompleteSession { name: String },

    #[error("Shell history file not found: {}", path.display())]
    HistoryUnavailable { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid macro name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Unable to connect to {target}: {reason}")]
    RemoteConnection { target: String, reason: String },

    #[error("Remote command '{command}' could not be run: {reason}")]
    RemoteCommand { command: String, reason: String },

    #[error("Elevated command '{command}' failed{}", status_suffix(*status))]
    Elevation { command: String, status: Option<i32> },

    #[error("Privilege elevation is not supported here: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid index {index}: macro has {len} command(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Failed to execute command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Command '{command}' failed{}", status_suffix(*status))]
    CommandFailed { command: String, status: Option<i32> },

    #[error("{failed} of {total} command(s) failed")]
    ReplayFailed { failed: usize, total: usize },

    #[error("External editor failed: {0}")]
    Editor(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Failed to parse macro file: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_suffix(status: Option<i32>) -> String {
    match status {
        Some(code) => format!(" with exit status {code}"),
        None => " (terminated by signal)".to_string(),
    }
}

impl MacroError {
    /// Category name shown in verbose logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecordingInProgress { .. } | Self::MacroExists { .. } => "conflict",
            Self::MacroNotFound { .. } | Self::NotRecording | Self::StartMarkerNotFound { .. } => {
                "not_found"
            }
            Self::IncompleteSession { .. } => "incomplete_session",
            Self::HistoryUnavailable { .. } => "source_unavailable",
            Self::Configuration(_) | Self::InvalidName { .. } => "configuration",
            Self::RemoteConnection { .. } => "remote_connection",
            Self::RemoteCommand { .. } => "remote_command",
            Self::Elevation { .. } => "elevation",
            Self::UnsupportedPlatform(_) => "unsupported_platform",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::Spawn { .. } | Self::CommandFailed { .. } | Self::ReplayFailed { .. } => {
                "execution"
            }
            Self::Editor(_) => "editor",
            Self::Io(_) | Self::Json(_) => "io",
        }
    }

    /// A follow-up the user can try, when there is an obvious one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RecordingInProgress { .. } => Some("use `tm save` or `tm cancel` to finish it"),
            Self::MacroExists { .. } => Some("use `tm edit <name>` or `tm del <name>` first"),
            Self::MacroNotFound { .. } => Some("use `tm ls` or `tm find <keyword>` to search macros"),
            Self::NotRecording => Some("use `tm new <name>` to start recording"),
            Self::StartMarkerNotFound { .. } | Self::IncompleteSession { .. } => Some(
                "make sure your shell appends to history immediately (zsh: setopt INC_APPEND_HISTORY), or `tm cancel`",
            ),
            Self::HistoryUnavailable { .. } => {
                Some("set HISTFILE or \"history_file\" in ~/.termo/config.json")
            }
            Self::Configuration(_) => Some("pass exactly one of --key or --password"),
            Self::UnsupportedPlatform(_) => Some("run the macro without --admin"),
            Self::IndexOutOfRange { .. } => Some("indexes start at 1"),
            Self::Editor(_) => Some("set VISUAL, EDITOR or \"editor\" in ~/.termo/config.json"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MacroError>;
