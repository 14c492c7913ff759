//! Command handlers. Storage, the recording marker, the history log and
//! the remote connector are injected so every handler runs against fakes
//! in tests.

use std::io::{BufRead, Write};

use colored::Colorize;

use crate::dispatch::{open_executor, replay, ExecutionMode};
use crate::editor::{run_external, run_interactive, EditorOutcome, MacroEditor};
use crate::error::{MacroError, Result};
use crate::history::{extract_commands, HistoryEntry, HistorySource};
use crate::params::highest_placeholder;
use crate::recording::RecordingTracker;
use crate::remote::{RemoteConfig, RemoteConnector};
use crate::store::MacroStore;

pub struct MacroManager<S: MacroStore, H: RecordingTracker> {
    store: S,
    head: H,
}

/// Where `tm edit` sends the user.
pub enum EditMode<'a> {
    Menu,
    External(&'a str),
}

fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.starts_with('-') {
        "name cannot start with '-'"
    } else if name.chars().any(char::is_whitespace) {
        "name cannot contain whitespace"
    } else {
        return Ok(());
    };
    Err(MacroError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

fn recording_window(entries: &[HistoryEntry]) -> Option<String> {
    let first = entries.iter().find_map(|e| e.timestamp)?;
    let last = entries.iter().rev().find_map(|e| e.timestamp)?;
    let format = "%Y-%m-%d %H:%M:%S";
    Some(format!(
        "{} – {} UTC",
        first.format(format),
        last.format(format)
    ))
}

impl<S: MacroStore, H: RecordingTracker> MacroManager<S, H> {
    pub fn new(store: S, head: H) -> Self {
        MacroManager { store, head }
    }

    fn commands_for(&self, name: &str) -> Result<Vec<String>> {
        self.store
            .get(name)?
            .ok_or_else(|| MacroError::MacroNotFound {
                name: name.to_string(),
            })
    }

    pub fn new_recording(&mut self, name: &str, out: &mut dyn Write) -> Result<()> {
        validate_name(name)?;
        if let Some(active) = self.head.current_recording()? {
            return Err(MacroError::RecordingInProgress { name: active });
        }
        if self.store.get(name)?.is_some() {
            return Err(MacroError::MacroExists {
                name: name.to_string(),
            });
        }

        self.head.start_recording(name)?;
        tracing::info!(macro_name = name, "Recording started");
        writeln!(out, "Recording macro '{name}' started.")?;
        writeln!(
            out,
            "{}",
            "Run the commands you want to record, then `tm save` (or `tm cancel`).".blue()
        )?;
        Ok(())
    }

    /// On extraction failure the marker stays, so the user can retry or
    /// cancel.
    pub fn save_recording(
        &mut self,
        history: &dyn HistorySource,
        out: &mut dyn Write,
    ) -> Result<Vec<String>> {
        let name = self
            .head
            .current_recording()?
            .ok_or(MacroError::NotRecording)?;

        let log = history.read_log()?;
        let entries = extract_commands(&name, &log)?;
        let commands: Vec<String> = entries
            .iter()
            .map(|e| e.command.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if commands.is_empty() {
            writeln!(out, "No commands were recorded.")?;
        } else {
            self.store.put(&name, commands.clone())?;
            tracing::info!(macro_name = %name, commands = commands.len(), "Macro saved");
            writeln!(
                out,
                "Macro '{name}' saved with {} command(s).",
                commands.len()
            )?;
            if let Some(window) = recording_window(&entries) {
                writeln!(out, "Recorded {window}")?;
            }
        }

        self.head.clear_recording()?;
        Ok(commands)
    }

    pub fn cancel_recording(&mut self, out: &mut dyn Write) -> Result<()> {
        match self.head.current_recording()? {
            None => writeln!(out, "{}", MacroError::NotRecording)?,
            Some(name) => {
                self.head.clear_recording()?;
                tracing::info!(macro_name = %name, "Recording aborted");
                writeln!(out, "Macro recording '{name}' aborted.")?;
            }
        }
        Ok(())
    }

    pub fn exec(
        &self,
        name: &str,
        params: &[String],
        mode: ExecutionMode,
        connector: &dyn RemoteConnector,
        out: &mut dyn Write,
    ) -> Result<()> {
        let commands = self.commands_for(name)?;

        let needed = highest_placeholder(&commands);
        if params.len() < needed {
            tracing::debug!(
                macro_name = name,
                needed,
                supplied = params.len(),
                "Fewer parameters than placeholders; unmatched ones stay as written"
            );
        }

        if let ExecutionMode::Remote(config) = &mode {
            writeln!(out, "Connecting to {}...", config.target())?;
        }
        let mut executor = open_executor(&mode, connector)?;

        let header = match &mode {
            ExecutionMode::Remote(config) => {
                format!("Executing macro '{name}' on {}:", config.host)
            }
            _ => format!("Executing macro '{name}':"),
        };
        writeln!(out, "{}", header.bold())?;
        writeln!(out)?;

        tracing::debug!(macro_name = name, mode = mode.label(), "Replaying macro");
        let report = replay(&commands, params, executor.as_mut(), out)?;
        drop(executor);
        report.into_result()
    }

    /// Configuration is validated before any connection is attempted.
    #[allow(clippy::too_many_arguments)]
    pub fn remote(
        &self,
        name: &str,
        params: &[String],
        host: &str,
        port: u16,
        key: Option<std::path::PathBuf>,
        password: Option<String>,
        connector: &dyn RemoteConnector,
        out: &mut dyn Write,
    ) -> Result<()> {
        let config = RemoteConfig::new(host, port, key, password)?;
        self.exec(name, params, ExecutionMode::Remote(config), connector, out)
    }

    /// Case-insensitive match on names, or on command text when
    /// `in_commands` is set.
    pub fn find(&self, keyword: &str, in_commands: bool, out: &mut dyn Write) -> Result<Vec<String>> {
        let needle = keyword.to_lowercase();
        let table = self.store.load()?;
        let mut found = Vec::new();

        if in_commands {
            for (name, commands) in &table {
                let hits: Vec<&String> = commands
                    .iter()
                    .filter(|c| c.to_lowercase().contains(&needle))
                    .collect();
                if hits.is_empty() {
                    continue;
                }
                if found.is_empty() {
                    writeln!(out, "Macros with commands containing '{keyword}':")?;
                }
                writeln!(out, "- {name}:")?;
                for command in hits {
                    writeln!(out, "    {command}")?;
                }
                found.push(name.clone());
            }
        } else {
            found = table
                .keys()
                .filter(|name| name.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            if !found.is_empty() {
                writeln!(out, "Macros found containing '{keyword}':")?;
                for name in &found {
                    writeln!(out, "- {name}")?;
                }
            }
        }

        if found.is_empty() {
            writeln!(out, "No macros found containing '{keyword}'.")?;
        }
        Ok(found)
    }

    pub fn describe(&self, name: &str, json: bool, out: &mut dyn Write) -> Result<()> {
        let commands = self.commands_for(name)?;

        if json {
            let mut doc = serde_json::Map::new();
            doc.insert(name.to_string(), serde_json::json!(commands));
            writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
            return Ok(());
        }

        writeln!(
            out,
            "{}",
            format!("Macro '{name}' runs commands in following order:").blue()
        )?;
        for (index, command) in commands.iter().enumerate() {
            writeln!(out, "{}: {}", index + 1, command)?;
        }
        Ok(())
    }

    pub fn list(&self, out: &mut dyn Write) -> Result<Vec<String>> {
        let names: Vec<String> = self.store.load()?.into_keys().collect();

        if names.is_empty() {
            writeln!(out, "{}", "No macros were found".blue())?;
            return Ok(names);
        }

        for name in &names {
            writeln!(out, "- {name}")?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            "NOTE: use `tm desc <macro name>` command to see more details".blue()
        )?;
        Ok(names)
    }

    /// Returns whether the macro was deleted.
    pub fn delete(
        &mut self,
        name: &str,
        assume_yes: bool,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<bool> {
        self.commands_for(name)?;

        if !assume_yes {
            write!(
                out,
                "Are you sure you want to delete the macro '{name}'? (y/n): "
            )?;
            out.flush()?;
            let mut answer = String::new();
            input.read_line(&mut answer)?;
            if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                writeln!(out, "Macro '{name}' was not deleted.")?;
                return Ok(false);
            }
        }

        self.store.delete(name)?;
        tracing::info!(macro_name = name, "Macro deleted");
        writeln!(out, "Macro '{name}' has been deleted.")?;
        Ok(true)
    }

    pub fn edit(
        &mut self,
        name: &str,
        mode: EditMode<'_>,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<EditorOutcome> {
        let editor = MacroEditor::open(&self.store, name)?;
        match mode {
            EditMode::Menu => run_interactive(editor, &mut self.store, input, out),
            EditMode::External(command) => run_external(editor, command, &mut self.store, out),
        }
    }
}
