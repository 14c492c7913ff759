//! Data directory layout and user settings.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::error::{MacroError, Result};

const DATA_DIR: &str = ".termo";

pub struct Paths {
    pub root: PathBuf,
    home: PathBuf,
}

impl Paths {
    /// `$TERMO_HOME`, else `~/.termo`. The directory is created if needed.
    pub fn resolve() -> Result<Self> {
        let home = home_dir()?;
        let root = match env::var_os("TERMO_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => home.join(DATA_DIR),
        };
        Self::at(root, home)
    }

    pub fn at(root: PathBuf, home: PathBuf) -> Result<Self> {
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                MacroError::Configuration(format!(
                    "failed to create data directory {}: {e}",
                    root.display()
                ))
            })?;
        }
        Ok(Paths { root, home })
    }

    pub fn macros(&self) -> PathBuf {
        self.root.join(".macros.json")
    }

    pub fn head(&self) -> PathBuf {
        self.root.join("HEAD")
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn default_history(&self) -> PathBuf {
        self.home.join(".zsh_history")
    }
}

fn home_dir() -> Result<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    match env::var_os(var) {
        Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
        _ => Err(MacroError::Configuration(
            "HOME environment variable not found".to_string(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub first_run: bool,
    /// Command line for `tm edit --external`, split like a shell would.
    pub editor: Option<String>,
    pub history_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            first_run: true,
            editor: None,
            history_file: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            MacroError::Configuration(format!("failed to parse {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn history_path(&self, paths: &Paths) -> PathBuf {
        self.history_file
            .clone()
            .or_else(|| env::var_os("HISTFILE").filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| paths.default_history())
    }

    pub fn editor_command(&self) -> String {
        self.editor
            .clone()
            .or_else(|| env::var("VISUAL").ok().filter(|v| !v.trim().is_empty()))
            .or_else(|| env::var("EDITOR").ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| {
                if cfg!(windows) {
                    "notepad".to_string()
                } else {
                    "vi".to_string()
                }
            })
    }
}

/// Print the welcome guide once and remember that it was shown.
pub fn first_run_guide(settings: &mut Settings, path: &Path, out: &mut dyn Write) -> Result<()> {
    if !settings.first_run {
        return Ok(());
    }

    writeln!(out, "{}", "Welcome to Termo!".green().bold())?;
    writeln!(out, "This quick guide will help you get started:")?;
    writeln!(out)?;
    writeln!(out, "Key Commands:")?;
    writeln!(out, "  - tm new <name>    : Start recording a new macro")?;
    writeln!(out, "  - tm save          : Save the current macro recording")?;
    writeln!(out, "  - tm <name> [args] : Run a saved macro by name")?;
    writeln!(out, "  - tm ls            : List all macros")?;
    writeln!(out, "  - tm desc <name>   : Describe a macro in detail")?;
    writeln!(out)?;

    settings.first_run = false;
    settings.save(path)
}
