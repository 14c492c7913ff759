//! Persistent macro table.
//!
//! The whole table is loaded and written back on every mutating operation.
//! Callers only ever hold working copies; the store owns the stored lists.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::Result;

/// Macro name -> ordered command templates.
pub type MacroTable = BTreeMap<String, Vec<String>>;

pub trait MacroStore {
    fn load(&self) -> Result<MacroTable>;

    /// Replace the stored table wholesale.
    fn put_all(&mut self, table: &MacroTable) -> Result<()>;

    fn get(&self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.load()?.remove(name))
    }

    fn put(&mut self, name: &str, commands: Vec<String>) -> Result<()> {
        let mut table = self.load()?;
        table.insert(name.to_string(), commands);
        self.put_all(&table)
    }

    /// Returns `false` when no macro had that name.
    fn delete(&mut self, name: &str) -> Result<bool> {
        let mut table = self.load()?;
        if table.remove(name).is_none() {
            return Ok(false);
        }
        self.put_all(&table)?;
        Ok(true)
    }
}

/// `.macros.json` in the data directory.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        JsonFileStore { path }
    }
}

impl MacroStore for JsonFileStore {
    fn load(&self) -> Result<MacroTable> {
        if !self.path.exists() {
            return Ok(MacroTable::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(MacroTable::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn put_all(&mut self, table: &MacroTable) -> Result<()> {
        let content = serde_json::to_string_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), macros = table.len(), "Macro table saved");
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    pub table: MacroTable,
    pub writes: usize,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with(entries: &[(&str, &[&str])]) -> Self {
        let table = entries
            .iter()
            .map(|(name, commands)| {
                (
                    name.to_string(),
                    commands.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect();
        MemoryStore { table, writes: 0 }
    }
}

#[cfg(test)]
impl MacroStore for MemoryStore {
    fn load(&self) -> Result<MacroTable> {
        Ok(self.table.clone())
    }

    fn put_all(&mut self, table: &MacroTable) -> Result<()> {
        self.table = table.clone();
        self.writes += 1;
        Ok(())
    }
}
