//! Editing a stored macro.
//!
//! Edits go to a working copy. The store is only written by
//! [`MacroEditor::save`]; aborting at any point leaves it untouched.

use std::fs;
use std::io::{BufRead, Write};
use std::process::Command;

use crate::diff::{diff_commands, print_diff, DiffLine};
use crate::error::{MacroError, Result};
use crate::store::MacroStore;

const COMMENT_MARKER: char = '#';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorOutcome {
    Saved(Vec<String>),
    Aborted,
}

pub struct MacroEditor {
    name: String,
    original: Vec<String>,
    working: Vec<String>,
}

impl MacroEditor {
    pub fn new(name: &str, original: Vec<String>) -> Self {
        MacroEditor {
            name: name.to_string(),
            working: original.clone(),
            original,
        }
    }

    pub fn open(store: &dyn MacroStore, name: &str) -> Result<Self> {
        let original = store.get(name)?.ok_or_else(|| MacroError::MacroNotFound {
            name: name.to_string(),
        })?;
        Ok(Self::new(name, original))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[String] {
        &self.working
    }

    pub fn add_command(&mut self, text: String) {
        self.working.push(text);
    }

    /// `index` is 0-based.
    pub fn remove_command(&mut self, index: usize) -> Result<String> {
        self.check_index(index)?;
        Ok(self.working.remove(index))
    }

    /// Returns `(old, new)`.
    pub fn replace_command(&mut self, index: usize, text: String) -> Result<(String, String)> {
        self.check_index(index)?;
        let old = std::mem::replace(&mut self.working[index], text.clone());
        Ok((old, text))
    }

    pub fn replace_all(&mut self, commands: Vec<String>) {
        self.working = commands;
    }

    /// Cumulative changes against the stored list.
    pub fn diff(&self) -> Vec<DiffLine> {
        diff_commands(&self.original, &self.working)
    }

    pub fn save(self, store: &mut dyn MacroStore) -> Result<EditorOutcome> {
        store.put(&self.name, self.working.clone())?;
        tracing::info!(macro_name = %self.name, commands = self.working.len(), "Macro updated");
        Ok(EditorOutcome::Saved(self.working))
    }

    pub fn abort(self) -> EditorOutcome {
        tracing::debug!(macro_name = %self.name, "Edit aborted");
        EditorOutcome::Aborted
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.working.len() {
            Ok(())
        } else {
            Err(MacroError::IndexOutOfRange {
                index: index + 1,
                len: self.working.len(),
            })
        }
    }
}

fn prompt(input: &mut dyn BufRead, out: &mut dyn Write, message: &str) -> Result<Option<String>> {
    write!(out, "{message}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask for a 1-based index; `Ok(None)` on end of input.
fn prompt_index(
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    message: &str,
) -> Result<Option<Option<usize>>> {
    let Some(answer) = prompt(input, out, message)? else {
        return Ok(None);
    };
    match answer.parse::<usize>() {
        Ok(0) => {
            writeln!(out, "Indexes start at 1.")?;
            Ok(Some(None))
        }
        Ok(n) => Ok(Some(Some(n - 1))),
        Err(_) => {
            writeln!(out, "Please enter a valid number.")?;
            Ok(Some(None))
        }
    }
}

fn report(out: &mut dyn Write, err: &MacroError) -> Result<()> {
    writeln!(out, "Error: {err}")?;
    Ok(())
}

/// Menu-driven editing session. End of input counts as abort.
pub fn run_interactive(
    mut editor: MacroEditor,
    store: &mut dyn MacroStore,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<EditorOutcome> {
    writeln!(out, "Editing macro '{}'...", editor.name())?;
    writeln!(out, "Current commands:")?;
    for (idx, command) in editor.commands().iter().enumerate() {
        writeln!(out, "{}. {}", idx + 1, command)?;
    }

    loop {
        writeln!(out)?;
        writeln!(out, "Options:")?;
        writeln!(out, "  1. Add a new command")?;
        writeln!(out, "  2. Remove a command by index")?;
        writeln!(out, "  3. Replace a command by index")?;
        writeln!(out, "  4. Save")?;
        writeln!(out, "  5. Abort")?;
        writeln!(out)?;
        print_diff(&editor.diff(), out)?;

        let Some(choice) = prompt(input, out, "\nEnter your choice (1-5): ")? else {
            writeln!(out)?;
            writeln!(out, "Aborting edit for macro '{}'.", editor.name())?;
            return Ok(editor.abort());
        };

        match choice.as_str() {
            "1" => {
                let Some(text) = prompt(input, out, "Enter the new command: ")? else {
                    continue;
                };
                writeln!(out, "Command added: {text}")?;
                editor.add_command(text);
            }
            "2" => {
                let Some(Some(index)) =
                    prompt_index(input, out, "Enter the index of the command to remove: ")?
                else {
                    continue;
                };
                match editor.remove_command(index) {
                    Ok(removed) => writeln!(out, "Command removed: {removed}")?,
                    Err(err) => report(out, &err)?,
                }
            }
            "3" => {
                let Some(Some(index)) =
                    prompt_index(input, out, "Enter the index of the command to replace: ")?
                else {
                    continue;
                };
                if let Err(err) = editor.check_index(index) {
                    report(out, &err)?;
                    continue;
                }
                let Some(text) = prompt(input, out, "Enter the new command: ")? else {
                    continue;
                };
                let (old, new) = editor.replace_command(index, text)?;
                writeln!(out, "Command replaced: '{old}' → '{new}'")?;
            }
            "4" => {
                let name = editor.name().to_string();
                let outcome = editor.save(store)?;
                writeln!(out, "Changes to macro '{name}' have been saved.")?;
                return Ok(outcome);
            }
            "5" => {
                writeln!(out, "Aborting edit for macro '{}'.", editor.name())?;
                return Ok(editor.abort());
            }
            _ => writeln!(out, "Invalid choice. Please enter a number between 1 and 5.")?,
        }
    }
}

/// Non-comment, non-blank lines of an edited buffer.
pub fn parse_buffer(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .collect()
}

fn render_buffer(editor: &MacroEditor) -> String {
    let mut buffer = format!(
        "{COMMENT_MARKER} Editing macro '{}'. One command per line, in replay order.\n\
         {COMMENT_MARKER} Lines starting with '{COMMENT_MARKER}' and blank lines are ignored.\n\
         {COMMENT_MARKER} Quit without saving to leave the macro unchanged.\n",
        editor.name()
    );
    for command in editor.commands() {
        buffer.push_str(command);
        buffer.push('\n');
    }
    buffer
}

/// Hand the macro to an external editor over a temporary file.
///
/// An unchanged modification time means the user quit without saving. The
/// temporary file is removed on every exit path.
pub fn run_external(
    mut editor: MacroEditor,
    editor_command: &str,
    store: &mut dyn MacroStore,
    out: &mut dyn Write,
) -> Result<EditorOutcome> {
    let mut argv = shell_words::split(editor_command)
        .map_err(|e| MacroError::Editor(format!("cannot parse '{editor_command}': {e}")))?;
    if argv.is_empty() {
        return Err(MacroError::Editor("editor command is empty".to_string()));
    }
    let program = argv.remove(0);

    let mut file = tempfile::Builder::new()
        .prefix("tm-edit-")
        .suffix(".sh")
        .tempfile()?;
    file.write_all(render_buffer(&editor).as_bytes())?;
    file.flush()?;
    let path = file.into_temp_path();
    let before = fs::metadata(&path)?.modified()?;

    tracing::debug!(editor = %program, path = %path.display(), "Launching external editor");
    let status = Command::new(&program)
        .args(&argv)
        .arg(path.as_os_str())
        .status()
        .map_err(|e| MacroError::Editor(format!("failed to launch '{program}': {e}")))?;
    if !status.success() {
        return Err(MacroError::Editor(format!("'{program}' exited with {status}")));
    }

    let after = fs::metadata(&path)?.modified()?;
    if after == before {
        writeln!(out, "No changes made.")?;
        return Ok(editor.abort());
    }

    let content = fs::read_to_string(&path)?;
    editor.replace_all(parse_buffer(&content));
    print_diff(&editor.diff(), out)?;
    let name = editor.name().to_string();
    let outcome = editor.save(store)?;
    writeln!(out, "Changes to macro '{name}' have been saved.")?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Cursor;

    fn store() -> MemoryStore {
        MemoryStore::with(&[("m", &["a", "b"])])
    }

    #[test]
    fn test_replace_then_remove_then_save() {
        let mut store = store();
        let mut editor = MacroEditor::open(&store, "m").unwrap();

        let (old, new) = editor.replace_command(1, "B".to_string()).unwrap();
        assert_eq!((old.as_str(), new.as_str()), ("b", "B"));
        assert_eq!(editor.remove_command(0).unwrap(), "a");

        let outcome = editor.save(&mut store).unwrap();
        assert_eq!(outcome, EditorOutcome::Saved(vec!["B".to_string()]));
        assert_eq!(store.table["m"], vec!["B"]);
    }

    #[test]
    fn test_abort_leaves_store_untouched() {
        let store = store();
        let mut editor = MacroEditor::open(&store, "m").unwrap();
        editor.add_command("c".to_string());
        editor.remove_command(0).unwrap();

        assert_eq!(editor.abort(), EditorOutcome::Aborted);
        assert_eq!(store.table["m"], vec!["a", "b"]);
        assert_eq!(store.writes, 0);
    }

    #[test]
    fn test_index_out_of_range_keeps_editing() {
        let mut editor = MacroEditor::new("m", vec!["a".to_string()]);
        assert!(matches!(
            editor.remove_command(1),
            Err(MacroError::IndexOutOfRange { index: 2, len: 1 })
        ));
        assert!(editor.replace_command(5, "x".to_string()).is_err());
        assert_eq!(editor.commands(), ["a"]);
    }

    #[test]
    fn test_open_missing_macro() {
        let store = store();
        assert!(matches!(
            MacroEditor::open(&store, "nope"),
            Err(MacroError::MacroNotFound { .. })
        ));
    }

    #[test]
    fn test_diff_is_cumulative() {
        let mut editor = MacroEditor::new("m", vec!["a".to_string(), "b".to_string()]);
        editor.add_command("c".to_string());
        editor.remove_command(0).unwrap();
        assert_eq!(
            editor.diff(),
            vec![
                DiffLine::Removed("a".to_string()),
                DiffLine::Context("b".to_string()),
                DiffLine::Added("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_interactive_session_saves() {
        colored::control::set_override(false);
        let mut store = store();
        let editor = MacroEditor::open(&store, "m").unwrap();
        let mut input = Cursor::new("3\n2\nB\n2\n1\n4\n");
        let mut out = Vec::new();

        let outcome = run_interactive(editor, &mut store, &mut input, &mut out).unwrap();

        assert_eq!(outcome, EditorOutcome::Saved(vec!["B".to_string()]));
        assert_eq!(store.table["m"], vec!["B"]);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Command replaced: 'b' → 'B'"));
        assert!(printed.contains("Command removed: a"));
        assert!(printed.contains("+ B"));
    }

    #[test]
    fn test_interactive_errors_are_reported_not_fatal() {
        colored::control::set_override(false);
        let mut store = store();
        let editor = MacroEditor::open(&store, "m").unwrap();
        let mut input = Cursor::new("2\n9\n2\nzero\n7\n5\n");
        let mut out = Vec::new();

        let outcome = run_interactive(editor, &mut store, &mut input, &mut out).unwrap();

        assert_eq!(outcome, EditorOutcome::Aborted);
        assert_eq!(store.writes, 0);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Error: Invalid index 9: macro has 2 command(s)"));
        assert!(printed.contains("Please enter a valid number."));
        assert!(printed.contains("Invalid choice."));
    }

    #[test]
    fn test_end_of_input_aborts() {
        let mut store = store();
        let editor = MacroEditor::open(&store, "m").unwrap();
        let mut input = Cursor::new("1\nnew thing\n");
        let mut out = Vec::new();

        let outcome = run_interactive(editor, &mut store, &mut input, &mut out).unwrap();
        assert_eq!(outcome, EditorOutcome::Aborted);
        assert_eq!(store.table["m"], vec!["a", "b"]);
    }

    #[test]
    fn test_parse_buffer_strips_comments_and_blanks() {
        let content = "# header\n\nls -la\n   # indented comment\n  make test  \n";
        assert_eq!(parse_buffer(content), vec!["ls -la", "make test"]);
    }

    #[test]
    fn test_render_buffer_round_trips_through_parse() {
        let editor = MacroEditor::new("m", vec!["a".to_string(), "b c".to_string()]);
        assert_eq!(parse_buffer(&render_buffer(&editor)), vec!["a", "b c"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_external_editor_without_changes_aborts() {
        let mut store = store();
        let editor = MacroEditor::open(&store, "m").unwrap();
        let mut out = Vec::new();

        let outcome = run_external(editor, "true", &mut store, &mut out).unwrap();

        assert_eq!(outcome, EditorOutcome::Aborted);
        assert_eq!(store.writes, 0);
        assert!(String::from_utf8(out).unwrap().contains("No changes made."));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_editor_changes_are_saved() {
        colored::control::set_override(false);
        let mut store = store();
        let editor = MacroEditor::open(&store, "m").unwrap();
        let mut out = Vec::new();
        let script = r##"sh -c 'sleep 0.1; printf "# note\na\nc\n" > "$0"'"##;

        let outcome = run_external(editor, script, &mut store, &mut out).unwrap();

        assert_eq!(
            outcome,
            EditorOutcome::Saved(vec!["a".to_string(), "c".to_string()])
        );
        assert_eq!(store.table["m"], vec!["a", "c"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_external_editor_failure_is_reported() {
        let mut store = store();
        let editor = MacroEditor::open(&store, "m").unwrap();
        let mut out = Vec::new();

        let result = run_external(editor, "tm-no-such-editor-binary", &mut store, &mut out);
        assert!(matches!(result, Err(MacroError::Editor(_))));
        assert_eq!(store.writes, 0);
    }
}
