use std::io::Write;

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Removed(String),
    Added(String),
}

/// Line-level diff of two command lists.
pub fn diff_commands(original: &[String], edited: &[String]) -> Vec<DiffLine> {
    let old: Vec<&str> = original.iter().map(String::as_str).collect();
    let new: Vec<&str> = edited.iter().map(String::as_str).collect();

    TextDiff::from_slices(&old, &new)
        .iter_all_changes()
        .map(|change| {
            let line = change.value().to_string();
            match change.tag() {
                ChangeTag::Equal => DiffLine::Context(line),
                ChangeTag::Delete => DiffLine::Removed(line),
                ChangeTag::Insert => DiffLine::Added(line),
            }
        })
        .collect()
}

pub fn has_changes(diff: &[DiffLine]) -> bool {
    diff.iter().any(|line| !matches!(line, DiffLine::Context(_)))
}

pub fn print_diff(diff: &[DiffLine], out: &mut dyn Write) -> std::io::Result<()> {
    if !has_changes(diff) {
        return writeln!(out, "No changes made.");
    }

    writeln!(out, "Showing changes:")?;
    writeln!(out, "{}", "--- original".cyan())?;
    writeln!(out, "{}", "+++ edited".cyan())?;
    for line in diff {
        match line {
            DiffLine::Context(text) => writeln!(out, "  {text}")?,
            DiffLine::Removed(text) => writeln!(out, "{}", format!("- {text}").red())?,
            DiffLine::Added(text) => writeln!(out, "{}", format!("+ {text}").green())?,
        }
    }
    Ok(())
}
