//! Positional `{N}` placeholders in command templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([1-9]\d*)\}").expect("placeholder regex"));

/// Replace `{k}` with `params[k - 1]`.
///
/// References past the end of `params` are left verbatim, so a macro can
/// be called with fewer arguments than it mentions. Only canonical indexes
/// match: `{0}` and zero-padded forms like `{01}` are plain text.
pub fn substitute(template: &str, params: &[String]) -> String {
    if params.is_empty() {
        return template.to_string();
    }
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|k| params.get(k - 1))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Highest 1-based index referenced by any of `templates`.
pub fn highest_placeholder<'a>(templates: impl IntoIterator<Item = &'a String>) -> usize {
    templates
        .into_iter()
        .flat_map(|t| PLACEHOLDER_RE.captures_iter(t))
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .max()
        .unwrap_or(0)
}
