//! Source dispatcher.
//!
//! EXPLAIN output arrives wrapped in all kinds of copy-paste artifacts:
//! pgAdmin exports wrap every line in quotes, psql's default pager appends
//! `+` continuation markers, and the interesting part may be surrounded by
//! result-set decoration. [`from_source`] cleans those up and routes the
//! result to the text or JSON parser.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;
use crate::{json, text};
use plansight_plan::PlanTree;

static CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\+\r?\n").expect("valid regex"));

/// Parses EXPLAIN output in either text or JSON format.
///
/// The JSON path is taken when the source contains a line holding only an
/// opening bracket whose closing bracket later appears at the same
/// indentation; anything else is treated as text format.
pub fn from_source(source: &str) -> Result<PlanTree> {
    let source = preprocess(source);
    let lines: Vec<&str> = source.lines().collect();
    if json_block_range(&lines).is_some() {
        tracing::debug!("bracketed block found, parsing source as JSON");
        json::from_json(&source)
    } else {
        tracing::debug!("no bracketed block found, parsing source as text");
        text::from_text(&source)
    }
}

/// Strips wrapping artifacts that appear regardless of plan format.
fn preprocess(source: &str) -> String {
    let unquoted = source
        .lines()
        .map(strip_wrapping_quotes)
        .collect::<Vec<_>>()
        .join("\n");
    CONTINUATION_RE.replace_all(&unquoted, "\n").into_owned()
}

/// Removes a pair of quotes wrapping a whole line (pgAdmin export artifact).
fn strip_wrapping_quotes(line: &str) -> &str {
    for quote in ['"', '\''] {
        if line.len() >= 2 && line.starts_with(quote) && line.ends_with(quote) {
            return &line[1..line.len() - 1];
        }
    }
    line
}

/// Finds the first line holding only `[` or `{` and the first later line
/// holding only the closing bracket at the same indentation.
pub(crate) fn json_block_range(lines: &[&str]) -> Option<(usize, usize)> {
    let (start, prefix) = lines.iter().enumerate().find_map(|(index, line)| {
        let stripped = line.trim_start();
        let indent = &line[..line.len() - stripped.len()];
        matches!(stripped.trim_end(), "[" | "{").then_some((index, indent))
    })?;

    let end = lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find_map(|(index, line)| {
            let rest = line.strip_prefix(prefix)?;
            matches!(rest.trim_end(), "]" | "}").then_some(index)
        })?;

    Some((start, end))
}
