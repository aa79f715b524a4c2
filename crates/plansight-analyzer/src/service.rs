//! Plan creation facade.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::Map;

use crate::analyze::analyze;
use crate::error::Result;
use crate::source::from_source;
use plansight_plan::Plan;

/// Prefix of generated plan ids; the rest is the creation time in epoch
/// milliseconds.
pub const PLAN_ID_TAG: &str = "plan_";

static INNER_WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)[^\S\r\n]\s+").expect("valid regex"));

/// Builds an analyzed [`Plan`] envelope from raw EXPLAIN output.
///
/// An empty `name` gets a default of the form `plan created on <date>`.
pub fn create_plan(name: &str, source: &str, query: &str) -> Result<Plan> {
    let content = from_source(source)?;
    let now = Utc::now();
    let name = if name.is_empty() {
        format!("plan created on {}", now.format("%B %-d, %Y %-I:%M %p"))
    } else {
        name.to_string()
    };

    let mut plan = Plan {
        id: format!("{PLAN_ID_TAG}{}", now.timestamp_millis()),
        name,
        created_on: now,
        content,
        query: collapse_inner_whitespace(query),
        plan_stats: Map::new(),
    };
    analyze(&mut plan);
    Ok(plan)
}

/// Collapses runs of two or more whitespace characters following a
/// non-whitespace character into a single space. Leading indentation is
/// untouched, so a query keeps its shape while padding disappears.
pub fn collapse_inner_whitespace(query: &str) -> String {
    INNER_WHITESPACE_RE.replace_all(query, "$1 ").into_owned()
}
