//! Optimization suggestions over an analyzed plan tree.
//!
//! A read-only pass that inspects the analyzer's derived metrics and flags
//! the usual performance suspects. Run it after
//! [`analyze`](crate::analyze::analyze); without the derived fields most
//! checks have nothing to look at.

use serde::{Deserialize, Serialize};

use plansight_plan::{EstimateDirection, PlanNode, PlanTree};

/// Row count above which a sequential scan is worth flagging.
const SEQ_SCAN_ROWS: u64 = 10_000;
/// Estimate factor above which table statistics look stale.
const STALE_ESTIMATE_FACTOR: f64 = 100.0;
/// Iteration count above which a nested loop's inner side is flagged.
const NESTED_LOOP_ITERATIONS: u64 = 1_000;

/// Severity of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// What a suggestion is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Sequential scan over a large number of rows.
    LargeSeqScan,
    /// Planner row estimate far from the measured count.
    BadRowEstimate,
    /// Sort that spilled to disk.
    DiskSort,
    /// Nested loop whose inner side runs many times.
    RepeatedNestedLoop,
}

/// A single finding, pointing at the node it applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub severity: Severity,
    pub message: String,
    pub node_type: String,
}

impl Suggestion {
    fn new(kind: SuggestionKind, severity: Severity, message: String, node: &PlanNode) -> Self {
        Self {
            kind,
            severity,
            message,
            node_type: node.node_type.clone(),
        }
    }
}

/// Inspects an analyzed tree and returns findings, most severe first.
pub fn suggest(tree: &PlanTree) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    for node in tree.iter_nodes() {
        check_seq_scan(node, &mut suggestions);
        check_row_estimate(node, &mut suggestions);
        check_disk_sort(node, &mut suggestions);
        check_nested_loop(node, &mut suggestions);
    }
    suggestions.sort_by_key(|s| s.severity);
    suggestions
}

fn check_seq_scan(node: &PlanNode, out: &mut Vec<Suggestion>) {
    if !node.node_type.contains("Seq Scan") {
        return;
    }
    let rows = node.actual_rows.or(node.plan_rows).unwrap_or(0);
    if rows >= SEQ_SCAN_ROWS {
        out.push(Suggestion::new(
            SuggestionKind::LargeSeqScan,
            Severity::Warning,
            format!("{} reads {rows} rows sequentially; an index may help", node.node_type),
            node,
        ));
    }
}

fn check_row_estimate(node: &PlanNode, out: &mut Vec<Suggestion>) {
    let Some(factor) = node.planner_estimate_factor else {
        return;
    };
    if factor < STALE_ESTIMATE_FACTOR {
        return;
    }
    let direction = match node.planner_estimate_direction {
        Some(EstimateDirection::Under) => "under",
        Some(EstimateDirection::Over) => "over",
        _ => "mis",
    };
    out.push(Suggestion::new(
        SuggestionKind::BadRowEstimate,
        Severity::Warning,
        format!(
            "planner {direction}estimated rows by a factor of {factor:.0}; consider running ANALYZE"
        ),
        node,
    ));
}

fn check_disk_sort(node: &PlanNode, out: &mut Vec<Suggestion>) {
    if node.sort_space_type.as_deref() != Some("Disk") {
        return;
    }
    let used = node.sort_space_used.unwrap_or(0.0);
    out.push(Suggestion::new(
        SuggestionKind::DiskSort,
        Severity::Warning,
        format!("sort spills {used}kB to disk; raising work_mem would keep it in memory"),
        node,
    ));
}

fn check_nested_loop(node: &PlanNode, out: &mut Vec<Suggestion>) {
    if !node.node_type.contains("Nested Loop") {
        return;
    }
    let iterations = node
        .plans
        .iter()
        .filter_map(|child| child.actual_loops)
        .max()
        .unwrap_or(0);
    if iterations >= NESTED_LOOP_ITERATIONS {
        out.push(Suggestion::new(
            SuggestionKind::RepeatedNestedLoop,
            Severity::Info,
            format!("nested loop inner side runs {iterations} times"),
            node,
        ));
    }
}
