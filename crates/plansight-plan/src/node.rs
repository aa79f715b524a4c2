//! Plan nodes, workers, and triggers.
//!
//! PostgreSQL plans carry an open-ended set of per-node properties. The
//! canonical ones get typed fields with their wire names (`"Node Type"`,
//! `"Actual Total Time"`, ...); the long tail (buffer counters, filters,
//! output lists, ...) lands in the flattened `extra` map, so a node
//! serializes back to the exact shape PostgreSQL emits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Direction of a planner row-count mis-estimation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EstimateDirection {
    /// The planner predicted more rows than were produced.
    Over,
    /// The planner predicted fewer rows than were produced.
    Under,
    /// The estimate was exact.
    None,
}

/// A single node of the plan tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanNode {
    #[serde(rename = "Node Type")]
    pub node_type: String,

    #[serde(rename = "Parent Relationship", skip_serializing_if = "Option::is_none")]
    pub parent_relationship: Option<String>,

    #[serde(rename = "Subplan Name", skip_serializing_if = "Option::is_none")]
    pub subplan_name: Option<String>,

    // Planner estimates.
    #[serde(rename = "Startup Cost", skip_serializing_if = "Option::is_none")]
    pub startup_cost: Option<f64>,

    #[serde(rename = "Total Cost", skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,

    #[serde(rename = "Plan Rows", skip_serializing_if = "Option::is_none")]
    pub plan_rows: Option<u64>,

    #[serde(rename = "Plan Width", skip_serializing_if = "Option::is_none")]
    pub plan_width: Option<u64>,

    // Measurements from EXPLAIN ANALYZE.
    #[serde(rename = "Actual Startup Time", skip_serializing_if = "Option::is_none")]
    pub actual_startup_time: Option<f64>,

    #[serde(rename = "Actual Total Time", skip_serializing_if = "Option::is_none")]
    pub actual_total_time: Option<f64>,

    #[serde(rename = "Actual Rows", skip_serializing_if = "Option::is_none")]
    pub actual_rows: Option<u64>,

    #[serde(rename = "Actual Loops", skip_serializing_if = "Option::is_none")]
    pub actual_loops: Option<u64>,

    // Derived by the analyzer.
    #[serde(rename = "Actual Cost", skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,

    #[serde(rename = "Actual Duration", skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<f64>,

    #[serde(rename = "Planner Estimate Factor", skip_serializing_if = "Option::is_none")]
    pub planner_estimate_factor: Option<f64>,

    #[serde(rename = "Planner Estimate Direction", skip_serializing_if = "Option::is_none")]
    pub planner_estimate_direction: Option<EstimateDirection>,

    #[serde(rename = "Parallel", skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    // Outlier tags.
    #[serde(rename = "Costliest Node", skip_serializing_if = "Option::is_none")]
    pub costliest_node: Option<bool>,

    #[serde(rename = "Largest Node", skip_serializing_if = "Option::is_none")]
    pub largest_node: Option<bool>,

    #[serde(rename = "Slowest Node", skip_serializing_if = "Option::is_none")]
    pub slowest_node: Option<bool>,

    // Sort statistics.
    #[serde(rename = "Sort Method", skip_serializing_if = "Option::is_none")]
    pub sort_method: Option<String>,

    #[serde(rename = "Sort Space Type", skip_serializing_if = "Option::is_none")]
    pub sort_space_type: Option<String>,

    #[serde(rename = "Sort Space Used", skip_serializing_if = "Option::is_none")]
    pub sort_space_used: Option<f64>,

    #[serde(rename = "Workers", default, skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<Worker>,

    #[serde(rename = "Plans", default, skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<PlanNode>,

    /// Any property without a typed field above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanNode {
    /// Creates a node of the given type with no other properties.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// Adds a child node.
    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.plans.push(child);
        self
    }

    /// Returns true if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.plans.is_empty()
    }

    /// Returns true if this node is attached to its parent as an InitPlan.
    pub fn is_init_plan(&self) -> bool {
        self.parent_relationship.as_deref() == Some("InitPlan")
    }

    /// Returns true for Gather and Gather Merge nodes, whose descendants
    /// execute in parallel workers.
    pub fn is_gather(&self) -> bool {
        self.node_type.contains("Gather")
    }

    /// Returns the total number of nodes in this subtree (including self).
    pub fn node_count(&self) -> usize {
        1 + self.plans.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Returns the maximum depth of this subtree.
    pub fn depth(&self) -> usize {
        1 + self.plans.iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    /// Returns a depth-first iterator over this subtree.
    pub fn iter(&self) -> PlanNodeIter<'_> {
        PlanNodeIter { stack: vec![self] }
    }
}

/// Statistics reported by a single parallel worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    #[serde(rename = "Worker Number")]
    pub worker_number: u64,

    #[serde(rename = "Actual Startup Time", skip_serializing_if = "Option::is_none")]
    pub actual_startup_time: Option<f64>,

    #[serde(rename = "Actual Total Time", skip_serializing_if = "Option::is_none")]
    pub actual_total_time: Option<f64>,

    #[serde(rename = "Actual Rows", skip_serializing_if = "Option::is_none")]
    pub actual_rows: Option<u64>,

    #[serde(rename = "Actual Loops", skip_serializing_if = "Option::is_none")]
    pub actual_loops: Option<u64>,

    #[serde(rename = "Sort Method", skip_serializing_if = "Option::is_none")]
    pub sort_method: Option<String>,

    #[serde(rename = "Sort Space Type", skip_serializing_if = "Option::is_none")]
    pub sort_space_type: Option<String>,

    #[serde(rename = "Sort Space Used", skip_serializing_if = "Option::is_none")]
    pub sort_space_used: Option<f64>,

    /// Free-form attributes harvested from the worker's trailing text.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Worker {
    /// Creates a worker with the given number and no measurements.
    pub fn new(worker_number: u64) -> Self {
        Self {
            worker_number,
            ..Self::default()
        }
    }
}

/// Statistics for one trigger fired during the statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    #[serde(rename = "Trigger Name")]
    pub trigger_name: String,

    /// Total time spent in the trigger, in milliseconds.
    #[serde(rename = "Time")]
    pub time: f64,

    /// Call count, kept as reported. The JSON format emits a number, the
    /// text format a string; both are accepted.
    #[serde(rename = "Calls", deserialize_with = "calls_from_value")]
    pub calls: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn calls_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid Calls value: {other}"
        ))),
    }
}

/// Depth-first iterator over a plan subtree.
pub struct PlanNodeIter<'a> {
    stack: Vec<&'a PlanNode>,
}

impl<'a> Iterator for PlanNodeIter<'a> {
    type Item = &'a PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push children in reverse order so we visit them in order.
        for child in node.plans.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}
