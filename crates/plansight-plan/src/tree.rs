//! The plan tree root and the plan envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::node::{PlanNode, PlanNodeIter, Trigger};

/// The root mapping of a parsed plan.
///
/// Besides the root [`PlanNode`] this carries the trigger list, the
/// tree-wide maxima written by the analyzer, and plan-level attributes such
/// as `Planning Time` or `Execution Time`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanTree {
    #[serde(rename = "Plan")]
    pub plan: PlanNode,

    #[serde(rename = "Triggers", default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Trigger>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_rows: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_costs: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_duration: Option<f64>,

    /// Plan-level attributes (`Planning Time`, `Execution Time`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanTree {
    /// Creates a tree with the given root node and nothing else.
    pub fn new(plan: PlanNode) -> Self {
        Self {
            plan,
            triggers: None,
            maximum_rows: None,
            maximum_costs: None,
            maximum_duration: None,
            extra: Map::new(),
        }
    }

    /// Returns a depth-first iterator over all nodes in the tree.
    pub fn iter_nodes(&self) -> PlanNodeIter<'_> {
        self.plan.iter()
    }

    /// Finds all nodes whose type contains the given text.
    pub fn find_nodes(&self, node_type: &str) -> Vec<&PlanNode> {
        self.iter_nodes()
            .filter(|n| n.node_type.contains(node_type))
            .collect()
    }
}

/// The envelope a plan is created in once and then handed around read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Fixed tag followed by the creation time in epoch milliseconds.
    pub id: String,

    pub name: String,

    #[serde(rename = "createdOn")]
    pub created_on: DateTime<Utc>,

    pub content: PlanTree,

    /// The statement the plan was captured for, with interior whitespace
    /// runs collapsed.
    pub query: String,

    #[serde(rename = "planStats")]
    pub plan_stats: Map<String, Value>,
}
