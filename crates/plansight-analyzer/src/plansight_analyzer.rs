//! Plansight analyzer - PostgreSQL EXPLAIN ingestion and analysis
//!
//! Turns `EXPLAIN (ANALYZE, ...)` output - text or JSON format - into a
//! normalized, annotated plan tree:
//! - text parsing of the indentation-sensitive format, including sub-plan
//!   and CTE markers, per-worker statistics, trigger statistics, and
//!   free-form attribute lines
//! - JSON parsing tolerant of the duplicate `Worker` keys PostgreSQL emits
//!   inside a single node object
//! - analysis deriving exclusive costs and durations, planner estimate
//!   accuracy, parallelism, and outlier tags
//! - optimization suggestions over the analyzed tree
//!
//! # Example
//!
//! ```
//! use plansight_analyzer::create_plan;
//!
//! let source =
//!     "Seq Scan on users  (cost=0.00..10.50 rows=100 width=36) (actual time=0.010..0.200 rows=150 loops=1)";
//! let plan = create_plan("", source, "SELECT * FROM users").expect("parse failed");
//!
//! assert_eq!(plan.content.plan.node_type, "Seq Scan on users");
//! assert_eq!(plan.content.plan.actual_cost, Some(10.5));
//! assert_eq!(plan.content.plan.planner_estimate_factor, Some(1.5));
//! ```

pub mod analyze;
pub mod error;
pub mod json;
pub mod service;
pub mod source;
pub mod suggestions;
pub mod text;

pub use analyze::{analyze, analyze_tree};
pub use error::{ParseError, Result};
pub use json::from_json;
pub use service::{collapse_inner_whitespace, create_plan, PLAN_ID_TAG};
pub use source::from_source;
pub use suggestions::{suggest, Severity, Suggestion, SuggestionKind};
pub use text::from_text;

pub use plansight_plan::{
    EstimateDirection, Plan, PlanNode, PlanNodeIter, PlanTree, Trigger, Worker,
};
