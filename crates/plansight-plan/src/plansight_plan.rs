//! Plansight plan model - data structures for PostgreSQL EXPLAIN plans
//!
//! This crate defines the plan tree produced by the plansight parsers and
//! annotated by the analyzer:
//! - [`PlanNode`]: a single executor node, typed fields for the canonical
//!   PostgreSQL properties plus an open map for everything else
//! - [`Worker`] and [`Trigger`]: per-worker and per-trigger statistics
//! - [`PlanTree`]: the root mapping holding the plan, triggers, and
//!   plan-level attributes
//! - [`Plan`]: the envelope a plan is handed around in

pub mod node;
pub mod tree;

pub use node::{EstimateDirection, PlanNode, PlanNodeIter, Trigger, Worker};
pub use tree::{Plan, PlanTree};
