//! Tests for the plan analyzer

use super::*;
use crate::text::from_text;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn analyzed(root: PlanNode) -> PlanTree {
    let mut tree = PlanTree::new(root);
    analyze_tree(&mut tree);
    tree
}

fn costed(node_type: &str, total_cost: f64) -> PlanNode {
    let mut node = PlanNode::new(node_type);
    node.total_cost = Some(total_cost);
    node
}

fn timed(node_type: &str, total_time: f64, loops: u64) -> PlanNode {
    let mut node = PlanNode::new(node_type);
    node.actual_total_time = Some(total_time);
    node.actual_loops = Some(loops);
    node
}

// ============================================================================
// Planner estimates
// ============================================================================

#[rstest]
#[case::underestimated(100, 150, EstimateDirection::Under, 1.5)]
#[case::overestimated(200, 50, EstimateDirection::Over, 4.0)]
#[case::exact(100, 100, EstimateDirection::None, 1.0)]
fn test_planner_estimate(
    #[case] planned: u64,
    #[case] actual: u64,
    #[case] direction: EstimateDirection,
    #[case] factor: f64,
) {
    let mut root = PlanNode::new("Seq Scan on t");
    root.plan_rows = Some(planned);
    root.actual_rows = Some(actual);

    let tree = analyzed(root);
    assert_eq!(tree.plan.planner_estimate_direction, Some(direction));
    assert_eq!(tree.plan.planner_estimate_factor, Some(factor));
}

#[test]
fn test_no_estimate_without_actual_rows() {
    let mut root = PlanNode::new("Seq Scan on t");
    root.plan_rows = Some(100);
    root.actual_rows = Some(0);

    let tree = analyzed(root);
    assert_eq!(tree.plan.planner_estimate_direction, None);
    assert_eq!(tree.plan.planner_estimate_factor, None);
}

#[test]
fn test_never_executed_node_is_untouched() {
    let text = "Seq Scan on t  (cost=0.00..10.00 rows=100 width=4) (never executed)";
    let mut tree = from_text(text).expect("parse failed");
    analyze_tree(&mut tree);

    assert_eq!(tree.plan.planner_estimate_direction, None);
    assert_eq!(tree.plan.planner_estimate_factor, None);
}

// ============================================================================
// Exclusive cost
// ============================================================================

#[test]
fn test_exclusive_cost_subtracts_children() {
    let root = costed("Aggregate", 100.0).with_child(costed("Seq Scan on t", 30.0));

    let tree = analyzed(root);
    assert_eq!(tree.plan.actual_cost, Some(70.0));
    assert_eq!(tree.plan.plans[0].actual_cost, Some(30.0));
}

#[test]
fn test_exclusive_cost_clamps_at_zero() {
    let root = costed("Limit", 10.0).with_child(costed("Seq Scan on t", 30.0));

    let tree = analyzed(root);
    assert_eq!(tree.plan.actual_cost, Some(0.0));
}

#[test]
fn test_init_plan_cost_is_not_subtracted() {
    let mut init = costed("Aggregate", 30.0);
    init.parent_relationship = Some("InitPlan".to_string());
    let root = costed("Result", 100.0)
        .with_child(init)
        .with_child(costed("Seq Scan on t", 20.0));

    let tree = analyzed(root);
    assert_eq!(tree.plan.actual_cost, Some(80.0));
}

#[test]
fn test_missing_cost_stays_unset() {
    let tree = analyzed(PlanNode::new("Result"));
    assert_eq!(tree.plan.actual_cost, None);
}

// ============================================================================
// Exclusive duration
// ============================================================================

#[test]
fn test_duration_scales_by_loops_and_subtracts_children() {
    let root = timed("Nested Loop", 10.0, 3).with_child(timed("Seq Scan on t", 5.0, 1));

    let tree = analyzed(root);
    assert_eq!(tree.plan.plans[0].actual_duration, Some(5.0));
    assert_eq!(tree.plan.actual_duration, Some(25.0));
}

#[test]
fn test_duration_subtracts_whole_descendant_chain() {
    let grandchild = timed("Seq Scan on t", 3.0, 1);
    let child = timed("Sort", 8.0, 1).with_child(grandchild);
    let root = timed("Aggregate", 20.0, 1).with_child(child);

    let tree = analyzed(root);
    assert_eq!(tree.plan.plans[0].plans[0].actual_duration, Some(3.0));
    assert_eq!(tree.plan.plans[0].actual_duration, Some(5.0));
    assert_eq!(tree.plan.actual_duration, Some(12.0));
}

#[test]
fn test_init_plan_subtree_excluded_from_duration() {
    let mut init = timed("Aggregate", 5.0, 1);
    init.parent_relationship = Some("InitPlan".to_string());
    let root = timed("Result", 20.0, 1)
        .with_child(init)
        .with_child(timed("Seq Scan on t", 8.0, 1));

    let tree = analyzed(root);
    assert_eq!(tree.plan.actual_duration, Some(12.0));
}

#[test]
fn test_missing_time_leaves_duration_unset() {
    let tree = analyzed(costed("Result", 1.0));
    assert_eq!(tree.plan.actual_duration, None);
}

// ============================================================================
// Parallelism
// ============================================================================

#[test]
fn test_gather_children_are_parallel() {
    let root = timed("Gather", 50.0, 1).with_child(timed("Parallel Seq Scan on t", 10.0, 3));

    let tree = analyzed(root);
    let child = &tree.plan.plans[0];

    // Worker time is not scaled by loops; the loop count marks parallelism.
    assert_eq!(child.parallel, Some(true));
    assert_eq!(child.actual_duration, Some(10.0));

    // The Gather node itself ran in the leader.
    assert_eq!(tree.plan.parallel, None);
    assert_eq!(tree.plan.actual_duration, Some(40.0));
}

#[test]
fn test_single_loop_parallel_child_is_not_marked_parallel() {
    let root = timed("Gather Merge", 50.0, 1).with_child(timed("Sort", 10.0, 1));

    let tree = analyzed(root);
    assert_eq!(tree.plan.plans[0].parallel, Some(false));
}

#[test]
fn test_parallelism_propagates_below_gather() {
    let scan = timed("Parallel Seq Scan on t", 4.0, 3);
    let sort = timed("Sort", 10.0, 3).with_child(scan);
    let root = timed("Gather Merge", 50.0, 1).with_child(sort);

    let tree = analyzed(root);
    let sort = &tree.plan.plans[0];

    assert_eq!(sort.parallel, Some(true));
    assert_eq!(sort.plans[0].parallel, Some(true));
    // Neither level is scaled by its loop count.
    assert_eq!(sort.plans[0].actual_duration, Some(4.0));
    assert_eq!(sort.actual_duration, Some(6.0));
}

// ============================================================================
// Maxima and outlier tags
// ============================================================================

#[test]
fn test_maxima_and_outliers_on_a_real_tree() {
    let text = r#"Hash Join  (cost=11.00..120.00 rows=500 width=72) (actual time=0.100..5.000 rows=480 loops=1)
  ->  Seq Scan on orders o  (cost=0.00..50.00 rows=1000 width=36) (actual time=0.010..2.000 rows=1000 loops=1)
  ->  Hash  (cost=5.00..10.00 rows=100 width=36) (actual time=0.050..0.500 rows=100 loops=1)
        ->  Seq Scan on users u  (cost=0.00..5.00 rows=100 width=36) (actual time=0.005..0.200 rows=100 loops=1)"#;
    let mut tree = from_text(text).expect("parse failed");
    analyze_tree(&mut tree);

    assert_eq!(tree.maximum_rows, Some(1000));
    assert_eq!(tree.maximum_costs, Some(60.0));
    assert_eq!(tree.maximum_duration, Some(2.5));

    let root = &tree.plan;
    assert_eq!(root.actual_cost, Some(60.0));
    assert_eq!(root.actual_duration, Some(2.5));
    assert_eq!(root.costliest_node, Some(true));
    assert_eq!(root.slowest_node, Some(true));
    assert_eq!(root.largest_node, None);

    let orders = &root.plans[0];
    assert_eq!(orders.largest_node, Some(true));
    assert_eq!(orders.costliest_node, None);
    assert_eq!(orders.slowest_node, None);
}

#[test]
fn test_outlier_ties_tag_every_maximum() {
    let mut left = costed("Seq Scan on a", 30.0);
    left.actual_rows = Some(100);
    let mut right = costed("Seq Scan on b", 30.0);
    right.actual_rows = Some(100);
    let root = PlanNode::new("Append").with_child(left).with_child(right);

    let tree = analyzed(root);
    assert_eq!(tree.plan.plans[0].costliest_node, Some(true));
    assert_eq!(tree.plan.plans[1].costliest_node, Some(true));
    assert_eq!(tree.plan.plans[0].largest_node, Some(true));
    assert_eq!(tree.plan.plans[1].largest_node, Some(true));
    assert_eq!(tree.plan.costliest_node, None);
}

#[test]
fn test_largest_node_excludes_zero_rows() {
    let mut root = PlanNode::new("Result");
    root.actual_rows = Some(0);

    let tree = analyzed(root);
    assert_eq!(tree.maximum_rows, Some(0));
    assert_eq!(tree.plan.largest_node, None);
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_analyze_is_idempotent() {
    let text = r#"Gather  (cost=0.00..100.00 rows=1000 width=8) (actual time=0.100..9.000 rows=1000 loops=1)
  ->  Parallel Seq Scan on t  (cost=0.00..90.00 rows=500 width=8) (actual time=0.050..7.000 rows=333 loops=3)"#;
    let mut tree = from_text(text).expect("parse failed");

    analyze_tree(&mut tree);
    let first = serde_json::to_value(&tree).expect("serialize failed");
    analyze_tree(&mut tree);
    let second = serde_json::to_value(&tree).expect("serialize failed");

    assert_eq!(first, second);
}

#[test]
fn test_estimate_factor_is_at_least_one() {
    let text = r#"Nested Loop  (cost=0.00..60.00 rows=10 width=8) (actual time=0.100..5.000 rows=400 loops=1)
  ->  Seq Scan on a  (cost=0.00..20.00 rows=200 width=4) (actual time=0.010..1.000 rows=20 loops=1)
  ->  Index Scan using i on b  (cost=0.00..2.00 rows=1 width=4) (actual time=0.005..0.010 rows=20 loops=20)"#;
    let mut tree = from_text(text).expect("parse failed");
    analyze_tree(&mut tree);

    for node in tree.iter_nodes() {
        if let Some(factor) = node.planner_estimate_factor {
            assert!(factor >= 1.0, "factor {factor} below 1");
        }
    }
}

#[test]
fn test_actual_cost_is_never_negative() {
    let root = costed("Limit", 1.0)
        .with_child(costed("Sort", 50.0).with_child(costed("Seq Scan on t", 40.0)));
    let tree = analyzed(root);

    for node in tree.iter_nodes() {
        if let Some(cost) = node.actual_cost {
            assert!(cost >= 0.0, "cost {cost} below 0");
        }
    }
}
