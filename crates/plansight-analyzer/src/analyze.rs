//! Plan analyzer.
//!
//! Walks the tree once, computing planner estimate accuracy on the way down
//! and exclusive durations and costs on the way back up, then tags the
//! costliest, largest, and slowest nodes. The tree-wide maxima live in a
//! per-call struct threaded through the walk, so concurrent analyses of
//! distinct plans are safe.

use plansight_plan::{EstimateDirection, Plan, PlanNode, PlanTree};

/// Tree-wide maxima gathered during one analysis pass.
#[derive(Debug, Default)]
struct Maxima {
    rows: u64,
    cost: f64,
    duration: f64,
}

/// Analyzes a plan envelope in place.
pub fn analyze(plan: &mut Plan) {
    analyze_tree(&mut plan.content);
}

/// Analyzes a bare plan tree in place.
///
/// Derived properties are recomputed from the parsed ones, so analyzing a
/// tree twice yields the same annotations.
pub fn analyze_tree(tree: &mut PlanTree) {
    let mut maxima = Maxima::default();
    process_node(&mut tree.plan, false, &mut maxima);
    tree.maximum_rows = Some(maxima.rows);
    tree.maximum_costs = Some(maxima.cost);
    tree.maximum_duration = Some(maxima.duration);
    tag_outliers(&mut tree.plan, &maxima);
}

fn process_node(node: &mut PlanNode, parallel: bool, maxima: &mut Maxima) {
    calculate_planner_estimate(node);

    // Everything under a Gather or Gather Merge runs in parallel workers.
    let is_parallel = parallel || node.is_gather();
    for child in &mut node.plans {
        process_node(child, is_parallel, maxima);
    }

    // Children first: exclusive durations build on theirs.
    calculate_actuals(node, parallel);
    update_maxima(node, maxima);
}

/// Records how far off the planner's row estimate was, as a factor >= 1
/// plus a direction. Nodes that produced no rows are left untouched.
fn calculate_planner_estimate(node: &mut PlanNode) {
    let actual = match node.actual_rows {
        Some(rows) if rows > 0 => rows as f64,
        _ => return,
    };
    let planned = match node.plan_rows {
        Some(rows) if rows > 0 => rows as f64,
        _ => return,
    };

    let ratio = actual / planned;
    if ratio > 1.0 {
        node.planner_estimate_direction = Some(EstimateDirection::Under);
        node.planner_estimate_factor = Some(ratio);
    } else if ratio < 1.0 {
        node.planner_estimate_direction = Some(EstimateDirection::Over);
        node.planner_estimate_factor = Some(planned / actual);
    } else {
        node.planner_estimate_direction = Some(EstimateDirection::None);
        node.planner_estimate_factor = Some(ratio);
    }
}

fn calculate_actuals(node: &mut PlanNode, parallel: bool) {
    if let Some(total_time) = node.actual_total_time {
        let mut duration = total_time;
        if parallel {
            node.parallel = Some(node.actual_loops.unwrap_or(0) > 1);
        } else {
            // Reported time is a per-loop average.
            duration *= node.actual_loops.unwrap_or(1) as f64;
        }
        node.actual_duration = Some(duration - children_duration(node));
    }

    if let Some(total_cost) = node.total_cost {
        let mut cost = total_cost;
        for child in &node.plans {
            // InitPlan cost is accounted once, at its declaration point.
            if child.is_init_plan() {
                continue;
            }
            if let Some(child_cost) = child.total_cost {
                cost -= child_cost;
            }
        }
        node.actual_cost = Some(cost.max(0.0));
    }
}

/// Sums the exclusive durations of all descendants, skipping InitPlan
/// subtrees. The children have already been processed, so summing every
/// descendant's exclusive duration yields the children's inclusive time.
fn children_duration(node: &PlanNode) -> f64 {
    let mut total = 0.0;
    for child in &node.plans {
        if child.is_init_plan() {
            continue;
        }
        total += child.actual_duration.unwrap_or(0.0);
        total += children_duration(child);
    }
    total
}

fn update_maxima(node: &PlanNode, maxima: &mut Maxima) {
    if let Some(rows) = node.actual_rows {
        maxima.rows = maxima.rows.max(rows);
    }
    if let Some(cost) = node.actual_cost {
        maxima.cost = maxima.cost.max(cost);
    }
    if let Some(duration) = node.actual_duration {
        maxima.duration = maxima.duration.max(duration);
    }
}

/// Tags every node sitting at a tree-wide maximum; ties tag multiple nodes.
fn tag_outliers(node: &mut PlanNode, maxima: &Maxima) {
    if node.actual_cost == Some(maxima.cost) {
        node.costliest_node = Some(true);
    }
    if node.actual_rows == Some(maxima.rows) && maxima.rows != 0 {
        node.largest_node = Some(true);
    }
    if node.actual_duration == Some(maxima.duration) {
        node.slowest_node = Some(true);
    }
    for child in &mut node.plans {
        tag_outliers(child, maxima);
    }
}

#[cfg(test)]
mod tests;
