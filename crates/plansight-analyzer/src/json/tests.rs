//! Tests for the duplicate-key-tolerant JSON parser

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// Well-formed plans
// ============================================================================

#[test]
fn test_parse_array_wrapped_plan() {
    let source = r#"[
  {
    "Plan": {
      "Node Type": "Hash Join",
      "Join Type": "Inner",
      "Startup Cost": 10.0,
      "Total Cost": 100.0,
      "Plan Rows": 500,
      "Plan Width": 72,
      "Plans": [
        {
          "Node Type": "Seq Scan",
          "Parent Relationship": "Outer",
          "Relation Name": "orders",
          "Total Cost": 50.0
        },
        {
          "Node Type": "Hash",
          "Parent Relationship": "Inner",
          "Total Cost": 10.0
        }
      ]
    },
    "Planning Time": 0.156,
    "Execution Time": 5.5
  }
]"#;

    let tree = from_json(source).expect("parse failed");

    assert_eq!(tree.plan.node_type, "Hash Join");
    assert_eq!(tree.plan.total_cost, Some(100.0));
    assert_eq!(tree.plan.plans.len(), 2);
    assert_eq!(tree.plan.plans[0].extra["Relation Name"], json!("orders"));
    assert_eq!(
        tree.plan.plans[0].parent_relationship.as_deref(),
        Some("Outer")
    );
    assert_eq!(tree.extra["Planning Time"], json!(0.156));
    assert_eq!(tree.extra["Execution Time"], json!(5.5));
}

#[test]
fn test_parse_object_root() {
    let source = r#"{
  "Plan": {
    "Node Type": "Result"
  }
}"#;

    let tree = from_json(source).expect("parse failed");
    assert_eq!(tree.plan.node_type, "Result");
}

#[test]
fn test_parse_plan_with_triggers() {
    let source = r#"[
  {
    "Plan": {
      "Node Type": "ModifyTable",
      "Operation": "Insert"
    },
    "Triggers": [
      {"Trigger Name": "check_stock", "Relation": "orders", "Time": 0.05, "Calls": 2}
    ]
  }
]"#;

    let tree = from_json(source).expect("parse failed");
    let triggers = tree.triggers.as_deref().expect("no triggers");

    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].trigger_name, "check_stock");
    assert_eq!(triggers[0].time, 0.05);
    assert_eq!(triggers[0].calls, "2");
}

#[test]
fn test_surrounding_noise_is_trimmed() {
    let source = r#"                 QUERY PLAN
----------------------------------------
 [
   {
     "Plan": {
       "Node Type": "Seq Scan",
       "Relation Name": "t"
     }
   }
 ]
(1 row)"#;

    let tree = from_json(source).expect("parse failed");
    assert_eq!(tree.plan.node_type, "Seq Scan");
    assert_eq!(tree.plan.extra["Relation Name"], json!("t"));
}

// ============================================================================
// Duplicate keys
// ============================================================================

#[test]
fn test_duplicate_worker_keys_merge_into_one_object() {
    let source = r#"[
  {
    "Plan": {
      "Node Type": "Sort",
      "Workers": [
        {"Worker Number": 0, "Actual Rows": 600, "Actual Loops": 1}
      ],
      "Worker": {"Worker Number": 0, "Sort Method": "quicksort"},
      "Worker": {"Worker Number": 1, "Sort Space Used": 2496}
    }
  }
]"#;

    let tree = from_json(source).expect("parse failed");
    let node = &tree.plan;

    // The typed worker list is untouched by the duplicate keys.
    assert_eq!(node.workers.len(), 1);
    assert_eq!(node.workers[0].actual_rows, Some(600));

    // Both duplicate payloads survive in one merged object.
    assert_eq!(
        node.extra["Worker"],
        json!({
            "Worker Number": 1,
            "Sort Method": "quicksort",
            "Sort Space Used": 2496
        })
    );
}

#[test]
fn test_duplicate_array_keys_concatenate() {
    let source = r#"[
  {
    "Plan": {
      "Node Type": "Sort",
      "Workers": [
        {"Worker Number": 0, "Actual Rows": 600}
      ],
      "Workers": [
        {"Worker Number": 1, "Actual Rows": 580}
      ]
    }
  }
]"#;

    let tree = from_json(source).expect("parse failed");
    assert_eq!(tree.plan.workers.len(), 2);
    assert_eq!(tree.plan.workers[0].worker_number, 0);
    assert_eq!(tree.plan.workers[1].worker_number, 1);
}

#[test]
fn test_duplicate_keys_merge_recursively() {
    let source = r#"{
  "Plan": {
    "Node Type": "Sort",
    "Worker": {"Timing": {"Startup": 0.1}},
    "Worker": {"Timing": {"Total": 0.9}}
  }
}"#;

    let tree = from_json(source).expect("parse failed");
    assert_eq!(
        tree.plan.extra["Worker"],
        json!({"Timing": {"Startup": 0.1, "Total": 0.9}})
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_invalid_json_fails_tokenization() {
    let err = from_json("{ not json }}").expect_err("parse should fail");
    assert!(matches!(err, ParseError::InvalidJson(_)));
}

#[test]
fn test_missing_plan_key_fails() {
    let source = r#"{
  "Something": 1
}"#;
    let err = from_json(source).expect_err("parse should fail");
    assert!(matches!(err, ParseError::MissingPlan));
}

#[test]
fn test_empty_array_fails() {
    let err = from_json("[\n]").expect_err("parse should fail");
    assert!(matches!(err, ParseError::MissingPlan));
}

// ============================================================================
// Merge helper
// ============================================================================

#[test]
fn test_deep_merge_unions_objects() {
    let mut target = json!({"a": 1, "nested": {"x": 1}});
    deep_merge(&mut target, json!({"b": 2, "nested": {"y": 2}}));
    assert_eq!(target, json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 2}}));
}

#[test]
fn test_deep_merge_concatenates_arrays() {
    let mut target = json!([1, 2]);
    deep_merge(&mut target, json!([3]));
    assert_eq!(target, json!([1, 2, 3]));
}

#[test]
fn test_deep_merge_scalar_right_wins() {
    let mut target = json!({"a": 1});
    deep_merge(&mut target, json!({"a": "two"}));
    assert_eq!(target, json!({"a": "two"}));
}
