//! JSON plan parser tolerant of duplicate keys.
//!
//! PostgreSQL repeats the `Worker` key inside a single node object, once per
//! parallel worker. That is invalid under strict JSON semantics, and
//! conventional parsers either reject it or keep only the last value. Here
//! the document is consumed through serde's event stream and duplicate keys
//! are deep-merged as they arrive, so every occurrence survives.

use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::map::Entry;
use serde_json::{Map, Number, Value};

use crate::error::{ParseError, Result};
use crate::source::json_block_range;
use plansight_plan::PlanTree;

/// Parses `EXPLAIN (FORMAT JSON)` output.
///
/// Lines outside the outermost bracketed block are trimmed away first, so
/// surrounding psql decoration is tolerated. A root array is unwrapped to
/// its first element.
pub fn from_json(source: &str) -> Result<PlanTree> {
    let trimmed = trim_to_block(source);
    let MergingValue(value) = serde_json::from_str(&trimmed)?;

    let value = match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => return Err(ParseError::MissingPlan),
        },
        other => other,
    };
    if value.get("Plan").is_none() {
        return Err(ParseError::MissingPlan);
    }

    serde_json::from_value(value).map_err(|err| ParseError::InvalidStructure(err.to_string()))
}

/// Cuts the source down to the outermost bracketed block, if one is found.
fn trim_to_block(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    match json_block_range(&lines) {
        Some((start, end)) => lines[start..=end].join("\n"),
        None => source.to_string(),
    }
}

/// A JSON value deserialized with duplicate-key merging.
struct MergingValue(Value);

impl<'de> Deserialize<'de> for MergingValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MergingVisitor).map(MergingValue)
    }
}

struct MergingVisitor;

impl<'de> Visitor<'de> for MergingVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any valid JSON value")
    }

    fn visit_bool<E>(self, value: bool) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Number(value.into()))
    }

    fn visit_u64<E>(self, value: u64) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Number(value.into()))
    }

    fn visit_f64<E>(self, value: f64) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Number::from_f64(value).map_or(Value::Null, Value::Number))
    }

    fn visit_str<E>(self, value: &str) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(value.to_owned()))
    }

    fn visit_string<E>(self, value: String) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(value))
    }

    fn visit_unit<E>(self) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(MergingValue(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut object = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            let MergingValue(value) = map.next_value()?;
            match object.entry(key) {
                Entry::Occupied(mut slot) => deep_merge(slot.get_mut(), value),
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
        }
        Ok(Value::Object(object))
    }
}

/// Merges `incoming` into `target`: objects union key-wise, recursing on
/// shared keys; arrays concatenate; anything else is replaced.
fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, value) in right {
                match left.entry(key) {
                    Entry::Occupied(mut slot) => deep_merge(slot.get_mut(), value),
                    Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => left.extend(right),
        (target, incoming) => *target = incoming,
    }
}

#[cfg(test)]
mod tests;
