//! Text-format EXPLAIN parser.
//!
//! Reconstructs a plan tree from PostgreSQL's line-oriented, indentation
//! sensitive output. Six line shapes are recognized, tried in order:
//! node lines (with cost and optional timing parentheses), `SubPlan` /
//! `InitPlan` markers, `CTE` markers, `Worker N:` statistics, `Trigger`
//! statistics, and free-form `Label: value` attribute lines.
//!
//! The format has no closing tokens; depth is reconstructed from column
//! positions. An ordered stack of `(prefix_length, element)` pairs holds the
//! open ancestors, shrunk with a "pop while top >= mine" rule before each
//! new element is attached. Marker elements alias the node they annotate, so
//! nodes live in an arena and the tree is assembled once all lines are
//! consumed.

use std::mem;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Number, Value};

use crate::error::{ParseError, Result};
use plansight_plan::{PlanNode, PlanTree, Trigger, Worker};

static NODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<prefix>\s*->\s*|\s*)(?P<kind>\S.*?)\s+",
        r"\(cost=(?P<startup>\d+\.\d+)\.\.(?P<total>\d+\.\d+)\s+",
        r"rows=(?P<rows>\d+)\s+width=(?P<width>\d+)\)",
        r"(?:\s+\((?:",
        r"actual\s+time=(?P<atime_start>\d+\.\d+)\.\.(?P<atime_total>\d+\.\d+)\s+",
        r"rows=(?P<arows>\d+)\s+loops=(?P<aloops>\d+)",
        r"|actual\s+rows=(?P<orows>\d+)\s+loops=(?P<oloops>\d+)",
        r"|(?P<never>never executed)",
        r")\))?\s*$",
    ))
    .expect("valid regex")
});

static SUBPLAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>\s*)(?P<kind>SubPlan|InitPlan)\s*(?:\d+\s*)?(?:\(returns.*\)\s*)?$")
        .expect("valid regex")
});

static CTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<prefix>\s*)CTE\s+(?P<name>\S+)\s*$").expect("valid regex"));

static WORKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<prefix>\s*)Worker\s+(?P<number>\d+):\s+",
        r"(?:",
        r"actual\s+time=(?P<atime_start>\d+\.\d+)\.\.(?P<atime_total>\d+\.\d+)\s+",
        r"rows=(?P<arows>\d+)\s+loops=(?P<aloops>\d+)",
        r"|actual\s+rows=(?P<orows>\d+)\s+loops=(?P<oloops>\d+)",
        r"|(?P<never>never executed)",
        r")?(?P<extra>.*?)\s*$",
    ))
    .expect("valid regex")
});

static TRIGGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Trigger\s+(?P<name>.*):\s+time=(?P<time>\d+\.\d+)\s+calls=(?P<calls>\d+)\s*$")
        .expect("valid regex")
});

static EXTRA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<prefix>\s*)(?P<content>\S.*\S)\s*$").expect("valid regex"));

static SORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Sort Method:\s+(?P<method>.*)\s+(?P<space>Memory|Disk):\s+(?P<used>\S*)kB\s*$")
        .expect("valid regex")
});

static BUFFERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Buffers:\s+(?P<detail>.*?)\s*$").expect("valid regex"));

static BUFFER_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>shared|temp|local)\s+(?P<counts>.*)$").expect("valid regex")
});

/// Parses text-format EXPLAIN output into a plan tree.
///
/// Unrecognized lines are skipped; the parse fails only when no plan node
/// is found at all.
pub fn from_text(source: &str) -> Result<PlanTree> {
    let mut parser = TextParser::default();
    for line in source.lines() {
        parser.consume(strip_csv_quotes(line));
    }
    parser.finish()
}

/// Removes a pair of double quotes wrapping a whole line (CSV artifact).
fn strip_csv_quotes(line: &str) -> &str {
    if line.len() >= 2 && line.starts_with('"') && line.ends_with('"') {
        &line[1..line.len() - 1]
    } else {
        line
    }
}

/// An open ancestor on the depth stack.
enum Element {
    /// The element is a node.
    Node { id: usize },
    /// A `SubPlan` marker; the next child attached under it belongs to the
    /// node at `id` with a SubPlan relationship.
    SubPlan { id: usize, name: String },
    /// An `InitPlan` or `CTE` marker; as above with an InitPlan relationship.
    InitPlan { id: usize, name: String },
}

impl Element {
    fn node_id(&self) -> usize {
        match self {
            Element::Node { id }
            | Element::SubPlan { id, .. }
            | Element::InitPlan { id, .. } => *id,
        }
    }
}

#[derive(Default)]
struct TextParser {
    /// Node arena; the tree is assembled from it at the end.
    nodes: Vec<PlanNode>,
    /// Arena ids of each node's children, parallel to `nodes`.
    children: Vec<Vec<usize>>,
    /// Open ancestors as `(prefix_length, element)` pairs.
    stack: Vec<(usize, Element)>,
    root: Option<usize>,
    triggers: Vec<Trigger>,
    /// Plan-level attributes (`Planning Time`, `Execution Time`, ...).
    attributes: Map<String, Value>,
}

impl TextParser {
    fn consume(&mut self, line: &str) {
        if let Some(caps) = NODE_RE.captures(line) {
            self.node_line(&caps);
        } else if let Some(caps) = SUBPLAN_RE.captures(line) {
            let init = &caps["kind"] == "InitPlan";
            self.marker_line(caps["prefix"].len(), line.trim().to_string(), init);
        } else if let Some(caps) = CTE_RE.captures(line) {
            let name = format!("CTE {}", &caps["name"]);
            self.marker_line(caps["prefix"].len(), name, true);
        } else if let Some(caps) = WORKER_RE.captures(line) {
            self.worker_line(&caps);
        } else if let Some(caps) = TRIGGER_RE.captures(line) {
            self.trigger_line(&caps);
        } else if let Some(caps) = EXTRA_RE.captures(line) {
            self.extra_line(&caps);
        }
    }

    fn node_line(&mut self, caps: &Captures) {
        let prefix = caps.name("prefix").map_or("", |m| m.as_str());
        // The column of the arrow, not the arrow's own width, is the depth.
        let prefix_len = prefix.find("->").unwrap_or(prefix.len());

        let mut node = PlanNode::new(&caps["kind"]);
        node.startup_cost = cap_f64(caps, "startup");
        node.total_cost = cap_f64(caps, "total");
        node.plan_rows = cap_u64(caps, "rows");
        node.plan_width = cap_u64(caps, "width");
        if let Some(measured) = parse_measurements(caps) {
            node.actual_startup_time = measured.startup_time;
            node.actual_total_time = measured.total_time;
            node.actual_rows = measured.rows;
            node.actual_loops = measured.loops;
        }

        let id = self.alloc(node);
        if self.root.is_none() {
            self.root = Some(id);
            self.stack.push((prefix_len, Element::Node { id }));
            return;
        }

        self.shrink_to(prefix_len);
        let Some((_, parent)) = self.stack.last() else {
            tracing::warn!(
                "plan node at column {} has no open parent, skipping",
                prefix_len
            );
            return;
        };
        let parent_id = parent.node_id();
        match parent {
            Element::SubPlan { name, .. } => {
                self.nodes[id].parent_relationship = Some("SubPlan".to_string());
                self.nodes[id].subplan_name = Some(name.clone());
            }
            Element::InitPlan { name, .. } => {
                self.nodes[id].parent_relationship = Some("InitPlan".to_string());
                self.nodes[id].subplan_name = Some(name.clone());
            }
            Element::Node { .. } => {}
        }
        self.children[parent_id].push(id);
        self.stack.push((prefix_len, Element::Node { id }));
    }

    fn marker_line(&mut self, prefix_len: usize, name: String, init: bool) {
        self.shrink_to(prefix_len);
        let Some((_, parent)) = self.stack.last() else {
            tracing::warn!("sub-plan marker has no open parent, skipping: {name}");
            return;
        };
        let id = parent.node_id();
        let element = if init {
            Element::InitPlan { id, name }
        } else {
            Element::SubPlan { id, name }
        };
        self.stack.push((prefix_len, element));
    }

    fn worker_line(&mut self, caps: &Captures) {
        self.shrink_to(caps["prefix"].len());
        let Some((_, element)) = self.stack.last() else {
            tracing::warn!("worker line has no open node, skipping");
            return;
        };
        let node_id = element.node_id();
        let Some(number) = cap_u64(caps, "number") else {
            return;
        };

        let node = &mut self.nodes[node_id];
        let index = match node.workers.iter().position(|w| w.worker_number == number) {
            Some(index) => index,
            None => {
                node.workers.push(Worker::new(number));
                node.workers.len() - 1
            }
        };
        let worker = &mut node.workers[index];
        if let Some(measured) = parse_measurements(caps) {
            worker.actual_startup_time = measured.startup_time;
            worker.actual_total_time = measured.total_time;
            worker.actual_rows = measured.rows;
            worker.actual_loops = measured.loops;
        }

        let extra = caps.name("extra").map_or("", |m| m.as_str());
        if apply_sort(extra, worker) {
            return;
        }
        if let Some((label, value)) = split_attribute(extra) {
            worker
                .extra
                .insert(title_case(label), Value::String(value.to_string()));
        }
    }

    fn trigger_line(&mut self, caps: &Captures) {
        let Some(time) = cap_f64(caps, "time") else {
            return;
        };
        self.triggers.push(Trigger {
            trigger_name: caps["name"].to_string(),
            time,
            calls: caps["calls"].to_string(),
            extra: Map::new(),
        });
    }

    fn extra_line(&mut self, caps: &Captures) {
        let content = caps.name("content").map_or("", |m| m.as_str());
        self.shrink_to(caps["prefix"].len());
        match self.stack.last() {
            Some((_, element)) => {
                let id = element.node_id();
                apply_attribute(content, &mut self.nodes[id]);
            }
            // Lines outdented past every node ("Planning Time", "Execution
            // Time", ...) are attributes of the plan itself.
            None => apply_attribute(content, &mut self.attributes),
        }
    }

    /// Discards open ancestors at or beyond the given column.
    fn shrink_to(&mut self, prefix_len: usize) {
        while self
            .stack
            .last()
            .is_some_and(|(depth, _)| *depth >= prefix_len)
        {
            self.stack.pop();
        }
    }

    fn alloc(&mut self, node: PlanNode) -> usize {
        self.nodes.push(node);
        self.children.push(Vec::new());
        self.nodes.len() - 1
    }

    fn finish(mut self) -> Result<PlanTree> {
        let root = self.root.ok_or(ParseError::MissingPlan)?;
        let plan = self.assemble(root);
        let mut tree = PlanTree::new(plan);
        if !self.triggers.is_empty() {
            tree.triggers = Some(self.triggers);
        }
        tree.extra = self.attributes;
        Ok(tree)
    }

    fn assemble(&mut self, id: usize) -> PlanNode {
        let mut node = mem::take(&mut self.nodes[id]);
        for child in mem::take(&mut self.children[id]) {
            let child = self.assemble(child);
            node.plans.push(child);
        }
        node
    }
}

/// Measurements captured from the timing parenthesis of a node or worker
/// line.
struct Measurements {
    startup_time: Option<f64>,
    total_time: Option<f64>,
    rows: Option<u64>,
    loops: Option<u64>,
}

fn parse_measurements(caps: &Captures) -> Option<Measurements> {
    if caps.name("atime_start").is_some() {
        Some(Measurements {
            startup_time: cap_f64(caps, "atime_start"),
            total_time: cap_f64(caps, "atime_total"),
            rows: cap_u64(caps, "arows"),
            loops: cap_u64(caps, "aloops"),
        })
    } else if caps.name("orows").is_some() {
        Some(Measurements {
            startup_time: None,
            total_time: None,
            rows: cap_u64(caps, "orows"),
            loops: cap_u64(caps, "oloops"),
        })
    } else if caps.name("never").is_some() {
        // A node that never ran reports nothing; record explicit zeros.
        Some(Measurements {
            startup_time: None,
            total_time: Some(0.0),
            rows: Some(0),
            loops: Some(0),
        })
    } else {
        None
    }
}

/// Attribute sink shared by plan nodes, workers, and the plan-level map.
trait AttributeSink {
    fn set_sort(&mut self, method: String, space_type: String, space_used: Option<f64>);
    fn put(&mut self, key: String, value: Value);
}

impl AttributeSink for PlanNode {
    fn set_sort(&mut self, method: String, space_type: String, space_used: Option<f64>) {
        self.sort_method = Some(method);
        self.sort_space_type = Some(space_type);
        self.sort_space_used = space_used;
    }

    fn put(&mut self, key: String, value: Value) {
        self.extra.insert(key, value);
    }
}

impl AttributeSink for Worker {
    fn set_sort(&mut self, method: String, space_type: String, space_used: Option<f64>) {
        self.sort_method = Some(method);
        self.sort_space_type = Some(space_type);
        self.sort_space_used = space_used;
    }

    fn put(&mut self, key: String, value: Value) {
        self.extra.insert(key, value);
    }
}

impl AttributeSink for Map<String, Value> {
    fn set_sort(&mut self, method: String, space_type: String, space_used: Option<f64>) {
        self.insert("Sort Method".to_string(), Value::String(method));
        self.insert("Sort Space Type".to_string(), Value::String(space_type));
        if let Some(number) = space_used.and_then(Number::from_f64) {
            self.insert("Sort Space Used".to_string(), Value::Number(number));
        }
    }

    fn put(&mut self, key: String, value: Value) {
        self.insert(key, value);
    }
}

/// Interprets a free-form attribute line: sort statistics, buffer counters,
/// or a `Label: value` pair, in that order.
fn apply_attribute(text: &str, sink: &mut impl AttributeSink) {
    if apply_sort(text, sink) || apply_buffers(text, sink) {
        return;
    }
    if let Some((label, value)) = split_attribute(text) {
        let value = value.strip_suffix(" ms").unwrap_or(value);
        sink.put(title_case(label), scalar_value(value));
    }
}

fn apply_sort(text: &str, sink: &mut impl AttributeSink) -> bool {
    let Some(caps) = SORT_RE.captures(text) else {
        return false;
    };
    sink.set_sort(
        caps["method"].trim().to_string(),
        caps["space"].to_string(),
        caps["used"].parse().ok(),
    );
    true
}

/// Expands a `Buffers:` line into one `<Kind> <Method> Blocks` counter per
/// `method=count` pair, e.g. `shared hit=32` becomes `Shared Hit Blocks`.
fn apply_buffers(text: &str, sink: &mut impl AttributeSink) -> bool {
    let Some(caps) = BUFFERS_RE.captures(text) else {
        return false;
    };
    for segment in caps["detail"].split(',').map(str::trim) {
        let Some(seg) = BUFFER_SEGMENT_RE.captures(segment) else {
            continue;
        };
        let kind = title_case(&seg["kind"]);
        for pair in seg["counts"].split_whitespace() {
            let Some((method, count)) = pair.split_once('=') else {
                continue;
            };
            let Ok(count) = count.parse::<i64>() else {
                continue;
            };
            sink.put(
                format!("{kind} {} Blocks", title_case(method)),
                Value::Number(count.into()),
            );
        }
    }
    true
}

/// Splits `Label: value` on the first separator; both sides must be
/// non-empty after trimming.
fn split_attribute(text: &str) -> Option<(&str, &str)> {
    let (label, value) = text.split_once(": ")?;
    let label = label.trim();
    let value = value.trim();
    (!label.is_empty() && !value.is_empty()).then_some((label, value))
}

/// Splits on non-alphanumeric characters, capitalizes each token, and joins
/// with single spaces: `rows removed by filter` -> `Rows Removed By Filter`.
fn title_case(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Stores a value as an integer, a float, or a string, whichever fits first.
fn scalar_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = raw.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

fn cap_f64(caps: &Captures, name: &str) -> Option<f64> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn cap_u64(caps: &Captures, name: &str) -> Option<u64> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}
