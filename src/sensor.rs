//! Sensor tree model and lookup.
//!
//! The monitoring service publishes its readings as an arbitrarily nested tree
//! of objects, each optionally carrying an `id`, a display `Value` and a list of
//! `Children`. The tree is decoded per poll and dropped right after the two
//! readings we care about have been pulled out of it.

use serde_json::Value;
use std::collections::HashMap;

/// One object in the sensor tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SensorNode {
    pub id: Option<i64>,
    pub value: Option<String>,
    pub children: Vec<SensorTree>,
}

/// Loosely-typed JSON narrowed down to the shapes the lookup cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorTree {
    Node(SensorNode),
    List(Vec<SensorTree>),
    /// Strings, numbers, booleans and nulls. Never descended into.
    Scalar,
}

impl SensorTree {
    /// Decode a raw response body.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        Ok(SensorTree::from(value))
    }
}

impl From<Value> for SensorTree {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                let id = map.get("id").and_then(Value::as_i64);
                let value = map.get("Value").and_then(display_value);
                let children = match map.remove("Children") {
                    Some(Value::Array(items)) => items.into_iter().map(SensorTree::from).collect(),
                    _ => Vec::new(),
                };
                SensorTree::Node(SensorNode { id, value, children })
            }
            Value::Array(items) => SensorTree::List(items.into_iter().map(SensorTree::from).collect()),
            _ => SensorTree::Scalar,
        }
    }
}

/// Render a `Value` field for display. Containers and null count as missing.
fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The CPU and GPU sensor ids the overlay displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetIdSet {
    cpu: i64,
    gpu: i64,
}

impl TargetIdSet {
    pub fn new(cpu: i64, gpu: i64) -> Self {
        Self { cpu, gpu }
    }

    pub fn cpu(&self) -> i64 {
        self.cpu
    }

    pub fn gpu(&self) -> i64 {
        self.gpu
    }

    pub fn contains(&self, id: i64) -> bool {
        id == self.cpu || id == self.gpu
    }

    /// Number of distinct ids in the set. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        if self.cpu == self.gpu {
            1
        } else {
            2
        }
    }
}

/// Matched nodes keyed by id. Ids that were not found are simply absent.
pub type ResultMap<'a> = HashMap<i64, &'a SensorNode>;

/// Find the first node (depth-first, pre-order, document order) for every
/// target id present in `tree`.
pub fn find_nodes_by_id<'a>(tree: &'a SensorTree, targets: &TargetIdSet) -> ResultMap<'a> {
    let mut found = ResultMap::new();
    collect(tree, targets, &mut found);
    found
}

fn collect<'a>(tree: &'a SensorTree, targets: &TargetIdSet, found: &mut ResultMap<'a>) {
    if found.len() == targets.len() {
        return;
    }

    match tree {
        SensorTree::Node(node) => {
            if let Some(id) = node.id.filter(|id| targets.contains(*id)) {
                found.entry(id).or_insert(node);
            }
            for child in &node.children {
                collect(child, targets, found);
            }
        }
        SensorTree::List(items) => {
            for item in items {
                collect(item, targets, found);
            }
        }
        SensorTree::Scalar => {}
    }
}
