use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Number};

/// A path segment addressing a child of a wrapped container.
///
/// This is intentionally "untagged" so a path can be written as a simple
/// array like `["foo", 0, "bar"]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum PathSegment {
  Key(String),
  Index(u64),
}

impl PathSegment {
  /// The fragment this segment contributes to a row id: `.key` or `[index]`.
  pub fn row_segment(&self) -> String {
    match self {
      PathSegment::Key(k) => format!(".{k}"),
      PathSegment::Index(i) => format!("[{i}]"),
    }
  }
}

impl From<&str> for PathSegment {
  fn from(k: &str) -> Self {
    PathSegment::Key(k.to_string())
  }
}

impl From<String> for PathSegment {
  fn from(k: String) -> Self {
    PathSegment::Key(k)
  }
}

impl From<u64> for PathSegment {
  fn from(i: u64) -> Self {
    PathSegment::Index(i)
  }
}

impl From<usize> for PathSegment {
  fn from(i: usize) -> Self {
    PathSegment::Index(i as u64)
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Sequence,
  Mapping,
}

/// One node of the size tree: the mirrored value plus its aggregate size.
///
/// Serializes as `{"value": ..., "size": n}` at every level.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SizeNode {
  pub value: SizeValue,
  pub size: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SizeValue {
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  /// Slots stay `None` where the source element was null or absent.
  Sequence(Vec<Option<SizeNode>>),
  /// Null entries are left out.
  Mapping(IndexMap<String, SizeNode>),
}

impl SizeNode {
  pub fn empty() -> Self {
    Self {
      value: SizeValue::Null,
      size: 0,
    }
  }

  pub fn is_container(&self) -> bool {
    matches!(self.value, SizeValue::Sequence(_) | SizeValue::Mapping(_))
  }

  /// Total number of size nodes in this tree, this one included.
  pub fn node_count(&self) -> usize {
    1 + match &self.value {
      SizeValue::Sequence(items) => items.iter().flatten().map(SizeNode::node_count).sum(),
      SizeValue::Mapping(entries) => entries.values().map(SizeNode::node_count).sum(),
      _ => 0,
    }
  }
}

/// One line of the hierarchical output table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlatRow {
  pub id: String,
  pub parent_id: String,
  pub size: u64,
  pub delta: i64,
}

/// Rows in the tabular shape a treemap consumes: a header line followed by
/// one `[id, parentId, size, delta]` line per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTable {
  pub rows: Vec<FlatRow>,
}

impl DataTable {
  pub const HEADER: [&'static str; 4] = ["Data", "Parent", "Size", "Delta"];

  pub fn new(rows: Vec<FlatRow>) -> Self {
    Self { rows }
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn find(&self, id: &str) -> Option<&FlatRow> {
    self.rows.iter().find(|r| r.id == id)
  }

  pub fn to_json(&self) -> serde_json::Value {
    let mut out = Vec::with_capacity(self.rows.len() + 1);
    out.push(json!(Self::HEADER));
    for r in &self.rows {
      out.push(json!([r.id, r.parent_id, r.size, r.delta]));
    }
    serde_json::Value::Array(out)
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
  /// A write or delete on a wrapped node.
  Mutation,
  /// An explicit `update()` call.
  Manual,
  /// The catch-up cycle run when a render surface is attached.
  Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleReport {
  pub trigger: CycleTrigger,
  pub rows: usize,
  pub root_size: u64,
  /// False when no surface was attached (or it was busy) so the render step was skipped.
  pub rendered: bool,
}
