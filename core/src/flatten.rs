use std::collections::HashMap;

use crate::models::{FlatRow, SizeNode, SizeValue};

/// Baseline size per row id, recorded the first time the id is flattened
/// with delta tracking on. Entries are never evicted.
#[derive(Debug, Clone, Default)]
pub struct FirstSeen {
  sizes: HashMap<String, u64>,
}

impl FirstSeen {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &str) -> Option<u64> {
    self.sizes.get(id).copied()
  }

  pub fn len(&self) -> usize {
    self.sizes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sizes.is_empty()
  }

  /// Delta of `size` against the recorded baseline for `id`.
  ///
  /// An unseen id is recorded and reports 0. On a baseline pass the live size
  /// is recorded; otherwise the baseline is 0, so the node's full size shows
  /// up as its delta from the next pass on.
  fn observe(&mut self, id: &str, size: u64, baseline_pass: bool) -> i64 {
    match self.sizes.get(id) {
      Some(&original) => size as i64 - original as i64,
      None => {
        let baseline = if baseline_pass { size } else { 0 };
        self.sizes.insert(id.to_string(), baseline);
        0
      }
    }
  }
}

/// How a flatten pass fills in `FlatRow::delta`.
pub enum Deltas<'a> {
  Off,
  Track {
    first_seen: &'a mut FirstSeen,
    /// True when the pass started with propagation disabled (initial load,
    /// pre-ready passes).
    baseline_pass: bool,
  },
}

impl Deltas<'_> {
  fn delta_for(&mut self, id: &str, size: u64) -> i64 {
    match self {
      Deltas::Off => 0,
      Deltas::Track {
        first_seen,
        baseline_pass,
      } => first_seen.observe(id, size, *baseline_pass),
    }
  }
}

/// Flatten `node` into pre-order rows. The node's own id is
/// `parent_id + own_segment`; every size node yields exactly one row, and
/// children follow their parent in container order.
pub fn flatten(
  node: &SizeNode,
  own_segment: &str,
  parent_id: &str,
  deltas: &mut Deltas<'_>,
) -> Vec<FlatRow> {
  let mut rows = Vec::new();
  flatten_into(node, own_segment, parent_id, deltas, &mut rows);
  rows
}

fn flatten_into(
  node: &SizeNode,
  own_segment: &str,
  parent_id: &str,
  deltas: &mut Deltas<'_>,
  rows: &mut Vec<FlatRow>,
) {
  let id = format!("{parent_id}{own_segment}");
  let delta = deltas.delta_for(&id, node.size);
  rows.push(FlatRow {
    id: id.clone(),
    parent_id: parent_id.to_string(),
    size: node.size,
    delta,
  });

  match &node.value {
    SizeValue::Sequence(items) => {
      for (i, child) in items.iter().enumerate() {
        if let Some(child) = child {
          flatten_into(child, &format!("[{i}]"), &id, deltas, rows);
        }
      }
    }
    SizeValue::Mapping(entries) => {
      for (key, child) in entries {
        flatten_into(child, &format!(".{key}"), &id, deltas, rows);
      }
    }
    _ => {}
  }
}
