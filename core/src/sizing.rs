use crate::{
  models::{SizeNode, SizeValue},
  node::{Body, Value},
};

pub const NUMBER_SIZE: u64 = 8;
pub const BOOL_SIZE: u64 = 4;
/// Strings are costed as 2 bytes per UTF-16 code unit.
pub const CHAR_SIZE: u64 = 2;

/// Byte-size estimate for a single primitive.
///
/// Null costs nothing. Containers also estimate to 0: their size is only ever
/// the sum produced by [`build_sizes`], never a per-value estimate.
pub fn estimate(value: &Value) -> u64 {
  match value {
    Value::Null => 0,
    Value::Bool(_) => BOOL_SIZE,
    Value::Number(_) => NUMBER_SIZE,
    Value::String(s) => s.encode_utf16().count() as u64 * CHAR_SIZE,
    Value::Node(_) => 0,
  }
}

/// Build a fresh size tree for `value`.
///
/// A container's size is the sum of its non-null children. Null children are
/// left out of the result (absent slot for sequences, missing entry for
/// mappings) and contribute nothing.
pub fn build_sizes(value: &Value) -> SizeNode {
  match value {
    Value::Null => SizeNode::empty(),
    Value::Node(node) => node.with_body(|body| match body {
      Body::Sequence(items) => {
        let mut size = 0;
        let out = items
          .iter()
          .map(|slot| match slot {
            Some(v) if !v.is_null() => {
              let child = build_sizes(v);
              size += child.size;
              Some(child)
            }
            _ => None,
          })
          .collect();
        SizeNode {
          value: SizeValue::Sequence(out),
          size,
        }
      }
      Body::Mapping(entries) => {
        let mut size = 0;
        let out = entries
          .iter()
          .filter(|(_, v)| !v.is_null())
          .map(|(k, v)| {
            let child = build_sizes(v);
            size += child.size;
            (k.clone(), child)
          })
          .collect();
        SizeNode {
          value: SizeValue::Mapping(out),
          size,
        }
      }
    }),
    primitive => SizeNode {
      value: leaf(primitive),
      size: estimate(primitive),
    },
  }
}

fn leaf(value: &Value) -> SizeValue {
  match value {
    Value::Bool(b) => SizeValue::Bool(*b),
    Value::Number(n) => SizeValue::Number(n.clone()),
    Value::String(s) => SizeValue::String(s.clone()),
    Value::Null | Value::Node(_) => SizeValue::Null,
  }
}

/// Human-readable size: plain bytes below 1 KiB, otherwise KiB/MiB/GiB with
/// three decimals.
pub fn format_size(size: u64) -> String {
  const KIB: u64 = 1024;
  const MIB: u64 = 1024 * 1024;
  const GIB: u64 = 1024 * 1024 * 1024;
  match size {
    s if s < KIB => format!("{s} bytes"),
    s if s < MIB => format!("{:.3} KiB", s as f64 / KIB as f64),
    s if s < GIB => format!("{:.3} MiB", s as f64 / MIB as f64),
    s => format!("{:.3} GiB", s as f64 / GIB as f64),
  }
}
