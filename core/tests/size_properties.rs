use std::collections::HashMap;

use mm_core::{estimate, MapOptions, MemoryMap, SizeNode, SizeValue, Value};
use proptest::prelude::*;
use serde_json::json;

fn arb_json() -> impl Strategy<Value = serde_json::Value> {
  let leaf = prop_oneof![
    Just(serde_json::Value::Null),
    any::<bool>().prop_map(serde_json::Value::Bool),
    any::<i64>().prop_map(|n| json!(n)),
    "[a-z ]{0,8}".prop_map(serde_json::Value::String),
  ];
  leaf.prop_recursive(4, 48, 4, |inner| {
    prop_oneof![
      prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
      prop::collection::vec(("[a-z]{1,3}", inner), 0..4)
        .prop_map(|entries| serde_json::Value::Object(entries.into_iter().collect())),
    ]
  })
}

#[test]
fn estimate_ignores_containers() {
  let map = MemoryMap::new(json!({"a": [1, "xy"], "b": true}), MapOptions::default());
  let root = map.root();
  assert!(root.as_node().is_some());
  assert_eq!(estimate(&root), 0);
  assert_eq!(estimate(&map.get_path(&["a".into()]).unwrap()), 0);
  assert_eq!(map.update().unwrap().root_size, 16);
}

/// Sizes straight from the costing rules, independent of the crate.
fn expected_size(v: &serde_json::Value) -> u64 {
  match v {
    serde_json::Value::Null => 0,
    serde_json::Value::Bool(_) => 4,
    serde_json::Value::Number(_) => 8,
    serde_json::Value::String(s) => 2 * s.encode_utf16().count() as u64,
    serde_json::Value::Array(items) => items.iter().map(expected_size).sum(),
    serde_json::Value::Object(entries) => entries.values().map(expected_size).sum(),
  }
}

fn assert_sums(node: &SizeNode) -> Result<(), TestCaseError> {
  let children: Vec<&SizeNode> = match &node.value {
    SizeValue::Sequence(items) => items.iter().flatten().collect(),
    SizeValue::Mapping(entries) => entries.values().collect(),
    _ => return Ok(()),
  };
  prop_assert_eq!(node.size, children.iter().map(|c| c.size).sum::<u64>());
  for c in children {
    assert_sums(c)?;
  }
  Ok(())
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn container_size_is_sum_of_children(data in arb_json()) {
    let map = MemoryMap::new(data.clone(), MapOptions::default());
    let report = map.update().unwrap();
    prop_assert_eq!(report.root_size, expected_size(&data));
    assert_sums(&map.last_sizes().unwrap())?;
  }

  #[test]
  fn estimate_is_deterministic(s in "\\PC{0,16}", n in any::<i64>(), b in any::<bool>()) {
    let text = Value::String(s.clone());
    prop_assert_eq!(estimate(&text), estimate(&text));
    prop_assert_eq!(estimate(&text), 2 * s.encode_utf16().count() as u64);
    prop_assert_eq!(estimate(&Value::Number(n.into())), 8);
    prop_assert_eq!(estimate(&Value::Bool(b)), 4);
    prop_assert_eq!(estimate(&Value::Null), 0);
  }

  #[test]
  fn rows_are_preorder_one_per_size_node(data in arb_json()) {
    let map = MemoryMap::new(data, MapOptions::default());
    map.update().unwrap();
    let rows = map.last_rows();
    let sizes = map.last_sizes().unwrap();
    prop_assert_eq!(rows.len(), sizes.node_count());
    prop_assert_eq!(rows[0].parent_id.as_str(), "");

    let index: HashMap<&str, usize> = rows.iter().enumerate().map(|(i, r)| (r.id.as_str(), i)).collect();
    prop_assert_eq!(index.len(), rows.len());

    // parent index of every non-root row
    let parent: Vec<Option<usize>> = rows
      .iter()
      .map(|r| index.get(r.parent_id.as_str()).copied())
      .collect();
    for (i, p) in parent.iter().enumerate().skip(1) {
      let p = p.expect("every non-root row has a parent row");
      prop_assert!(p < i);
    }

    // each subtree occupies a contiguous run right after its root
    let is_descendant = |mut i: usize, of: usize| {
      while let Some(p) = parent[i] {
        if p == of {
          return true;
        }
        i = p;
      }
      false
    };
    for r in 0..rows.len() {
      let desc: Vec<usize> = (0..rows.len()).filter(|&i| is_descendant(i, r)).collect();
      let expected: Vec<usize> = (r + 1..r + 1 + desc.len()).collect();
      prop_assert_eq!(desc, expected);
    }
  }

  #[test]
  fn repeated_update_keeps_zero_deltas(data in arb_json()) {
    let options = MapOptions { calculate_deltas: true, ..MapOptions::default() };
    let map = MemoryMap::new(data, options);
    map.update().unwrap();
    map.update().unwrap();
    prop_assert!(map.last_rows().iter().all(|r| r.delta == 0));
  }
}
