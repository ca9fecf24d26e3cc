use std::path::PathBuf;

use mm_core::{JsonFileSurface, MapOptions, MemoryMap, RecordingSurface};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), String> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let path = std::env::args()
    .nth(1)
    .ok_or_else(|| "usage: cargo run -p mm_core --example smoke_open -- <path-to-json> [out.json]".to_string())?;
  let text = std::fs::read_to_string(PathBuf::from(path)).map_err(|e| e.to_string())?;

  let map = MemoryMap::from_json_str(
    &text,
    MapOptions {
      calculate_deltas: true,
      ..MapOptions::default()
    },
  )
  .map_err(|e| e.to_string())?;

  let report = match std::env::args().nth(2) {
    Some(out) => map.attach(JsonFileSurface::new(out)),
    None => map.attach(RecordingSurface::new()),
  }
  .map_err(|e| e.to_string())?;
  println!("rows={} root_size={}", report.rows, report.root_size);

  // Touch the structure so the second frame shows deltas.
  if let Some(root) = map.root_node() {
    if let Some(first) = root.keys().into_iter().next() {
      root.set(first, "changed").map_err(|e| e.to_string())?;
    }
  }

  for r in map.last_rows().iter().take(20) {
    println!("{:<40} {:<30} {:>10} {:>+8}", r.id, r.parent_id, r.size, r.delta);
  }
  Ok(())
}
