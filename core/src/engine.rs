use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, debug_span, warn};
use uuid::Uuid;

use crate::{
  flatten::{flatten, Deltas, FirstSeen},
  models::{CycleReport, CycleTrigger, DataTable, FlatRow, NodeKind, PathSegment, SizeNode},
  node::{Node, Value, Wrapper},
  render::{ChartConfig, RenderSurface},
  sizing::build_sizes,
};

#[derive(Debug, Error)]
pub enum MapError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("expected a {expected:?} node, found a {found:?} node")]
  KindMismatch { expected: NodeKind, found: NodeKind },
  #[error("index {index} out of range (len {len})")]
  IndexOutOfRange { index: u64, len: usize },
  #[error("assignment would make a node contain itself")]
  Cycle,
  /// For [`RenderSurface`] implementors to report a failed draw.
  #[error("render error: {0}")]
  Render(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapOptions {
  /// Id of the root row; every other row id starts with it.
  pub top_key: String,
  /// Run the full cycle on every write/delete once propagation is on.
  pub auto_update: bool,
  /// Tree depth for the default chart config. Ignored when `chart` is set.
  pub depth: u32,
  pub calculate_deltas: bool,
  /// Replaces the default chart config wholesale.
  pub chart: Option<ChartConfig>,
}

impl Default for MapOptions {
  fn default() -> Self {
    Self {
      top_key: "data".into(),
      auto_update: true,
      depth: 5,
      calculate_deltas: false,
      chart: None,
    }
  }
}

impl MapOptions {
  pub fn from_json_str(s: &str) -> Result<Self, MapError> {
    Ok(serde_json::from_str(s)?)
  }
}

#[derive(Debug, Default)]
struct CycleState {
  first_seen: FirstSeen,
  last_sizes: Option<SizeNode>,
  last_rows: Vec<FlatRow>,
}

pub(crate) struct MapInner {
  id: Uuid,
  top_key: String,
  calculate_deltas: bool,
  chart: ChartConfig,
  root: Value,

  /// Whether writes/deletes currently trigger cycles. Off during construction,
  /// before the surface is ready, and while a cycle rebuilds the size tree.
  propagating: AtomicBool,
  auto_update: AtomicBool,
  ready: AtomicBool,

  state: Mutex<CycleState>,
  /// Checked out (`None`) while drawing.
  surface: Mutex<Option<Box<dyn RenderSurface>>>,

  cycles: AtomicU64,
  renders: AtomicU64,
}

impl MapInner {
  pub(crate) fn notify_mutation(&self) {
    if !self.propagating.load(Ordering::SeqCst) || !self.auto_update.load(Ordering::SeqCst) {
      return;
    }
    if let Err(e) = self.run_cycle(CycleTrigger::Mutation) {
      warn!(map = %self.id, error = %e, "render failed after mutation");
    }
  }

  fn run_cycle(&self, trigger: CycleTrigger) -> Result<CycleReport, MapError> {
    let _span = debug_span!("memory_map_cycle", map = %self.id, ?trigger).entered();

    // A pass that starts with propagation off records live sizes as baselines.
    let baseline_pass = !self.propagating.swap(false, Ordering::SeqCst);
    let sizes = build_sizes(&self.root);
    let root_size = sizes.size;
    let rows = {
      let mut state = self.state.lock();
      let state = &mut *state;
      let mut deltas = if self.calculate_deltas {
        Deltas::Track {
          first_seen: &mut state.first_seen,
          baseline_pass,
        }
      } else {
        Deltas::Off
      };
      let rows = flatten(&sizes, &self.top_key, "", &mut deltas);
      state.last_sizes = Some(sizes);
      state.last_rows = rows.clone();
      rows
    };
    let ready = self.ready.load(Ordering::SeqCst);
    self.propagating.store(ready, Ordering::SeqCst);
    self.cycles.fetch_add(1, Ordering::SeqCst);

    let row_count = rows.len();
    let rendered = if ready {
      self.render(&DataTable::new(rows))?
    } else {
      debug!("surface not ready; render suppressed");
      false
    };
    debug!(rows = row_count, root_size, rendered, baseline_pass, "cycle complete");

    Ok(CycleReport {
      trigger,
      rows: row_count,
      root_size,
      rendered,
    })
  }

  fn render(&self, table: &DataTable) -> Result<bool, MapError> {
    let Some(mut surface) = self.surface.lock().take() else {
      debug!("surface busy; skipping draw");
      return Ok(false);
    };
    let res = surface.draw(table, &self.chart);
    {
      let mut slot = self.surface.lock();
      if slot.is_none() {
        *slot = Some(surface);
      }
    }
    res?;
    self.renders.fetch_add(1, Ordering::SeqCst);
    Ok(true)
  }
}

/// A live, size-annotated mirror of a nested structure.
///
/// The structure is wrapped on construction; writes through [`Node`] handles
/// (or [`MemoryMap::root`]) recompute sizes, flatten them into rows and hand
/// the rows to the attached [`RenderSurface`].
///
/// All cycles run synchronously on the calling thread. Handles are `Send +
/// Sync`, but the map assumes a single writer at a time.
#[derive(Clone)]
pub struct MemoryMap {
  inner: Arc<MapInner>,
}

impl MemoryMap {
  pub fn new(data: serde_json::Value, options: MapOptions) -> Self {
    let MapOptions {
      top_key,
      auto_update,
      depth,
      calculate_deltas,
      chart,
    } = options;
    let chart = chart.unwrap_or_else(|| ChartConfig::with_depth(depth));

    let inner = Arc::new_cyclic(|owner| {
      let root = Wrapper::new(owner).wrap_json(data);
      MapInner {
        id: Uuid::new_v4(),
        top_key,
        calculate_deltas,
        chart,
        root,
        propagating: AtomicBool::new(false),
        auto_update: AtomicBool::new(auto_update),
        ready: AtomicBool::new(false),
        state: Mutex::new(CycleState::default()),
        surface: Mutex::new(None),
        cycles: AtomicU64::new(0),
        renders: AtomicU64::new(0),
      }
    });
    debug!(map = %inner.id, "memory map created");
    Self { inner }
  }

  pub fn from_json_str(data: &str, options: MapOptions) -> Result<Self, MapError> {
    Ok(Self::new(serde_json::from_str(data)?, options))
  }

  pub fn id(&self) -> Uuid {
    self.inner.id
  }

  pub fn top_key(&self) -> &str {
    &self.inner.top_key
  }

  pub fn chart_config(&self) -> &ChartConfig {
    &self.inner.chart
  }

  /// The wrapped root. A primitive root has no handle to write through.
  pub fn root(&self) -> Value {
    self.inner.root.clone()
  }

  pub fn root_node(&self) -> Option<Node> {
    self.inner.root.as_node().cloned()
  }

  pub fn get_path(&self, path: &[PathSegment]) -> Option<Value> {
    let mut cur = self.inner.root.clone();
    for seg in path {
      let next = cur.as_node()?.get(seg.clone())?;
      cur = next;
    }
    Some(cur)
  }

  /// Row id the flattener gives the value at `path`.
  pub fn row_id(&self, path: &[PathSegment]) -> String {
    let mut id = self.inner.top_key.clone();
    for seg in path {
      id.push_str(&seg.row_segment());
    }
    id
  }

  /// Readiness notification: installs the surface, runs one catch-up cycle
  /// and turns propagation on.
  pub fn attach(&self, surface: impl RenderSurface + 'static) -> Result<CycleReport, MapError> {
    *self.inner.surface.lock() = Some(Box::new(surface));
    self.inner.ready.store(true, Ordering::SeqCst);
    debug!(map = %self.inner.id, "render surface attached");
    self.inner.run_cycle(CycleTrigger::Ready)
  }

  /// Force one full cycle regardless of `auto_update`. Before a surface is
  /// attached the render step is skipped.
  pub fn update(&self) -> Result<CycleReport, MapError> {
    self.inner.run_cycle(CycleTrigger::Manual)
  }

  pub fn set_auto_update(&self, on: bool) {
    self.inner.auto_update.store(on, Ordering::SeqCst);
  }

  pub fn auto_update(&self) -> bool {
    self.inner.auto_update.load(Ordering::SeqCst)
  }

  pub fn is_ready(&self) -> bool {
    self.inner.ready.load(Ordering::SeqCst)
  }

  pub fn is_propagating(&self) -> bool {
    self.inner.propagating.load(Ordering::SeqCst)
  }

  pub fn last_rows(&self) -> Vec<FlatRow> {
    self.inner.state.lock().last_rows.clone()
  }

  pub fn last_sizes(&self) -> Option<SizeNode> {
    self.inner.state.lock().last_sizes.clone()
  }

  pub fn data_table(&self) -> DataTable {
    DataTable::new(self.last_rows())
  }

  /// Recorded baseline for a row id, if delta tracking has seen it.
  pub fn first_seen(&self, id: &str) -> Option<u64> {
    self.inner.state.lock().first_seen.get(id)
  }

  pub fn cycle_count(&self) -> u64 {
    self.inner.cycles.load(Ordering::SeqCst)
  }

  pub fn render_count(&self) -> u64 {
    self.inner.renders.load(Ordering::SeqCst)
  }

  pub fn to_json(&self) -> serde_json::Value {
    self.inner.root.to_json()
  }
}

impl std::fmt::Debug for MemoryMap {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemoryMap")
      .field("id", &self.inner.id)
      .field("top_key", &self.inner.top_key)
      .field("ready", &self.is_ready())
      .field("propagating", &self.is_propagating())
      .field("cycles", &self.cycle_count())
      .finish()
  }
}
