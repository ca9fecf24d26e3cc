use std::{
  fmt,
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{engine::MapError, models::DataTable, sizing::format_size};

/// `(row index, size, color value) -> tooltip markup`
pub type TooltipFn = Arc<dyn Fn(usize, u64, i64) -> String + Send + Sync>;

/// Options forwarded to the treemap alongside the data table.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartConfig {
  pub highlight_on_mouse_over: bool,
  pub use_weighted_average_for_aggregation: bool,
  pub max_depth: u32,
  pub max_post_depth: u32,
  pub min_color: String,
  pub mid_color: String,
  pub max_color: String,
  pub header_height: u32,
  pub font_color: String,
  /// Falls back to [`default_tooltip`] when unset.
  #[serde(skip)]
  pub generate_tooltip: Option<TooltipFn>,
}

impl ChartConfig {
  pub fn with_depth(depth: u32) -> Self {
    Self {
      highlight_on_mouse_over: true,
      use_weighted_average_for_aggregation: true,
      max_depth: depth,
      max_post_depth: depth,
      min_color: "#f00".into(),
      mid_color: "#ddd".into(),
      max_color: "#0d0".into(),
      header_height: 15,
      font_color: "black".into(),
      generate_tooltip: None,
    }
  }

  pub fn tooltip(&self, row: usize, size: u64, value: i64) -> String {
    match &self.generate_tooltip {
      Some(f) => f(row, size, value),
      None => default_tooltip(row, size, value),
    }
  }
}

impl Default for ChartConfig {
  fn default() -> Self {
    Self::with_depth(5)
  }
}

impl fmt::Debug for ChartConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChartConfig")
      .field("highlight_on_mouse_over", &self.highlight_on_mouse_over)
      .field(
        "use_weighted_average_for_aggregation",
        &self.use_weighted_average_for_aggregation,
      )
      .field("max_depth", &self.max_depth)
      .field("max_post_depth", &self.max_post_depth)
      .field("min_color", &self.min_color)
      .field("mid_color", &self.mid_color)
      .field("max_color", &self.max_color)
      .field("header_height", &self.header_height)
      .field("font_color", &self.font_color)
      .field("generate_tooltip", &self.generate_tooltip.is_some())
      .finish()
  }
}

pub fn default_tooltip(_row: usize, size: u64, _value: i64) -> String {
  format!(
    "<div style=\"font-family:Helvetica;background:white;padding:5px;border:2px solid black;\">{}</div>",
    format_size(size)
  )
}

/// The external chart surface. `draw` is called once per rendered cycle with
/// the full table; implementations must not write back into the map.
pub trait RenderSurface: Send {
  fn draw(&mut self, table: &DataTable, config: &ChartConfig) -> Result<(), MapError>;
}

#[derive(Debug, Clone)]
pub struct Frame {
  pub table: DataTable,
  pub config: ChartConfig,
}

/// Keeps every drawn frame in memory. Clones share the same frame list, so a
/// clone kept by the caller sees what the map drew.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
  frames: Arc<Mutex<Vec<Frame>>>,
}

impl RecordingSurface {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.frames.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.lock().is_empty()
  }

  pub fn last(&self) -> Option<Frame> {
    self.frames.lock().last().cloned()
  }

  pub fn frames(&self) -> Vec<Frame> {
    self.frames.lock().clone()
  }
}

impl RenderSurface for RecordingSurface {
  fn draw(&mut self, table: &DataTable, config: &ChartConfig) -> Result<(), MapError> {
    self.frames.lock().push(Frame {
      table: table.clone(),
      config: config.clone(),
    });
    Ok(())
  }
}

/// Writes each frame as JSON for an external chart front-end:
/// `{"table": [[header], [id, parent, size, delta], ...], "options": {...}, "tooltips": [...]}`.
///
/// The file is rewritten on every draw.
#[derive(Debug, Clone)]
pub struct JsonFileSurface {
  path: PathBuf,
}

impl JsonFileSurface {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl RenderSurface for JsonFileSurface {
  fn draw(&mut self, table: &DataTable, config: &ChartConfig) -> Result<(), MapError> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let tooltips: Vec<String> = table
      .rows
      .iter()
      .enumerate()
      .map(|(i, r)| config.tooltip(i, r.size, r.delta))
      .collect();
    let doc = json!({
      "table": table.to_json(),
      "options": config,
      "tooltips": tooltips,
    });

    let mut writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(&mut writer, &doc)?;
    writer.flush()?;
    Ok(())
  }
}
