mod engine;
mod flatten;
mod models;
mod node;
mod render;
mod sizing;

pub use crate::engine::{MapError, MapOptions, MemoryMap};
pub use crate::flatten::{flatten, Deltas, FirstSeen};
pub use crate::models::{
  CycleReport, CycleTrigger, DataTable, FlatRow, NodeKind, PathSegment, SizeNode, SizeValue,
};
pub use crate::node::{Input, Node, NodeId, Value, MAX_SEQUENCE_GAP};
pub use crate::render::{
  default_tooltip, ChartConfig, Frame, JsonFileSurface, RecordingSurface, RenderSurface,
  TooltipFn,
};
pub use crate::sizing::{build_sizes, estimate, format_size, BOOL_SIZE, CHAR_SIZE, NUMBER_SIZE};
