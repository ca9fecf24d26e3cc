use std::{
  collections::HashMap,
  fmt,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
  },
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Number;
use tracing::trace;

use crate::{
  engine::{MapError, MapInner},
  models::{NodeKind, PathSegment},
};

/// Non-owning back-reference from every wrapped node to the map that observes it.
pub(crate) type Owner = Weak<MapInner>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Most absent slots a single past-the-end write may pad a sequence with.
pub const MAX_SEQUENCE_GAP: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// A value stored in the mirrored structure.
#[derive(Debug, Clone)]
pub enum Value {
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  Node(Node),
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_node(&self) -> Option<&Node> {
    match self {
      Value::Node(n) => Some(n),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s.as_str()),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Number(n) => n.as_f64(),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  /// Detached plain copy. Absent sequence slots come out as `null`.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Null => serde_json::Value::Null,
      Value::Bool(b) => serde_json::Value::Bool(*b),
      Value::Number(n) => serde_json::Value::Number(n.clone()),
      Value::String(s) => serde_json::Value::String(s.clone()),
      Value::Node(n) => n.to_json(),
    }
  }
}

/// Containers compare by identity, primitives by value.
impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Node(a), Value::Node(b)) => a.ptr_eq(b),
      _ => false,
    }
  }
}

/// Anything that can be written into a wrapped container.
///
/// Plain JSON is wrapped on the way in. An existing `Value::Node` of the same
/// map is stored as-is, so both places share one node; a node from another
/// map is copied into this one.
#[derive(Debug, Clone)]
pub enum Input {
  Json(serde_json::Value),
  Value(Value),
}

impl From<serde_json::Value> for Input {
  fn from(v: serde_json::Value) -> Self {
    Input::Json(v)
  }
}

impl From<Value> for Input {
  fn from(v: Value) -> Self {
    Input::Value(v)
  }
}

impl From<Node> for Input {
  fn from(n: Node) -> Self {
    Input::Value(Value::Node(n))
  }
}

impl From<&str> for Input {
  fn from(s: &str) -> Self {
    Input::Value(Value::String(s.to_string()))
  }
}

impl From<String> for Input {
  fn from(s: String) -> Self {
    Input::Value(Value::String(s))
  }
}

impl From<bool> for Input {
  fn from(b: bool) -> Self {
    Input::Value(Value::Bool(b))
  }
}

impl From<i64> for Input {
  fn from(n: i64) -> Self {
    Input::Value(Value::Number(n.into()))
  }
}

impl From<i32> for Input {
  fn from(n: i32) -> Self {
    Input::Value(Value::Number(n.into()))
  }
}

impl From<u64> for Input {
  fn from(n: u64) -> Self {
    Input::Value(Value::Number(n.into()))
  }
}

impl From<f64> for Input {
  fn from(n: f64) -> Self {
    // NaN and infinities have no JSON number form.
    Input::Value(Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null))
  }
}

pub(crate) enum Body {
  /// `None` marks an absent slot (deleted, or skipped over by a write past the end).
  Sequence(Vec<Option<Value>>),
  Mapping(IndexMap<String, Value>),
}

impl Body {
  fn kind(&self) -> NodeKind {
    match self {
      Body::Sequence(_) => NodeKind::Sequence,
      Body::Mapping(_) => NodeKind::Mapping,
    }
  }
}

struct NodeInner {
  id: NodeId,
  owner: Owner,
  body: Mutex<Body>,
}

/// Handle to a wrapped sequence or mapping.
///
/// Every write and delete goes through this handle; when the owning map has
/// propagation and auto-update on, the full recompute/flatten/render cycle
/// runs before the call returns. Clones share the same underlying container.
#[derive(Clone)]
pub struct Node {
  inner: Arc<NodeInner>,
}

impl fmt::Debug for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Node")
      .field("id", &self.inner.id)
      .field("kind", &self.kind())
      .field("len", &self.len())
      .finish()
  }
}

impl Node {
  fn new(owner: &Owner, body: Body) -> Self {
    let id = NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed));
    Self {
      inner: Arc::new(NodeInner {
        id,
        owner: owner.clone(),
        body: Mutex::new(body),
      }),
    }
  }

  pub fn id(&self) -> NodeId {
    self.inner.id
  }

  pub fn kind(&self) -> NodeKind {
    self.inner.body.lock().kind()
  }

  /// Number of slots (sequence) or entries (mapping).
  pub fn len(&self) -> usize {
    match &*self.inner.body.lock() {
      Body::Sequence(items) => items.len(),
      Body::Mapping(entries) => entries.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn ptr_eq(&self, other: &Node) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  /// False once the owning map has been dropped. Writes still land but notify nobody.
  pub fn is_attached(&self) -> bool {
    self.inner.owner.strong_count() > 0
  }

  /// Read passthrough. A segment of the wrong kind reads as absent.
  pub fn get(&self, key: impl Into<PathSegment>) -> Option<Value> {
    match (&*self.inner.body.lock(), key.into()) {
      (Body::Mapping(entries), PathSegment::Key(k)) => entries.get(&k).cloned(),
      (Body::Sequence(items), PathSegment::Index(i)) => usize::try_from(i)
        .ok()
        .and_then(|i| items.get(i))
        .and_then(|slot| slot.clone()),
      _ => None,
    }
  }

  /// Present keys in iteration order; absent sequence slots are skipped.
  pub fn keys(&self) -> Vec<PathSegment> {
    match &*self.inner.body.lock() {
      Body::Mapping(entries) => entries.keys().cloned().map(PathSegment::Key).collect(),
      Body::Sequence(items) => items
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_some())
        .map(|(i, _)| PathSegment::Index(i as u64))
        .collect(),
    }
  }

  /// Write `value` under `key`, wrapping containers first. Returns the previous value.
  ///
  /// Writing a sequence index past the end pads the gap with absent slots, up to
  /// [`MAX_SEQUENCE_GAP`] of them; further out is `IndexOutOfRange`.
  pub fn set(
    &self,
    key: impl Into<PathSegment>,
    value: impl Into<Input>,
  ) -> Result<Option<Value>, MapError> {
    let key = key.into();
    let value = self.adopt(value.into())?;

    let previous = {
      let mut body = self.inner.body.lock();
      match (&mut *body, key) {
        (Body::Mapping(entries), PathSegment::Key(k)) => entries.insert(k, value),
        (Body::Sequence(items), PathSegment::Index(index)) => {
          let len = items.len();
          let i = usize::try_from(index)
            .ok()
            .filter(|&i| i.saturating_sub(len) <= MAX_SEQUENCE_GAP)
            .ok_or(MapError::IndexOutOfRange { index, len })?;
          if i >= len {
            items.resize(i + 1, None);
          }
          items[i].replace(value)
        }
        (body, key) => return Err(kind_mismatch(body.kind(), &key)),
      }
    };

    self.notify();
    Ok(previous)
  }

  /// Remove the entry under `key`. Sequence slots are left absent so later
  /// siblings keep their indices.
  pub fn delete(&self, key: impl Into<PathSegment>) -> Result<Option<Value>, MapError> {
    let key = key.into();
    let previous = {
      let mut body = self.inner.body.lock();
      match (&mut *body, key) {
        (Body::Mapping(entries), PathSegment::Key(k)) => entries.shift_remove(&k),
        (Body::Sequence(items), PathSegment::Index(i)) => usize::try_from(i)
          .ok()
          .and_then(|i| items.get_mut(i))
          .and_then(Option::take),
        (body, key) => return Err(kind_mismatch(body.kind(), &key)),
      }
    };

    self.notify();
    Ok(previous)
  }

  /// Append to a sequence.
  pub fn push(&self, value: impl Into<Input>) -> Result<(), MapError> {
    let value = self.adopt(value.into())?;
    {
      let mut body = self.inner.body.lock();
      match &mut *body {
        Body::Sequence(items) => items.push(Some(value)),
        Body::Mapping(_) => {
          return Err(MapError::KindMismatch {
            expected: NodeKind::Sequence,
            found: NodeKind::Mapping,
          })
        }
      }
    }

    self.notify();
    Ok(())
  }

  /// Splice an element out of a sequence, shifting later elements down.
  pub fn remove(&self, index: usize) -> Result<Option<Value>, MapError> {
    let removed = {
      let mut body = self.inner.body.lock();
      match &mut *body {
        Body::Sequence(items) => {
          if index >= items.len() {
            return Err(MapError::IndexOutOfRange {
              index: index as u64,
              len: items.len(),
            });
          }
          items.remove(index)
        }
        Body::Mapping(_) => {
          return Err(MapError::KindMismatch {
            expected: NodeKind::Sequence,
            found: NodeKind::Mapping,
          })
        }
      }
    };

    self.notify();
    Ok(removed)
  }

  pub fn to_json(&self) -> serde_json::Value {
    match &*self.inner.body.lock() {
      Body::Sequence(items) => serde_json::Value::Array(
        items
          .iter()
          .map(|slot| slot.as_ref().map(Value::to_json).unwrap_or(serde_json::Value::Null))
          .collect(),
      ),
      Body::Mapping(entries) => serde_json::Value::Object(
        entries
          .iter()
          .map(|(k, v)| (k.clone(), v.to_json()))
          .collect(),
      ),
    }
  }

  /// Run `f` with the container body locked. Child nodes may be locked from
  /// inside `f`; the structure is acyclic so locks are always taken top-down.
  pub(crate) fn with_body<R>(&self, f: impl FnOnce(&Body) -> R) -> R {
    f(&*self.inner.body.lock())
  }

  fn belongs_to(&self, owner: &Owner) -> bool {
    Weak::ptr_eq(&self.inner.owner, owner)
  }

  /// True if `target` is this node or sits anywhere below it.
  fn contains(&self, target: &Node) -> bool {
    if self.ptr_eq(target) {
      return true;
    }
    let children = self.child_nodes();
    children.iter().any(|c| c.contains(target))
  }

  fn child_nodes(&self) -> Vec<Node> {
    match &*self.inner.body.lock() {
      Body::Sequence(items) => items
        .iter()
        .flatten()
        .filter_map(|v| v.as_node().cloned())
        .collect(),
      Body::Mapping(entries) => entries.values().filter_map(|v| v.as_node().cloned()).collect(),
    }
  }

  fn adopt(&self, input: Input) -> Result<Value, MapError> {
    if let Input::Value(Value::Node(n)) = &input {
      if n.belongs_to(&self.inner.owner) && n.contains(self) {
        return Err(MapError::Cycle);
      }
    }
    Ok(Wrapper::new(&self.inner.owner).wrap(input))
  }

  fn notify(&self) {
    if let Some(owner) = self.inner.owner.upgrade() {
      owner.notify_mutation();
    }
  }
}

fn kind_mismatch(found: NodeKind, key: &PathSegment) -> MapError {
  let expected = match key {
    PathSegment::Key(_) => NodeKind::Mapping,
    PathSegment::Index(_) => NodeKind::Sequence,
  };
  MapError::KindMismatch { expected, found }
}

/// One wrapping pass. `seen` is the identity-keyed visited set: a foreign
/// node reached twice is wrapped once and both places share the result.
pub(crate) struct Wrapper<'a> {
  owner: &'a Owner,
  seen: HashMap<NodeId, Node>,
}

impl<'a> Wrapper<'a> {
  pub(crate) fn new(owner: &'a Owner) -> Self {
    Self {
      owner,
      seen: HashMap::new(),
    }
  }

  pub(crate) fn wrap(&mut self, input: Input) -> Value {
    match input {
      Input::Json(v) => self.wrap_json(v),
      Input::Value(v) => self.wrap_value(v),
    }
  }

  pub(crate) fn wrap_json(&mut self, v: serde_json::Value) -> Value {
    match v {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(b),
      serde_json::Value::Number(n) => Value::Number(n),
      serde_json::Value::String(s) => Value::String(s),
      serde_json::Value::Array(items) => {
        let items = items.into_iter().map(|v| Some(self.wrap_json(v))).collect();
        Value::Node(self.container(Body::Sequence(items)))
      }
      serde_json::Value::Object(entries) => {
        let entries = entries
          .into_iter()
          .map(|(k, v)| (k, self.wrap_json(v)))
          .collect();
        Value::Node(self.container(Body::Mapping(entries)))
      }
    }
  }

  fn wrap_value(&mut self, v: Value) -> Value {
    let foreign = match v {
      Value::Node(n) if n.belongs_to(self.owner) => return Value::Node(n),
      Value::Node(n) => n,
      primitive => return primitive,
    };
    if let Some(done) = self.seen.get(&foreign.id()) {
      return Value::Node(done.clone());
    }

    // Mark before descending so shared children resolve to the same copy.
    let copy = match foreign.kind() {
      NodeKind::Sequence => self.container(Body::Sequence(Vec::new())),
      NodeKind::Mapping => self.container(Body::Mapping(IndexMap::new())),
    };
    self.seen.insert(foreign.id(), copy.clone());

    let body = foreign.with_body(|body| match body {
      Body::Sequence(items) => Body::Sequence(items.clone()),
      Body::Mapping(entries) => Body::Mapping(entries.clone()),
    });
    let body = match body {
      Body::Sequence(items) => Body::Sequence(
        items
          .into_iter()
          .map(|slot| slot.map(|v| self.wrap_value(v)))
          .collect(),
      ),
      Body::Mapping(entries) => Body::Mapping(
        entries
          .into_iter()
          .map(|(k, v)| (k, self.wrap_value(v)))
          .collect(),
      ),
    };
    *copy.inner.body.lock() = body;
    Value::Node(copy)
  }

  fn container(&self, body: Body) -> Node {
    let node = Node::new(self.owner, body);
    trace!(node = node.id().0, kind = ?node.kind(), "wrapped container");
    node
  }
}
