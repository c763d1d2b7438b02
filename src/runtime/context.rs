//! VL-009: Render context: the data scope compiled programs run against.
//!
//! Partitions are separate maps: page-visible `data`, loop-local bindings, and
//! host-only definitions. Host-only values are written by `{define}` and read by
//! host code through [`RenderContext::host`], never by template statements.

use super::value;
use crate::core::types::{Partition, Value, VarPath};
use serde_json::Map;
use std::collections::HashSet;

/// Data scope for one render request.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    data: Map<String, Value>,
    host: Map<String, Value>,
    loops: Map<String, Value>,
    loop_stack: Vec<Option<Value>>,
    markers: HashSet<String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with page data taken from a JSON/YAML object.
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Define a host marker, allowing guarded programs to render.
    pub fn define_marker(&mut self, marker: &str) {
        self.markers.insert(marker.to_string());
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Page-visible data.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Host-only definitions made by `{define}`.
    pub fn host(&self) -> &Map<String, Value> {
        &self.host
    }

    /// Read a variable. Host-only paths are never readable here.
    pub fn lookup(&self, path: &VarPath) -> Option<&Value> {
        match path.partition {
            Partition::Data => value::get_path(&self.data, &path.segments),
            Partition::Loop => value::get_path(&self.loops, &path.segments),
            Partition::Host => None,
        }
    }

    /// Read a variable, treating null as unset.
    pub fn lookup_set(&self, path: &VarPath) -> Option<&Value> {
        self.lookup(path).filter(|v| !v.is_null())
    }

    pub fn assign(&mut self, path: &VarPath, v: Value) {
        let map = self.partition_mut(path.partition);
        value::set_path(map, &path.segments, v);
    }

    pub fn unassign(&mut self, path: &VarPath) -> Option<Value> {
        let map = self.partition_mut(path.partition);
        value::remove_path(map, &path.segments)
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut Map<String, Value> {
        match partition {
            Partition::Data => &mut self.data,
            Partition::Loop => &mut self.loops,
            Partition::Host => &mut self.host,
        }
    }

    /// Swap in a fresh loop save-stack, returning the previous one.
    pub fn begin_loop_stack(&mut self) -> Vec<Option<Value>> {
        std::mem::take(&mut self.loop_stack)
    }

    pub fn end_loop_stack(&mut self, previous: Vec<Option<Value>>) {
        self.loop_stack = previous;
    }

    pub fn push_saved(&mut self, saved: Option<Value>) {
        self.loop_stack.push(saved);
    }

    /// Pop the save-stack. `None` when the stack is empty or nothing was bound.
    pub fn pop_saved(&mut self) -> Option<Value> {
        self.loop_stack.pop().flatten()
    }

    pub fn loop_stack_depth(&self) -> usize {
        self.loop_stack.len()
    }
}
