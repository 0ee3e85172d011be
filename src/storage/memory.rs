//! In-process store.
//!
//! Mirrors the realtime database semantics the pipeline relies on: writing
//! `null` deletes, empty objects and arrays vanish, and the
//! `{".sv": "timestamp"}` placeholder is replaced by the current time.
//! Every write is recorded so tests can assert on what was touched.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Mutex;

use super::{segments, KeyValueStore};

/// One recorded mutation. Deletes are recorded with a `null` value.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreWrite {
    pub path: String,
    pub value: Value,
}

pub struct MemoryStore {
    root: Mutex<Value>,
    writes: Mutex<Vec<StoreWrite>>,
    update_calls: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            writes: Mutex::new(Vec::new()),
            update_calls: Mutex::new(0),
        }
    }

    /// Start from an existing tree (no writes recorded).
    pub fn with_data(data: Value) -> Self {
        let store = Self::new();
        if let Ok(mut root) = store.root.lock() {
            *root = data;
            prune(&mut root);
        }
        store
    }

    /// Everything written so far, in order.
    pub fn write_log(&self) -> Vec<StoreWrite> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Number of recorded writes whose path starts with `prefix`.
    pub fn writes_under(&self, prefix: &str) -> usize {
        self.write_log().iter().filter(|w| w.path.starts_with(prefix)).count()
    }

    /// Number of multi-path `update` calls so far.
    pub fn update_calls(&self) -> usize {
        self.update_calls.lock().map(|n| *n).unwrap_or_default()
    }

    /// Snapshot of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.root.lock().map(|r| r.clone()).unwrap_or(Value::Null)
    }

    fn apply(&self, path: &str, mut value: Value) -> Result<()> {
        resolve_server_values(&mut value, Utc::now().timestamp_millis());

        self.writes
            .lock()
            .map_err(|_| anyhow!("memory store write log poisoned"))?
            .push(StoreWrite { path: path.to_string(), value: value.clone() });

        let mut root = self.root.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        let segs = segments(path);

        match segs.split_last() {
            None => *root = value,
            Some((last, parents)) => {
                let mut node = &mut *root;
                for seg in parents {
                    node = child_object(node, seg);
                }
                if let Value::Object(map) = node {
                    map.insert((*last).to_string(), value);
                } else {
                    let mut map = Map::new();
                    map.insert((*last).to_string(), value);
                    *node = Value::Object(map);
                }
            }
        }

        prune(&mut root);
        if root.is_null() {
            *root = Value::Object(Map::new());
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let root = self.root.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        let mut node = &*root;
        for seg in segments(path) {
            match node.get(seg) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        if is_empty(node) {
            Ok(None)
        } else {
            Ok(Some(node.clone()))
        }
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.apply(path, value)
    }

    async fn update(&self, updates: Map<String, Value>) -> Result<()> {
        *self
            .update_calls
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))? += 1;
        for (path, value) in updates {
            self.apply(&path, value)?;
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.apply(path, Value::Null)
    }
}

/// Descend into `seg`, turning non-objects into objects on the way.
fn child_object<'a>(node: &'a mut Value, seg: &str) -> &'a mut Value {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new())),
        // Replaced with an object just above.
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Drop nulls and empty containers, bottom-up.
fn prune(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                prune(child);
            }
            map.retain(|_, child| !is_empty(child));
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                prune(child);
            }
        }
        _ => {}
    }
}

fn resolve_server_values(value: &mut Value, now_millis: i64) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp") {
                *value = Value::from(now_millis);
                return;
            }
            for child in map.values_mut() {
                resolve_server_values(child, now_millis);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                resolve_server_values(child, now_millis);
            }
        }
        _ => {}
    }
}
