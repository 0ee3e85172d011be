//! Persistence layer.
//!
//! The realtime database is used as a hierarchical key-value store with
//! slash-separated paths. [`KeyValueStore`] is the single capability every
//! component receives; production uses [`rtdb::RtdbStore`], tests and local
//! runs use [`memory::MemoryStore`].

pub mod memory;
pub mod rtdb;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Path-addressed JSON store.
///
/// Writing `null` deletes. `update` applies several root-relative paths
/// in one request.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value at `path`; `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replace the value at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Multi-path update relative to the root.
    async fn update(&self, updates: Map<String, Value>) -> Result<()>;

    /// Delete the value at `path`.
    async fn remove(&self, path: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

pub mod paths {
    use super::encode_key;

    pub const MATCH_POOL: &str = "matchPool";
    pub const POOL_METADATA: &str = "poolMetadata";
    pub const PURCHASES: &str = "purchases";
    pub const REMOTE_CONFIG: &str = "remoteConfig";

    pub fn fixture(date: &str, fixture_id: i64) -> String {
        format!("{MATCH_POOL}/{date}/{fixture_id}")
    }

    pub fn user_purchases(user_id: &str) -> String {
        format!("{PURCHASES}/{}", encode_key(user_id))
    }

    pub fn purchase(user_id: &str, purchase_token: &str) -> String {
        format!("{}/{}", user_purchases(user_id), encode_key(purchase_token))
    }

    pub fn remote_config(key: &str) -> String {
        format!("{REMOTE_CONFIG}/{key}")
    }
}

/// Characters the database refuses in keys, plus the escape character.
const RESERVED_KEY_CHARS: &[char] = &['%', '.', '#', '$', '[', ']', '/'];

/// Escape a raw identifier (e.g. a purchase token) into a legal key.
pub fn encode_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if RESERVED_KEY_CHARS.contains(&c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a path into its non-empty segments.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Read and deserialize the value at `path`.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    path: &str,
) -> Result<Option<T>> {
    match store.get(path).await? {
        Some(value) => {
            let parsed = serde_json::from_value(value)
                .with_context(|| format!("Failed to parse stored value at {path}"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Serialize and write `value` at `path`.
pub async fn set_typed<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    path: &str,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_value(value)
        .with_context(|| format!("Failed to serialise value for {path}"))?;
    store.set(path, json).await
}

/// Read a server-only secret from `remoteConfig/{key}`.
///
/// Strings are returned as-is; objects (service-account JSON stored
/// unflattened) are returned re-serialized. Empty values count as absent.
pub async fn read_secret(store: &dyn KeyValueStore, key: &str) -> Result<Option<SecretString>> {
    let value = store
        .get(&paths::remote_config(key))
        .await
        .with_context(|| format!("Failed to read remote config entry {key}"))?;

    let raw = match value {
        Some(Value::String(s)) => s,
        Some(Value::Object(obj)) => Value::Object(obj).to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Ok(None),
    };

    if raw.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(SecretString::new(raw)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
