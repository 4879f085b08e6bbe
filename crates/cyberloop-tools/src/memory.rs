use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use serde_json::{Value, json};

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::{object, required_str};
use crate::{ToolError, ToolImplementation};

/// In-process key/value notes shared by every conversation in this process.
///
/// Concurrent writes to the same key are last-write-wins.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn retrieve(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Entries whose key or value contains `query`, ignoring case, sorted by key.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<(String, String)> {
        let needle = query.to_lowercase();
        let mut matches: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.key().to_lowercase().contains(&needle)
                    || entry.value().to_lowercase().contains(&needle)
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        matches.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        matches
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lets the model store and recall notes in a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryTool {
    store: Arc<MemoryStore>,
}

impl MemoryTool {
    #[must_use]
    pub const fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolImplementation for MemoryTool {
    fn get_definition(&self) -> Tool {
        let properties = BTreeMap::from([
            (
                "action".to_string(),
                Property::string_enum(
                    "Action to perform: store (save information), retrieve (get specific \
                     information by key), or search (find relevant memories by query)",
                    &["store", "retrieve", "search"],
                ),
            ),
            (
                "key".to_string(),
                Property::string(
                    "Key for storage/retrieval (required for store and retrieve actions). Use \
                     descriptive keys like \"user_name\", \"preferred_format\", etc.",
                ),
            ),
            (
                "value".to_string(),
                Property::string(
                    "Value to store (required for store action). Can be any text information \
                     to remember.",
                ),
            ),
            (
                "query".to_string(),
                Property::string(
                    "Search query to find relevant memories (required for search action)",
                ),
            ),
        ]);

        Tool::function(
            "memory",
            "Memory storage and retrieval system for persistent conversation history and user \
             preferences. Use this to remember important information across sessions, store \
             user preferences, or recall previously saved facts.",
            Parameters::new(properties, ["action"]),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let args = object(args)?;

        match required_str(args, "action")? {
            "store" => {
                let key = required_str(args, "key")?;
                let value = required_str(args, "value")?;
                debug!("Storing memory '{key}'");
                self.store.store(key, value);
                Ok(json!({ "stored": key }))
            }
            "retrieve" => {
                let key = required_str(args, "key")?;
                Ok(json!({ "key": key, "value": self.store.retrieve(key) }))
            }
            "search" => {
                let query = required_str(args, "query")?;
                let matches: Vec<Value> = self
                    .store
                    .search(query)
                    .into_iter()
                    .map(|(key, value)| json!({ "key": key, "value": value }))
                    .collect();
                Ok(json!({ "matches": matches }))
            }
            other => Err(ToolError::Unsupported {
                message: format!("Unknown action: {other}"),
                supported: vec![
                    "store".to_string(),
                    "retrieve".to_string(),
                    "search".to_string(),
                ],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_store_retrieve_and_search() {
        let store = Arc::new(MemoryStore::new());
        let tool = MemoryTool::new(Arc::clone(&store));

        let stored = tool
            .execute(&json!({"action": "store", "key": "user_name", "value": "Molly"}))
            .await
            .unwrap();
        assert_eq!(stored, json!({"stored": "user_name"}));
        store.store("preferred_format", "markdown");

        let found = tool
            .execute(&json!({"action": "retrieve", "key": "user_name"}))
            .await
            .unwrap();
        assert_eq!(found, json!({"key": "user_name", "value": "Molly"}));

        let missing = tool
            .execute(&json!({"action": "retrieve", "key": "nope"}))
            .await
            .unwrap();
        assert_eq!(missing["value"], Value::Null);

        let matches = tool
            .execute(&json!({"action": "search", "query": "MOLLY"}))
            .await
            .unwrap();
        assert_eq!(
            matches,
            json!({"matches": [{"key": "user_name", "value": "Molly"}]})
        );
    }

    #[test]
    fn test_last_write_wins() {
        let store = MemoryStore::new();
        store.store("k", "first");
        store.store("k", "second");
        assert_eq!(store.retrieve("k").as_deref(), Some("second"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_store_requires_value() {
        let tool = MemoryTool::new(Arc::new(MemoryStore::new()));
        let err = tool
            .execute(&json!({"action": "store", "key": "k"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing or invalid 'value' parameter");
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let tool = MemoryTool::new(Arc::new(MemoryStore::new()));
        let err = tool.execute(&json!({"action": "forget"})).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: forget");
    }
}
