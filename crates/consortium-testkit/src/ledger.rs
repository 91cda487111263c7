//! In-memory governance tables

use async_trait::async_trait;
use consortium_core::{GovernanceReadEffects, TransportError};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Governance tables keyed by `(table, key)`
#[derive(Debug, Default)]
pub struct MockLedger {
    tables: RwLock<BTreeMap<(String, String), Value>>,
    unreachable: RwLock<bool>,
}

impl MockLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `table[key]`, replacing any existing entry
    pub fn insert(&self, table: &str, key: &str, value: Value) {
        self.tables
            .write()
            .insert((table.to_string(), key.to_string()), value);
    }

    /// Remove `table[key]`
    pub fn remove(&self, table: &str, key: &str) -> Option<Value> {
        self.tables
            .write()
            .remove(&(table.to_string(), key.to_string()))
    }

    /// Entry at `table[key]`
    pub fn get(&self, table: &str, key: &str) -> Option<Value> {
        self.tables
            .read()
            .get(&(table.to_string(), key.to_string()))
            .cloned()
    }

    /// Make every read fail as unreachable
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write() = unreachable;
    }
}

#[async_trait]
impl GovernanceReadEffects for MockLedger {
    async fn read(&self, table: &str, key: &str) -> Result<Option<Value>, TransportError> {
        if *self.unreachable.read() {
            return Err(TransportError::Unreachable {
                endpoint: format!("ledger:{table}"),
            });
        }
        Ok(self.get(table, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_after_insert() {
        let ledger = MockLedger::new();
        assert_eq!(ledger.read("t", "k").await.unwrap(), None);
        ledger.insert("t", "k", json!("v"));
        assert_eq!(ledger.read("t", "k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_unreachable_ledger() {
        let ledger = MockLedger::new();
        ledger.set_unreachable(true);
        assert!(ledger.read("t", "k").await.is_err());
    }
}
