//! Read access to governance tables held by the ledger

use super::transport::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Reads of governance tables (members, proposals, recovery shares, archived
/// network keys). Returns `None` for absent keys.
#[async_trait]
pub trait GovernanceReadEffects: Send + Sync {
    /// Read one entry of `table`
    async fn read(&self, table: &str, key: &str) -> Result<Option<Value>, TransportError>;
}

#[async_trait]
impl<T: GovernanceReadEffects + ?Sized> GovernanceReadEffects for Arc<T> {
    async fn read(&self, table: &str, key: &str) -> Result<Option<Value>, TransportError> {
        (**self).read(table, key).await
    }
}
