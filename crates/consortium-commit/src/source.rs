//! Where commit statuses come from

use crate::status::TxStatus;
use async_trait::async_trait;
use consortium_core::{Result, TxId};
use std::sync::Arc;

/// Anything that can report a transaction's commit status, typically a
/// replica reached through the transport
#[async_trait]
pub trait TxStatusSource: Send + Sync {
    /// Current status of `tx` as the source sees it
    async fn tx_status(&self, tx: TxId) -> Result<TxStatus>;
}

#[async_trait]
impl<T: TxStatusSource + ?Sized> TxStatusSource for Arc<T> {
    async fn tx_status(&self, tx: TxId) -> Result<TxStatus> {
        (**self).tx_status(tx).await
    }
}
