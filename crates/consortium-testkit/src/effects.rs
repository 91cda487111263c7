//! Composite effect handlers for nodes and member clients

use crate::clock::ControllableClock;
use crate::crypto::MockCrypto;
use crate::ledger::MockLedger;
use crate::transport::InProcessTransport;
use async_trait::async_trait;
use consortium_core::{
    CryptoEffects, CryptoError, DecryptedShare, GovernanceReadEffects, KeyRef, PhysicalTime,
    PhysicalTimeEffects, RealTimeHandler, RecoveredSecret, TimeError, TransportEffects,
    TransportError, TransportResponse,
};
use serde_json::Value;
use std::sync::Arc;

/// Node-side effects: mock crypto, a shared in-memory ledger and a clock
#[derive(Clone)]
pub struct TestEffects {
    crypto: MockCrypto,
    ledger: Arc<MockLedger>,
    time: Arc<dyn PhysicalTimeEffects>,
    clock: Option<ControllableClock>,
}

impl TestEffects {
    /// Effects over a controllable clock; sleeps return immediately
    pub fn deterministic() -> Self {
        let clock = ControllableClock::default();
        Self {
            crypto: MockCrypto::new(),
            ledger: Arc::new(MockLedger::new()),
            time: Arc::new(clock.clone()),
            clock: Some(clock),
        }
    }

    /// Effects over the system clock, for tests with concurrent tasks
    pub fn real_time() -> Self {
        Self {
            crypto: MockCrypto::new(),
            ledger: Arc::new(MockLedger::new()),
            time: Arc::new(RealTimeHandler),
            clock: None,
        }
    }

    /// Shared ledger tables
    pub fn ledger(&self) -> &Arc<MockLedger> {
        &self.ledger
    }

    /// The controllable clock, if this handler uses one
    pub fn clock(&self) -> Option<&ControllableClock> {
        self.clock.as_ref()
    }
}

#[async_trait]
impl CryptoEffects for TestEffects {
    async fn sign(&self, key: &KeyRef, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.crypto.sign(key, payload).await
    }

    async fn decrypt_share(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        recipient: &KeyRef,
        sender: &KeyRef,
    ) -> Result<DecryptedShare, CryptoError> {
        self.crypto
            .decrypt_share(ciphertext, nonce, recipient, sender)
            .await
    }

    async fn combine_shares(
        &self,
        shares: &[DecryptedShare],
        threshold: usize,
    ) -> Result<RecoveredSecret, CryptoError> {
        self.crypto.combine_shares(shares, threshold).await
    }
}

#[async_trait]
impl GovernanceReadEffects for TestEffects {
    async fn read(&self, table: &str, key: &str) -> Result<Option<Value>, TransportError> {
        self.ledger.read(table, key).await
    }
}

#[async_trait]
impl PhysicalTimeEffects for TestEffects {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        self.time.physical_time().await
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        self.time.sleep_ms(ms).await
    }
}

/// Client-side effects: the node's effects plus a transport bound to one
/// member
#[derive(Clone)]
pub struct MemberEffects {
    base: TestEffects,
    transport: Arc<InProcessTransport>,
}

impl MemberEffects {
    /// Effects for the member `transport` is bound to
    pub fn new(base: TestEffects, transport: Arc<InProcessTransport>) -> Self {
        Self { base, transport }
    }

    /// Transport in use
    pub fn transport(&self) -> &Arc<InProcessTransport> {
        &self.transport
    }
}

#[async_trait]
impl TransportEffects for MemberEffects {
    async fn request(
        &self,
        op: &str,
        params: Value,
        signed: bool,
    ) -> Result<TransportResponse, TransportError> {
        self.transport.request(op, params, signed).await
    }
}

#[async_trait]
impl CryptoEffects for MemberEffects {
    async fn sign(&self, key: &KeyRef, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.base.sign(key, payload).await
    }

    async fn decrypt_share(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        recipient: &KeyRef,
        sender: &KeyRef,
    ) -> Result<DecryptedShare, CryptoError> {
        self.base
            .decrypt_share(ciphertext, nonce, recipient, sender)
            .await
    }

    async fn combine_shares(
        &self,
        shares: &[DecryptedShare],
        threshold: usize,
    ) -> Result<RecoveredSecret, CryptoError> {
        self.base.combine_shares(shares, threshold).await
    }
}

#[async_trait]
impl GovernanceReadEffects for MemberEffects {
    async fn read(&self, table: &str, key: &str) -> Result<Option<Value>, TransportError> {
        self.base.read(table, key).await
    }
}

#[async_trait]
impl PhysicalTimeEffects for MemberEffects {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        self.base.physical_time().await
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        self.base.sleep_ms(ms).await
    }
}
