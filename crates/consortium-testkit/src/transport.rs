//! In-process transport from a member client to a node
//!
//! Requests are dispatched straight into [`ConsortiumNode::handle`] with the
//! bound member as caller. Signatures are checked against the caller's
//! registered public key; a request whose signature does not verify reaches
//! the node as unsigned. Failures can be injected before or after delivery,
//! the latter modelling a request that was applied but whose response was
//! lost.

use crate::crypto::MockCrypto;
use crate::effects::TestEffects;
use crate::replica::ScriptedReplica;
use async_trait::async_trait;
use consortium_client::TX_STATUS_OP;
use consortium_commit::TxStatusSource;
use consortium_core::{
    ConsortiumError, MemberId, Result, TransportEffects, TransportError, TransportResponse, TxId,
};
use consortium_node::ConsortiumNode;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Failure to inject into the next request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Fail without delivering the request
    BeforeDelivery(TransportError),
    /// Deliver the request, then drop the response
    AfterDelivery(TransportError),
}

/// A request as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Operation name
    pub op: String,
    /// Whether the client asked for a signed request
    pub signed: bool,
    /// Whether the signature verified
    pub authenticated: bool,
}

/// Transport bound to one member and one node
pub struct InProcessTransport {
    node: Arc<ConsortiumNode<TestEffects>>,
    caller: MemberId,
    replica: Option<Arc<ScriptedReplica>>,
    failures: Mutex<VecDeque<InjectedFailure>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl InProcessTransport {
    /// Transport delivering `caller`'s requests to `node`
    pub fn new(node: Arc<ConsortiumNode<TestEffects>>, caller: MemberId) -> Self {
        Self {
            node,
            caller,
            replica: None,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer commit status queries from `replica`
    pub fn with_replica(mut self, replica: Arc<ScriptedReplica>) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Member this transport speaks for
    pub fn caller(&self) -> MemberId {
        self.caller
    }

    /// Queue a failure for an upcoming request
    pub fn fail_next(&self, failure: InjectedFailure) {
        self.failures.lock().push_back(failure);
    }

    /// Requests seen so far, including failed ones
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Strip the signature from `params` and check it against the caller's
    /// public key
    fn authenticate(&self, op: &str, params: &mut Value) -> bool {
        let signature = match params
            .as_object_mut()
            .and_then(|map| map.remove("signature"))
        {
            Some(Value::String(signature)) => signature,
            _ => return false,
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        let Ok(member) = self.node.member(self.caller) else {
            return false;
        };
        let Ok(payload) = serde_json::to_vec(&json!({ "op": op, "params": &*params })) else {
            return false;
        };
        MockCrypto::signature(&member.public_key, &payload) == signature
    }

    async fn deliver(&self, op: &str, params: Value, authenticated: bool) -> TransportResponse {
        let result = if op == TX_STATUS_OP {
            self.tx_status(params).await
        } else {
            self.node.handle(self.caller, op, params, authenticated).await
        };
        match result {
            Ok(body) => TransportResponse::ok(body),
            Err(e) => error_response(&e),
        }
    }

    async fn tx_status(&self, params: Value) -> Result<Value> {
        let replica = self
            .replica
            .as_ref()
            .ok_or_else(|| ConsortiumError::not_found("no replica attached"))?;
        let tx: TxId = serde_json::from_value(params)?;
        let status = replica.tx_status(tx).await?;
        Ok(json!({ "status": status }))
    }
}

fn error_response(error: &ConsortiumError) -> TransportResponse {
    let body = serde_json::to_value(error).unwrap_or_else(|_| Value::String(error.to_string()));
    TransportResponse::failure(error.kind().status_code(), body)
}

#[async_trait]
impl TransportEffects for InProcessTransport {
    async fn request(
        &self,
        op: &str,
        mut params: Value,
        signed: bool,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let authenticated = signed && self.authenticate(op, &mut params);
        self.requests.lock().push(RecordedRequest {
            op: op.to_string(),
            signed,
            authenticated,
        });

        let lost_response = match self.failures.lock().pop_front() {
            Some(InjectedFailure::BeforeDelivery(e)) => {
                debug!(caller = %self.caller, op, "request dropped before delivery");
                return Err(e);
            }
            Some(InjectedFailure::AfterDelivery(e)) => Some(e),
            None => None,
        };

        let response = self.deliver(op, params, authenticated).await;
        match lost_response {
            Some(e) => {
                debug!(caller = %self.caller, op, "response dropped after delivery");
                Err(e)
            }
            None => Ok(response),
        }
    }
}
