//! Member records

use consortium_core::{KeyRef, MemberId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Member lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Admitted by proposal, not yet acknowledged the state
    Accepted,
    /// Acknowledged; may vote, propose and submit recovery shares
    Active,
    /// Removed by proposal; terminal
    Retired,
}

/// Identity material supplied when a member is admitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Signing key reference
    pub public_key: KeyRef,
    /// Encryption key reference used for recovery shares
    pub encryption_key: KeyRef,
    /// Opaque application data attached to the member
    #[serde(default)]
    pub member_data: Value,
}

impl MemberInfo {
    /// Member info with no attached data
    pub fn new(public_key: impl Into<String>, encryption_key: impl Into<String>) -> Self {
        Self {
            public_key: KeyRef::new(public_key),
            encryption_key: KeyRef::new(encryption_key),
            member_data: Value::Null,
        }
    }
}

/// A consortium member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Member identifier
    pub id: MemberId,
    /// Lifecycle status
    pub status: MemberStatus,
    /// Signing key reference
    pub public_key: KeyRef,
    /// Encryption key reference
    pub encryption_key: KeyRef,
    /// Opaque application data
    pub member_data: Value,
}

impl Member {
    pub(crate) fn from_info(id: MemberId, status: MemberStatus, info: MemberInfo) -> Self {
        Self {
            id,
            status,
            public_key: info.public_key,
            encryption_key: info.encryption_key,
            member_data: info.member_data,
        }
    }

    /// Whether the member currently holds voting rights
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}
