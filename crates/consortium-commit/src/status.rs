//! Transaction commit status and its legal transitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commit status of a transaction as reported by a replica
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// Replica has no record of the transaction
    #[default]
    Unknown,
    /// Replicated but not yet committed
    Pending,
    /// Committed; terminal
    Committed,
    /// Will never commit; terminal
    Invalid,
}

impl TxStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Invalid)
    }

    /// Whether a record in `self` may move to `next`.
    ///
    /// Re-observing the current status is always allowed.
    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Unknown => matches!(next, Self::Pending | Self::Committed | Self::Invalid),
            Self::Pending => matches!(next, Self::Committed | Self::Invalid),
            Self::Committed | Self::Invalid => false,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Pending => "PENDING",
            Self::Committed => "COMMITTED",
            Self::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = TxStatus> {
        prop_oneof![
            Just(TxStatus::Unknown),
            Just(TxStatus::Pending),
            Just(TxStatus::Committed),
            Just(TxStatus::Invalid),
        ]
    }

    #[test]
    fn test_transition_table() {
        use TxStatus::*;
        assert!(Unknown.can_transition_to(Pending));
        assert!(Unknown.can_transition_to(Committed));
        assert!(Pending.can_transition_to(Invalid));
        assert!(!Pending.can_transition_to(Unknown));
        assert!(!Committed.can_transition_to(Pending));
        assert!(!Invalid.can_transition_to(Committed));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&TxStatus::Committed).unwrap(), "\"COMMITTED\"");
        assert_eq!(
            serde_json::from_str::<TxStatus>("\"PENDING\"").unwrap(),
            TxStatus::Pending
        );
    }

    proptest! {
        #[test]
        fn prop_terminal_states_never_move(from in arb_status(), to in arb_status()) {
            if from.is_terminal() && from != to {
                prop_assert!(!from.can_transition_to(to));
            }
        }

        #[test]
        fn prop_nothing_returns_to_unknown(from in arb_status()) {
            if from != TxStatus::Unknown {
                prop_assert!(!from.can_transition_to(TxStatus::Unknown));
            }
        }
    }
}
