//! Supertraits for the effect combinations each side needs
//!
//! Grouping the bounds keeps signatures such as `ConsortiumNode<E>` readable.

use super::{CryptoEffects, GovernanceReadEffects, PhysicalTimeEffects, TransportEffects};

/// Effects a node needs: share decryption and combination, archived key
/// reads, and a clock for bounded waits
pub trait NodeEffects: CryptoEffects + GovernanceReadEffects + PhysicalTimeEffects {}

impl<T> NodeEffects for T where T: CryptoEffects + GovernanceReadEffects + PhysicalTimeEffects {}

/// Effects a member client needs: transport, signing, share lookup, clock
pub trait ClientEffects:
    TransportEffects + CryptoEffects + GovernanceReadEffects + PhysicalTimeEffects
{
}

impl<T> ClientEffects for T where
    T: TransportEffects + CryptoEffects + GovernanceReadEffects + PhysicalTimeEffects
{
}

/// Every capability the core consumes
pub trait ConsortiumEffects: NodeEffects + ClientEffects {}

impl<T> ConsortiumEffects for T where T: NodeEffects + ClientEffects {}
