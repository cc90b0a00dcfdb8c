//! Flow Control Credit Ledger
//!
//! Per-actor bookkeeping of how much work each peer may still push. Grants
//! are additive and clamped to `max_credit`; entries appear on first grant.
//! Enforcement belongs to the sending side, which reads the ledger.

use crate::handle::ActorId;
use std::collections::HashMap;

/// Default credit ceiling per peer
pub const DEFAULT_MAX_CREDIT: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct CreditLedger {
    credits: HashMap<ActorId, u64>,
    max_credit: u64,
}

impl CreditLedger {
    pub fn new(max_credit: u64) -> Self {
        Self {
            credits: HashMap::new(),
            max_credit,
        }
    }

    /// Add `delta` to the peer's credit, clamped; returns the new balance
    pub fn grant(&mut self, peer: &ActorId, delta: u64) -> u64 {
        let max_credit = self.max_credit;
        let credit = self.credits.entry(peer.clone()).or_insert(0);
        *credit = credit.saturating_add(delta).min(max_credit);
        *credit
    }

    /// Spend up to `amount`; returns the new balance, never below zero
    pub fn debit(&mut self, peer: &ActorId, amount: u64) -> u64 {
        match self.credits.get_mut(peer) {
            Some(credit) => {
                *credit = credit.saturating_sub(amount);
                *credit
            }
            None => 0,
        }
    }

    /// Current balance, 0 for unknown peers
    pub fn credit(&self, peer: &ActorId) -> u64 {
        self.credits.get(peer).copied().unwrap_or(0)
    }

    pub fn max_credit(&self) -> u64 {
        self.max_credit
    }

    /// Number of peers that ever received a grant
    pub fn len(&self) -> usize {
        self.credits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CREDIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lazy_entry_and_additive_grant() {
        let mut ledger = CreditLedger::new(100);
        let peer = ActorId::new();
        assert_eq!(ledger.credit(&peer), 0);
        assert!(ledger.is_empty());

        assert_eq!(ledger.grant(&peer, 30), 30);
        assert_eq!(ledger.grant(&peer, 25), 55);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_grant_clamps_at_max() {
        let mut ledger = CreditLedger::new(100);
        let peer = ActorId::new();
        assert_eq!(ledger.grant(&peer, u64::MAX), 100);
        assert_eq!(ledger.grant(&peer, 1), 100);
    }

    #[test]
    fn test_debit_saturates_at_zero() {
        let mut ledger = CreditLedger::default();
        let peer = ActorId::new();
        assert_eq!(ledger.debit(&peer, 5), 0);
        assert!(ledger.is_empty());
        ledger.grant(&peer, 3);
        assert_eq!(ledger.debit(&peer, 5), 0);
    }

    #[test]
    fn test_peers_are_independent() {
        let mut ledger = CreditLedger::new(10);
        let (a, b) = (ActorId::new(), ActorId::new());
        ledger.grant(&a, 7);
        assert_eq!(ledger.credit(&b), 0);
    }

    proptest! {
        #[test]
        fn two_grants_sum_then_clamp(max in 0u64..10_000, d1 in 0u64..20_000, d2 in 0u64..20_000) {
            let mut ledger = CreditLedger::new(max);
            let peer = ActorId::new();
            ledger.grant(&peer, d1);
            let credit = ledger.grant(&peer, d2);
            prop_assert_eq!(credit, max.min(d1 + d2));
            prop_assert!(credit <= max);
        }
    }
}
