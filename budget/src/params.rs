//! Network parameters for budget governance
//!
//! All consensus-relevant knobs live here so mainnet and test networks can
//! differ without touching the engine logic.

use serde::{Deserialize, Serialize};

/// Base monetary unit (8 decimal places)
pub const COIN: u64 = 100_000_000;

/// Budget governance parameter set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetParams {
    /// Blocks between superblocks (one budget cycle)
    pub cycle_length_blocks: u64,

    /// Maximum number of recurring payments a proposal may request
    pub max_payment_count: u32,

    /// Minimum per-payment amount
    pub min_payment_amount: u64,

    /// Collateral fee burned to submit a proposal
    ///
    /// Informational for the wallet layer constructing the fee
    /// transaction. The engine only sees the fee transaction's depth and
    /// timestamp, so the amount itself is not enforced here.
    pub proposal_fee: u64,

    /// Collateral fee burned to submit a finalized budget; informational,
    /// like `proposal_fee`
    pub finalization_fee: u64,

    /// Minimum confirmations on a collateral fee transaction
    pub fee_confirmations: u64,

    /// Seconds a collateral fee transaction must age before the item
    /// counts as established
    pub establishment_window_secs: i64,

    /// Divisor for the yes-margin quorum heuristic: a proposal qualifies
    /// for payout only when `yes - no > active_count / quorum_divisor`
    pub quorum_divisor: u64,

    /// Cap on buffered votes whose target has not arrived yet
    pub orphan_vote_capacity: usize,

    /// Maximum proposal name length
    pub max_name_length: usize,

    /// Maximum proposal URL length
    pub max_url_length: usize,
}

impl BudgetParams {
    /// Mainnet parameters: monthly cycles, one-day establishment window
    pub fn mainnet() -> Self {
        Self {
            cycle_length_blocks: 43_200,
            max_payment_count: 6,
            min_payment_amount: 10 * COIN,
            proposal_fee: 50 * COIN,
            finalization_fee: 50 * COIN,
            fee_confirmations: 6,
            establishment_window_secs: 86_400,
            quorum_divisor: 10,
            orphan_vote_capacity: 10_000,
            max_name_length: 20,
            max_url_length: 64,
        }
    }

    /// Testnet parameters: short cycles and a five-minute establishment
    /// window so proposals can be exercised quickly
    pub fn testnet() -> Self {
        Self {
            cycle_length_blocks: 144,
            max_payment_count: 20,
            establishment_window_secs: 300,
            fee_confirmations: 3,
            ..Self::mainnet()
        }
    }

    /// First cycle boundary strictly after `height`
    pub fn next_cycle_start(&self, height: u64) -> u64 {
        height - (height % self.cycle_length_blocks) + self.cycle_length_blocks
    }

    /// Whether `height` falls on a cycle boundary (a superblock height)
    pub fn is_cycle_boundary(&self, height: u64) -> bool {
        height % self.cycle_length_blocks == 0
    }
}
