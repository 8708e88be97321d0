//! Injected capabilities from the chain and masternode layers
//!
//! The engine never talks to the network or the UTXO set directly. It sees
//! the masternode registry through `ValidatorDirectory` and the chain state
//! through `ChainView`, so both can be faked in tests.

use crate::error::{BudgetError, Result};
use crate::params::BudgetParams;

/// Resolves masternode voting identities
pub trait ValidatorDirectory: Send + Sync {
    /// Voting public key (hex) for a masternode, if it is known
    fn resolve_public_key(&self, voter_id: &str) -> Option<String>;

    /// Whether the masternode is currently enabled; disabled nodes keep
    /// their historical votes in the ledger but those votes do not count
    fn is_enabled(&self, voter_id: &str) -> bool;

    /// Number of currently active masternodes
    fn active_count(&self) -> usize;
}

/// Read-only view of chain state the budget engine depends on
pub trait ChainView: Send + Sync {
    /// Current best block height
    fn tip_height(&self) -> u64;

    /// Timestamp of the current best block
    fn tip_time(&self) -> i64;

    /// Confirmation depth and timestamp of a collateral fee transaction,
    /// or `None` if the transaction is not in the chain
    fn confirmations_and_timestamp(&self, fee_tx_hash: &str) -> Option<(u64, i64)>;

    /// Total budget available for the cycle containing `height`; may vary
    /// with the issuance schedule
    fn total_cycle_budget(&self, height: u64) -> u64;
}

/// Shared collateral-maturity gate for proposals and finalized budgets
///
/// The fee transaction must be buried `fee_confirmations` deep and its
/// timestamp must trail the tip's by at least the establishment window.
pub(crate) fn collateral_established(
    fee_tx_hash: &str,
    chain: &dyn ChainView,
    params: &BudgetParams,
) -> Result<()> {
    let (depth, fee_time) = chain
        .confirmations_and_timestamp(fee_tx_hash)
        .ok_or_else(|| {
            BudgetError::CollateralImmature(format!(
                "collateral transaction {} not found",
                fee_tx_hash
            ))
        })?;

    if depth < params.fee_confirmations {
        return Err(BudgetError::CollateralImmature(format!(
            "{} of {} confirmations",
            depth, params.fee_confirmations
        )));
    }

    let age = chain.tip_time() - fee_time;
    if age < params.establishment_window_secs {
        return Err(BudgetError::CollateralImmature(format!(
            "collateral aged {}s of {}s",
            age, params.establishment_window_secs
        )));
    }

    Ok(())
}
