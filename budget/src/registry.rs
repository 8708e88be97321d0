//! Proposal registry
//!
//! Owns every known budget proposal and the votes attached to them.
//! Admission enforces well-formedness only; collateral maturity is a
//! separate, re-checked query (`is_established`) because a fee transaction
//! that is immature today may be mature tomorrow.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainView, ValidatorDirectory};
use crate::error::{BudgetError, Result};
use crate::params::BudgetParams;
use crate::proposal::BudgetProposal;
use crate::scheduler::RankedProposal;
use crate::vote::{Tally, Vote, VoteLedger, VoteOutcome};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalRegistry {
    proposals: HashMap<String, BudgetProposal>,
    ledger: VoteLedger,
}

impl ProposalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a proposal
    ///
    /// Checks run in a fixed order and the first failure is reported
    /// verbatim to the caller. Collateral depth is deliberately not
    /// checked here.
    pub fn submit(
        &mut self,
        proposal: BudgetProposal,
        chain: &dyn ChainView,
        params: &BudgetParams,
    ) -> Result<String> {
        let min_start = params.next_cycle_start(chain.tip_height());
        let cycle_budget = chain.total_cycle_budget(proposal.start_height);
        proposal.check_well_formed(params, cycle_budget, Some(min_start))?;

        let hash = proposal.hash().to_string();
        if self.proposals.contains_key(&hash) {
            return Err(BudgetError::DuplicateProposal(hash));
        }

        self.proposals.insert(hash.clone(), proposal);
        Ok(hash)
    }

    /// Record a vote on a registered proposal
    pub fn cast_vote(
        &mut self,
        vote: Vote,
        directory: &dyn ValidatorDirectory,
    ) -> Result<VoteOutcome> {
        if !self.proposals.contains_key(&vote.target_hash) {
            return Err(BudgetError::UnknownReference(vote.target_hash));
        }
        self.ledger.cast_vote(vote, directory)
    }

    /// Whether the proposal's collateral has matured
    ///
    /// Requires the fee transaction to be buried `fee_confirmations` deep
    /// and aged past the establishment window relative to the tip's
    /// timestamp. Re-evaluated on every call; immaturity is never cached.
    pub fn is_established(
        &self,
        proposal: &BudgetProposal,
        chain: &dyn ChainView,
        params: &BudgetParams,
    ) -> Result<()> {
        crate::chain::collateral_established(&proposal.fee_tx_hash, chain, params)
    }

    /// Well-formed, not expired, and within the current cycle's cap
    pub fn is_valid(
        &self,
        proposal: &BudgetProposal,
        height: u64,
        chain: &dyn ChainView,
        params: &BudgetParams,
    ) -> bool {
        self.validity_error(proposal, height, chain, params).is_none()
    }

    /// Why the proposal fails `is_valid`, if it does
    pub fn validity_error(
        &self,
        proposal: &BudgetProposal,
        height: u64,
        chain: &dyn ChainView,
        params: &BudgetParams,
    ) -> Option<String> {
        let end = proposal.end_height(params);
        if height > end {
            return Some(format!("expired: last payment height {} has passed", end));
        }
        let cycle_budget = chain.total_cycle_budget(height);
        proposal
            .check_well_formed(params, cycle_budget, None)
            .err()
            .map(|e| e.to_string())
    }

    pub fn tally(&self, hash: &str, directory: &dyn ValidatorDirectory) -> Result<Tally> {
        if !self.proposals.contains_key(hash) {
            return Err(BudgetError::UnknownReference(hash.to_string()));
        }
        Ok(self.ledger.tally(hash, directory))
    }

    pub fn net_yes_minus_no(&self, hash: &str, directory: &dyn ValidatorDirectory) -> Result<i64> {
        self.tally(hash, directory).map(|t| t.net_yes())
    }

    /// Proposals that qualify for payout ranking at the current tip:
    /// valid, established, and with a yes-margin above the quorum
    /// heuristic (`active_count / quorum_divisor`).
    pub fn qualifying(
        &self,
        height: u64,
        chain: &dyn ChainView,
        directory: &dyn ValidatorDirectory,
        params: &BudgetParams,
    ) -> Vec<RankedProposal> {
        let margin_required = (directory.active_count() as u64 / params.quorum_divisor) as i64;

        self.proposals
            .values()
            .filter(|p| self.is_valid(p, height, chain, params))
            .filter(|p| self.is_established(p, chain, params).is_ok())
            .filter_map(|p| {
                let net_yes = self.ledger.tally(p.hash(), directory).net_yes();
                if net_yes > margin_required {
                    Some(RankedProposal {
                        hash: p.hash().to_string(),
                        payee: p.payee.clone(),
                        amount: p.amount,
                        net_yes,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Drop proposals whose end height has passed or whose collateral
    /// reference is no longer in the chain, together with their votes.
    /// Returns the pruned hashes.
    pub fn prune(
        &mut self,
        height: u64,
        chain: &dyn ChainView,
        params: &BudgetParams,
    ) -> Vec<String> {
        let expired: Vec<String> = self
            .proposals
            .values()
            .filter(|p| {
                height > p.end_height(params)
                    || chain.confirmations_and_timestamp(&p.fee_tx_hash).is_none()
            })
            .map(|p| p.hash().to_string())
            .collect();

        for hash in &expired {
            self.proposals.remove(hash);
            self.ledger.remove_target(hash);
        }
        expired
    }

    pub fn get(&self, hash: &str) -> Option<&BudgetProposal> {
        self.proposals.get(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.proposals.contains_key(hash)
    }

    pub fn all(&self) -> Vec<&BudgetProposal> {
        self.proposals.values().collect()
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// Payee and amount by proposal hash, for auditing finalized budgets
    /// without holding a reference into this registry
    pub fn payment_lookup(&self) -> HashMap<String, (String, u64)> {
        self.proposals
            .values()
            .map(|p| (p.hash().to_string(), (p.payee.clone(), p.amount)))
            .collect()
    }
}
