//! Finalized budgets and their registry
//!
//! A finalized budget is one submitter's claim of the full payment schedule
//! for a superblock. Several competing candidates can exist for the same
//! height; the validator set votes, and `winner_for` resolves the
//! agreement deterministically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainView, ValidatorDirectory};
use crate::error::{BudgetError, Result};
use crate::params::BudgetParams;
use crate::scheduler::Payment;
use crate::vote::{Tally, Vote, VoteLedger, VoteOutcome};

/// A candidate payment schedule for one superblock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedBudget {
    pub name: String,
    /// Superblock height of the first payment
    pub start_height: u64,
    /// Ordered payment list this candidate commits to
    pub payments: Vec<Payment>,
    /// Collateral fee transaction backing this candidate
    pub fee_tx_hash: String,
    hash: String,
}

impl FinalizedBudget {
    pub fn new(
        name: String,
        start_height: u64,
        payments: Vec<Payment>,
        fee_tx_hash: String,
    ) -> Self {
        let mut parts: Vec<Vec<u8>> = vec![
            name.as_bytes().to_vec(),
            start_height.to_le_bytes().to_vec(),
        ];
        for payment in &payments {
            parts.push(payment.proposal_hash.as_bytes().to_vec());
            parts.push(payment.payee.as_bytes().to_vec());
            parts.push(payment.amount.to_le_bytes().to_vec());
        }
        parts.push(fee_tx_hash.as_bytes().to_vec());

        let part_refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        let hash = budget_crypto::content_hash(&part_refs);

        Self {
            name,
            start_height,
            payments,
            fee_tx_hash,
            hash,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Last height this candidate covers
    pub fn end_height(&self) -> u64 {
        self.start_height + self.payments.len() as u64 - 1
    }

    pub fn covers(&self, height: u64) -> bool {
        self.start_height <= height && height <= self.end_height()
    }

    pub fn total_amount(&self) -> u64 {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

/// An auditable defect in a candidate's payment entry
///
/// Faults do not evict a candidate from the registry; they make it
/// permanently ineligible to win and give voters a reason to vote it down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryFault {
    /// Payment references a proposal hash not in the proposal registry
    UnknownProposal(String),
    /// Payment payee disagrees with the registered proposal's payee
    PayeeMismatch(String),
    /// Payment amount disagrees with the registered proposal's amount
    AmountMismatch(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizedBudgetRegistry {
    candidates: HashMap<String, FinalizedBudget>,
    ledger: VoteLedger,
}

impl FinalizedBudgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a candidate
    ///
    /// Entry faults against the proposal registry are not checked here:
    /// they are recomputed at query time so a candidate that propagated
    /// ahead of its proposals is not permanently condemned.
    pub fn submit(&mut self, candidate: FinalizedBudget, params: &BudgetParams) -> Result<String> {
        if candidate.name.is_empty() || candidate.name.len() > params.max_name_length {
            return Err(BudgetError::MalformedProposal(format!(
                "Invalid budget name, limit of {} characters",
                params.max_name_length
            )));
        }
        if candidate.payments.is_empty() {
            return Err(BudgetError::MalformedProposal(
                "Finalized budget carries no payments".to_string(),
            ));
        }
        if !params.is_cycle_boundary(candidate.start_height) {
            return Err(BudgetError::MalformedProposal(
                "Invalid block start - must be a budget cycle block".to_string(),
            ));
        }

        let hash = candidate.hash().to_string();
        if self.candidates.contains_key(&hash) {
            return Err(BudgetError::DuplicateCandidate(hash));
        }

        self.candidates.insert(hash.clone(), candidate);
        Ok(hash)
    }

    /// Record a vote on a registered candidate
    pub fn cast_vote(
        &mut self,
        vote: Vote,
        directory: &dyn ValidatorDirectory,
    ) -> Result<VoteOutcome> {
        if !self.candidates.contains_key(&vote.target_hash) {
            return Err(BudgetError::UnknownReference(vote.target_hash));
        }
        self.ledger.cast_vote(vote, directory)
    }

    /// Audit a candidate's payment entries against the registered
    /// proposals (`lookup` maps proposal hash to payee and amount)
    pub fn audit(
        &self,
        hash: &str,
        lookup: &HashMap<String, (String, u64)>,
    ) -> Result<Vec<EntryFault>> {
        let candidate = self
            .candidates
            .get(hash)
            .ok_or_else(|| BudgetError::UnknownReference(hash.to_string()))?;
        Ok(audit_payments(candidate, lookup))
    }

    /// Collateral maturity, re-checked per call exactly as for proposals
    pub fn is_established(
        &self,
        candidate: &FinalizedBudget,
        chain: &dyn ChainView,
        params: &BudgetParams,
    ) -> Result<()> {
        crate::chain::collateral_established(&candidate.fee_tx_hash, chain, params)
    }

    pub fn tally(&self, hash: &str, directory: &dyn ValidatorDirectory) -> Result<Tally> {
        if !self.candidates.contains_key(hash) {
            return Err(BudgetError::UnknownReference(hash.to_string()));
        }
        Ok(self.ledger.tally(hash, directory))
    }

    /// The candidate consensus accepts for `height`, if any
    ///
    /// Among established candidates that cover the height and audit clean,
    /// the highest YES count wins; ties break to the ascending content
    /// hash so every replica picks the same winner. A candidate with any
    /// entry fault never wins, whatever its vote count.
    pub fn winner_for(
        &self,
        height: u64,
        chain: &dyn ChainView,
        directory: &dyn ValidatorDirectory,
        params: &BudgetParams,
        lookup: &HashMap<String, (String, u64)>,
    ) -> Option<&FinalizedBudget> {
        let mut best: Option<(&FinalizedBudget, u64)> = None;

        for candidate in self.candidates.values() {
            if !candidate.covers(height) {
                continue;
            }
            if self.is_established(candidate, chain, params).is_err() {
                continue;
            }
            if !audit_payments(candidate, lookup).is_empty() {
                continue;
            }

            let yes = self.ledger.tally(candidate.hash(), directory).yes;
            best = match best {
                None => Some((candidate, yes)),
                Some((leader, leader_yes)) => {
                    if yes > leader_yes || (yes == leader_yes && candidate.hash() < leader.hash()) {
                        Some((candidate, yes))
                    } else {
                        Some((leader, leader_yes))
                    }
                }
            };
        }

        best.map(|(candidate, _)| candidate)
    }

    /// Drop candidates whose covered range has passed, with their votes.
    /// Returns the pruned hashes.
    pub fn prune(&mut self, height: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .candidates
            .values()
            .filter(|c| height > c.end_height())
            .map(|c| c.hash().to_string())
            .collect();

        for hash in &expired {
            self.candidates.remove(hash);
            self.ledger.remove_target(hash);
        }
        expired
    }

    pub fn get(&self, hash: &str) -> Option<&FinalizedBudget> {
        self.candidates.get(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.candidates.contains_key(hash)
    }

    pub fn all(&self) -> Vec<&FinalizedBudget> {
        self.candidates.values().collect()
    }

    /// All candidates covering a height, for the informational layer
    pub fn candidates_for(&self, height: u64) -> Vec<&FinalizedBudget> {
        self.candidates.values().filter(|c| c.covers(height)).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn audit_payments(
    candidate: &FinalizedBudget,
    lookup: &HashMap<String, (String, u64)>,
) -> Vec<EntryFault> {
    let mut faults = Vec::new();
    for payment in &candidate.payments {
        match lookup.get(&payment.proposal_hash) {
            None => faults.push(EntryFault::UnknownProposal(payment.proposal_hash.clone())),
            Some((payee, amount)) => {
                if payee != &payment.payee {
                    faults.push(EntryFault::PayeeMismatch(payment.proposal_hash.clone()));
                }
                if *amount != payment.amount {
                    faults.push(EntryFault::AmountMismatch(payment.proposal_hash.clone()));
                }
            }
        }
    }
    faults
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::COIN;
    use crate::vote::VoteDirection;
    use budget_crypto::VotingKey;

    struct FakeDirectory {
        keys: HashMap<String, VotingKey>,
    }

    impl FakeDirectory {
        fn with_nodes(count: usize) -> Self {
            let mut keys = HashMap::new();
            for i in 0..count {
                keys.insert(format!("mn{}", i), VotingKey::generate());
            }
            Self { keys }
        }
    }

    impl ValidatorDirectory for FakeDirectory {
        fn resolve_public_key(&self, voter_id: &str) -> Option<String> {
            self.keys.get(voter_id).map(|k| k.public_key_hex())
        }

        fn is_enabled(&self, voter_id: &str) -> bool {
            self.keys.contains_key(voter_id)
        }

        fn active_count(&self) -> usize {
            self.keys.len()
        }
    }

    struct FakeChain {
        time: i64,
        fee_txs: HashMap<String, (u64, i64)>,
    }

    impl FakeChain {
        fn with_mature_fees(fees: &[&str]) -> Self {
            let time = 1_000_000;
            let mut fee_txs = HashMap::new();
            for fee in fees {
                fee_txs.insert(fee.to_string(), (10, time - 1000));
            }
            Self { time, fee_txs }
        }
    }

    impl ChainView for FakeChain {
        fn tip_height(&self) -> u64 {
            100
        }

        fn tip_time(&self) -> i64 {
            self.time
        }

        fn confirmations_and_timestamp(&self, fee_tx_hash: &str) -> Option<(u64, i64)> {
            self.fee_txs.get(fee_tx_hash).copied()
        }

        fn total_cycle_budget(&self, _height: u64) -> u64 {
            1000 * COIN
        }
    }

    fn payment(proposal_hash: &str, amount: u64) -> Payment {
        Payment {
            proposal_hash: proposal_hash.to_string(),
            payee: format!("payee{}", proposal_hash),
            amount,
        }
    }

    fn lookup_for(payments: &[Payment]) -> HashMap<String, (String, u64)> {
        payments
            .iter()
            .map(|p| (p.proposal_hash.clone(), (p.payee.clone(), p.amount)))
            .collect()
    }

    fn vote_yes(
        dir: &FakeDirectory,
        registry: &mut FinalizedBudgetRegistry,
        voter: &str,
        target: &str,
        ts: i64,
    ) {
        let vote = Vote::signed(
            &dir.keys[voter],
            voter.to_string(),
            target.to_string(),
            VoteDirection::Yes,
            ts,
        );
        registry.cast_vote(vote, dir).unwrap();
    }

    #[test]
    fn test_submit_checks() {
        let params = BudgetParams::testnet();
        let mut registry = FinalizedBudgetRegistry::new();

        // empty payments
        let bad = FinalizedBudget::new("b".into(), 144, vec![], "fee".into());
        assert!(registry.submit(bad, &params).is_err());

        // unaligned start
        let bad = FinalizedBudget::new("b".into(), 145, vec![payment("p", 10)], "fee".into());
        assert!(registry.submit(bad, &params).is_err());

        let good = FinalizedBudget::new("b".into(), 144, vec![payment("p", 10)], "fee".into());
        let hash = registry.submit(good.clone(), &params).unwrap();
        assert!(registry.contains(&hash));

        assert!(matches!(
            registry.submit(good, &params),
            Err(BudgetError::DuplicateCandidate(_))
        ));
    }

    #[test]
    fn test_audit_reports_faults() {
        let params = BudgetParams::testnet();
        let mut registry = FinalizedBudgetRegistry::new();

        let payments = vec![payment("pa", 100), payment("pb", 200)];
        let hash = registry
            .submit(
                FinalizedBudget::new("b".into(), 144, payments.clone(), "fee".into()),
                &params,
            )
            .unwrap();

        // clean against matching proposals
        assert!(registry.audit(&hash, &lookup_for(&payments)).unwrap().is_empty());

        // wrong amount for pb, pa missing entirely
        let mut lookup = lookup_for(&payments[1..]);
        lookup.get_mut("pb").unwrap().1 = 999;
        let faults = registry.audit(&hash, &lookup).unwrap();
        assert!(faults.contains(&EntryFault::UnknownProposal("pa".into())));
        assert!(faults.contains(&EntryFault::AmountMismatch("pb".into())));
    }

    #[test]
    fn test_winner_by_vote_count() {
        let params = BudgetParams::testnet();
        let dir = FakeDirectory::with_nodes(5);
        let chain = FakeChain::with_mature_fees(&["feea", "feeb"]);
        let mut registry = FinalizedBudgetRegistry::new();

        let payments = vec![payment("p", 100)];
        let a = registry
            .submit(
                FinalizedBudget::new("a".into(), 144, payments.clone(), "feea".into()),
                &params,
            )
            .unwrap();
        let b = registry
            .submit(
                FinalizedBudget::new("b".into(), 144, payments.clone(), "feeb".into()),
                &params,
            )
            .unwrap();

        let lookup = lookup_for(&payments);
        vote_yes(&dir, &mut registry, "mn0", &a, 100);
        vote_yes(&dir, &mut registry, "mn1", &a, 100);
        vote_yes(&dir, &mut registry, "mn2", &b, 100);

        let winner = registry.winner_for(144, &chain, &dir, &params, &lookup).unwrap();
        assert_eq!(winner.hash(), a);
    }

    #[test]
    fn test_winner_tie_breaks_by_hash() {
        let params = BudgetParams::testnet();
        let dir = FakeDirectory::with_nodes(10);
        let chain = FakeChain::with_mature_fees(&["feea", "feeb"]);
        let mut registry = FinalizedBudgetRegistry::new();

        let payments = vec![payment("p", 100)];
        let a = registry
            .submit(
                FinalizedBudget::new("a".into(), 144, payments.clone(), "feea".into()),
                &params,
            )
            .unwrap();
        let b = registry
            .submit(
                FinalizedBudget::new("b".into(), 144, payments.clone(), "feeb".into()),
                &params,
            )
            .unwrap();

        // five YES each
        for i in 0..5 {
            vote_yes(&dir, &mut registry, &format!("mn{}", i), &a, 100);
        }
        for i in 5..10 {
            vote_yes(&dir, &mut registry, &format!("mn{}", i), &b, 100);
        }

        let lookup = lookup_for(&payments);
        let expected = if a < b { &a } else { &b };
        let winner = registry.winner_for(144, &chain, &dir, &params, &lookup).unwrap();
        assert_eq!(winner.hash(), *expected);

        // deterministic across repeated calls
        for _ in 0..3 {
            let again = registry.winner_for(144, &chain, &dir, &params, &lookup).unwrap();
            assert_eq!(again.hash(), *expected);
        }
    }

    #[test]
    fn test_faulted_candidate_never_wins() {
        let params = BudgetParams::testnet();
        let dir = FakeDirectory::with_nodes(6);
        let chain = FakeChain::with_mature_fees(&["feebad", "feegood"]);
        let mut registry = FinalizedBudgetRegistry::new();

        let good_payments = vec![payment("p", 100)];
        // bad candidate pays a different payee for the same proposal
        let mut bad_payments = good_payments.clone();
        bad_payments[0].payee = "attacker".to_string();

        let bad = registry
            .submit(
                FinalizedBudget::new("bad".into(), 144, bad_payments, "feebad".into()),
                &params,
            )
            .unwrap();
        let good = registry
            .submit(
                FinalizedBudget::new("good".into(), 144, good_payments.clone(), "feegood".into()),
                &params,
            )
            .unwrap();

        // unanimous YES for the corrupt candidate, one vote for the clean one
        for i in 0..5 {
            vote_yes(&dir, &mut registry, &format!("mn{}", i), &bad, 100);
        }
        vote_yes(&dir, &mut registry, "mn5", &good, 100);

        let lookup = lookup_for(&good_payments);
        let winner = registry.winner_for(144, &chain, &dir, &params, &lookup).unwrap();
        assert_eq!(winner.hash(), good);
    }

    #[test]
    fn test_unestablished_candidate_cannot_win() {
        let params = BudgetParams::testnet();
        let dir = FakeDirectory::with_nodes(3);
        // no fee transactions in the chain at all
        let chain = FakeChain::with_mature_fees(&[]);
        let mut registry = FinalizedBudgetRegistry::new();

        let payments = vec![payment("p", 100)];
        let hash = registry
            .submit(
                FinalizedBudget::new("a".into(), 144, payments.clone(), "feea".into()),
                &params,
            )
            .unwrap();
        vote_yes(&dir, &mut registry, "mn0", &hash, 100);

        let lookup = lookup_for(&payments);
        assert!(registry.winner_for(144, &chain, &dir, &params, &lookup).is_none());
    }

    #[test]
    fn test_prune_past_candidates() {
        let params = BudgetParams::testnet();
        let mut registry = FinalizedBudgetRegistry::new();

        let payments = vec![payment("p", 100), payment("q", 50)];
        let hash = registry
            .submit(
                FinalizedBudget::new("a".into(), 144, payments, "fee".into()),
                &params,
            )
            .unwrap();

        let end = registry.get(&hash).unwrap().end_height();
        assert_eq!(end, 145);

        assert!(registry.prune(end).is_empty());
        assert_eq!(registry.prune(end + 1), vec![hash]);
        assert!(registry.is_empty());
    }
}
