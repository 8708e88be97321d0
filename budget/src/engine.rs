//! Budget engine orchestration
//!
//! `BudgetEngine` owns both registries behind their own locks and is the
//! single entry point for the network layer (submissions and votes), the
//! maintenance task (pruning), and block validation (expected payments).
//! Cross-registry work copies the minimal lookup data out of one lock
//! before touching the other, so no call path ever holds two registry
//! locks at once.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use budget_storage::SnapshotStore;

use crate::chain::{ChainView, ValidatorDirectory};
use crate::error::{BudgetError, Result};
use crate::finalized::{EntryFault, FinalizedBudget, FinalizedBudgetRegistry};
use crate::params::BudgetParams;
use crate::proposal::BudgetProposal;
use crate::registry::ProposalRegistry;
use crate::scheduler::{select_payouts, Payment};
use crate::vote::{Tally, Vote, VoteOutcome};

const SNAPSHOT_NAME: &str = "governance";

/// How the engine disposed of an inbound vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDisposition {
    /// Recorded as a fresh vote
    Accepted,
    /// Replaced the voter's previous vote on the same target
    Superseded,
    /// Target hash unknown; vote buffered pending the target's arrival
    Buffered,
}

impl From<VoteOutcome> for VoteDisposition {
    fn from(outcome: VoteOutcome) -> Self {
        match outcome {
            VoteOutcome::Accepted => VoteDisposition::Accepted,
            VoteOutcome::Superseded => VoteDisposition::Superseded,
        }
    }
}

/// Bounded holding area for votes whose target has not arrived yet
///
/// Network propagation order is not guaranteed, so a vote can precede its
/// proposal. The buffer evicts oldest-first at capacity, which caps memory
/// under an adversarial vote flood.
#[derive(Debug)]
struct OrphanVoteBuffer {
    votes: VecDeque<Vote>,
    capacity: usize,
}

impl OrphanVoteBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            votes: VecDeque::new(),
            capacity,
        }
    }

    fn push(&mut self, vote: Vote) {
        while self.votes.len() >= self.capacity {
            self.votes.pop_front();
        }
        self.votes.push_back(vote);
    }

    fn drain_for(&mut self, target_hash: &str) -> Vec<Vote> {
        let mut matching = Vec::new();
        let mut rest = VecDeque::with_capacity(self.votes.len());
        for vote in self.votes.drain(..) {
            if vote.target_hash == target_hash {
                matching.push(vote);
            } else {
                rest.push_back(vote);
            }
        }
        self.votes = rest;
        matching
    }

    fn len(&self) -> usize {
        self.votes.len()
    }
}

/// Persisted governance state
#[derive(Serialize, Deserialize)]
struct GovernanceSnapshot {
    proposals: ProposalRegistry,
    finalized: FinalizedBudgetRegistry,
}

/// Read-only per-proposal summary for the informational layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalOverview {
    pub name: String,
    pub url: String,
    pub hash: String,
    pub fee_tx_hash: String,
    pub payee: String,
    pub start_height: u64,
    pub end_height: u64,
    pub total_payment_count: u32,
    pub remaining_payment_count: u32,
    pub cycle_amount: u64,
    pub total_amount: u64,
    pub yeas: u64,
    pub nays: u64,
    pub abstains: u64,
    /// Fraction of yes votes among yes+no (0.0 with no votes cast)
    pub ratio: f64,
    /// Amount granted by the projection for the next superblock, 0 if the
    /// proposal does not currently make the cut
    pub allotted: u64,
    pub established: bool,
    pub valid: bool,
    /// Set when `valid` is false, with the first failing check
    pub invalid_reason: Option<String>,
}

/// The governance engine
///
/// Explicitly constructed and owned by the node; there is no process-wide
/// instance. Clone-cheap handles are obtained by wrapping it in an `Arc`
/// at the call site.
pub struct BudgetEngine {
    params: BudgetParams,
    directory: Arc<dyn ValidatorDirectory>,
    chain: Arc<dyn ChainView>,
    proposals: RwLock<ProposalRegistry>,
    finalized: RwLock<FinalizedBudgetRegistry>,
    orphans: RwLock<OrphanVoteBuffer>,
}

impl BudgetEngine {
    pub fn new(
        params: BudgetParams,
        directory: Arc<dyn ValidatorDirectory>,
        chain: Arc<dyn ChainView>,
    ) -> Self {
        let orphan_capacity = params.orphan_vote_capacity;
        Self {
            params,
            directory,
            chain,
            proposals: RwLock::new(ProposalRegistry::new()),
            finalized: RwLock::new(FinalizedBudgetRegistry::new()),
            orphans: RwLock::new(OrphanVoteBuffer::new(orphan_capacity)),
        }
    }

    pub fn params(&self) -> &BudgetParams {
        &self.params
    }

    /// Ingest a proposal from the network
    ///
    /// Returns the proposal hash on admission; the relay layer re-broadcasts
    /// on `Ok` and drops on `Err`. Buffered votes for this hash are replayed.
    pub fn submit_proposal(&self, proposal: BudgetProposal) -> Result<String> {
        let hash = {
            let mut proposals = self.proposals.write();
            proposals.submit(proposal, self.chain.as_ref(), &self.params)
        }
        .map_err(|e| {
            log::debug!("budget proposal rejected: {}", e);
            e
        })?;

        log::info!("admitted budget proposal {}", hash);
        self.replay_orphans(&hash);
        Ok(hash)
    }

    /// Ingest a finalized-budget candidate from the network
    pub fn submit_finalized(&self, candidate: FinalizedBudget) -> Result<String> {
        let hash = {
            let mut finalized = self.finalized.write();
            finalized.submit(candidate, &self.params)
        }
        .map_err(|e| {
            log::debug!("finalized budget rejected: {}", e);
            e
        })?;

        log::info!("admitted finalized budget {}", hash);
        self.replay_orphans(&hash);
        Ok(hash)
    }

    /// Ingest a vote from the network
    ///
    /// Routes to whichever registry knows the target hash; a vote on a hash
    /// neither registry knows is buffered, not rejected, because the target
    /// may still be in flight.
    pub fn cast_vote(&self, vote: Vote) -> Result<VoteDisposition> {
        {
            let mut proposals = self.proposals.write();
            if proposals.contains(&vote.target_hash) {
                let outcome = proposals.cast_vote(vote, self.directory.as_ref());
                return Self::finish_vote(outcome);
            }
        }
        {
            let mut finalized = self.finalized.write();
            if finalized.contains(&vote.target_hash) {
                let outcome = finalized.cast_vote(vote, self.directory.as_ref());
                return Self::finish_vote(outcome);
            }
        }

        log::debug!(
            "buffering vote from {} for unknown target {}",
            vote.voter_id,
            vote.target_hash
        );
        self.orphans.write().push(vote);
        Ok(VoteDisposition::Buffered)
    }

    fn finish_vote(outcome: Result<VoteOutcome>) -> Result<VoteDisposition> {
        match outcome {
            Ok(o) => Ok(o.into()),
            Err(e) => {
                match &e {
                    BudgetError::InvalidSignature | BudgetError::UnknownVoter(_) => {
                        log::warn!("vote rejected: {}", e);
                    }
                    _ => log::debug!("vote rejected: {}", e),
                }
                Err(e)
            }
        }
    }

    fn replay_orphans(&self, target_hash: &str) {
        let buffered = self.orphans.write().drain_for(target_hash);
        if buffered.is_empty() {
            return;
        }
        log::debug!(
            "replaying {} buffered vote(s) for {}",
            buffered.len(),
            target_hash
        );
        for vote in buffered {
            if let Err(e) = self.cast_vote(vote) {
                log::debug!("buffered vote dropped: {}", e);
            }
        }
    }

    /// Remove expired proposals and candidates along with their votes.
    /// Returns the pruned (proposal, candidate) hashes.
    pub fn check_and_prune(&self) -> (Vec<String>, Vec<String>) {
        let height = self.chain.tip_height();

        let pruned_proposals = {
            let mut proposals = self.proposals.write();
            proposals.prune(height, self.chain.as_ref(), &self.params)
        };
        let pruned_candidates = self.finalized.write().prune(height);

        if !pruned_proposals.is_empty() || !pruned_candidates.is_empty() {
            log::info!(
                "pruned {} proposal(s) and {} finalized budget(s) at height {}",
                pruned_proposals.len(),
                pruned_candidates.len(),
                height
            );
        }
        (pruned_proposals, pruned_candidates)
    }

    /// The payment list block validation must see at `height`
    ///
    /// If a finalized-budget winner covers the height its schedule is
    /// authoritative; otherwise the advisory projection from currently
    /// qualifying proposals is returned (display and estimation only).
    pub fn expected_payments_at(&self, height: u64) -> Vec<Payment> {
        let lookup = self.proposals.read().payment_lookup();
        {
            let finalized = self.finalized.read();
            if let Some(winner) = finalized.winner_for(
                height,
                self.chain.as_ref(),
                self.directory.as_ref(),
                &self.params,
                &lookup,
            ) {
                return winner.payments.clone();
            }
        }
        self.projected_payouts(height)
    }

    /// Advisory projection: rank qualifying proposals under the cycle cap
    pub fn projected_payouts(&self, height: u64) -> Vec<Payment> {
        let qualifying = self.proposals.read().qualifying(
            height,
            self.chain.as_ref(),
            self.directory.as_ref(),
            &self.params,
        );
        select_payouts(qualifying, self.chain.total_cycle_budget(height))
    }

    // --- read-only accessors for the informational layer ---

    pub fn proposal(&self, hash: &str) -> Option<BudgetProposal> {
        self.proposals.read().get(hash).cloned()
    }

    pub fn proposals(&self) -> Vec<BudgetProposal> {
        self.proposals.read().all().into_iter().cloned().collect()
    }

    pub fn proposal_tally(&self, hash: &str) -> Result<Tally> {
        self.proposals.read().tally(hash, self.directory.as_ref())
    }

    pub fn candidate(&self, hash: &str) -> Option<FinalizedBudget> {
        self.finalized.read().get(hash).cloned()
    }

    pub fn candidates_for(&self, height: u64) -> Vec<FinalizedBudget> {
        self.finalized
            .read()
            .candidates_for(height)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn candidate_tally(&self, hash: &str) -> Result<Tally> {
        self.finalized.read().tally(hash, self.directory.as_ref())
    }

    /// Entry faults for a candidate, recomputed against the live proposal set
    pub fn candidate_faults(&self, hash: &str) -> Result<Vec<EntryFault>> {
        let lookup = self.proposals.read().payment_lookup();
        self.finalized.read().audit(hash, &lookup)
    }

    /// Full summary of one proposal, as surfaced over RPC
    pub fn proposal_overview(&self, hash: &str) -> Result<ProposalOverview> {
        let height = self.chain.tip_height();
        let (proposal, tally, established, invalid_reason) = {
            let proposals = self.proposals.read();
            let proposal = proposals
                .get(hash)
                .ok_or_else(|| BudgetError::UnknownReference(hash.to_string()))?
                .clone();
            let tally = proposals.tally(hash, self.directory.as_ref())?;
            let established = proposals
                .is_established(&proposal, self.chain.as_ref(), &self.params)
                .is_ok();
            let invalid_reason =
                proposals.validity_error(&proposal, height, self.chain.as_ref(), &self.params);
            (proposal, tally, established, invalid_reason)
        };

        // lock released above; the projection takes its own read lock
        let allotted = self
            .projected_payouts(self.params.next_cycle_start(height))
            .into_iter()
            .find(|p| p.proposal_hash == proposal.hash())
            .map(|p| p.amount)
            .unwrap_or(0);

        let decided = tally.yes + tally.no;
        let ratio = if decided == 0 {
            0.0
        } else {
            tally.yes as f64 / decided as f64
        };

        Ok(ProposalOverview {
            name: proposal.name.clone(),
            url: proposal.url.clone(),
            hash: proposal.hash().to_string(),
            fee_tx_hash: proposal.fee_tx_hash.clone(),
            payee: proposal.payee.clone(),
            start_height: proposal.start_height,
            end_height: proposal.end_height(&self.params),
            total_payment_count: proposal.payment_count,
            remaining_payment_count: proposal.remaining_payment_count(height, &self.params),
            cycle_amount: proposal.amount,
            total_amount: proposal.total_amount(),
            yeas: tally.yes,
            nays: tally.no,
            abstains: tally.abstain,
            ratio,
            allotted,
            established,
            valid: invalid_reason.is_none(),
            invalid_reason,
        })
    }

    pub fn orphan_vote_count(&self) -> usize {
        self.orphans.read().len()
    }

    // --- persistence ---

    /// Write both registries to the snapshot store
    pub fn save(&self, store: &SnapshotStore) -> Result<()> {
        let snapshot = GovernanceSnapshot {
            proposals: self.proposals.read().clone(),
            finalized: self.finalized.read().clone(),
        };
        store.save(SNAPSHOT_NAME, &snapshot)?;
        Ok(())
    }

    /// Restore an engine from a snapshot
    ///
    /// Pruning runs before the engine is handed out, so no query ever sees
    /// state that expired while the process was down.
    pub fn load(
        params: BudgetParams,
        directory: Arc<dyn ValidatorDirectory>,
        chain: Arc<dyn ChainView>,
        store: &SnapshotStore,
    ) -> Result<Self> {
        let snapshot: GovernanceSnapshot = store.load(SNAPSHOT_NAME)?;
        let orphan_capacity = params.orphan_vote_capacity;
        let engine = Self {
            params,
            directory,
            chain,
            proposals: RwLock::new(snapshot.proposals),
            finalized: RwLock::new(snapshot.finalized),
            orphans: RwLock::new(OrphanVoteBuffer::new(orphan_capacity)),
        };
        engine.check_and_prune();
        log::info!(
            "loaded governance snapshot: {} proposal(s), {} finalized budget(s)",
            engine.proposals.read().len(),
            engine.finalized.read().len()
        );
        Ok(engine)
    }
}
