//! Votes and the vote ledger
//!
//! One vote type serves both proposal votes and finalized-budget votes:
//! the target is identified by content hash either way, and the signature
//! and supersede rules are identical.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use budget_crypto::VotingKey;

use crate::chain::ValidatorDirectory;
use crate::error::{BudgetError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VoteDirection {
    Yes,
    No,
    Abstain,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Yes => "yes",
            VoteDirection::No => "no",
            VoteDirection::Abstain => "abstain",
        }
    }
}

/// A signed masternode vote on a proposal or finalized budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Masternode identity casting the vote
    pub voter_id: String,
    /// Content hash of the proposal or finalized budget voted on
    pub target_hash: String,
    pub direction: VoteDirection,
    pub timestamp: i64,
    /// Hex-encoded ed25519 signature over `signing_payload`
    pub signature: String,
}

impl Vote {
    /// Sign a vote with the masternode's voting key
    pub fn signed(
        key: &VotingKey,
        voter_id: String,
        target_hash: String,
        direction: VoteDirection,
        timestamp: i64,
    ) -> Self {
        let payload = signing_payload(&voter_id, &target_hash, direction, timestamp);
        let signature = key.sign_hex(&payload);
        Self {
            voter_id,
            target_hash,
            direction,
            timestamp,
            signature,
        }
    }

    /// Sign a vote timestamped now
    pub fn signed_now(
        key: &VotingKey,
        voter_id: String,
        target_hash: String,
        direction: VoteDirection,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp();
        Self::signed(key, voter_id, target_hash, direction, timestamp)
    }

    /// Canonical bytes the signature covers
    pub fn signing_payload(&self) -> Vec<u8> {
        signing_payload(&self.voter_id, &self.target_hash, self.direction, self.timestamp)
    }

    /// Verify the signature against the voter's public key
    pub fn verify(&self, public_key_hex: &str) -> Result<()> {
        budget_crypto::verify_hex(public_key_hex, &self.signing_payload(), &self.signature)
            .map_err(|_| BudgetError::InvalidSignature)
    }
}

fn signing_payload(
    voter_id: &str,
    target_hash: &str,
    direction: VoteDirection,
    timestamp: i64,
) -> Vec<u8> {
    format!(
        "{}|{}|{}|{}",
        voter_id,
        target_hash,
        direction.as_str(),
        timestamp
    )
    .into_bytes()
}

/// Outcome of an accepted `cast_vote`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote from this voter on this target
    Accepted,
    /// A strictly newer vote replaced the voter's previous one
    Superseded,
}

/// Yes/no/abstain counts for one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
}

impl Tally {
    pub fn net_yes(&self) -> i64 {
        self.yes as i64 - self.no as i64
    }

    pub fn total(&self) -> u64 {
        self.yes + self.no + self.abstain
    }
}

/// Stores at most one vote per (voter, target)
///
/// Tallies are recomputed from the live vote set on every call; there are
/// no running counters to corrupt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteLedger {
    /// target hash -> voter id -> vote
    votes: HashMap<String, HashMap<String, Vote>>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a vote
    ///
    /// The voter must resolve in the directory and the signature must
    /// verify. An equal-or-older timestamp than the stored vote is a
    /// `StaleVote`; equal timestamps keep the first-seen vote so a replayed
    /// message can never flip a vote.
    pub fn cast_vote(
        &mut self,
        vote: Vote,
        directory: &dyn ValidatorDirectory,
    ) -> Result<VoteOutcome> {
        let public_key = directory
            .resolve_public_key(&vote.voter_id)
            .ok_or_else(|| BudgetError::UnknownVoter(vote.voter_id.clone()))?;
        vote.verify(&public_key)?;

        let by_voter = self.votes.entry(vote.target_hash.clone()).or_default();
        match by_voter.get(&vote.voter_id) {
            Some(existing) if existing.timestamp >= vote.timestamp => Err(BudgetError::StaleVote),
            Some(_) => {
                by_voter.insert(vote.voter_id.clone(), vote);
                Ok(VoteOutcome::Superseded)
            }
            None => {
                by_voter.insert(vote.voter_id.clone(), vote);
                Ok(VoteOutcome::Accepted)
            }
        }
    }

    /// Count the live votes for a target
    ///
    /// Only voters the directory currently reports as enabled count; a
    /// removed or disabled masternode's historical vote is ignored.
    pub fn tally(&self, target_hash: &str, directory: &dyn ValidatorDirectory) -> Tally {
        let mut tally = Tally::default();
        if let Some(by_voter) = self.votes.get(target_hash) {
            for vote in by_voter.values() {
                if !directory.is_enabled(&vote.voter_id) {
                    continue;
                }
                match vote.direction {
                    VoteDirection::Yes => tally.yes += 1,
                    VoteDirection::No => tally.no += 1,
                    VoteDirection::Abstain => tally.abstain += 1,
                }
            }
        }
        tally
    }

    /// All stored votes for a target
    pub fn votes_for(&self, target_hash: &str) -> Vec<&Vote> {
        self.votes
            .get(target_hash)
            .map(|by_voter| by_voter.values().collect())
            .unwrap_or_default()
    }

    /// Drop every vote attached to a target (used when the target is pruned)
    pub fn remove_target(&mut self, target_hash: &str) {
        self.votes.remove(target_hash);
    }

    pub fn vote_count(&self) -> usize {
        self.votes.values().map(|by_voter| by_voter.len()).sum()
    }
}
