//! Deterministic payout selection
//!
//! Every node must compute the identical payment list from the same vote
//! state, so ranking uses a total order: descending yes-margin, then
//! ascending content hash.

use serde::{Deserialize, Serialize};

/// One expected superblock payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub proposal_hash: String,
    pub payee: String,
    pub amount: u64,
}

/// A qualifying proposal with its current yes-margin
#[derive(Debug, Clone)]
pub struct RankedProposal {
    pub hash: String,
    pub payee: String,
    pub amount: u64,
    pub net_yes: i64,
}

/// Rank qualifying proposals and pack them under the cycle budget cap
///
/// Proposals are walked best-ranked first; one that would push the running
/// allotment over `cap` is skipped, but smaller proposals after it are
/// still considered. This is deliberately not a knapsack optimization:
/// whoever has the votes gets paid first, up to the cap.
pub fn select_payouts(mut qualifying: Vec<RankedProposal>, cap: u64) -> Vec<Payment> {
    qualifying.sort_by(|a, b| b.net_yes.cmp(&a.net_yes).then_with(|| a.hash.cmp(&b.hash)));

    let mut allotted: u64 = 0;
    let mut payments = Vec::new();
    for proposal in qualifying {
        let Some(next) = allotted.checked_add(proposal.amount) else {
            continue;
        };
        if next > cap {
            continue;
        }
        allotted = next;
        payments.push(Payment {
            proposal_hash: proposal.hash,
            payee: proposal.payee,
            amount: proposal.amount,
        });
    }
    payments
}
