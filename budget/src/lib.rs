//! Masternode Budget Governance Engine
//!
//! Stakeholders propose recurring payments from the block-reward budget,
//! masternodes vote on them, and the network converges on a single
//! finalized payment schedule enforced at superblock heights.
//!
//! The engine is deliberately self-contained: wallet transaction
//! construction, peer-to-peer relay, and the masternode registry are
//! external, reached only through the `ChainView` and `ValidatorDirectory`
//! traits.

pub mod chain;
pub mod engine;
pub mod error;
pub mod finalized;
pub mod params;
pub mod proposal;
pub mod registry;
pub mod scheduler;
pub mod vote;

pub use chain::{ChainView, ValidatorDirectory};
pub use engine::{BudgetEngine, ProposalOverview, VoteDisposition};
pub use error::{BudgetError, Result};
pub use finalized::{EntryFault, FinalizedBudget, FinalizedBudgetRegistry};
pub use params::{BudgetParams, COIN};
pub use proposal::BudgetProposal;
pub use registry::ProposalRegistry;
pub use scheduler::{select_payouts, Payment, RankedProposal};
pub use vote::{Tally, Vote, VoteDirection, VoteLedger, VoteOutcome};
