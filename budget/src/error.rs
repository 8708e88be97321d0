//! Budget engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Malformed proposal: {0}")]
    MalformedProposal(String),

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Invalid vote signature")]
    InvalidSignature,

    #[error("Unknown voter: {0}")]
    UnknownVoter(String),

    #[error("Stale vote")]
    StaleVote,

    #[error("Collateral not yet mature: {0}")]
    CollateralImmature(String),

    #[error("Amount exceeds cycle budget: requested {requested}, cap {cap}")]
    CapExceeded { requested: u64, cap: u64 },

    #[error("Proposal already registered: {0}")]
    DuplicateProposal(String),

    #[error("Finalized budget already registered: {0}")]
    DuplicateCandidate(String),

    #[error("Storage error: {0}")]
    Storage(#[from] budget_storage::StorageError),
}

pub type Result<T> = std::result::Result<T, BudgetError>;
