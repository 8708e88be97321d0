//! Budget proposal data model
//!
//! A proposal is a collateral-backed request for a recurring payment from
//! the block-reward budget. Its identity is a content hash over every field
//! that matters to consensus, with the collateral fee transaction hash as
//! the nonce tying the proposal to its on-chain commitment.

use serde::{Deserialize, Serialize};

use crate::error::{BudgetError, Result};
use crate::params::BudgetParams;

/// A single recurring-payment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetProposal {
    pub name: String,
    pub url: String,
    /// Address the recurring payment goes to
    pub payee: String,
    /// Amount paid per cycle
    pub amount: u64,
    /// Total number of cycle payments requested
    pub payment_count: u32,
    /// First superblock height this proposal pays at; must be a cycle
    /// boundary
    pub start_height: u64,
    /// Collateral fee transaction backing this proposal
    pub fee_tx_hash: String,
    /// Content hash (identity)
    hash: String,
}

impl BudgetProposal {
    pub fn new(
        name: String,
        url: String,
        payee: String,
        amount: u64,
        payment_count: u32,
        start_height: u64,
        fee_tx_hash: String,
    ) -> Self {
        let hash = budget_crypto::content_hash(&[
            name.as_bytes(),
            url.as_bytes(),
            payee.as_bytes(),
            &amount.to_le_bytes(),
            &payment_count.to_le_bytes(),
            &start_height.to_le_bytes(),
            fee_tx_hash.as_bytes(),
        ]);

        Self {
            name,
            url,
            payee,
            amount,
            payment_count,
            start_height,
            fee_tx_hash,
            hash,
        }
    }

    /// Content hash identifying this proposal
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Height of the last cycle boundary covered by this proposal
    pub fn end_height(&self, params: &BudgetParams) -> u64 {
        self.start_height + self.payment_count as u64 * params.cycle_length_blocks
    }

    /// Height of the last superblock this proposal is paid at
    pub fn last_payment_height(&self, params: &BudgetParams) -> u64 {
        self.start_height + (self.payment_count as u64 - 1) * params.cycle_length_blocks
    }

    /// Payments still owed at `height`
    pub fn remaining_payment_count(&self, height: u64, params: &BudgetParams) -> u32 {
        if height <= self.start_height {
            return self.payment_count;
        }
        let last = self.last_payment_height(params);
        if height > last {
            return 0;
        }
        ((last - height) / params.cycle_length_blocks + 1) as u32
    }

    /// Total amount requested over the proposal's lifetime
    pub fn total_amount(&self) -> u64 {
        self.amount * self.payment_count as u64
    }

    /// Ordered well-formedness checks; the first failure wins and its
    /// reason is what the submitting caller sees.
    ///
    /// `min_start` is supplied at submission time (start must be at least
    /// the next cycle boundary) and omitted when re-validating proposals
    /// that are already in flight.
    pub fn check_well_formed(
        &self,
        params: &BudgetParams,
        cycle_budget: u64,
        min_start: Option<u64>,
    ) -> Result<()> {
        if self.name.is_empty() || self.name.len() > params.max_name_length {
            return Err(BudgetError::MalformedProposal(format!(
                "Invalid proposal name, limit of {} characters",
                params.max_name_length
            )));
        }
        if self.name.chars().any(|c| c.is_control()) {
            return Err(BudgetError::MalformedProposal(
                "Invalid proposal name, contains control characters".to_string(),
            ));
        }

        validate_url(&self.url, params.max_url_length)?;

        if self.payment_count < 1 || self.payment_count > params.max_payment_count {
            return Err(BudgetError::MalformedProposal(format!(
                "Invalid payment count, must be between 1 and {}",
                params.max_payment_count
            )));
        }

        if !params.is_cycle_boundary(self.start_height) {
            return Err(BudgetError::MalformedProposal(
                "Invalid block start - must be a budget cycle block".to_string(),
            ));
        }
        if let Some(min_start) = min_start {
            if self.start_height < min_start {
                return Err(BudgetError::MalformedProposal(format!(
                    "Invalid block start - next valid block: {}",
                    min_start
                )));
            }
        }

        if self.payee.is_empty()
            || self.payee.len() > 64
            || !self.payee.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(BudgetError::MalformedProposal(
                "Invalid payment address".to_string(),
            ));
        }

        if self.amount < params.min_payment_amount {
            return Err(BudgetError::MalformedProposal(format!(
                "Invalid amount - payment is less than minimum {}",
                params.min_payment_amount
            )));
        }

        if self.total_amount() > cycle_budget {
            return Err(BudgetError::CapExceeded {
                requested: self.total_amount(),
                cap: cycle_budget,
            });
        }

        Ok(())
    }
}

/// URL must be short, printable ASCII, and carry an http(s) scheme
fn validate_url(url: &str, max_len: usize) -> Result<()> {
    if url.is_empty() || url.len() > max_len {
        return Err(BudgetError::MalformedProposal(format!(
            "Invalid URL, limit of {} characters",
            max_len
        )));
    }
    if !url.chars().all(|c| c.is_ascii_graphic()) {
        return Err(BudgetError::MalformedProposal(
            "Invalid URL, must be printable ASCII".to_string(),
        ));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(BudgetError::MalformedProposal(
            "Invalid URL, must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}
