//! Error types for the ledger engine.

use crate::entry::{CustomerId, EntryId};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during engine operation.
///
/// `Validation` and the not-found variants are expected outcomes that a caller
/// can act on. `Consistency`, `Store` and `Conflict` mean the operation was
/// abandoned and the store left exactly as it was before the call.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Input rejected before any store access
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Amend or lookup of an entry id that does not exist in this ledger
    #[error("no such {ledger} entry: {id}")]
    EntryNotFound { ledger: &'static str, id: EntryId },

    /// Customer reference unknown to the directory
    #[error("no such customer: {id}")]
    CustomerNotFound { id: CustomerId },

    /// Running balances failed to satisfy the prefix-sum rule
    #[error("{ledger} ledger of customer {customer} is inconsistent: {reason}")]
    Consistency {
        ledger: &'static str,
        customer: CustomerId,
        reason: String,
    },

    /// Backing store failure; nothing from the failed unit of work was applied
    #[error("store error: {reason}")]
    Store { reason: String, retryable: bool },

    /// Another writer committed to the same customer's rows first
    #[error("concurrent modification of customer {customer}")]
    Conflict { customer: CustomerId },

    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid operation record
    #[error("Invalid operation at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Missing input file argument
    #[error("Missing input file argument. Usage: commodity-ledger <operations.csv>")]
    MissingArgument,
}

impl LedgerError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Store { retryable, .. } => *retryable,
            LedgerError::Conflict { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for errors the caller caused and can correct.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation { .. }
                | LedgerError::EntryNotFound { .. }
                | LedgerError::CustomerNotFound { .. }
        )
    }
}
