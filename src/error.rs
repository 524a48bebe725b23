//! Error types for the escrow ledger
//!
//! Every operation returns a typed failure from this taxonomy. The numeric
//! codes are part of the external contract and must stay stable across
//! releases; callers route on `code()` rather than on message text.

use thiserror::Error;

/// Main error type for ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Caller lacks the required role for this transition
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Create collision on an existing key
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Reference to a non-existent escrow or payment
    #[error("not found: {0}")]
    NotFound(String),

    /// Release would exceed the escrow's total amount
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Operation not valid for the entity's current status
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed or out-of-bound input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl LedgerError {
    /// Stable numeric code for this error
    pub fn code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 100,
            Self::AlreadyExists(_) => 101,
            Self::NotFound(_) => 102,
            Self::InsufficientFunds(_) => 103,
            Self::InvalidState(_) => 104,
            Self::InvalidArgument(_) => 105,
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create an already-exists error
    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an insufficient-funds error
    pub fn insufficient_funds<S: Into<String>>(msg: S) -> Self {
        Self::InsufficientFunds(msg.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(LedgerError::unauthorized("x").code(), 100);
        assert_eq!(LedgerError::already_exists("x").code(), 101);
        assert_eq!(LedgerError::not_found("x").code(), 102);
        assert_eq!(LedgerError::insufficient_funds("x").code(), 103);
        assert_eq!(LedgerError::invalid_state("x").code(), 104);
        assert_eq!(LedgerError::invalid_argument("x").code(), 105);
    }
}
