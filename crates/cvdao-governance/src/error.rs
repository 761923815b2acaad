use thiserror::Error;

use crate::access::Role;

/// Errors that can occur in governance operations.
///
/// Every operation that returns one of these leaves governor state untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GovernanceError {
    #[error("Unauthorized: {account} lacks role {role}")]
    Unauthorized { account: String, role: Role },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Already voted: {0}")]
    AlreadyVoted(String),

    #[error("No voting weight at snapshot: {0}")]
    ZeroWeight(String),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u128, available: u128 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(u64),

    #[error("Invalid config: {0}")]
    Config(String),
}

impl GovernanceError {
    /// Whether this error belongs to the invalid-argument class.
    ///
    /// Unknown proposal ids are reported as [`GovernanceError::ProposalNotFound`]
    /// but classify as bad arguments.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            GovernanceError::InvalidArgument(_) | GovernanceError::ProposalNotFound(_)
        )
    }
}
