//! Request rejection kinds shared across the round core
//!
//! Every variant is a local, recoverable rejection of a single request.
//! A rejected request is a no-op: it never halts the round or leaves
//! shared state partially applied.

/// Why a player action request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The request is not valid in the current round phase
    #[error("request not valid in current round phase")]
    WrongPhase,

    /// Referenced participant, package or vehicle does not exist
    #[error("entity not found")]
    NotFound,

    /// Package status transition not allowed by the transition graph
    #[error("invalid package status transition")]
    InvalidTransition,

    /// Proximity, carry-slot or liveness requirements not met
    #[error("request requirements not met")]
    NotEligible,

    /// Another request already won this package this tick
    #[error("package already taken this tick")]
    AlreadyTaken,

    /// Debit would drive the balance negative
    #[error("insufficient funds")]
    InsufficientFunds,
}

impl RequestError {
    /// Stable wire code for `Rejected` events
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongPhase => "wrong_phase",
            Self::NotFound => "not_found",
            Self::InvalidTransition => "invalid_transition",
            Self::NotEligible => "not_eligible",
            Self::AlreadyTaken => "already_taken",
            Self::InsufficientFunds => "insufficient_funds",
        }
    }
}
