use thiserror::Error;

/// Failure taxonomy for the credit-gated submission workflow.
///
/// `Validation` and `AuthorizationExhausted` are handled entirely inside the
/// controller and surfaced as UI state; `Transport` carries a user-facing
/// message while the raw cause is logged; `Stale` is discarded silently.
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("credit balance exhausted")]
    AuthorizationExhausted,

    #[error("{0}")]
    Transport(String),

    #[error("response for superseded generation {generation} discarded")]
    Stale { generation: u64 },
}
