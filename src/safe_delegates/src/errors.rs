use crate::registry::ChainId;

/// Failures surfaced by the delegate synchronization core.
///
/// None of these are fatal: every failing operation leaves the engine state
/// as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelegateError {
    #[error("No Safe address configured")]
    NotConfigured,

    #[error("Wallet session has no account or chain")]
    Disconnected,

    #[error("Wallet has no account available for signing")]
    SignerUnavailable,

    #[error("Safe not found: {0}")]
    SafeNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No transaction service configured for chain {0}")]
    UnsupportedChain(ChainId),

    #[error("Signing failed: {0}")]
    SigningError(String),
}

impl DelegateError {
    /// Whether retrying the same intent later can succeed without any change
    /// in configuration or input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::SignerUnavailable | Self::NetworkError(_)
        )
    }
}

impl From<reqwest::Error> for DelegateError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkError(err.to_string())
    }
}
