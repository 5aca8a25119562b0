//! Error taxonomy for the anchor protocol (spec §7).
//!
//! Each enum groups one family named in the protocol's error taxonomy.
//! None of these are retried silently by the types that surface them —
//! retry policy lives in `orchestrator.rs`, which classifies `SendError`
//! and decides what to do with it.

use thiserror::Error;

/// Payload parse/encode failures (spec §4.1, §7 "Protocol errors").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload too short")]
    PayloadTooShort,

    #[error("unknown anchor type byte: {0}")]
    UnknownAnchorType(u8),

    #[error("version mismatch: observed {0}")]
    VersionMismatch(u8),

    #[error("move packet run truncated at index {0}")]
    MoveRunTruncated(usize),
}

/// VRF chain engine failures (spec §4.4, §7 "VRF errors"). These always
/// propagate to the caller — a VRF failure means the move cannot be
/// anchored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VrfError {
    #[error("fold validation failed: {field} = {value} out of bounds")]
    FoldingValidationError { field: &'static str, value: usize },

    #[error("fold extraction yielded zero bits at iteration {iteration}")]
    FoldingExtractionError { iteration: usize },

    /// Reserved for audit-side statistical qualification of entropy
    /// sources; never raised by the live VRF step.
    #[error("gamma validation failed: {0}")]
    GammaValidationError(String),
}

/// Classification of a ledger send failure (spec §4.5, §7 "Send errors").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("mempool conflict: {0}")]
    MempoolConflict(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("send timed out: {0}")]
    Timeout(String),

    #[error("unknown send error: {0}")]
    Unknown(String),
}

impl SendError {
    /// Classify a raw ledger error message by substring match (spec §4.5).
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("already spent")
            || lower.contains("mempool")
            || lower.contains("double spend")
        {
            SendError::MempoolConflict(message.to_string())
        } else if lower.contains("insufficient") || lower.contains("not enough") {
            SendError::InsufficientFunds(message.to_string())
        } else if lower.contains("timeout") || lower.contains("timed out") {
            SendError::Timeout(message.to_string())
        } else {
            SendError::Unknown(message.to_string())
        }
    }

    /// Whether the orchestrator should retry a send classified this way.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SendError::InsufficientFunds(_))
    }
}

/// UTXO pool failures (spec §4.6, §7 "Pool errors").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("UTXO pool is empty")]
    PoolEmpty,

    #[error("wallet credentials missing")]
    CredentialsMissing,
}

/// Terminal errors the orchestrator surfaces to the game layer (spec §7
/// "Propagation policy" — everything else is caught, classified, and
/// emitted as an `AnchorEvent` instead).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("genesis anchor permanently failed: {0}")]
    GenesisFailed(String),

    #[error("final anchor permanently failed: {0}")]
    FinalFailed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Vrf(#[from] VrfError),
}
