//! Error types for the encryption core

use thiserror::Error;

/// Errors from identity, handshake, ratchet and codec operations.
///
/// Every operation that returns one of these leaves the `Device` or
/// `Session` it was called on exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signed prekey signature does not verify against the bundle identity
    #[error("signed prekey signature verification failed")]
    InvalidSignature,

    /// Persisted device or session state could not be restored
    #[error("corrupt state: {reason}")]
    CorruptState {
        /// What was wrong with the state
        reason: String,
    },

    /// AEAD authentication failed (tamper, wrong key, truncated ciphertext)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Message key was already consumed or was never cached
    #[error("duplicate or unknown message at counter {counter}")]
    DuplicateOrUnknownMessage {
        /// Counter carried in the rejected header
        counter: u32,
    },

    /// Counter gap exceeds the number of keys the session may skip
    #[error("too many skipped messages: gap of {requested}, limit {limit}")]
    TooManySkippedMessages {
        /// Number of message keys the header asked us to skip
        requested: u32,
        /// Configured per-message skip limit
        limit: u32,
    },

    /// Malformed local call or caller-supplied input
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What the caller got wrong
        reason: String,
    },

    /// Handshake referenced a prekey this device does not hold
    #[error("unknown {kind} prekey: {id}")]
    UnknownPrekey {
        /// Prekey family ("signed" or "one-time")
        kind: &'static str,
        /// Identifier carried by the handshake
        id: u32,
    },

    /// Entropy source failed to produce random bytes
    #[error("entropy source failed: {reason}")]
    Entropy {
        /// Error reported by the entropy source
        reason: String,
    },
}

impl CryptoError {
    /// Returns true if this error is fatal for the affected state.
    ///
    /// Fatal errors mean the caller must re-provision the device or run a
    /// fresh handshake. Retrying the same input can never succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidSignature => true,
            Self::CorruptState { .. } => true,
            Self::TooManySkippedMessages { .. } => true,

            Self::DecryptionFailed { .. } => false,
            Self::DuplicateOrUnknownMessage { .. } => false,
            Self::InvalidRequest { .. } => false,
            Self::UnknownPrekey { .. } => false,
            Self::Entropy { .. } => false,
        }
    }

    /// Returns true if the same call may succeed once its input is fixed.
    ///
    /// Decryption failures are retryable once the correct envelope arrives;
    /// entropy failures once the OS RNG recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DecryptionFailed { .. } | Self::Entropy { .. })
    }

    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest { reason: reason.into() }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptState { reason: reason.into() }
    }
}
