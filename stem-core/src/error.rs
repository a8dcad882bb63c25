//! Error types for Stem.
//!
//! This module provides the error hierarchy using `thiserror`. Errors fall
//! into three families that callers handle differently:
//!
//! - **Precondition**: the local view forbids the operation (not loaded, not
//!   registered, wrong peer status, self-reference). Never retried internally.
//! - **Decode**: an account buffer is truncated or malformed. Cached state for
//!   that account is left as it was.
//! - **Transport**: raised by the ledger collaborator and passed through.

use solana_program::pubkey::Pubkey;
use thiserror::Error;

use crate::types::RelationshipStatus;

/// Result type alias using `StemError`.
pub type Result<T> = std::result::Result<T, StemError>;

/// Main error type for all Stem operations.
#[derive(Debug, Error)]
pub enum StemError {
    // ═══════════════════════════════════════════════════════════════════════════
    // PRECONDITION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The engine has not completed its initial load.
    #[error("Account is not loaded")]
    NotLoaded,

    /// The owner has no descriptor account yet.
    #[error("Stem account is not registered")]
    NotRegistered,

    /// The owner already has a descriptor account.
    #[error("Stem account is already registered")]
    AlreadyRegistered,

    /// The operation targets the owner's own identity.
    #[error("Operation cannot target your own identity")]
    SelfReference,

    /// A relationship with the peer already exists.
    #[error("Peer {peer} is already known with status {status}")]
    PeerAlreadyKnown {
        /// The peer identity
        peer: Pubkey,
        /// Its current status
        status: RelationshipStatus,
    },

    /// The peer is not in the status the operation requires.
    #[error("Peer {peer} must be {expected}, found {}", describe_status(.actual))]
    UnexpectedPeerStatus {
        /// The peer identity
        peer: Pubkey,
        /// Status the operation requires
        expected: RelationshipStatus,
        /// Status currently tracked (`None` if the peer is unknown)
        actual: Option<RelationshipStatus>,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // DECODE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Buffer is shorter than the fixed part of the layout.
    #[error("Account data too short: expected at least {expected} bytes, got {actual}")]
    AccountTooShort {
        /// Minimum length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Record bytes could not be decoded.
    #[error("Invalid {record} data: {reason}")]
    InvalidAccountData {
        /// Record being decoded
        record: &'static str,
        /// Decoder message
        reason: String,
    },

    /// Peer status byte outside 0..=3.
    #[error("Invalid relationship status code: {0}")]
    InvalidStatusCode(u8),

    // ═══════════════════════════════════════════════════════════════════════════
    // DERIVATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// No off-curve address exists for the seeds.
    #[error("Address derivation failed: {0}")]
    AddressDerivationFailed(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSPORT ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ledger RPC call failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Account subscription ended.
    #[error("Subscription closed for account {0}")]
    SubscriptionClosed(Pubkey),

    /// Ledger refused the submitted request.
    #[error("Request rejected by ledger: {0}")]
    SubmissionRejected(String),

    /// Wallet could not sign the request.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Identity string is not a valid base58 public key.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn describe_status(status: &Option<RelationshipStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "no relationship".into(),
    }
}

impl StemError {
    /// Returns true if the local view forbade the operation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            StemError::NotLoaded
                | StemError::NotRegistered
                | StemError::AlreadyRegistered
                | StemError::SelfReference
                | StemError::PeerAlreadyKnown { .. }
                | StemError::UnexpectedPeerStatus { .. }
        )
    }

    /// Returns true if account bytes were malformed.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            StemError::AccountTooShort { .. }
                | StemError::InvalidAccountData { .. }
                | StemError::InvalidStatusCode(_)
        )
    }

    /// Returns true if the error came from the ledger collaborator.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            StemError::Transport(_)
                | StemError::SubscriptionClosed(_)
                | StemError::SubmissionRejected(_)
                | StemError::SigningFailed(_)
        )
    }

    /// Returns true if this error is recoverable (can retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StemError::Transport(_) | StemError::SubscriptionClosed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StemError::AccountTooShort {
            expected: 8,
            actual: 3,
        };
        assert!(err.to_string().contains('8'));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_unexpected_status_display() {
        let peer = Pubkey::new_from_array([7u8; 32]);
        let err = StemError::UnexpectedPeerStatus {
            peer,
            expected: RelationshipStatus::Requested,
            actual: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("Requested"));
        assert!(msg.contains("no relationship"));

        let err = StemError::UnexpectedPeerStatus {
            peer,
            expected: RelationshipStatus::Requested,
            actual: Some(RelationshipStatus::Invited),
        };
        assert!(err.to_string().contains("Invited"));
    }

    #[test]
    fn test_error_classification() {
        assert!(StemError::NotLoaded.is_precondition());
        assert!(StemError::SelfReference.is_precondition());
        assert!(!StemError::NotLoaded.is_decode_error());

        assert!(StemError::InvalidStatusCode(9).is_decode_error());
        assert!(!StemError::InvalidStatusCode(9).is_precondition());

        assert!(StemError::Transport("timeout".into()).is_transport_error());
        assert!(StemError::Transport("timeout".into()).is_recoverable());
        assert!(!StemError::SubmissionRejected("bad".into()).is_recoverable());
    }
}
