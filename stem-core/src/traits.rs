//! Collaborator interfaces for Stem.
//!
//! The engine never talks to the network itself. It consumes a
//! [`LedgerClient`] for account reads, push notifications and submission,
//! and a [`RequestSigner`] for the wallet capability.

use async_trait::async_trait;
use solana_program::pubkey::Pubkey;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{AccountInfo, AccountUpdate, Identity, OperationRequest, SignedRequest, TxSignature};

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Push notifications for one account.
///
/// Updates for a single account arrive in order. Dropping the subscription
/// tears it down.
#[derive(Debug)]
pub struct AccountSubscription {
    address: Pubkey,
    receiver: mpsc::UnboundedReceiver<AccountUpdate>,
}

impl AccountSubscription {
    /// Wraps the receiving end of an update channel.
    pub fn new(address: Pubkey, receiver: mpsc::UnboundedReceiver<AccountUpdate>) -> Self {
        Self { address, receiver }
    }

    /// The subscribed account.
    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    /// Waits for the next update. `None` once the ledger closed the stream.
    pub async fn next(&mut self) -> Option<AccountUpdate> {
        self.receiver.recv().await
    }
}

/// Interface to the ledger RPC layer.
///
/// Implementations might use:
/// - An in-memory ledger (for testing/development)
/// - JSON-RPC + websocket subscriptions (for production)
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// One-shot read. `None` if the account does not exist.
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<AccountInfo>>;

    /// Subscribes to changes of an account.
    async fn subscribe_account(&self, address: &Pubkey) -> Result<AccountSubscription>;

    /// Submits a signed request and returns its signature once accepted.
    async fn submit(&self, request: SignedRequest) -> Result<TxSignature>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Narrow wallet capability: an identity that can sign requests.
pub trait RequestSigner: Send + Sync {
    /// Identity the signatures belong to.
    fn public_identity(&self) -> Identity;

    /// Signs [`OperationRequest::message_bytes`].
    fn sign(&self, request: &OperationRequest) -> Result<TxSignature>;
}
