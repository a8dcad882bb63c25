//! Raw account snapshots delivered by the ledger collaborator.

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

/// Immutable snapshot of an account at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Balance in lamports
    pub lamports: u64,
    /// Program that owns the account
    pub owner: Pubkey,
    /// Raw data, including the 8-byte type tag
    #[serde(with = "hex")]
    pub data: Vec<u8>,
}

impl AccountInfo {
    /// Creates a new snapshot.
    pub fn new(lamports: u64, owner: Pubkey, data: Vec<u8>) -> Self {
        Self {
            lamports,
            owner,
            data,
        }
    }
}

/// Push notification payload: `None` when the account no longer exists.
pub type AccountUpdate = Option<AccountInfo>;
