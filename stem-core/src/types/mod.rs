//! Domain types for Stem.
//!
//! - [`RelationshipStatus`], [`Peer`], [`Descriptor`]: a party's relationship list
//! - [`Message`], [`Channel`]: the two-party message log
//! - [`AccountInfo`]: raw account snapshot delivered by the ledger
//! - [`OperationRequest`], [`SignedRequest`]: operations handed to the ledger

mod account;
mod channel;
mod peer;
mod request;

pub use account::*;
pub use channel::*;
pub use peer::*;
pub use request::*;

use std::str::FromStr;

use solana_program::pubkey::Pubkey;

use crate::constants::{CHANNEL_ID_SIZE, OPCODE_SIZE};
use crate::error::{Result, StemError};

/// A party's 32-byte public identity.
pub type Identity = Pubkey;

/// Symmetric identifier of the channel between two identities.
pub type ChannelId = [u8; CHANNEL_ID_SIZE];

/// 8-byte discriminator prefixing every operation payload.
pub type Opcode = [u8; OPCODE_SIZE];

/// Parses a base58 identity string.
pub fn parse_identity(value: &str) -> Result<Identity> {
    Pubkey::from_str(value.trim()).map_err(|e| StemError::InvalidIdentity(format!("{value}: {e}")))
}
