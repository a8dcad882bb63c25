//! Program address and channel identifier derivation.
//!
//! ## Derivation Flow
//!
//! ```text
//! descriptor(id)   = PDA(program, ["wallet_descriptor", id])
//!
//! channel_id(a, b) = SHA-256(min(a, b) || max(a, b))      (bytewise order)
//! channel(a, b)    = PDA(program, ["privite_chat", channel_id(a, b)])
//! ```
//!
//! Ordering the pair before hashing is what makes the identifier symmetric.
//! A pair of equal identities has no channel and is rejected.

use solana_program::pubkey::Pubkey;
use tracing::trace;

use stem_core::constants::{CHANNEL_SEED, DESCRIPTOR_SEED, PROGRAM_ID};
use stem_core::error::{Result, StemError};
use stem_core::types::{ChannelId, Identity};

use crate::hash::sha256_concat;

/// An address derived from seeds under a program, with its bump.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramAddress {
    /// The off-curve address
    pub address: Pubkey,
    /// Bump seed that moved the address off the curve
    pub bump: u8,
}

/// Runs the ledger's program-address search.
fn find_program_address(program_id: &Pubkey, seeds: &[&[u8]]) -> Result<ProgramAddress> {
    Pubkey::try_find_program_address(seeds, program_id)
        .map(|(address, bump)| ProgramAddress { address, bump })
        .ok_or_else(|| {
            StemError::AddressDerivationFailed(format!(
                "no viable bump for {} seeds under {}",
                seeds.len(),
                program_id
            ))
        })
}

/// Computes the symmetric identifier of the channel between `a` and `b`.
///
/// # Errors
/// Returns [`StemError::SelfReference`] if `a == b`.
pub fn channel_identifier(a: &Identity, b: &Identity) -> Result<ChannelId> {
    let (a, b) = (a.as_ref(), b.as_ref());
    let (low, high) = match a.cmp(b) {
        std::cmp::Ordering::Less => (a, b),
        std::cmp::Ordering::Greater => (b, a),
        std::cmp::Ordering::Equal => return Err(StemError::SelfReference),
    };
    Ok(sha256_concat(&[low, high]))
}

/// Address derivation bound to one program id.
///
/// Use [`ProgramAddresses::default`] for the deployed program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramAddresses {
    program_id: Pubkey,
}

impl Default for ProgramAddresses {
    fn default() -> Self {
        Self::new(PROGRAM_ID)
    }
}

impl ProgramAddresses {
    /// Binds derivation to `program_id`.
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    /// The program id addresses are derived under.
    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Derives the descriptor account of `identity`.
    pub fn descriptor(&self, identity: &Identity) -> Result<ProgramAddress> {
        let derived = find_program_address(&self.program_id, &[DESCRIPTOR_SEED, identity.as_ref()])?;
        trace!(%identity, address = %derived.address, "derived descriptor address");
        Ok(derived)
    }

    /// Derives the channel account shared by `a` and `b`.
    pub fn channel(&self, a: &Identity, b: &Identity) -> Result<ProgramAddress> {
        let id = channel_identifier(a, b)?;
        self.channel_for_id(&id)
    }

    /// Derives the channel account for an already computed identifier.
    pub fn channel_for_id(&self, id: &ChannelId) -> Result<ProgramAddress> {
        find_program_address(&self.program_id, &[CHANNEL_SEED, id.as_slice()])
    }
}

/// Descriptor address of `identity` under the deployed program.
pub fn descriptor_address(identity: &Identity) -> Result<Pubkey> {
    ProgramAddresses::default().descriptor(identity).map(|d| d.address)
}

/// Channel address for the pair under the deployed program.
pub fn channel_address(a: &Identity, b: &Identity) -> Result<Pubkey> {
    ProgramAddresses::default().channel(a, b).map(|d| d.address)
}
