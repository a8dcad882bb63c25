//! Operation request builders.
//!
//! Every builder validates against a [`LocalState`] snapshot before any
//! bytes are assembled, so a failed precondition never yields a partial
//! request.
//!
//! | Operation | Requires | Payload after opcode |
//! |-----------|----------|----------------------|
//! | register | loaded, not registered | none |
//! | invite | registered, peer untracked | none |
//! | accept | registered, peer Requested | channel id |
//! | reject | registered, peer Requested | none |
//! | send-message | registered, peer Accepted | channel id, u32 LE byte length, UTF-8 |

use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::system_program;
use tracing::debug;

use stem_core::codec::encode_content;
use stem_core::error::{Result, StemError};
use stem_core::types::{Identity, OperationKind, OperationRequest, RelationshipStatus};
use stem_crypto::{channel_identifier, opcode_for, ProgramAddresses};

use crate::state::LocalState;

/// Builds requests on behalf of one owner.
#[derive(Clone, Copy, Debug)]
pub struct OperationBuilder {
    owner: Identity,
    addresses: ProgramAddresses,
}

impl OperationBuilder {
    /// Creates a builder for `owner` under the given program.
    pub fn new(owner: Identity, addresses: ProgramAddresses) -> Self {
        Self { owner, addresses }
    }

    /// The identity requests are built for.
    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    fn request(&self, kind: OperationKind, args: &[u8], accounts: Vec<AccountMeta>) -> OperationRequest {
        let mut data = Vec::with_capacity(8 + args.len());
        data.extend_from_slice(&opcode_for(kind));
        data.extend_from_slice(args);
        debug!(%kind, accounts = accounts.len(), bytes = data.len(), "Built request");
        OperationRequest::new(
            kind,
            Instruction::new_with_bytes(*self.addresses.program_id(), &data, accounts),
        )
    }

    fn reject_self(&self, peer: &Identity) -> Result<()> {
        if peer == &self.owner {
            return Err(StemError::SelfReference);
        }
        Ok(())
    }

    fn expect_status(
        state: &LocalState,
        peer: &Identity,
        expected: RelationshipStatus,
    ) -> Result<()> {
        let actual = state.status_of(peer);
        if actual != Some(expected) {
            return Err(StemError::UnexpectedPeerStatus {
                peer: *peer,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// `self (S), peer, own descriptor (W), peer descriptor (W)`
    fn pair_accounts(&self, peer: &Identity) -> Result<Vec<AccountMeta>> {
        Ok(vec![
            AccountMeta::new_readonly(self.owner, true),
            AccountMeta::new_readonly(*peer, false),
            AccountMeta::new(self.addresses.descriptor(&self.owner)?.address, false),
            AccountMeta::new(self.addresses.descriptor(peer)?.address, false),
        ])
    }

    /// Creates the owner's descriptor.
    pub fn register(&self, state: &LocalState) -> Result<OperationRequest> {
        state.ensure_loaded()?;
        if state.is_registered {
            return Err(StemError::AlreadyRegistered);
        }
        let accounts = vec![
            AccountMeta::new(self.addresses.descriptor(&self.owner)?.address, false),
            AccountMeta::new_readonly(self.owner, true),
            AccountMeta::new_readonly(system_program::ID, false),
        ];
        Ok(self.request(OperationKind::Register, &[], accounts))
    }

    /// Invites a peer the owner has no relationship with.
    pub fn invite(&self, state: &LocalState, peer: &Identity) -> Result<OperationRequest> {
        self.reject_self(peer)?;
        state.ensure_registered()?;
        if let Some(status) = state.status_of(peer) {
            return Err(StemError::PeerAlreadyKnown { peer: *peer, status });
        }
        let mut accounts = self.pair_accounts(peer)?;
        accounts.push(AccountMeta::new_readonly(system_program::ID, false));
        Ok(self.request(OperationKind::Invite, &[], accounts))
    }

    /// Accepts a pending invitation and creates the channel.
    pub fn accept(&self, state: &LocalState, peer: &Identity) -> Result<OperationRequest> {
        self.reject_self(peer)?;
        state.ensure_registered()?;
        Self::expect_status(state, peer, RelationshipStatus::Requested)?;

        let id = channel_identifier(&self.owner, peer)?;
        let mut accounts = self.pair_accounts(peer)?;
        accounts.push(AccountMeta::new(self.addresses.channel_for_id(&id)?.address, false));
        accounts.push(AccountMeta::new_readonly(system_program::ID, false));
        Ok(self.request(OperationKind::Accept, &id, accounts))
    }

    /// Declines a pending invitation.
    pub fn reject(&self, state: &LocalState, peer: &Identity) -> Result<OperationRequest> {
        self.reject_self(peer)?;
        state.ensure_registered()?;
        Self::expect_status(state, peer, RelationshipStatus::Requested)?;
        Ok(self.request(OperationKind::Reject, &[], self.pair_accounts(peer)?))
    }

    /// Appends `content` to the channel shared with an accepted peer.
    pub fn send_message(
        &self,
        state: &LocalState,
        peer: &Identity,
        content: &str,
    ) -> Result<OperationRequest> {
        self.reject_self(peer)?;
        state.ensure_registered()?;
        Self::expect_status(state, peer, RelationshipStatus::Accepted)?;

        let id = channel_identifier(&self.owner, peer)?;
        let mut args = id.to_vec();
        args.extend_from_slice(&encode_content(content)?);
        let accounts = vec![
            AccountMeta::new_readonly(self.owner, true),
            AccountMeta::new(self.addresses.channel_for_id(&id)?.address, false),
            AccountMeta::new_readonly(system_program::ID, false),
        ];
        Ok(self.request(OperationKind::SendMessage, &args, accounts))
    }
}
