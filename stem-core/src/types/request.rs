//! Operation requests handed to the ledger for signing and submission.

use std::fmt;

use serde::{Deserialize, Serialize};
use solana_program::instruction::Instruction;

use super::Identity;
use crate::constants::{OP_ACCEPT, OP_INVITE, OP_REGISTER, OP_REJECT, OP_SEND_MESSAGE};

/// The five operations exposed by the program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create the caller's descriptor.
    Register,
    /// Open a relationship with a peer.
    Invite,
    /// Accept a pending invitation and create the channel.
    Accept,
    /// Decline a pending invitation.
    Reject,
    /// Append a message to an accepted channel.
    SendMessage,
}

impl OperationKind {
    /// All operations, in program order.
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Register,
        OperationKind::Invite,
        OperationKind::Accept,
        OperationKind::Reject,
        OperationKind::SendMessage,
    ];

    /// Name hashed into the operation's opcode.
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Register => OP_REGISTER,
            OperationKind::Invite => OP_INVITE,
            OperationKind::Accept => OP_ACCEPT,
            OperationKind::Reject => OP_REJECT,
            OperationKind::SendMessage => OP_SEND_MESSAGE,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An unsigned, fully validated operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationRequest {
    /// Which operation this invokes
    pub kind: OperationKind,
    /// Program id, ordered account references and opcode-prefixed payload
    pub instruction: Instruction,
}

impl OperationRequest {
    /// Creates a new request.
    pub fn new(kind: OperationKind, instruction: Instruction) -> Self {
        Self { kind, instruction }
    }

    /// Identities that must sign the request.
    pub fn signers(&self) -> Vec<Identity> {
        self.instruction
            .accounts
            .iter()
            .filter(|meta| meta.is_signer)
            .map(|meta| meta.pubkey)
            .collect()
    }

    /// Bytes a signer commits to: program id, account flags, payload.
    pub fn message_bytes(&self) -> Vec<u8> {
        let ix = &self.instruction;
        let mut bytes = Vec::with_capacity(32 + ix.accounts.len() * 34 + ix.data.len());
        bytes.extend_from_slice(ix.program_id.as_ref());
        for meta in &ix.accounts {
            bytes.extend_from_slice(meta.pubkey.as_ref());
            bytes.push(meta.is_signer as u8);
            bytes.push(meta.is_writable as u8);
        }
        bytes.extend_from_slice(&ix.data);
        bytes
    }
}

/// A 64-byte transaction signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxSignature(pub [u8; 64]);

impl TxSignature {
    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxSignature({}..)", &hex::encode(&self.0[..8]))
    }
}

/// A request together with the signature produced by the wallet.
#[derive(Clone, Debug)]
pub struct SignedRequest {
    /// The request that was signed
    pub request: OperationRequest,
    /// Identity that produced the signature
    pub signer: Identity,
    /// Signature over [`OperationRequest::message_bytes`]
    pub signature: TxSignature,
}
