//! Relationship types.
//!
//! ```text
//! inviter:              invitee:
//!          Accepted                Accepted
//!        /                       /
//! Invited                Requested
//!        \                       \
//!          Rejected                Rejected
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Identity;
use crate::error::{Result, StemError};

/// Status of a relationship as recorded in a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    /// This party sent the invitation.
    Invited,
    /// This party received the invitation.
    Requested,
    /// Both parties agreed; a channel exists.
    Accepted,
    /// The invitee declined.
    Rejected,
}

impl RelationshipStatus {
    /// Returns the on-chain status code.
    pub fn code(self) -> u8 {
        match self {
            RelationshipStatus::Invited => 0,
            RelationshipStatus::Requested => 1,
            RelationshipStatus::Accepted => 2,
            RelationshipStatus::Rejected => 3,
        }
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(self, next: RelationshipStatus) -> bool {
        matches!(
            (self, next),
            (RelationshipStatus::Invited, RelationshipStatus::Accepted)
                | (RelationshipStatus::Invited, RelationshipStatus::Rejected)
                | (RelationshipStatus::Requested, RelationshipStatus::Accepted)
                | (RelationshipStatus::Requested, RelationshipStatus::Rejected)
        )
    }
}

impl TryFrom<u8> for RelationshipStatus {
    type Error = StemError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(RelationshipStatus::Invited),
            1 => Ok(RelationshipStatus::Requested),
            2 => Ok(RelationshipStatus::Accepted),
            3 => Ok(RelationshipStatus::Rejected),
            other => Err(StemError::InvalidStatusCode(other)),
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationshipStatus::Invited => "Invited",
            RelationshipStatus::Requested => "Requested",
            RelationshipStatus::Accepted => "Accepted",
            RelationshipStatus::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// One entry of a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Counterparty identity
    pub identity: Identity,
    /// Relationship status from the descriptor owner's side
    pub status: RelationshipStatus,
}

impl Peer {
    /// Creates a new peer entry.
    pub fn new(identity: Identity, status: RelationshipStatus) -> Self {
        Self { identity, status }
    }
}

/// A party's authoritative relationship list, decoded from its descriptor account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Peers in on-chain order
    pub peers: Vec<Peer>,
}

impl Descriptor {
    /// Creates a descriptor from a list of peers.
    pub fn new(peers: Vec<Peer>) -> Self {
        Self { peers }
    }

    /// Looks up the entry for an identity.
    pub fn get(&self, identity: &Identity) -> Option<&Peer> {
        self.peers.iter().find(|peer| &peer.identity == identity)
    }

    /// Returns true if the identity has an entry.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.get(identity).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
