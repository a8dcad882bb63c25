//! Local view of the owner's registration and peer relationships.

use std::collections::BTreeMap;

use serde::Serialize;
use solana_program::pubkey::Pubkey;

use stem_core::error::{Result, StemError};
use stem_core::types::{Channel, ChannelId, Identity, Peer, RelationshipStatus};

/// Reference to the channel account shared with an accepted peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelHandle {
    /// Channel account address
    pub address: Pubkey,
    /// Symmetric channel identifier
    #[serde(with = "hex")]
    pub identifier: ChannelId,
    /// Last decoded content, `None` until the account has been read
    pub channel: Option<Channel>,
}

impl ChannelHandle {
    /// Creates a handle whose content has not been read yet.
    pub fn pending(address: Pubkey, identifier: ChannelId) -> Self {
        Self {
            address,
            identifier,
            channel: None,
        }
    }
}

/// One tracked counterparty.
///
/// `channel` is only ever set while `status` is [`RelationshipStatus::Accepted`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    /// The counterparty
    pub identity: Identity,
    /// Relationship status from the owner's descriptor
    pub status: RelationshipStatus,
    /// Attached channel, accepted peers only
    pub channel: Option<ChannelHandle>,
}

impl PeerRecord {
    /// Creates a record with no channel attached.
    pub fn new(identity: Identity, status: RelationshipStatus) -> Self {
        Self {
            identity,
            status,
            channel: None,
        }
    }

    /// Returns the `(identity, status)` pair.
    pub fn summary(&self) -> Peer {
        Peer::new(self.identity, self.status)
    }
}

/// Snapshot of everything the engine knows.
///
/// Replaced as a whole by each reconciliation; readers get clones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalState {
    /// Initial load completed
    pub is_loaded: bool,
    /// Owner's descriptor account exists
    pub is_registered: bool,
    /// Tracked peers, ordered by identity bytes
    pub peers: BTreeMap<Identity, PeerRecord>,
}

impl LocalState {
    /// Creates the unloaded state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with [`StemError::NotLoaded`] before the initial load.
    pub fn ensure_loaded(&self) -> Result<()> {
        if !self.is_loaded {
            return Err(StemError::NotLoaded);
        }
        Ok(())
    }

    /// Fails unless loaded and registered.
    pub fn ensure_registered(&self) -> Result<()> {
        self.ensure_loaded()?;
        if !self.is_registered {
            return Err(StemError::NotRegistered);
        }
        Ok(())
    }

    /// Record for `identity`, if tracked.
    pub fn peer(&self, identity: &Identity) -> Option<&PeerRecord> {
        self.peers.get(identity)
    }

    /// Status of `identity`, if tracked.
    pub fn status_of(&self, identity: &Identity) -> Option<RelationshipStatus> {
        self.peers.get(identity).map(|record| record.status)
    }

    /// Every tracked `(identity, status)` pair, ordered by identity.
    pub fn summaries(&self) -> Vec<Peer> {
        self.peers.values().map(PeerRecord::summary).collect()
    }

    /// Peer records ordered by identity.
    pub fn records(&self) -> Vec<PeerRecord> {
        self.peers.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preconditions() {
        let mut state = LocalState::new();
        assert!(matches!(state.ensure_loaded(), Err(StemError::NotLoaded)));
        assert!(matches!(state.ensure_registered(), Err(StemError::NotLoaded)));

        state.is_loaded = true;
        assert!(state.ensure_loaded().is_ok());
        assert!(matches!(state.ensure_registered(), Err(StemError::NotRegistered)));

        state.is_registered = true;
        assert!(state.ensure_registered().is_ok());
    }

    #[test]
    fn test_summaries_ordered_by_identity() {
        let mut state = LocalState::new();
        let high = Pubkey::new_from_array([9u8; 32]);
        let low = Pubkey::new_from_array([1u8; 32]);
        state.peers.insert(high, PeerRecord::new(high, RelationshipStatus::Invited));
        state.peers.insert(low, PeerRecord::new(low, RelationshipStatus::Requested));

        let summaries = state.summaries();
        assert_eq!(summaries[0].identity, low);
        assert_eq!(summaries[1].identity, high);
        assert_eq!(state.status_of(&high), Some(RelationshipStatus::Invited));
        assert_eq!(state.status_of(&Pubkey::new_unique()), None);
    }
}
