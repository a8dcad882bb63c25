//! Descriptor reconciliation.
//!
//! [`reconcile`] is a pure function from the current snapshot plus the latest
//! descriptor account to the next snapshot. The caller commits the result only
//! when it returns `Ok`, so a malformed descriptor never touches cached state.
//!
//! ## Per-peer rules
//!
//! ```text
//! untracked                       -> track as decoded             (list changed)
//! decoded Accepted, no channel    -> Accepted + attach channel    (list changed, open channel)
//! decoded status != tracked       -> decoded status, no channel   (list changed)
//! otherwise                       -> unchanged
//! tracked but missing from list   -> dropped                      (list changed)
//! ```
//!
//! A missing or empty descriptor account means "not registered" and drops
//! every tracked peer. The descriptor always wins; a status change the
//! program would never make (e.g. Accepted back to Invited) is logged and
//! applied anyway.

use std::collections::BTreeMap;

use solana_program::pubkey::Pubkey;
use tracing::{debug, warn};

use stem_core::codec::decode_descriptor;
use stem_core::error::Result;
use stem_core::types::{AccountInfo, Identity, RelationshipStatus};
use stem_crypto::{channel_identifier, ProgramAddresses};

use crate::state::{ChannelHandle, LocalState, PeerRecord};

/// A channel account newly attached by a reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelOpening {
    /// Peer the channel is shared with
    pub peer: Identity,
    /// Channel account address
    pub address: Pubkey,
}

/// Outcome of one reconciliation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    /// Snapshot to commit
    pub state: LocalState,
    /// `is_registered` flipped
    pub status_updated: bool,
    /// Peer mapping changed
    pub list_updated: bool,
    /// Channels to fetch (and follow) now
    pub channels_to_open: Vec<ChannelOpening>,
}

/// Merges the owner's descriptor account into `current`.
///
/// # Errors
/// Decode errors from the descriptor, and derivation errors for a channel
/// whose peer is the owner itself.
pub fn reconcile(
    current: &LocalState,
    owner: &Identity,
    addresses: &ProgramAddresses,
    descriptor: Option<&AccountInfo>,
) -> Result<Reconciliation> {
    let registered = descriptor.is_some_and(|account| !account.data.is_empty());
    let status_updated = current.is_registered != registered;

    let mut peers = BTreeMap::new();
    let mut list_updated = false;
    let mut channels_to_open = Vec::new();

    if let Some(account) = descriptor.filter(|_| registered) {
        let decoded = decode_descriptor(&account.data)?;

        for entry in decoded.peers {
            let identity = entry.identity;
            let tracked = peers.get(&identity).or_else(|| current.peers.get(&identity));

            let record = match tracked {
                None => {
                    list_updated = true;
                    let mut record = PeerRecord::new(identity, entry.status);
                    if entry.status == RelationshipStatus::Accepted {
                        record.channel = Some(attach(owner, &identity, addresses, &mut channels_to_open)?);
                    }
                    debug!(peer = %identity, status = %entry.status, "New peer");
                    record
                }
                Some(existing)
                    if entry.status == RelationshipStatus::Accepted && existing.channel.is_none() =>
                {
                    list_updated = true;
                    check_transition(&identity, existing.status, RelationshipStatus::Accepted);
                    debug!(peer = %identity, "Peer accepted, attaching channel");
                    PeerRecord {
                        identity,
                        status: RelationshipStatus::Accepted,
                        channel: Some(attach(owner, &identity, addresses, &mut channels_to_open)?),
                    }
                }
                Some(existing) if existing.status != entry.status => {
                    list_updated = true;
                    check_transition(&identity, existing.status, entry.status);
                    debug!(peer = %identity, from = %existing.status, to = %entry.status, "Peer status changed");
                    PeerRecord::new(identity, entry.status)
                }
                Some(existing) => existing.clone(),
            };
            peers.insert(identity, record);
        }
    }

    let removed = current.peers.keys().filter(|id| !peers.contains_key(*id)).count();
    if removed > 0 {
        debug!(removed, "Dropping peers missing from descriptor");
        list_updated = true;
    }

    Ok(Reconciliation {
        state: LocalState {
            is_loaded: true,
            is_registered: registered,
            peers,
        },
        status_updated,
        list_updated,
        channels_to_open,
    })
}

fn check_transition(peer: &Identity, from: RelationshipStatus, to: RelationshipStatus) {
    if from != to && !from.can_transition_to(to) {
        warn!(peer = %peer, %from, %to, "Descriptor shows an irregular status transition");
    }
}

fn attach(
    owner: &Identity,
    peer: &Identity,
    addresses: &ProgramAddresses,
    openings: &mut Vec<ChannelOpening>,
) -> Result<ChannelHandle> {
    let identifier = channel_identifier(owner, peer)?;
    let address = addresses.channel_for_id(&identifier)?.address;
    openings.push(ChannelOpening {
        peer: *peer,
        address,
    });
    Ok(ChannelHandle::pending(address, identifier))
}
