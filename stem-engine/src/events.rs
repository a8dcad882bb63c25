//! Change events emitted by a [`Stem`](crate::Stem) instance.

use serde::Serialize;

use stem_core::types::{Channel, Identity};

use crate::state::PeerRecord;

/// A completed state transition.
///
/// Events are notifications only; by the time one is received the state it
/// describes is already committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StemEvent {
    /// The tracked peer mapping changed. Carries every record, ordered by identity.
    PeersUpdated {
        /// Full current mapping
        peers: Vec<PeerRecord>,
    },
    /// The owner's descriptor account appeared or disappeared.
    RegistrationChanged {
        /// New registration flag
        registered: bool,
    },
    /// A channel account was read and attached to its peer.
    ChannelUpdated {
        /// Accepted peer the channel is shared with
        peer: Identity,
        /// Decoded content
        channel: Channel,
    },
}

impl StemEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            StemEvent::PeersUpdated { .. } => "peers_updated",
            StemEvent::RegistrationChanged { .. } => "registration_changed",
            StemEvent::ChannelUpdated { .. } => "channel_updated",
        }
    }
}
