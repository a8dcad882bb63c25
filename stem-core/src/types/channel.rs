//! Channel and message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Identity;
use crate::constants::CHANNEL_PARTICIPANTS;

/// A message in a channel's append-only log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message
    pub sender: Identity,
    /// UTF-8 text
    pub content: String,
    /// Time the program recorded the message (second granularity)
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a new message.
    pub fn new(sender: Identity, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender,
            content: content.into(),
            timestamp,
        }
    }
}

/// A two-party channel decoded from its account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// The two participants, in the order the program stored them
    pub participants: [Identity; CHANNEL_PARTICIPANTS],
    /// Message counter maintained by the program
    pub message_count: u32,
    /// Messages in chain order
    pub messages: Vec<Message>,
}

impl Channel {
    /// Creates an empty channel between two participants.
    pub fn new(a: Identity, b: Identity) -> Self {
        Self {
            participants: [a, b],
            message_count: 0,
            messages: Vec::new(),
        }
    }

    /// Returns true if the identity is one of the participants.
    pub fn has_participant(&self, identity: &Identity) -> bool {
        self.participants.contains(identity)
    }

    /// Returns the participant that is not `identity`.
    pub fn counterpart(&self, identity: &Identity) -> Option<Identity> {
        match self.participants {
            [a, b] if &a == identity => Some(b),
            [a, b] if &b == identity => Some(a),
            _ => None,
        }
    }
}
