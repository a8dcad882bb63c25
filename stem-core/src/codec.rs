//! Binary account codec.
//!
//! Every account buffer starts with an 8-byte type tag written by the program,
//! followed by a Borsh-encoded record:
//!
//! ```text
//! Peer       = identity (32) || status (u8)
//! Descriptor = tag (8) || count (u32 LE) || Peer*
//! Message    = sender (32) || len (u32 LE) || utf8 || timestamp (8, low 4 = u32 LE secs)
//! Channel    = tag (8) || participant (32) || participant (32) || message_count (u32 LE)
//!              || count (u32 LE) || Message*
//! ```
//!
//! Accounts are allocated with slack, so decoding stops at the end of the
//! record and ignores trailing bytes. Truncation, unknown status codes and
//! invalid UTF-8 are errors.

use borsh::{BorshDeserialize, BorshSerialize};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use solana_program::pubkey::Pubkey;

use crate::constants::{
    ACCOUNT_TAG_NAMESPACE, ACCOUNT_TAG_SIZE, CHANNEL_PARTICIPANTS, IDENTITY_SIZE,
    MESSAGE_TIMESTAMP_SIZE,
};
use crate::error::{Result, StemError};
use crate::types::{Channel, Descriptor, Message, Peer, RelationshipStatus};

/// Record name of descriptor accounts.
pub const DESCRIPTOR_RECORD: &str = "Descriptor";

/// Record name of channel accounts.
pub const CHANNEL_RECORD: &str = "Channel";

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(BorshSerialize, BorshDeserialize)]
struct PeerEntry {
    identity: [u8; IDENTITY_SIZE],
    status: u8,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct DescriptorRecord {
    peers: Vec<PeerEntry>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct MessageEntry {
    sender: [u8; IDENTITY_SIZE],
    content: String,
    timestamp: [u8; MESSAGE_TIMESTAMP_SIZE],
}

#[derive(BorshSerialize, BorshDeserialize)]
struct ChannelRecord {
    participants: [[u8; IDENTITY_SIZE]; CHANNEL_PARTICIPANTS],
    message_count: u32,
    messages: Vec<MessageEntry>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT TAG
// ═══════════════════════════════════════════════════════════════════════════════

/// Computes the 8-byte tag the program writes in front of a record.
///
/// `tag = SHA-256("account:" || name)[..8]`
pub fn account_tag(record: &str) -> [u8; ACCOUNT_TAG_SIZE] {
    let digest = Sha256::new()
        .chain_update(ACCOUNT_TAG_NAMESPACE.as_bytes())
        .chain_update(b":")
        .chain_update(record.as_bytes())
        .finalize();
    let mut tag = [0u8; ACCOUNT_TAG_SIZE];
    tag.copy_from_slice(&digest[..ACCOUNT_TAG_SIZE]);
    tag
}

/// Returns the record bytes following the account tag.
pub fn record_body(data: &[u8]) -> Result<&[u8]> {
    if data.len() < ACCOUNT_TAG_SIZE {
        return Err(StemError::AccountTooShort {
            expected: ACCOUNT_TAG_SIZE,
            actual: data.len(),
        });
    }
    Ok(&data[ACCOUNT_TAG_SIZE..])
}

fn decode_record<T: BorshDeserialize>(record: &'static str, data: &[u8]) -> Result<T> {
    let mut body = record_body(data)?;
    T::deserialize(&mut body).map_err(|e| StemError::InvalidAccountData {
        record,
        reason: e.to_string(),
    })
}

fn encode_record<T: BorshSerialize>(record: &'static str, value: &T) -> Result<Vec<u8>> {
    let mut bytes = account_tag(record).to_vec();
    value
        .serialize(&mut bytes)
        .map_err(|e| StemError::InvalidAccountData {
            record,
            reason: e.to_string(),
        })?;
    Ok(bytes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Decodes a descriptor account buffer (tag included).
pub fn decode_descriptor(data: &[u8]) -> Result<Descriptor> {
    let record: DescriptorRecord = decode_record(DESCRIPTOR_RECORD, data)?;
    let peers = record
        .peers
        .into_iter()
        .map(|entry| -> Result<Peer> {
            Ok(Peer::new(
                Pubkey::new_from_array(entry.identity),
                RelationshipStatus::try_from(entry.status)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Descriptor::new(peers))
}

/// Encodes a descriptor account image the way the program writes it.
pub fn encode_descriptor_account(descriptor: &Descriptor) -> Result<Vec<u8>> {
    let record = DescriptorRecord {
        peers: descriptor
            .peers
            .iter()
            .map(|peer| PeerEntry {
                identity: peer.identity.to_bytes(),
                status: peer.status.code(),
            })
            .collect(),
    };
    encode_record(DESCRIPTOR_RECORD, &record)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads a timestamp field: low 4 bytes as u32 LE seconds, upper bytes ignored.
pub fn decode_timestamp(raw: &[u8; MESSAGE_TIMESTAMP_SIZE]) -> DateTime<Utc> {
    let secs = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
}

/// Writes a timestamp field, saturating to the u32 range.
pub fn encode_timestamp(timestamp: &DateTime<Utc>) -> [u8; MESSAGE_TIMESTAMP_SIZE] {
    let secs = timestamp.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
    let mut raw = [0u8; MESSAGE_TIMESTAMP_SIZE];
    raw[..4].copy_from_slice(&secs.to_le_bytes());
    raw
}

/// Decodes a channel account buffer (tag included).
pub fn decode_channel(data: &[u8]) -> Result<Channel> {
    let record: ChannelRecord = decode_record(CHANNEL_RECORD, data)?;
    let [a, b] = record.participants;
    Ok(Channel {
        participants: [Pubkey::new_from_array(a), Pubkey::new_from_array(b)],
        message_count: record.message_count,
        messages: record
            .messages
            .into_iter()
            .map(|entry| Message {
                sender: Pubkey::new_from_array(entry.sender),
                content: entry.content,
                timestamp: decode_timestamp(&entry.timestamp),
            })
            .collect(),
    })
}

/// Encodes a channel account image the way the program writes it.
pub fn encode_channel_account(channel: &Channel) -> Result<Vec<u8>> {
    let [a, b] = channel.participants;
    let record = ChannelRecord {
        participants: [a.to_bytes(), b.to_bytes()],
        message_count: channel.message_count,
        messages: channel
            .messages
            .iter()
            .map(|message| MessageEntry {
                sender: message.sender.to_bytes(),
                content: message.content.clone(),
                timestamp: encode_timestamp(&message.timestamp),
            })
            .collect(),
    };
    encode_record(CHANNEL_RECORD, &record)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYLOAD FRAGMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Encodes message content as `len (u32 LE) || utf8`.
pub fn encode_content(content: &str) -> Result<Vec<u8>> {
    let len = u32::try_from(content.len()).map_err(|_| {
        StemError::ValidationError(format!("message of {} bytes is too long", content.len()))
    })?;
    let mut bytes = Vec::with_capacity(4 + content.len());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(content.as_bytes());
    Ok(bytes)
}

/// Decodes `len (u32 LE) || utf8` from the front of `bytes`.
///
/// Returns the content and the number of bytes consumed.
pub fn decode_content(bytes: &[u8]) -> Result<(String, usize)> {
    let mut cursor = bytes;
    let content = String::deserialize(&mut cursor).map_err(|e| StemError::InvalidAccountData {
        record: "message content",
        reason: e.to_string(),
    })?;
    Ok((content, bytes.len() - cursor.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn identity(seed: u8) -> Pubkey {
        Pubkey::new_from_array([seed; 32])
    }

    fn descriptor_with(n: usize) -> Descriptor {
        let statuses = [
            RelationshipStatus::Invited,
            RelationshipStatus::Requested,
            RelationshipStatus::Accepted,
            RelationshipStatus::Rejected,
        ];
        Descriptor::new(
            (0..n)
                .map(|i| Peer::new(identity(i as u8), statuses[i % 4]))
                .collect(),
        )
    }

    fn channel_with(m: usize) -> Channel {
        let a = identity(1);
        let b = identity(2);
        let mut channel = Channel::new(a, b);
        for i in 0..m {
            let sender = if i % 2 == 0 { a } else { b };
            let ts = DateTime::from_timestamp(1_700_000_000 + i as i64, 0).unwrap();
            channel.messages.push(Message::new(sender, format!("message #{i} ✓"), ts));
        }
        channel.message_count = m as u32;
        channel
    }

    #[test]
    fn test_account_tag_vector() {
        assert_eq!(hex::encode(account_tag("Descriptor")), "35e3fbee693962b5");
    }

    #[test]
    fn test_descriptor_roundtrip_sizes() {
        for n in [0, 1, 50] {
            let descriptor = descriptor_with(n);
            let bytes = encode_descriptor_account(&descriptor).unwrap();
            assert_eq!(bytes.len(), ACCOUNT_TAG_SIZE + 4 + n * 33);
            assert_eq!(decode_descriptor(&bytes).unwrap(), descriptor);
        }
    }

    #[test]
    fn test_channel_roundtrip_sizes() {
        for m in [0, 1, 500] {
            let channel = channel_with(m);
            let bytes = encode_channel_account(&channel).unwrap();
            assert_eq!(decode_channel(&bytes).unwrap(), channel);
        }
    }

    #[test]
    fn test_descriptor_layout_by_hand() {
        let mut data = vec![0xAAu8; 8];
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[5u8; 32]);
        data.push(1);

        let descriptor = decode_descriptor(&data).unwrap();
        assert_eq!(descriptor.peers, vec![Peer::new(identity(5), RelationshipStatus::Requested)]);
    }

    #[test]
    fn test_tag_is_not_checked() {
        let descriptor = descriptor_with(3);
        let mut bytes = encode_descriptor_account(&descriptor).unwrap();
        bytes[..8].copy_from_slice(&[0u8; 8]);
        assert_eq!(decode_descriptor(&bytes).unwrap(), descriptor);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let descriptor = descriptor_with(2);
        let mut bytes = encode_descriptor_account(&descriptor).unwrap();
        bytes.extend_from_slice(&[0u8; 200]);
        assert_eq!(decode_descriptor(&bytes).unwrap(), descriptor);
    }

    #[test]
    fn test_descriptor_truncated_mid_record() {
        let bytes = encode_descriptor_account(&descriptor_with(3)).unwrap();
        let truncated = &bytes[..bytes.len() - 10];
        let err = decode_descriptor(truncated).unwrap_err();
        assert!(err.is_decode_error());
        assert!(matches!(err, StemError::InvalidAccountData { record: "Descriptor", .. }));
    }

    #[test]
    fn test_shorter_than_tag() {
        let err = decode_descriptor(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, StemError::AccountTooShort { expected: 8, actual: 3 }));
    }

    #[test]
    fn test_invalid_status_code() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[5u8; 32]);
        data.push(7);
        assert!(matches!(decode_descriptor(&data), Err(StemError::InvalidStatusCode(7))));
    }

    #[test]
    fn test_channel_truncated() {
        let bytes = encode_channel_account(&channel_with(4)).unwrap();
        for cut in [9, 40, 72, bytes.len() - 1] {
            assert!(decode_channel(&bytes[..cut]).unwrap_err().is_decode_error());
        }
    }

    #[test]
    fn test_invalid_utf8_content() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&[1u8; 32]);
        data.extend_from_slice(&[2u8; 32]);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[1u8; 32]);
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0xC3, 0x28]);
        data.extend_from_slice(&[0u8; 8]);
        assert!(decode_channel(&data).unwrap_err().is_decode_error());
    }

    #[test]
    fn test_timestamp_upper_bytes_ignored() {
        let mut raw = [0u8; 8];
        raw[..4].copy_from_slice(&1_700_000_000u32.to_le_bytes());
        raw[4..].copy_from_slice(&[0xFF; 4]);
        assert_eq!(decode_timestamp(&raw).timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_timestamp_saturates() {
        let far = DateTime::from_timestamp(i64::from(u32::MAX) + 10, 0).unwrap();
        let raw = encode_timestamp(&far);
        assert_eq!(decode_timestamp(&raw).timestamp(), i64::from(u32::MAX));
        assert_eq!(&raw[4..], &[0u8; 4]);
    }

    #[test]
    fn test_content_fragment() {
        let bytes = encode_content("héllo").unwrap();
        assert_eq!(&bytes[..4], &6u32.to_le_bytes());
        assert_eq!(&bytes[4..], "héllo".as_bytes());

        let mut padded = bytes.clone();
        padded.extend_from_slice(&[9, 9]);
        let (content, used) = decode_content(&padded).unwrap();
        assert_eq!(content, "héllo");
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_content_fragment_truncated() {
        let bytes = encode_content("hello").unwrap();
        assert!(decode_content(&bytes[..6]).is_err());
    }

    proptest! {
        #[test]
        fn prop_descriptor_roundtrip(entries in proptest::collection::vec((any::<[u8; 32]>(), 0u8..4), 0..64)) {
            let descriptor = Descriptor::new(
                entries
                    .into_iter()
                    .map(|(id, code)| Peer::new(Pubkey::new_from_array(id), RelationshipStatus::try_from(code).unwrap()))
                    .collect(),
            );
            let bytes = encode_descriptor_account(&descriptor).unwrap();
            prop_assert_eq!(decode_descriptor(&bytes).unwrap(), descriptor);
        }

        #[test]
        fn prop_truncated_descriptor_never_panics(cut in 0usize..200) {
            let bytes = encode_descriptor_account(&descriptor_with(5)).unwrap();
            let cut = cut.min(bytes.len() - 1);
            prop_assert!(decode_descriptor(&bytes[..cut]).is_err());
        }
    }
}
