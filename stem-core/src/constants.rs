//! Protocol constants for Stem.
//!
//! Everything here is fixed by the deployed on-chain program. Changing any of
//! these values produces addresses and requests the program will not accept.

use solana_program::{pubkey, pubkey::Pubkey};

// ═══════════════════════════════════════════════════════════════════════════════
// PROGRAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Address of the deployed Stem program.
pub const PROGRAM_ID: Pubkey = pubkey!("BjheWDpSQGu1VmY1MHQPzvyBZDWvAnfrnw55mHr33BRB");

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN SEPARATION TAGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Seed tag for a party's descriptor account.
pub const DESCRIPTOR_SEED: &[u8] = b"wallet_descriptor";

/// Seed tag for a two-party channel account.
///
/// The spelling matches the seed the program was deployed with.
pub const CHANNEL_SEED: &[u8] = b"privite_chat";

/// Prefix hashed together with an operation name to form its opcode.
pub const OPCODE_NAMESPACE: &str = "global";

/// Prefix hashed together with a record name to form its account tag.
pub const ACCOUNT_TAG_NAMESPACE: &str = "account";

// ═══════════════════════════════════════════════════════════════════════════════
// SIZES
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of a public identity in bytes.
pub const IDENTITY_SIZE: usize = 32;

/// Size of a channel identifier (SHA-256 digest) in bytes.
pub const CHANNEL_ID_SIZE: usize = 32;

/// Size of an operation opcode in bytes.
pub const OPCODE_SIZE: usize = 8;

/// Size of the type tag prefixing every account buffer.
pub const ACCOUNT_TAG_SIZE: usize = 8;

/// Size of the on-chain message timestamp field.
///
/// Only the low 4 bytes carry a value (little-endian Unix seconds).
pub const MESSAGE_TIMESTAMP_SIZE: usize = 8;

/// Number of participants in a channel account.
pub const CHANNEL_PARTICIPANTS: usize = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION NAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Name of the register operation.
pub const OP_REGISTER: &str = "register";

/// Name of the invite operation.
pub const OP_INVITE: &str = "invite";

/// Name of the accept operation.
pub const OP_ACCEPT: &str = "accept";

/// Name of the reject operation.
pub const OP_REJECT: &str = "reject";

/// Name of the send-message operation.
pub const OP_SEND_MESSAGE: &str = "sendmessage";

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default capacity of the engine's event broadcast buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;
