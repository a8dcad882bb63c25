//! # Stem Cryptography
//!
//! Deterministic derivations shared with the on-chain program.
//!
//! This crate provides:
//!
//! - **Hash**: SHA-256 helpers and operation opcodes
//! - **Derivation**: descriptor addresses, channel identifiers and channel addresses
//!
//! Any independent implementation given the same program id and seed tags
//! must produce the same bytes, so nothing here is configurable beyond the
//! program id.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stem_crypto::{channel_identifier, descriptor_address, operation_opcode};
//!
//! let mine = descriptor_address(&alice)?;
//! let id = channel_identifier(&alice, &bob)?;
//! assert_eq!(id, channel_identifier(&bob, &alice)?);
//! let opcode = operation_opcode("register");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod derive;
pub mod hash;

// Re-export main functions at crate root
pub use derive::{
    channel_address, channel_identifier, descriptor_address, ProgramAddress, ProgramAddresses,
};
pub use hash::{opcode_for, operation_opcode, sha256, sha256_concat};
