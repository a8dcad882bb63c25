//! # Stem Core
//!
//! Core types, errors, codec and collaborator traits for the Stem contact and
//! private channel protocol.
//!
//! This crate provides the foundational building blocks used by all other Stem crates:
//!
//! - **Types**: Relationship statuses, descriptors, channels, operation requests
//! - **Codec**: The program's fixed binary account layouts
//! - **Errors**: Precondition, decode and transport errors
//! - **Constants**: Program id, seed tags, sizes
//! - **Traits**: Ledger and signer capabilities
//!
//! ## Example
//!
//! ```rust,ignore
//! use stem_core::codec::decode_descriptor;
//!
//! let descriptor = decode_descriptor(&account.data)?;
//! for peer in &descriptor.peers {
//!     println!("{} {}", peer.identity, peer.status);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod codec;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{Result, StemError};
pub use traits::*;
pub use types::*;

pub use solana_program::instruction::{AccountMeta, Instruction};
pub use solana_program::pubkey::Pubkey;
