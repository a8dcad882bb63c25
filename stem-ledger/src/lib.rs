//! # Stem Ledger
//!
//! In-memory implementation of the ledger collaborator.
//!
//! [`MemoryLedger`] stores accounts in memory, pushes change notifications
//! to subscribers and executes submitted requests with [`StemProgram`], an
//! in-process model of the deployed program. It is meant for development,
//! demos and tests; production deployments plug an RPC-backed
//! [`LedgerClient`] into the engine instead. [`DevSigner`] signs requests
//! for identities that have no keys.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stem_ledger::MemoryLedger;
//!
//! let ledger = MemoryLedger::new();
//! let mut updates = ledger.subscribe_account(&address).await?;
//! ledger.submit(signed).await?;
//! let update = updates.next().await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod memory;
mod program;
mod signer;

pub use memory::{LedgerStats, MemoryLedger};
pub use program::{AccountWrite, StemProgram};
pub use signer::DevSigner;

// Re-export the trait from core
pub use stem_core::traits::LedgerClient;
