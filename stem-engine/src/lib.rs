//! # Stem Engine
//!
//! Client engine for the Stem contact and private channel program.
//!
//! ## Features
//!
//! - **Reconciliation**: merges descriptor accounts into a local snapshot
//!   and reports exactly what changed
//! - **Channel Tracking**: reads (and optionally follows) the channel account
//!   of every accepted peer, out-of-order safe
//! - **Request Builders**: validated register, invite, accept, reject and
//!   send-message requests
//! - **Events**: typed change notifications over a broadcast channel
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stem_engine::{Stem, StemEvent};
//! use stem_ledger::{DevSigner, MemoryLedger};
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let stem = Stem::new(alice, ledger);
//! let mut events = stem.subscribe_events();
//!
//! stem.load().await?;
//! stem.submit(stem.create_register_tx()?, &DevSigner::new(alice)).await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.name());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod builder;
pub mod config;
pub mod events;
pub mod reconcile;
pub mod state;
mod stem;

pub use builder::OperationBuilder;
pub use config::StemConfig;
pub use events::StemEvent;
pub use reconcile::{reconcile, ChannelOpening, Reconciliation};
pub use state::{ChannelHandle, LocalState, PeerRecord};
pub use stem::Stem;
