//! Engine configuration.

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

use stem_core::constants::{DEFAULT_EVENT_CAPACITY, PROGRAM_ID};
use stem_core::error::{Result, StemError};
use stem_core::types::parse_identity;

/// Configuration for a [`Stem`](crate::Stem) instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemConfig {
    /// Program the descriptor and channel accounts belong to
    pub program_id: Pubkey,
    /// Follow account changes through ledger subscriptions
    pub subscribe: bool,
    /// Buffered events per receiver before slow receivers lag
    pub event_capacity: usize,
}

impl Default for StemConfig {
    fn default() -> Self {
        Self {
            program_id: PROGRAM_ID,
            subscribe: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl StemConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the environment (and `.env` if present).
    ///
    /// Reads `STEM_PROGRAM_ID`, `STEM_SUBSCRIBE` and `STEM_EVENT_CAPACITY`;
    /// unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(value) = std::env::var("STEM_PROGRAM_ID") {
            config.program_id = parse_identity(&value)
                .map_err(|e| StemError::ConfigError(format!("STEM_PROGRAM_ID: {e}")))?;
        }
        if let Ok(value) = std::env::var("STEM_SUBSCRIBE") {
            config.subscribe = value != "false" && value != "0";
        }
        if let Ok(value) = std::env::var("STEM_EVENT_CAPACITY") {
            config.event_capacity = value
                .trim()
                .parse()
                .map_err(|_| StemError::ConfigError(format!("STEM_EVENT_CAPACITY: invalid number {value:?}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the program id.
    pub fn program_id(mut self, program_id: Pubkey) -> Self {
        self.program_id = program_id;
        self
    }

    /// Enables or disables ledger subscriptions.
    pub fn subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        self
    }

    /// Sets the event buffer size.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(StemError::ConfigError("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
