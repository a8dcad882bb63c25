//! In-memory ledger.
//!
//! Holds account state in concurrent maps, runs submitted requests through
//! [`StemProgram`] and pushes every write to live subscriptions. Suitable for
//! development, testing and the CLI demo.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use solana_program::pubkey::Pubkey;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use stem_core::error::{Result, StemError};
use stem_core::traits::{AccountSubscription, LedgerClient};
use stem_core::types::{AccountInfo, AccountUpdate, SignedRequest, TxSignature};

use crate::program::StemProgram;

/// Counters kept by [`MemoryLedger`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// One-shot reads served
    pub fetches: u64,
    /// Requests applied
    pub submissions: u64,
    /// Requests refused
    pub rejected: u64,
    /// Updates pushed to subscribers
    pub notifications: u64,
}

/// In-memory ledger.
///
/// All operations are thread-safe. Submissions are applied one at a time so
/// every request sees the writes of the one before it.
#[derive(Debug)]
pub struct MemoryLedger {
    /// Account storage: address → contents
    accounts: DashMap<Pubkey, AccountInfo>,
    /// Live subscriptions: address → senders
    subscribers: DashMap<Pubkey, Vec<mpsc::UnboundedSender<AccountUpdate>>>,
    program: StemProgram,
    /// Serializes submissions
    submit_lock: Mutex<()>,
    /// Fixed clock for message timestamps, wall clock if unset
    clock: RwLock<Option<DateTime<Utc>>>,
    /// Fail every call with a transport error
    offline: AtomicBool,
    stats: RwLock<LedgerStats>,
}

impl MemoryLedger {
    /// Creates an empty ledger running the deployed program.
    pub fn new() -> Self {
        Self::with_program(StemProgram::default())
    }

    /// Creates an empty ledger running the program at `program_id`.
    pub fn with_program_id(program_id: Pubkey) -> Self {
        Self::with_program(StemProgram::new(program_id))
    }

    fn with_program(program: StemProgram) -> Self {
        Self {
            accounts: DashMap::new(),
            subscribers: DashMap::new(),
            program,
            submit_lock: Mutex::new(()),
            clock: RwLock::new(None),
            offline: AtomicBool::new(false),
            stats: RwLock::new(LedgerStats::default()),
        }
    }

    /// The program this ledger executes.
    pub fn program(&self) -> &StemProgram {
        &self.program
    }

    /// Overwrites (or with `None`, closes) an account and notifies subscribers.
    pub fn set_account(&self, address: Pubkey, account: Option<AccountInfo>) {
        match &account {
            Some(info) => {
                self.accounts.insert(address, info.clone());
            }
            None => {
                self.accounts.remove(&address);
            }
        }
        self.notify(&address, account);
    }

    /// Current contents of an account.
    pub fn account(&self, address: &Pubkey) -> Option<AccountInfo> {
        self.accounts.get(address).map(|entry| entry.value().clone())
    }

    /// Number of live subscriptions on an account.
    pub fn subscriber_count(&self, address: &Pubkey) -> usize {
        self.subscribers
            .get(address)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Pins the clock used for message timestamps.
    pub fn set_time(&self, now: DateTime<Utc>) {
        *self.clock.write() = Some(now);
    }

    /// Makes every call fail with [`StemError::Transport`] while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> LedgerStats {
        self.stats.read().clone()
    }

    fn now(&self) -> DateTime<Utc> {
        (*self.clock.read()).unwrap_or_else(Utc::now)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StemError::Transport("ledger is offline".into()));
        }
        Ok(())
    }

    /// Pushes an update to every live subscriber of `address`, dropping closed ones.
    fn notify(&self, address: &Pubkey, update: AccountUpdate) {
        let Some(mut senders) = self.subscribers.get_mut(address) else {
            return;
        };
        let before = senders.len();
        senders.retain(|sender| sender.send(update.clone()).is_ok());
        let delivered = senders.len() as u64;
        if senders.len() < before {
            debug!(%address, pruned = before - senders.len(), "Pruned closed subscriptions");
        }
        drop(senders);
        self.stats.write().notifications += delivered;
    }

    fn reject(&self, reason: String) -> StemError {
        self.stats.write().rejected += 1;
        warn!(%reason, "Request rejected");
        StemError::SubmissionRejected(reason)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    #[instrument(skip(self))]
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<AccountInfo>> {
        self.ensure_online()?;
        self.stats.write().fetches += 1;
        Ok(self.account(address))
    }

    #[instrument(skip(self))]
    async fn subscribe_account(&self, address: &Pubkey) -> Result<AccountSubscription> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(*address).or_default().push(tx);
        debug!(%address, "Subscribed");
        Ok(AccountSubscription::new(*address, rx))
    }

    #[instrument(skip(self, signed), fields(kind = %signed.request.kind, signer = %signed.signer))]
    async fn submit(&self, signed: SignedRequest) -> Result<TxSignature> {
        self.ensure_online()?;

        if !signed.request.signers().contains(&signed.signer) {
            return Err(self.reject(format!("{} is not a signer of the request", signed.signer)));
        }

        let writes = {
            let _guard = self.submit_lock.lock();
            let writes = match self.program.execute(&signed.request.instruction, self.now(), |a| {
                self.account(a)
            }) {
                Ok(writes) => writes,
                Err(StemError::SubmissionRejected(reason)) => return Err(self.reject(reason)),
                Err(other) => return Err(self.reject(other.to_string())),
            };
            for write in &writes {
                self.accounts.insert(write.address, write.account.clone());
            }
            self.stats.write().submissions += 1;
            writes
        };

        debug!(writes = writes.len(), "Request applied");
        for write in writes {
            self.notify(&write.address, Some(write.account));
        }
        Ok(signed.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_program::instruction::{AccountMeta, Instruction};
    use solana_program::system_program;
    use stem_core::codec::decode_descriptor;
    use stem_core::types::{OperationKind, OperationRequest};
    use stem_crypto::{descriptor_address, opcode_for};
    use tokio_test::{assert_err, assert_ok};

    fn register_request(owner: Pubkey) -> OperationRequest {
        let ix = Instruction::new_with_bytes(
            stem_core::constants::PROGRAM_ID,
            &opcode_for(OperationKind::Register),
            vec![
                AccountMeta::new(descriptor_address(&owner).unwrap(), false),
                AccountMeta::new_readonly(owner, true),
                AccountMeta::new_readonly(system_program::ID, false),
            ],
        );
        OperationRequest::new(OperationKind::Register, ix)
    }

    fn signed(request: OperationRequest, signer: Pubkey) -> SignedRequest {
        SignedRequest {
            request,
            signer,
            signature: TxSignature([7u8; 64]),
        }
    }

    #[tokio::test]
    async fn test_register_and_fetch() {
        let ledger = MemoryLedger::new();
        let owner = Pubkey::new_unique();
        let address = descriptor_address(&owner).unwrap();

        assert_eq!(ledger.fetch_account(&address).await.unwrap(), None);

        let sig = ledger.submit(signed(register_request(owner), owner)).await.unwrap();
        assert_eq!(sig, TxSignature([7u8; 64]));

        let account = ledger.fetch_account(&address).await.unwrap().unwrap();
        assert!(decode_descriptor(&account.data).unwrap().is_empty());
        assert_eq!(account.owner, stem_core::constants::PROGRAM_ID);

        let stats = ledger.stats();
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.submissions, 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_writes() {
        let ledger = MemoryLedger::new();
        let owner = Pubkey::new_unique();
        let address = descriptor_address(&owner).unwrap();
        let mut sub = ledger.subscribe_account(&address).await.unwrap();
        assert_eq!(ledger.subscriber_count(&address), 1);

        assert_ok!(ledger.submit(signed(register_request(owner), owner)).await);
        let update = sub.next().await.unwrap();
        assert!(update.is_some());

        ledger.set_account(address, None);
        assert_eq!(sub.next().await, Some(None));
        assert_eq!(ledger.stats().notifications, 2);
    }

    #[tokio::test]
    async fn test_closed_subscription_pruned() {
        let ledger = MemoryLedger::new();
        let address = Pubkey::new_unique();
        let sub = ledger.subscribe_account(&address).await.unwrap();
        drop(sub);

        assert_eq!(ledger.subscriber_count(&address), 0);
        ledger.set_account(address, Some(AccountInfo::new(1, address, vec![])));
        assert_eq!(ledger.stats().notifications, 0);
    }

    #[tokio::test]
    async fn test_foreign_signer_rejected() {
        let ledger = MemoryLedger::new();
        let owner = Pubkey::new_unique();
        let err = ledger
            .submit(signed(register_request(owner), Pubkey::new_unique()))
            .await
            .unwrap_err();
        assert!(matches!(err, StemError::SubmissionRejected(_)));
        assert_eq!(ledger.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_failed_submission_writes_nothing() {
        let ledger = MemoryLedger::new();
        let owner = Pubkey::new_unique();
        assert_ok!(ledger.submit(signed(register_request(owner), owner)).await);
        let before = ledger.account(&descriptor_address(&owner).unwrap());

        assert_err!(ledger.submit(signed(register_request(owner), owner)).await);
        assert_eq!(ledger.account(&descriptor_address(&owner).unwrap()), before);
        assert_eq!(ledger.stats().submissions, 1);
    }

    #[tokio::test]
    async fn test_offline_fails_with_transport() {
        let ledger = MemoryLedger::new();
        ledger.set_offline(true);
        let err = ledger.fetch_account(&Pubkey::new_unique()).await.unwrap_err();
        assert!(err.is_recoverable());

        ledger.set_offline(false);
        assert_ok!(ledger.fetch_account(&Pubkey::new_unique()).await);
    }

    #[tokio::test]
    async fn test_other_program_rejected() {
        let ledger = MemoryLedger::with_program_id(Pubkey::new_unique());
        let owner = Pubkey::new_unique();
        assert_err!(ledger.submit(signed(register_request(owner), owner)).await);
    }
}
