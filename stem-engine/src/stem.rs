//! The `Stem` instance: owns the local state of one identity.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use solana_program::pubkey::Pubkey;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use stem_core::codec::decode_channel;
use stem_core::error::{Result, StemError};
use stem_core::traits::{AccountSubscription, LedgerClient, RequestSigner};
use stem_core::types::{
    AccountInfo, Channel, Identity, OperationRequest, Peer, RelationshipStatus, SignedRequest,
    TxSignature,
};
use stem_crypto::ProgramAddresses;

use crate::builder::OperationBuilder;
use crate::config::StemConfig;
use crate::events::StemEvent;
use crate::reconcile::{reconcile, ChannelOpening};
use crate::state::{LocalState, PeerRecord};

/// Client engine for one identity.
///
/// Cloning is cheap and every clone shares the same state. Background tasks
/// (subscriptions and channel fetches) stop once the last clone is dropped.
///
/// # Concurrency
///
/// State changes go through a single async mutex, so reconciliation and
/// channel attachment never interleave. Readers take a snapshot under a
/// short read lock and never wait on I/O.
#[derive(Clone)]
pub struct Stem {
    inner: Arc<Inner>,
}

struct Inner {
    owner: Identity,
    config: StemConfig,
    addresses: ProgramAddresses,
    builder: OperationBuilder,
    ledger: Arc<dyn LedgerClient>,
    state: RwLock<LocalState>,
    /// Serializes every state transition
    transitions: AsyncMutex<()>,
    /// Held across the whole of `load`
    loading: AsyncMutex<()>,
    events: broadcast::Sender<StemEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Stem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stem")
            .field("owner", &self.inner.owner)
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.read())
            .finish()
    }
}

impl Stem {
    /// Creates an unloaded engine with the default configuration.
    pub fn new(owner: Identity, ledger: Arc<dyn LedgerClient>) -> Self {
        Self::with_config(owner, ledger, StemConfig::default())
    }

    /// Creates an unloaded engine with a custom configuration.
    pub fn with_config(owner: Identity, ledger: Arc<dyn LedgerClient>, config: StemConfig) -> Self {
        let addresses = ProgramAddresses::new(config.program_id);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                owner,
                builder: OperationBuilder::new(owner, addresses),
                addresses,
                config,
                ledger,
                state: RwLock::new(LocalState::new()),
                transitions: AsyncMutex::new(()),
                loading: AsyncMutex::new(()),
                events,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The identity this engine acts for.
    pub fn owner(&self) -> &Identity {
        &self.inner.owner
    }

    /// Active configuration.
    pub fn config(&self) -> &StemConfig {
        &self.inner.config
    }

    /// Address of the owner's descriptor account.
    pub fn descriptor_address(&self) -> Result<Pubkey> {
        Ok(self.inner.addresses.descriptor(&self.inner.owner)?.address)
    }

    /// Receives every event emitted after this call.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StemEvent> {
        self.inner.events.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Fetches the descriptor and performs the initial reconciliation.
    ///
    /// With subscriptions enabled, also follows the descriptor account. A
    /// second call is a no-op, including one racing the first.
    #[instrument(skip(self), fields(owner = %self.inner.owner))]
    pub async fn load(&self) -> Result<()> {
        let _loading = self.inner.loading.lock().await;
        if self.is_loaded() {
            debug!("Already loaded");
            return Ok(());
        }
        let address = self.descriptor_address()?;

        // Subscribe before fetching so no change falls between the two.
        let subscription = if self.inner.config.subscribe {
            Some(self.inner.ledger.subscribe_account(&address).await?)
        } else {
            None
        };

        let account = self.inner.ledger.fetch_account(&address).await?;
        self.inner.apply_descriptor(account).await?;

        if let Some(subscription) = subscription {
            let task = tokio::spawn(watch_descriptor(Arc::downgrade(&self.inner), subscription));
            self.inner.tasks.lock().push(task);
        }

        info!(registered = self.inner.state.read().is_registered, "Loaded");
        Ok(())
    }

    /// Re-fetches the descriptor and reconciles it.
    #[instrument(skip(self), fields(owner = %self.inner.owner))]
    pub async fn refresh(&self) -> Result<()> {
        self.inner.state.read().ensure_loaded()?;
        let account = self.inner.ledger.fetch_account(&self.descriptor_address()?).await?;
        self.inner.apply_descriptor(account).await
    }

    /// Reconciles descriptor contents delivered by the caller.
    ///
    /// For collaborators that run their own notification loop. Requires a
    /// completed [`load`](Self::load). On error the state is left as it was.
    pub async fn apply_descriptor_update(&self, account: Option<AccountInfo>) -> Result<()> {
        self.inner.state.read().ensure_loaded()?;
        self.inner.apply_descriptor(account).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    /// True once the initial load has completed.
    pub fn is_loaded(&self) -> bool {
        self.inner.state.read().is_loaded
    }

    /// Whether the owner's descriptor exists.
    pub fn is_registered(&self) -> Result<bool> {
        let state = self.inner.state.read();
        state.ensure_loaded()?;
        Ok(state.is_registered)
    }

    /// Every tracked `(identity, status)` pair, ordered by identity.
    pub fn peers(&self) -> Vec<Peer> {
        self.inner.state.read().summaries()
    }

    /// Snapshot of one peer record.
    pub fn peer(&self, identity: &Identity) -> Option<PeerRecord> {
        self.inner.state.read().peer(identity).cloned()
    }

    /// Snapshot of the whole local state.
    pub fn state(&self) -> LocalState {
        self.inner.state.read().clone()
    }

    /// Last decoded channel shared with `peer`.
    ///
    /// `None` while no channel is attached or its content has not arrived.
    /// Never triggers a fetch.
    pub fn get_channel(&self, peer: &Identity) -> Result<Option<Channel>> {
        let state = self.inner.state.read();
        state.ensure_registered()?;
        Ok(state
            .peer(peer)
            .and_then(|record| record.channel.as_ref())
            .and_then(|handle| handle.channel.clone()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REQUESTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Builds a register request.
    pub fn create_register_tx(&self) -> Result<OperationRequest> {
        self.inner.builder.register(&self.inner.state.read())
    }

    /// Builds an invite request for `peer`.
    pub fn create_invite_tx(&self, peer: &Identity) -> Result<OperationRequest> {
        self.inner.builder.invite(&self.inner.state.read(), peer)
    }

    /// Builds an accept request for `peer`'s pending invitation.
    pub fn create_accept_tx(&self, peer: &Identity) -> Result<OperationRequest> {
        self.inner.builder.accept(&self.inner.state.read(), peer)
    }

    /// Builds a reject request for `peer`'s pending invitation.
    pub fn create_reject_tx(&self, peer: &Identity) -> Result<OperationRequest> {
        self.inner.builder.reject(&self.inner.state.read(), peer)
    }

    /// Builds a send-message request to an accepted `peer`.
    pub fn create_send_message_tx(&self, peer: &Identity, content: &str) -> Result<OperationRequest> {
        self.inner.builder.send_message(&self.inner.state.read(), peer, content)
    }

    /// Signs `request` and hands it to the ledger.
    ///
    /// Local state is not touched; it follows once the ledger reports the
    /// changed accounts.
    #[instrument(skip(self, request, signer), fields(kind = %request.kind))]
    pub async fn submit(
        &self,
        request: OperationRequest,
        signer: &dyn RequestSigner,
    ) -> Result<TxSignature> {
        let identity = signer.public_identity();
        if !request.signers().contains(&identity) {
            return Err(StemError::SigningFailed(format!(
                "{identity} is not a signer of this {} request",
                request.kind
            )));
        }
        let signature = signer.sign(&request)?;
        let signed = SignedRequest {
            request,
            signer: identity,
            signature,
        };
        let signature = self.inner.ledger.submit(signed).await?;
        info!(%signature, "Submitted");
        Ok(signature)
    }
}

impl Inner {
    fn emit(&self, event: StemEvent) {
        debug!(event = event.name(), receivers = self.events.receiver_count(), "Emitting");
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn apply_descriptor(self: &Arc<Self>, account: Option<AccountInfo>) -> Result<()> {
        let _transition = self.transitions.lock().await;

        let current = self.state.read().clone();
        let outcome = match reconcile(&current, &self.owner, &self.addresses, account.as_ref()) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Descriptor rejected, keeping previous state");
                return Err(e);
            }
        };

        let peers = outcome.state.records();
        let registered = outcome.state.is_registered;
        *self.state.write() = outcome.state;

        if outcome.list_updated {
            self.emit(StemEvent::PeersUpdated { peers });
        }
        if outcome.status_updated {
            info!(registered, "Registration changed");
            self.emit(StemEvent::RegistrationChanged { registered });
        }
        for opening in outcome.channels_to_open {
            self.open_channel(opening);
        }
        Ok(())
    }

    /// Starts reading (and with subscriptions, following) a channel account.
    fn open_channel(self: &Arc<Self>, opening: ChannelOpening) {
        debug!(peer = %opening.peer, address = %opening.address, "Opening channel");
        let task = tokio::spawn(follow_channel(
            Arc::downgrade(self),
            Arc::clone(&self.ledger),
            opening,
            self.config.subscribe,
        ));
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Attaches channel content if the peer is still accepted on that channel.
    async fn attach_channel(&self, opening: ChannelOpening, account: Option<AccountInfo>) -> bool {
        let Some(account) = account else {
            debug!(peer = %opening.peer, "Channel account not created yet");
            return false;
        };
        let channel = match decode_channel(&account.data) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(peer = %opening.peer, error = %e, "Undecodable channel account");
                return false;
            }
        };

        let _transition = self.transitions.lock().await;
        {
            let mut state = self.state.write();
            let Some(record) = state.peers.get_mut(&opening.peer) else {
                warn!(peer = %opening.peer, "Dropping channel for untracked peer");
                return false;
            };
            if record.status != RelationshipStatus::Accepted {
                warn!(peer = %opening.peer, status = %record.status, "Dropping stale channel");
                return false;
            }
            let Some(handle) = record
                .channel
                .as_mut()
                .filter(|handle| handle.address == opening.address)
            else {
                warn!(peer = %opening.peer, "Dropping channel for a different account");
                return false;
            };
            if handle.channel.as_ref() == Some(&channel) {
                return false;
            }
            handle.channel = Some(channel.clone());
        }

        debug!(peer = %opening.peer, messages = channel.message_count, "Channel attached");
        self.emit(StemEvent::ChannelUpdated {
            peer: opening.peer,
            channel,
        });
        true
    }
}

async fn watch_descriptor(inner: Weak<Inner>, mut subscription: AccountSubscription) {
    while let Some(update) = subscription.next().await {
        let Some(inner) = inner.upgrade() else { break };
        if let Err(e) = inner.apply_descriptor(update).await {
            warn!(error = %e, "Descriptor update failed");
        }
    }
    debug!(address = %subscription.address(), "Descriptor subscription ended");
}

async fn follow_channel(
    inner: Weak<Inner>,
    ledger: Arc<dyn LedgerClient>,
    opening: ChannelOpening,
    subscribe: bool,
) {
    let subscription = if subscribe {
        match ledger.subscribe_account(&opening.address).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(peer = %opening.peer, error = %e, "Channel subscription failed");
                None
            }
        }
    } else {
        None
    };

    match ledger.fetch_account(&opening.address).await {
        Ok(account) => {
            let Some(strong) = inner.upgrade() else { return };
            strong.attach_channel(opening, account).await;
        }
        Err(e) => warn!(peer = %opening.peer, error = %e, "Channel fetch failed"),
    }

    let Some(mut subscription) = subscription else { return };
    while let Some(update) = subscription.next().await {
        let Some(strong) = inner.upgrade() else { break };
        let still_tracked = strong
            .state
            .read()
            .peer(&opening.peer)
            .and_then(|record| record.channel.as_ref())
            .is_some_and(|handle| handle.address == opening.address);
        if !still_tracked {
            debug!(peer = %opening.peer, "Channel no longer attached, unsubscribing");
            break;
        }
        strong.attach_channel(opening, update).await;
    }
}
