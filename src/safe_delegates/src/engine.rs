//! Delegate synchronization engine
//!
//! Owns the session-scoped state (session, Safe selection, connection status
//! and delegate view) and is the only writer of it. Every mutation is
//! followed by a full re-fetch of the delegate list; the view is never edited
//! locally.
//!
//! State transitions:
//!
//! ```text
//! Disconnected --connect()--> Connecting --Safe info ok--> Connected
//!      ^                          |
//!      +------ Safe info error ---+
//! ```
//!
//! Add and remove run as mutation-then-refresh pairs, serialized per Safe.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::Address;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DelegatesConfig;
use crate::errors::DelegateError;
use crate::registry::{
    AddSafeDelegateProps, ChainId, DelegateRecord, GetSafeDelegateProps, RegistryClientFactory,
    RemoveSafeDelegateProps, TransactionServiceFactory,
};
use crate::selection::SafeSelection;
use crate::session::{Session, WalletHandle};
use crate::signer::{DelegateSigner, derive_signer};
use crate::utils::address_utils::{normalize_address, parse_address_input, validate_label};

/// Connection to the active Safe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only copy of the engine state for rendering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DelegateSnapshot {
    pub state: ConnectionState,
    pub active_safe: Option<String>,
    pub selectable_safes: Vec<String>,
    pub delegates: Vec<DelegateRecord>,
}

impl DelegateSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn delegate_addresses(&self) -> Vec<Address> {
        self.delegates.iter().map(|record| record.delegate).collect()
    }
}

struct SyncState {
    session: Session,
    selection: SafeSelection,
    connection: ConnectionState,
    delegates: Vec<DelegateRecord>,
    // Bumped whenever the chain or the active Safe changes; responses to
    // requests issued under an older epoch are dropped.
    epoch: u64,
}

impl SyncState {
    fn snapshot(&self) -> DelegateSnapshot {
        DelegateSnapshot {
            state: self.connection,
            active_safe: self.selection.active().map(str::to_string),
            selectable_safes: self.selection.selectable_safes().to_vec(),
            delegates: self.delegates.clone(),
        }
    }

    fn reset(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.delegates.clear();
        self.epoch += 1;
    }
}

/// Everything a mutation needs, captured before dispatch
struct MutationContext {
    chain_id: ChainId,
    safe: String,
    delegator: Address,
    signer: DelegateSigner,
}

/// Keeps the local delegate view of the active Safe in sync with the registry
pub struct DelegateSyncEngine<F> {
    factory: F,
    state: Mutex<SyncState>,
    mutation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    snapshots: watch::Sender<DelegateSnapshot>,
}

impl DelegateSyncEngine<TransactionServiceFactory> {
    /// Engine talking to the Safe Transaction Service as configured
    pub fn from_config(config: &DelegatesConfig) -> Result<Self, DelegateError> {
        let factory = TransactionServiceFactory::from_config(config)?;
        let selection = SafeSelection::from_setting(config.safe_addresses.as_deref());
        if !selection.is_configured() {
            warn!("No Safe address configured");
        }
        Ok(Self::new(factory, selection))
    }
}

impl<F: RegistryClientFactory> DelegateSyncEngine<F> {
    pub fn new(factory: F, selection: SafeSelection) -> Self {
        let state = SyncState {
            session: Session::disconnected(),
            selection,
            connection: ConnectionState::Disconnected,
            delegates: Vec::new(),
            epoch: 0,
        };
        let (snapshots, _) = watch::channel(state.snapshot());

        Self {
            factory,
            state: Mutex::new(state),
            mutation_locks: Mutex::new(HashMap::new()),
            snapshots,
        }
    }

    pub fn snapshot(&self) -> DelegateSnapshot {
        self.state.lock().snapshot()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<DelegateSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn delegates(&self) -> Vec<DelegateRecord> {
        self.state.lock().delegates.clone()
    }

    pub fn selectable_safes(&self) -> Vec<String> {
        self.state.lock().selection.selectable_safes().to_vec()
    }

    pub fn active_safe(&self) -> Option<String> {
        self.state.lock().selection.active().map(str::to_string)
    }

    pub fn session(&self) -> Session {
        self.state.lock().session.clone()
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshots.send_replace(snapshot);
    }

    /// Records a new wallet session.
    ///
    /// Losing the account or chain, or switching chains, drops the
    /// connection and the delegate view. No request is made.
    pub fn update_session(&self, session: Session) {
        {
            let mut state = self.state.lock();
            if state.session == session {
                return;
            }

            let chain_changed = state.session.chain_id != session.chain_id;
            if !session.is_connected() || chain_changed {
                debug!(?session, "session changed, dropping connection");
                state.reset();
            }
            state.session = session;
        }
        self.publish();
    }

    /// Records a new session and connects when it is complete
    pub async fn sync_session(&self, session: Session) -> Result<(), DelegateError> {
        let connected = session.is_connected();
        self.update_session(session);
        if connected {
            self.connect().await
        } else {
            Ok(())
        }
    }

    /// Checks the active Safe with the registry and loads its delegates.
    ///
    /// A no-op while a connect is in flight or already succeeded.
    pub async fn connect(&self) -> Result<(), DelegateError> {
        let (chain_id, safe, epoch) = {
            let mut state = self.state.lock();
            let (_, chain_id) = state.session.connected().ok_or(DelegateError::Disconnected)?;
            if state.connection != ConnectionState::Disconnected {
                debug!(state = ?state.connection, "connect skipped");
                return Ok(());
            }
            let safe = state.selection.ensure_active()?.to_string();
            state.connection = ConnectionState::Connecting;
            (chain_id, safe, state.epoch)
        };
        self.publish();

        let client = self.factory.client_for(chain_id);
        let result = client.get_safe_info(&safe).await;

        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                debug!(%safe, chain_id, "discarding stale Safe info");
                return Ok(());
            }
            state.connection = match &result {
                Ok(_) => ConnectionState::Connected,
                Err(_) => ConnectionState::Disconnected,
            };
        }
        self.publish();

        match result {
            Ok(safe_info) => {
                info!(%safe, chain_id, "Connected to Safe");
                debug!(?safe_info, "Safe info");
                self.refresh_delegates().await
            }
            Err(e) => {
                warn!(%safe, chain_id, error = %e, "Error getting Safe info");
                Err(e)
            }
        }
    }

    /// Replaces the delegate view with the registry's current list
    pub async fn refresh_delegates(&self) -> Result<(), DelegateError> {
        let (chain_id, safe, epoch) = {
            let state = self.state.lock();
            let (_, chain_id) = state.session.connected().ok_or(DelegateError::Disconnected)?;
            let safe = state
                .selection
                .active()
                .ok_or(DelegateError::NotConfigured)?
                .to_string();
            (chain_id, safe, state.epoch)
        };

        let client = self.factory.client_for(chain_id);
        let response = match client
            .get_safe_delegates(&GetSafeDelegateProps::for_safe(&safe))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(%safe, chain_id, error = %e, "Error getting delegates");
                return Err(e);
            }
        };

        let delegates: Vec<DelegateRecord> =
            response.results.iter().map(DelegateRecord::from).collect();
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                debug!(%safe, chain_id, "discarding stale delegate list");
                return Ok(());
            }
            state.delegates = delegates;
            info!(%safe, chain_id, count = state.delegates.len(), "Found delegates");
        }
        self.publish();

        Ok(())
    }

    /// Makes `address` the active Safe.
    ///
    /// The address is not checked against the configured list. When
    /// connected, the delegate list of the new Safe is fetched without
    /// repeating the Safe info check.
    pub async fn select_safe(&self, address: impl Into<String>) -> Result<(), DelegateError> {
        let address = address.into();
        let previous = {
            let mut state = self.state.lock();
            state.selection.select(address.clone());
            state.delegates.clear();
            state.epoch += 1;
            let previous = state.connection;
            // the in-flight connect now targets the wrong Safe
            if previous == ConnectionState::Connecting {
                state.connection = ConnectionState::Disconnected;
            }
            previous
        };
        self.publish();
        info!(safe = %address, "Selected Safe");

        match previous {
            ConnectionState::Connected => self.refresh_delegates().await,
            ConnectionState::Connecting => self.connect().await,
            ConnectionState::Disconnected => Ok(()),
        }
    }

    /// Registers `delegate` for the active Safe, then reloads the list.
    ///
    /// Returns once the registry acknowledged the addition; a failing
    /// follow-up refresh is logged and leaves the previous view in place.
    pub async fn add_delegate(
        &self,
        delegate: &str,
        label: &str,
        wallet: &WalletHandle,
    ) -> Result<(), DelegateError> {
        let delegate_address = parse_address_input("delegate address", delegate)?;
        let label = validate_label(label)?;
        let ctx = self.mutation_context(wallet).await?;

        let lock = self.mutation_lock(&ctx.safe);
        let _guard = lock.lock().await;

        let client = self.factory.client_for(ctx.chain_id);
        let result = client
            .add_safe_delegate(AddSafeDelegateProps {
                safe_address: ctx.safe.clone(),
                delegate_address,
                delegator_address: ctx.delegator,
                label,
                signer: &ctx.signer,
            })
            .await;

        if let Err(e) = result {
            warn!(safe = %ctx.safe, delegate = %delegate_address, error = %e, "Error adding delegate");
            return Err(e);
        }
        info!(safe = %ctx.safe, delegate = %delegate_address, "Delegate added");

        // already logged by refresh_delegates
        let _ = self.refresh_delegates().await;
        Ok(())
    }

    /// Removes `delegate`, then reloads the list of the active Safe
    pub async fn remove_delegate(
        &self,
        delegate: &str,
        wallet: &WalletHandle,
    ) -> Result<(), DelegateError> {
        let delegate_address = parse_address_input("delegate address", delegate)?;
        let ctx = self.mutation_context(wallet).await?;

        let lock = self.mutation_lock(&ctx.safe);
        let _guard = lock.lock().await;

        let client = self.factory.client_for(ctx.chain_id);
        let result = client
            .remove_safe_delegate(RemoveSafeDelegateProps {
                delegate_address,
                delegator_address: ctx.delegator,
                signer: &ctx.signer,
            })
            .await;

        if let Err(e) = result {
            warn!(safe = %ctx.safe, delegate = %delegate_address, error = %e, "Error removing delegate");
            return Err(e);
        }
        info!(safe = %ctx.safe, delegate = %delegate_address, "Delegate removed");

        let _ = self.refresh_delegates().await;
        Ok(())
    }

    async fn mutation_context(&self, wallet: &WalletHandle) -> Result<MutationContext, DelegateError> {
        let (session, safe) = {
            let state = self.state.lock();
            if !state.session.is_connected() {
                return Err(DelegateError::Disconnected);
            }
            let safe = match state.selection.active() {
                Some(safe) => safe.to_string(),
                None if state.selection.is_configured() => return Err(DelegateError::Disconnected),
                None => return Err(DelegateError::NotConfigured),
            };
            (state.session.clone(), safe)
        };

        let (account, chain_id) = session.connected().ok_or(DelegateError::Disconnected)?;
        let delegator = parse_address_input("delegator address", &normalize_address(account))?;

        let Some(signer) = derive_signer(&session, wallet).await? else {
            debug!("wallet has no account yet, aborting");
            return Err(DelegateError::SignerUnavailable);
        };

        Ok(MutationContext {
            chain_id,
            safe,
            delegator,
            signer,
        })
    }

    fn mutation_lock(&self, safe: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.mutation_locks.lock();
        Arc::clone(locks.entry(safe.to_lowercase()).or_default())
    }
}
