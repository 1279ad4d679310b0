//! In-memory registry and wallet helpers for tests.
//!
//! [`InMemoryRegistry`] behaves like the transaction service for the calls the
//! engine makes: it verifies delegate signatures, records every call, and can
//! be told to fail or slow down.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::DelegateError;
use crate::registry::{
    AddSafeDelegateProps, ChainId, GetSafeDelegateProps, RegistryClient, RegistryClientFactory,
    RemoveSafeDelegateProps, SafeDelegateListResponse, SafeDelegateResponse, SafeInfo,
};
use crate::session::{ChainDescriptor, WalletHandle};
use crate::signer::{LocalKeyTransport, current_totp, delegate_signing_hash};
use crate::utils::address_utils::parse_safe_address;

/// Call observed by the in-memory registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    SafeInfo {
        chain_id: ChainId,
        safe: String,
    },
    ListDelegates {
        chain_id: ChainId,
        safe: String,
    },
    AddDelegate {
        chain_id: ChainId,
        safe: String,
        delegate: Address,
        delegator: Address,
        label: String,
    },
    RemoveDelegate {
        chain_id: ChainId,
        delegate: Address,
        delegator: Address,
    },
}

impl RegistryCall {
    pub fn kind(&self) -> CallKind {
        match self {
            Self::SafeInfo { .. } => CallKind::SafeInfo,
            Self::ListDelegates { .. } => CallKind::ListDelegates,
            Self::AddDelegate { .. } => CallKind::AddDelegate,
            Self::RemoveDelegate { .. } => CallKind::RemoveDelegate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    SafeInfo,
    ListDelegates,
    AddDelegate,
    RemoveDelegate,
}

#[derive(Default)]
struct RegistryData {
    // (chain, lowercase Safe address) -> delegates in insertion order
    safes: HashMap<(ChainId, String), Vec<SafeDelegateResponse>>,
    calls: Vec<RegistryCall>,
    failures: HashMap<CallKind, VecDeque<DelegateError>>,
    latency: Option<Duration>,
}

/// Shared in-memory stand-in for the transaction service
#[derive(Default)]
pub struct InMemoryRegistry {
    data: Mutex<RegistryData>,
}

fn safe_key(chain_id: ChainId, safe: &str) -> (ChainId, String) {
    (chain_id, safe.to_lowercase())
}

impl InMemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deploys an empty Safe on `chain_id`
    pub fn add_safe(&self, chain_id: ChainId, safe: &str) {
        self.data
            .lock()
            .safes
            .entry(safe_key(chain_id, safe))
            .or_default();
    }

    /// Registers a delegate directly, bypassing signature checks
    pub fn seed_delegate(&self, chain_id: ChainId, safe: &str, delegate: Address, label: &str) {
        let safe_address = parse_safe_address(safe).ok();
        self.data
            .lock()
            .safes
            .entry(safe_key(chain_id, safe))
            .or_default()
            .push(SafeDelegateResponse {
                safe: safe_address,
                delegate,
                delegator: Address::ZERO,
                label: label.to_string(),
                expiry_date: None,
            });
    }

    pub fn delegates(&self, chain_id: ChainId, safe: &str) -> Vec<Address> {
        self.data
            .lock()
            .safes
            .get(&safe_key(chain_id, safe))
            .map(|list| list.iter().map(|d| d.delegate).collect())
            .unwrap_or_default()
    }

    /// Makes the next call of `kind` fail with `error`
    pub fn fail_next(&self, kind: CallKind, error: DelegateError) {
        self.data
            .lock()
            .failures
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Delays every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.data.lock().latency = Some(latency);
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.data.lock().calls.clone()
    }

    pub fn call_kinds(&self) -> Vec<CallKind> {
        self.data.lock().calls.iter().map(RegistryCall::kind).collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.data
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        self.data.lock().calls.clear();
    }

    /// Records the call and pops an injected failure for it, if any
    async fn enter(&self, call: RegistryCall) -> Result<(), DelegateError> {
        let kind = call.kind();
        let latency = {
            let mut data = self.data.lock();
            data.calls.push(call);
            data.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .data
            .lock()
            .failures
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Client view of the in-memory registry for one chain
pub struct InMemoryClient {
    registry: Arc<InMemoryRegistry>,
    chain_id: ChainId,
}

/// Signs like the HTTP client does and verifies like the service on `chain_id`
async fn check_authorization(
    signer: &crate::signer::DelegateSigner,
    chain_id: ChainId,
    delegate: Address,
    delegator: Address,
) -> Result<(), DelegateError> {
    let totp = current_totp();
    let signature = signer.sign_delegate(delegate, chain_id, totp).await?;
    let hash = delegate_signing_hash(delegate, chain_id, totp);
    let recovered = signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| DelegateError::Unauthorized(e.to_string()))?;
    if recovered != delegator {
        return Err(DelegateError::Unauthorized(format!(
            "signature by {recovered} does not match delegator {delegator}"
        )));
    }
    Ok(())
}

#[async_trait]
impl RegistryClient for InMemoryClient {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn get_safe_info(&self, safe_address: &str) -> Result<SafeInfo, DelegateError> {
        self.registry
            .enter(RegistryCall::SafeInfo {
                chain_id: self.chain_id,
                safe: safe_address.to_string(),
            })
            .await?;

        let known = self
            .registry
            .data
            .lock()
            .safes
            .contains_key(&safe_key(self.chain_id, safe_address));
        if !known {
            return Err(DelegateError::SafeNotFound(safe_address.to_string()));
        }

        Ok(SafeInfo {
            address: parse_safe_address(safe_address)?,
            nonce: 0,
            threshold: 1,
            owners: Vec::new(),
            master_copy: None,
            modules: Vec::new(),
            fallback_handler: None,
            guard: None,
            version: Some("1.4.1".to_string()),
        })
    }

    async fn get_safe_delegates(
        &self,
        props: &GetSafeDelegateProps,
    ) -> Result<SafeDelegateListResponse, DelegateError> {
        self.registry
            .enter(RegistryCall::ListDelegates {
                chain_id: self.chain_id,
                safe: props.safe_address.clone(),
            })
            .await?;

        let results = self
            .registry
            .data
            .lock()
            .safes
            .get(&safe_key(self.chain_id, &props.safe_address))
            .cloned()
            .unwrap_or_default();

        Ok(SafeDelegateListResponse {
            count: results.len() as u64,
            next: None,
            previous: None,
            results,
        })
    }

    async fn add_safe_delegate(
        &self,
        props: AddSafeDelegateProps<'_>,
    ) -> Result<SafeDelegateResponse, DelegateError> {
        self.registry
            .enter(RegistryCall::AddDelegate {
                chain_id: self.chain_id,
                safe: props.safe_address.clone(),
                delegate: props.delegate_address,
                delegator: props.delegator_address,
                label: props.label.clone(),
            })
            .await?;

        check_authorization(
            props.signer,
            self.chain_id,
            props.delegate_address,
            props.delegator_address,
        )
        .await?;

        let response = SafeDelegateResponse {
            safe: parse_safe_address(&props.safe_address).ok(),
            delegate: props.delegate_address,
            delegator: props.delegator_address,
            label: props.label,
            expiry_date: None,
        };

        let mut data = self.registry.data.lock();
        let list = data
            .safes
            .get_mut(&safe_key(self.chain_id, &props.safe_address))
            .ok_or_else(|| DelegateError::ValidationError("Safe does not exist".to_string()))?;
        list.retain(|d| d.delegate != response.delegate);
        list.push(response.clone());

        Ok(response)
    }

    async fn remove_safe_delegate(
        &self,
        props: RemoveSafeDelegateProps<'_>,
    ) -> Result<(), DelegateError> {
        self.registry
            .enter(RegistryCall::RemoveDelegate {
                chain_id: self.chain_id,
                delegate: props.delegate_address,
                delegator: props.delegator_address,
            })
            .await?;

        check_authorization(
            props.signer,
            self.chain_id,
            props.delegate_address,
            props.delegator_address,
        )
        .await?;

        let mut data = self.registry.data.lock();
        let mut removed = false;
        for ((chain_id, _), list) in data.safes.iter_mut() {
            if *chain_id != self.chain_id {
                continue;
            }
            let before = list.len();
            list.retain(|d| d.delegate != props.delegate_address);
            removed |= list.len() != before;
        }

        if removed {
            Ok(())
        } else {
            Err(DelegateError::NotFound(format!(
                "delegate {}",
                props.delegate_address
            )))
        }
    }
}

/// Factory handing out clients of one shared in-memory registry.
///
/// Chains listed in `unsupported` behave like chains without a service.
#[derive(Clone)]
pub struct InMemoryFactory {
    registry: Arc<InMemoryRegistry>,
    unsupported: Vec<ChainId>,
}

impl InMemoryFactory {
    pub fn new(registry: Arc<InMemoryRegistry>) -> Self {
        Self {
            registry,
            unsupported: Vec::new(),
        }
    }

    pub fn without_chain(mut self, chain_id: ChainId) -> Self {
        self.unsupported.push(chain_id);
        self
    }
}

struct UnsupportedClient(ChainId);

#[async_trait]
impl RegistryClient for UnsupportedClient {
    fn chain_id(&self) -> ChainId {
        self.0
    }

    async fn get_safe_info(&self, _: &str) -> Result<SafeInfo, DelegateError> {
        Err(DelegateError::UnsupportedChain(self.0))
    }

    async fn get_safe_delegates(
        &self,
        _: &GetSafeDelegateProps,
    ) -> Result<SafeDelegateListResponse, DelegateError> {
        Err(DelegateError::UnsupportedChain(self.0))
    }

    async fn add_safe_delegate(
        &self,
        _: AddSafeDelegateProps<'_>,
    ) -> Result<SafeDelegateResponse, DelegateError> {
        Err(DelegateError::UnsupportedChain(self.0))
    }

    async fn remove_safe_delegate(&self, _: RemoveSafeDelegateProps<'_>) -> Result<(), DelegateError> {
        Err(DelegateError::UnsupportedChain(self.0))
    }
}

impl RegistryClientFactory for InMemoryFactory {
    fn client_for(&self, chain_id: ChainId) -> Arc<dyn RegistryClient> {
        if self.unsupported.contains(&chain_id) {
            return Arc::new(UnsupportedClient(chain_id));
        }
        Arc::new(InMemoryClient {
            registry: Arc::clone(&self.registry),
            chain_id,
        })
    }
}

/// Wallet backed by a fresh random key on `chain_id`
pub fn local_wallet(chain_id: ChainId) -> WalletHandle {
    LocalKeyTransport::new(PrivateKeySigner::random(), chain_id)
        .into_wallet(Some(ChainDescriptor::new(chain_id, format!("chain-{chain_id}"))))
}

/// Wallet whose account has not been exposed yet
pub fn locked_wallet(chain_id: ChainId) -> WalletHandle {
    let mut wallet = local_wallet(chain_id);
    wallet.account = None;
    wallet
}
