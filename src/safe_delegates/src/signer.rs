//! Signer adapter
//!
//! Turns a connected wallet into a [`DelegateSigner`] able to authorize
//! delegate mutations against the Safe Transaction Service. The service
//! expects an EIP-712 signature over `Delegate(address delegateAddress,uint256 totp)`
//! where `totp` is the current unix hour.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolStruct, sol};
use async_trait::async_trait;
use tracing::debug;

use crate::errors::DelegateError;
use crate::registry::ChainId;
use crate::session::{ChainDescriptor, Session, WalletHandle};

/// EIP-712 domain name used by the Safe Transaction Service
pub const DELEGATE_DOMAIN_NAME: &str = "Safe Transactions Service";

/// EIP-712 domain version used by the Safe Transaction Service
pub const DELEGATE_DOMAIN_VERSION: &str = "1.0";

/// Width of a TOTP window in seconds
const TOTP_PERIOD_SECS: u64 = 3600;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Delegate {
        address delegateAddress;
        uint256 totp;
    }
}

/// Transport of the connected wallet.
///
/// Implementations forward requests to whatever holds the account's key.
#[async_trait]
pub trait WalletTransport: Send + Sync {
    /// Chain the wallet is currently connected to
    async fn chain_id(&self) -> Result<ChainId, DelegateError>;

    /// Sign a 32-byte digest with the key of `account`
    async fn sign_hash(&self, account: Address, hash: B256) -> Result<Signature, DelegateError>;
}

/// Network the provider is bound to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub chain_id: Option<ChainId>,
    pub name: Option<String>,
    pub ens_address: Option<Address>,
}

impl NetworkDescriptor {
    /// Builds the descriptor from wallet chain metadata, falling back to the
    /// session's chain id when the wallet reports no chain.
    pub fn from_wallet(chain: Option<&ChainDescriptor>, session_chain: Option<ChainId>) -> Self {
        match chain {
            Some(chain) => Self {
                chain_id: Some(chain.id),
                name: Some(chain.name.clone()),
                ens_address: chain.ens_registry,
            },
            None => Self {
                chain_id: session_chain,
                ..Self::default()
            },
        }
    }
}

/// Wallet transport bound to a resolved network
#[derive(Clone)]
pub struct WalletProvider {
    transport: Arc<dyn WalletTransport>,
    chain_id: ChainId,
    network: NetworkDescriptor,
}

impl WalletProvider {
    /// Binds the transport to `network`, asking the transport for its chain
    /// when the descriptor does not name one.
    pub async fn connect(
        transport: Arc<dyn WalletTransport>,
        network: NetworkDescriptor,
    ) -> Result<Self, DelegateError> {
        let chain_id = match network.chain_id {
            Some(chain_id) => chain_id,
            None => transport
                .chain_id()
                .await
                .map_err(|e| DelegateError::SigningError(format!("chain lookup failed: {e}")))?,
        };

        debug!(chain_id, name = ?network.name, "bound wallet provider");

        Ok(Self {
            transport,
            chain_id,
            network,
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }
}

/// Signing identity for delegate mutations.
///
/// Valid for the lifetime of the wallet handle it was derived from; derive a
/// new one for every mutation.
#[derive(Clone)]
pub struct DelegateSigner {
    provider: WalletProvider,
    address: Address,
}

impl DelegateSigner {
    pub fn new(provider: WalletProvider, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> ChainId {
        self.provider.chain_id()
    }

    pub fn provider(&self) -> &WalletProvider {
        &self.provider
    }

    /// Signs the delegate authorization for `delegate` in the given TOTP window.
    ///
    /// `chain_id` is the chain of the service that verifies the signature,
    /// which may differ from the wallet's own chain while it is switching.
    pub async fn sign_delegate(
        &self,
        delegate: Address,
        chain_id: ChainId,
        totp: u64,
    ) -> Result<Signature, DelegateError> {
        if chain_id != self.chain_id() {
            debug!(
                wallet_chain = self.chain_id(),
                chain_id, "signing for a chain other than the wallet's"
            );
        }
        let hash = delegate_signing_hash(delegate, chain_id, totp);
        self.provider
            .transport
            .sign_hash(self.address, hash)
            .await
    }
}

impl std::fmt::Debug for DelegateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateSigner")
            .field("address", &self.address)
            .field("chain_id", &self.provider.chain_id)
            .finish()
    }
}

/// Derives a signer from the wallet handle.
///
/// Returns `Ok(None)` while the wallet has no account yet; callers abort the
/// operation without reporting an error to the user.
pub async fn derive_signer(
    session: &Session,
    wallet: &WalletHandle,
) -> Result<Option<DelegateSigner>, DelegateError> {
    let Some(account) = wallet.account else {
        return Ok(None);
    };

    let network = NetworkDescriptor::from_wallet(wallet.chain.as_ref(), session.chain_id);
    let provider = WalletProvider::connect(Arc::clone(&wallet.transport), network).await?;

    Ok(Some(DelegateSigner::new(provider, account)))
}

/// EIP-712 domain for delegate authorizations on `chain_id`
pub fn delegate_domain(chain_id: ChainId) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(DELEGATE_DOMAIN_NAME)),
        Some(Cow::Borrowed(DELEGATE_DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        None,
        None,
    )
}

/// Digest the wallet signs to authorize a delegate mutation
pub fn delegate_signing_hash(delegate: Address, chain_id: ChainId, totp: u64) -> B256 {
    let message = Delegate {
        delegateAddress: delegate,
        totp: U256::from(totp),
    };
    message.eip712_signing_hash(&delegate_domain(chain_id))
}

/// TOTP window for the given instant
pub fn totp_at(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / TOTP_PERIOD_SECS)
        .unwrap_or_default()
}

/// TOTP window for the current time
pub fn current_totp() -> u64 {
    totp_at(SystemTime::now())
}

/// `0x`-prefixed `r || s || v` encoding expected by the service
pub fn encode_signature(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}

/// Wallet transport backed by a local private key
pub struct LocalKeyTransport {
    signer: PrivateKeySigner,
    chain_id: ChainId,
}

impl LocalKeyTransport {
    pub fn new(signer: PrivateKeySigner, chain_id: ChainId) -> Self {
        Self { signer, chain_id }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Builds a complete wallet handle around this key
    pub fn into_wallet(self, chain: Option<ChainDescriptor>) -> WalletHandle {
        let account = self.address();
        WalletHandle::new(Some(account), chain, Arc::new(self))
    }
}

#[async_trait]
impl WalletTransport for LocalKeyTransport {
    async fn chain_id(&self) -> Result<ChainId, DelegateError> {
        Ok(self.chain_id)
    }

    async fn sign_hash(&self, account: Address, hash: B256) -> Result<Signature, DelegateError> {
        if account != self.signer.address() {
            return Err(DelegateError::SigningError(format!(
                "no key for account {account}"
            )));
        }
        self.signer
            .sign_hash_sync(&hash)
            .map_err(|e| DelegateError::SigningError(e.to_string()))
    }
}
