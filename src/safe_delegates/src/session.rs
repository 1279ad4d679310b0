use std::fmt;
use std::sync::Arc;

use alloy_primitives::Address;

use crate::registry::ChainId;
use crate::signer::WalletTransport;

/// Account and chain reported by the wallet connection.
///
/// Both fields are `None` until the wallet connects and either one drops back
/// to `None` while the wallet disconnects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub address: Option<String>,
    pub chain_id: Option<ChainId>,
}

impl Session {
    pub fn new(address: impl Into<String>, chain_id: ChainId) -> Self {
        Self {
            address: Some(address.into()),
            chain_id: Some(chain_id),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Account and chain, when both are known
    pub fn connected(&self) -> Option<(&str, ChainId)> {
        match (&self.address, self.chain_id) {
            (Some(address), Some(chain_id)) => Some((address.as_str(), chain_id)),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected().is_some()
    }
}

/// Chain metadata carried by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub id: ChainId,
    pub name: String,
    /// ENS registry contract, when the chain has one
    pub ens_registry: Option<Address>,
}

impl ChainDescriptor {
    pub fn new(id: ChainId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ens_registry: None,
        }
    }

    pub fn with_ens_registry(mut self, registry: Address) -> Self {
        self.ens_registry = Some(registry);
        self
    }
}

/// Live handle to the connected wallet.
///
/// Signers derived from a handle are only valid while the handle is.
#[derive(Clone)]
pub struct WalletHandle {
    pub account: Option<Address>,
    pub chain: Option<ChainDescriptor>,
    pub transport: Arc<dyn WalletTransport>,
}

impl WalletHandle {
    pub fn new(
        account: Option<Address>,
        chain: Option<ChainDescriptor>,
        transport: Arc<dyn WalletTransport>,
    ) -> Self {
        Self {
            account,
            chain,
            transport,
        }
    }
}

impl fmt::Debug for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletHandle")
            .field("account", &self.account)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}
