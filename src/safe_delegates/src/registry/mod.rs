//! Delegate registry access
//!
//! [`RegistryClient`] is the narrow interface the engine talks to. The
//! production implementation is [`TransactionServiceClient`], an HTTP client
//! for the Safe Transaction Service; [`RegistryClientFactory`] hands out one
//! client per chain.

pub mod client;
pub mod endpoints;
pub mod factory;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DelegateError;
use crate::signer::DelegateSigner;

pub use client::TransactionServiceClient;
pub use endpoints::transaction_service_url;
pub use factory::{RegistryClientFactory, TransactionServiceFactory};

/// Type alias for chain ID to avoid depending on external chain types
pub type ChainId = u64;

/// Safe details as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeInfo {
    pub address: Address,
    #[serde(default, deserialize_with = "nonce_from_any")]
    pub nonce: u64,
    pub threshold: u32,
    pub owners: Vec<Address>,
    #[serde(default)]
    pub master_copy: Option<Address>,
    #[serde(default)]
    pub modules: Vec<Address>,
    #[serde(default)]
    pub fallback_handler: Option<Address>,
    #[serde(default)]
    pub guard: Option<Address>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One delegate entry returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeDelegateResponse {
    #[serde(default)]
    pub safe: Option<Address>,
    pub delegate: Address,
    pub delegator: Address,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

/// Page of delegates for a Safe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeDelegateListResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<SafeDelegateResponse>,
}

/// Delegate as kept in the local view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegateRecord {
    pub delegate: Address,
}

impl From<&SafeDelegateResponse> for DelegateRecord {
    fn from(response: &SafeDelegateResponse) -> Self {
        Self {
            delegate: response.delegate,
        }
    }
}

/// Filter for listing delegates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSafeDelegateProps {
    pub safe_address: String,
}

impl GetSafeDelegateProps {
    pub fn for_safe(safe_address: impl Into<String>) -> Self {
        Self {
            safe_address: safe_address.into(),
        }
    }
}

/// Request to register a delegate for a Safe
#[derive(Debug, Clone)]
pub struct AddSafeDelegateProps<'a> {
    pub safe_address: String,
    pub delegate_address: Address,
    pub delegator_address: Address,
    pub label: String,
    pub signer: &'a DelegateSigner,
}

/// Request to drop a delegate
#[derive(Debug, Clone)]
pub struct RemoveSafeDelegateProps<'a> {
    pub delegate_address: Address,
    pub delegator_address: Address,
    pub signer: &'a DelegateSigner,
}

/// Chain-scoped client for the delegate registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Chain this client is scoped to
    fn chain_id(&self) -> ChainId;

    async fn get_safe_info(&self, safe_address: &str) -> Result<SafeInfo, DelegateError>;

    async fn get_safe_delegates(
        &self,
        props: &GetSafeDelegateProps,
    ) -> Result<SafeDelegateListResponse, DelegateError>;

    async fn add_safe_delegate(
        &self,
        props: AddSafeDelegateProps<'_>,
    ) -> Result<SafeDelegateResponse, DelegateError>;

    async fn remove_safe_delegate(
        &self,
        props: RemoveSafeDelegateProps<'_>,
    ) -> Result<(), DelegateError>;
}

// The service reports the nonce as a number on older deployments and as a
// decimal string on newer ones.
fn nonce_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Nonce {
        Number(u64),
        Text(String),
    }

    match Nonce::deserialize(deserializer)? {
        Nonce::Number(n) => Ok(n),
        Nonce::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
