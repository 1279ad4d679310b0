use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::client::TransactionServiceClient;
use super::endpoints::transaction_service_url;
use super::{ChainId, RegistryClient};
use crate::config::DelegatesConfig;
use crate::errors::DelegateError;

/// Produces chain-scoped registry clients.
///
/// `client_for` must be cheap and free of side effects: the engine calls it
/// once per operation instead of caching clients.
pub trait RegistryClientFactory: Send + Sync {
    fn client_for(&self, chain_id: ChainId) -> Arc<dyn RegistryClient>;
}

impl<F: RegistryClientFactory + ?Sized> RegistryClientFactory for Arc<F> {
    fn client_for(&self, chain_id: ChainId) -> Arc<dyn RegistryClient> {
        (**self).client_for(chain_id)
    }
}

/// Factory for [`TransactionServiceClient`]s.
///
/// Endpoint overrides take precedence over the hosted service table.
#[derive(Debug, Clone)]
pub struct TransactionServiceFactory {
    http: reqwest::Client,
    overrides: HashMap<ChainId, Url>,
}

impl TransactionServiceFactory {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            overrides: HashMap::new(),
        }
    }

    /// Builds the factory from configuration, validating endpoint overrides
    pub fn from_config(config: &DelegatesConfig) -> Result<Self, DelegateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(DelegateError::from)?;

        let mut factory = Self::new(http);
        for endpoint in &config.service {
            let url = Url::parse(&endpoint.url).map_err(|e| {
                DelegateError::ValidationError(format!(
                    "invalid service URL for chain {}: {e}",
                    endpoint.chain_id
                ))
            })?;
            factory = factory.with_endpoint(endpoint.chain_id, url);
        }
        Ok(factory)
    }

    pub fn with_endpoint(mut self, chain_id: ChainId, url: Url) -> Self {
        self.overrides.insert(chain_id, url);
        self
    }

    /// Base URL used for `chain_id`, if any
    pub fn endpoint_for(&self, chain_id: ChainId) -> Option<String> {
        self.overrides
            .get(&chain_id)
            .map(|url| url.as_str().to_string())
            .or_else(|| transaction_service_url(chain_id).map(str::to_string))
    }
}

impl Default for TransactionServiceFactory {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl RegistryClientFactory for TransactionServiceFactory {
    fn client_for(&self, chain_id: ChainId) -> Arc<dyn RegistryClient> {
        Arc::new(TransactionServiceClient::new(
            self.http.clone(),
            chain_id,
            self.endpoint_for(chain_id),
        ))
    }
}
