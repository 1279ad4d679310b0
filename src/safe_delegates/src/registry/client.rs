use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    AddSafeDelegateProps, ChainId, GetSafeDelegateProps, RegistryClient, RemoveSafeDelegateProps,
    SafeDelegateListResponse, SafeDelegateResponse, SafeInfo,
};
use crate::errors::DelegateError;
use crate::signer::{current_totp, encode_signature};
use crate::utils::address_utils::{parse_safe_address, validate_label};

/// Upper bound on followed `next` links when listing delegates
const MAX_DELEGATE_PAGES: usize = 100;

/// HTTP client for one chain's Safe Transaction Service.
///
/// Constructing a client performs no I/O. A client without a base URL fails
/// every call with [`DelegateError::UnsupportedChain`].
#[derive(Debug, Clone)]
pub struct TransactionServiceClient {
    http: reqwest::Client,
    chain_id: ChainId,
    base_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddDelegateBody {
    safe: String,
    delegate: String,
    delegator: String,
    label: String,
    signature: String,
}

#[derive(Debug, Serialize)]
struct RemoveDelegateBody {
    delegator: String,
    signature: String,
}

impl TransactionServiceClient {
    pub fn new(http: reqwest::Client, chain_id: ChainId, base_url: Option<String>) -> Self {
        Self {
            http,
            chain_id,
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn endpoint(&self, path: &str) -> Result<String, DelegateError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(DelegateError::UnsupportedChain(self.chain_id))?;
        Ok(format!("{base}{path}"))
    }
}

/// Maps a non-success response onto the error taxonomy
async fn check_status(
    response: reqwest::Response,
    not_found: impl FnOnce(String) -> DelegateError,
) -> Result<reqwest::Response, DelegateError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(match status {
        StatusCode::NOT_FOUND => not_found(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DelegateError::Unauthorized(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            DelegateError::ValidationError(body)
        }
        _ => DelegateError::NetworkError(format!("service returned {status}: {body}")),
    })
}

#[async_trait]
impl RegistryClient for TransactionServiceClient {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn get_safe_info(&self, safe_address: &str) -> Result<SafeInfo, DelegateError> {
        let url = self.endpoint("")?;
        let safe = parse_safe_address(safe_address)?;
        let url = format!("{url}/api/v1/safes/{}/", safe.to_checksum(None));
        debug!(%url, "fetching Safe info");

        let response = self.http.get(&url).send().await?;
        let response = check_status(response, |_| {
            DelegateError::SafeNotFound(safe_address.to_string())
        })
        .await?;

        Ok(response.json().await?)
    }

    async fn get_safe_delegates(
        &self,
        props: &GetSafeDelegateProps,
    ) -> Result<SafeDelegateListResponse, DelegateError> {
        let url = self.endpoint("/api/v2/delegates/")?;
        let safe = parse_safe_address(&props.safe_address)?;
        debug!(%url, safe = %safe, "listing delegates");

        let mut request = self
            .http
            .get(&url)
            .query(&[("safe", safe.to_checksum(None))]);
        let mut listing = SafeDelegateListResponse::default();

        // The service pages results; `next` is an absolute URL to the following page
        for page in 0..MAX_DELEGATE_PAGES {
            let response = check_status(request.send().await?, |_| {
                DelegateError::SafeNotFound(props.safe_address.clone())
            })
            .await?;
            let mut body: SafeDelegateListResponse = response.json().await?;

            if page == 0 {
                listing.count = body.count;
            }
            listing.results.append(&mut body.results);

            match body.next {
                Some(next) => {
                    debug!(%next, "fetching next delegate page");
                    request = self.http.get(&next);
                }
                None => return Ok(listing),
            }
        }

        warn!(
            safe = %safe,
            pages = MAX_DELEGATE_PAGES,
            "delegate listing truncated"
        );
        Ok(listing)
    }

    async fn add_safe_delegate(
        &self,
        props: AddSafeDelegateProps<'_>,
    ) -> Result<SafeDelegateResponse, DelegateError> {
        let url = self.endpoint("/api/v2/delegates/")?;
        let safe = parse_safe_address(&props.safe_address)?;
        let label = validate_label(&props.label)?;

        let signature = props
            .signer
            .sign_delegate(props.delegate_address, self.chain_id, current_totp())
            .await?;

        let body = AddDelegateBody {
            safe: safe.to_checksum(None),
            delegate: props.delegate_address.to_checksum(None),
            delegator: props.delegator_address.to_checksum(None),
            label: label.clone(),
            signature: encode_signature(&signature),
        };
        debug!(%url, ?body, "adding delegate");

        let response = self.http.post(&url).json(&body).send().await?;
        let response = check_status(response, DelegateError::NotFound).await?;

        // Older deployments acknowledge with an empty body
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(SafeDelegateResponse {
                safe: Some(safe),
                delegate: props.delegate_address,
                delegator: props.delegator_address,
                label,
                expiry_date: None,
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| DelegateError::NetworkError(format!("malformed response: {e}")))
    }

    async fn remove_safe_delegate(
        &self,
        props: RemoveSafeDelegateProps<'_>,
    ) -> Result<(), DelegateError> {
        let url = self.endpoint(&format!(
            "/api/v2/delegates/{}/",
            props.delegate_address.to_checksum(None)
        ))?;

        let signature = props
            .signer
            .sign_delegate(props.delegate_address, self.chain_id, current_totp())
            .await?;

        let body = RemoveDelegateBody {
            delegator: props.delegator_address.to_checksum(None),
            signature: encode_signature(&signature),
        };
        debug!(%url, ?body, "removing delegate");

        let response = self.http.delete(&url).json(&body).send().await?;
        check_status(response, DelegateError::NotFound).await?;

        Ok(())
    }
}
