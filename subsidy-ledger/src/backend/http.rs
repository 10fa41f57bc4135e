//! HTTP relayer ledger client.
//!
//! Talks to a transaction relayer that fronts the claim contract:
//!
//! - `POST {base}/programs/{programId}/enrollments` → `{"txHash"}`
//! - `POST {base}/claims` with `{"programId","metadataHash"}` → `{"claimId","txHash"}`
//! - `GET  {base}/claims/{claimId}` → `{"metadataHash"}` (404 when unknown)
//!
//! The relayer waits for transaction inclusion before responding.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use subsidy_core::MetadataHash;

use crate::traits::*;

/// Relayer-backed ledger client.
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    network: String,
    request_timeout: Duration,
}

impl HttpLedgerClient {
    /// Create a new relayer client.
    ///
    /// `request_timeout` bounds each HTTP exchange; the reconciler applies
    /// its own timeout on top.
    pub fn new(
        base_url: impl Into<String>,
        network: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            network: network.into(),
            request_timeout,
        })
    }

    /// Build authorization header if API key is set.
    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Base URL plus path segments, each percent-encoded.
    fn segment_url(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| LedgerError::Unavailable(format!("invalid relayer URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| LedgerError::Unavailable(format!("relayer URL {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_header() {
            Some(auth) => request.header(header::AUTHORIZATION, auth),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, LedgerError> {
        self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout {
                    after_ms: self.request_timeout.as_millis() as u64,
                }
            } else {
                LedgerError::Network(e.to_string())
            }
        })
    }
}

/// Enrollment response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollmentResponse {
    tx_hash: String,
}

/// Claim submission request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitClaimRequest<'a> {
    program_id: &'a str,
    metadata_hash: &'a str,
}

/// Stored commitment response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitmentResponse {
    metadata_hash: String,
}

/// Relayer error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a non-success status to a ledger error.
async fn map_status_error(response: Response) -> LedgerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or(body);

    match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => LedgerError::Unavailable(format!("HTTP {}: {}", status, detail)),
        s if s.is_client_error() => LedgerError::Rejected {
            reason: format!("HTTP {}: {}", status, detail),
        },
        _ => LedgerError::Unavailable(format!("HTTP {}: {}", status, detail)),
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
    response
        .json()
        .await
        .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    fn id(&self) -> &str {
        &self.network
    }

    async fn is_available(&self) -> bool {
        self.send(self.client.get(self.url("/health")))
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn enroll_in_program(&self, program_onchain_id: &str) -> Result<String, LedgerError> {
        let url = self.segment_url(&["programs", program_onchain_id, "enrollments"])?;
        debug!(url = %url, "Submitting enrollment to relayer");

        let response = self.send(self.client.post(url)).await?;
        if !response.status().is_success() {
            return Err(map_status_error(response).await);
        }

        let body: EnrollmentResponse = parse_json(response).await?;
        Ok(body.tx_hash)
    }

    async fn submit_claim(
        &self,
        program_onchain_id: &str,
        metadata_hash: &MetadataHash,
    ) -> Result<ClaimReceipt, LedgerError> {
        let body = SubmitClaimRequest {
            program_id: program_onchain_id,
            metadata_hash: metadata_hash.as_str(),
        };
        debug!(program = %program_onchain_id, hash = %metadata_hash, "Submitting claim to relayer");

        let response = self
            .send(self.client.post(self.url("/claims")).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(map_status_error(response).await);
        }

        let receipt: ClaimReceipt = parse_json(response).await?;
        if receipt.claim_id.is_empty() || receipt.tx_hash.is_empty() {
            return Err(LedgerError::InvalidResponse(
                "relayer returned empty claim identifiers".to_string(),
            ));
        }
        Ok(receipt)
    }

    async fn claim_commitment(
        &self,
        onchain_claim_id: &str,
    ) -> Result<Option<MetadataHash>, LedgerError> {
        let url = self.segment_url(&["claims", onchain_claim_id])?;
        let response = self.send(self.client.get(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(map_status_error(response).await);
        }

        let body: CommitmentResponse = parse_json(response).await?;
        MetadataHash::parse(&body.metadata_hash)
            .map(Some)
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }
}
