//! Client for an slskd-style peer network REST API.
//!
//! Implements [`CandidateSource`] (`/api/v0/searches`) and [`TransferBackend`]
//! (`/api/v0/transfers/downloads/{username}`). Requests go through libcurl on
//! blocking threads and authenticate with `X-API-Key` when a key is configured.

mod http;
mod wire;

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::PeerConfig;
use crate::matching::Candidate;
use crate::retry::DownloadError;
use crate::source::CandidateSource;
use crate::transfer::{TransferBackend, TransferHandle, TransferProgress, TransferState};

use http::{HttpResponse, Method};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PeerApiClient {
    base: Url,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl PeerApiClient {
    pub fn new(cfg: &PeerConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid peer.base_url {:?}", cfg.base_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("peer.base_url {:?} cannot be used as a base URL", cfg.base_url);
        }
        Ok(Self {
            base,
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            poll_interval: cfg.poll_interval(),
        })
    }

    /// Base URL + `api/v0/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, DownloadError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DownloadError::PeerUnavailable("peer API URL has no path".into()))?
            .pop_if_empty()
            .extend(["api", "v0"])
            .extend(segments);
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, DownloadError> {
        let url = self.endpoint(segments)?;
        let api_key = self.api_key.clone();
        tracing::trace!(?method, url = %url, "peer API request");
        tokio::task::spawn_blocking(move || {
            http::request(
                method,
                url.as_str(),
                api_key.as_deref(),
                body.as_deref(),
                REQUEST_TIMEOUT,
            )
        })
        .await
        .map_err(|e| DownloadError::PeerUnavailable(format!("request task failed: {e}")))?
        .map_err(|e| DownloadError::PeerUnavailable(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, DownloadError> {
        let resp = self.call(Method::Get, segments, None).await?;
        if !resp.is_success() {
            return Err(DownloadError::PeerUnavailable(format!(
                "GET {} returned HTTP {}",
                segments.join("/"),
                resp.code
            )));
        }
        decode(&resp)
    }

    async fn user_transfers(&self, username: &str) -> Result<Option<wire::UserTransfers>, DownloadError> {
        let resp = self
            .call(Method::Get, &["transfers", "downloads", username], None)
            .await?;
        match resp.code {
            404 => Ok(None),
            code if (200..300).contains(&code) => decode(&resp).map(Some),
            code => Err(DownloadError::TransferInterrupted(format!(
                "transfer list for {username} returned HTTP {code}"
            ))),
        }
    }
}

fn decode<T: DeserializeOwned>(resp: &HttpResponse) -> Result<T, DownloadError> {
    serde_json::from_slice(&resp.body)
        .map_err(|e| DownloadError::PeerUnavailable(format!("invalid peer API response: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DownloadError> {
    serde_json::to_vec(value).map_err(|e| DownloadError::PeerUnavailable(format!("encode request: {e}")))
}

#[async_trait]
impl CandidateSource for PeerApiClient {
    async fn search(&self, query: &str, timeout: Duration) -> Result<Vec<Candidate>, DownloadError> {
        let id = uuid::Uuid::new_v4().to_string();
        let body = to_json(&wire::SearchRequest {
            id: &id,
            search_text: query,
            search_timeout: timeout.as_millis() as u64,
        })?;
        let resp = self.call(Method::Post, &["searches"], Some(body)).await?;
        if !resp.is_success() {
            return Err(DownloadError::PeerUnavailable(format!(
                "search request returned HTTP {}",
                resp.code
            )));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let state: wire::SearchState = self.get_json(&["searches", id.as_str()]).await?;
            if state.is_complete {
                tracing::debug!(search_id = %id, state = %state.state, "search complete");
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(search_id = %id, "search deadline reached; using partial results");
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        let responses: Vec<wire::SearchResponse> =
            self.get_json(&["searches", id.as_str(), "responses"]).await?;
        Ok(wire::candidates(responses))
    }
}

#[async_trait]
impl TransferBackend for PeerApiClient {
    async fn start_transfer(&self, candidate: &Candidate) -> Result<TransferHandle, DownloadError> {
        let body = to_json(&[wire::DownloadRequest {
            filename: &candidate.filename,
            size: candidate.size,
        }])?;
        let resp = self
            .call(
                Method::Post,
                &["transfers", "downloads", candidate.peer.as_str()],
                Some(body),
            )
            .await?;
        if !resp.is_success() {
            return Err(DownloadError::TransferInterrupted(format!(
                "{} refused the download (HTTP {})",
                candidate.peer, resp.code
            )));
        }
        Ok(TransferHandle {
            peer: candidate.peer.clone(),
            filename: candidate.filename.clone(),
            id: None,
        })
    }

    async fn poll(&self, handle: &TransferHandle) -> Result<TransferProgress, DownloadError> {
        let transfers = self.user_transfers(&handle.peer).await?;
        match transfers.as_ref().and_then(|t| t.find(&handle.filename)) {
            Some(transfer) => Ok(transfer.progress()),
            // Not listed yet: the peer API registers new downloads asynchronously.
            None => Ok(TransferProgress {
                progress: 0,
                speed: None,
                eta: None,
                state: TransferState::Queued,
            }),
        }
    }

    async fn cancel(&self, handle: &TransferHandle) -> Result<(), DownloadError> {
        let transfer_id = match &handle.id {
            Some(id) => id.clone(),
            None => {
                let transfers = self.user_transfers(&handle.peer).await?;
                match transfers.as_ref().and_then(|t| t.find(&handle.filename)) {
                    Some(t) => t.id.clone(),
                    None => return Ok(()),
                }
            }
        };
        let resp = self
            .call(
                Method::Delete,
                &["transfers", "downloads", handle.peer.as_str(), transfer_id.as_str()],
                None,
            )
            .await?;
        if !resp.is_success() && resp.code != 404 {
            return Err(DownloadError::PeerUnavailable(format!(
                "cancel returned HTTP {}",
                resp.code
            )));
        }
        Ok(())
    }
}
