// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! HTTP client for the collection mover service

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use collection_mover_types::{
    CollectionMetadata, CollectionOutput, CompanyBatchOutput, CompanyId, JobRecord,
    MoveAllPayload, MoveCompanyPayload, MoveCompanyResponse, MoveJobResponse,
    MoveSelectedPayload, ProgressEvent,
};

use crate::sse::SseDecoder;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid base URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of a server-side rejection, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Progress events of one job, ending after its terminal event.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProgressEvent, ClientError>> + Send>>;

/// Collection mover API client
#[derive(Clone, Debug)]
pub struct MoverClient {
    client: Client,
    base_url: Url,
}

impl MoverClient {
    /// Create a client for the service at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(base_url, Client::builder().build()?)
    }

    /// Create a client that shares an existing `reqwest::Client`.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self, ClientError> {
        let invalid = |reason: &str| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if parsed.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path"));
        }

        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn paged(mut url: Url, offset: u64, limit: u64) -> Url {
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let response = self.client.get(url).send().await?;
        decode(check_status(response).await?).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.client.post(url).json(body).send().await?;
        decode(check_status(response).await?).await
    }

    // ------------------------------------------------------------------------
    // Collections and companies
    // ------------------------------------------------------------------------

    pub async fn list_collections(&self) -> Result<Vec<CollectionMetadata>, ClientError> {
        self.get_json(self.endpoint(&["collections"])?).await
    }

    pub async fn get_collection(
        &self,
        collection_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<CollectionOutput, ClientError> {
        let url = self.endpoint(&["collections", collection_id])?;
        self.get_json(Self::paged(url, offset, limit)).await
    }

    pub async fn list_companies(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<CompanyBatchOutput, ClientError> {
        let url = self.endpoint(&["companies"])?;
        self.get_json(Self::paged(url, offset, limit)).await
    }

    // ------------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------------

    /// Move one company synchronously.
    pub async fn move_company(
        &self,
        company_id: CompanyId,
        source_collection: &str,
        target_collection: &str,
    ) -> Result<MoveCompanyResponse, ClientError> {
        let payload = MoveCompanyPayload {
            company_id,
            source_collection: source_collection.to_string(),
            target_collection: target_collection.to_string(),
        };
        self.post_json(self.endpoint(&["companies", "move"])?, &payload)
            .await
    }

    /// Start a job moving the given companies.
    pub async fn move_selected(
        &self,
        source_collection: &str,
        target_collection: &str,
        company_ids: &[CompanyId],
    ) -> Result<MoveJobResponse, ClientError> {
        let payload = MoveSelectedPayload {
            company_ids: company_ids.to_vec(),
            source_collection: source_collection.to_string(),
            target_collection: target_collection.to_string(),
        };
        self.post_json(self.endpoint(&["companies", "move-selected"])?, &payload)
            .await
    }

    /// Start a job moving every company of the source collection.
    pub async fn move_all(
        &self,
        source_collection: &str,
        target_collection: &str,
    ) -> Result<MoveJobResponse, ClientError> {
        let payload = MoveAllPayload {
            source_collection: source_collection.to_string(),
            target_collection: target_collection.to_string(),
        };
        self.post_json(self.endpoint(&["companies", "move-all"])?, &payload)
            .await
    }

    // ------------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------------

    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>, ClientError> {
        self.get_json(self.endpoint(&["jobs"])?).await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<JobRecord, ClientError> {
        self.get_json(self.endpoint(&["jobs", job_id])?).await
    }

    /// Subscribe to a job's status stream.
    ///
    /// The first event is the job's state at subscription time. The stream
    /// ends after the terminal event or when the server closes it.
    pub async fn subscribe_job_status(&self, job_id: &str) -> Result<EventStream, ClientError> {
        let url = self.endpoint(&["companies", "job-status", job_id])?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        tracing::debug!(job_id = %job_id, "Subscribed to job status");
        Ok(decode_event_stream(response.bytes_stream()))
    }

    /// Raw Prometheus exposition text.
    pub async fn metrics(&self) -> Result<String, ClientError> {
        let response = self.client.get(self.endpoint(&["metrics"])?).send().await?;
        Ok(check_status(response).await?.text().await?)
    }
}

/// Turn non-success responses into [`ClientError::Status`], keeping the
/// server's error message when the body carries one.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or(body);

    tracing::debug!(status = %status, message = %message, "Request rejected");
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

struct DecodeState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<ProgressEvent>,
    finished: bool,
}

/// Decode a `text/event-stream` body into progress events.
///
/// Nothing is yielded after the first terminal event or the first error.
pub fn decode_event_stream<S, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError>,
{
    let state = DecodeState {
        body: Box::pin(body.map(|chunk| chunk.map_err(Into::into))),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_terminal() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                    Ok(events) => state.pending.extend(events),
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => state.finished = true,
            }
        }
    }))
}
