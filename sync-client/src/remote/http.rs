//! HTTP/JSON remote store client.
//!
//! Talks to the shared document service over a small REST surface:
//!
//! | Operation | Request |
//! |---|---|
//! | batch write | `POST {base}/collections/{c}/batch` |
//! | get | `GET {base}/collections/{c}/documents/{id}` |
//! | page | `GET {base}/collections/{c}/documents?after_updated_at=&after_id=&limit=` |
//! | tombstones | `GET {base}/collections/{c}/tombstones?deleted_before=&limit=` |
//! | hard delete | `POST {base}/collections/{c}/purge` |
//! | health | `GET {base}/health` |

use std::time::Duration;

use async_trait::async_trait;
use casesync_types::{EntityType, PullCursor, RecordId, RemoteDocument, Timestamp, WriteOp};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{RemoteStore, DEFAULT_BATCH_CEILING};
use crate::error::RemoteError;

/// HTTP remote store configuration.
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    /// Base URL of the document service.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum ops per atomic batch.
    pub batch_ceiling: usize,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            api_token: None,
            timeout: Duration::from_secs(30),
            batch_ceiling: DEFAULT_BATCH_CEILING,
        }
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    ops: &'a [WriteOp],
}

#[derive(Serialize)]
struct PurgeRequest<'a> {
    ids: &'a [RecordId],
}

#[derive(Deserialize)]
struct PageResponse {
    documents: Vec<RemoteDocument>,
}

#[derive(Deserialize)]
struct TombstonesResponse {
    ids: Vec<RecordId>,
}

#[derive(Deserialize)]
struct PurgeResponse {
    deleted: u64,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    id: Option<RecordId>,
}

/// Remote store reached over HTTP.
pub struct HttpRemoteStore {
    config: HttpRemoteConfig,
    base: Url,
    http: reqwest::Client,
}

impl HttpRemoteStore {
    /// Create a new client.
    pub fn new(config: HttpRemoteConfig) -> Result<Self, RemoteError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(config.base_url.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(Self { config, base, http })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Build the URL for a collection endpoint.
    ///
    /// Each segment is percent-encoded on its own, so record ids may
    /// contain `/`, `?` or `#`.
    pub fn collection_url(&self, entity: EntityType, segments: &[&str]) -> Result<Url, RemoteError> {
        self.endpoint(["collections", entity.collection()].iter().chain(segments))
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a &'a str>) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorize(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(classify(response).await)
    }
}

/// Map an unsuccessful response to an error.
async fn classify(response: Response) -> RemoteError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_else(|_| ErrorBody {
        error: text.clone(),
        id: None,
    });
    status_error(status, body.error, body.id)
}

fn status_error(status: StatusCode, reason: String, id: Option<RecordId>) -> RemoteError {
    let reason = if reason.is_empty() {
        status.to_string()
    } else {
        reason
    };
    match status {
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => RemoteError::Conflict { id, reason },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RemoteError::Timeout,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Unavailable(reason),
        s if s.is_server_error() => RemoteError::Unavailable(reason),
        _ => RemoteError::Rejected { reason },
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn batch_write(&self, entity: EntityType, ops: &[WriteOp]) -> Result<(), RemoteError> {
        if ops.len() > self.config.batch_ceiling {
            return Err(RemoteError::Rejected {
                reason: format!(
                    "batch of {} ops exceeds ceiling {}",
                    ops.len(),
                    self.config.batch_ceiling
                ),
            });
        }
        let url = self.collection_url(entity, &["batch"])?;
        self.send(self.http.post(url).json(&BatchRequest { ops }))
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<Option<RemoteDocument>, RemoteError> {
        let url = self.collection_url(entity, &["documents", id.as_str()])?;
        let response = self.authorize(self.http.get(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            _ => Err(classify(response).await),
        }
    }

    async fn query_page(
        &self,
        entity: EntityType,
        after: Option<&PullCursor>,
        limit: usize,
    ) -> Result<Vec<RemoteDocument>, RemoteError> {
        let url = self.collection_url(entity, &["documents"])?;
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = after {
            query.push(("after_updated_at", cursor.updated_at.to_string()));
            query.push(("after_id", cursor.id.to_string()));
        }
        let response = self.send(self.http.get(url).query(&query)).await?;
        let page: PageResponse = response.json().await?;
        Ok(page.documents)
    }

    async fn query_tombstones_before(
        &self,
        entity: EntityType,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<RecordId>, RemoteError> {
        let url = self.collection_url(entity, &["tombstones"])?;
        let query = [
            ("deleted_before", cutoff.to_string()),
            ("limit", limit.to_string()),
        ];
        let response = self.send(self.http.get(url).query(&query)).await?;
        let tombstones: TombstonesResponse = response.json().await?;
        Ok(tombstones.ids)
    }

    async fn delete_hard(&self, entity: EntityType, ids: &[RecordId]) -> Result<u64, RemoteError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let url = self.collection_url(entity, &["purge"])?;
        let response = self
            .send(self.http.post(url).json(&PurgeRequest { ids }))
            .await?;
        let purged: PurgeResponse = response.json().await?;
        Ok(purged.deleted)
    }

    async fn health(&self) -> Result<(), RemoteError> {
        let url = self.endpoint(&["health"])?;
        self.send(self.http.get(url)).await?;
        Ok(())
    }

    fn batch_ceiling(&self) -> usize {
        self.config.batch_ceiling
    }
}
