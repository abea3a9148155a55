//! Control endpoints.
//!
//! Enqueue endpoints answer `202 Accepted` with the queued task; the work
//! itself runs on the scheduler.

use crate::queue::TaskRecord;
use crate::worker::Worker;
use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use casesync_client::QuarantinedRecord;
use casesync_types::{EntityType, RecordId};
use std::sync::Arc;

/// Error response of the control endpoints.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        tracing::error!("control request failed: {}", error);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

type Accepted = (StatusCode, Json<TaskRecord>);

fn accepted(task: TaskRecord) -> Accepted {
    (StatusCode::ACCEPTED, Json(task))
}

fn entity(collection: &str) -> Result<EntityType, ApiError> {
    collection
        .parse()
        .map_err(|_| ApiError::not_found(format!("unknown collection: {collection}")))
}

/// `GET /tasks`
pub async fn list_tasks(
    Extension(worker): Extension<Arc<Worker>>,
) -> Result<Json<Vec<TaskRecord>>, ApiError> {
    worker.queue().list().await.map(Json).map_err(ApiError::internal)
}

/// `DELETE /tasks/:name`
pub async fn cancel_task(
    Extension(worker): Extension<Arc<Worker>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    match worker.scheduler().cancel(&name).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::not_found(format!("no task named {name}"))),
        Err(e) => Err(ApiError::internal(e)),
    }
}

/// `POST /sync`
pub async fn sync_all(Extension(worker): Extension<Arc<Worker>>) -> Result<Accepted, ApiError> {
    let task = worker
        .coordinator()
        .enqueue_sync_all_now()
        .await
        .map_err(ApiError::internal)?;
    Ok(accepted(task))
}

/// `POST /sync/push`
pub async fn push_all(Extension(worker): Extension<Arc<Worker>>) -> Result<Accepted, ApiError> {
    let task = worker
        .coordinator()
        .enqueue_push_all_now()
        .await
        .map_err(ApiError::internal)?;
    Ok(accepted(task))
}

/// `POST /sync/pull`
pub async fn pull_all(Extension(worker): Extension<Arc<Worker>>) -> Result<Accepted, ApiError> {
    let task = worker
        .coordinator()
        .enqueue_pull_all_now()
        .await
        .map_err(ApiError::internal)?;
    Ok(accepted(task))
}

/// `POST /sync/push/:collection`
pub async fn push_one(
    Extension(worker): Extension<Arc<Worker>>,
    Path(collection): Path<String>,
) -> Result<Accepted, ApiError> {
    let task = worker
        .coordinator()
        .enqueue_push_now(entity(&collection)?)
        .await
        .map_err(ApiError::internal)?;
    Ok(accepted(task))
}

/// `POST /sync/pull/:collection`
pub async fn pull_one(
    Extension(worker): Extension<Arc<Worker>>,
    Path(collection): Path<String>,
) -> Result<Accepted, ApiError> {
    let task = worker
        .coordinator()
        .enqueue_pull_now(entity(&collection)?)
        .await
        .map_err(ApiError::internal)?;
    Ok(accepted(task))
}

/// `POST /network/:state` with `online` or `offline`.
pub async fn set_network(
    Extension(worker): Extension<Arc<Worker>>,
    Path(state): Path<String>,
) -> Result<StatusCode, ApiError> {
    let online = match state.as_str() {
        "online" => true,
        "offline" => false,
        other => return Err(ApiError::bad_request(format!("unknown network state: {other}"))),
    };
    worker.network().set_online(online);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /quarantine/:collection`
pub async fn list_quarantine(
    Extension(worker): Extension<Arc<Worker>>,
    Path(collection): Path<String>,
) -> Result<Json<Vec<QuarantinedRecord>>, ApiError> {
    let entity = entity(&collection)?;
    worker
        .engine()
        .local()
        .list_quarantined(entity)
        .await
        .map(Json)
        .map_err(ApiError::internal)
}

/// `POST /quarantine/:collection/:id/release`
pub async fn release_quarantine(
    Extension(worker): Extension<Arc<Worker>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let entity = entity(&collection)?;
    let id = RecordId::new(id).map_err(|e| ApiError::bad_request(e.to_string()))?;
    match worker.engine().local().release_quarantine(entity, &id).await {
        Ok(true) => {
            tracing::info!(collection = %entity, id = %id, "record released from quarantine");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(ApiError::not_found(format!("{id} is not quarantined"))),
        Err(e) => Err(ApiError::internal(e)),
    }
}
