//! Delivery endpoints.
//!
//! Both endpoints run the dispatcher to completion before answering, so the
//! status code tells the sender whether to redeliver:
//!
//! - 200 OK: verified; the body lists each worker's task or error
//! - 202 Accepted: not a GitHub delivery (missing headers)
//! - 400 Bad Request: malformed envelope or payload
//! - 401 Unauthorized: signature mismatch
//! - 500 Internal Server Error: anything else; redelivery may succeed

use std::collections::BTreeMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use super::{AppState, DeliveryHandler};
use crate::dispatch::{InvocationError, MessageOutcome, SkipReason};

/// Response body for a handled delivery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<WorkerSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSummary {
    pub worker_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&MessageOutcome> for DeliverySummary {
    fn from(outcome: &MessageOutcome) -> Self {
        match outcome {
            MessageOutcome::Skipped(SkipReason::MissingHeaders) => DeliverySummary {
                status: "skipped",
                delivery_id: None,
                reason: Some("missing GitHub headers"),
                workers: Vec::new(),
            },
            MessageOutcome::NoManifest { delivery_id } => DeliverySummary {
                status: "no_manifest",
                delivery_id: Some(delivery_id.to_string()),
                reason: None,
                workers: Vec::new(),
            },
            MessageOutcome::Dispatched {
                delivery_id,
                results,
                ..
            } => DeliverySummary {
                status: "dispatched",
                delivery_id: Some(delivery_id.to_string()),
                reason: None,
                workers: results
                    .iter()
                    .map(|r| WorkerSummary {
                        worker_id: r.worker_id.clone(),
                        task_arn: r.result.as_ref().ok().cloned(),
                        error: r.result.as_ref().err().map(ToString::to_string),
                    })
                    .collect(),
            },
        }
    }
}

fn outcome_response(outcome: &MessageOutcome) -> Response {
    let status = match outcome {
        MessageOutcome::Dispatched { .. } | MessageOutcome::NoManifest { .. } => StatusCode::OK,
        MessageOutcome::Skipped(_) => StatusCode::ACCEPTED,
    };
    (status, Json(DeliverySummary::from(outcome))).into_response()
}

impl IntoResponse for InvocationError {
    fn into_response(self) -> Response {
        let status = match &self {
            InvocationError::Signature(_) => StatusCode::UNAUTHORIZED,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Delivery failed");
        } else {
            warn!(error = %self, "Delivery rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Header values that are not valid UTF-8 are dropped.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// `POST /webhook`: a delivery straight from GitHub.
pub async fn webhook_handler<D: DeliveryHandler>(
    State(app_state): State<AppState<D>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, InvocationError> {
    let headers = header_map(&headers);
    let mut dispatcher = app_state.dispatcher().lock().await;
    let outcome = dispatcher.handle_delivery(&body, &headers).await?;
    Ok(outcome_response(&outcome))
}

/// `POST /events`: a relayed envelope.
pub async fn events_handler<D: DeliveryHandler>(
    State(app_state): State<AppState<D>>,
    body: String,
) -> Result<Response, InvocationError> {
    let mut dispatcher = app_state.dispatcher().lock().await;
    let outcome = dispatcher.handle_envelope(&body).await?;
    Ok(outcome_response(&outcome))
}
