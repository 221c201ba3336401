//! `GET /api/v1/subscriptions`: the events the deployed workers listen to.
//!
//! Provisioning uses this to configure which events the event source
//! forwards. An undeployed manifest yields an empty list.

use axum::Json;
use axum::extract::State;

use super::{AppState, DeliveryHandler};
use crate::dispatch::InvocationError;
use crate::routing::{Subscription, collect_subscriptions};

pub async fn subscriptions_handler<D: DeliveryHandler>(
    State(app_state): State<AppState<D>>,
) -> Result<Json<Vec<Subscription>>, InvocationError> {
    let manifest = app_state.dispatcher().lock().await.manifest()?;
    Ok(Json(
        manifest
            .map(|m| collect_subscriptions(&m))
            .unwrap_or_default(),
    ))
}
