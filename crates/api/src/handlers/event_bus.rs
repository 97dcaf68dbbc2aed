//! Handlers for the event bus HTTP surface.
//!
//! Mutating endpoints take [`CallerIdentity`] first, so unidentified
//! callers are rejected before the body is even parsed.

use archibus_core::error::CoreError;
use archibus_events::{PublishRequest, SubscribeRequest, UnsubscribeRequest};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::extract::AppJson;
use crate::middleware::identity::CallerIdentity;
use crate::query::PaginationParams;
use crate::response::{DataResponse, PublishedResponse, UnsubscribedResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// POST /event_bus/publish
///
/// Persist and fan out an event. Succeeds once the event is durable,
/// regardless of how its deliveries go.
pub async fn publish(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    AppJson(input): AppJson<PublishRequest>,
) -> AppResult<impl IntoResponse> {
    let event = state.bus.publish(&caller, input).await?;

    Ok(Json(PublishedResponse {
        status: "published",
        event_id: event.event_id,
    }))
}

/// POST /event_bus/subscribe
pub async fn subscribe(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    AppJson(input): AppJson<SubscribeRequest>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.bus.subscribe(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// POST /event_bus/unsubscribe
///
/// Unknown ids are not an error.
pub async fn unsubscribe(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    AppJson(input): AppJson<UnsubscribeRequest>,
) -> AppResult<impl IntoResponse> {
    state.bus.unsubscribe(&caller, &input.id).await?;
    Ok(Json(UnsubscribedResponse {
        status: "unsubscribed",
    }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /event_bus/subscriptions
pub async fn list_subscriptions(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let subscriptions = state.bus.list_subscriptions().await?;
    Ok(Json(DataResponse {
        data: subscriptions,
    }))
}

/// GET /event_bus/events/{event_id}
///
/// Every stored row with this id; ids are not deduplicated.
pub async fn get_event(
    CallerIdentity(_caller): CallerIdentity,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let events = state.bus.find_events(&event_id).await?;
    if events.is_empty() {
        return Err(CoreError::NotFound {
            entity: "Event",
            id: event_id,
        }
        .into());
    }
    Ok(Json(DataResponse { data: events }))
}

/// GET /event_bus/events/{event_id}/deliveries
pub async fn list_event_deliveries(
    CallerIdentity(_caller): CallerIdentity,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let deliveries = state.bus.list_deliveries(&event_id).await?;
    Ok(Json(DataResponse { data: deliveries }))
}

/// GET /event_bus/dead_letters?limit=&offset=
pub async fn list_dead_letters(
    CallerIdentity(_caller): CallerIdentity,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<impl IntoResponse> {
    let (limit, offset) = params.clamped();
    let deliveries = state.bus.list_dead_letters(limit, offset).await?;
    Ok(Json(DataResponse { data: deliveries }))
}
