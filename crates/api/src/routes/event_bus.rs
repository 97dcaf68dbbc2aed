//! Route definitions for the event bus, mounted at `/event_bus`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{event_bus, stream};
use crate::state::AppState;

/// Event bus routes.
///
/// ```text
/// POST /publish                     publish (identity)
/// POST /subscribe                   subscribe (identity)
/// POST /unsubscribe                 unsubscribe (identity)
/// GET  /subscriptions               list_subscriptions
/// GET  /events/{event_id}           get_event (identity)
/// GET  /events/{event_id}/deliveries list_event_deliveries (identity)
/// GET  /dead_letters                list_dead_letters (identity)
/// GET  /stream/{event_type}         stream_topic, SSE (identity)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/publish", post(event_bus::publish))
        .route("/subscribe", post(event_bus::subscribe))
        .route("/unsubscribe", post(event_bus::unsubscribe))
        .route("/subscriptions", get(event_bus::list_subscriptions))
        .route("/events/{event_id}", get(event_bus::get_event))
        .route(
            "/events/{event_id}/deliveries",
            get(event_bus::list_event_deliveries),
        )
        .route("/dead_letters", get(event_bus::list_dead_letters))
        .route("/stream/{event_type}", get(stream::stream_topic))
}
