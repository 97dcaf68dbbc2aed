//! Server-Sent-Events view of the local broadcast channel.

use std::convert::Infallible;

use archibus_core::validation::validate_event_type;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::AppResult;
use crate::middleware::identity::CallerIdentity;
use crate::state::AppState;

/// GET /event_bus/stream/{event_type}
///
/// Streams payloads broadcast on the topic from the moment of connection.
/// There is no replay; a listener that falls behind skips what it missed.
pub async fn stream_topic(
    CallerIdentity(caller): CallerIdentity,
    State(state): State<AppState>,
    Path(event_type): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let topic = validate_event_type(&event_type)?.to_string();
    let rx = state.bus.broadcast_channel().subscribe(&topic);

    tracing::info!(caller = %caller, event_type = %topic, "Stream listener attached");

    let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
        Ok(payload) => Some(Ok(Event::default()
            .event(topic.as_str())
            .data(payload.to_string()))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(event_type = %topic, skipped, "Stream listener lagged");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
