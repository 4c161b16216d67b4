//! SSE subscribe route — opens a user's push connection.
//!
//! The handler registers a push channel for the authenticated user (closing
//! any previous connection on this instance), emits an initial `connect`
//! event so proxies flush the response, and keeps the stream alive with
//! periodic comment frames. A disconnect guard unregisters the channel when
//! the client goes away; a reaper task bounds the connection lifetime so
//! clients re-establish periodically.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use teamup_notify::channel::PushChannel;
use teamup_notify::registry::ConnectionRegistry;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications/stream", get(subscribe))
}

/// GET /api/notifications/stream — long-lived push connection for the
/// authenticated user.
async fn subscribe(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = auth.user_id;
    let (channel, receiver) = PushChannel::new(Duration::from_millis(state.config.send_timeout_ms));
    let channel_id = channel.id();

    state.registry.register(user_id, channel);
    tracing::info!(user_id = %user_id, channel_id = %channel_id, "Push connection opened");

    // Bound the connection lifetime; expiry closes the stream and the client
    // reconnects.
    let ttl = Duration::from_secs(state.config.sse_connection_ttl_secs);
    let reaper = state.registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        if reaper.unregister_channel(user_id, channel_id) {
            tracing::debug!(user_id = %user_id, channel_id = %channel_id, "Push connection expired");
        }
    });

    let guard = DisconnectGuard {
        registry: state.registry.clone(),
        user_id,
        channel_id,
    };

    let connected = Event::default().event("connect").data(user_id.to_string());
    let events = ReceiverStream::new(receiver).map(move |payload| {
        let _held = &guard;
        let event = Event::default()
            .event("notification")
            .json_data(&payload)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to serialize push payload");
                Event::default().event("notification").data("{}")
            });
        Ok::<_, Infallible>(event)
    });
    let stream = tokio_stream::once(Ok(connected)).chain(events);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.sse_heartbeat_secs))
            .text("keep-alive"),
    )
}

/// Unregisters the channel when the client's stream is dropped — whether the
/// transport broke or the client closed — unless a newer connection already
/// replaced it.
struct DisconnectGuard {
    registry: Arc<ConnectionRegistry>,
    user_id: Uuid,
    channel_id: Uuid,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.registry.unregister_channel(self.user_id, self.channel_id) {
            tracing::info!(user_id = %self.user_id, channel_id = %self.channel_id, "Push connection closed");
        }
    }
}
