use std::sync::Arc;

use archibus_events::EventBusService;

use crate::auth::IdentityVerifier;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The event bus: stores, broadcast channel, dispatcher and audit.
    pub bus: Arc<EventBusService>,
    /// Policy behind the service-identity gate.
    pub identity: Arc<dyn IdentityVerifier>,
    /// Database pool, when running on PostgreSQL storage.
    pub pool: Option<archibus_db::DbPool>,
}
