use axum::{routing::get, Router};
use roomcast_core::config::RoomcastConfig;
use roomcast_hub::Hub;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Shared state for the Axum handlers.
pub struct AppState {
    pub config: RoomcastConfig,
    pub hub: Arc<Hub>,
}

/// Assemble the router: the WS upgrade endpoint plus the static demo UI.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    Router::new()
        .route("/ws", get(crate::ws::ws_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
