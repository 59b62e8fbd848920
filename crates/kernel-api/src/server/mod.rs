use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

mod error;
mod routes;
mod state;

pub use error::{HttpApiError, ServerError};
pub use state::ObserverHandle;

use routes::control::submit_command;
use routes::query::{
    get_agent, get_agents, get_cell, get_cells_in_rect, get_conversations, get_events_tail,
    get_objects_at, get_pending_invitations, get_world_state,
};

/// Serves the observer API: side-effect-free queries against the storage
/// reader plus the whitelisted command set. Commands are forwarded to the
/// engine loop and applied before the next tick.
pub async fn serve(addr: SocketAddr, handle: ObserverHandle) -> Result<(), ServerError> {
    let app = router(handle);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(handle: ObserverHandle) -> Router {
    Router::new()
        .route("/api/v1/world", get(get_world_state))
        .route("/api/v1/agents", get(get_agents))
        .route("/api/v1/agents/{name}", get(get_agent))
        .route("/api/v1/cells", get(get_cells_in_rect))
        .route("/api/v1/cells/{x}/{y}", get(get_cell))
        .route("/api/v1/objects", get(get_objects_at))
        .route("/api/v1/conversations", get(get_conversations))
        .route("/api/v1/invitations", get(get_pending_invitations))
        .route("/api/v1/events/tail", get(get_events_tail))
        .route("/api/v1/commands", post(submit_command))
        .with_state(handle)
}
