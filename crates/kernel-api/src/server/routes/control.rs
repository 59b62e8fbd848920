use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use contracts::ObserverCommand;

use crate::server::{HttpApiError, ObserverHandle};

/// Accepts one whitelisted observer command and forwards it to the engine
/// loop. The effect is applied before the next tick's invitation-expiry
/// phase; commands never overwrite prior events.
pub async fn submit_command(
    State(handle): State<ObserverHandle>,
    Json(command): Json<ObserverCommand>,
) -> Result<Json<Value>, HttpApiError> {
    if let ObserverCommand::SkipTurns { turns, .. } = &command {
        if *turns == 0 {
            return Err(HttpApiError::invalid_query("skip_turns requires turns >= 1"));
        }
    }
    handle.send_command(command)?;
    Ok(Json(json!({ "accepted": true })))
}
