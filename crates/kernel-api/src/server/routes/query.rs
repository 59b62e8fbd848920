use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use contracts::{Position, Rect};

use crate::server::{HttpApiError, ObserverHandle};

pub async fn get_world_state(
    State(handle): State<ObserverHandle>,
) -> Result<Json<Value>, HttpApiError> {
    let kernel = handle.snapshot()?;
    let meta = kernel.meta();
    Ok(Json(json!({
        "tick": meta.tick,
        "time_of_day": meta.time_of_day().as_str(),
        "weather": meta.weather.as_str(),
        "width": meta.width,
        "height": meta.height,
    })))
}

pub async fn get_agents(
    State(handle): State<ObserverHandle>,
) -> Result<Json<Value>, HttpApiError> {
    let kernel = handle.snapshot()?;
    let agents: Vec<Value> = kernel.agents().values().map(agent_json).collect();
    Ok(Json(json!({ "agents": agents })))
}

pub async fn get_agent(
    State(handle): State<ObserverHandle>,
    Path(name): Path<String>,
) -> Result<Json<Value>, HttpApiError> {
    let kernel = handle.snapshot()?;
    match kernel.agent(&name) {
        Some(agent) => Ok(Json(agent_json(agent))),
        None => Err(HttpApiError::not_found(format!("no agent named {name}"))),
    }
}

fn agent_json(agent: &contracts::Agent) -> Value {
    json!({
        "name": agent.name,
        "model_id": agent.model_id,
        "position": agent.position,
        "sleeping": agent.sleeping,
        "journeying": agent.is_journeying(),
        "inventory": agent.inventory,
        "known_agents": agent.known_agents,
        "last_turn_tick": agent.last_turn_tick,
    })
}

#[derive(Debug, Deserialize)]
pub struct RectQuery {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

const MAX_RECT_CELLS: i64 = 10_000;

pub async fn get_cells_in_rect(
    State(handle): State<ObserverHandle>,
    Query(query): Query<RectQuery>,
) -> Result<Json<Value>, HttpApiError> {
    if query.max_x < query.min_x || query.max_y < query.min_y {
        return Err(HttpApiError::invalid_query("rect bounds are inverted"));
    }
    let area = (query.max_x - query.min_x + 1) as i64 * (query.max_y - query.min_y + 1) as i64;
    if area > MAX_RECT_CELLS {
        return Err(HttpApiError::invalid_query("rect is too large"));
    }

    let kernel = handle.snapshot()?;
    let rect = Rect {
        min_x: query.min_x,
        min_y: query.min_y,
        max_x: query.max_x,
        max_y: query.max_y,
    };
    let cells: Vec<Value> = kernel
        .cells_in_rect(rect)
        .into_iter()
        .map(|(position, cell)| json!({ "position": position, "cell": cell }))
        .collect();
    Ok(Json(json!({ "cells": cells })))
}

pub async fn get_cell(
    State(handle): State<ObserverHandle>,
    Path((x, y)): Path<(i32, i32)>,
) -> Result<Json<Value>, HttpApiError> {
    let kernel = handle.snapshot()?;
    let position = Position::new(x, y);
    if !position.in_bounds(kernel.meta().width, kernel.meta().height) {
        return Err(HttpApiError::invalid_query("position out of bounds"));
    }
    Ok(Json(json!({
        "position": position,
        "cell": kernel.cell(position),
    })))
}

#[derive(Debug, Deserialize)]
pub struct PositionQuery {
    x: i32,
    y: i32,
}

pub async fn get_objects_at(
    State(handle): State<ObserverHandle>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<Value>, HttpApiError> {
    let kernel = handle.snapshot()?;
    let objects: Vec<Value> = kernel
        .objects_at(Position::new(query.x, query.y))
        .into_iter()
        .map(|object| serde_json::to_value(object).unwrap_or(Value::Null))
        .collect();
    Ok(Json(json!({ "objects": objects })))
}

pub async fn get_conversations(
    State(handle): State<ObserverHandle>,
) -> Result<Json<Value>, HttpApiError> {
    let kernel = handle.snapshot()?;
    let conversations: Vec<Value> = kernel
        .conversations()
        .values()
        .map(|conversation| serde_json::to_value(conversation).unwrap_or(Value::Null))
        .collect();
    Ok(Json(json!({ "conversations": conversations })))
}

pub async fn get_pending_invitations(
    State(handle): State<ObserverHandle>,
) -> Result<Json<Value>, HttpApiError> {
    let kernel = handle.snapshot()?;
    let invitations: Vec<Value> = kernel
        .pending_invitations()
        .into_iter()
        .map(|invitation| serde_json::to_value(invitation).unwrap_or(Value::Null))
        .collect();
    Ok(Json(json!({ "invitations": invitations })))
}

#[derive(Debug, Deserialize)]
pub struct TailQuery {
    #[serde(default = "default_tail")]
    n: usize,
}

fn default_tail() -> usize {
    100
}

/// Audit-log tail for humans; the engine itself never reads the log.
pub async fn get_events_tail(
    State(handle): State<ObserverHandle>,
    Query(query): Query<TailQuery>,
) -> Result<Json<Value>, HttpApiError> {
    let events = handle
        .event_log()
        .tail(query.n.min(1000))
        .map_err(HttpApiError::from_storage)?;
    Ok(Json(json!({ "events": events })))
}
