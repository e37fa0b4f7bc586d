//! HTTP stand-in for the traffic backend, serving the dashboard's wire
//! contract under `/api` from a deterministic in-memory network.

pub mod world;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use streaming::{ControlAction, SignalCommand, STRATEGY_FIELD};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use world::World;

#[derive(Clone, Default)]
pub struct AppState {
    world: Arc<Mutex<World>>,
}

impl AppState {
    pub fn new(world: World) -> Self {
        Self {
            world: Arc::new(Mutex::new(world)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/state", get(get_state))
        .route("/api/metrics", get(get_metrics))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/settings", get(get_settings).post(post_settings))
        .route("/api/control", axum::routing::post(post_control))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let tick = state.world.lock().tick();
    Json(json!({ "status": "ok", "mode": "mock", "tick": tick })).into_response()
}

async fn get_state(State(state): State<AppState>) -> Response {
    let snapshot = state.world.lock().advance();
    Json(snapshot).into_response()
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    Json(state.world.lock().metrics()).into_response()
}

async fn get_dashboard(State(state): State<AppState>) -> Response {
    Json(state.world.lock().summary()).into_response()
}

async fn get_settings(State(state): State<AppState>) -> Response {
    Json(state.world.lock().settings().clone()).into_response()
}

async fn post_settings(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(requested) = body.get(STRATEGY_FIELD).and_then(Value::as_str) else {
        return detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("{STRATEGY_FIELD} must be a string"),
        );
    };
    let Some(strategy) = world::parse_strategy(requested) else {
        warn!("rejected strategy {requested:?}");
        return detail(
            StatusCode::BAD_REQUEST,
            "Invalid strategy. Must be one of: ai, rl, adaptive, manual, rule_based",
        );
    };

    let current = state.world.lock().set_strategy(strategy).clone();
    info!("optimization strategy set to {strategy}");
    Json(json!({ "status": "ok", "current": current })).into_response()
}

async fn post_control(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let action: ControlAction = match serde_json::from_value(body) {
        Ok(action) => action,
        Err(err) => {
            let valid: Vec<_> = SignalCommand::ALL.iter().map(|c| c.as_str()).collect();
            return detail(
                StatusCode::BAD_REQUEST,
                format!("Invalid action ({err}). Must be one of: {}", valid.join(", ")),
            );
        }
    };

    if !state.world.lock().apply(&action) {
        return detail(
            StatusCode::BAD_REQUEST,
            format!("Invalid traffic light ID: {}", action.intersection),
        );
    }
    info!("{} -> {}", action.intersection, action.action);
    Json(action).into_response()
}
