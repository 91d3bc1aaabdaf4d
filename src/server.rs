use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;

use tunnelwatch_adapter_notification::{SECRET_HEADER, Update, callback_press};
use tunnelwatch_application::{MuteAction, MuteChange, WatchError, Watcher};

pub fn router(watcher: Watcher) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/trigger", get(trigger))
        .route("/mute", get(mute))
        .route("/permanent-mute", get(permanent_mute))
        .route("/interactive-callback", post(interactive_callback))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(watcher)
}

#[derive(Debug, Deserialize)]
struct TriggerParams {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MuteParams {
    name: Option<String>,
    action: Option<MuteAction>,
}

fn required_name(name: Option<String>) -> Result<String, Response> {
    match name.map(|name| name.trim().to_string()) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "missing unit name"})),
        )
            .into_response()),
    }
}

fn failure(err: WatchError) -> Response {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "message": err.to_string()})),
    )
        .into_response()
}

fn mute_response(result: Result<MuteChange, WatchError>) -> Response {
    match result {
        Ok(change) => Json(json!({
            "success": true,
            "name": change.name,
            "action": change.action,
            "changed": change.changed,
            "message": change.message,
        }))
        .into_response(),
        Err(err) => failure(err),
    }
}

async fn status(State(watcher): State<Watcher>) -> Response {
    match watcher.status().await {
        Ok(view) => Json(view).into_response(),
        Err(err) => failure(err),
    }
}

async fn trigger(State(watcher): State<Watcher>, Query(params): Query<TriggerParams>) -> Response {
    let name = match required_name(params.name) {
        Ok(name) => name,
        Err(response) => return response,
    };
    match watcher.trigger(&name).await {
        Ok(outcome) => Json(json!({
            "success": outcome.is_success(),
            "message": outcome.summary(),
        }))
        .into_response(),
        Err(err) => failure(err),
    }
}

async fn mute(State(watcher): State<Watcher>, Query(params): Query<MuteParams>) -> Response {
    let name = match required_name(params.name) {
        Ok(name) => name,
        Err(response) => return response,
    };
    let action = params.action.unwrap_or(MuteAction::Mute);
    mute_response(watcher.set_mute(&name, action).await)
}

async fn permanent_mute(
    State(watcher): State<Watcher>,
    Query(params): Query<MuteParams>,
) -> Response {
    let name = match required_name(params.name) {
        Ok(name) => name,
        Err(response) => return response,
    };
    let action = params.action.unwrap_or(MuteAction::Mute);
    mute_response(watcher.set_permanent_mute(&name, action).await)
}

async fn interactive_callback(
    State(watcher): State<Watcher>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if let Some(expected) = watcher.config().webhook_secret.as_deref() {
        if presented.as_deref() != Some(expected) {
            tracing::warn!("webhook secret mismatch");
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(err) => {
            tracing::warn!(error = %err, "undecodable webhook update");
            return (StatusCode::BAD_REQUEST, "invalid update").into_response();
        }
    };
    let Some(press) = callback_press(&update) else {
        tracing::debug!(update_id = update.update_id, "ignoring non-callback update");
        return (StatusCode::OK, "ok").into_response();
    };

    match watcher.handle_callback(press, presented).await {
        Ok(_) => (StatusCode::OK, "ok").into_response(),
        Err(_) => (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
    }
}
