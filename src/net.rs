//! HTTP transport: `GET /stream` for listeners, `POST /controller` for
//! commands.

use crate::{error::CommandError, station::Station};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio::net::TcpListener;

#[derive(Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

pub fn router(station: Station) -> Router {
    Router::new()
        .route("/stream", get(handle_stream))
        .route("/controller", post(handle_command))
        .with_state(station)
}

/// Serves until Ctrl-C.
pub async fn start(station: Station) -> Result<()> {
    let addr = station.config().stream.listen_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Server is running on {}", listener.local_addr()?);

    axum::serve(listener, router(station))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
            }
        })
        .await?;

    Ok(())
}

async fn handle_stream(State(station): State<Station>) -> Response {
    // The listener unsubscribes itself when the body is dropped
    let listener = station.subscribe().map(Ok::<_, Infallible>);

    (
        [(header::CONTENT_TYPE, "audio/mpeg")],
        Body::from_stream(listener),
    )
        .into_response()
}

async fn handle_command(
    State(station): State<Station>,
    request: Result<Json<CommandRequest>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected command request: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(json!({ "error": rejection.body_text() })),
            );
        }
    };

    match station.handle_command(&request.command).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "result": "Ok" }))),
        Err(e) => {
            warn!("Command {:?} failed: {e}", request.command);
            (status_code(&e), Json(json!({ "error": e.to_string() })))
        }
    }
}

fn status_code(error: &CommandError) -> StatusCode {
    match error {
        CommandError::EffectNotFound(_) => StatusCode::NOT_FOUND,
        CommandError::UnknownCommand(_) => StatusCode::BAD_REQUEST,
        CommandError::NotPlaying => StatusCode::CONFLICT,
        CommandError::SourceOpen { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
