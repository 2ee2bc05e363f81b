use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub queue_tx: mpsc::Sender<String>,
}

/// Serve the executor API on `listener`. Accepted test ids come out of the
/// returned receiver; at most `capacity` may wait there.
pub fn start_server(listener: TcpListener, capacity: usize) -> mpsc::Receiver<String> {
    let (queue_tx, queue_rx) = mpsc::channel::<String>(capacity.max(1));
    let state = Arc::new(AppState { queue_tx });

    let app = Router::new()
        .route("/execute/{id}", post(execute_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    if let Ok(addr) = listener.local_addr() {
        info!("Executor API running at http://{}", addr);
    }

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Executor API stopped: {}", e);
        }
    });

    queue_rx
}

async fn execute_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    info!("[Web] POST /execute/{}", id);
    match state.queue_tx.try_send(id.clone()) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "accepted": id }))),
        Err(TrySendError::Full(_)) => {
            warn!("Execution queue full, refusing test {}", id);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Execution queue is full" })),
            )
        }
        Err(TrySendError::Closed(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Executor is shutting down" })),
        ),
    }
}
