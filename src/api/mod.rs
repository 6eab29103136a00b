//! Remote control API: REST command/snapshot endpoints plus a
//! WebSocket channel pushing periodic snapshots.
//!
//! Every mutation funnels through the scheduler's command channel, the
//! same path the terminal dashboard uses, so both front-ends always see
//! and produce identical state transitions.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::scheduler::{Command, Scheduler};

const WS_PUSH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize, Default)]
struct LogsQuery {
    logs_job_id: Option<i64>,
    logs_offset: Option<usize>,
    logs_limit: Option<usize>,
}

impl LogsQuery {
    /// `logs_job_id < 0` means "no log slice", mirroring the wire
    /// convention of external pollers.
    fn job(&self) -> Option<usize> {
        self.logs_job_id
            .and_then(|id| usize::try_from(id).ok())
    }
}

pub fn router(scheduler: Scheduler) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/{job_id}", get(get_job_handler))
        .route("/jobs/{job_id}/pause", post(pause_handler))
        .route("/jobs/{job_id}/start", post(start_handler))
        .route("/jobs/{job_id}/kill", post(kill_handler))
        .route("/jobs/{job_id}/open", post(open_handler))
        .route("/shutdown", post(shutdown_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(scheduler)
}

/// Serve the control API until `cancel` fires.
pub async fn run_api(addr: SocketAddr, scheduler: Scheduler, cancel: CancellationToken) {
    let app = router(scheduler);

    tracing::info!(addr = %addr, "Starting control API");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind control API");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Control API server failed");
    }
}

async fn status_handler(
    State(scheduler): State<Scheduler>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let snapshot = scheduler
        .snapshot(query.job(), query.logs_offset, query.logs_limit)
        .await;
    Json(snapshot)
}

/// Job list without any log payload, kept light for frequent polling.
async fn list_jobs_handler(State(scheduler): State<Scheduler>) -> impl IntoResponse {
    Json(scheduler.snapshot(None, None, None).await)
}

async fn get_job_handler(
    State(scheduler): State<Scheduler>,
    Path(job_id): Path<usize>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let snapshot = scheduler
        .snapshot(Some(job_id), query.logs_offset, query.logs_limit)
        .await;
    Json(snapshot)
}

fn ok(message: &str, job_id: usize) -> Json<Value> {
    Json(json!({ "ok": true, "message": message, "job_id": job_id }))
}

async fn pause_handler(
    State(scheduler): State<Scheduler>,
    Path(job_id): Path<usize>,
) -> impl IntoResponse {
    scheduler.send(Command::Pause { job: job_id }).await;
    ok("pause requested", job_id)
}

async fn start_handler(
    State(scheduler): State<Scheduler>,
    Path(job_id): Path<usize>,
) -> impl IntoResponse {
    scheduler.send(Command::Start { job: job_id }).await;
    ok("start/resume requested", job_id)
}

async fn kill_handler(
    State(scheduler): State<Scheduler>,
    Path(job_id): Path<usize>,
) -> impl IntoResponse {
    scheduler.send(Command::Kill { job: job_id }).await;
    ok("kill/cancel requested", job_id)
}

async fn open_handler(
    State(scheduler): State<Scheduler>,
    Path(job_id): Path<usize>,
) -> impl IntoResponse {
    scheduler.send(Command::OpenPath { job: job_id }).await;
    ok("open requested", job_id)
}

async fn shutdown_handler(State(scheduler): State<Scheduler>) -> impl IntoResponse {
    scheduler.send(Command::Shutdown).await;
    Json(json!({ "ok": true, "message": "shutdown requested" }))
}

async fn ws_handler(State(scheduler): State<Scheduler>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, scheduler))
}

async fn ws_session(mut socket: WebSocket, scheduler: Scheduler) {
    if send_snapshot(&mut socket, &scheduler).await.is_err() {
        return;
    }

    let mut push = tokio::time::interval(WS_PUSH_INTERVAL);
    loop {
        tokio::select! {
            _ = push.tick() => {
                if send_snapshot(&mut socket, &scheduler).await.is_err() {
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_ws_message(&mut socket, &scheduler, text.as_str())
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send_snapshot(socket: &mut WebSocket, scheduler: &Scheduler) -> Result<(), axum::Error> {
    // Periodic pushes stay lightweight: no log payload.
    let snapshot = scheduler.snapshot(None, None, None).await;
    let payload = json!({ "type": "snapshot", "data": snapshot }).to_string();
    socket.send(Message::Text(payload.into())).await
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    let payload = json!({ "type": "error", "message": message }).to_string();
    socket.send(Message::Text(payload.into())).await
}

/// Dispatch one client message. The protocol mirrors the REST surface:
/// `snapshot`, `command` (`select|pause|start|kill|open|theme_next|shutdown`),
/// `logs` (`scroll|home|end`), and `set` (`logs_height`).
async fn handle_ws_message(
    socket: &mut WebSocket,
    scheduler: &Scheduler,
    text: &str,
) -> Result<(), axum::Error> {
    let Ok(msg) = serde_json::from_str::<Value>(text) else {
        return send_error(socket, "invalid JSON").await;
    };

    match msg.get("type").and_then(Value::as_str) {
        Some("snapshot") => send_snapshot(socket, scheduler).await,
        Some("command") => {
            let name = msg.get("name").and_then(Value::as_str).unwrap_or_default();
            let job_id = msg.get("job_id").and_then(Value::as_u64).map(|id| id as usize);
            let command = match (name, job_id) {
                ("select", Some(job)) => Command::Select { job },
                ("pause", Some(job)) => Command::Pause { job },
                ("start", Some(job)) => Command::Start { job },
                ("kill", Some(job)) => Command::Kill { job },
                ("open", Some(job)) => Command::OpenPath { job },
                ("theme_next", _) => Command::ThemeNext,
                ("shutdown", _) => Command::Shutdown,
                ("select" | "pause" | "start" | "kill" | "open", None) => {
                    return send_error(socket, "job_id is required").await;
                }
                _ => return send_error(socket, &format!("unknown command: {name}")).await,
            };
            scheduler.send(command).await;
            send_snapshot(socket, scheduler).await
        }
        Some("logs") => {
            let name = msg.get("name").and_then(Value::as_str).unwrap_or_default();
            let Some(job) = msg.get("job_id").and_then(Value::as_u64).map(|id| id as usize)
            else {
                return send_error(socket, "job_id is required").await;
            };
            let command = match name {
                "scroll" => {
                    let delta = msg.get("delta").and_then(Value::as_i64).unwrap_or(0);
                    Command::LogsScroll { job, delta }
                }
                "home" => Command::LogsHome { job },
                "end" => Command::LogsEnd { job },
                _ => return send_error(socket, &format!("unknown logs op: {name}")).await,
            };
            scheduler.send(command).await;
            Ok(())
        }
        Some("set") => {
            if let Some(height) = msg.get("logs_height").and_then(Value::as_u64) {
                scheduler
                    .send(Command::SetLogsHeight {
                        height: height.min(u16::MAX as u64) as u16,
                    })
                    .await;
            }
            Ok(())
        }
        _ => send_error(socket, "unknown message type").await,
    }
}
