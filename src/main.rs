//! Clueso 재생 동기화 서버

mod config;
mod handlers;
mod protocol;
mod state;
mod sync;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use config::Config;
use futures::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage, UserIdentity};
use serde::Deserialize;
use state::AppState;
use std::sync::Arc;
use sync::Transport;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::new(config.clone()));

    // 빈 세션 정리 스케줄러
    let cleanup_state = state.clone();
    let cleanup_every = config.session.cleanup_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(cleanup_every));
        loop {
            interval.tick().await;
            handlers::cleanup_idle_sessions(cleanup_state.clone()).await;
        }
    });

    // 라우터 설정
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/videos/:video_id/playback", get(playback_state_handler))
        .route("/ws", get(ws_handler))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Clueso playback sync server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);
    tracing::info!(
        control_policy = ?state.sync.settings().control_policy,
        "Playback control policy"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// CORS 설정 (`*` 이면 전체 허용)
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Clueso Playback Sync Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "clueso-playback-sync",
        "connections": state.hub.len(),
        "timestamp": sync::now_ms() / 1000
    }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<sync::SyncStats> {
    Json(state.sync.get_stats())
}

/// 영상 세션의 공개 재생 상태 (세션이 없으면 404)
async fn playback_state_handler(
    Path(video_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<protocol::PlaybackSnapshot>, StatusCode> {
    state
        .sync
        .get_public_playback_state(&video_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// 업그레이드 요청에 실린 사용자 정보
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectQuery {
    user_id: Option<String>,
    username: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: ConnectQuery) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // 연결 처리
    let (connection_id, user) =
        handlers::handle_connection(state.clone(), tx, query.user_id, query.username).await;

    // 송신 태스크
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::error!(error = %err, "Failed to serialize server message"),
            }
        }
    });

    // 수신 처리
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &connection_id, &user, msg).await,
                Err(err) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %err,
                        "Malformed client message"
                    );
                    state.hub.emit(
                        &connection_id,
                        ServerMessage::error("invalid_message", err.to_string()),
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // 연결 해제
    handlers::handle_disconnect(state, &connection_id).await;
    send_task.abort();
}

async fn handle_client_message(
    state: &Arc<AppState>,
    connection_id: &str,
    user: &UserIdentity,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Heartbeat => {
            handlers::handle_heartbeat(state, connection_id);
        }
        ClientMessage::JoinVideo {
            video_id,
            video_metadata,
        } => {
            handlers::handle_join_video(
                state.clone(),
                connection_id,
                user,
                &video_id,
                video_metadata,
            )
            .await;
        }
        ClientMessage::LeaveVideo => {
            handlers::handle_leave_video(state.clone(), connection_id).await;
        }
        ClientMessage::GetState => {
            handlers::handle_get_state(state.clone(), connection_id).await;
        }
        ClientMessage::PlaybackControl(request) => {
            handlers::handle_playback_control(state.clone(), connection_id, &request).await;
        }
        ClientMessage::GrantControl { user_id } => {
            handlers::handle_grant_control(state.clone(), connection_id, user, &user_id).await;
        }
        ClientMessage::UpdateUserState { is_muted, volume } => {
            handlers::handle_update_user_state(state.clone(), connection_id, is_muted, volume)
                .await;
        }
    }
}
