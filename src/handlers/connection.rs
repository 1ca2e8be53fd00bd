//! 연결 핸들러

use crate::protocol::{ServerMessage, UserIdentity};
use crate::state::AppState;
use crate::sync::Transport;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// 새 연결 처리
pub async fn handle_connection(
    state: Arc<AppState>,
    sender: UnboundedSender<ServerMessage>,
    user_id: Option<String>,
    username: Option<String>,
) -> (String, UserIdentity) {
    let connection_id = Uuid::new_v4().to_string();
    let user = UserIdentity::new(
        user_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| connection_id.clone()),
        username
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "guest".to_string()),
    );

    state.hub.register(&connection_id, sender);
    state.hub.emit(
        &connection_id,
        ServerMessage::Connected {
            connection_id: connection_id.clone(),
            user_id: user.user_id.clone(),
        },
    );

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.user_id,
        "New connection established"
    );
    (connection_id, user)
}

/// 연결 해제 처리
pub async fn handle_disconnect(state: Arc<AppState>, connection_id: &str) {
    // 남은 시청자에게 알리기 위해 hub 에서 빼기 전에 세션을 떠난다
    state.sync.leave_video_session(connection_id, &state.hub);

    if let Some(session) = state.hub.unregister(connection_id) {
        tracing::info!(
            connection_id = %connection_id,
            duration_secs = session.connected_at.elapsed().as_secs(),
            "Connection closed"
        );
    }

    if state.hub.is_empty() {
        tracing::debug!("No live connections remaining");
    }
}

/// Heartbeat 처리
pub fn handle_heartbeat(state: &AppState, connection_id: &str) {
    state.sync.touch_user(connection_id);
    state.hub.emit(connection_id, ServerMessage::HeartbeatAck);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::protocol::VideoMetadata;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn connection_defaults_identity_and_announces_itself() {
        let state = Arc::new(AppState::new(Config::from_env()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let (connection_id, user) =
            handle_connection(state.clone(), tx, None, Some(" ".to_string())).await;

        assert_eq!(user.user_id, connection_id);
        assert_eq!(user.username, "guest");
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::Connected {
                connection_id: connection_id.clone(),
                user_id: connection_id,
            })
        );
    }

    #[tokio::test]
    async fn disconnect_leaves_session_and_unregisters() {
        let state = Arc::new(AppState::new(Config::from_env()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let (connection_id, user) = handle_connection(
            state.clone(),
            tx,
            Some("u1".to_string()),
            Some("alice".to_string()),
        )
        .await;

        state.sync.join_video_session(
            "v1",
            &connection_id,
            &user,
            VideoMetadata::default(),
            &state.hub,
        );
        assert_eq!(state.hub.len(), 1);

        handle_disconnect(state.clone(), &connection_id).await;

        assert!(state.hub.is_empty());
        assert!(state.sync.get_public_playback_state("v1").is_none());
    }
}
