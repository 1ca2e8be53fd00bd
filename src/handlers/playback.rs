//! 재생 세션 핸들러

use crate::protocol::{ControlRequest, ServerMessage, UserIdentity, VideoMetadata};
use crate::state::AppState;
use crate::sync::{PlaybackAction, SyncError, Transport};
use std::sync::Arc;
use std::time::Duration;

/// 영상 세션 참여 처리
pub async fn handle_join_video(
    state: Arc<AppState>,
    connection_id: &str,
    user: &UserIdentity,
    video_id: &str,
    metadata: VideoMetadata,
) {
    let video_id = video_id.trim();
    if video_id.is_empty() {
        reply_error(&state, connection_id, "invalid_video", "videoId must not be empty");
        return;
    }

    state
        .sync
        .join_video_session(video_id, connection_id, user, metadata, &state.hub);
}

/// 영상 세션 나가기 처리
pub async fn handle_leave_video(state: Arc<AppState>, connection_id: &str) {
    state.sync.leave_video_session(connection_id, &state.hub);
}

/// 재생 제어 처리
pub async fn handle_playback_control(
    state: Arc<AppState>,
    connection_id: &str,
    request: &ControlRequest,
) {
    let result = PlaybackAction::try_from(request).and_then(|action| {
        state
            .sync
            .handle_playback_control(connection_id, action, &state.hub)
    });

    match result {
        Ok(_) => {}
        // control_denied 는 서비스가 이미 보냈다
        Err(SyncError::Unauthorized { .. }) => {}
        Err(err) => {
            tracing::warn!(
                connection_id = %connection_id,
                action = %request.action,
                error = %err,
                "Playback control rejected"
            );
            reply_sync_error(&state, connection_id, &err);
        }
    }
}

/// 제어권 양도 처리
pub async fn handle_grant_control(
    state: Arc<AppState>,
    connection_id: &str,
    user: &UserIdentity,
    target_user_id: &str,
) {
    let Some(info) = state.sync.connection(connection_id) else {
        reply_sync_error(
            &state,
            connection_id,
            &SyncError::UnknownConnection(connection_id.to_string()),
        );
        return;
    };

    match state
        .sync
        .grant_control(&info.video_id, target_user_id, &user.user_id)
    {
        Ok(()) => {
            let delivered = state.sync.send_to_user(
                &info.video_id,
                target_user_id,
                &state.hub,
                ServerMessage::ControlGranted {
                    message: format!("{} gave you playback control", user.username),
                    video_id: Some(info.video_id.clone()),
                    granted_by: Some(user.clone()),
                },
            );
            state.hub.emit(
                connection_id,
                ServerMessage::ControlGrantedSuccess {
                    user_id: target_user_id.to_string(),
                },
            );
            tracing::debug!(
                video_id = %info.video_id,
                target = %target_user_id,
                delivered = delivered,
                "Control grant delivered"
            );
        }
        Err(err) => reply_sync_error(&state, connection_id, &err),
    }
}

/// 사용자 음소거/볼륨 변경 처리
pub async fn handle_update_user_state(
    state: Arc<AppState>,
    connection_id: &str,
    is_muted: Option<bool>,
    volume: Option<f64>,
) {
    if let Err(err) = state.sync.update_user_state(connection_id, is_muted, volume) {
        reply_sync_error(&state, connection_id, &err);
    }
}

/// 현재 재생 상태 요청 처리
pub async fn handle_get_state(state: Arc<AppState>, connection_id: &str) {
    match state.sync.playback_state_for(connection_id) {
        Ok(payload) => {
            state
                .hub
                .emit(connection_id, ServerMessage::PlaybackState(payload));
        }
        Err(err) => reply_sync_error(&state, connection_id, &err),
    }
}

/// 참여자 없는 오래된 세션 정리
pub async fn cleanup_idle_sessions(state: Arc<AppState>) {
    let max_age = Duration::from_millis(state.config.session.idle_timeout_ms);
    let deleted = state.sync.cleanup_idle_sessions(max_age);

    if deleted > 0 {
        tracing::info!(deleted_sessions = deleted, "Cleanup completed");
    }
}

fn reply_sync_error(state: &AppState, connection_id: &str, err: &SyncError) {
    reply_error(state, connection_id, err.code(), &err.to_string());
}

fn reply_error(state: &AppState, connection_id: &str, code: &str, message: &str) {
    state
        .hub
        .emit(connection_id, ServerMessage::error(code, message));
}
