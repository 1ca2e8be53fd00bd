//! 재생 동기화 서비스
//!
//! 영상별 공유 재생 상태를 메모리에 유지하고, 누가 상태를 바꿀 수 있는지
//! 중재하며, 변경 사항을 세션의 다른 연결들에게 브로드캐스트한다.
//!
//! 락 순서는 항상 `sessions` → `connections` 이다. `connections` 의 참조를
//! 쥔 채로 세션 락을 잡지 않는다.

use super::{now_ms, ConnectionInfo, PlaybackAction, SyncError, Transport, VideoSession};
use crate::config::PlaybackConfig;
use crate::protocol::{
    PlaybackControlEvent, PlaybackSnapshot, PlaybackStatePayload, ServerMessage, UserIdentity,
    UserState, VideoMetadata,
};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

const CONTROL_GRANTED_MESSAGE: &str = "You now have playback control";
const CONTROL_DENIED_MESSAGE: &str = "You do not have permission to control playback";

/// 재생 제어 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// 상태 변경 후 세션 전체에 브로드캐스트
    Broadcast,
    /// 상태만 갱신 (작은 time_update)
    Silent,
}

/// 세션 요약
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub video_id: String,
    pub active_users: usize,
    pub is_playing: bool,
    pub duration: f64,
}

/// 프로세스 전체 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub active_sessions: usize,
    pub total_users: usize,
    pub sessions_with_users: Vec<SessionSummary>,
}

/// 다중 시청자 재생 동기화 코디네이터
pub struct PlaybackSyncService {
    /// 영상 ID -> 재생 세션
    sessions: DashMap<String, VideoSession>,
    /// 연결 ID -> 사용자/영상
    connections: DashMap<String, ConnectionInfo>,
    settings: PlaybackConfig,
}

impl PlaybackSyncService {
    pub fn new(settings: PlaybackConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            connections: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PlaybackConfig {
        &self.settings
    }

    /// 영상 세션 초기화 (이미 있으면 그대로 반환)
    #[allow(dead_code)]
    pub fn initialize_video(&self, video_id: &str, metadata: VideoMetadata) -> PlaybackSnapshot {
        let session = self.sessions.entry(video_id.to_string()).or_insert_with(|| {
            tracing::info!(
                video_id = %video_id,
                duration = metadata.original_duration,
                "Video session initialized"
            );
            VideoSession::new(video_id.to_string(), metadata, now_ms())
        });
        session.snapshot()
    }

    /// 연결을 영상 세션에 참여시킨다
    ///
    /// 세션이 없으면 `metadata` 로 만든다. 생성과 참여가 같은 엔트리 락 안에서
    /// 일어나므로 마지막 leave 와 겹쳐도 메타데이터가 기본값으로 바뀌지 않는다.
    pub fn join_video_session<T: Transport + ?Sized>(
        &self,
        video_id: &str,
        connection_id: &str,
        user: &UserIdentity,
        metadata: VideoMetadata,
        transport: &T,
    ) -> PlaybackSnapshot {
        // 다른 영상에 참여 중이면 먼저 나간다
        let previous = self
            .connections
            .get(connection_id)
            .map(|info| info.video_id.clone());
        if let Some(previous) = previous {
            if previous != video_id {
                self.leave_video_session(connection_id, transport);
            }
        }

        let now = now_ms();
        let mut session = self.sessions.entry(video_id.to_string()).or_insert_with(|| {
            tracing::info!(
                video_id = %video_id,
                duration = metadata.original_duration,
                "Video session created on join"
            );
            VideoSession::new(video_id.to_string(), metadata, now)
        });

        let newly_joined = session.add_connection(connection_id);
        self.connections.insert(
            connection_id.to_string(),
            ConnectionInfo {
                user: user.clone(),
                video_id: video_id.to_string(),
            },
        );

        session
            .user_states
            .entry(user.user_id.clone())
            .or_insert_with(|| UserState::new(now));

        if session.controlled_by.is_none() || session.active_users() == 1 {
            session.set_controller(&user.user_id);
            tracing::info!(
                video_id = %video_id,
                user_id = %user.user_id,
                "Playback control assigned"
            );
        }

        let snapshot = session.snapshot();
        transport.emit(
            connection_id,
            ServerMessage::PlaybackState(PlaybackStatePayload {
                state: snapshot.clone(),
                is_controller: session.is_controller(&user.user_id),
                user_state: session.user_states.get(&user.user_id).cloned(),
            }),
        );

        if newly_joined {
            broadcast_in(
                &session,
                transport,
                ServerMessage::UserJoined {
                    user: user.clone(),
                    active_users: session.active_users(),
                },
                Some(connection_id),
            );
        }

        tracing::info!(
            video_id = %video_id,
            connection_id = %connection_id,
            username = %user.username,
            active_users = session.active_users(),
            "User joined video"
        );

        snapshot
    }

    /// 연결을 세션에서 제거한다. 등록되지 않은 연결이면 아무 것도 하지 않는다
    pub fn leave_video_session<T: Transport + ?Sized>(&self, connection_id: &str, transport: &T) {
        let Some((_, info)) = self.connections.remove(connection_id) else {
            return;
        };
        let ConnectionInfo { user, video_id } = info;

        let remaining = match self.sessions.get_mut(&video_id) {
            Some(mut session) => {
                session.remove_connection(connection_id);

                if session.active_users() == 0 {
                    session.controlled_by = None;
                } else if session.is_controller(&user.user_id) {
                    self.transfer_control(&mut session, transport);
                }

                let remaining = session.active_users();
                broadcast_in(
                    &session,
                    transport,
                    ServerMessage::UserLeft {
                        user: user.clone(),
                        active_users: remaining,
                    },
                    None,
                );
                remaining
            }
            None => 0,
        };

        // 같은 순간 다른 연결이 참여했다면 지우지 않는다
        if remaining == 0
            && self
                .sessions
                .remove_if(&video_id, |_, session| session.connections.is_empty())
                .is_some()
        {
            tracing::info!(video_id = %video_id, "Empty video session removed");
        }

        tracing::info!(
            video_id = %video_id,
            connection_id = %connection_id,
            username = %user.username,
            remaining = remaining,
            "User left video"
        );
    }

    /// 가장 먼저 참여한 남은 연결의 사용자에게 제어권을 넘긴다
    fn transfer_control<T: Transport + ?Sized>(&self, session: &mut VideoSession, transport: &T) {
        let successor = session.connections.iter().find_map(|connection_id| {
            self.connections
                .get(connection_id)
                .map(|info| (connection_id.clone(), info.user.user_id.clone()))
        });

        match successor {
            Some((connection_id, user_id)) => {
                session.set_controller(&user_id);
                transport.emit(
                    &connection_id,
                    ServerMessage::ControlGranted {
                        message: CONTROL_GRANTED_MESSAGE.to_string(),
                        video_id: Some(session.video_id.clone()),
                        granted_by: None,
                    },
                );
                tracing::info!(
                    video_id = %session.video_id,
                    user_id = %user_id,
                    "Playback control transferred"
                );
            }
            None => session.controlled_by = None,
        }
    }

    /// 재생 제어 액션 처리
    pub fn handle_playback_control<T: Transport + ?Sized>(
        &self,
        connection_id: &str,
        action: PlaybackAction,
        transport: &T,
    ) -> Result<ControlOutcome, SyncError> {
        let info = match self.connections.get(connection_id) {
            Some(info) => info.clone(),
            None => {
                tracing::warn!(connection_id = %connection_id, "Unknown connection attempted control");
                return Err(SyncError::UnknownConnection(connection_id.to_string()));
            }
        };

        let Some(mut session) = self.sessions.get_mut(&info.video_id) else {
            tracing::warn!(video_id = %info.video_id, "No playback session for video");
            return Err(SyncError::SessionNotFound(info.video_id));
        };

        if !self.can_control_playback(&info.user.user_id, &session) {
            tracing::warn!(
                video_id = %info.video_id,
                username = %info.user.username,
                action = action.name(),
                "Playback control denied"
            );
            transport.emit(
                connection_id,
                ServerMessage::ControlDenied {
                    message: CONTROL_DENIED_MESSAGE.to_string(),
                },
            );
            return Err(SyncError::Unauthorized {
                user_id: info.user.user_id,
                video_id: info.video_id,
            });
        }

        let timestamp = now_ms();
        let mut event = PlaybackControlEvent {
            action: action.name().to_string(),
            video_id: info.video_id.clone(),
            timestamp,
            initiated_by: info.user.clone(),
            current_time: None,
            playback_rate: None,
        };

        match action {
            PlaybackAction::Play { current_time } | PlaybackAction::Pause { current_time } => {
                session.is_playing = matches!(action, PlaybackAction::Play { .. });
                if let Some(time) = current_time {
                    session.current_time = time;
                }
                event.current_time = Some(session.current_time);
            }
            PlaybackAction::Seek { current_time } => {
                let duration = session.metadata.original_duration.max(0.0);
                session.current_time = clamp(current_time, 0.0, duration);
                event.current_time = Some(session.current_time);
            }
            PlaybackAction::RateChange {
                playback_rate,
                current_time,
            } => {
                session.playback_rate =
                    clamp(playback_rate, self.settings.min_rate, self.settings.max_rate);
                if let Some(time) = current_time {
                    let duration = session.metadata.original_duration.max(0.0);
                    session.current_time = clamp(time, 0.0, duration);
                }
                event.playback_rate = Some(session.playback_rate);
                event.current_time = Some(session.current_time);
            }
            PlaybackAction::TimeUpdate { current_time } => {
                let drift = (current_time - session.current_time).abs();
                session.current_time = current_time;
                session.last_update = timestamp;
                if drift <= self.settings.resync_threshold_secs {
                    tracing::debug!(
                        video_id = %info.video_id,
                        current_time = current_time,
                        "Minor time update"
                    );
                    return Ok(ControlOutcome::Silent);
                }
                event.current_time = Some(current_time);
            }
        }

        session.last_update = timestamp;
        broadcast_in(
            &session,
            transport,
            ServerMessage::PlaybackControl(event),
            None,
        );

        tracing::info!(
            video_id = %info.video_id,
            username = %info.user.username,
            action = action.name(),
            current_time = session.current_time,
            "Playback control applied"
        );

        Ok(ControlOutcome::Broadcast)
    }

    /// 설정된 정책으로 제어 권한 판단
    pub fn can_control_playback(&self, user_id: &str, session: &VideoSession) -> bool {
        session.can_control(user_id, self.settings.control_policy)
    }

    /// 현재 컨트롤러가 세션에 참여 중인 다른 사용자에게 제어권을 넘긴다
    pub fn grant_control(
        &self,
        video_id: &str,
        user_id: &str,
        granted_by: &str,
    ) -> Result<(), SyncError> {
        let Some(mut session) = self.sessions.get_mut(video_id) else {
            return Err(SyncError::SessionNotFound(video_id.to_string()));
        };

        if !session.is_controller(granted_by) {
            tracing::warn!(
                video_id = %video_id,
                granted_by = %granted_by,
                "Control grant refused, granter is not the controller"
            );
            return Err(SyncError::NotController(granted_by.to_string()));
        }

        // 컨트롤러는 항상 연결된 사용자여야 승계가 가능하다
        let target_joined = session.connections.iter().any(|connection_id| {
            self.connections
                .get(connection_id.as_str())
                .is_some_and(|info| info.user.user_id == user_id)
        });
        if !target_joined {
            tracing::warn!(
                video_id = %video_id,
                user_id = %user_id,
                "Control grant refused, target is not joined"
            );
            return Err(SyncError::TargetNotJoined(user_id.to_string()));
        }

        session.set_controller(user_id);
        tracing::info!(
            video_id = %video_id,
            user_id = %user_id,
            granted_by = %granted_by,
            "Control granted"
        );
        Ok(())
    }

    pub fn get_public_playback_state(&self, video_id: &str) -> Option<PlaybackSnapshot> {
        self.sessions.get(video_id).map(|session| session.snapshot())
    }

    /// 연결 관점의 현재 상태 (`playback_state` 페이로드)
    pub fn playback_state_for(&self, connection_id: &str) -> Result<PlaybackStatePayload, SyncError> {
        let info = self
            .connection(connection_id)
            .ok_or_else(|| SyncError::UnknownConnection(connection_id.to_string()))?;
        let session = self
            .sessions
            .get(&info.video_id)
            .ok_or_else(|| SyncError::SessionNotFound(info.video_id.clone()))?;

        Ok(PlaybackStatePayload {
            state: session.snapshot(),
            is_controller: session.is_controller(&info.user.user_id),
            user_state: session.user_states.get(&info.user.user_id).cloned(),
        })
    }

    /// 세션의 모든 연결(제외 대상 빼고)에 전송. 전달된 연결 수를 반환
    #[allow(dead_code)]
    pub fn broadcast_to_video_session<T: Transport + ?Sized>(
        &self,
        video_id: &str,
        transport: &T,
        message: ServerMessage,
        exclude: Option<&str>,
    ) -> usize {
        match self.sessions.get(video_id) {
            Some(session) => broadcast_in(&session, transport, message, exclude),
            None => 0,
        }
    }

    /// 세션 안에서 특정 사용자의 모든 연결에 전송
    pub fn send_to_user<T: Transport + ?Sized>(
        &self,
        video_id: &str,
        user_id: &str,
        transport: &T,
        message: ServerMessage,
    ) -> usize {
        let Some(session) = self.sessions.get(video_id) else {
            return 0;
        };

        session
            .connections
            .iter()
            .filter(|connection_id| {
                self.connections
                    .get(connection_id.as_str())
                    .is_some_and(|info| info.user.user_id == user_id)
            })
            .filter(|connection_id| transport.emit(connection_id, message.clone()))
            .count()
    }

    /// heartbeat 시 lastSeen 갱신
    pub fn touch_user(&self, connection_id: &str) -> bool {
        let Some(info) = self.connection(connection_id) else {
            return false;
        };
        let Some(mut session) = self.sessions.get_mut(&info.video_id) else {
            return false;
        };
        match session.user_states.get_mut(&info.user.user_id) {
            Some(state) => {
                state.last_seen = now_ms();
                true
            }
            None => false,
        }
    }

    /// 사용자 본인의 음소거/볼륨 변경
    pub fn update_user_state(
        &self,
        connection_id: &str,
        is_muted: Option<bool>,
        volume: Option<f64>,
    ) -> Result<UserState, SyncError> {
        let info = self
            .connection(connection_id)
            .ok_or_else(|| SyncError::UnknownConnection(connection_id.to_string()))?;
        let mut session = self
            .sessions
            .get_mut(&info.video_id)
            .ok_or_else(|| SyncError::SessionNotFound(info.video_id.clone()))?;

        let state = session
            .user_states
            .entry(info.user.user_id.clone())
            .or_insert_with(|| UserState::new(now_ms()));
        if let Some(is_muted) = is_muted {
            state.is_muted = is_muted;
        }
        if let Some(volume) = volume.filter(|v| v.is_finite()) {
            state.volume = clamp(volume, 0.0, 1.0);
        }
        state.last_seen = now_ms();

        Ok(state.clone())
    }

    pub fn connection(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.connections.get(connection_id).map(|info| info.clone())
    }

    /// 세션 전체 복사본 (내부 상태 조회용)
    #[allow(dead_code)]
    pub fn session(&self, video_id: &str) -> Option<VideoSession> {
        self.sessions.get(video_id).map(|session| session.clone())
    }

    pub fn get_stats(&self) -> SyncStats {
        let mut sessions_with_users: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| SessionSummary {
                video_id: entry.video_id.clone(),
                active_users: entry.active_users(),
                is_playing: entry.is_playing,
                duration: entry.metadata.original_duration,
            })
            .collect();
        sessions_with_users.sort_by(|a, b| a.video_id.cmp(&b.video_id));

        SyncStats {
            active_sessions: sessions_with_users.len(),
            total_users: self.connections.len(),
            sessions_with_users,
        }
    }

    /// 초기화만 되고 아무도 참여하지 않은 오래된 세션 정리
    pub fn cleanup_idle_sessions(&self, max_age: Duration) -> usize {
        let mut deleted = 0;

        self.sessions.retain(|video_id, session| {
            let age = session.created_at.elapsed();
            if session.connections.is_empty() && age >= max_age {
                tracing::info!(
                    video_id = %video_id,
                    age_ms = age.as_millis() as u64,
                    "Cleaned up idle video session"
                );
                deleted += 1;
                false
            } else {
                true
            }
        });

        deleted
    }
}

fn broadcast_in<T: Transport + ?Sized>(
    session: &VideoSession,
    transport: &T,
    message: ServerMessage,
    exclude: Option<&str>,
) -> usize {
    session
        .connections
        .iter()
        .filter(|connection_id| Some(connection_id.as_str()) != exclude)
        .filter(|connection_id| transport.emit(connection_id, message.clone()))
        .count()
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}
