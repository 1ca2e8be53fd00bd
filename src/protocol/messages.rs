//! 클라이언트-서버 메시지 프로토콜 정의
//!
//! 모든 프레임은 `{"type": "...", "payload": {...}}` 형태의 JSON 텍스트이며
//! payload 필드는 camelCase 를 사용한다.

use serde::{Deserialize, Serialize};

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    // Connection
    Heartbeat,

    // Session Management
    #[serde(rename_all = "camelCase")]
    JoinVideo {
        video_id: String,
        #[serde(default)]
        video_metadata: VideoMetadata,
    },
    LeaveVideo,
    GetState,

    // Playback
    PlaybackControl(ControlRequest),
    #[serde(rename_all = "camelCase")]
    GrantControl { user_id: String },
    #[serde(rename_all = "camelCase")]
    UpdateUserState {
        is_muted: Option<bool>,
        volume: Option<f64>,
    },
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    // Connection
    #[serde(rename_all = "camelCase")]
    Connected {
        connection_id: String,
        user_id: String,
    },
    HeartbeatAck,
    Error { code: String, message: String },

    // Session Events
    PlaybackState(PlaybackStatePayload),
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user: UserIdentity,
        active_users: usize,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user: UserIdentity,
        active_users: usize,
    },

    // Control
    #[serde(rename_all = "camelCase")]
    ControlGranted {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        granted_by: Option<UserIdentity>,
    },
    /// 양도한 쪽에게 보내는 확인
    #[serde(rename_all = "camelCase")]
    ControlGrantedSuccess { user_id: String },
    ControlDenied { message: String },
    PlaybackControl(PlaybackControlEvent),
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// 연결에 묶인 사용자 정보
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub username: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// 세션 생성 시 전달되는 영상 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoMetadata {
    pub original_duration: f64,
    pub has_audio: bool,
    pub audio_track_duration: f64,
}

/// 재생 제어 요청 (검증 전 원본)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub action: String,
    #[serde(default)]
    pub current_time: Option<f64>,
    #[serde(default)]
    pub playback_rate: Option<f64>,
}

/// 사용자별 재생 환경
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub is_muted: bool,
    pub volume: f64,
    pub last_seen: u64,
    pub joined_at: u64,
}

impl UserState {
    pub fn new(now_ms: u64) -> Self {
        Self {
            is_muted: false,
            volume: 1.0,
            last_seen: now_ms,
            joined_at: now_ms,
        }
    }
}

/// 공개 재생 상태 (내부 맵/셋 제외)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub video_id: String,
    pub current_time: f64,
    pub is_playing: bool,
    pub playback_rate: f64,
    pub original_duration: f64,
    pub has_audio: bool,
    pub audio_track_duration: f64,
    pub active_users: usize,
    pub last_update: u64,
}

/// 참여한 연결에게 보내는 현재 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatePayload {
    #[serde(flatten)]
    pub state: PlaybackSnapshot,
    pub is_controller: bool,
    pub user_state: Option<UserState>,
}

/// 세션 전체에 브로드캐스트되는 재생 제어 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackControlEvent {
    pub action: String,
    pub video_id: String,
    pub timestamp: u64,
    pub initiated_by: UserIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
}
