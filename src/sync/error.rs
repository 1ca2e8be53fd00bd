//! 재생 동기화 에러 정의

use thiserror::Error;

/// 서비스 연산 실패 사유
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("connection {0} is not joined to any video")]
    UnknownConnection(String),

    #[error("no playback session for video {0}")]
    SessionNotFound(String),

    #[error("user {user_id} may not control playback of {video_id}")]
    Unauthorized { user_id: String, video_id: String },

    #[error("user {0} is not the current controller")]
    NotController(String),

    #[error("user {0} is not joined to this video")]
    TargetNotJoined(String),

    #[error("unknown playback action: {0}")]
    UnknownAction(String),

    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload { action: String, reason: String },
}

impl SyncError {
    /// 클라이언트에게 내려가는 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownConnection(_) => "not_joined",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Unauthorized { .. } => "control_denied",
            Self::NotController(_) => "not_controller",
            Self::TargetNotJoined(_) => "target_not_joined",
            Self::UnknownAction(_) => "unknown_action",
            Self::InvalidPayload { .. } => "invalid_payload",
        }
    }
}
