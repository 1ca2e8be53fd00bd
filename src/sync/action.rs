//! 재생 제어 액션

use super::SyncError;
use crate::protocol::ControlRequest;

/// 검증된 재생 제어 액션
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackAction {
    Play { current_time: Option<f64> },
    Pause { current_time: Option<f64> },
    Seek { current_time: f64 },
    RateChange {
        playback_rate: f64,
        current_time: Option<f64>,
    },
    /// 컨트롤러의 주기적인 재생 위치 보고
    TimeUpdate { current_time: f64 },
}

impl PlaybackAction {
    /// 와이어 상의 액션 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Pause { .. } => "pause",
            Self::Seek { .. } => "seek",
            Self::RateChange { .. } => "rate_change",
            Self::TimeUpdate { .. } => "time_update",
        }
    }
}

impl TryFrom<&ControlRequest> for PlaybackAction {
    type Error = SyncError;

    fn try_from(request: &ControlRequest) -> Result<Self, Self::Error> {
        let action = request.action.as_str();
        let require = |value: Option<f64>, field: &str| {
            value
                .filter(|v| v.is_finite())
                .ok_or_else(|| SyncError::InvalidPayload {
                    action: action.to_string(),
                    reason: format!("{field} is required"),
                })
        };
        let current_time = request.current_time.filter(|v| v.is_finite());

        match action {
            "play" => Ok(Self::Play { current_time }),
            "pause" => Ok(Self::Pause { current_time }),
            "seek" => Ok(Self::Seek {
                current_time: require(request.current_time, "currentTime")?,
            }),
            "rate_change" => Ok(Self::RateChange {
                playback_rate: require(request.playback_rate, "playbackRate")?,
                current_time,
            }),
            "time_update" => Ok(Self::TimeUpdate {
                current_time: require(request.current_time, "currentTime")?,
            }),
            other => Err(SyncError::UnknownAction(other.to_string())),
        }
    }
}
