//! 영상별 재생 세션 상태

use crate::config::ControlPolicy;
use crate::protocol::{PlaybackSnapshot, UserIdentity, UserState, VideoMetadata};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// 연결 ID -> 사용자/영상 역참조
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub user: UserIdentity,
    pub video_id: String,
}

/// 하나의 영상에 대한 공유 재생 상태
#[derive(Debug, Clone)]
pub struct VideoSession {
    pub video_id: String,
    pub current_time: f64,
    pub is_playing: bool,
    pub playback_rate: f64,
    /// 마지막 상태 변경 시각 (epoch ms)
    pub last_update: u64,
    pub metadata: VideoMetadata,
    pub user_states: HashMap<String, UserState>,
    pub controlled_by: Option<String>,
    pub allowed_controllers: HashSet<String>,
    /// 참여 순서대로 정렬된 연결 ID
    pub connections: Vec<String>,
    pub created_at: Instant,
}

impl VideoSession {
    pub fn new(video_id: String, metadata: VideoMetadata, now_ms: u64) -> Self {
        Self {
            video_id,
            current_time: 0.0,
            is_playing: false,
            playback_rate: 1.0,
            last_update: now_ms,
            metadata,
            user_states: HashMap::new(),
            controlled_by: None,
            allowed_controllers: HashSet::new(),
            connections: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn active_users(&self) -> usize {
        self.connections.len()
    }

    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.connections.iter().any(|c| c == connection_id)
    }

    /// 연결 추가. 이미 있으면 false
    pub fn add_connection(&mut self, connection_id: &str) -> bool {
        if self.has_connection(connection_id) {
            return false;
        }
        self.connections.push(connection_id.to_string());
        true
    }

    pub fn remove_connection(&mut self, connection_id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != connection_id);
        self.connections.len() != before
    }

    pub fn set_controller(&mut self, user_id: &str) {
        self.controlled_by = Some(user_id.to_string());
        self.allowed_controllers.insert(user_id.to_string());
    }

    pub fn is_controller(&self, user_id: &str) -> bool {
        self.controlled_by.as_deref() == Some(user_id)
    }

    /// 정책에 따른 재생 제어 권한 판단
    pub fn can_control(&self, user_id: &str, policy: ControlPolicy) -> bool {
        match policy {
            ControlPolicy::Sticky => {
                self.is_controller(user_id) || self.allowed_controllers.contains(user_id)
            }
            ControlPolicy::HolderOnly => self.is_controller(user_id),
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            video_id: self.video_id.clone(),
            current_time: self.current_time,
            is_playing: self.is_playing,
            playback_rate: self.playback_rate,
            original_duration: self.metadata.original_duration,
            has_audio: self.metadata.has_audio,
            audio_track_duration: self.metadata.audio_track_duration,
            active_users: self.active_users(),
            last_update: self.last_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> VideoSession {
        VideoSession::new("v1".to_string(), VideoMetadata::default(), 0)
    }

    #[test]
    fn connections_keep_join_order_without_duplicates() {
        let mut s = session();
        assert!(s.add_connection("c1"));
        assert!(s.add_connection("c2"));
        assert!(!s.add_connection("c1"));
        assert_eq!(s.active_users(), 2);

        assert!(s.remove_connection("c1"));
        assert!(!s.remove_connection("c1"));
        assert_eq!(s.connections, vec!["c2".to_string()]);
    }

    #[test]
    fn sticky_policy_keeps_previous_controllers() {
        let mut s = session();
        s.set_controller("a");
        s.set_controller("b");

        assert!(s.can_control("a", ControlPolicy::Sticky));
        assert!(!s.can_control("a", ControlPolicy::HolderOnly));
        assert!(s.can_control("b", ControlPolicy::HolderOnly));
        assert!(!s.can_control("c", ControlPolicy::Sticky));
    }

    #[test]
    fn snapshot_reflects_metadata_and_connections() {
        let mut s = VideoSession::new(
            "v1".to_string(),
            VideoMetadata {
                original_duration: 90.0,
                has_audio: true,
                audio_track_duration: 88.0,
            },
            7,
        );
        s.add_connection("c1");

        let snap = s.snapshot();
        assert_eq!(snap.original_duration, 90.0);
        assert!(snap.has_audio);
        assert_eq!(snap.audio_track_duration, 88.0);
        assert_eq!(snap.active_users, 1);
        assert_eq!(snap.last_update, 7);
        assert_eq!(snap.playback_rate, 1.0);
    }
}
