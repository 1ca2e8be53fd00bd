//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::protocol::ServerMessage;
use crate::sync::{PlaybackSyncService, Transport};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 재생 동기화 서비스
    pub sync: PlaybackSyncService,
    /// 살아있는 WebSocket 연결
    pub hub: ConnectionHub,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            sync: PlaybackSyncService::new(config.playback.clone()),
            hub: ConnectionHub::new(),
            config: Arc::new(config),
        }
    }
}

/// 연결 세션 정보
pub struct PeerSession {
    pub sender: UnboundedSender<ServerMessage>,
    pub connected_at: Instant,
}

/// 연결 ID -> 송신 채널 레지스트리
#[derive(Default)]
pub struct ConnectionHub {
    peers: DashMap<String, PeerSession>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: &str, sender: UnboundedSender<ServerMessage>) {
        self.peers.insert(
            connection_id.to_string(),
            PeerSession {
                sender,
                connected_at: Instant::now(),
            },
        );
    }

    pub fn unregister(&self, connection_id: &str) -> Option<PeerSession> {
        self.peers.remove(connection_id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Transport for ConnectionHub {
    fn emit(&self, connection_id: &str, message: ServerMessage) -> bool {
        match self.peers.get(connection_id) {
            Some(session) => session.sender.send(message).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn emit_reaches_registered_peer_only() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("c1", tx);

        assert!(hub.emit("c1", ServerMessage::HeartbeatAck));
        assert!(!hub.emit("c2", ServerMessage::HeartbeatAck));
        assert_eq!(rx.try_recv().ok(), Some(ServerMessage::HeartbeatAck));
    }

    #[test]
    fn emit_fails_after_unregister_or_closed_receiver() {
        let hub = ConnectionHub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register("c1", tx);
        drop(rx);
        assert!(!hub.emit("c1", ServerMessage::HeartbeatAck));

        assert!(hub.unregister("c1").is_some());
        assert_eq!(hub.len(), 0);
        assert!(hub.unregister("c1").is_none());
    }

    #[test]
    fn is_empty_tracks_registrations() {
        let hub = ConnectionHub::new();
        assert!(hub.is_empty());

        let (tx, _rx) = mpsc::unbounded_channel();
        hub.register("c1", tx);
        assert!(!hub.is_empty());
        assert_eq!(hub.len(), 1);

        hub.unregister("c1");
        assert!(hub.is_empty());
    }
}
