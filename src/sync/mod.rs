//! 다중 시청자 재생 동기화 모듈

pub mod action;
pub mod error;
pub mod service;
pub mod session;

pub use action::*;
pub use error::*;
pub use service::*;
pub use session::*;

use crate::protocol::ServerMessage;
use std::time::{SystemTime, UNIX_EPOCH};

/// 연결 단위로 메시지를 전달하는 전송 계층
///
/// 전송은 블로킹되지 않아야 한다. 세션 락을 잡은 상태에서 호출된다.
pub trait Transport: Send + Sync {
    /// 연결이 살아있어 메시지를 넘겼으면 true
    fn emit(&self, connection_id: &str, message: ServerMessage) -> bool;
}

/// 현재 시각 (epoch ms)
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
