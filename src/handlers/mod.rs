//! 핸들러 모듈

pub mod connection;
pub mod playback;

pub use connection::*;
pub use playback::*;
