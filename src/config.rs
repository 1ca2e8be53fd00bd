//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub session: SessionConfig,
    pub playback: PlaybackConfig,
    pub log_level: String,
}

/// 세션 정리 설정
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 아무도 참여하지 않은 세션을 보존하는 시간 (ms)
    pub idle_timeout_ms: u64,
    pub cleanup_interval_secs: u64,
}

/// 재생 동기화 설정
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub control_policy: ControlPolicy,
    /// time_update 가 브로드캐스트를 유발하는 최소 차이 (초)
    pub resync_threshold_secs: f64,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            control_policy: ControlPolicy::Sticky,
            resync_threshold_secs: 1.0,
            min_rate: 0.25,
            max_rate: 2.0,
        }
    }
}

/// 재생 제어 권한 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPolicy {
    /// 한 번이라도 제어권을 받은 사용자는 계속 제어 가능
    #[default]
    Sticky,
    /// 현재 컨트롤러만 제어 가능
    HolderOnly,
}

impl FromStr for ControlPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sticky" => Ok(Self::Sticky),
            "holder_only" | "holder-only" => Ok(Self::HolderOnly),
            other => Err(format!("unknown control policy: {other}")),
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = PlaybackConfig::default();

        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "5502".to_string())
                .parse()
                .unwrap_or(5502),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: parse_list(&env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string())),
            session: SessionConfig {
                idle_timeout_ms: env::var("SESSION_IDLE_TIMEOUT")
                    .unwrap_or_else(|_| "600000".to_string())
                    .parse()
                    .unwrap_or(600000),
                cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            },
            playback: PlaybackConfig {
                control_policy: env::var("CONTROL_POLICY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.control_policy),
                resync_threshold_secs: env::var("RESYNC_THRESHOLD_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.resync_threshold_secs),
                min_rate: env::var("MIN_PLAYBACK_RATE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.min_rate),
                max_rate: env::var("MAX_PLAYBACK_RATE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.max_rate),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// 쉼표로 구분된 목록 파싱
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_policy_parses_known_names() {
        assert_eq!("sticky".parse::<ControlPolicy>(), Ok(ControlPolicy::Sticky));
        assert_eq!(" Holder_Only ".parse::<ControlPolicy>(), Ok(ControlPolicy::HolderOnly));
        assert_eq!("holder-only".parse::<ControlPolicy>(), Ok(ControlPolicy::HolderOnly));
        assert!("everyone".parse::<ControlPolicy>().is_err());
    }

    #[test]
    fn cors_list_skips_blanks() {
        assert_eq!(
            parse_list("http://localhost:3000, ,http://localhost:5173"),
            vec!["http://localhost:3000", "http://localhost:5173"]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn playback_defaults_match_clamp_range() {
        let defaults = PlaybackConfig::default();
        assert_eq!(defaults.min_rate, 0.25);
        assert_eq!(defaults.max_rate, 2.0);
        assert_eq!(defaults.resync_threshold_secs, 1.0);
        assert_eq!(defaults.control_policy, ControlPolicy::Sticky);
    }
}
