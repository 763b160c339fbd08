//! 프레임 서버 환경 설정 모듈
//!
//! .env 파일과 환경변수에서 서버 설정을 로드하고 관리합니다.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::protocol::DEFAULT_MAX_BODY_LEN;

/// 프레임 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct FrameServerConfig {
    /// 서버 호스트 주소
    pub host: String,
    /// 서버 포트 번호
    pub port: u16,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 프레임 본문 길이 상한 (바이트)
    pub max_body_len: usize,
    /// 리퍼 최초 실행 지연 (초)
    pub reaper_initial_delay_secs: u64,
    /// 리퍼 점검 간격 (초)
    pub reaper_interval_secs: u64,
}

impl Default for FrameServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            max_connections: 1000,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            reaper_initial_delay_secs: 1,
            reaper_interval_secs: 5,
        }
    }
}

impl FrameServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. .env 파일
    /// 2. 시스템 환경변수
    /// 3. 기본값
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let defaults = Self::default();

        let config = Self {
            host: std::env::var("frame_host").unwrap_or(defaults.host),
            port: std::env::var("frame_port")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            max_connections: std::env::var("frame_max_connections")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            max_body_len: std::env::var("frame_max_body_len")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_body_len),
            reaper_initial_delay_secs: std::env::var("frame_reaper_initial_delay_secs")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reaper_initial_delay_secs),
            reaper_interval_secs: std::env::var("frame_reaper_interval_secs")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reaper_interval_secs),
        };

        info!("프레임 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = vec![".env", "../.env"];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &FrameServerConfig) -> Result<()> {
    if config.port == 0 {
        anyhow::bail!("유효하지 않은 포트 번호: {}", config.port);
    }

    if config.host.is_empty() {
        anyhow::bail!("호스트 주소가 비어있습니다");
    }

    if config.max_connections == 0 {
        anyhow::bail!("최대 연결 수는 0일 수 없습니다");
    }

    if config.max_body_len == 0 {
        anyhow::bail!("본문 길이 상한은 0일 수 없습니다");
    }

    if config.reaper_interval_secs == 0 {
        anyhow::bail!("리퍼 점검 간격은 0일 수 없습니다");
    }

    Ok(())
}
