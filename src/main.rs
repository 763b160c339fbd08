//! 프레임 서버 진입점
//!
//! 환경 설정을 로드하고 서버를 시작한 뒤 종료 시그널을 기다립니다.
//!
//! 환경변수:
//! - frame_host: 서버 호스트 (기본값: "0.0.0.0")
//! - frame_port: 서버 포트 (기본값: "4000")
//! - frame_max_connections: 최대 동시 연결 수 (기본값: "1000")
//! - frame_max_body_len: 프레임 본문 길이 상한 (기본값: 16 MiB)

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use frameserver::config::{validate_config, FrameServerConfig};
use frameserver::handler::PacketDispatcher;
use frameserver::service::FrameServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 환경 설정 로드
    let config = FrameServerConfig::from_env()?;

    // 설정 검증
    validate_config(&config)?;

    info!("=== 프레임 서버 설정 ===");
    info!("바인드 주소: {}", config.bind_address());
    info!("최대 연결 수: {}", config.max_connections);
    info!("본문 길이 상한: {}바이트", config.max_body_len);
    info!("========================");

    // 서버 구성
    let server = Arc::new(FrameServer::new(config));

    // 데모 디코더 연결 (opcode 0 = SensorData)
    let dispatcher = Arc::new(PacketDispatcher::with_default_decoders());
    dispatcher.clone().attach(&server);

    // 서버 시작
    if let Err(e) = server.start().await {
        error!("프레임 서버 시작 실패: {}", e);
        return Err(e);
    }

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");

    server.stop(false).await?;

    let stats = server.server_stats().await;
    info!("최종 서버 통계: {}", serde_json::to_string(&stats)?);

    Ok(())
}
