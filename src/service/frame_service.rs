//! 프레임 서버 메인 서비스
//!
//! 리스너, accept 루프, 서버 생명주기와 전반적인 관리를 담당합니다.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::FrameServerConfig;
use crate::service::connection_service::{ConnectionService, ConnectionStats};
use crate::service::context_pool::{IoContextPool, PoolStats};
use crate::service::publish_service::{PacketPublisher, PublishStats};
use crate::service::reaper_service::{ReaperService, ReaperStats};

/// accept 백로그 크기
const ACCEPT_BACKLOG: u32 = 100;

/// 프레임 서버
///
/// 길이 접두사 프레임을 수신해 등록된 싱크로 발행하는 TCP 서버의
/// 외부 인터페이스입니다.
pub struct FrameServer {
    config: FrameServerConfig,
    connection_service: Arc<ConnectionService>,
    reaper_service: Arc<ReaperService>,
    publisher: Arc<PacketPublisher>,
    pool: Arc<IoContextPool>,
    is_running: Arc<Mutex<bool>>,
    accept_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
    started_at: Instant,
}

impl FrameServer {
    /// 새로운 프레임 서버 생성
    pub fn new(config: FrameServerConfig) -> Self {
        let pool = Arc::new(IoContextPool::new());
        let publisher = Arc::new(PacketPublisher::new());
        let connection_service = Arc::new(ConnectionService::new(
            config.max_connections,
            config.max_body_len,
            pool.clone(),
            publisher.clone(),
        ));
        let reaper_service = Arc::new(ReaperService::new(
            connection_service.clone(),
            config.reaper_initial_delay_secs,
            config.reaper_interval_secs,
        ));

        Self {
            config,
            connection_service,
            reaper_service,
            publisher,
            pool,
            is_running: Arc::new(Mutex::new(false)),
            accept_handle: Arc::new(Mutex::new(None)),
            local_addr: parking_lot::Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    /// 기본 설정으로 서버 생성
    pub fn with_default_config() -> Self {
        Self::new(FrameServerConfig::default())
    }

    /// 패킷 싱크 등록
    ///
    /// 완성된 프레임마다 `(opcode, 본문)` 으로 호출됩니다. 싱크는
    /// 블로킹하면 안 됩니다. 빠르게 처리하거나 자체 워커로
    /// 넘기십시오.
    pub fn on_packet_received<F>(&self, sink: F)
    where
        F: Fn(i16, &[u8]) + Send + Sync + 'static,
    {
        self.publisher.subscribe(sink);
    }

    /// 서버 시작
    ///
    /// 바인드, 리슨, accept 루프와 리퍼를 시작합니다. 바인드 실패는
    /// 호출자에게 전파되는 유일한 실패입니다.
    pub async fn start(&self) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if *is_running {
            warn!("프레임 서버가 이미 실행 중입니다");
            return Ok(());
        }

        let bind_addr = self.config.bind_address();
        info!("🚀 프레임 서버 시작 중... ({})", bind_addr);

        let addr: SocketAddr = bind_addr
            .parse()
            .with_context(|| format!("유효하지 않은 바인드 주소: {}", bind_addr))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .context("소켓 생성 실패")?;

        socket.set_reuseaddr(true).context("SO_REUSEADDR 설정 실패")?;
        socket
            .bind(addr)
            .with_context(|| format!("바인드 실패: {}", bind_addr))?;

        let listener = socket.listen(ACCEPT_BACKLOG).context("리슨 실패")?;
        let local_addr = listener.local_addr().context("로컬 주소 조회 실패")?;
        *self.local_addr.lock() = Some(local_addr);

        info!("✅ 프레임 서버가 {}에서 실행 중입니다", local_addr);

        *is_running = true;
        drop(is_running);

        self.reaper_service
            .start()
            .await
            .context("리퍼 시작 실패")?;

        let connection_service = self.connection_service.clone();
        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, connection_service).await;
        });
        *self.accept_handle.lock().await = Some(handle);

        Ok(())
    }

    /// accept 루프
    ///
    /// accept 하나가 실패해도 루프는 계속됩니다. 종료 중에 수락된
    /// 피어는 등록 없이 폐기됩니다.
    async fn accept_loop(listener: TcpListener, connection_service: Arc<ConnectionService>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if connection_service.is_shutting_down() {
                        debug!("종료 중 연결 폐기: {}", peer);
                        drop(stream);
                        continue;
                    }

                    if let Err(e) = connection_service
                        .clone()
                        .handle_new_connection(stream, peer.to_string())
                        .await
                    {
                        // 피어가 이미 떠났거나 수용량 초과. 다음 accept 속행
                        debug!("연결 수립 실패 ({}): {}", peer, e);
                    }
                }
                Err(e) => {
                    if connection_service.is_shutting_down() {
                        break;
                    }
                    error!("연결 수락 실패: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// 서버 중지
    ///
    /// 신규 연결은 즉시 거부됩니다. `force`가 참이면 등록된 모든
    /// 연결의 스냅샷에 종료 경로를 태우고, 거짓이면 기존 연결이
    /// 피어 종료로 자연히 빠질 때까지 둡니다. 마지막 연결이 빠지는
    /// 시점에 최종 종료 로그가 정확히 한 번 남습니다.
    pub async fn stop(&self, force: bool) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if !*is_running {
            warn!("프레임 서버가 이미 중지되어 있습니다");
            return Ok(());
        }

        info!("🛑 프레임 서버 중지 중... (강제: {})", force);

        self.connection_service.request_shutdown();

        // accept 루프 종료 (리스너도 함께 닫힘)
        let mut handle_option = self.accept_handle.lock().await;
        if let Some(handle) = handle_option.take() {
            handle.abort();
        }
        drop(handle_option);

        self.reaper_service.stop().await.context("리퍼 중지 실패")?;

        if force {
            self.connection_service.close_all_connections().await;
        } else {
            let remaining = self.connection_service.connection_count().await;
            if remaining > 0 {
                info!("기존 연결 {}개는 자연 종료를 기다립니다", remaining);
            }
        }

        self.connection_service.announce_drained_if_needed().await;

        *is_running = false;
        Ok(())
    }

    /// 서버 실행 상태 확인
    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    /// 현재 연결 수 조회
    pub async fn connection_count(&self) -> usize {
        self.connection_service.connection_count().await
    }

    /// 바인드된 로컬 주소 조회 (시작 전에는 None)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// 설정 조회
    pub fn get_config(&self) -> &FrameServerConfig {
        &self.config
    }

    /// 연결 서비스 접근 (테스트/운영 도구용)
    pub fn connection_service(&self) -> &Arc<ConnectionService> {
        &self.connection_service
    }

    /// 리퍼 서비스 접근 (테스트/운영 도구용)
    pub fn reaper_service(&self) -> &Arc<ReaperService> {
        &self.reaper_service
    }

    /// I/O 컨텍스트 풀 통계 조회
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// 서버 통계 조회
    pub async fn server_stats(&self) -> ServerStats {
        ServerStats {
            is_running: self.is_running().await,
            shutting_down: self.connection_service.is_shutting_down(),
            bind_address: self.config.bind_address(),
            max_connections: self.config.max_connections,
            connection_count: self.connection_count().await,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            connections: self.connection_service.connection_stats(),
            pool: self.pool.stats(),
            reaper: self.reaper_service.reaper_stats(),
            publish: self.publisher.stats(),
        }
    }
}

/// 서버 통계 정보
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerStats {
    pub is_running: bool,
    pub shutting_down: bool,
    pub bind_address: String,
    pub max_connections: usize,
    pub connection_count: usize,
    pub uptime_seconds: u64,
    pub connections: ConnectionStats,
    pub pool: PoolStats,
    pub reaper: ReaperStats,
    pub publish: PublishStats,
}
