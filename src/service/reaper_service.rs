//! 리퍼 서비스
//!
//! 더 이상 살아있지 않은 연결을 주기적으로 정리합니다.
//! EOF가 정상 전달된 연결은 수신 경로가 직접 정리하므로, 리퍼는
//! 통보 없이 사라진 소켓(네트워크 단절 등)을 위한 안전망입니다.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, info, warn};

use crate::service::ConnectionService;

/// 리퍼 통계
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReaperStats {
    pub total_sweeps: u64,
    pub reaped_connections: u64,
    /// 마지막 점검 시간 (Unix timestamp)
    pub last_sweep_timestamp: Option<i64>,
}

/// 리퍼 서비스
pub struct ReaperService {
    connection_service: Arc<ConnectionService>,
    is_running: Arc<Mutex<bool>>,
    sweep_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    initial_delay_secs: u64,
    sweep_interval_secs: u64,
    stats: Arc<parking_lot::Mutex<ReaperStats>>,
}

impl ReaperService {
    /// 새로운 리퍼 서비스 생성
    pub fn new(
        connection_service: Arc<ConnectionService>,
        initial_delay_secs: u64,
        sweep_interval_secs: u64,
    ) -> Self {
        Self {
            connection_service,
            is_running: Arc::new(Mutex::new(false)),
            sweep_handle: Arc::new(Mutex::new(None)),
            initial_delay_secs,
            sweep_interval_secs,
            stats: Arc::new(parking_lot::Mutex::new(ReaperStats::default())),
        }
    }

    /// 기본 설정으로 생성 (최초 1초 후, 이후 5초 간격)
    pub fn with_default_config(connection_service: Arc<ConnectionService>) -> Self {
        Self::new(connection_service, 1, 5)
    }

    /// 리퍼 시작
    pub async fn start(&self) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if *is_running {
            warn!("리퍼가 이미 실행 중입니다");
            return Ok(());
        }

        *is_running = true;
        drop(is_running);

        info!(
            "🔄 리퍼 시작 (최초 {}초 후, 이후 {}초 간격)",
            self.initial_delay_secs, self.sweep_interval_secs
        );

        let connection_service = self.connection_service.clone();
        let is_running_ref = self.is_running.clone();
        let stats_ref = self.stats.clone();
        let initial_delay = Duration::from_secs(self.initial_delay_secs);
        let sweep_interval = Duration::from_secs(self.sweep_interval_secs);

        let handle = tokio::spawn(async move {
            let mut sweep_timer = interval_at(Instant::now() + initial_delay, sweep_interval);

            while *is_running_ref.lock().await {
                sweep_timer.tick().await;

                let reaped = connection_service.reap_dead_connections().await;
                let current = connection_service.connection_count().await;

                {
                    let mut stats = stats_ref.lock();
                    stats.total_sweeps += 1;
                    stats.reaped_connections += reaped as u64;
                    stats.last_sweep_timestamp = Some(chrono::Utc::now().timestamp());
                }

                if reaped > 0 {
                    info!("리퍼 정리: {}개 연결 제거 (활성: {}개)", reaped, current);
                } else if current > 0 {
                    debug!("리퍼 점검 완료 - 활성 연결: {}개", current);
                }
            }

            info!("리퍼 점검 루프 종료");
        });

        *self.sweep_handle.lock().await = Some(handle);

        Ok(())
    }

    /// 리퍼 중지
    pub async fn stop(&self) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if !*is_running {
            warn!("리퍼가 이미 중지되어 있습니다");
            return Ok(());
        }

        *is_running = false;
        drop(is_running);

        let mut handle_option = self.sweep_handle.lock().await;
        if let Some(handle) = handle_option.take() {
            handle.abort();
            debug!("리퍼 점검 태스크 종료됨");
        }

        info!("✅ 리퍼 중지 완료");
        Ok(())
    }

    /// 리퍼 실행 상태 확인
    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    /// 수동으로 즉시 점검 수행
    pub async fn cleanup_now(&self) -> Result<usize> {
        let reaped = self.connection_service.reap_dead_connections().await;

        {
            let mut stats = self.stats.lock();
            stats.total_sweeps += 1;
            stats.reaped_connections += reaped as u64;
            stats.last_sweep_timestamp = Some(chrono::Utc::now().timestamp());
        }

        if reaped > 0 {
            info!("수동 리퍼 정리: {}개 연결 제거", reaped);
        } else {
            debug!("정리할 죽은 연결이 없습니다");
        }

        Ok(reaped)
    }

    /// 리퍼 통계 조회
    pub fn reaper_stats(&self) -> ReaperStats {
        self.stats.lock().clone()
    }

    /// 리퍼 설정 조회
    pub fn get_config(&self) -> (u64, u64) {
        (self.initial_delay_secs, self.sweep_interval_secs)
    }
}
