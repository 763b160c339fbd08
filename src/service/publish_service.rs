//! 패킷 발행 서비스
//!
//! 완성된 프레임을 등록된 싱크들에게 전달합니다. 싱크 하나의 실패가
//! 다른 싱크나 I/O 루프에 전파되지 않도록 격리합니다.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::tool::error::{ErrorHandler, ErrorSeverity, FrameServerError};

/// 패킷 싱크 타입
///
/// 완성된 프레임마다 `(opcode, 본문)` 으로 호출됩니다. 싱크는 수신
/// 루프 안에서 동기 호출되므로 블로킹하면 안 됩니다. 빠르게
/// 처리하거나 자체 워커로 넘기는 것이 계약입니다.
pub type PacketSink = Box<dyn Fn(i16, &[u8]) + Send + Sync>;

/// 발행 통계
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PublishStats {
    /// 발행된 프레임 수
    pub published_frames: u64,
    /// 패닉으로 격리된 싱크 호출 수
    pub sink_failures: u64,
}

/// 패킷 발행자
///
/// 싱크 목록은 등록 순서를 유지하며, 발행은 그 순서대로 동기
/// 호출됩니다. 등록은 드물고 발행은 빈번하므로 읽기 위주 락을
/// 사용합니다.
pub struct PacketPublisher {
    sinks: RwLock<Vec<PacketSink>>,
    published_frames: AtomicU64,
    sink_failures: AtomicU64,
}

impl PacketPublisher {
    /// 새 발행자 생성
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
            published_frames: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    /// 패킷 싱크 등록
    pub fn subscribe<F>(&self, sink: F)
    where
        F: Fn(i16, &[u8]) + Send + Sync + 'static,
    {
        let mut sinks = self.sinks.write();
        sinks.push(Box::new(sink));

        info!("패킷 싱크 등록 (총 {}개)", sinks.len());
    }

    /// 완성된 프레임을 모든 싱크에 발행합니다.
    ///
    /// 싱크의 패닉은 여기서 잡혀 로깅만 되고, 이후 싱크 호출과
    /// 해당 연결은 계속 진행됩니다.
    pub fn publish(&self, opcode: i16, body: &[u8]) {
        let sinks = self.sinks.read();

        for (index, sink) in sinks.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| sink(opcode, body)));

            if let Err(panic) = result {
                self.sink_failures.fetch_add(1, Ordering::Relaxed);

                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "알 수 없는 패닉".to_string());

                ErrorHandler::handle_error(
                    FrameServerError::handler_error(index, &message),
                    ErrorSeverity::Error,
                    "PacketPublisher",
                    "publish",
                );
            }
        }

        self.published_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// 등록된 싱크 수
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// 발행 통계 조회
    pub fn stats(&self) -> PublishStats {
        PublishStats {
            published_frames: self.published_frames.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for PacketPublisher {
    fn default() -> Self {
        Self::new()
    }
}
