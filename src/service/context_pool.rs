//! I/O 컨텍스트 풀
//!
//! 연결마다 필요한 수신 버퍼 묶음을 재사용하여 클라이언트당 할당
//! 비용을 제한합니다. 풀은 관측된 최대 동시 연결 수까지 자라며
//! 줄어들지 않습니다.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use crate::protocol::HEADER_LEN;

/// 연결 하나의 수신 작업에 필요한 버퍼 묶음
///
/// 헤더는 고정 6바이트 스크래치에, 본문은 프레임마다 길이에 맞춰
/// 조정되는 재사용 버퍼에 누적됩니다.
#[derive(Debug)]
pub struct IoContext {
    /// 고정 헤더 스크래치
    pub header_buf: [u8; HEADER_LEN],
    /// 재사용 본문 버퍼
    pub body_buf: BytesMut,
}

impl IoContext {
    /// 새 컨텍스트 생성
    pub fn new() -> Self {
        Self {
            header_buf: [0u8; HEADER_LEN],
            body_buf: BytesMut::new(),
        }
    }

    /// 풀 반환 전 상태 초기화
    ///
    /// 본문 버퍼의 용량은 유지합니다. 다음 연결이 재사용합니다.
    pub fn reset(&mut self) {
        self.header_buf = [0u8; HEADER_LEN];
        self.body_buf.clear();
    }
}

impl Default for IoContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 풀 통계
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PoolStats {
    /// 풀 미스로 새로 할당된 컨텍스트 수
    pub allocated: u64,
    /// 풀에서 재사용된 컨텍스트 수
    pub reused: u64,
    /// 풀로 반환된 컨텍스트 수
    pub returned: u64,
    /// 풀 크기 최고 수위
    pub high_water: usize,
}

/// I/O 컨텍스트 풀
///
/// 뮤텍스로 보호되는 LIFO 스택입니다. pop은 풀이 비어 있으면 None을
/// 반환하고 할당은 호출자의 몫입니다. 풀 크기에는 상한이 없습니다.
pub struct IoContextPool {
    stack: Mutex<Vec<IoContext>>,
    allocated: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
    high_water: AtomicUsize,
}

impl IoContextPool {
    /// 새 풀 생성
    pub fn new() -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// 풀에서 컨텍스트를 꺼냅니다.
    ///
    /// 풀이 비어 있으면 None을 반환하며, 할당은 호출자가 합니다.
    pub fn pop(&self) -> Option<IoContext> {
        let popped = self.stack.lock().pop();

        match popped {
            Some(ctx) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                Some(ctx)
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 컨텍스트를 풀로 반환합니다.
    pub fn push(&self, mut ctx: IoContext) {
        ctx.reset();

        let len = {
            let mut stack = self.stack.lock();
            stack.push(ctx);
            stack.len()
        };

        self.returned.fetch_add(1, Ordering::Relaxed);
        self.high_water.fetch_max(len, Ordering::Relaxed);

        debug!("I/O 컨텍스트 반환 (풀 크기: {})", len);
    }

    /// 현재 풀 크기 (참고용)
    pub fn count(&self) -> usize {
        self.stack.lock().len()
    }

    /// 풀 통계 조회
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }
}

impl Default for IoContextPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 빈 풀은 할당하지 않음
    #[test]
    fn test_empty_pool_miss() {
        let pool = IoContextPool::new();

        assert!(pool.pop().is_none());
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.stats().allocated, 1);
    }

    /// LIFO 재사용 테스트
    #[test]
    fn test_lifo_reuse() {
        let pool = IoContextPool::new();

        let mut first = IoContext::new();
        first.body_buf.extend_from_slice(&[1, 2, 3]);
        pool.push(first);
        pool.push(IoContext::new());

        assert_eq!(pool.count(), 2);

        // 마지막으로 반환된 것이 먼저 나옴
        let ctx = pool.pop().unwrap();
        assert!(ctx.body_buf.is_empty()); // reset 확인
        assert_eq!(pool.count(), 1);

        let stats = pool.stats();
        assert_eq!(stats.returned, 2);
        assert_eq!(stats.reused, 1);
        println!("✅ LIFO 재사용 확인: {:?}", stats);
    }

    /// 반환 시 본문 버퍼 용량 유지 테스트
    #[test]
    fn test_reset_keeps_capacity() {
        let pool = IoContextPool::new();

        let mut ctx = IoContext::new();
        ctx.body_buf.resize(4096, 0);
        ctx.header_buf = [0xFF; HEADER_LEN];
        pool.push(ctx);

        let reused = pool.pop().unwrap();
        assert!(reused.body_buf.is_empty());
        assert_eq!(reused.header_buf, [0u8; HEADER_LEN]);
        assert!(reused.body_buf.capacity() >= 4096);
    }

    /// 최고 수위 추적 테스트
    #[test]
    fn test_high_water_mark() {
        let pool = IoContextPool::new();

        for _ in 0..5 {
            pool.push(IoContext::new());
        }
        for _ in 0..5 {
            pool.pop();
        }
        pool.push(IoContext::new());

        assert_eq!(pool.stats().high_water, 5);
    }
}
