//! 연결 서비스
//!
//! 연결 레지스트리와 연결별 수신 상태 기계를 담당합니다.
//!
//! 수신은 연결마다 하나의 태스크가 준비성(readiness) 기반으로
//! 구동합니다: 헤더 6바이트를 누적 → 본문 `body_len` 바이트를 누적 →
//! 발행 → 다시 헤더. TCP 세그먼트 경계는 임의이므로 모든 전환은
//! 해당 구간에 **누적된** 바이트 수로만 판정합니다.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::protocol::{FrameHeader, HEADER_LEN};
use crate::service::context_pool::{IoContext, IoContextPool};
use crate::service::publish_service::PacketPublisher;
use crate::tool::error::{ErrorHandler, ErrorSeverity, FrameServerError};
use crate::tool::SimpleUtils;

/// 개별 클라이언트 연결 정보
///
/// 소켓은 수신 태스크와 리퍼가 공유합니다 (수신은 준비성 API,
/// 리퍼는 peek 탐침만 사용). 송신 경로는 없습니다.
#[derive(Debug)]
pub struct ClientConnection {
    pub conn_id: u64,
    pub addr: String,
    socket: Arc<TcpStream>,
    closed: AtomicBool,
    close_notify: Notify,
    pub connected_at: Instant,
}

impl ClientConnection {
    fn new(conn_id: u64, addr: String, socket: TcpStream) -> Self {
        Self {
            conn_id,
            addr,
            socket: Arc::new(socket),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            connected_at: Instant::now(),
        }
    }

    /// 종료 경로가 이미 실행되었는지 확인
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 수신 태스크에 종료를 통지합니다.
    ///
    /// 태스크가 아직 대기 전이어도 통지가 유실되지 않습니다.
    fn request_close(&self) {
        self.close_notify.notify_one();
    }

    /// 소켓 생존 탐침
    ///
    /// 읽기 가능인데 대기 바이트가 0이면 피어가 닫은 소켓입니다.
    /// 탐침 중 오류도 "살아있지 않음"으로 간주하고, 블록되면(대기
    /// 데이터 없음) 살아있는 연결입니다. 데이터를 소비하지 않습니다.
    pub async fn probe_liveness(&self) -> bool {
        let mut probe = [0u8; 1];

        match timeout(Duration::from_micros(1), self.socket.peek(&mut probe)).await {
            Ok(Ok(0)) => false,
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
            Err(_) => true,
        }
    }
}

/// 수신 구간 상태
///
/// 센티널 없는 전체 인코딩: 헤더 구간에는 본문 버퍼 개념이 없고,
/// 본문 구간에만 opcode와 본문 길이가 존재합니다.
#[derive(Debug, Clone, Copy)]
enum ReadPhase {
    Header { filled: usize },
    Body { opcode: i16, body_len: usize, filled: usize },
}

/// 연결 통계
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: u64,
    pub current_connections: u32,
    pub peak_connections: u32,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub rejected_connections: u64,
    pub reaped_connections: u64,
}

/// 연결 서비스
pub struct ConnectionService {
    connections: Mutex<HashMap<u64, Arc<ClientConnection>>>,
    pool: Arc<IoContextPool>,
    publisher: Arc<PacketPublisher>,
    next_conn_id: AtomicU64,
    max_connections: usize,
    max_body_len: usize,
    shutting_down: AtomicBool,
    drain_announced: AtomicBool,
    stats: parking_lot::Mutex<ConnectionStats>,
}

impl ConnectionService {
    /// 새로운 연결 서비스 생성
    pub fn new(
        max_connections: usize,
        max_body_len: usize,
        pool: Arc<IoContextPool>,
        publisher: Arc<PacketPublisher>,
    ) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            pool,
            publisher,
            next_conn_id: AtomicU64::new(1),
            max_connections,
            max_body_len,
            shutting_down: AtomicBool::new(false),
            drain_announced: AtomicBool::new(false),
            stats: parking_lot::Mutex::new(ConnectionStats::default()),
        }
    }

    /// 새로운 연결 처리
    ///
    /// 연결을 레지스트리에 등록하고 수신 태스크를 시작합니다.
    /// I/O 컨텍스트는 풀에서 꺼내거나, 풀이 비어 있으면 새로
    /// 할당합니다.
    ///
    /// # Errors
    ///
    /// * 서버가 종료 중일 때
    /// * 최대 연결 수 초과
    pub async fn handle_new_connection(
        self: Arc<Self>,
        stream: TcpStream,
        addr: String,
    ) -> Result<u64> {
        if self.is_shutting_down() {
            debug!("종료 중 신규 연결 폐기: {}", addr);
            return Err(anyhow!("서버 종료 중"));
        }

        let current = self.connection_count().await;
        if current >= self.max_connections {
            self.stats.lock().rejected_connections += 1;
            warn!("최대 연결 수 초과: {}/{}", current, self.max_connections);
            return Err(anyhow!("서버가 가득 참"));
        }

        stream.set_nodelay(true)?;

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(ClientConnection::new(conn_id, addr.clone(), stream));

        {
            let mut connections = self.connections.lock().await;
            connections.insert(conn_id, conn.clone());
        }

        {
            let mut stats = self.stats.lock();
            stats.total_connections += 1;
            stats.current_connections += 1;
            stats.peak_connections = stats.peak_connections.max(stats.current_connections);
        }

        // 수신 태스크 시작. 어떤 경로로 끝나든 컨텍스트는 정확히
        // 한 번 풀로 돌아가고 종료 경로가 실행됩니다.
        let mut ctx = self.pool.pop().unwrap_or_default();
        let service = Arc::clone(&self);
        let task_conn = conn.clone();

        tokio::spawn(async move {
            Self::receive_loop(&service, &task_conn, &mut ctx).await;

            service.pool.push(ctx);
            service.close_connection(&task_conn).await;
        });

        info!("✅ 연결 {} 수립 ({})", conn_id, addr);
        Ok(conn_id)
    }

    /// 연결별 수신 상태 기계
    ///
    /// 준비성 이벤트마다 현재 구간의 남은 윈도우만큼 읽어 누적하고,
    /// 누적량이 구간 길이에 도달한 시점에만 다음 구간으로 넘어갑니다.
    /// 피어 종료(0바이트 수신), 전송 오류, 손상된 헤더, 종료 통지
    /// 중 어느 것이든 루프를 끝냅니다.
    async fn receive_loop(
        service: &ConnectionService,
        conn: &ClientConnection,
        ctx: &mut IoContext,
    ) {
        let mut phase = ReadPhase::Header { filled: 0 };

        loop {
            tokio::select! {
                biased;

                _ = conn.close_notify.notified() => {
                    debug!("연결 {} 종료 통지 수신", conn.conn_id);
                    return;
                }

                ready = conn.socket.readable() => {
                    if let Err(e) = ready {
                        ErrorHandler::handle_transport_error(conn.conn_id, &conn.addr, &e);
                        return;
                    }
                }
            }

            let read_result = match phase {
                ReadPhase::Header { filled } => {
                    conn.socket.try_read(&mut ctx.header_buf[filled..])
                }
                ReadPhase::Body {
                    body_len, filled, ..
                } => conn.socket.try_read(&mut ctx.body_buf[filled..body_len]),
            };

            let n = match read_result {
                Ok(0) => {
                    info!("연결 {} ({}) 피어 종료", conn.conn_id, conn.addr);
                    return;
                }
                Ok(n) => n,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    ErrorHandler::handle_transport_error(conn.conn_id, &conn.addr, &e);
                    return;
                }
            };

            match phase {
                ReadPhase::Header { filled } => {
                    let filled = filled + n;

                    if filled < HEADER_LEN {
                        phase = ReadPhase::Header { filled };
                        continue;
                    }

                    let header = match FrameHeader::parse(&ctx.header_buf) {
                        Ok(header) => header,
                        Err(e) => {
                            ErrorHandler::handle_error(
                                FrameServerError::protocol_error(None, &e.to_string()),
                                ErrorSeverity::Warning,
                                "ConnectionService",
                                "parse_header",
                            );
                            return;
                        }
                    };

                    let body_len = header.body_len as usize;

                    if body_len > service.max_body_len {
                        ErrorHandler::handle_error(
                            FrameServerError::protocol_error(
                                Some(header.opcode),
                                &format!(
                                    "본문 길이 상한 초과: {} > {}",
                                    body_len, service.max_body_len
                                ),
                            ),
                            ErrorSeverity::Warning,
                            "ConnectionService",
                            "check_body_len",
                        );
                        return;
                    }

                    if body_len == 0 {
                        // 빈 본문은 추가 수신 왕복 없이 즉시 발행
                        service.publisher.publish(header.opcode, &[]);
                        service.record_frame(0);
                        phase = ReadPhase::Header { filled: 0 };
                    } else {
                        ctx.body_buf.clear();
                        ctx.body_buf.resize(body_len, 0);
                        phase = ReadPhase::Body {
                            opcode: header.opcode,
                            body_len,
                            filled: 0,
                        };
                    }
                }

                ReadPhase::Body {
                    opcode,
                    body_len,
                    filled,
                } => {
                    let filled = filled + n;

                    if filled < body_len {
                        phase = ReadPhase::Body {
                            opcode,
                            body_len,
                            filled,
                        };
                        continue;
                    }

                    let body = &ctx.body_buf[..body_len];
                    trace!(
                        "연결 {} 프레임 완성: opcode={}, body={}",
                        conn.conn_id,
                        opcode,
                        SimpleUtils::hex_preview(body, 16)
                    );

                    service.publisher.publish(opcode, body);
                    service.record_frame(body_len);
                    phase = ReadPhase::Header { filled: 0 };
                }
            }
        }
    }

    /// 프레임 통계 기록
    fn record_frame(&self, body_len: usize) {
        let mut stats = self.stats.lock();
        stats.total_frames += 1;
        stats.total_bytes += (HEADER_LEN + body_len) as u64;
    }

    /// 연결 종료 경로 (멱등)
    ///
    /// closed 플래그가 중복 제거 토큰이며 두 번째 호출은 아무
    /// 일도 하지 않습니다. 첫 호출은 수신 태스크를 깨우고 레지스트리
    /// 에서 제거한 뒤, 종료 중이고 레지스트리가 비었으면 최종 종료
    /// 로그를 정확히 한 번 남깁니다. 소켓은 마지막 핸들이 떨어질 때
    /// 닫힙니다.
    pub async fn close_connection(&self, conn: &ClientConnection) -> bool {
        if conn.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        conn.request_close();

        let removed = {
            let mut connections = self.connections.lock().await;
            connections.remove(&conn.conn_id).is_some()
        };

        if removed {
            let mut stats = self.stats.lock();
            stats.current_connections = stats.current_connections.saturating_sub(1);
        }

        debug!("연결 {} ({}) 종료 완료", conn.conn_id, conn.addr);

        self.announce_drained_if_needed().await;
        true
    }

    /// 모든 연결 강제 종료
    ///
    /// 스냅샷을 떠서 순회하므로 레지스트리 락을 종료 경로와 겹쳐
    /// 잡지 않습니다.
    pub async fn close_all_connections(&self) {
        let snapshot: Vec<Arc<ClientConnection>> = {
            let connections = self.connections.lock().await;
            connections.values().cloned().collect()
        };

        let count = snapshot.len();
        for conn in snapshot {
            self.close_connection(&conn).await;
        }

        if count > 0 {
            info!("모든 연결 강제 종료: {}개", count);
        }
    }

    /// 죽은 연결 정리
    ///
    /// 후보 집합을 락 아래에서 복사해 두고 탐침은 락 밖에서
    /// 수행합니다. 죽은 연결은 전체 종료 경로를 타므로 해당 수신
    /// 태스크의 I/O 컨텍스트도 풀로 돌아갑니다.
    pub async fn reap_dead_connections(&self) -> usize {
        let candidates: Vec<Arc<ClientConnection>> = {
            let connections = self.connections.lock().await;
            connections.values().cloned().collect()
        };

        let mut reaped = 0;
        for conn in candidates {
            if conn.is_closed() {
                continue;
            }

            if !conn.probe_liveness().await {
                warn!("유령 연결 정리: {} ({})", conn.conn_id, conn.addr);
                if self.close_connection(&conn).await {
                    reaped += 1;
                }
            }
        }

        if reaped > 0 {
            self.stats.lock().reaped_connections += reaped as u64;
        }

        reaped
    }

    /// 종료 절차 시작 (신규 연결 거부)
    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// 종료 중인지 확인
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// 종료 중 마지막 연결이 빠지면 최종 로그를 정확히 한 번 남깁니다.
    pub async fn announce_drained_if_needed(&self) {
        if !self.is_shutting_down() {
            return;
        }

        if self.connection_count().await != 0 {
            return;
        }

        if self.drain_announced.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("🛑 모든 연결이 종료되어 서버가 종료되었습니다");
    }

    /// 연결 수 조회
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// 연결 통계 조회
    pub fn connection_stats(&self) -> ConnectionStats {
        self.stats.lock().clone()
    }

    /// 특정 연결 조회 (테스트/운영 도구용)
    pub async fn get_connection(&self, conn_id: u64) -> Option<Arc<ClientConnection>> {
        self.connections.lock().await.get(&conn_id).cloned()
    }
}
