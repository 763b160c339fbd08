//! 공통 에러 처리 시스템
//!
//! 프레임 서버에서 발생하는 모든 에러를 체계적으로 관리합니다.
//! I/O 루프에서 발생하는 에러는 사용자에게 전파되지 않고 연결 종료로
//! 수렴합니다. 호출자에게 전파되는 유일한 실패는 바인드 실패입니다.

use std::error::Error as StdError;
use std::fmt;
use tracing::{debug, error, info, warn};

/// 프레임 서버 에러 타입
///
/// 서버에서 발생할 수 있는 모든 에러를 의미 단위로 분류합니다.
#[derive(Debug, Clone)]
pub enum FrameServerError {
    /// 연결 관련 에러 (피어 종료, 전송 오류)
    Connection {
        conn_id: Option<u64>,
        addr: Option<String>,
        message: String,
    },

    /// 프로토콜 관련 에러 (손상된 헤더, 본문 길이 상한 초과)
    Protocol {
        opcode: Option<i16>,
        message: String,
    },

    /// 리스너 관련 에러 (바인드, accept)
    Listener { addr: Option<String>, message: String },

    /// 리퍼 관련 에러 (생존 확인 실패)
    Reaper { operation: String, message: String },

    /// 싱크 핸들러 에러 (등록된 싱크의 패닉)
    Handler { sink_index: usize, message: String },

    /// 설정 관련 에러
    Configuration { key: String, message: String },

    /// 내부 시스템 에러
    Internal { component: String, message: String },
}

impl fmt::Display for FrameServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameServerError::Connection {
                conn_id,
                addr,
                message,
            } => {
                write!(f, "연결 에러")?;
                if let Some(id) = conn_id {
                    write!(f, " [연결 {}]", id)?;
                }
                if let Some(address) = addr {
                    write!(f, " [{}]", address)?;
                }
                write!(f, ": {}", message)
            }
            FrameServerError::Protocol { opcode, message } => {
                write!(f, "프로토콜 에러")?;
                if let Some(op) = opcode {
                    write!(f, " [opcode: {}]", op)?;
                }
                write!(f, ": {}", message)
            }
            FrameServerError::Listener { addr, message } => {
                write!(f, "리스너 에러")?;
                if let Some(address) = addr {
                    write!(f, " [{}]", address)?;
                }
                write!(f, ": {}", message)
            }
            FrameServerError::Reaper { operation, message } => {
                write!(f, "리퍼 에러 [작업: {}]: {}", operation, message)
            }
            FrameServerError::Handler {
                sink_index,
                message,
            } => {
                write!(f, "싱크 에러 [#{}]: {}", sink_index, message)
            }
            FrameServerError::Configuration { key, message } => {
                write!(f, "설정 에러 [키: {}]: {}", key, message)
            }
            FrameServerError::Internal { component, message } => {
                write!(f, "내부 에러 [컴포넌트: {}]: {}", component, message)
            }
        }
    }
}

impl StdError for FrameServerError {}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    /// 정보성 - 정상 동작 중 발생하는 예상 가능한 상황 (피어 종료 등)
    Info,
    /// 경고 - 주의가 필요하지만 서비스는 계속 가능 (손상된 프레임 등)
    Warning,
    /// 에러 - 기능에 영향을 주지만 복구 가능 (싱크 패닉 등)
    Error,
    /// 치명적 - 서비스 중단이 필요한 심각한 문제
    Critical,
}

/// 에러 핸들러
///
/// 모든 에러를 중앙에서 처리하고 로깅합니다.
pub struct ErrorHandler;

impl ErrorHandler {
    /// 에러를 처리하고 심각도에 맞는 레벨로 로깅합니다.
    ///
    /// # Arguments
    ///
    /// * `error` - 처리할 에러
    /// * `severity` - 에러 심각도
    /// * `component` - 에러가 발생한 컴포넌트
    /// * `operation` - 에러가 발생한 작업
    pub fn handle_error(
        error: FrameServerError,
        severity: ErrorSeverity,
        component: &str,
        operation: &str,
    ) {
        let log_message = format!("[{}] [{}] {}", component, operation, error);

        match severity {
            ErrorSeverity::Info => info!("{}", log_message),
            ErrorSeverity::Warning => warn!("{}", log_message),
            ErrorSeverity::Error => error!("{}", log_message),
            ErrorSeverity::Critical => {
                error!("🚨 CRITICAL: {}", log_message);
            }
        }
    }

    /// 전송 계층 에러를 심각도와 함께 분류합니다.
    ///
    /// 피어가 정상적으로 끊은 경우는 Info, 그 외 소켓 오류는 Debug
    /// 수준으로만 기록합니다. 어느 쪽이든 연결 종료로 수렴합니다.
    pub fn handle_transport_error(conn_id: u64, addr: &str, err: &std::io::Error) {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                info!("연결 {} ({}) 피어 종료: {}", conn_id, addr, err);
            }
            _ => {
                debug!("연결 {} ({}) 전송 오류: {}", conn_id, addr, err);
            }
        }
    }
}

/// 에러 생성 헬퍼 함수들
impl FrameServerError {
    /// 연결 에러 생성
    pub fn connection_error(conn_id: Option<u64>, addr: Option<String>, message: &str) -> Self {
        Self::Connection {
            conn_id,
            addr,
            message: message.to_string(),
        }
    }

    /// 프로토콜 에러 생성
    pub fn protocol_error(opcode: Option<i16>, message: &str) -> Self {
        Self::Protocol {
            opcode,
            message: message.to_string(),
        }
    }

    /// 리스너 에러 생성
    pub fn listener_error(addr: Option<String>, message: &str) -> Self {
        Self::Listener {
            addr,
            message: message.to_string(),
        }
    }

    /// 리퍼 에러 생성
    pub fn reaper_error(operation: &str, message: &str) -> Self {
        Self::Reaper {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// 싱크 에러 생성
    pub fn handler_error(sink_index: usize, message: &str) -> Self {
        Self::Handler {
            sink_index,
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for FrameServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Connection {
            conn_id: None,
            addr: None,
            message: err.to_string(),
        }
    }
}
