//! 패킷 핸들러
//!
//! 발행된 프레임을 opcode별 디코더로 분배합니다. 서버 코어는
//! opcode를 해석하지 않으며, 이 레이어가 환경이 소유하는 디코딩
//! 지점입니다. 미등록 opcode는 집계만 하고 넘어갑니다.

use anyhow::{anyhow, Result};
use bytes::Buf;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::service::FrameServer;

/// 데모 센서 데이터 opcode
pub const SENSOR_DATA_OPCODE: i16 = 0;

/// 패킷 디코더 트레이트
///
/// opcode 하나의 페이로드 스키마를 디코딩하고 처리합니다.
pub trait PacketDecoder: Send + Sync {
    /// 디코더 이름 (로그용)
    fn name(&self) -> &'static str;

    /// 본문 바이트를 디코딩하고 처리합니다.
    fn handle(&self, body: &[u8]) -> Result<()>;
}

/// 센서 데이터 패킷
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SensorData {
    /// 측정 시간 (Unix timestamp)
    pub date: i64,
    /// 온도
    pub temperature: i32,
}

impl SensorData {
    /// 12바이트 리틀 엔디언 본문에서 디코딩합니다.
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        if body.len() != 12 {
            return Err(anyhow!("센서 데이터 길이 불일치: {}바이트", body.len()));
        }

        let mut cursor = body;
        Ok(Self {
            date: cursor.get_i64_le(),
            temperature: cursor.get_i32_le(),
        })
    }

    /// 12바이트 리틀 엔디언 본문으로 인코딩합니다 (클라이언트/테스트용).
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[..8].copy_from_slice(&self.date.to_le_bytes());
        buf[8..].copy_from_slice(&self.temperature.to_le_bytes());
        buf
    }
}

/// 센서 데이터 디코더
pub struct SensorDataDecoder;

impl PacketDecoder for SensorDataDecoder {
    fn name(&self) -> &'static str {
        "SensorData"
    }

    fn handle(&self, body: &[u8]) -> Result<()> {
        let data = SensorData::from_bytes(body)?;
        info!(
            "센서 데이터 수신: 시간={}, 온도={}",
            data.date, data.temperature
        );
        Ok(())
    }
}

/// 디스패치 통계
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DispatchStats {
    pub dispatched_packets: u64,
    pub unknown_opcodes: u64,
    pub decode_failures: u64,
}

/// 패킷 디스패처
///
/// opcode → 디코더 매핑을 보관하고, 발행 싱크로 등록되어 프레임을
/// 분배합니다.
pub struct PacketDispatcher {
    decoders: RwLock<HashMap<i16, Box<dyn PacketDecoder>>>,
    dispatched_packets: AtomicU64,
    unknown_opcodes: AtomicU64,
    decode_failures: AtomicU64,
}

impl PacketDispatcher {
    /// 새 디스패처 생성
    pub fn new() -> Self {
        Self {
            decoders: RwLock::new(HashMap::new()),
            dispatched_packets: AtomicU64::new(0),
            unknown_opcodes: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
        }
    }

    /// 데모 디코더가 등록된 디스패처 생성
    pub fn with_default_decoders() -> Self {
        let dispatcher = Self::new();
        dispatcher.register(SENSOR_DATA_OPCODE, Box::new(SensorDataDecoder));
        dispatcher
    }

    /// opcode에 디코더 등록
    pub fn register(&self, opcode: i16, decoder: Box<dyn PacketDecoder>) {
        info!("패킷 디코더 등록: opcode={} ({})", opcode, decoder.name());
        self.decoders.write().insert(opcode, decoder);
    }

    /// 프레임 하나를 해당 디코더로 분배합니다.
    ///
    /// 디코딩 실패는 패킷 단위 경고로 끝나고 전파되지 않습니다.
    pub fn dispatch(&self, opcode: i16, body: &[u8]) {
        let decoders = self.decoders.read();

        match decoders.get(&opcode) {
            Some(decoder) => {
                self.dispatched_packets.fetch_add(1, Ordering::Relaxed);

                if let Err(e) = decoder.handle(body) {
                    self.decode_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("패킷 디코딩 실패 (opcode={}): {}", opcode, e);
                }
            }
            None => {
                self.unknown_opcodes.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "미등록 opcode {} ({}바이트) 무시",
                    opcode,
                    body.len()
                );
            }
        }
    }

    /// 서버의 발행 싱크로 연결합니다.
    pub fn attach(self: Arc<Self>, server: &FrameServer) {
        server.on_packet_received(move |opcode, body| {
            self.dispatch(opcode, body);
        });
    }

    /// 디스패치 통계 조회
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched_packets: self.dispatched_packets.load(Ordering::Relaxed),
            unknown_opcodes: self.unknown_opcodes.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for PacketDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 센서 데이터 왕복 테스트
    #[test]
    fn test_sensor_data_roundtrip() {
        let data = SensorData {
            date: 1_700_000_000,
            temperature: 25,
        };

        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 12);

        let decoded = SensorData::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, data);
        println!("✅ 센서 데이터 왕복 성공: {:?}", decoded);
    }

    /// 길이가 틀린 본문 거부 테스트
    #[test]
    fn test_sensor_data_wrong_length() {
        assert!(SensorData::from_bytes(&[0u8; 11]).is_err());
        assert!(SensorData::from_bytes(&[0u8; 13]).is_err());
        assert!(SensorData::from_bytes(&[]).is_err());
    }

    /// 등록된 opcode 분배 테스트
    #[test]
    fn test_dispatch_known_opcode() {
        let dispatcher = PacketDispatcher::with_default_decoders();

        let body = SensorData {
            date: 123,
            temperature: -4,
        }
        .to_bytes();
        dispatcher.dispatch(SENSOR_DATA_OPCODE, &body);

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched_packets, 1);
        assert_eq!(stats.unknown_opcodes, 0);
        assert_eq!(stats.decode_failures, 0);
    }

    /// 미등록 opcode 경로 테스트
    #[test]
    fn test_dispatch_unknown_opcode() {
        let dispatcher = PacketDispatcher::with_default_decoders();

        dispatcher.dispatch(999, &[0xFF, 0xFF, 0xFF, 0xFF]);

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched_packets, 0);
        assert_eq!(stats.unknown_opcodes, 1);
    }

    /// 디코딩 실패 격리 테스트
    #[test]
    fn test_decode_failure_is_isolated() {
        let dispatcher = PacketDispatcher::with_default_decoders();

        // 길이가 틀린 센서 데이터는 경고만 남기고 계속
        dispatcher.dispatch(SENSOR_DATA_OPCODE, &[0x01, 0x02]);

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched_packets, 1);
        assert_eq!(stats.decode_failures, 1);
    }
}
