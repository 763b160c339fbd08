//! 프레임 프로토콜 정의
//!
//! 클라이언트와 서버 간 통신을 위한 바이너리 프레임 형식을 정의합니다.
//! 모든 멀티바이트 필드는 리틀 엔디언입니다.
//!
//! # 프레임 구조
//!
//! ```text
//! [opcode: i16 LE][body_len: i32 LE][body: body_len 바이트]
//! ```
//!
//! 헤더는 정확히 6바이트이며 매직 넘버, 버전, 체크섬이 없습니다.
//! 호환성은 전적으로 필드 위치에 의존합니다.
//!
//! # 사용 예시
//!
//! ```rust
//! use frameserver::protocol::{FrameHeader, encode_frame};
//!
//! let header = FrameHeader { opcode: 0, body_len: 12 };
//! let bytes = header.encode();
//! let parsed = FrameHeader::parse(&bytes).unwrap();
//! assert_eq!(parsed, header);
//!
//! let frame = encode_frame(0, &[1, 2, 3]).unwrap();
//! assert_eq!(frame.len(), 6 + 3);
//! ```

use anyhow::{anyhow, Result};
use bytes::{Buf, BufMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// 프레임 헤더 길이 (바이트)
pub const HEADER_LEN: usize = 6;

/// 기본 본문 길이 상한 (16 MiB)
///
/// 악의적이거나 손상된 헤더가 무제한 할당을 유발하지 못하도록
/// 연결 단위로 강제됩니다. 초과 시 해당 연결은 종료됩니다.
pub const DEFAULT_MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// 프레임 헤더
///
/// opcode는 페이로드 스키마를 선택하는 16비트 식별자이며
/// 서버 코어는 그 의미를 해석하지 않습니다. body_len은 본문 길이로
/// 0이 허용됩니다 (빈 본문 프레임).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: i16,
    pub body_len: u32,
}

impl FrameHeader {
    /// 6바이트 버퍼에서 헤더를 파싱합니다.
    ///
    /// # Errors
    ///
    /// * 와이어 상의 길이 필드가 음수일 때 (정상 인코더는 생성할 수
    ///   없지만 임의의 피어는 보낼 수 있음)
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        let mut cursor = &buf[..];
        let opcode = cursor.get_i16_le();
        let body_len = cursor.get_i32_le();

        if body_len < 0 {
            return Err(anyhow!("음수 본문 길이: {}", body_len));
        }

        Ok(Self {
            opcode,
            body_len: body_len as u32,
        })
    }

    /// 헤더를 6바이트로 인코딩합니다.
    ///
    /// 송신 경로는 서버에 없지만 클라이언트와 테스트가 사용하는
    /// 대칭 연산입니다.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let mut cursor = &mut buf[..];
        cursor.put_i16_le(self.opcode);
        cursor.put_i32_le(self.body_len as i32);
        buf
    }
}

/// 완성된 프레임 하나를 인코딩합니다.
///
/// # Errors
///
/// * 본문이 i32 범위를 넘을 때 (와이어 형식으로 표현 불가)
pub fn encode_frame(opcode: i16, body: &[u8]) -> Result<Vec<u8>> {
    if body.len() > i32::MAX as usize {
        return Err(anyhow!("본문이 너무 큽니다: {}바이트", body.len()));
    }

    let header = FrameHeader {
        opcode,
        body_len: body.len() as u32,
    };

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// 스트림에 프레임 하나를 씁니다.
///
/// 데모 클라이언트와 테스트 전용 헬퍼입니다. 서버는 송신하지 않습니다.
pub async fn write_frame<W>(stream: &mut W, opcode: i16, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(opcode, body)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 헤더 인코딩/파싱 왕복 테스트
    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader {
            opcode: 42,
            body_len: 1024,
        };

        let bytes = header.encode();
        let parsed = FrameHeader::parse(&bytes).unwrap();

        assert_eq!(parsed, header);
        println!("✅ 헤더 왕복 성공: {:?}", parsed);
    }

    /// 리틀 엔디언 바이트 배치 테스트
    #[test]
    fn test_header_wire_layout() {
        let header = FrameHeader {
            opcode: 0x0102,
            body_len: 0x0A0B0C0D,
        };

        let bytes = header.encode();
        assert_eq!(bytes, [0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A]);
    }

    /// 음수 opcode 처리 테스트
    #[test]
    fn test_negative_opcode() {
        let header = FrameHeader {
            opcode: -7,
            body_len: 0,
        };

        let parsed = FrameHeader::parse(&header.encode()).unwrap();
        assert_eq!(parsed.opcode, -7);
        assert_eq!(parsed.body_len, 0);
    }

    /// 음수 본문 길이 거부 테스트
    #[test]
    fn test_negative_body_len_rejected() {
        let mut buf = [0u8; HEADER_LEN];
        {
            let mut cursor = &mut buf[..];
            cursor.put_i16_le(0);
            cursor.put_i32_le(-1);
        }

        assert!(FrameHeader::parse(&buf).is_err());
        println!("✅ 음수 본문 길이 거부됨");
    }

    /// 빈 본문 프레임 인코딩 테스트
    #[test]
    fn test_zero_body_frame() {
        let frame = encode_frame(5, &[]).unwrap();
        assert_eq!(frame.len(), HEADER_LEN);

        let mut header_buf = [0u8; HEADER_LEN];
        header_buf.copy_from_slice(&frame);
        let header = FrameHeader::parse(&header_buf).unwrap();
        assert_eq!(header.opcode, 5);
        assert_eq!(header.body_len, 0);
    }

    /// 프레임 인코딩 테스트
    #[test]
    fn test_encode_frame() {
        let body = vec![0xFF; 4];
        let frame = encode_frame(999, &body).unwrap();

        assert_eq!(frame.len(), HEADER_LEN + 4);
        assert_eq!(&frame[HEADER_LEN..], &body[..]);
    }
}
