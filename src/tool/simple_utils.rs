//! 간단한 공통 유틸리티

use std::time::{SystemTime, UNIX_EPOCH};

/// 간단한 데이터 유틸리티
pub struct SimpleUtils;

impl SimpleUtils {
    /// 현재 타임스탬프 (초)
    pub fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// 바이트를 16진수로 변환
    pub fn bytes_to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// 프레임 본문 디버그 로그용 16진수 미리보기
    ///
    /// 앞부분 `max_len` 바이트만 변환하고 잘린 경우 말줄임을 붙입니다.
    pub fn hex_preview(bytes: &[u8], max_len: usize) -> String {
        if bytes.len() <= max_len {
            Self::bytes_to_hex(bytes)
        } else {
            format!("{}..({}바이트)", Self::bytes_to_hex(&bytes[..max_len]), bytes.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp() {
        let ts = SimpleUtils::current_timestamp();
        assert!(ts > 0);
    }

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(SimpleUtils::bytes_to_hex(&[0x01, 0xAB]), "01ab");
    }

    #[test]
    fn test_hex_preview() {
        let data = vec![0xFFu8; 8];
        let preview = SimpleUtils::hex_preview(&data, 4);
        assert!(preview.starts_with("ffffffff"));
        assert!(preview.contains("8바이트"));
    }
}
