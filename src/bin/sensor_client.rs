//! 데모 센서 클라이언트
//!
//! 서버에 접속해 센서 데이터 프레임을 전송하는 예제 클라이언트입니다.
//! 두 번째 프레임은 헤더 중간에서 나눠 보내 부분 수신 조립을
//! 시연합니다.
//!
//! 사용법:
//! ```text
//! sensor_client [서버주소]   # 기본값: 127.0.0.1:4000
//! ```

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};
use tracing::info;

use frameserver::handler::{SensorData, SENSOR_DATA_OPCODE};
use frameserver::protocol::{encode_frame, write_frame};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4000".to_string());

    info!("서버 접속 중: {}", addr);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("서버 접속 실패: {}", addr))?;

    // 1. 온전한 프레임 하나 전송
    let reading = SensorData {
        date: chrono::Utc::now().timestamp(),
        temperature: 25,
    };
    write_frame(&mut stream, SENSOR_DATA_OPCODE, &reading.to_bytes()).await?;
    info!("✅ 센서 데이터 전송: {:?}", reading);

    // 2. 같은 프레임을 8바이트 + 나머지로 나눠 전송 (부분 수신 시연)
    let reading = SensorData {
        date: chrono::Utc::now().timestamp(),
        temperature: 26,
    };
    let frame = encode_frame(SENSOR_DATA_OPCODE, &reading.to_bytes())?;

    stream.write_all(&frame[..8]).await?;
    stream.flush().await?;
    sleep(Duration::from_millis(100)).await;
    stream.write_all(&frame[8..]).await?;
    stream.flush().await?;
    info!("✅ 분할 전송 완료: {:?}", reading);

    sleep(Duration::from_millis(100)).await;
    info!("클라이언트 종료");
    Ok(())
}
