//! 프레임 서버 통합 테스트
//!
//! 실제 서버를 임시 포트에 띄우고 클라이언트 관점에서 프레임
//! 수신/발행 경로를 검증합니다:
//! 1. 온전한 프레임 전송
//! 2. 임의 지점 분할 전송
//! 3. 한 번의 write에 여러 프레임
//! 4. 미등록 opcode 전달

use anyhow::Result;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};

use frameserver::config::FrameServerConfig;
use frameserver::handler::{PacketDispatcher, SensorData, SENSOR_DATA_OPCODE};
use frameserver::protocol::{encode_frame, write_frame};
use frameserver::service::FrameServer;

/// 수집 싱크가 달린 테스트 서버를 임시 포트에 띄웁니다.
async fn start_test_server() -> Result<(
    Arc<FrameServer>,
    SocketAddr,
    Arc<Mutex<Vec<(i16, Vec<u8>)>>>,
)> {
    let config = FrameServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };

    let server = Arc::new(FrameServer::new(config));
    let received = Arc::new(Mutex::new(Vec::new()));

    let received_ref = received.clone();
    server.on_packet_received(move |opcode, body| {
        received_ref.lock().push((opcode, body.to_vec()));
    });

    server.start().await?;
    let addr = server.local_addr().expect("서버가 바인드되지 않음");

    Ok((server, addr, received))
}

/// 발행된 프레임이 `count`개가 될 때까지 대기합니다.
async fn wait_for_frames(
    received: &Arc<Mutex<Vec<(i16, Vec<u8>)>>>,
    count: usize,
) -> Vec<(i16, Vec<u8>)> {
    for _ in 0..300 {
        if received.lock().len() >= count {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    received.lock().clone()
}

/// 센서 데이터 프레임 하나가 그대로 발행되는지 테스트
#[tokio::test]
async fn test_single_sensor_frame() -> Result<()> {
    let (server, addr, received) = start_test_server().await?;

    let reading = SensorData {
        date: 1_700_000_000,
        temperature: 25,
    };
    let body = reading.to_bytes();

    let mut client = TcpStream::connect(addr).await?;
    write_frame(&mut client, SENSOR_DATA_OPCODE, &body).await?;

    let frames = wait_for_frames(&received, 1).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, SENSOR_DATA_OPCODE);
    assert_eq!(frames[0].1, body.to_vec());
    println!("✅ 센서 프레임 발행 확인");

    server.stop(true).await?;
    Ok(())
}

/// 프레임을 8바이트 + 나머지로 나눠 보내도 한 번만 발행되는지 테스트
#[tokio::test]
async fn test_split_send_publishes_once() -> Result<()> {
    let (server, addr, received) = start_test_server().await?;

    let body = SensorData {
        date: 1_700_000_000,
        temperature: 25,
    }
    .to_bytes();
    let frame = encode_frame(SENSOR_DATA_OPCODE, &body)?;

    let mut client = TcpStream::connect(addr).await?;
    client.write_all(&frame[..8]).await?;
    client.flush().await?;
    sleep(Duration::from_millis(100)).await;
    client.write_all(&frame[8..]).await?;
    client.flush().await?;

    let frames = wait_for_frames(&received, 1).await;
    assert_eq!(frames, vec![(SENSOR_DATA_OPCODE, body.to_vec())]);

    // 추가 발행이 없는지 확인
    sleep(Duration::from_millis(100)).await;
    assert_eq!(received.lock().len(), 1);

    server.stop(true).await?;
    Ok(())
}

/// 한 번의 write로 보낸 두 프레임이 순서대로 발행되는지 테스트
#[tokio::test]
async fn test_two_frames_one_write() -> Result<()> {
    let (server, addr, received) = start_test_server().await?;

    let first_body = SensorData {
        date: 100,
        temperature: 1,
    }
    .to_bytes();
    let second_body = SensorData {
        date: 200,
        temperature: 2,
    }
    .to_bytes();

    let mut wire = encode_frame(SENSOR_DATA_OPCODE, &first_body)?;
    wire.extend_from_slice(&encode_frame(SENSOR_DATA_OPCODE, &second_body)?);

    let mut client = TcpStream::connect(addr).await?;
    client.write_all(&wire).await?;
    client.flush().await?;

    let frames = wait_for_frames(&received, 2).await;
    assert_eq!(
        frames,
        vec![
            (SENSOR_DATA_OPCODE, first_body.to_vec()),
            (SENSOR_DATA_OPCODE, second_body.to_vec()),
        ]
    );

    server.stop(true).await?;
    Ok(())
}

/// 미등록 opcode도 그대로 발행되고 디스패처가 집계하는지 테스트
#[tokio::test]
async fn test_unknown_opcode_passthrough() -> Result<()> {
    let (server, addr, received) = start_test_server().await?;

    let dispatcher = Arc::new(PacketDispatcher::with_default_decoders());
    dispatcher.clone().attach(&server);

    let mut client = TcpStream::connect(addr).await?;
    write_frame(&mut client, 999, &[0xFF, 0xFF, 0xFF, 0xFF]).await?;

    let frames = wait_for_frames(&received, 1).await;
    assert_eq!(frames, vec![(999, vec![0xFF; 4])]);

    // 디스패처의 미등록 opcode 경로가 탔는지 확인
    for _ in 0..100 {
        if dispatcher.stats().unknown_opcodes > 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(dispatcher.stats().unknown_opcodes, 1);
    assert_eq!(dispatcher.stats().dispatched_packets, 0);
    println!("✅ 미등록 opcode 경로 확인");

    server.stop(true).await?;
    Ok(())
}

/// 디스패처가 센서 데이터 프레임을 디코딩하는지 테스트
#[tokio::test]
async fn test_dispatcher_end_to_end() -> Result<()> {
    let (server, addr, _received) = start_test_server().await?;

    let dispatcher = Arc::new(PacketDispatcher::with_default_decoders());
    dispatcher.clone().attach(&server);

    let body = SensorData {
        date: 1_700_000_000,
        temperature: -12,
    }
    .to_bytes();

    let mut client = TcpStream::connect(addr).await?;
    write_frame(&mut client, SENSOR_DATA_OPCODE, &body).await?;

    for _ in 0..100 {
        if dispatcher.stats().dispatched_packets > 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    let stats = dispatcher.stats();
    assert_eq!(stats.dispatched_packets, 1);
    assert_eq!(stats.decode_failures, 0);

    server.stop(true).await?;
    Ok(())
}

/// 여러 클라이언트의 프레임이 연결별 순서를 지키는지 테스트
#[tokio::test]
async fn test_per_connection_ordering() -> Result<()> {
    let (server, addr, received) = start_test_server().await?;

    let mut first = TcpStream::connect(addr).await?;
    let mut second = TcpStream::connect(addr).await?;

    for i in 0..5i32 {
        write_frame(&mut first, 1, &i.to_le_bytes()).await?;
        write_frame(&mut second, 2, &i.to_le_bytes()).await?;
    }

    let frames = wait_for_frames(&received, 10).await;
    assert_eq!(frames.len(), 10);

    // 연결 간 순서는 보장되지 않지만 연결 내 순서는 보장됨
    for opcode in [1i16, 2] {
        let bodies: Vec<i32> = frames
            .iter()
            .filter(|(op, _)| *op == opcode)
            .map(|(_, body)| i32::from_le_bytes(body[..4].try_into().unwrap()))
            .collect();
        assert_eq!(bodies, vec![0, 1, 2, 3, 4], "opcode {} 순서", opcode);
    }
    println!("✅ 연결별 순서 보장 확인");

    server.stop(true).await?;
    Ok(())
}
