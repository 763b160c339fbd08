//! 패킷 핸들러 레이어
//!
//! 발행된 프레임을 opcode별로 디코딩하는 핸들러들을 포함합니다.
//! 서버 코어 바깥의 비즈니스 경계이며, 코어는 이 레이어 없이도
//! 동작합니다.

pub mod packet_handler;

pub use packet_handler::{
    DispatchStats, PacketDecoder, PacketDispatcher, SensorData, SensorDataDecoder,
    SENSOR_DATA_OPCODE,
};
