//! # DTP (Datagram Transfer Protocol)
//!
//! 메시지 기반 데이터그램 채널 위의 ACK 윈도우형 청크 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **고정 오프셋 바이너리 프레이밍**: 청크마다 파싱 비용 최소화
//! - **청크 분할/조립**: 순서 뒤바뀜, 중복, 손실 허용
//! - **슬라이딩 윈도우**: RTT 근사치 기반 적응형 윈도우 크기
//! - **청크별 ACK**: 타임아웃 기반 재전송, 재전송은 큐 앞쪽 우선
//! - **백프레셔**: 채널 버퍼 워터마크 초과 시 송신 일시정지
//! - **fileId 단위 세션**: 한 채널에서 여러 전송 동시 진행

pub mod channel;
pub mod chunk;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stats;
pub mod window;

pub use channel::{Channel, ChannelEvent, ChannelEvents, MemoryChannel, UdpChannel};
pub use chunk::{Chunk, FileSlicer, ReceiveBuffer};
pub use config::{Config, RetryExhaustion};
pub use endpoint::{on_receive_ready, Endpoint};
pub use error::{AbortReason, DecodeError, Error, Result};
pub use message::{FileId, FileMeta, Message, MessageType};
pub use receiver::{ReceiveEvent, ReceiveEvents, ReceivedFile, Receiver};
pub use sender::{CancelHandle, OutgoingFile, SendHandle, SendReport, Sender};
pub use session::{SendProgress, TransferState};
pub use stats::{ReceiveStats, SendStats};
pub use window::WindowController;

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// fileId 필드 폭 (바이트, NUL 패딩)
pub const FILE_ID_SIZE: usize = 36;

/// 파일 이름 최대 길이 (UTF-8 바이트)
pub const MAX_FILE_NAME_LEN: usize = 255;

/// 무결성 해시 크기 (SHA-256)
pub const HASH_SIZE: usize = 32;

/// 최대 파일 크기 (2^53 - 1)
pub const MAX_FILE_SIZE: u64 = (1 << 53) - 1;

/// 고정 헤더 크기
///
/// tag(1) + fileId(36) + chunkIndex(4) + totalChunks(4) + fileSize(8)
/// + nameLen(2) + name(255) + flags(1) + hash(32)
pub const HEADER_SIZE: usize = 1 + FILE_ID_SIZE + 4 + 4 + 8 + 2 + MAX_FILE_NAME_LEN + 1 + HASH_SIZE;

/// 최대 청크 크기 (UDP 데이터그램 하나에 들어가는 크기)
pub const MAX_CHUNK_SIZE: usize = 65_507 - HEADER_SIZE;

/// 청크 수 계산: ceil(file_size / chunk_size)
pub fn total_chunks_for(file_size: u64, chunk_size: usize) -> u64 {
    let chunk_size = chunk_size.max(1) as u64;
    (file_size + chunk_size - 1) / chunk_size
}
