//! 에러 타입 정의

use std::fmt;

use thiserror::Error;

use crate::message::FileId;

/// 와이어 메시지 디코딩 에러
///
/// 잘못된 입력은 항상 이 값으로 반환되며 패닉하지 않음
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("버퍼가 헤더보다 짧음: {len} < {min}")]
    TooShort { len: usize, min: usize },

    #[error("알 수 없는 메시지 타입: {0}")]
    UnknownTag(u8),

    #[error("파일 이름 길이 초과: {len} > {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("유효하지 않은 UTF-8 필드: {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("빈 fileId")]
    EmptyFileId,

    #[error("파일 크기 범위 초과: {0}")]
    FileSizeOutOfRange(u64),

    #[error("청크 인덱스 범위 초과: {index} >= {total}")]
    ChunkIndexOutOfRange { index: u32, total: u32 },

    #[error("파일 크기와 청크 수 불일치: size={file_size}, chunks={total_chunks}")]
    InconsistentMetadata { file_size: u64, total_chunks: u32 },

    #[error("헤더 뒤에 예상치 못한 바이트: {0}")]
    TrailingBytes(usize),
}

/// 전송 중단 원인
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// 호출자가 취소
    Cancelled,

    /// 채널 종료
    ChannelClosed,

    /// 채널 에러
    ChannelError(String),

    /// 재전송 한도 초과
    RetriesExhausted { chunk_index: u32 },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "취소됨"),
            AbortReason::ChannelClosed => write!(f, "채널 종료"),
            AbortReason::ChannelError(msg) => write!(f, "채널 에러: {}", msg),
            AbortReason::RetriesExhausted { chunk_index } => {
                write!(f, "청크 {} 재전송 한도 초과", chunk_index)
            }
        }
    }
}

/// DTP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("디코딩 에러: {0}")]
    Decode(#[from] DecodeError),

    #[error("전송 중단: file_id={file_id}, 원인: {reason}")]
    TransferAborted { file_id: FileId, reason: AbortReason },

    #[error("청크 누락: file_id={file_id}, chunk_index={chunk_index}")]
    MissingChunk { file_id: FileId, chunk_index: u32 },

    #[error("조립 크기 불일치: file_id={file_id}, expected {expected}, got {got}")]
    SizeMismatch {
        file_id: FileId,
        expected: u64,
        got: u64,
    },

    #[error("무결성 해시 불일치: file_id={file_id}")]
    IntegrityMismatch { file_id: FileId },

    #[error("수신 타임아웃: file_id={file_id}, {received}/{total} 청크 수신")]
    ReceiveTimeout {
        file_id: FileId,
        received: u32,
        total: u32,
    },

    #[error("파일 이름이 너무 김: {len} bytes (최대 {max})")]
    FileNameTooLong { len: usize, max: usize },

    #[error("파일이 너무 큼: {size} bytes")]
    FileTooLarge { size: u64 },

    #[error("유효하지 않은 fileId: {0:?}")]
    InvalidFileId(String),

    #[error("채널 종료")]
    ChannelClosed,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 전송 중단 에러 생성
    pub fn aborted(file_id: &FileId, reason: AbortReason) -> Self {
        Error::TransferAborted {
            file_id: file_id.clone(),
            reason,
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
