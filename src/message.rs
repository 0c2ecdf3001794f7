//! 프로토콜 메시지 정의
//!
//! 고정 오프셋 바이너리 프레이밍 (리틀엔디안)
//!
//! ```text
//! [0]        메시지 타입
//! [1..37]    fileId (UTF-8, NUL 패딩)
//! [37..41]   chunkIndex (u32)
//! [41..45]   totalChunks (u32)
//! [45..53]   fileSize (u64)
//! [53..55]   fileNameLength (u16)
//! [55..310]  fileName (NUL 패딩)
//! [310]      flags (bit 0 = 해시 있음)
//! [311..343] SHA-256 해시
//! [343..]    페이로드 (FileChunk 전용)
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::DecodeError;
use crate::{
    total_chunks_for, Error, Result, FILE_ID_SIZE, HASH_SIZE, HEADER_SIZE, MAX_FILE_NAME_LEN,
    MAX_FILE_SIZE,
};

const FLAG_HAS_HASH: u8 = 0x01;

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// 전송 시작 (메타데이터)
    FileStart = 1,

    /// 데이터 청크
    FileChunk = 2,

    /// 청크 수신 확인
    ChunkAck = 3,

    /// 전송 완료 알림 (참고용)
    FileComplete = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(tag: u8) -> std::result::Result<Self, DecodeError> {
        match tag {
            1 => Ok(MessageType::FileStart),
            2 => Ok(MessageType::FileChunk),
            3 => Ok(MessageType::ChunkAck),
            4 => Ok(MessageType::FileComplete),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

/// 전송 세션 식별자
///
/// 한 채널에서 동시에 진행 중인 전송 사이에서 유일해야 함
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(String);

impl FileId {
    /// 문자열로부터 생성 (1..=36 바이트, NUL 불가)
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > FILE_ID_SIZE || id.contains('\0') {
            return Err(Error::InvalidFileId(id));
        }
        Ok(Self(id))
    }

    /// 시간 기반 값 + 랜덤 접미사로 새 ID 생성
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        Self(format!("{:x}-{}", millis, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 파일 메타데이터 (FileStart / FileChunk 공통)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
}

impl FileMeta {
    /// 파일 이름과 크기로 메타데이터 생성
    pub fn new(file_name: impl Into<String>, file_size: u64, chunk_size: usize) -> Result<Self> {
        let file_name = file_name.into();
        if file_name.len() > MAX_FILE_NAME_LEN {
            return Err(Error::FileNameTooLong {
                len: file_name.len(),
                max: MAX_FILE_NAME_LEN,
            });
        }
        if file_size > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge { size: file_size });
        }
        let total_chunks = u32::try_from(total_chunks_for(file_size, chunk_size))
            .map_err(|_| Error::FileTooLarge { size: file_size })?;

        Ok(Self {
            file_name,
            file_size,
            total_chunks,
        })
    }

    /// 크기와 청크 수 일관성 검사
    pub fn validate(&self) -> std::result::Result<(), DecodeError> {
        if self.file_size > MAX_FILE_SIZE {
            return Err(DecodeError::FileSizeOutOfRange(self.file_size));
        }
        let consistent = (self.file_size == 0) == (self.total_chunks == 0)
            && self.total_chunks as u64 <= self.file_size;
        if !consistent {
            return Err(DecodeError::InconsistentMetadata {
                file_size: self.file_size,
                total_chunks: self.total_chunks,
            });
        }
        Ok(())
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    FileStart {
        file_id: FileId,
        meta: FileMeta,
    },
    FileChunk {
        file_id: FileId,
        meta: FileMeta,
        chunk_index: u32,
        payload: Bytes,
    },
    ChunkAck {
        file_id: FileId,
        chunk_index: u32,
    },
    FileComplete {
        file_id: FileId,
        hash: Option<[u8; HASH_SIZE]>,
    },
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::FileStart { .. } => MessageType::FileStart,
            Message::FileChunk { .. } => MessageType::FileChunk,
            Message::ChunkAck { .. } => MessageType::ChunkAck,
            Message::FileComplete { .. } => MessageType::FileComplete,
        }
    }

    pub fn file_id(&self) -> &FileId {
        match self {
            Message::FileStart { file_id, .. }
            | Message::FileChunk { file_id, .. }
            | Message::ChunkAck { file_id, .. }
            | Message::FileComplete { file_id, .. } => file_id,
        }
    }

    /// 바이트로 직렬화
    ///
    /// 사용하지 않는 필드는 0으로 채움
    pub fn encode(&self) -> Bytes {
        let payload_len = match self {
            Message::FileChunk { payload, .. } => payload.len(),
            _ => 0,
        };
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload_len);

        buf.put_u8(self.msg_type() as u8);
        put_padded(&mut buf, self.file_id().as_str().as_bytes(), FILE_ID_SIZE);

        let (chunk_index, meta) = match self {
            Message::FileStart { meta, .. } => (0, Some(meta)),
            Message::FileChunk {
                meta, chunk_index, ..
            } => (*chunk_index, Some(meta)),
            Message::ChunkAck { chunk_index, .. } => (*chunk_index, None),
            Message::FileComplete { .. } => (0, None),
        };

        buf.put_u32_le(chunk_index);
        match meta {
            Some(meta) => {
                let name = truncate_name(&meta.file_name);
                buf.put_u32_le(meta.total_chunks);
                buf.put_u64_le(meta.file_size);
                buf.put_u16_le(name.len() as u16);
                put_padded(&mut buf, name.as_bytes(), MAX_FILE_NAME_LEN);
            }
            None => buf.put_bytes(0, 4 + 8 + 2 + MAX_FILE_NAME_LEN),
        }

        match self {
            Message::FileComplete {
                hash: Some(hash), ..
            } => {
                buf.put_u8(FLAG_HAS_HASH);
                buf.put_slice(hash);
            }
            _ => buf.put_bytes(0, 1 + HASH_SIZE),
        }

        debug_assert_eq!(buf.len(), HEADER_SIZE);

        if let Message::FileChunk { payload, .. } = self {
            buf.put_slice(payload);
        }

        buf.freeze()
    }

    /// 바이트에서 역직렬화
    ///
    /// 페이로드는 입력 버퍼를 복사하지 않고 공유함
    pub fn decode(bytes: &Bytes) -> std::result::Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort {
                len: bytes.len(),
                min: HEADER_SIZE,
            });
        }

        let mut header = &bytes[..HEADER_SIZE];
        let msg_type = MessageType::try_from(header.get_u8())?;

        let file_id = decode_file_id(&header[..FILE_ID_SIZE])?;
        header.advance(FILE_ID_SIZE);

        let chunk_index = header.get_u32_le();
        let total_chunks = header.get_u32_le();
        let file_size = header.get_u64_le();
        let name_len = header.get_u16_le() as usize;
        let name_field = &header[..MAX_FILE_NAME_LEN];
        header.advance(MAX_FILE_NAME_LEN);
        let flags = header.get_u8();
        let hash_field = &header[..HASH_SIZE];

        let trailing = bytes.len() - HEADER_SIZE;
        if msg_type != MessageType::FileChunk && trailing > 0 {
            return Err(DecodeError::TrailingBytes(trailing));
        }

        let read_meta = || -> std::result::Result<FileMeta, DecodeError> {
            if name_len > MAX_FILE_NAME_LEN {
                return Err(DecodeError::NameTooLong {
                    len: name_len,
                    max: MAX_FILE_NAME_LEN,
                });
            }
            let file_name = std::str::from_utf8(&name_field[..name_len])
                .map_err(|_| DecodeError::InvalidUtf8 { field: "fileName" })?
                .to_string();
            let meta = FileMeta {
                file_name,
                file_size,
                total_chunks,
            };
            meta.validate()?;
            Ok(meta)
        };

        let message = match msg_type {
            MessageType::FileStart => Message::FileStart {
                file_id,
                meta: read_meta()?,
            },
            MessageType::FileChunk => {
                let meta = read_meta()?;
                if chunk_index >= meta.total_chunks {
                    return Err(DecodeError::ChunkIndexOutOfRange {
                        index: chunk_index,
                        total: meta.total_chunks,
                    });
                }
                Message::FileChunk {
                    file_id,
                    meta,
                    chunk_index,
                    payload: bytes.slice(HEADER_SIZE..),
                }
            }
            MessageType::ChunkAck => Message::ChunkAck {
                file_id,
                chunk_index,
            },
            MessageType::FileComplete => {
                let hash = if flags & FLAG_HAS_HASH != 0 {
                    let mut hash = [0u8; HASH_SIZE];
                    hash.copy_from_slice(hash_field);
                    Some(hash)
                } else {
                    None
                };
                Message::FileComplete { file_id, hash }
            }
        };

        Ok(message)
    }
}

fn put_padded(buf: &mut BytesMut, value: &[u8], width: usize) {
    let len = value.len().min(width);
    buf.put_slice(&value[..len]);
    buf.put_bytes(0, width - len);
}

/// 최대 길이를 넘는 이름은 문자 경계에서 자름
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_FILE_NAME_LEN {
        return name;
    }
    let mut end = MAX_FILE_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn decode_file_id(field: &[u8]) -> std::result::Result<FileId, DecodeError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    if end == 0 {
        return Err(DecodeError::EmptyFileId);
    }
    let id = std::str::from_utf8(&field[..end])
        .map_err(|_| DecodeError::InvalidUtf8 { field: "fileId" })?;
    Ok(FileId(id.to_string()))
}
