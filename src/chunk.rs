//! 청크 분할과 수신 버퍼
//!
//! - Chunk: 파일의 고정 최대 크기 조각 (마지막 청크만 짧을 수 있음)
//! - ReceiveBuffer: 수신측 fileId별 조립 버퍼

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use crate::message::{FileId, FileMeta};
use crate::{Error, Result, HASH_SIZE};

/// 청크 (송신 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0부터 시작하는 청크 인덱스
    pub index: u32,

    /// 청크 데이터 (원본 파일 버퍼 공유)
    pub data: Bytes,
}

/// 파일 분할기 (송신측)
#[derive(Debug, Clone)]
pub struct FileSlicer {
    chunk_size: usize,
}

impl FileSlicer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// 데이터를 순서대로 청크 분할 (복사 없음)
    pub fn split(&self, data: &Bytes) -> Vec<Chunk> {
        (0..data.len())
            .step_by(self.chunk_size)
            .enumerate()
            .map(|(idx, offset)| {
                let end = (offset + self.chunk_size).min(data.len());
                Chunk {
                    index: idx as u32,
                    data: data.slice(offset..end),
                }
            })
            .collect()
    }
}

/// 청크 삽입 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 새 청크 저장됨
    Inserted,

    /// 이미 받은 청크 (상태 변화 없음)
    Duplicate,

    /// 버퍼와 맞지 않는 청크
    Rejected(&'static str),
}

/// 수신 버퍼 (fileId 하나의 조립 상태)
#[derive(Debug)]
pub struct ReceiveBuffer {
    pub file_id: FileId,

    pub meta: FileMeta,

    /// 수신된 청크 (index -> 데이터)
    received_chunks: HashMap<u32, Bytes>,

    /// 수신된 청크 수
    received_count: u32,

    /// 수신된 총 바이트
    received_bytes: u64,

    /// 생성 시간
    pub created_at: Instant,

    /// 마지막 청크 수신 시간
    last_received_time: Instant,

    /// FileComplete로 받은 기대 해시
    expected_hash: Option<[u8; HASH_SIZE]>,
}

impl ReceiveBuffer {
    /// 새 수신 버퍼 생성
    pub fn new(file_id: FileId, meta: FileMeta, now: Instant) -> Self {
        Self {
            file_id,
            received_chunks: HashMap::with_capacity(meta.total_chunks.min(4096) as usize),
            meta,
            received_count: 0,
            received_bytes: 0,
            created_at: now,
            last_received_time: now,
            expected_hash: None,
        }
    }

    /// 청크 삽입
    pub fn insert(&mut self, index: u32, payload: Bytes, now: Instant) -> InsertOutcome {
        if index >= self.meta.total_chunks {
            return InsertOutcome::Rejected("chunk index out of range");
        }

        // 이미 받은 청크면 무시
        if self.received_chunks.contains_key(&index) {
            return InsertOutcome::Duplicate;
        }

        if self.received_bytes + payload.len() as u64 > self.meta.file_size {
            return InsertOutcome::Rejected("payload exceeds file size");
        }

        self.received_bytes += payload.len() as u64;
        self.received_chunks.insert(index, payload);
        self.received_count += 1;
        self.last_received_time = now;
        InsertOutcome::Inserted
    }

    /// 완료 여부 확인
    pub fn is_complete(&self) -> bool {
        self.received_count >= self.meta.total_chunks
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    pub fn contains(&self, index: u32) -> bool {
        self.received_chunks.contains_key(&index)
    }

    /// 누락된 청크 인덱스 목록
    pub fn missing_indices(&self) -> Vec<u32> {
        (0..self.meta.total_chunks)
            .filter(|idx| !self.received_chunks.contains_key(idx))
            .collect()
    }

    /// 마지막 청크 이후 경과 시간
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received_time)
    }

    pub fn set_expected_hash(&mut self, hash: [u8; HASH_SIZE]) {
        self.expected_hash = Some(hash);
    }

    pub fn expected_hash(&self) -> Option<&[u8; HASH_SIZE]> {
        self.expected_hash.as_ref()
    }

    /// 인덱스 순서로 청크를 이어 붙여 파일 조립
    pub fn assemble(self) -> Result<Bytes> {
        let mut data = BytesMut::with_capacity(self.received_bytes as usize);

        for index in 0..self.meta.total_chunks {
            let chunk = self
                .received_chunks
                .get(&index)
                .ok_or_else(|| Error::MissingChunk {
                    file_id: self.file_id.clone(),
                    chunk_index: index,
                })?;
            data.extend_from_slice(chunk);
        }

        if data.len() as u64 != self.meta.file_size {
            return Err(Error::SizeMismatch {
                file_id: self.file_id,
                expected: self.meta.file_size,
                got: data.len() as u64,
            });
        }

        Ok(data.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::total_chunks_for;

    fn meta(size: u64, chunk_size: usize) -> FileMeta {
        FileMeta::new("test.bin", size, chunk_size).unwrap()
    }

    fn pattern(size: usize) -> Bytes {
        Bytes::from((0..size).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    #[test]
    fn test_split_sizes() {
        let chunk_size = 100;
        let slicer = FileSlicer::new(chunk_size);

        for size in [0usize, 1, 99, 100, 101, 250, 300, 1001] {
            let data = pattern(size);
            let chunks = slicer.split(&data);

            let total = total_chunks_for(size as u64, chunk_size) as usize;
            assert_eq!(chunks.len(), total);
            assert_eq!(chunks.iter().map(|c| c.data.len()).sum::<usize>(), size);

            if let Some(last) = chunks.last() {
                assert_eq!(last.data.len(), size - (total - 1) * chunk_size);
                for chunk in &chunks[..total - 1] {
                    assert_eq!(chunk.data.len(), chunk_size);
                }
            }
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index as usize, i);
            }
        }
    }

    #[test]
    fn test_reverse_order_assembly() {
        let slicer = FileSlicer::new(100);
        let data = pattern(3 * 100 + 1);
        let chunks = slicer.split(&data);

        let now = Instant::now();
        let mut buffer = ReceiveBuffer::new(FileId::new("rev").unwrap(), meta(301, 100), now);

        for chunk in chunks.iter().rev() {
            assert_eq!(
                buffer.insert(chunk.index, chunk.data.clone(), now),
                InsertOutcome::Inserted
            );
        }

        assert!(buffer.is_complete());
        assert_eq!(buffer.assemble().unwrap(), data);
    }

    #[test]
    fn test_duplicate_chunk_is_idempotent() {
        let slicer = FileSlicer::new(100);
        let data = pattern(250);
        let chunks = slicer.split(&data);

        let now = Instant::now();
        let mut buffer = ReceiveBuffer::new(FileId::new("dup").unwrap(), meta(250, 100), now);

        assert_eq!(
            buffer.insert(0, chunks[0].data.clone(), now),
            InsertOutcome::Inserted
        );
        assert_eq!(
            buffer.insert(0, chunks[0].data.clone(), now),
            InsertOutcome::Duplicate
        );
        assert_eq!(buffer.received_count(), 1);

        for chunk in &chunks[1..] {
            buffer.insert(chunk.index, chunk.data.clone(), now);
        }
        assert_eq!(buffer.received_count(), 3);
        assert_eq!(buffer.assemble().unwrap(), data);
    }

    #[test]
    fn test_missing_chunk_error() {
        let now = Instant::now();
        let mut buffer = ReceiveBuffer::new(FileId::new("miss").unwrap(), meta(250, 100), now);
        buffer.insert(0, pattern(100), now);
        buffer.insert(2, pattern(50), now);

        assert_eq!(buffer.missing_indices(), vec![1]);
        assert!(matches!(
            buffer.assemble(),
            Err(Error::MissingChunk { chunk_index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let now = Instant::now();
        let mut buffer = ReceiveBuffer::new(FileId::new("big").unwrap(), meta(150, 100), now);
        assert_eq!(buffer.insert(0, pattern(100), now), InsertOutcome::Inserted);
        assert!(matches!(
            buffer.insert(1, pattern(100), now),
            InsertOutcome::Rejected(_)
        ));
        assert!(matches!(
            buffer.insert(5, pattern(10), now),
            InsertOutcome::Rejected(_)
        ));
        assert_eq!(buffer.received_count(), 1);
    }
}
