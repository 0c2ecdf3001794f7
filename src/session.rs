//! 송신 세션 상태
//!
//! fileId 하나의 송신 큐, 미확인 청크, 윈도우 크기를 소유함.
//! 세션 사이에 공유되는 상태는 없음

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::chunk::Chunk;
use crate::message::{FileId, FileMeta};

/// 전송 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Preparing,
    Sending,
    /// 큐는 비었고 ACK 대기 중
    Draining,
    Completed,
    Aborted,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Aborted)
    }

    /// 청크를 내보낼 수 있는 상태
    pub fn is_active(self) -> bool {
        matches!(self, TransferState::Sending | TransferState::Draining)
    }
}

/// 송신 대기 청크
#[derive(Debug, Clone)]
pub struct QueuedChunk {
    pub chunk: Chunk,
    pub retries: u32,
}

/// ACK 대기 중인 청크
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk: Chunk,
    pub sent_at: Instant,
    pub retries: u32,
}

/// 송신 진행 상황
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendProgress {
    /// ACK 받은 청크 수
    pub acked_chunks: u32,

    /// 한 번 이상 송신한 청크 수
    pub sent_chunks: u32,

    pub total_chunks: u32,

    /// 현재 윈도우 크기
    pub window: usize,

    pub state: TransferState,
}

impl SendProgress {
    /// 송신 비율 (sent / total)
    pub fn ratio(&self) -> f64 {
        if self.total_chunks == 0 {
            return 1.0;
        }
        self.sent_chunks as f64 / self.total_chunks as f64
    }
}

/// 송신 세션
#[derive(Debug)]
pub struct SendSession {
    pub file_id: FileId,

    pub meta: FileMeta,

    pub state: TransferState,

    /// 현재 윈도우 (미확인 청크 상한)
    pub window: usize,

    /// 송신 대기 큐 (재전송은 앞쪽)
    queue: VecDeque<QueuedChunk>,

    /// 미확인 청크 (index -> 상태)
    pending: HashMap<u32, PendingChunk>,

    acked_count: u32,

    sent_count: u32,

    /// 직전 ACK 수신 시각 (첫 ACK 전에는 송신 시작 시각)
    pub last_ack_at: Instant,

    pub started_at: Instant,
}

impl SendSession {
    /// 빈 세션 생성 (Idle)
    pub fn new(file_id: FileId, meta: FileMeta, window: usize, now: Instant) -> Self {
        Self {
            file_id,
            meta,
            state: TransferState::Idle,
            window,
            queue: VecDeque::new(),
            pending: HashMap::new(),
            acked_count: 0,
            sent_count: 0,
            last_ack_at: now,
            started_at: now,
        }
    }

    /// 분할된 청크를 송신 큐에 적재 (Idle -> Preparing)
    pub fn prepare(&mut self, chunks: Vec<Chunk>) {
        self.queue = chunks
            .into_iter()
            .map(|chunk| QueuedChunk { chunk, retries: 0 })
            .collect();
        self.transition(TransferState::Preparing);
    }

    /// 상태 전이
    pub fn transition(&mut self, next: TransferState) {
        if self.state != next {
            debug!("전송 {} 상태 변경: {:?} -> {:?}", self.file_id, self.state, next);
            self.state = next;
        }
    }

    /// 큐 앞에서 다음 청크 꺼내기
    pub fn next_chunk(&mut self) -> Option<QueuedChunk> {
        self.queue.pop_front()
    }

    /// 재전송 청크를 큐 앞쪽에 넣기
    pub fn requeue_front(&mut self, chunk: Chunk, retries: u32) {
        self.queue.push_front(QueuedChunk { chunk, retries });
    }

    /// 송신한 청크를 미확인 목록에 기록
    pub fn mark_pending(&mut self, chunk: Chunk, retries: u32, now: Instant) {
        if retries == 0 {
            self.sent_count += 1;
        }
        self.pending.insert(
            chunk.index,
            PendingChunk {
                chunk,
                sent_at: now,
                retries,
            },
        );
    }

    /// ACK 처리. 미확인이거나 재전송 대기 중인 청크였으면 true
    pub fn ack(&mut self, index: u32) -> bool {
        let known = if self.pending.remove(&index).is_some() {
            true
        } else if let Some(pos) = self.queue.iter().position(|q| q.chunk.index == index) {
            // 재전송 대기 중에 늦은 ACK 도착
            self.queue.remove(pos);
            true
        } else {
            false
        };

        if known {
            self.acked_count += 1;
        }
        known
    }

    /// 타임아웃된 미확인 청크를 꺼냄 (인덱스 오름차순)
    pub fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<PendingChunk> {
        let mut expired_ids: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent_at) >= timeout)
            .map(|(&idx, _)| idx)
            .collect();
        expired_ids.sort_unstable();

        expired_ids
            .into_iter()
            .filter_map(|idx| self.pending.remove(&idx))
            .collect()
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_pending(&self, index: u32) -> bool {
        self.pending.contains_key(&index)
    }

    /// 큐와 미확인 목록이 모두 비었는지
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.pending.is_empty()
    }

    /// 모든 큐/미확인 메모리 해제
    pub fn clear(&mut self) {
        self.queue = VecDeque::new();
        self.pending = HashMap::new();
    }

    pub fn progress(&self) -> SendProgress {
        SendProgress {
            acked_chunks: self.acked_count,
            sent_chunks: self.sent_count,
            total_chunks: self.meta.total_chunks,
            window: self.window,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::FileSlicer;
    use bytes::Bytes;

    fn session(size: usize, chunk_size: usize) -> SendSession {
        let data = Bytes::from(vec![7u8; size]);
        let chunks = FileSlicer::new(chunk_size).split(&data);
        let meta = FileMeta::new("s.bin", size as u64, chunk_size).unwrap();
        let mut session = SendSession::new(FileId::new("s").unwrap(), meta, 8, Instant::now());
        session.prepare(chunks);
        session
    }

    #[test]
    fn test_starts_idle_until_prepared() {
        let meta = FileMeta::new("i.bin", 250, 100).unwrap();
        let mut s = SendSession::new(FileId::new("i").unwrap(), meta, 8, Instant::now());
        assert_eq!(s.state, TransferState::Idle);
        assert!(!s.state.is_active());
        assert!(s.is_drained());

        let data = Bytes::from(vec![1u8; 250]);
        s.prepare(FileSlicer::new(100).split(&data));
        assert_eq!(s.state, TransferState::Preparing);
        assert_eq!(s.queued(), 3);
        assert_eq!(s.progress().total_chunks, 3);
    }

    #[test]
    fn test_ack_pending_and_requeued() {
        let mut s = session(300, 100);
        let now = Instant::now();

        let first = s.next_chunk().unwrap();
        s.mark_pending(first.chunk, 0, now);
        assert!(s.ack(0));
        assert!(!s.ack(0));

        // 큐에 있는 청크에 대한 ACK는 큐에서 제거
        assert!(s.ack(2));
        assert_eq!(s.queued(), 1);
        assert_eq!(s.progress().acked_chunks, 2);
    }

    #[test]
    fn test_take_expired_sorted() {
        let mut s = session(300, 100);
        let start = Instant::now();

        while let Some(q) = s.next_chunk() {
            s.mark_pending(q.chunk, q.retries, start);
        }
        let later = start + Duration::from_secs(5);
        let expired = s.take_expired(later, Duration::from_secs(3));

        let ids: Vec<u32> = expired.iter().map(|p| p.chunk.index).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(s.outstanding(), 0);
        assert_eq!(s.progress().sent_chunks, 3);
    }

    #[test]
    fn test_clear_drains() {
        let mut s = session(300, 100);
        let q = s.next_chunk().unwrap();
        s.mark_pending(q.chunk, 0, Instant::now());
        s.clear();
        assert!(s.is_drained());
    }
}
