//! 수신자
//!
//! - fileId별 수신 버퍼에 청크 저장 및 조립
//! - 청크마다 즉시 ACK (배치 없음)
//! - FileStart 손실/순서 뒤바뀜 허용: 청크에 실린 메타데이터로 버퍼 생성
//! - FileComplete는 해시 검증용 (조립 시점은 수신 청크 수로만 결정)
//! - 버퍼보다 먼저 도착한 FileComplete의 해시는 `completed_retention` 동안 보관했다가
//!   버퍼가 생기면 적용
//!
//! FileComplete에는 메타데이터가 없으므로 FileStart가 손실된 0바이트 파일은
//! 전달되지 않음 (청크가 없어 버퍼를 만들 근거가 없음). 송신측은 정상 완료로 끝남

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::chunk::{InsertOutcome, ReceiveBuffer};
use crate::message::{FileId, FileMeta, Message};
use crate::stats::ReceiveStats;
use crate::{AbortReason, Config, DecodeError, Error, HASH_SIZE};

/// 조립 완료된 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub file_id: FileId,
    pub file_name: String,
    pub data: Bytes,
}

/// 수신 이벤트
#[derive(Debug)]
pub enum ReceiveEvent {
    /// 새 수신 버퍼 생성
    Started { file_id: FileId, meta: FileMeta },

    /// 새 청크 저장
    Progress {
        file_id: FileId,
        received: u32,
        total: u32,
    },

    /// 파일 조립 완료
    Completed(ReceivedFile),

    /// 수신 실패 (누락, 해시 불일치, 타임아웃, 채널 종료)
    Failed { file_id: FileId, error: Error },
}

/// 수신 이벤트 스트림
pub type ReceiveEvents = mpsc::UnboundedReceiver<ReceiveEvent>;

/// 최근 완료된 전송 기록
///
/// 늦게 도착한 재전송 청크에 다시 ACK하고 버퍼가 재생성되지 않도록 보관
#[derive(Debug)]
struct CompletedEntry {
    digest: Option<[u8; HASH_SIZE]>,
    at: Instant,
}

/// 버퍼보다 먼저 도착한 FileComplete의 해시
#[derive(Debug)]
struct EarlyHash {
    hash: [u8; HASH_SIZE],
    at: Instant,
}

/// 수신 엔진 (채널 하나당 하나)
pub struct Receiver {
    config: Config,
    channel: Arc<dyn Channel>,
    buffers: HashMap<FileId, ReceiveBuffer>,
    completed: HashMap<FileId, CompletedEntry>,
    early_hashes: HashMap<FileId, EarlyHash>,
    events_tx: mpsc::UnboundedSender<ReceiveEvent>,
    stats: ReceiveStats,
}

impl Receiver {
    /// 새 수신자 생성
    pub fn new(channel: Arc<dyn Channel>, config: Config) -> (Self, ReceiveEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let receiver = Self {
            config,
            channel,
            buffers: HashMap::new(),
            completed: HashMap::new(),
            early_hashes: HashMap::new(),
            events_tx,
            stats: ReceiveStats::default(),
        };
        (receiver, events_rx)
    }

    /// 디코딩된 메시지 처리
    pub fn handle_message(&mut self, message: Message, now: Instant) {
        match message {
            Message::FileStart { file_id, meta } => self.on_file_start(file_id, meta, now),
            Message::FileChunk {
                file_id,
                meta,
                chunk_index,
                payload,
            } => self.on_file_chunk(file_id, meta, chunk_index, payload, now),
            Message::FileComplete { file_id, hash } => self.on_file_complete(file_id, hash, now),
            Message::ChunkAck { file_id, chunk_index } => {
                debug!("수신자에 도착한 ACK 무시: {} #{}", file_id, chunk_index);
            }
        }
    }

    fn on_file_start(&mut self, file_id: FileId, meta: FileMeta, now: Instant) {
        if self.completed.contains_key(&file_id) || self.buffers.contains_key(&file_id) {
            debug!("중복 FileStart 무시: {}", file_id);
            return;
        }

        self.open_buffer(file_id.clone(), meta, now);

        // 빈 파일은 청크 없이 바로 완료
        if self.buffers.get(&file_id).is_some_and(|b| b.is_complete()) {
            self.finish(&file_id, now);
        }
    }

    fn on_file_chunk(
        &mut self,
        file_id: FileId,
        meta: FileMeta,
        chunk_index: u32,
        payload: Bytes,
        now: Instant,
    ) {
        if self.completed.contains_key(&file_id) {
            // 이미 완료된 전송의 재전송: ACK 손실로 판단
            self.stats.duplicates += 1;
            self.send_ack(&file_id, chunk_index);
            return;
        }

        if !self.buffers.contains_key(&file_id) {
            debug!("FileStart 없이 청크 도착, 청크 메타데이터로 버퍼 생성: {}", file_id);
            self.open_buffer(file_id.clone(), meta.clone(), now);
        }

        let Some(buffer) = self.buffers.get_mut(&file_id) else {
            return;
        };

        if buffer.meta.file_size != meta.file_size || buffer.meta.total_chunks != meta.total_chunks {
            self.stats.rejected += 1;
            warn!(
                "메타데이터가 다른 청크 거부: {} #{} (size {} != {})",
                file_id, chunk_index, meta.file_size, buffer.meta.file_size
            );
            return;
        }

        let payload_len = payload.len() as u64;
        match buffer.insert(chunk_index, payload, now) {
            InsertOutcome::Inserted => {
                self.stats.chunks += 1;
                self.stats.bytes += payload_len;
                let received = buffer.received_count();
                let total = buffer.meta.total_chunks;
                let complete = buffer.is_complete();

                self.send_ack(&file_id, chunk_index);
                self.emit(ReceiveEvent::Progress {
                    file_id: file_id.clone(),
                    received,
                    total,
                });

                if complete {
                    self.finish(&file_id, now);
                }
            }
            InsertOutcome::Duplicate => {
                // 상태 변화 없음, ACK만 다시 보냄
                self.stats.duplicates += 1;
                self.send_ack(&file_id, chunk_index);
            }
            InsertOutcome::Rejected(reason) => {
                self.stats.rejected += 1;
                debug!("청크 거부: {} #{}: {}", file_id, chunk_index, reason);
            }
        }
    }

    fn on_file_complete(&mut self, file_id: FileId, hash: Option<[u8; HASH_SIZE]>, now: Instant) {
        if let Some(buffer) = self.buffers.get_mut(&file_id) {
            // 마지막 청크보다 먼저 도착: 조립 시 검증
            if let Some(hash) = hash {
                buffer.set_expected_hash(hash);
            }
            debug!(
                "FileComplete 수신 (조립 대기): {} {}/{}",
                file_id,
                buffer.received_count(),
                buffer.meta.total_chunks
            );
            return;
        }

        let Some(entry) = self.completed.get(&file_id) else {
            // 청크보다 먼저 도착: 버퍼가 생길 때 적용
            match hash {
                Some(hash) => {
                    debug!("버퍼 없는 FileComplete, 해시 보관: {}", file_id);
                    self.early_hashes.insert(file_id, EarlyHash { hash, at: now });
                }
                None => debug!("알 수 없는 전송의 FileComplete 무시: {}", file_id),
            }
            return;
        };

        if let (Some(expected), Some(actual)) = (hash, entry.digest) {
            if expected != actual {
                warn!(
                    "전달된 파일의 해시 불일치: {} (expected {}, got {})",
                    file_id,
                    hex::encode(expected),
                    hex::encode(actual)
                );
                self.stats.files_failed += 1;
                self.emit(ReceiveEvent::Failed {
                    error: Error::IntegrityMismatch {
                        file_id: file_id.clone(),
                    },
                    file_id,
                });
            }
        }
    }

    fn open_buffer(&mut self, file_id: FileId, meta: FileMeta, now: Instant) {
        info!(
            "수신 시작: file_id={}, name={}, size={}, chunks={}",
            file_id, meta.file_name, meta.file_size, meta.total_chunks
        );
        self.emit(ReceiveEvent::Started {
            file_id: file_id.clone(),
            meta: meta.clone(),
        });
        let mut buffer = ReceiveBuffer::new(file_id.clone(), meta, now);
        if let Some(early) = self.early_hashes.remove(&file_id) {
            buffer.set_expected_hash(early.hash);
        }
        self.buffers.insert(file_id, buffer);
    }

    /// 버퍼 조립 후 전달
    fn finish(&mut self, file_id: &FileId, now: Instant) {
        let Some(buffer) = self.buffers.remove(file_id) else {
            return;
        };
        let file_name = buffer.meta.file_name.clone();
        let expected = buffer.expected_hash().copied();

        let result = buffer.assemble().and_then(|data| {
            let digest = (self.config.compute_hash || expected.is_some()).then(|| sha256(&data));

            match (expected, digest) {
                (Some(expected), Some(actual)) if expected != actual => {
                    Err(Error::IntegrityMismatch {
                        file_id: file_id.clone(),
                    })
                }
                _ => Ok((data, digest)),
            }
        });

        match result {
            Ok((data, digest)) => {
                info!(
                    "수신 완료: file_id={}, name={}, bytes={}",
                    file_id,
                    file_name,
                    data.len()
                );
                self.stats.files_completed += 1;
                self.completed
                    .insert(file_id.clone(), CompletedEntry { digest, at: now });
                self.emit(ReceiveEvent::Completed(ReceivedFile {
                    file_id: file_id.clone(),
                    file_name,
                    data,
                }));
            }
            Err(error) => {
                warn!("수신 실패: file_id={}, {}", file_id, error);
                self.stats.files_failed += 1;
                self.completed
                    .insert(file_id.clone(), CompletedEntry { digest: None, at: now });
                self.emit(ReceiveEvent::Failed {
                    file_id: file_id.clone(),
                    error,
                });
            }
        }
    }

    /// 오래 멈춘 버퍼와 만료된 완료 기록 정리
    pub fn sweep(&mut self, now: Instant) {
        let timeout = self.config.receive_timeout;
        let stale: Vec<FileId> = self
            .buffers
            .iter()
            .filter(|(_, b)| b.idle_for(now) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for file_id in stale {
            if let Some(buffer) = self.buffers.remove(&file_id) {
                warn!(
                    "수신 타임아웃: file_id={}, {}/{} 청크, 누락 {}개",
                    file_id,
                    buffer.received_count(),
                    buffer.meta.total_chunks,
                    buffer.missing_indices().len()
                );
                self.stats.files_failed += 1;
                self.emit(ReceiveEvent::Failed {
                    error: Error::ReceiveTimeout {
                        file_id: file_id.clone(),
                        received: buffer.received_count(),
                        total: buffer.meta.total_chunks,
                    },
                    file_id,
                });
            }
        }

        let retention = self.config.completed_retention;
        self.completed
            .retain(|_, entry| now.saturating_duration_since(entry.at) < retention);
        self.early_hashes
            .retain(|_, early| now.saturating_duration_since(early.at) < retention);
    }

    /// 채널 종료/에러: 진행 중인 모든 수신 폐기 (부분 파일은 전달하지 않음)
    pub fn abort_all(&mut self, reason: &AbortReason) {
        for (file_id, _) in self.buffers.drain() {
            self.stats.files_failed += 1;
            let _ = self.events_tx.send(ReceiveEvent::Failed {
                error: Error::aborted(&file_id, reason.clone()),
                file_id,
            });
        }
        self.completed.clear();
        self.early_hashes.clear();
    }

    /// 디코딩 실패 기록 (메시지는 버림)
    pub fn record_malformed(&mut self, error: &DecodeError) {
        self.stats.malformed += 1;
        debug!("잘못된 메시지 버림: {}", error);
    }

    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }

    pub fn buffer(&self, file_id: &FileId) -> Option<&ReceiveBuffer> {
        self.buffers.get(file_id)
    }

    /// 진행 중인 수신 버퍼 수
    pub fn active_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn send_ack(&mut self, file_id: &FileId, chunk_index: u32) {
        let ack = Message::ChunkAck {
            file_id: file_id.clone(),
            chunk_index,
        };
        match self.channel.send(ack.encode()) {
            Ok(()) => self.stats.acks_sent += 1,
            Err(e) => debug!("ACK 송신 실패: {} #{}: {}", file_id, chunk_index, e),
        }
    }

    fn emit(&self, event: ReceiveEvent) {
        let _ = self.events_tx.send(event);
    }
}

fn sha256(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&Sha256::digest(data));
    out
}
