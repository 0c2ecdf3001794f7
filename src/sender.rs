//! 송신자
//!
//! - 파일을 청크로 분할, 윈도우 한도 내에서 송신
//! - 청크별 ACK로 윈도우 조정
//! - 타임아웃 감시로 재전송 (재전송은 큐 앞쪽 우선)
//! - 채널 버퍼 워터마크 기반 백프레셔

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::chunk::FileSlicer;
use crate::message::{FileId, FileMeta, Message};
use crate::session::{SendProgress, SendSession, TransferState};
use crate::stats::SendStats;
use crate::window::WindowController;
use crate::{AbortReason, Config, Error, Result, RetryExhaustion, HASH_SIZE};

/// 송신할 파일
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub data: Bytes,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// 디스크에서 파일 읽기
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(name, data))
    }
}

/// 송신 완료 보고
#[derive(Debug, Clone)]
pub struct SendReport {
    pub file_id: FileId,
    pub file_name: String,
    pub bytes: u64,
    pub total_chunks: u32,
    pub elapsed: Duration,
    pub hash: Option<[u8; HASH_SIZE]>,
    pub stats: SendStats,
}

/// 송신 태스크 명령
#[derive(Debug)]
enum SenderCmd {
    Ack { chunk_index: u32, at: Instant },
    Cancel,
    Abort(AbortReason),
}

/// 전송 취소 핸들 (복제 가능)
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cmd_tx: mpsc::UnboundedSender<SenderCmd>,
}

impl CancelHandle {
    /// 전송 취소. 취소가 처리된 뒤로는 어떤 메시지도 보내지 않음
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(SenderCmd::Cancel);
    }
}

/// 진행 중인 송신 핸들
pub struct SendHandle {
    file_id: FileId,
    progress: watch::Receiver<SendProgress>,
    done: oneshot::Receiver<Result<SendReport>>,
    cancel: CancelHandle,
}

impl SendHandle {
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    /// 진행 상황 스트림
    pub fn progress(&self) -> watch::Receiver<SendProgress> {
        self.progress.clone()
    }

    pub fn canceller(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 완료 대기
    pub async fn finished(self) -> Result<SendReport> {
        let Self { file_id, done, .. } = self;
        match done.await {
            Ok(result) => result,
            Err(_) => Err(Error::aborted(&file_id, AbortReason::ChannelClosed)),
        }
    }
}

/// 송신 엔진 (채널 하나당 하나)
///
/// fileId별 송신 태스크로 ACK를 라우팅함
pub struct Sender {
    config: Config,
    channel: Arc<dyn Channel>,
    sessions: Arc<DashMap<FileId, mpsc::UnboundedSender<SenderCmd>>>,
    closed: AtomicBool,
}

impl Sender {
    /// 새 송신자 생성
    pub fn new(channel: Arc<dyn Channel>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            channel,
            sessions: Arc::new(DashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// 파일 송신 시작
    ///
    /// tokio 런타임 안에서 호출해야 함
    pub fn start_send(&self, file: OutgoingFile) -> Result<SendHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }

        let meta = FileMeta::new(file.name, file.data.len() as u64, self.config.chunk_size)?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let file_id = self.reserve_file_id(&cmd_tx);

        let task = SendTask::new(
            self.config.clone(),
            self.channel.clone(),
            file_id.clone(),
            meta,
            file.data,
            Instant::now(),
        );
        let progress = task.progress_tx.subscribe();
        let (done_tx, done_rx) = oneshot::channel();

        info!(
            "전송 시작: file_id={}, name={}, size={}, chunks={}",
            file_id, task.session.meta.file_name, task.session.meta.file_size, task.session.meta.total_chunks
        );

        tokio::spawn(task.run(cmd_rx, done_tx, self.sessions.clone()));

        Ok(SendHandle {
            file_id,
            progress,
            done: done_rx,
            cancel: CancelHandle { cmd_tx },
        })
    }

    /// 채널 내에서 유일한 fileId 예약
    fn reserve_file_id(&self, cmd_tx: &mpsc::UnboundedSender<SenderCmd>) -> FileId {
        loop {
            let file_id = FileId::generate();
            if let Entry::Vacant(entry) = self.sessions.entry(file_id.clone()) {
                entry.insert(cmd_tx.clone());
                return file_id;
            }
        }
    }

    /// 수신한 ACK를 해당 송신 세션으로 전달
    pub fn handle_ack(&self, file_id: &FileId, chunk_index: u32, at: Instant) -> bool {
        match self.sessions.get(file_id) {
            Some(tx) => tx
                .send(SenderCmd::Ack { chunk_index, at })
                .is_ok(),
            None => false,
        }
    }

    /// 모든 송신 세션 중단 (채널 종료/에러)
    pub fn abort_all(&self, reason: AbortReason) {
        self.closed.store(true, Ordering::SeqCst);
        for entry in self.sessions.iter() {
            let _ = entry.value().send(SenderCmd::Abort(reason.clone()));
        }
    }

    /// 진행 중인 송신 세션 수
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// 송신 세션 하나를 구동하는 태스크 상태
///
/// 펌프, ACK, 타임아웃 처리는 모두 이 태스크 안에서만 실행됨
struct SendTask {
    config: Config,
    channel: Arc<dyn Channel>,
    controller: WindowController,
    session: SendSession,
    stats: SendStats,
    hasher: Option<Sha256>,
    hash: Option<[u8; HASH_SIZE]>,
    backpressured: bool,
    abort_reason: Option<AbortReason>,
    progress_tx: watch::Sender<SendProgress>,
}

impl SendTask {
    fn new(
        config: Config,
        channel: Arc<dyn Channel>,
        file_id: FileId,
        meta: FileMeta,
        data: Bytes,
        now: Instant,
    ) -> Self {
        let controller = WindowController::from_config(&config);
        let window = controller.initial(config.initial_window);
        let chunks = FileSlicer::new(config.chunk_size).split(&data);
        let mut session = SendSession::new(file_id, meta, window, now);
        session.prepare(chunks);
        let (progress_tx, _) = watch::channel(session.progress());

        Self {
            hasher: config.compute_hash.then(Sha256::new),
            stats: SendStats::new(window),
            config,
            channel,
            controller,
            session,
            hash: None,
            backpressured: false,
            abort_reason: None,
            progress_tx,
        }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<SenderCmd>,
        done_tx: oneshot::Sender<Result<SendReport>>,
        sessions: Arc<DashMap<FileId, mpsc::UnboundedSender<SenderCmd>>>,
    ) {
        let started = Instant::now();
        if let Err(reason) = self.begin(started) {
            self.abort(reason);
        }

        let period = self.config.watchdog_interval;
        let mut watchdog = interval_at(started + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.session.state.is_terminal() {
            let poll = self.config.backpressure_poll_interval;
            let result = tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SenderCmd::Ack { chunk_index, at }) => self.on_ack(chunk_index, at),
                    Some(SenderCmd::Cancel) => Err(AbortReason::Cancelled),
                    Some(SenderCmd::Abort(reason)) => Err(reason),
                    None => Err(AbortReason::ChannelClosed),
                },
                _ = watchdog.tick() => self.on_tick(Instant::now()),
                _ = tokio::time::sleep(poll), if self.backpressured => self.pump(Instant::now()),
            };

            if let Err(reason) = result {
                self.abort(reason);
            }
        }

        sessions.remove(&self.session.file_id);
        let _ = done_tx.send(self.into_outcome(started.elapsed()));
    }

    /// FileStart 송신 후 펌프 시작
    fn begin(&mut self, now: Instant) -> std::result::Result<(), AbortReason> {
        let start = Message::FileStart {
            file_id: self.session.file_id.clone(),
            meta: self.session.meta.clone(),
        };
        self.send_frame(start.encode())?;
        self.session.transition(TransferState::Sending);
        self.session.last_ack_at = now;
        self.pump(now)
    }

    /// 윈도우와 채널 버퍼가 허용하는 만큼 청크 송신
    fn pump(&mut self, now: Instant) -> std::result::Result<(), AbortReason> {
        if !self.session.state.is_active() {
            return Ok(());
        }

        let watermark = self.config.buffer_watermark_bytes();
        let was_backpressured = self.backpressured;
        self.backpressured = false;

        while self.session.outstanding() < self.session.window && self.session.queued() > 0 {
            if self.channel.buffered_amount() >= watermark {
                if !was_backpressured {
                    debug!(
                        "백프레셔: file_id={}, buffered={}, watermark={}",
                        self.session.file_id,
                        self.channel.buffered_amount(),
                        watermark
                    );
                    self.stats.backpressure_pauses += 1;
                }
                self.backpressured = true;
                break;
            }

            let Some(queued) = self.session.next_chunk() else {
                break;
            };

            let frame = Message::FileChunk {
                file_id: self.session.file_id.clone(),
                meta: self.session.meta.clone(),
                chunk_index: queued.chunk.index,
                payload: queued.chunk.data.clone(),
            }
            .encode();
            let frame_len = frame.len() as u64;
            self.send_frame(frame)?;

            if queued.retries == 0 {
                // 첫 송신은 인덱스 순서이므로 해시를 점진적으로 계산
                if let Some(hasher) = self.hasher.as_mut() {
                    hasher.update(&queued.chunk.data);
                }
            } else {
                self.stats.retransmits += 1;
            }
            self.stats.chunks_sent += 1;
            self.stats.bytes_sent += frame_len;

            self.session.mark_pending(queued.chunk, queued.retries, now);
        }

        if self.session.queued() == 0 && self.session.state == TransferState::Sending {
            self.session.transition(TransferState::Draining);
        }

        self.finish_if_drained()?;
        self.publish_progress();
        Ok(())
    }

    /// ACK 처리
    fn on_ack(&mut self, chunk_index: u32, at: Instant) -> std::result::Result<(), AbortReason> {
        if !self.session.ack(chunk_index) {
            self.stats.stale_acks += 1;
            debug!(
                "무시된 ACK: file_id={}, chunk={}",
                self.session.file_id, chunk_index
            );
            return Ok(());
        }
        self.stats.acks += 1;

        // RTT 근사치: 직전 ACK 이후 경과 시간
        let rtt_sample = at.saturating_duration_since(self.session.last_ack_at);
        self.session.last_ack_at = at;

        let before = self.session.window;
        self.session.window = self.controller.adjust(before, rtt_sample);
        self.stats.record_window(before, self.session.window);

        self.pump(at)
    }

    /// 타임아웃 감시
    fn on_tick(&mut self, now: Instant) -> std::result::Result<(), AbortReason> {
        if !self.session.state.is_active() {
            return Ok(());
        }

        let expired = self.session.take_expired(now, self.config.chunk_timeout);

        // 역순으로 앞에 넣어 낮은 인덱스가 큐 맨 앞에 오도록
        for pending in expired.into_iter().rev() {
            let index = pending.chunk.index;

            if pending.retries < self.config.max_retries {
                debug!(
                    "청크 타임아웃, 재전송 예약: file_id={}, chunk={}, retries={}",
                    self.session.file_id,
                    index,
                    pending.retries + 1
                );
                self.session.requeue_front(pending.chunk, pending.retries + 1);

                let before = self.session.window;
                self.session.window = self.controller.penalize(before);
                self.stats.record_window(before, self.session.window);
                continue;
            }

            match self.config.retry_exhaustion {
                RetryExhaustion::Abort => {
                    return Err(AbortReason::RetriesExhausted { chunk_index: index });
                }
                RetryExhaustion::Skip => {
                    warn!(
                        "재전송 한도 초과로 청크 버림: file_id={}, chunk={} (수신측 파일이 완성되지 않을 수 있음)",
                        self.session.file_id, index
                    );
                    self.stats.dropped_chunks += 1;
                }
            }
        }

        if self.session.queued() > 0 && self.session.state == TransferState::Draining {
            self.session.transition(TransferState::Sending);
        }

        self.pump(now)
    }

    /// 큐와 미확인 목록이 비면 FileComplete 송신
    fn finish_if_drained(&mut self) -> std::result::Result<(), AbortReason> {
        if !self.session.state.is_active() || !self.session.is_drained() {
            return Ok(());
        }

        self.hash = self.hasher.take().map(|h| {
            let mut hash = [0u8; HASH_SIZE];
            hash.copy_from_slice(&h.finalize());
            hash
        });

        let complete = Message::FileComplete {
            file_id: self.session.file_id.clone(),
            hash: self.hash,
        };
        self.send_frame(complete.encode())?;
        self.session.transition(TransferState::Completed);

        info!(
            "전송 완료: file_id={}, {}",
            self.session.file_id,
            self.stats
                .summary(self.session.started_at.elapsed(), self.session.meta.file_size)
        );
        Ok(())
    }

    /// 전송 중단: 큐/미확인 메모리 해제, 이후 송신 없음
    fn abort(&mut self, reason: AbortReason) {
        if self.session.state.is_terminal() {
            return;
        }
        warn!("전송 중단: file_id={}, 원인: {}", self.session.file_id, reason);
        self.session.clear();
        self.session.transition(TransferState::Aborted);
        self.backpressured = false;
        self.abort_reason = Some(reason);
        self.publish_progress();
    }

    fn send_frame(&self, frame: Bytes) -> std::result::Result<(), AbortReason> {
        self.channel.send(frame).map_err(|e| match e {
            Error::ChannelClosed => AbortReason::ChannelClosed,
            other => AbortReason::ChannelError(other.to_string()),
        })
    }

    fn publish_progress(&self) {
        self.progress_tx.send_replace(self.session.progress());
    }

    fn into_outcome(self, elapsed: Duration) -> Result<SendReport> {
        match self.session.state {
            TransferState::Completed => Ok(SendReport {
                file_id: self.session.file_id,
                file_name: self.session.meta.file_name,
                bytes: self.session.meta.file_size,
                total_chunks: self.session.meta.total_chunks,
                elapsed,
                hash: self.hash,
                stats: self.stats,
            }),
            _ => Err(Error::aborted(
                &self.session.file_id,
                self.abort_reason.unwrap_or(AbortReason::ChannelClosed),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelEvents, MemoryChannel};
    use crate::message::MessageType;

    fn test_config() -> Config {
        Config {
            chunk_size: 100,
            initial_window: 4,
            min_window: 2,
            max_window: 16,
            ..Config::default()
        }
    }

    fn pattern(size: usize) -> Bytes {
        Bytes::from((0..size).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    /// 채널 쌍의 한쪽과 송신 태스크 생성 (상대 수신기는 살려둠)
    fn task(config: Config, size: usize) -> (SendTask, Arc<MemoryChannel>, ChannelEvents) {
        let ((local, _local_rx), (_remote, remote_rx)) = MemoryChannel::pair();
        let data = pattern(size);
        let meta = FileMeta::new("t.bin", size as u64, config.chunk_size).unwrap();
        let task = SendTask::new(
            config,
            local.clone(),
            FileId::new("task").unwrap(),
            meta,
            data,
            Instant::now(),
        );
        (task, local, remote_rx)
    }

    fn sent_messages(channel: &MemoryChannel) -> Vec<Message> {
        channel
            .sent_frames()
            .iter()
            .map(|f| Message::decode(f).unwrap())
            .collect()
    }

    fn chunk_indices(messages: &[Message]) -> Vec<u32> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::FileChunk { chunk_index, .. } => Some(*chunk_index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_pump_respects_window() {
        let (mut task, channel, _rx) = task(test_config(), 1000);
        let now = Instant::now();
        task.begin(now).unwrap();

        let messages = sent_messages(&channel);
        assert_eq!(messages[0].msg_type(), MessageType::FileStart);
        assert_eq!(chunk_indices(&messages), vec![0, 1, 2, 3]);
        assert_eq!(task.session.outstanding(), 4);
        assert_eq!(task.session.state, TransferState::Sending);
    }

    #[test]
    fn test_ack_grows_window_and_resumes_pump() {
        let (mut task, channel, _rx) = task(test_config(), 1000);
        let now = Instant::now();
        task.begin(now).unwrap();

        // 빠른 ACK -> 윈도우 증가 (4 -> 6)
        task.on_ack(0, now + Duration::from_millis(1)).unwrap();
        assert_eq!(task.session.window, 6);
        assert_eq!(task.session.outstanding(), 6);
        assert_eq!(chunk_indices(&sent_messages(&channel)), (0..7).collect::<Vec<_>>());

        // 중복 ACK는 무시
        task.on_ack(0, now + Duration::from_millis(2)).unwrap();
        assert_eq!(task.stats.stale_acks, 1);
        assert_eq!(task.stats.acks, 1);
    }

    #[test]
    fn test_backpressure_pauses_and_resumes() {
        let config = test_config();
        let watermark = config.buffer_watermark_bytes();
        let (mut task, channel, _rx) = task(config, 1000);
        let now = Instant::now();

        channel.set_buffered_amount(watermark);
        task.begin(now).unwrap();

        // FileStart만 나가고 청크는 멈춤
        assert_eq!(chunk_indices(&sent_messages(&channel)).len(), 0);
        assert!(task.backpressured);
        assert_eq!(task.stats.backpressure_pauses, 1);

        channel.set_buffered_amount(0);
        task.pump(now).unwrap();
        assert!(!task.backpressured);
        assert_eq!(chunk_indices(&sent_messages(&channel)), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_timeout_requeues_at_front_and_penalizes() {
        let config = Config {
            initial_window: 16,
            ..test_config()
        };
        let timeout = config.chunk_timeout;
        let (mut task, channel, _rx) = task(config, 301);
        let now = Instant::now();
        task.begin(now).unwrap();
        assert_eq!(chunk_indices(&sent_messages(&channel)), vec![0, 1, 2, 3]);

        task.on_ack(0, now).unwrap();
        task.on_ack(2, now).unwrap();
        task.on_ack(3, now).unwrap();
        let window_before = task.session.window;

        // 타임아웃 전에는 아무 일도 없음
        task.on_tick(now + timeout / 2).unwrap();
        assert_eq!(task.stats.retransmits, 0);

        task.on_tick(now + timeout).unwrap();
        assert_eq!(task.stats.retransmits, 1);
        assert!(task.session.window < window_before);
        assert_eq!(
            chunk_indices(&sent_messages(&channel)),
            vec![0, 1, 2, 3, 1]
        );
        assert!(task.session.is_pending(1));

        task.on_ack(1, now + timeout).unwrap();
        assert_eq!(task.session.state, TransferState::Completed);

        let last = sent_messages(&channel).pop().unwrap();
        assert!(matches!(last, Message::FileComplete { hash: Some(_), .. }));
    }

    #[test]
    fn test_retries_exhausted_aborts() {
        let config = Config {
            max_retries: 1,
            ..test_config()
        };
        let timeout = config.chunk_timeout;
        let (mut task, _channel, _rx) = task(config, 100);
        let now = Instant::now();
        task.begin(now).unwrap();

        task.on_tick(now + timeout).unwrap();
        assert_eq!(task.stats.retransmits, 1);

        let result = task.on_tick(now + timeout * 2);
        assert_eq!(
            result,
            Err(AbortReason::RetriesExhausted { chunk_index: 0 })
        );
    }

    #[test]
    fn test_retries_exhausted_skip_policy_completes() {
        let config = Config {
            max_retries: 0,
            retry_exhaustion: RetryExhaustion::Skip,
            ..test_config()
        };
        let timeout = config.chunk_timeout;
        let (mut task, _channel, _rx) = task(config, 100);
        let now = Instant::now();
        task.begin(now).unwrap();

        task.on_tick(now + timeout).unwrap();
        assert_eq!(task.stats.dropped_chunks, 1);
        assert_eq!(task.session.state, TransferState::Completed);
    }

    #[test]
    fn test_zero_byte_file_completes_immediately() {
        let (mut task, channel, _rx) = task(test_config(), 0);
        task.begin(Instant::now()).unwrap();

        let types: Vec<MessageType> = sent_messages(&channel)
            .iter()
            .map(|m| m.msg_type())
            .collect();
        assert_eq!(types, vec![MessageType::FileStart, MessageType::FileComplete]);
        assert_eq!(task.session.state, TransferState::Completed);
    }

    #[test]
    fn test_late_ack_removes_requeued_chunk() {
        let config = Config {
            initial_window: 2,
            ..test_config()
        };
        let timeout = config.chunk_timeout;
        let (mut task, channel, _rx) = task(config, 200);
        let now = Instant::now();
        task.begin(now).unwrap();

        // 백프레셔로 재전송이 큐에 머무르게 함
        channel.set_buffered_amount(usize::MAX);
        task.on_tick(now + timeout).unwrap();
        assert_eq!(task.session.queued(), 2);

        task.on_ack(0, now + timeout).unwrap();
        task.on_ack(1, now + timeout).unwrap();
        assert_eq!(task.session.queued(), 0);

        channel.set_buffered_amount(0);
        task.pump(now + timeout).unwrap();
        assert_eq!(task.session.state, TransferState::Completed);
        assert_eq!(task.stats.retransmits, 0);
    }

    #[test]
    fn test_abort_clears_state() {
        let (mut task, channel, _rx) = task(test_config(), 1000);
        task.begin(Instant::now()).unwrap();
        let sent = channel.sent_frames().len();

        task.abort(AbortReason::Cancelled);
        assert_eq!(task.session.state, TransferState::Aborted);
        assert!(task.session.is_drained());

        task.pump(Instant::now()).unwrap();
        task.on_tick(Instant::now() + Duration::from_secs(60)).unwrap();
        assert_eq!(channel.sent_frames().len(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_through_handle() {
        let ((local, _local_rx), (_remote, _remote_rx)) = MemoryChannel::pair();
        let sender = Sender::new(local.clone(), test_config()).unwrap();

        // 백프레셔로 멈춘 상태에서 취소
        local.set_buffered_amount(usize::MAX);
        let handle = sender.start_send(OutgoingFile::new("c.bin", pattern(1000))).unwrap();
        let file_id = handle.file_id().clone();
        handle.cancel();

        match handle.finished().await {
            Err(Error::TransferAborted { file_id: id, reason }) => {
                assert_eq!(id, file_id);
                assert_eq!(reason, AbortReason::Cancelled);
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.file_id)),
        }

        let frames = local.sent_frames().len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(local.sent_frames().len(), frames);
        assert_eq!(sender.active_sessions(), 0);
    }

    #[test]
    fn test_file_name_too_long_rejected() {
        let ((local, _local_rx), (_remote, _remote_rx)) = MemoryChannel::pair();
        let sender = Sender::new(local, test_config()).unwrap();
        let name = "n".repeat(crate::MAX_FILE_NAME_LEN + 1);
        assert!(matches!(
            sender.start_send(OutgoingFile::new(name, pattern(10))),
            Err(Error::FileNameTooLong { .. })
        ));
    }
}
