//! 채널 엔드포인트
//!
//! 채널 하나에 송신자와 수신자를 붙이고 이벤트 루프를 돌림.
//! ChunkAck는 송신자로, 나머지 메시지는 수신자로 보냄

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelEvent, ChannelEvents};
use crate::message::Message;
use crate::receiver::{ReceiveEvent, ReceiveEvents, Receiver};
use crate::sender::{OutgoingFile, SendHandle, Sender};
use crate::stats::ReceiveStats;
use crate::{AbortReason, Config, Result};

/// 양방향 전송 엔드포인트
pub struct Endpoint {
    sender: Arc<Sender>,
    stats: Arc<RwLock<ReceiveStats>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: JoinHandle<()>,
}

impl Endpoint {
    /// 채널 위에 엔드포인트 생성 및 이벤트 루프 시작
    pub fn spawn(
        channel: Arc<dyn Channel>,
        events: ChannelEvents,
        config: Config,
    ) -> Result<(Self, ReceiveEvents)> {
        let sender = Arc::new(Sender::new(channel.clone(), config.clone())?);
        let sweep_interval = config.sweep_interval;
        let (receiver, receive_events) = Receiver::new(channel, config);
        let stats = Arc::new(RwLock::new(ReceiveStats::default()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_loop(
            sender.clone(),
            receiver,
            events,
            stats.clone(),
            shutdown_rx,
            sweep_interval,
        ));

        let endpoint = Self {
            sender,
            stats,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task,
        };
        Ok((endpoint, receive_events))
    }

    /// 파일 송신 시작
    pub fn send_file(&self, file: OutgoingFile) -> Result<SendHandle> {
        self.sender.start_send(file)
    }

    /// 수신 통계 스냅샷
    pub fn receive_stats(&self) -> ReceiveStats {
        self.stats.read().clone()
    }

    /// 진행 중인 송신 수
    pub fn active_sends(&self) -> usize {
        self.sender.active_sessions()
    }

    /// 엔드포인트 종료: 모든 송수신을 취소로 중단
    pub fn close(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.sender.abort_all(AbortReason::Cancelled);
        self.task.abort();
    }
}

async fn run_loop(
    sender: Arc<Sender>,
    mut receiver: Receiver,
    mut events: ChannelEvents,
    stats: Arc<RwLock<ReceiveStats>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    sweep_interval: std::time::Duration,
) {
    let mut sweep = interval_at(Instant::now() + sweep_interval, sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let stop = tokio::select! {
            event = events.recv() => match event {
                Some(ChannelEvent::Opened) => {
                    debug!("채널 열림");
                    None
                }
                Some(ChannelEvent::Message(frame)) => {
                    dispatch(&sender, &mut receiver, frame);
                    None
                }
                Some(ChannelEvent::Closed) | None => Some(AbortReason::ChannelClosed),
                Some(ChannelEvent::Errored(e)) => Some(AbortReason::ChannelError(e)),
            },
            _ = sweep.tick() => {
                receiver.sweep(Instant::now());
                None
            }
            _ = &mut shutdown_rx => Some(AbortReason::Cancelled),
        };

        if let Some(reason) = stop {
            info!("엔드포인트 종료: {}", reason);
            sender.abort_all(reason.clone());
            receiver.abort_all(&reason);
            *stats.write() = receiver.stats().clone();
            break;
        }

        *stats.write() = receiver.stats().clone();
    }

    info!("수신 통계: {}", receiver.stats().summary());
}

fn dispatch(sender: &Sender, receiver: &mut Receiver, frame: Bytes) {
    let now = Instant::now();
    match Message::decode(&frame) {
        Ok(Message::ChunkAck {
            file_id,
            chunk_index,
        }) => {
            if !sender.handle_ack(&file_id, chunk_index, now) {
                debug!("알 수 없는 송신의 ACK 무시: {} #{}", file_id, chunk_index);
            }
        }
        Ok(message) => receiver.handle_message(message, now),
        Err(e) => receiver.record_malformed(&e),
    }
}

/// 완료된 파일마다 콜백 호출 (실패는 로그만 남김)
pub fn on_receive_ready<F>(mut events: ReceiveEvents, mut callback: F) -> JoinHandle<()>
where
    F: FnMut(Bytes, String) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ReceiveEvent::Completed(file) => callback(file.data, file.file_name),
                ReceiveEvent::Failed { file_id, error } => {
                    warn!("수신 실패: {}: {}", file_id, error);
                }
                ReceiveEvent::Started { .. } | ReceiveEvent::Progress { .. } => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::Error;

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_counted_and_dropped() {
        let ((a, a_rx), (b, _b_rx)) = MemoryChannel::pair();
        let (endpoint, _events) = Endpoint::spawn(a, a_rx, Config::default()).unwrap();

        b.send(Bytes::from_static(b"\x09garbage")).unwrap();
        b.send(Bytes::from(vec![0u8; crate::HEADER_SIZE])).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(endpoint.receive_stats().malformed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_rejects_new_sends() {
        let ((a, a_rx), (_b, _b_rx)) = MemoryChannel::pair();
        let (endpoint, _events) = Endpoint::spawn(a, a_rx, Config::default()).unwrap();

        endpoint.close();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(matches!(
            endpoint.send_file(OutgoingFile::new("x", Bytes::from_static(b"x"))),
            Err(Error::ChannelClosed)
        ));
    }
}
