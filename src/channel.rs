//! 데이터그램 채널 추상화
//!
//! 전송 코어가 채널에 요구하는 것은 세 가지뿐:
//! - `send`: 논블로킹 큐잉
//! - `buffered_amount`: 아직 나가지 않은 송신 바이트 수 (백프레셔 판단용)
//! - 이벤트 스트림: Opened / Closed / Errored / Message
//!
//! 순서 보장, 전달 보장은 요구하지 않음

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// 채널 이벤트
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Opened,
    Closed,
    Errored(String),
    Message(Bytes),
}

/// 채널 이벤트 수신기 타입
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// 메시지 기반 양방향 채널
pub trait Channel: Send + Sync {
    /// 프레임 하나를 송신 큐에 넣음 (블로킹 없음)
    fn send(&self, frame: Bytes) -> Result<()>;

    /// 송신 큐에 남아 있는 바이트 수
    fn buffered_amount(&self) -> usize;
}

type DropFilter = Box<dyn FnMut(&Bytes) -> bool + Send>;

/// 송신 기록 최대 보관 프레임 수 (초과 시 오래된 것부터 버림)
pub const SENT_LOG_CAPACITY: usize = 4096;

/// 프로세스 내부 채널 쌍 (테스트, 데모용)
///
/// 손실은 drop 필터로, 버퍼 적체는 `set_buffered_amount`로 흉내냄
pub struct MemoryChannel {
    peer_tx: mpsc::UnboundedSender<ChannelEvent>,
    local_tx: mpsc::UnboundedSender<ChannelEvent>,
    buffered: AtomicUsize,
    closed: AtomicBool,
    drop_filter: Mutex<Option<DropFilter>>,
    sent_log: Mutex<VecDeque<Bytes>>,
}

impl MemoryChannel {
    fn new(
        peer_tx: mpsc::UnboundedSender<ChannelEvent>,
        local_tx: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            peer_tx,
            local_tx,
            buffered: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            drop_filter: Mutex::new(None),
            sent_log: Mutex::new(VecDeque::new()),
        }
    }

    /// 연결된 채널 쌍 생성 (양쪽 모두 Opened 이벤트로 시작)
    pub fn pair() -> ((Arc<Self>, ChannelEvents), (Arc<Self>, ChannelEvents)) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let _ = a_tx.send(ChannelEvent::Opened);
        let _ = b_tx.send(ChannelEvent::Opened);

        let a = Arc::new(Self::new(b_tx.clone(), a_tx.clone()));
        let b = Arc::new(Self::new(a_tx, b_tx));

        ((a, a_rx), (b, b_rx))
    }

    /// 송신 프레임 손실 필터 설정 (true 반환 시 버림)
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: FnMut(&Bytes) -> bool + Send + 'static,
    {
        *self.drop_filter.lock() = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&self) {
        *self.drop_filter.lock() = None;
    }

    /// 보고할 버퍼 바이트 수 설정
    pub fn set_buffered_amount(&self, bytes: usize) {
        self.buffered.store(bytes, Ordering::SeqCst);
    }

    /// 최근 송신한 프레임 (손실된 것 포함, 최대 `SENT_LOG_CAPACITY`개)
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent_log.lock().iter().cloned().collect()
    }

    /// 채널 종료 (양쪽에 Closed 전달)
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.local_tx.send(ChannelEvent::Closed);
            let _ = self.peer_tx.send(ChannelEvent::Closed);
        }
    }

    /// 로컬 쪽에 에러 이벤트 발생
    pub fn fail(&self, reason: impl Into<String>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.local_tx.send(ChannelEvent::Errored(reason.into()));
        }
    }
}

impl Channel for MemoryChannel {
    fn send(&self, frame: Bytes) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }

        {
            let mut log = self.sent_log.lock();
            if log.len() == SENT_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(frame.clone());
        }

        if let Some(filter) = self.drop_filter.lock().as_mut() {
            if filter(&frame) {
                return Ok(());
            }
        }

        self.peer_tx
            .send(ChannelEvent::Message(frame))
            .map_err(|_| Error::ChannelClosed)
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }
}

/// UDP 소켓 기반 채널
///
/// 송신 프레임은 큐에 쌓이고 전용 태스크가 순서대로 내보냄.
/// 큐에 남은 바이트 수가 `buffered_amount`
pub struct UdpChannel {
    out_tx: mpsc::UnboundedSender<Bytes>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    buffered: Arc<AtomicUsize>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl UdpChannel {
    /// 소켓 바인딩 후 상대 주소로 연결
    pub async fn connect(
        bind_addr: SocketAddr,
        peer_addr: SocketAddr,
    ) -> Result<(Arc<Self>, ChannelEvents)> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        socket.connect(peer_addr).await?;
        let local_addr = socket.local_addr()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
        let buffered = Arc::new(AtomicUsize::new(0));

        // 송신 태스크
        let send_socket = socket.clone();
        let send_buffered = buffered.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let len = frame.len();
                let result = send_socket.send(&frame).await;
                send_buffered.fetch_sub(len, Ordering::SeqCst);
                if let Err(e) = result {
                    warn!("UDP 송신 실패: {}", e);
                }
            }
        });

        // 수신 태스크
        let recv_socket = socket;
        let recv_events = event_tx.clone();
        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            loop {
                match recv_socket.recv(&mut buf).await {
                    Ok(len) => {
                        let frame = Bytes::copy_from_slice(&buf[..len]);
                        if recv_events.send(ChannelEvent::Message(frame)).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                        // 상대가 아직 바인딩 전
                        debug!("UDP 수신 거부: {}", e);
                    }
                    Err(e) => {
                        warn!("UDP 수신 에러: {}", e);
                    }
                }
            }
        });

        let _ = event_tx.send(ChannelEvent::Opened);
        info!("UDP 채널 열림: {} -> {}", local_addr, peer_addr);

        let channel = Arc::new(Self {
            out_tx,
            event_tx,
            buffered,
            closed: AtomicBool::new(false),
            tasks: Mutex::new(vec![writer, reader]),
            local_addr,
            peer_addr,
        });

        Ok((channel, event_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 채널 종료
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let _ = self.event_tx.send(ChannelEvent::Closed);
        info!("UDP 채널 종료: {} -> {}", self.local_addr, self.peer_addr);
    }
}

impl Channel for UdpChannel {
    fn send(&self, frame: Bytes) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        let len = frame.len();
        self.buffered.fetch_add(len, Ordering::SeqCst);
        self.out_tx.send(frame).map_err(|_| {
            self.buffered.fetch_sub(len, Ordering::SeqCst);
            Error::ChannelClosed
        })
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }
}

impl Drop for UdpChannel {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_delivers_and_filters() {
        let ((a, mut a_rx), (_b, mut b_rx)) = MemoryChannel::pair();

        assert!(matches!(a_rx.recv().await, Some(ChannelEvent::Opened)));
        assert!(matches!(b_rx.recv().await, Some(ChannelEvent::Opened)));

        a.set_drop_filter(|frame| frame.as_ref() == b"drop");
        a.send(Bytes::from_static(b"keep")).unwrap();
        a.send(Bytes::from_static(b"drop")).unwrap();
        a.send(Bytes::from_static(b"last")).unwrap();

        match b_rx.recv().await {
            Some(ChannelEvent::Message(frame)) => assert_eq!(frame.as_ref(), b"keep"),
            other => panic!("unexpected event: {:?}", other),
        }
        match b_rx.recv().await {
            Some(ChannelEvent::Message(frame)) => assert_eq!(frame.as_ref(), b"last"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(a.sent_frames().len(), 3);
    }

    #[tokio::test]
    async fn test_memory_sent_log_is_bounded() {
        let ((a, _a_rx), (_b, _b_rx)) = MemoryChannel::pair();
        a.set_drop_filter(|_| true);

        let total = SENT_LOG_CAPACITY as u32 + 10;
        for i in 0..total {
            a.send(Bytes::copy_from_slice(&i.to_le_bytes())).unwrap();
        }

        let frames = a.sent_frames();
        assert_eq!(frames.len(), SENT_LOG_CAPACITY);
        assert_eq!(frames[0].as_ref(), &10u32.to_le_bytes());
        assert_eq!(frames[SENT_LOG_CAPACITY - 1].as_ref(), &(total - 1).to_le_bytes());
    }

    #[tokio::test]
    async fn test_memory_close_notifies_both_sides() {
        let ((a, mut a_rx), (_b, mut b_rx)) = MemoryChannel::pair();
        a_rx.recv().await;
        b_rx.recv().await;

        a.close();
        assert!(matches!(a_rx.recv().await, Some(ChannelEvent::Closed)));
        assert!(matches!(b_rx.recv().await, Some(ChannelEvent::Closed)));
        assert!(matches!(
            a.send(Bytes::from_static(b"late")),
            Err(Error::ChannelClosed)
        ));
    }

    fn free_addr() -> SocketAddr {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_udp_loopback() {
        let a_addr = free_addr();
        let b_addr = free_addr();

        let (a, mut a_rx) = UdpChannel::connect(a_addr, b_addr).await.unwrap();
        let (b, mut b_rx) = UdpChannel::connect(b_addr, a_addr).await.unwrap();

        assert!(matches!(a_rx.recv().await, Some(ChannelEvent::Opened)));
        assert!(matches!(b_rx.recv().await, Some(ChannelEvent::Opened)));

        a.send(Bytes::from_static(b"hello")).unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), b_rx.recv())
            .await
            .unwrap();
        match event {
            Some(ChannelEvent::Message(frame)) => assert_eq!(frame.as_ref(), b"hello"),
            other => panic!("unexpected event: {:?}", other),
        }

        b.close();
        assert!(matches!(b_rx.recv().await, Some(ChannelEvent::Closed)));
        assert!(b.send(Bytes::from_static(b"late")).is_err());
    }
}
