//! 프로토콜 설정

use std::time::Duration;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

/// 재전송 한도 초과 시 처리 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryExhaustion {
    /// 전송 전체를 중단하고 에러 반환
    Abort,

    /// 청크를 버리고 계속 진행 (수신측 파일이 완성되지 않을 수 있음)
    Skip,
}

/// DTP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 채널 송신 버퍼 최대 크기 (바이트)
    pub max_buffer_size: usize,

    /// 송신 일시정지 워터마크 (max_buffer_size 대비 비율)
    pub buffer_high_watermark: f64,

    /// 초기 윈도우 크기 (청크 수)
    pub initial_window: usize,

    /// 최소 윈도우 크기
    pub min_window: usize,

    /// 최대 윈도우 크기
    pub max_window: usize,

    /// RTT가 낮을 때 윈도우 증가량
    pub window_step_up: usize,

    /// RTT가 높을 때 윈도우 감소량
    pub window_step_down: usize,

    /// 타임아웃 발생 시 윈도우 감소량
    pub loss_penalty: usize,

    /// 이 값보다 RTT가 낮으면 윈도우 증가
    pub rtt_low_threshold: Duration,

    /// 이 값보다 RTT가 높으면 윈도우 감소
    pub rtt_high_threshold: Duration,

    /// 청크 ACK 대기 타임아웃
    pub chunk_timeout: Duration,

    /// 청크당 최대 재전송 횟수
    pub max_retries: u32,

    /// 타임아웃 감시 주기
    pub watchdog_interval: Duration,

    /// 백프레셔 상태에서 버퍼 재확인 간격
    pub backpressure_poll_interval: Duration,

    /// 재전송 한도 초과 시 정책
    pub retry_exhaustion: RetryExhaustion,

    /// FileComplete에 SHA-256 해시 포함 여부
    pub compute_hash: bool,

    /// 청크가 이 시간 동안 오지 않으면 수신 버퍼 폐기
    pub receive_timeout: Duration,

    /// 완료된 fileId를 기억하는 시간 (늦은 재전송 ACK용)
    pub completed_retention: Duration,

    /// 수신 버퍼 정리 주기
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_buffer_size: 4 * 1024 * 1024,            // 4MB
            buffer_high_watermark: 0.9,                  // 90%
            initial_window: 16,
            min_window: 4,
            max_window: 128,
            window_step_up: 2,
            window_step_down: 4,
            loss_penalty: 4,
            rtt_low_threshold: Duration::from_millis(50),
            rtt_high_threshold: Duration::from_millis(200),
            chunk_timeout: Duration::from_secs(3),
            max_retries: 5,
            watchdog_interval: Duration::from_millis(500),
            backpressure_poll_interval: Duration::from_millis(10),
            retry_exhaustion: RetryExhaustion::Abort,
            compute_hash: true,
            receive_timeout: Duration::from_secs(60),
            completed_retention: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 송신을 멈추는 버퍼 바이트 수
    pub fn buffer_watermark_bytes(&self) -> usize {
        (self.max_buffer_size as f64 * self.buffer_high_watermark) as usize
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} 는 1..={} 범위여야 함",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.min_window == 0 || self.min_window > self.max_window {
            return Err(Error::InvalidConfig(format!(
                "윈도우 범위 오류: min={}, max={}",
                self.min_window, self.max_window
            )));
        }
        if !(0.0..=1.0).contains(&self.buffer_high_watermark) || self.buffer_high_watermark == 0.0 {
            return Err(Error::InvalidConfig(format!(
                "buffer_high_watermark {} 는 (0, 1] 범위여야 함",
                self.buffer_high_watermark
            )));
        }
        if self.rtt_low_threshold > self.rtt_high_threshold {
            return Err(Error::InvalidConfig(
                "rtt_low_threshold 가 rtt_high_threshold 보다 큼".into(),
            ));
        }
        if self.watchdog_interval.is_zero() || self.backpressure_poll_interval.is_zero() {
            return Err(Error::InvalidConfig("타이머 주기는 0일 수 없음".into()));
        }
        Ok(())
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            chunk_size: 8 * 1024,
            max_buffer_size: 1024 * 1024,                // 1MB
            initial_window: 8,
            min_window: 2,
            max_window: 32,
            window_step_up: 1,
            window_step_down: 2,
            loss_penalty: 2,
            chunk_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// 고성능 기기용 설정
    pub fn high_performance() -> Self {
        Self {
            chunk_size: 60 * 1024,                       // UDP 데이터그램 한도 이내
            max_buffer_size: 16 * 1024 * 1024,           // 16MB
            initial_window: 32,
            min_window: 8,
            max_window: 512,
            window_step_up: 4,
            window_step_down: 8,
            loss_penalty: 8,
            rtt_low_threshold: Duration::from_millis(20),
            rtt_high_threshold: Duration::from_millis(100),
            chunk_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            chunk_size: 4 * 1024,                        // 작은 청크
            initial_window: 8,
            min_window: 2,
            max_window: 64,
            window_step_up: 1,
            window_step_down: 4,
            loss_penalty: 4,
            rtt_low_threshold: Duration::from_millis(100),
            rtt_high_threshold: Duration::from_millis(400),
            chunk_timeout: Duration::from_secs(5),
            max_retries: 10,
            receive_timeout: Duration::from_secs(120),
            ..Self::default()
        }
    }
}
