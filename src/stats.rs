//! 전송 통계

use std::time::Duration;

/// 송신 세션 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendStats {
    /// 채널로 넘긴 청크 수 (재전송 포함)
    pub chunks_sent: u64,

    /// 채널로 넘긴 총 바이트 (헤더 포함)
    pub bytes_sent: u64,

    /// 재전송 횟수
    pub retransmits: u64,

    /// 처리된 ACK 수
    pub acks: u64,

    /// 무시된 ACK 수 (미확인 청크가 아님)
    pub stale_acks: u64,

    /// 윈도우 증가 횟수
    pub window_increases: u64,

    /// 윈도우 감소 횟수 (RTT + 타임아웃)
    pub window_decreases: u64,

    /// 관측된 최소 윈도우
    pub min_window_seen: usize,

    /// 백프레셔로 송신을 멈춘 횟수
    pub backpressure_pauses: u64,

    /// 재전송 한도 초과로 버린 청크 수
    pub dropped_chunks: u64,
}

impl SendStats {
    pub fn new(initial_window: usize) -> Self {
        Self {
            min_window_seen: initial_window,
            ..Self::default()
        }
    }

    /// 윈도우 변화 기록
    pub fn record_window(&mut self, before: usize, after: usize) {
        if after > before {
            self.window_increases += 1;
        } else if after < before {
            self.window_decreases += 1;
        }
        self.min_window_seen = self.min_window_seen.min(after);
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.chunks_sent == 0 {
            return 0.0;
        }
        self.retransmits as f64 / self.chunks_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self, elapsed: Duration, file_bytes: u64) -> String {
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            file_bytes as f64 / secs
        } else {
            0.0
        };
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Throughput: {:.2} MB/s | Chunks: {} | Retransmits: {} ({:.2}%) | Window min: {} (+{}/-{}) | Pauses: {}",
            secs,
            file_bytes,
            throughput / 1_000_000.0,
            self.chunks_sent,
            self.retransmits,
            self.retransmit_ratio() * 100.0,
            self.min_window_seen,
            self.window_increases,
            self.window_decreases,
            self.backpressure_pauses,
        )
    }
}

/// 수신측 통계 (채널 단위)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// 저장된 청크 수
    pub chunks: u64,

    /// 저장된 바이트
    pub bytes: u64,

    /// 중복 청크 수
    pub duplicates: u64,

    /// 거부된 청크 수
    pub rejected: u64,

    /// 디코딩 실패로 버린 메시지 수
    pub malformed: u64,

    /// 전송한 ACK 수
    pub acks_sent: u64,

    /// 완료된 파일 수
    pub files_completed: u64,

    /// 실패한 파일 수
    pub files_failed: u64,
}

impl ReceiveStats {
    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Files: {} ok / {} failed | Chunks: {} | Bytes: {} | Duplicates: {} | Rejected: {} | Malformed: {} | ACKs: {}",
            self.files_completed,
            self.files_failed,
            self.chunks,
            self.bytes,
            self.duplicates,
            self.rejected,
            self.malformed,
            self.acks_sent,
        )
    }
}
