//! 윈도우 크기 제어
//!
//! 미확인 청크 수 상한을 RTT 샘플과 손실 이벤트로 조정하는 순수 함수 모음.
//!
//! RTT 샘플은 실제 청크 왕복 시간이 아니라 직전 ACK 이후 경과 시간(ACK 도착 간격)이다.
//! 네트워크 지연과 송신 페이싱이 섞인 근사치이므로 임계값은 여유 있게 잡을 것.

use std::time::Duration;

use crate::Config;

/// 윈도우 제어기
#[derive(Debug, Clone)]
pub struct WindowController {
    pub min_window: usize,
    pub max_window: usize,
    pub step_up: usize,
    pub step_down: usize,
    pub loss_penalty: usize,
    pub rtt_low: Duration,
    pub rtt_high: Duration,
}

impl WindowController {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_window: config.min_window,
            max_window: config.max_window,
            step_up: config.window_step_up,
            step_down: config.window_step_down,
            loss_penalty: config.loss_penalty,
            rtt_low: config.rtt_low_threshold,
            rtt_high: config.rtt_high_threshold,
        }
    }

    /// 초기 윈도우 (범위 내로 보정)
    pub fn initial(&self, requested: usize) -> usize {
        self.clamp(requested)
    }

    /// RTT 샘플에 따른 다음 윈도우
    pub fn adjust(&self, window: usize, rtt_sample: Duration) -> usize {
        let next = if rtt_sample < self.rtt_low {
            window.saturating_add(self.step_up)
        } else if rtt_sample > self.rtt_high {
            window.saturating_sub(self.step_down)
        } else {
            window
        };
        self.clamp(next)
    }

    /// 타임아웃/손실 시 윈도우 감소
    pub fn penalize(&self, window: usize) -> usize {
        self.clamp(window.saturating_sub(self.loss_penalty))
    }

    fn clamp(&self, window: usize) -> usize {
        window.clamp(self.min_window, self.max_window.max(self.min_window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn controller() -> WindowController {
        WindowController::from_config(&Config::default())
    }

    #[test]
    fn test_adjust_directions() {
        let ctl = controller();

        assert_eq!(ctl.adjust(16, Duration::from_millis(1)), 18);
        assert_eq!(ctl.adjust(16, Duration::from_millis(500)), 12);
        assert_eq!(ctl.adjust(16, Duration::from_millis(100)), 16);
        assert_eq!(ctl.penalize(16), 12);
    }

    #[test]
    fn test_adjust_saturates_at_bounds() {
        let ctl = controller();

        assert_eq!(ctl.adjust(ctl.max_window, Duration::ZERO), ctl.max_window);
        assert_eq!(
            ctl.adjust(ctl.min_window, Duration::from_secs(10)),
            ctl.min_window
        );
        assert_eq!(ctl.penalize(ctl.min_window + 1), ctl.min_window);
        assert_eq!(ctl.initial(0), ctl.min_window);
        assert_eq!(ctl.initial(usize::MAX), ctl.max_window);
    }

    #[test]
    fn test_window_stays_in_bounds_under_random_events() {
        let ctl = controller();
        let mut rng = rand::thread_rng();
        let mut window = ctl.initial(16);

        for _ in 0..10_000 {
            window = if rng.gen_bool(0.2) {
                ctl.penalize(window)
            } else {
                ctl.adjust(window, Duration::from_millis(rng.gen_range(0..400)))
            };
            assert!(window >= ctl.min_window && window <= ctl.max_window);
        }
    }
}
