//! 논리 시계
//!
//! 클러스터는 벽시계 대신 논리 시계를 사용합니다. 테스트 엔진이 스텝마다
//! 명시적으로 시계를 진행시키므로 실행이 결정적입니다.

use std::sync::atomic::{AtomicU64, Ordering};

/// 단조 증가하는 논리 시계
#[derive(Debug, Default)]
pub struct LogicalClock {
    now: AtomicU64,
}

impl LogicalClock {
    /// 0에서 시작하는 시계를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 시각
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    /// `ticks`만큼 진행하고 진행 후 시각을 반환합니다.
    pub fn advance(&self, ticks: u64) -> u64 {
        self.now.fetch_add(ticks, Ordering::AcqRel) + ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_and_advances() {
        let clock = LogicalClock::new();
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.advance(3), 3);
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn concurrent_advances_are_not_lost() {
        let clock = std::sync::Arc::new(LogicalClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        clock.advance(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(clock.now(), 4000);
    }
}
