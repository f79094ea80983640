/// Метрики пула: снимок состояния, снятый под блокировкой очереди.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    pub workers: usize,
    pub active: usize,
    pub queued: usize,
    pub submitted: u64,
    pub executed: u64,
    pub inline_executed: u64,
    pub discarded: u64,
}

impl PoolMetrics {
    /// Every worker is busy, so a queued task has to wait for one to finish.
    ///
    /// A pool without workers counts as saturated.
    pub fn is_saturated(&self) -> bool {
        self.active >= self.workers
    }

    pub fn idle_workers(&self) -> usize {
        self.workers.saturating_sub(self.active)
    }

    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.active as f64 / self.workers as f64
    }

    /// Tasks that have run to completion, on a worker or inline.
    pub fn completed(&self) -> u64 {
        self.executed + self.inline_executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation() {
        let mut m = PoolMetrics {
            workers: 2,
            active: 1,
            ..Default::default()
        };
        assert!(!m.is_saturated());
        assert_eq!(m.idle_workers(), 1);

        m.active = 2;
        assert!(m.is_saturated());
        assert_eq!(m.utilization(), 1.0);
    }

    #[test]
    fn test_empty_pool() {
        let m = PoolMetrics::default();
        assert!(m.is_saturated());
        assert_eq!(m.utilization(), 0.0);
        assert_eq!(m.idle_workers(), 0);
    }

    #[test]
    fn test_completed_counts_both_paths() {
        let m = PoolMetrics {
            executed: 7,
            inline_executed: 3,
            ..Default::default()
        };
        assert_eq!(m.completed(), 10);
    }
}
