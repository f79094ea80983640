use crate::{
    errors::{PoolError, PoolResult},
    lock::DEFAULT_SPIN_LIMIT,
};

/// Конфигурация пула потоков
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    /// Spin budget of the queue lock before lockers block.
    pub spin_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            thread_name_prefix: "hybrid-worker".to_string(),
            stack_size: None,
            spin_limit: DEFAULT_SPIN_LIMIT,
        }
    }
}

impl Config {
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Default::default()
        }
    }

    pub fn cpu_bound() -> Self {
        Self::with_threads(num_cpus::get())
    }

    /// Two threads per core, for tasks that spend time blocked.
    pub fn io_bound() -> Self {
        Self::with_threads(num_cpus::get() * 2)
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.num_threads == 0 {
            return Err(PoolError::config("num_threads must be > 0"));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(PoolError::config("thread_name_prefix must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn thread_name(&self, id: usize) -> String {
        format!("{}-{}", self.thread_name_prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_every_core() {
        let config = Config::default();
        assert_eq!(config.num_threads, num_cpus::get());
        assert_eq!(config.spin_limit, DEFAULT_SPIN_LIMIT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(Config::with_threads(3).num_threads, 3);
        assert_eq!(Config::io_bound().num_threads, 2 * Config::cpu_bound().num_threads);
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let err = Config::with_threads(0).validate().unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let config = Config {
            thread_name_prefix: String::new(),
            ..Config::with_threads(1)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thread_name() {
        assert_eq!(Config::default().thread_name(3), "hybrid-worker-3");
    }
}
