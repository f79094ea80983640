pub type TaskResult<T> = Result<T, TaskError>;
pub type PoolResult<T> = Result<T, PoolError>;

/// Почему [`TaskHandle`](crate::handle::TaskHandle) не вернул значение.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panic(String),

    /// The task was dropped before it ran: it was still queued when the pool
    /// shut down, or it was submitted to a pool that had already shut down.
    #[error("task was discarded before it ran")]
    Discarded,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl PoolError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PoolError::Config(msg.into())
    }
}
