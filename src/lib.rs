//! Пул рабочих потоков на основе гибридной блокировки (spin, затем сон)
//!
//! # Features
//! - Фиксированный набор OS-потоков, одна общая FIFO очередь
//! - [`AdaptiveLock`]: короткий spin, потом парковка потока
//! - Результаты и паники через [`TaskHandle`], блокирующе или через `.await`
//! - Inline-выполнение задач, отправленных из задач насыщенного пула
//! - `reset` для замены воркеров, `shutdown` отбрасывает ожидающие задачи
//!
//! ```no_run
//! use hybrid_pool::ThreadPool;
//!
//! let pool = ThreadPool::new(4).unwrap();
//! let sum = pool.enqueue(|| 2 + 3);
//! assert_eq!(sum.get(), Ok(5));
//! ```
//!
//! # Starvation
//!
//! A task that submits a child and then blocks on the child's handle holds a
//! worker while it waits. When every worker does this, nobody is left to run
//! the children. [`ThreadPool::enqueue`] avoids the common case: a submission
//! from a non-owner thread while the pool is saturated runs inline. It does not
//! help a task that waits on a child which was queued while a worker was still
//! free and which no worker has picked up since. That wait can last forever. The
//! pool neither detects nor reports it; [`ThreadPool::is_saturated`] and
//! [`ThreadPool::metrics`] expose the state involved.

pub mod config;
pub mod errors;
pub mod handle;
pub mod lock;
pub mod model;
pub mod pool;
pub mod signal;
pub mod task;

pub use config::Config;
pub use errors::{PoolError, PoolResult, TaskError, TaskResult};
pub use handle::TaskHandle;
pub use lock::{AdaptiveLock, AdaptiveLockGuard, RawAdaptiveLock};
pub use model::PoolMetrics;
pub use pool::{SharedPool, ThreadPool};
