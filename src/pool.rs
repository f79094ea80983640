use super::{
    config::Config,
    errors::{PoolError, PoolResult},
    handle::{packaged_task, TaskHandle},
    lock::{AdaptiveLock, AdaptiveLockGuard},
    model::PoolMetrics,
    signal::WorkSignal,
    task::Task,
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    mem,
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
};
use tracing::{debug, error, info, trace};

pub type SharedPool = Arc<ThreadPool>;

/// Всё, что защищает блокировка очереди.
struct State {
    queue: VecDeque<Task>,
    active: usize,
    workers: usize,
    done: bool,
    /// Bumped every time a fresh set of workers starts.
    generation: u64,
    submitted: u64,
    executed: u64,
    inline_executed: u64,
    discarded: u64,
}

impl State {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            active: 0,
            workers: 0,
            done: false,
            generation: 0,
            submitted: 0,
            executed: 0,
            inline_executed: 0,
            discarded: 0,
        }
    }

    #[inline]
    fn is_saturated(&self) -> bool {
        self.active >= self.workers
    }

    /// A worker of `generation` must leave its run loop.
    #[inline]
    fn retired(&self, generation: u64) -> bool {
        self.done || self.generation != generation
    }

    fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            workers: self.workers,
            active: self.active,
            queued: self.queue.len(),
            submitted: self.submitted,
            executed: self.executed,
            inline_executed: self.inline_executed,
            discarded: self.discarded,
        }
    }
}

struct Shared {
    state: AdaptiveLock<State>,
    work_queued: WorkSignal,
    owner: ThreadId,
}

impl Shared {
    fn submit(&self, task: Task) {
        let mut state = self.state.lock();

        if state.done {
            state.discarded += 1;
            drop(state);
            debug!("pool is shut down, discarding submitted task");
            return;
        }
        state.submitted += 1;

        // A non-owner thread submitting into a saturated pool is most likely a
        // task waiting on its own child. No worker is guaranteed to free up for
        // the child, so run it here.
        if thread::current().id() != self.owner && state.is_saturated() {
            state.inline_executed += 1;
            drop(state);
            trace!("pool saturated, running task inline");
            task.run();
            return;
        }

        state.queue.push_back(task);
        drop(state);

        self.work_queued.notify_one();
        trace!("task queued");
    }

    fn run(&self, id: usize, generation: u64) {
        debug!(worker = id, generation, "worker started");

        let mut state = self.state.lock();
        loop {
            self.work_queued
                .wait_while(&mut state, |s| !s.retired(generation) && s.queue.is_empty());

            // Pending work is not drained on shutdown.
            if state.retired(generation) {
                break;
            }

            let Some(task) = state.queue.pop_front() else {
                continue;
            };
            state.active += 1;

            AdaptiveLockGuard::unlocked(&mut state, || task.run());

            state.active -= 1;
            state.executed += 1;
        }
        drop(state);

        debug!(worker = id, generation, "worker exited");
    }
}

/// Owns one worker thread; dropping it joins the thread, so `done` must be set
/// first.
struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // The pool is being torn down from one of its own tasks; this thread
        // leaves its run loop once the task returns.
        if thread.thread().id() == thread::current().id() {
            return;
        }

        if thread.join().is_err() {
            error!(worker = self.id, "worker thread panicked");
        }
    }
}

/// Пул потоков фиксированного размера с одной FIFO очередью под
/// [`AdaptiveLock`].
///
/// All operations take `&self`, so a pool can be shared as a [`SharedPool`]
/// with tasks that submit further tasks into it.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<Worker>>,
    config: Config,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> PoolResult<Self> {
        Self::with_config(Config::with_threads(num_threads))
    }

    /// One worker per logical core.
    pub fn new_cpu() -> PoolResult<Self> {
        Self::with_config(Config::cpu_bound())
    }

    /// Builds the pool and starts its workers. The calling thread becomes the
    /// pool's owner: its submissions are always queued, never run inline.
    pub fn with_config(config: Config) -> PoolResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: AdaptiveLock::with_spin_limit(State::new(), config.spin_limit),
            work_queued: WorkSignal::new(),
            owner: thread::current().id(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::new()),
            config,
        };

        {
            let mut workers = pool.workers.lock();
            pool.spawn_workers(&mut workers, pool.config.num_threads)?;
        }

        info!(workers = pool.config.num_threads, "thread pool started");
        Ok(pool)
    }

    /// Submits `f` and returns a handle to its result.
    ///
    /// From the owner thread, or while some worker is idle, the task is
    /// appended to the queue. From any other thread while every worker is
    /// busy, `f` runs synchronously before `enqueue` returns, so a task that
    /// submits a child and waits on it cannot starve the pool.
    ///
    /// This only covers the submission itself. A task that blocks on the
    /// handle of a child queued *before* the pool saturated can still wait
    /// forever if every worker ends up blocked the same way.
    ///
    /// After [`shutdown`](Self::shutdown) the task is dropped and its handle
    /// resolves to [`TaskError::Discarded`](crate::errors::TaskError::Discarded).
    pub fn enqueue<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = packaged_task(f);
        self.shared.submit(task);
        handle
    }

    /// Stops and joins every worker, then starts `num_threads` new ones.
    ///
    /// Tasks still queued are discarded, exactly as with `shutdown`.
    pub fn reset(&self, num_threads: usize) -> PoolResult<()> {
        if num_threads == 0 {
            return Err(PoolError::config("num_threads must be > 0"));
        }

        let mut workers = self.workers.lock();
        self.stop_workers(&mut workers);
        self.spawn_workers(&mut workers, num_threads)?;

        info!(workers = num_threads, "thread pool reset");
        Ok(())
    }

    /// Signals every worker to stop and waits until all of them have exited.
    ///
    /// Tasks still waiting in the queue never run; their handles resolve to
    /// `Discarded`. A task already running on a worker finishes first.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        self.stop_workers(&mut workers);
    }

    pub fn num_threads(&self) -> usize {
        self.shared.state.lock().workers
    }

    pub fn is_saturated(&self) -> bool {
        self.shared.state.lock().is_saturated()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().done
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.shared.state.lock().metrics()
    }

    /// The configuration the pool was built with; `reset` may since have
    /// changed the thread count.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn spawn_workers(&self, workers: &mut Vec<Worker>, count: usize) -> PoolResult<()> {
        let generation = {
            let mut state = self.shared.state.lock();
            state.done = false;
            state.generation += 1;
            state.generation
        };

        for id in 0..count {
            let shared = Arc::clone(&self.shared);
            let mut builder = thread::Builder::new().name(self.config.thread_name(id));
            if let Some(stack_size) = self.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            // Counted before the thread exists so `active <= workers` holds.
            self.shared.state.lock().workers += 1;

            match builder.spawn(move || shared.run(id, generation)) {
                Ok(thread) => workers.push(Worker {
                    id,
                    thread: Some(thread),
                }),
                Err(e) => {
                    self.shared.state.lock().workers -= 1;
                    error!(worker = id, error = %e, "failed to spawn worker thread");
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    fn stop_workers(&self, workers: &mut Vec<Worker>) {
        if workers.is_empty() {
            return;
        }

        let pending = {
            let mut state = self.shared.state.lock();
            state.done = true;
            let pending = mem::take(&mut state.queue);
            state.discarded += pending.len() as u64;
            pending
        };

        self.shared.work_queued.notify_all();

        // Resolves their handles to `Discarded` without waiting for the join.
        if !pending.is_empty() {
            debug!(discarded = pending.len(), "dropping tasks that never ran");
        }
        drop(pending);

        let stopped = workers.len();
        workers.clear();
        self.shared.state.lock().workers = 0;

        info!(workers = stopped, "thread pool shut down");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("owner", &self.shared.owner)
            .field("metrics", &self.metrics())
            .finish()
    }
}
