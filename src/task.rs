//! The unit of work stored in the pool's queue.

use std::fmt;

/// Anything that can be run exactly once on a worker thread.
///
/// Implemented for every `FnOnce() + Send`, so callers never implement it by
/// hand; it exists to give the boxed closure a name the queue can store.
pub trait Runnable: Send {
    fn run(self: Box<Self>);
}

impl<F> Runnable for F
where
    F: FnOnce() + Send,
{
    #[inline]
    fn run(self: Box<Self>) {
        (*self)()
    }
}

/// A type-erased, move-only, run-once work item.
pub struct Task {
    inner: Box<dyn Runnable + 'static>,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { inner: Box::new(f) }
    }

    /// Consumes the task, so it cannot run twice.
    #[inline]
    pub fn run(self) {
        self.inner.run();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_runs_non_copyable_capture() {
        let hits = Arc::new(AtomicUsize::new(0));
        let owned = Box::new(41);

        let task = {
            let hits = hits.clone();
            Task::new(move || {
                hits.fetch_add(*owned + 1, Ordering::SeqCst);
            })
        };

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        task.run();
        assert_eq!(hits.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_heterogeneous_tasks_share_a_queue() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut queue = std::collections::VecDeque::new();

        for i in 0..3 {
            let log = log.clone();
            queue.push_back(Task::new(move || log.lock().push(i)));
        }
        let name = String::from("tail");
        let tail_log = log.clone();
        queue.push_back(Task::new(move || tail_log.lock().push(name.len() as i32 * 10)));

        while let Some(task) = queue.pop_front() {
            task.run();
        }
        assert_eq!(*log.lock(), vec![0, 1, 2, 40]);
    }

    #[test]
    fn test_dropping_unrun_task_drops_capture() {
        let marker = Arc::new(());
        let task = {
            let marker = marker.clone();
            Task::new(move || drop(marker))
        };

        assert_eq!(Arc::strong_count(&marker), 2);
        drop(task);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
