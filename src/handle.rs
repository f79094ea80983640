use super::{
    errors::{TaskError, TaskResult},
    task::Task,
};
use futures::channel::oneshot;
use std::{
    any::Any,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll},
};

/// Handle на результат задачи: готов, когда задача отработала на воркере или
/// inline в потоке, который её отправил.
///
/// Can be blocked on with [`get`](Self::get) or awaited as a `Future`.
/// Dropping the handle does not affect the task.
#[must_use = "dropping a TaskHandle discards the task's result"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    fn new(receiver: oneshot::Receiver<TaskResult<T>>) -> Self {
        Self { receiver }
    }

    /// Blocks the current thread until the task has produced its result.
    ///
    /// Calling this from inside a task on a saturated pool can deadlock if the
    /// awaited task is still queued; see the crate docs.
    pub fn get(self) -> TaskResult<T> {
        futures::executor::block_on(self)
    }

    /// Takes the result if it is already available, otherwise hands the
    /// handle back.
    ///
    /// The result can be taken only once, so a ready handle is consumed.
    pub fn try_get(mut self) -> Result<TaskResult<T>, Self> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(self),
            Err(oneshot::Canceled) => Ok(Err(TaskError::Discarded)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(TaskError::Discarded))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Binds `f` to a fresh promise. The returned [`Task`] runs `f`, catches any
/// panic, and fulfils the paired [`TaskHandle`]. Dropping the task unrun makes
/// the handle resolve to [`TaskError::Discarded`].
pub fn packaged_task<F, T>(f: F) -> (Task, TaskHandle<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    let task = Task::new(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| TaskError::Panic(panic_message(payload.as_ref())));
        // With the handle gone the result is handed back and dropped here. Its
        // destructor may panic too, and that must not unwind into the worker.
        let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(tx.send(result))));
    });

    (task, TaskHandle::new(rx))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
