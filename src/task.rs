//! Task results and the worker's poll loop.
//!
//! Every submission to a [SerialExecutor](crate::SerialExecutor) returns a
//! [Completion]: a one-shot handle through which the submitter collects the
//! task's result. The submitter decides how to wait:
//!
//! 1. [Completion::wait] blocks the calling thread until the task has run.
//! 2. [Completion::wait_timeout] and [Completion::try_wait] bound or skip the
//!    wait.
//! 3. Dropping the handle detaches: the task still runs, its value is lost.
//!
//! # Example
//!
//! ```
//! use seria::SerialExecutor;
//!
//! let exec = SerialExecutor::new(String::new()).unwrap();
//!
//! let first = exec.submit(|s| { s.push_str("Hello, "); s.len() }).unwrap();
//! let second = exec.submit(|s| { s.push_str("world!"); s.len() }).unwrap();
//!
//! assert_eq!(second.wait().unwrap(), 13);
//! assert_eq!(first.wait().unwrap(), 7);
//! assert_eq!(exec.shutdown().unwrap(), "Hello, world!");
//! ```
//!
//! # Cancellation
//!
//! A task that the worker has not started yet can be withdrawn with
//! [Completion::cancel]. Running tasks are never interrupted; they run to
//! completion.
//!
//! ```
//! use seria::{Error, SerialExecutor};
//! use std::sync::mpsc::channel;
//!
//! let exec = SerialExecutor::new(0).unwrap();
//! let (unblock_tx, unblock_rx) = channel::<()>();
//!
//! // Keep the worker busy so the next task stays queued.
//! let busy = exec.submit(move |_| unblock_rx.recv().unwrap()).unwrap();
//! let queued = exec.submit(|n| *n += 1).unwrap();
//!
//! assert!(queued.cancel());
//! unblock_tx.send(()).unwrap();
//!
//! busy.wait().unwrap();
//! assert!(matches!(queued.wait(), Err(Error::Cancelled)));
//! assert_eq!(exec.shutdown().unwrap(), 0);
//! ```
use std::{
    any::Any,
    future::Future,
    io,
    panic::{self, AssertUnwindSafe},
    pin::{pin, Pin},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        mpsc::{Receiver, RecvTimeoutError, TryRecvError},
        Arc,
    },
    task::{Context, Poll, Wake, Waker},
    thread::{self, ThreadId},
    time::Duration,
};

use crate::{
    error::{Error, Result},
    executor::Status,
    futures::event::{Event, EventWait},
    reactor::Reactor,
};

/// A boxed future that borrows the executor's state for `'a`. Async tasks
/// return one of these from their closure.
pub type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

struct Wakeup {
    woken: AtomicBool,
    owner: ThreadId,
    event: Event,
}

impl Wake for Wakeup {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if self.woken.swap(true, Ordering::AcqRel) {
            return;
        }

        // The owner re-checks the flag before it next sleeps. Anyone else has
        // to kick it out of the ring.
        if thread::current().id() != self.owner {
            if let Err(e) = self.event.notify_one() {
                log::error!("could not wake blocked worker: {e}");
            }
        }
    }
}

/// Drive `fut` to completion on the current thread, sleeping on the thread's
/// ring whenever the future is pending.
///
/// While `fut` is pending a read of a private eventfd stays in flight, so
/// wakers fired from other threads interrupt the sleep.
pub(crate) fn block_on<F: Future>(fut: F) -> io::Result<F::Output> {
    let mut fut = pin!(fut);
    let event = Event::new()?;
    let wakeup = Arc::new(Wakeup {
        woken: AtomicBool::new(true),
        owner: thread::current().id(),
        event: event.clone(),
    });
    let waker = Waker::from(wakeup.clone());
    let mut cx = Context::from_waker(&waker);
    let mut remote: Option<EventWait> = None;

    loop {
        if wakeup.woken.swap(false, Ordering::AcqRel) {
            if let Poll::Ready(value) = fut.as_mut().poll(&mut cx) {
                return Ok(value);
            }

            continue;
        }

        let mut wait = match remote.take() {
            Some(wait) => wait,
            None => event.wait()?,
        };

        if let Poll::Ready(res) = Pin::new(&mut wait).poll(&mut cx) {
            res?;
            continue;
        }

        remote = Some(wait);
        Reactor::react()?;
    }
}

/// Turns a panic inside a task's future into an `Err` carrying the payload.
pub(crate) struct CatchUnwind<'a, T>(pub(crate) LocalFuture<'a, T>);

impl<T> Future for CatchUnwind<'_, T> {
    type Output = thread::Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let fut = &mut self.0;

        match panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked".to_string()
    }
}

const QUEUED: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared between a queued task and its [Completion]; decides the race between
/// the worker starting the task and the submitter cancelling it.
#[derive(Default)]
pub(crate) struct Ticket(AtomicU8);

impl Ticket {
    pub fn begin(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn cancel(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) == CANCELLED
    }
}

/// A handle to a submitted task.
///
/// The result can be collected once, by whichever of [Completion::wait],
/// [Completion::wait_timeout] or [Completion::try_wait] observes it first.
pub struct Completion<T> {
    pub(crate) rx: Receiver<Result<T>>,
    pub(crate) ticket: Arc<Ticket>,
    pub(crate) status: Arc<Status>,
}

impl<T> Completion<T> {
    /// Block the calling thread until the task has run and return its value.
    ///
    /// Returns [Error::WouldDeadlock] instead of blocking when called from a
    /// task running on the same executor, since the worker could never get to
    /// the awaited task.
    pub fn wait(self) -> Result<T> {
        match self.rx.try_recv() {
            Ok(result) => return result,
            Err(TryRecvError::Disconnected) => return Err(self.lost()),
            Err(TryRecvError::Empty) => {}
        }

        if self.status.on_worker() {
            return Err(Error::WouldDeadlock);
        }

        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(self.lost()),
        }
    }

    /// Like [Completion::wait], but give up after `timeout`. Returns `None` if
    /// the task has not finished by then.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        if let Some(result) = self.try_wait() {
            return Some(result);
        }

        if self.status.on_worker() {
            return Some(Err(Error::WouldDeadlock));
        }

        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(self.lost())),
        }
    }

    /// Return the result if the task has already finished.
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.lost())),
        }
    }

    /// Withdraw the task if the worker has not started it yet. Returns `true`
    /// if the task will never run.
    pub fn cancel(&self) -> bool {
        let cancelled = self.ticket.cancel();

        if cancelled {
            log::trace!("task cancelled before it started");
        }

        cancelled
    }

    // The task's sender went away without a result.
    fn lost(&self) -> Error {
        if self.ticket.is_cancelled() {
            Error::Cancelled
        } else {
            self.status.lost()
        }
    }
}
