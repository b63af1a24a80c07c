//! Async timers for tasks running on a serial executor.
//!
//! A [Timer] is an io_uring timeout. Awaiting one suspends the current task
//! for at least the requested duration. The worker does *not* pick up the next
//! queued task while a task sleeps: the sleeping task still owns the state.
//!
//! # Example
//! ```
//! use seria::futures::timer::Timer;
//! use seria::SerialExecutor;
//! use std::time::{Duration, Instant};
//!
//! let exec = SerialExecutor::new(Vec::new()).unwrap();
//!
//! let slept = exec
//!     .execute_async(|log| Box::pin(async move {
//!         let now = Instant::now();
//!         Timer::sleep(Duration::from_millis(20))?.await?;
//!         log.push("woke");
//!         Ok::<_, std::io::Error>(now.elapsed())
//!     }))
//!     .unwrap()
//!     .unwrap();
//!
//! assert!(slept >= Duration::from_millis(20));
//! assert_eq!(exec.shutdown().unwrap(), vec!["woke"]);
//! ```
use std::{
    future::Future,
    io, mem,
    pin::Pin,
    task::{Context, Poll},
    thread,
    time::{Duration, Instant},
};

use io_uring::{opcode, types};

use crate::reactor::{Reactor, ReactorOp};

/// Asynchronous timer.
///
/// Obtained through [Timer::sleep]. Resolves to `Ok(())` once the deadline has
/// passed.
pub struct Timer {
    deadline: Instant,
    ts: Box<types::Timespec>,
    op: Option<ReactorOp>,
}

impl Timer {
    /// Put the current task to sleep for `d`.
    ///
    /// Fails if called outside of a task, where there is no ring to arm the
    /// timeout on, or if the deadline is not representable.
    #[must_use = "timers do nothing unless `.await`ed"]
    pub fn sleep(d: Duration) -> io::Result<Self> {
        let deadline = Instant::now().checked_add(d).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "sleep duration overflows")
        })?;

        Ok(Self {
            deadline,
            ts: Box::new(
                types::Timespec::new()
                    .sec(d.as_secs())
                    .nsec(d.subsec_nanos()),
            ),
            op: Reactor::new_op()?,
        })
    }
}

impl Future for Timer {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let Some(op) = this.op.as_mut() else {
            // No ring on this worker: nothing else can run meanwhile, so just
            // sleep the thread.
            thread::sleep(this.deadline.saturating_duration_since(Instant::now()));
            return Poll::Ready(Ok(()));
        };

        if !op.is_in_flight() && Instant::now() >= this.deadline {
            return Poll::Ready(Ok(()));
        }

        let ts = &*this.ts as *const types::Timespec;

        op.submit_or_poll(|| (opcode::Timeout::new(ts).build(), cx.waker().clone()))
            .map(|res| match res {
                Ok(_) => Ok(()),
                Err(e) if e.raw_os_error() == Some(libc::ETIME) => Ok(()),
                Err(e) => Err(e),
            })
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        // The timespec is only read once the ring is next submitted.
        if self.op.as_ref().is_some_and(|op| op.is_in_flight()) {
            mem::forget(mem::replace(&mut self.ts, Box::new(types::Timespec::new())));
        }
    }
}
