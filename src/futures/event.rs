//! Cross-thread wakeups.
//!
//! An [Event] wraps a Linux
//! [eventfd](https://man7.org/linux/man-pages/man2/eventfd.2.html). Any thread
//! may call [Event::notify_one]; a serial executor's worker awaits
//! [Event::wait] through its ring, so an idle worker sleeps in the kernel
//! instead of spinning.
//!
//! Notifications accumulate: several calls to [Event::notify_one] before a
//! wait are consumed by that single wait.
use std::{
    future::Future,
    io, mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use io_uring::{opcode, types};

use crate::reactor::{Reactor, ReactorOp};

/// A counter that can be bumped from anywhere and waited on from a worker.
#[derive(Clone)]
pub struct Event {
    fd: Arc<OwnedFd>,
}

impl Event {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };

        if fd == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd: Arc::new(unsafe { OwnedFd::from_raw_fd(fd) }),
        })
    }

    /// Bump the counter, waking a waiter if there is one.
    pub fn notify_one(&self) -> io::Result<()> {
        let one: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &one as *const u64 as *const _,
                mem::size_of::<u64>(),
            )
        };

        if ret == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Return a future that completes once the counter is non-zero, yielding
    /// the number of notifications consumed. Must be called on a thread with a
    /// reactor, i.e. from inside a task.
    ///
    /// On a worker without a ring the future blocks the thread in `read(2)`
    /// when polled.
    pub fn wait(&self) -> io::Result<EventWait> {
        Ok(EventWait {
            fd: self.fd.clone(),
            op: Reactor::new_op()?,
            count: Box::new(0),
        })
    }
}

/// Future returned by [Event::wait].
pub struct EventWait {
    fd: Arc<OwnedFd>,
    op: Option<ReactorOp>,
    count: Box<u64>,
}

fn read_blocking(fd: RawFd) -> io::Result<u64> {
    let mut count = 0u64;

    loop {
        let ret = unsafe {
            libc::read(
                fd,
                &mut count as *mut u64 as *mut _,
                mem::size_of::<u64>(),
            )
        };

        if ret != -1 {
            return Ok(count);
        }

        let err = io::Error::last_os_error();

        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

impl Future for EventWait {
    type Output = io::Result<u64>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let fd = this.fd.as_raw_fd();
        let buf = &mut *this.count as *mut u64 as *mut u8;

        let Some(op) = this.op.as_mut() else {
            return Poll::Ready(read_blocking(fd));
        };

        let res = op.submit_or_poll(|| {
            (
                opcode::Read::new(types::Fd(fd), buf, mem::size_of::<u64>() as _).build(),
                cx.waker().clone(),
            )
        });

        res.map(|x| x.map(|_| *this.count))
    }
}

impl Drop for EventWait {
    fn drop(&mut self) {
        // The kernel may still write the counter into `count`.
        if self.op.as_ref().is_some_and(|op| op.is_in_flight()) {
            mem::forget(mem::replace(&mut self.count, Box::new(0)));
        }
    }
}
