pub(crate) use op::UringOp;
use std::{cell::OnceCell, io, mem::transmute, task::Waker};
use uring::ReactorUring;

mod op;
mod uring;

pub(crate) type ReactorOp = UringOp<'static, Waker>;

pub(crate) struct Reactor {}

/// How a thread sleeps. Threads whose kernel refuses io_uring fall back to
/// plain blocking syscalls; with one task running at a time on the worker,
/// blocking the thread is no different from suspending the task.
enum Backend {
    Ring(ReactorUring<Waker>),
    Blocking,
}

thread_local! {
    static REACTOR: OnceCell<Backend> = const { OnceCell::new() };
}

fn not_initialised() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "no reactor on this thread; worker futures must run inside a serial executor",
    )
}

pub(crate) fn ring_unsupported(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::ENOSYS) | Some(libc::EPERM) | Some(libc::EACCES)
    )
}

impl Reactor {
    /// Set up this thread's ring with room for `entries` submissions. Calling
    /// it again on the same thread is a no-op.
    pub fn init(entries: u32) -> io::Result<()> {
        REACTOR.with(|r| {
            if r.get().is_some() {
                return Ok(());
            }

            let backend = match ReactorUring::new(entries) {
                Ok(ring) => Backend::Ring(ring),
                Err(e) if ring_unsupported(&e) => {
                    log::warn!("io_uring unavailable ({e}), falling back to blocking waits");
                    Backend::Blocking
                }
                Err(e) => return Err(e),
            };

            let _ = r.set(backend);

            Ok(())
        })
    }

    /// A new ring op for this thread, or `None` if the thread blocks instead.
    pub fn new_op() -> io::Result<Option<ReactorOp>> {
        REACTOR.with(|r| match r.get().ok_or_else(not_initialised)? {
            // The ring lives until the thread exits, and ops never leave the
            // thread that created them.
            Backend::Ring(ring) => Ok(Some(unsafe {
                transmute::<UringOp<'_, Waker>, ReactorOp>(ring.new_op())
            })),
            Backend::Blocking => Ok(None),
        })
    }

    pub fn react() -> io::Result<()> {
        REACTOR.with(|r| match r.get().ok_or_else(not_initialised)? {
            Backend::Ring(ring) => {
                for waker in ring.react()? {
                    waker.wake();
                }

                Ok(())
            }
            Backend::Blocking => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "pending future on a blocking worker would never wake",
            )),
        })
    }
}
