//! Futures that async tasks can await on the worker.
//!
//! Tasks submitted with
//! [SerialExecutor::submit_async](crate::SerialExecutor::submit_async) run on
//! the worker's single-threaded runtime. These futures are what such a task
//! can sleep on; the worker's ring wakes it once the kernel reports progress.
//!
//! - `event`: eventfd-backed notifications, usable from any thread. The worker
//!   sleeps on one of these while its queue is empty.
//! - `timer`: io_uring timeouts for putting a task to sleep.
//!
//! Creating either wait future outside of a task fails, since only the worker
//! thread has a ring.
pub mod event;
pub mod timer;
