//! # `seria`: serial execution for shared state
//!
//! This crate confines mutation of a piece of shared state to a single worker
//! thread. Any number of threads submit closures; the worker runs them one at
//! a time, handing each one `&mut` access to the state. There are no lost
//! updates and no lock around the state: only the worker ever owns it.
//!
//! The worker runs a tiny io_uring-driven runtime so tasks may also be `async`
//! and sleep on [futures::timer::Timer]s. An async task still runs to
//! completion before the next task starts.
//!
//! For the executor itself, refer to the [executor] module. For collecting
//! results, see [task]. A ready-made counter lives in [counter].
//!
//! ## Example
//!
//! ```
//! use seria::SerialExecutor;
//! use std::thread;
//!
//! let exec = SerialExecutor::new(0).unwrap();
//! let submitter = exec.submitter();
//!
//! let t = thread::spawn(move || submitter.execute(|n| { *n += 1; *n }));
//! let here = exec.execute(|n| { *n += 1; *n }).unwrap();
//! let there = t.join().unwrap().unwrap();
//!
//! assert_eq!(here + there, 3);
//! assert_eq!(exec.shutdown().unwrap(), 2);
//! ```
pub mod counter;
pub mod error;
pub mod executor;
pub mod futures;
pub(crate) mod reactor;
pub mod task;

pub use error::{Error, Result};
pub use executor::{Builder, SerialExecutor, Submitter};
pub use task::{Completion, LocalFuture};
