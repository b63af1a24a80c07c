//! A counter that many threads can update without losing writes.
//!
//! [SharedCounter] is the classic motivating example for a serial executor:
//! the value lives on the executor's worker, and every increment is a task.
//! However many threads race, each submitted update is applied exactly once.
//!
//! ```
//! use seria::counter::SharedCounter;
//! use std::thread;
//!
//! let counter = SharedCounter::new(0).unwrap();
//!
//! thread::scope(|s| {
//!     for _ in 0..4 {
//!         let counter = &counter;
//!         s.spawn(move || {
//!             for _ in 0..250 {
//!                 counter.increment().unwrap();
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(counter.get().unwrap(), 1_000);
//! ```
use crate::{
    error::Result,
    executor::{Builder, SerialExecutor, Submitter},
    task::Completion,
};

/// An `i64` owned by its own [SerialExecutor].
pub struct SharedCounter {
    exec: SerialExecutor<i64>,
}

impl SharedCounter {
    pub fn new(initial: i64) -> Result<Self> {
        Self::with_builder(Builder::new().name("seria-counter"), initial)
    }

    pub fn with_builder(builder: Builder, initial: i64) -> Result<Self> {
        Ok(Self {
            exec: builder.spawn(initial)?,
        })
    }

    /// Add `delta`. The completion resolves to the value after the update.
    pub fn add(&self, delta: i64) -> Result<Completion<i64>> {
        self.exec.submit(move |n| {
            *n += delta;
            *n
        })
    }

    pub fn increment(&self) -> Result<Completion<i64>> {
        self.add(1)
    }

    pub fn decrement(&self) -> Result<Completion<i64>> {
        self.add(-1)
    }

    /// Read the value once every update submitted before this call has been
    /// applied.
    pub fn get(&self) -> Result<i64> {
        self.exec.execute(|n| *n)
    }

    /// A handle for updating the counter from threads that don't borrow it.
    /// Submit `|n| *n += 1` style tasks through it.
    pub fn submitter(&self) -> Submitter<i64> {
        self.exec.submitter()
    }

    /// Apply everything still queued and return the final value.
    pub fn into_inner(self) -> Result<i64> {
        self.exec.shutdown()
    }
}
