use std::{cell::RefCell, io};

use io_uring::{squeue, IoUring};
use slab::Slab;

use super::op::{CompletionTable, UringOp};

pub struct ReactorUring<T>(RefCell<RingState<T>>);

impl<T> ReactorUring<T> {
    pub fn new(entries: u32) -> io::Result<Self> {
        Ok(Self(RefCell::new(RingState::new(entries)?)))
    }

    pub fn new_op(&self) -> UringOp<'_, T> {
        UringOp::new(&self.0)
    }

    pub fn react(&self) -> io::Result<Vec<T>> {
        self.0.borrow_mut().react()
    }
}

pub(super) struct RingState<T> {
    uring: IoUring,
    owners: Slab<(T, usize)>,
    pub completions: CompletionTable,
}

impl<T> RingState<T> {
    fn new(entries: u32) -> io::Result<Self> {
        Ok(Self {
            uring: IoUring::new(entries)?,
            owners: Slab::new(),
            completions: CompletionTable::new(),
        })
    }

    /// Queue `entry` on the ring. `owner` is handed back by [Self::react] once
    /// the kernel has completed the operation. The caller must keep any memory
    /// referenced by `entry` alive until then.
    pub fn push(&mut self, entry: squeue::Entry, owner: T) -> io::Result<usize> {
        let result_idx = self.completions.reserve();
        let key = self.owners.insert((owner, result_idx));
        let entry = entry.user_data(key as u64);

        if unsafe { self.uring.submission().push(&entry) }.is_ok() {
            return Ok(result_idx);
        }

        // Submission queue is full: hand what is queued to the kernel and
        // try once more.
        let retried = self
            .uring
            .submit()
            .map(|_| unsafe { self.uring.submission().push(&entry) }.is_ok());

        match retried {
            Ok(true) => Ok(result_idx),
            Ok(false) => {
                self.owners.remove(key);
                self.completions.forget(result_idx);
                Err(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "io_uring submission queue is full",
                ))
            }
            Err(e) => {
                self.owners.remove(key);
                self.completions.forget(result_idx);
                Err(e)
            }
        }
    }

    /// Submit everything queued, sleep until at least one operation completes
    /// and return the owners of all completed operations.
    pub fn react(&mut self) -> io::Result<Vec<T>> {
        if self.owners.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "nothing in flight on the ring; a pending future would never wake",
            ));
        }

        match self.uring.submit_and_wait(1) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        let completions = unsafe { self.uring.completion_shared() };

        Ok(completions
            .map(|cqe| {
                let (owner, result_idx) = self.owners.remove(cqe.user_data() as usize);
                self.completions.complete(result_idx, cqe.result());

                owner
            })
            .collect())
    }
}
