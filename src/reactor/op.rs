use std::{cell::RefCell, io, task::Poll};

use io_uring::squeue;
use slab::Slab;

use super::uring::RingState;

#[derive(Debug)]
enum OpState {
    Idle,
    InFlight(usize),
    Done(i32),
}

/// A single operation on a ring, driven by repeated polling from a future.
pub(crate) struct UringOp<'a, T> {
    state: OpState,
    ring: &'a RefCell<RingState<T>>,
}

impl From<&OpState> for Poll<io::Result<i32>> {
    fn from(value: &OpState) -> Self {
        match value {
            OpState::Idle | OpState::InFlight(_) => Poll::Pending,
            OpState::Done(res) if *res < 0 => {
                Poll::Ready(Err(io::Error::from_raw_os_error(res.abs())))
            }
            OpState::Done(res) => Poll::Ready(Ok(*res)),
        }
    }
}

impl<'a, T> UringOp<'a, T> {
    pub(super) fn new(ring: &'a RefCell<RingState<T>>) -> Self {
        Self {
            state: OpState::Idle,
            ring,
        }
    }

    /// On first call, build the submission with `f` and queue it. On later
    /// calls, pick up the kernel's result if it has arrived.
    pub fn submit_or_poll(
        &mut self,
        f: impl FnOnce() -> (squeue::Entry, T),
    ) -> Poll<io::Result<i32>> {
        match self.state {
            OpState::Idle => {
                let (entry, owner) = f();
                match self.ring.borrow_mut().push(entry, owner) {
                    Ok(slot) => self.state = OpState::InFlight(slot),
                    Err(e) => return Poll::Ready(Err(e)),
                }
            }
            OpState::InFlight(slot) => {
                if let Some(res) = self.ring.borrow_mut().completions.take(slot) {
                    self.state = OpState::Done(res);
                }
            }
            OpState::Done(_) => {}
        }

        (&self.state).into()
    }

    /// Whether the kernel may still be touching memory this op handed it.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, OpState::InFlight(_))
    }
}

impl<T> Drop for UringOp<'_, T> {
    fn drop(&mut self) {
        if let OpState::InFlight(slot) = self.state {
            self.ring.borrow_mut().completions.abandon(slot);
        }
    }
}

pub(crate) struct CompletionTable(pub(super) Slab<Slot>);

pub(super) enum Slot {
    Waiting,
    Done(i32),
    Abandoned,
}

impl CompletionTable {
    pub fn new() -> Self {
        Self(Slab::new())
    }

    pub fn reserve(&mut self) -> usize {
        self.0.insert(Slot::Waiting)
    }

    /// Record the kernel's result. Nobody is interested in the results of
    /// abandoned ops, so their slots are freed straight away.
    pub fn complete(&mut self, idx: usize, result: i32) {
        match self.0.get_mut(idx) {
            Some(Slot::Abandoned) => {
                self.0.remove(idx);
            }
            Some(slot) => *slot = Slot::Done(result),
            None => log::warn!("completion for unknown ring slot {idx}"),
        }
    }

    pub fn take(&mut self, idx: usize) -> Option<i32> {
        let Some(&Slot::Done(result)) = self.0.get(idx) else {
            return None;
        };

        self.0.remove(idx);
        Some(result)
    }

    pub fn abandon(&mut self, idx: usize) {
        match self.0.get_mut(idx) {
            Some(Slot::Done(_)) => {
                self.0.remove(idx);
            }
            Some(slot) => *slot = Slot::Abandoned,
            None => {}
        }
    }

    /// Drop a slot whose op never reached the ring.
    pub fn forget(&mut self, idx: usize) {
        self.0.try_remove(idx);
    }
}
