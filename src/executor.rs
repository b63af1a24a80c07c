//! The serial executor.
//!
//! A [SerialExecutor] owns a piece of state and a single worker thread. It is
//! the only thing that ever touches the state: callers on any number of
//! threads hand it closures, and the worker runs those closures one at a time,
//! lending each the state as `&mut S`. Mutual exclusion is a property of
//! ownership, so no lock is taken around the state.
//!
//! Submitting never waits for the worker. Each submission returns a
//! [Completion] which can be waited on for the task's value.
//!
//! # Example
//!
//! Ten threads, each incrementing a shared counter a thousand times:
//!
//! ```
//! use seria::SerialExecutor;
//! use std::thread;
//!
//! let exec = SerialExecutor::new(0u64).unwrap();
//!
//! thread::scope(|s| {
//!     for _ in 0..10 {
//!         let submitter = exec.submitter();
//!         s.spawn(move || {
//!             for _ in 0..1_000 {
//!                 submitter.submit(|n| *n += 1).unwrap();
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(exec.shutdown().unwrap(), 10_000);
//! ```
//!
//! # Ordering
//!
//! The queue is FIFO. Two submissions where one happens-before the other (for
//! example two calls in sequence on the same thread) run in that order.
//! Submissions racing on different threads run in *some* order, never
//! interleaved.
//!
//! # Contract
//!
//! Tasks should not block for unbounded time: while one runs, nothing else
//! does. A task may submit further work to its own executor, but must not wait
//! for it; [Completion::wait] reports [Error::WouldDeadlock] if it tries.
use std::{
    io,
    panic::{self, resume_unwind, AssertUnwindSafe},
    sync::{
        atomic::{self, AtomicBool, Ordering},
        mpsc::{channel, sync_channel, Receiver, Sender, SyncSender, TryRecvError},
        Arc, OnceLock,
    },
    thread::{self, JoinHandle, ThreadId},
};

use crate::{
    error::{Error, Result},
    futures::event::Event,
    reactor::Reactor,
    task::{self, panic_message, CatchUnwind, Completion, LocalFuture, Ticket},
};

const DEFAULT_RING_ENTRIES: u32 = 64;

type Job<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, ()> + Send>;

enum Message<S> {
    Run { job: Job<S>, ticket: Arc<Ticket> },
    Shutdown,
}

fn boxed_job<S, F>(f: F) -> Job<S>
where
    F: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// Executor-wide state visible to submitters and completions.
#[derive(Default)]
pub(crate) struct Status {
    closed: AtomicBool,
    fault: OnceLock<(io::ErrorKind, String)>,
    worker: OnceLock<ThreadId>,
}

impl Status {
    fn check(&self) -> Result<()> {
        if let Some(e) = self.fault() {
            return Err(e);
        }

        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ClosedExecutor);
        }

        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn fail(&self, e: &io::Error) {
        let _ = self.fault.set((e.kind(), e.to_string()));
        self.close();
    }

    fn fault(&self) -> Option<Error> {
        self.fault
            .get()
            .map(|(kind, msg)| Error::ResourceExhaustion(io::Error::new(*kind, msg.clone())))
    }

    /// Why a task vanished without reporting back.
    pub(crate) fn lost(&self) -> Error {
        self.fault().unwrap_or(Error::ClosedExecutor)
    }

    pub(crate) fn on_worker(&self) -> bool {
        self.worker.get() == Some(&thread::current().id())
    }
}

/// Wakes the worker when it has gone to sleep on an empty queue. Submitters
/// only pay for the eventfd write when the worker is actually parked.
struct Doorbell {
    event: Event,
    parked: AtomicBool,
}

impl Doorbell {
    fn ring(&self) -> io::Result<()> {
        atomic::fence(Ordering::SeqCst);

        if self.parked.swap(false, Ordering::SeqCst) {
            self.event.notify_one()?;
        }

        Ok(())
    }

    fn park(&self) {
        self.parked.store(true, Ordering::SeqCst);
        atomic::fence(Ordering::SeqCst);
    }

    fn unpark(&self) {
        self.parked.store(false, Ordering::SeqCst);
    }
}

struct Shared<S> {
    tx: Sender<Message<S>>,
    doorbell: Doorbell,
    status: Arc<Status>,
}

impl<S> Shared<S> {
    fn enqueue<T, W>(&self, work: W) -> Result<Completion<T>>
    where
        T: Send + 'static,
        W: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, thread::Result<T>> + Send + 'static,
    {
        self.status.check()?;

        let ticket = Arc::new(Ticket::default());
        let (result_tx, rx) = sync_channel(1);

        let job = boxed_job(move |state| {
            Box::pin(async move {
                let result = work(state).await.map_err(|payload| {
                    let msg = panic_message(payload.as_ref());
                    log::warn!("task panicked: {msg}");
                    Error::TaskFailure(msg)
                });

                // The submitter may have dropped its completion.
                let _ = result_tx.send(result);
            })
        });

        self.tx
            .send(Message::Run {
                job,
                ticket: ticket.clone(),
            })
            .map_err(|_| self.status.lost())?;

        self.doorbell.ring().map_err(Error::ResourceExhaustion)?;

        Ok(Completion {
            rx,
            ticket,
            status: self.status.clone(),
        })
    }

    fn submit<F, T>(&self, f: F) -> Result<Completion<T>>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(move |state| {
            let result = panic::catch_unwind(AssertUnwindSafe(move || f(state)));
            Box::pin(std::future::ready(result))
        })
    }

    fn submit_async<F, T>(&self, f: F) -> Result<Completion<T>>
    where
        F: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, T> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(move |state| {
            match panic::catch_unwind(AssertUnwindSafe(move || f(state))) {
                Ok(fut) => Box::pin(CatchUnwind(fut)) as LocalFuture<'_, _>,
                Err(payload) => Box::pin(std::future::ready(Err(payload))),
            }
        })
    }
}

/// A cloneable, `Send` handle for submitting work to a [SerialExecutor] from
/// other threads.
///
/// Submitters may outlive the executor; once it has been shut down every
/// submission fails with [Error::ClosedExecutor].
pub struct Submitter<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Submitter<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> Submitter<S> {
    /// Queue `f` to run against the state. Never waits for the worker.
    pub fn submit<F, T>(&self, f: F) -> Result<Completion<T>>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.shared.submit(f)
    }

    /// Queue an async task. The future returned by `f` may await worker-side
    /// futures such as [Timer](crate::futures::timer::Timer); the worker
    /// drives it to completion before starting anything else.
    ///
    /// Futures woken from other threads are fine too: the worker sleeps until
    /// the wake arrives. A future that is never woken stalls the executor.
    pub fn submit_async<F, T>(&self, f: F) -> Result<Completion<T>>
    where
        F: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, T> + Send + 'static,
        T: Send + 'static,
    {
        self.shared.submit_async(f)
    }

    /// Submit `f` and block until it has run.
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit(f)?.wait()
    }

    /// Submit an async task and block until it has run.
    pub fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_async(f)?.wait()
    }

    /// Whether submissions are being refused.
    pub fn is_closed(&self) -> bool {
        self.shared.status.check().is_err()
    }
}

/// Configuration for a [SerialExecutor], in the style of
/// [std::thread::Builder].
#[derive(Debug, Clone)]
pub struct Builder {
    name: Option<String>,
    ring_entries: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            name: None,
            ring_entries: DEFAULT_RING_ENTRIES,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the worker thread. Defaults to `seria-worker`.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Size of the worker's io_uring submission queue. Only async tasks that
    /// keep many operations in flight at once need more than the default.
    pub fn ring_entries(self, ring_entries: u32) -> Self {
        Self {
            ring_entries,
            ..self
        }
    }

    /// Start the worker thread and move `state` onto it.
    pub fn spawn<S: Send + 'static>(self, state: S) -> Result<SerialExecutor<S>> {
        let name = self.name.unwrap_or_else(|| "seria-worker".to_string());
        let event = Event::new().map_err(Error::ResourceExhaustion)?;
        let status = Arc::new(Status::default());
        let (tx, rx) = channel();
        let (ready_tx, ready_rx) = sync_channel(1);

        let shared = Arc::new(Shared {
            tx,
            doorbell: Doorbell {
                event,
                parked: AtomicBool::new(false),
            },
            status: status.clone(),
        });

        let worker = Worker {
            name: name.clone(),
            rx,
            shared: shared.clone(),
            status,
        };
        let ring_entries = self.ring_entries;

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run(state, ring_entries, ready_tx))
            .map_err(Error::ResourceExhaustion)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(Error::ResourceExhaustion(e));
            }
            Err(_) => {
                // The worker died before reporting in.
                if let Err(payload) = handle.join() {
                    resume_unwind(payload);
                }
                return Err(Error::ResourceExhaustion(io::Error::new(
                    io::ErrorKind::Other,
                    "worker exited during startup",
                )));
            }
        }

        Ok(SerialExecutor {
            submitter: Submitter { shared },
            worker: Some(handle),
        })
    }
}

struct Worker<S> {
    name: String,
    rx: Receiver<Message<S>>,
    shared: Arc<Shared<S>>,
    status: Arc<Status>,
}

impl<S> Worker<S> {
    fn run(
        self,
        mut state: S,
        ring_entries: u32,
        ready: SyncSender<io::Result<()>>,
    ) -> S {
        let _ = self.status.worker.set(thread::current().id());

        if let Err(e) = Reactor::init(ring_entries) {
            log::error!("worker '{}' failed to set up its ring: {e}", self.name);
            self.status.fail(&e);
            let _ = ready.send(Err(e));
            return state;
        }

        let _ = ready.send(Ok(()));
        log::trace!("worker '{}' starting", self.name);

        match task::block_on(self.serve(&mut state)).and_then(|r| r) {
            Ok(ran) => log::debug!("worker '{}' drained after {ran} tasks", self.name),
            Err(e) => {
                log::error!("worker '{}' failed: {e}", self.name);
                self.status.fail(&e);
            }
        }

        // Anything still queued never runs; dropping it reports back to the
        // submitters.
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }

        if discarded > 0 {
            log::debug!("worker '{}' discarded {discarded} tasks", self.name);
        }

        log::trace!("worker '{}' exiting", self.name);
        state
    }

    async fn serve(&self, state: &mut S) -> io::Result<usize> {
        let doorbell = &self.shared.doorbell;
        let mut ran = 0;

        loop {
            let msg = match self.rx.try_recv() {
                Ok(msg) => msg,
                Err(TryRecvError::Disconnected) => return Ok(ran),
                Err(TryRecvError::Empty) => {
                    doorbell.park();

                    // A submission may have landed between the first look and
                    // parking; its submitter could have missed the flag.
                    match self.rx.try_recv() {
                        Ok(msg) => {
                            doorbell.unpark();
                            msg
                        }
                        Err(TryRecvError::Empty) => {
                            doorbell.event.wait()?.await?;
                            continue;
                        }
                        Err(TryRecvError::Disconnected) => return Ok(ran),
                    }
                }
            };

            match msg {
                Message::Run { job, ticket } => {
                    if !ticket.begin() {
                        continue;
                    }

                    job(&mut *state).await;
                    ran += 1;
                }
                Message::Shutdown => return Ok(ran),
            }
        }
    }
}

/// An executor that runs submitted tasks one at a time against its state.
///
/// See the [module-level documentation](self) for more information.
pub struct SerialExecutor<S: Send + 'static> {
    submitter: Submitter<S>,
    worker: Option<JoinHandle<S>>,
}

impl SerialExecutor<()> {
    /// Returns a builder that can be used to configure and spawn a
    /// [SerialExecutor].
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<S: Send + 'static> SerialExecutor<S> {
    /// Start an executor with the default configuration, taking ownership of
    /// `state`.
    pub fn new(state: S) -> Result<Self> {
        Builder::new().spawn(state)
    }

    /// A handle for submitting from other threads.
    pub fn submitter(&self) -> Submitter<S> {
        self.submitter.clone()
    }

    /// See [Submitter::submit].
    pub fn submit<F, T>(&self, f: F) -> Result<Completion<T>>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submitter.submit(f)
    }

    /// See [Submitter::submit_async].
    pub fn submit_async<F, T>(&self, f: F) -> Result<Completion<T>>
    where
        F: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, T> + Send + 'static,
        T: Send + 'static,
    {
        self.submitter.submit_async(f)
    }

    /// See [Submitter::execute].
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut S) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submitter.execute(f)
    }

    /// See [Submitter::execute_async].
    pub fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a, T> + Send + 'static,
        T: Send + 'static,
    {
        self.submitter.execute_async(f)
    }

    /// Stop accepting tasks, run everything queued so far, stop the worker and
    /// return the state.
    ///
    /// Fails with [Error::ResourceExhaustion] if the worker's runtime died;
    /// the state is lost in that case.
    pub fn shutdown(mut self) -> Result<S> {
        let state = self.stop();
        let status = &self.submitter.shared.status;

        match (state, status.fault()) {
            (_, Some(e)) => Err(e),
            (Some(state), None) => Ok(state),
            (None, None) => Err(Error::ClosedExecutor),
        }
    }

    fn stop(&mut self) -> Option<S> {
        let handle = self.worker.take()?;
        let shared = &self.submitter.shared;

        log::debug!("shutting down serial executor");
        shared.status.close();

        // A failed send means the worker has already exited.
        if shared.tx.send(Message::Shutdown).is_ok() {
            if let Err(e) = shared.doorbell.ring() {
                shared.status.fail(&e);
            }
        }

        match handle.join() {
            Ok(state) => Some(state),
            Err(payload) => {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
                None
            }
        }
    }
}

impl<S: Send + 'static> Drop for SerialExecutor<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            mpsc::channel,
            Arc,
        },
        task::{Poll, Waker},
        thread,
        time::Duration,
    };

    use anyhow::Result;

    use super::SerialExecutor;
    use crate::{error::Error, futures::timer::Timer};

    #[test]
    fn no_lost_updates() -> Result<()> {
        const SUBMITTERS: u64 = 10;
        const PER_SUBMITTER: u64 = 100_000;

        for _ in 0..3 {
            let exec = SerialExecutor::new(0u64)?;

            thread::scope(|s| {
                for _ in 0..SUBMITTERS {
                    let submitter = exec.submitter();
                    s.spawn(move || {
                        for _ in 0..PER_SUBMITTER {
                            submitter.submit(|n| *n += 1).unwrap();
                        }
                    });
                }
            });

            assert_eq!(exec.shutdown()?, SUBMITTERS * PER_SUBMITTER);
        }

        Ok(())
    }

    #[test]
    fn no_lost_wakeups_when_idle() -> Result<()> {
        let exec = SerialExecutor::new(0u64)?;

        // Short bursts let the worker park between rounds, so submitters keep
        // racing it going to sleep.
        for round in 1..=500 {
            thread::scope(|s| {
                for _ in 0..4 {
                    let submitter = exec.submitter();
                    s.spawn(move || submitter.submit(|n| *n += 1).unwrap().wait().unwrap());
                }
            });

            assert_eq!(exec.execute(|n| *n)?, round * 4);
        }

        Ok(())
    }

    #[test]
    fn no_updates_is_zero() -> Result<()> {
        let exec = SerialExecutor::new(0u64)?;

        assert_eq!(exec.shutdown()?, 0);

        Ok(())
    }

    #[test]
    fn mutual_exclusion() -> Result<()> {
        let exec = SerialExecutor::new(())?;
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        thread::scope(|s| {
            for _ in 0..8 {
                let submitter = exec.submitter();
                let busy = busy.clone();
                let overlaps = overlaps.clone();

                s.spawn(move || {
                    for _ in 0..1_000 {
                        let busy = busy.clone();
                        let overlaps = overlaps.clone();

                        submitter
                            .submit(move |_| {
                                if busy.swap(true, Ordering::SeqCst) {
                                    overlaps.fetch_add(1, Ordering::SeqCst);
                                }
                                std::hint::spin_loop();
                                busy.store(false, Ordering::SeqCst);
                            })
                            .unwrap();
                    }
                });
            }
        });

        exec.shutdown()?;
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);

        Ok(())
    }

    #[test]
    fn async_tasks_hold_state_across_sleep() -> Result<()> {
        let exec = SerialExecutor::new(Vec::new())?;
        let busy = Arc::new(AtomicBool::new(false));

        let completions = (0..5)
            .map(|i| {
                let busy = busy.clone();
                exec.submit_async(move |log: &mut Vec<usize>| {
                    Box::pin(async move {
                        assert!(!busy.swap(true, Ordering::SeqCst));
                        log.push(i);
                        Timer::sleep(Duration::from_millis(10))?.await?;
                        log.push(i);
                        busy.store(false, Ordering::SeqCst);
                        Ok::<_, std::io::Error>(())
                    })
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for completion in completions {
            completion.wait()??;
        }

        assert_eq!(exec.shutdown()?, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);

        Ok(())
    }

    #[test]
    fn fifo_per_submitter() -> Result<()> {
        let exec = SerialExecutor::new(Vec::new())?;

        thread::scope(|s| {
            for t in 0..4 {
                let submitter = exec.submitter();
                s.spawn(move || {
                    for i in 0..500 {
                        submitter
                            .submit(move |v: &mut Vec<(usize, usize)>| v.push((t, i)))
                            .unwrap();
                    }
                });
            }
        });

        let seen = exec.shutdown()?;
        assert_eq!(seen.len(), 2_000);

        for t in 0..4 {
            let order: Vec<_> = seen
                .iter()
                .filter(|(x, _)| *x == t)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(order, (0..500).collect::<Vec<_>>());
        }

        Ok(())
    }

    #[test]
    fn submit_after_shutdown_is_rejected() -> Result<()> {
        let exec = SerialExecutor::new(0)?;
        let submitter = exec.submitter();
        let ran = Arc::new(AtomicBool::new(false));

        exec.shutdown()?;

        assert!(submitter.is_closed());

        let flag = ran.clone();
        let err = submitter
            .submit(move |_| flag.store(true, Ordering::SeqCst))
            .err();

        assert!(matches!(err, Some(Error::ClosedExecutor)));
        assert!(matches!(submitter.execute(|n| *n), Err(Error::ClosedExecutor)));
        assert!(!ran.load(Ordering::SeqCst));

        Ok(())
    }

    #[test]
    fn failure_is_isolated() -> Result<()> {
        let exec = SerialExecutor::new(0)?;

        let failed = exec.submit(|_: &mut i32| -> i32 { panic!("task exploded") })?;
        let next = exec.submit(|n| {
            *n += 1;
            *n
        })?;

        match failed.wait() {
            Err(Error::TaskFailure(msg)) => assert_eq!(msg, "task exploded"),
            other => panic!("expected a task failure, got {other:?}"),
        }
        assert_eq!(next.wait()?, 1);

        let async_failed = exec.submit_async(|_| {
            Box::pin(async {
                Timer::sleep(Duration::from_millis(1)).unwrap().await.unwrap();
                panic!("async task exploded");
            })
        })?;
        assert!(matches!(async_failed.wait(), Err(Error::TaskFailure(_))));

        assert_eq!(exec.execute(|n| *n + 1)?, 2);
        assert_eq!(exec.shutdown()?, 1);

        Ok(())
    }

    #[test]
    fn shutdown_drains_queue() -> Result<()> {
        let exec = SerialExecutor::new(0u32)?;
        let (unblock_tx, unblock_rx) = channel::<()>();

        exec.submit(move |_| unblock_rx.recv().unwrap())?;

        let completions = (0..100)
            .map(|_| exec.submit(|n| *n += 1))
            .collect::<Result<Vec<_>, _>>()?;

        let unblocker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            unblock_tx.send(()).unwrap();
        });

        assert_eq!(exec.shutdown()?, 100);

        for completion in completions {
            assert!(completion.try_wait().is_some_and(|r| r.is_ok()));
        }

        unblocker.join().unwrap();

        Ok(())
    }

    #[test]
    fn waiting_inside_task_would_deadlock() -> Result<()> {
        let exec = SerialExecutor::new(0)?;
        let submitter = exec.submitter();

        let outcome = exec.execute(move |_| {
            let inner = submitter.submit(|n| *n += 1).unwrap();
            inner.wait()
        })?;

        assert!(matches!(outcome, Err(Error::WouldDeadlock)));

        // The nested task itself was queued and still runs.
        assert_eq!(exec.shutdown()?, 1);

        Ok(())
    }

    #[test]
    fn timed_wait_inside_task_would_deadlock() -> Result<()> {
        let exec = SerialExecutor::new(0)?;
        let submitter = exec.submitter();

        let outcome = exec.execute(move |_| {
            let inner = submitter.submit(|n| *n += 1).unwrap();
            inner.wait_timeout(Duration::from_secs(60))
        })?;

        assert!(matches!(outcome, Some(Err(Error::WouldDeadlock))));
        assert_eq!(exec.shutdown()?, 1);

        Ok(())
    }

    #[test]
    fn async_task_woken_from_another_thread() -> Result<()> {
        let exec = SerialExecutor::new(0)?;
        let (waker_tx, waker_rx) = channel::<Waker>();

        let waker_thread = thread::spawn(move || {
            let waker = waker_rx.recv().unwrap();
            thread::sleep(Duration::from_millis(50));
            waker.wake();
        });

        let value = exec.execute_async(move |n: &mut i32| {
            Box::pin(async move {
                let mut parked = false;
                future::poll_fn(|cx| {
                    if parked {
                        return Poll::Ready(());
                    }
                    parked = true;
                    waker_tx.send(cx.waker().clone()).unwrap();
                    Poll::Pending
                })
                .await;

                *n += 1;
                *n
            })
        })?;

        assert_eq!(value, 1);
        assert_eq!(exec.execute(|n| *n + 1)?, 2);
        assert_eq!(exec.shutdown()?, 1);
        waker_thread.join().unwrap();

        Ok(())
    }

    #[test]
    fn dropping_completion_detaches() -> Result<()> {
        let exec = SerialExecutor::new(0)?;

        drop(exec.submit(|n| *n += 5)?);

        assert_eq!(exec.shutdown()?, 5);

        Ok(())
    }

    #[test]
    fn wait_timeout_on_slow_task() -> Result<()> {
        let exec = SerialExecutor::new(())?;
        let (unblock_tx, unblock_rx) = channel::<()>();

        let slow = exec.submit(move |_| {
            unblock_rx.recv().unwrap();
            7
        })?;

        assert!(slow.wait_timeout(Duration::from_millis(20)).is_none());
        assert!(slow.try_wait().is_none());

        unblock_tx.send(())?;

        assert_eq!(slow.wait_timeout(Duration::from_secs(5)).unwrap()?, 7);

        Ok(())
    }

    #[test]
    fn cancelled_task_is_skipped() -> Result<()> {
        let exec = SerialExecutor::new(Vec::new())?;
        let (unblock_tx, unblock_rx) = channel::<()>();

        let running = exec.submit(move |log| {
            unblock_rx.recv().unwrap();
            log.push("first");
        })?;
        let queued = exec.submit(|log| log.push("cancelled"))?;
        let last = exec.submit(|log| log.push("last"))?;

        assert!(queued.cancel());
        assert!(!queued.cancel());
        unblock_tx.send(())?;

        running.wait()?;
        last.wait()?;
        assert!(matches!(queued.wait(), Err(Error::Cancelled)));
        assert_eq!(exec.shutdown()?, vec!["first", "last"]);

        Ok(())
    }

    #[test]
    fn drop_joins_worker() -> Result<()> {
        let ran = Arc::new(AtomicUsize::new(0));

        {
            let exec = SerialExecutor::builder().name("drop-test").spawn(())?;

            for _ in 0..10 {
                let ran = ran.clone();
                exec.submit(move |_| {
                    thread::sleep(Duration::from_millis(1));
                    ran.fetch_add(1, Ordering::SeqCst);
                })?;
            }
        }

        assert_eq!(ran.load(Ordering::SeqCst), 10);

        Ok(())
    }

    #[test]
    fn worker_thread_is_named() -> Result<()> {
        let exec = SerialExecutor::builder()
            .name("counter")
            .ring_entries(8)
            .spawn(())?;

        let name = exec.execute(|_| thread::current().name().map(str::to_string))?;
        assert_eq!(name.as_deref(), Some("counter"));

        Ok(())
    }
}
