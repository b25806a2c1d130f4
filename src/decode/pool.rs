//! Fixed-size pool of decode worker threads.
//!
//! Each worker is an OS thread with its own channel. A submitted task goes
//! straight to an idle worker when there is one, otherwise it waits in a FIFO
//! queue. A worker that finishes takes the oldest waiting task itself, so a
//! queued task never passes through the idle list. The idle list and queue
//! share one lock.
//!
//! Results come back through a oneshot channel. Dropping the
//! [`DecodeHandle`] abandons the task: if it is still queued it is skipped,
//! if it is running its result is discarded.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::codec::{BlockDecoder, DecodeTask, StandardDecoder};
use crate::error::DecodeError;

type Reply = oneshot::Sender<Result<Vec<u8>, DecodeError>>;

struct Job {
    task: DecodeTask,
    reply: Reply,
}

enum Message {
    Run(Job),
    Shutdown,
}

#[derive(Default)]
struct State {
    idle: Vec<usize>,
    queue: VecDeque<Job>,
    closed: bool,
}

struct Shared {
    state: Mutex<State>,
    active: AtomicUsize,
    decoder: Arc<dyn BlockDecoder>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Number of workers used when none is configured.
pub fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// Pending result of a submitted task.
pub struct DecodeHandle {
    rx: oneshot::Receiver<Result<Vec<u8>, DecodeError>>,
}

impl DecodeHandle {
    /// Wait for the decoded bytes. Fails with `PoolClosed` if the pool shut
    /// down first.
    pub async fn wait(self) -> Result<Vec<u8>, DecodeError> {
        self.rx.await.map_err(|_| DecodeError::PoolClosed)?
    }
}

/// Fixed-size decode worker pool.
pub struct DecodePool {
    shared: Arc<Shared>,
    workers: Vec<mpsc::Sender<Message>>,
}

impl std::fmt::Debug for DecodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePool")
            .field("size", &self.workers.len())
            .field("active", &self.active_workers())
            .finish()
    }
}

impl DecodePool {
    /// Pool with `size` workers (at least one) running the standard codecs.
    pub fn new(size: usize) -> Result<Self, DecodeError> {
        Self::with_decoder(size, Arc::new(StandardDecoder))
    }

    /// Pool sized to the machine's available parallelism, 4 if unknown.
    pub fn with_default_size() -> Result<Self, DecodeError> {
        Self::new(default_pool_size())
    }

    pub fn with_decoder(size: usize, decoder: Arc<dyn BlockDecoder>) -> Result<Self, DecodeError> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                idle: (0..size).rev().collect(),
                ..State::default()
            }),
            active: AtomicUsize::new(0),
            decoder,
        });

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let (tx, rx) = mpsc::channel();
            let worker_shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("ome-decode-{}", id))
                .spawn(move || worker_loop(id, rx, worker_shared))
                .map_err(|e| DecodeError::WorkerSpawn(e.to_string()))?;
            workers.push(tx);
        }
        debug!(size, "decode pool started");

        Ok(Self { shared, workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Workers currently running a task.
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a worker.
    pub fn queued_tasks(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Hand `task` to an idle worker or queue it. The task is accepted (or
    /// rejected) before this returns. Fails with `WorkerExited` when the
    /// chosen idle worker's thread is gone.
    pub fn submit(&self, task: DecodeTask) -> Result<DecodeHandle, DecodeError> {
        let (reply, rx) = oneshot::channel();
        let job = Job { task, reply };

        let mut state = self.shared.lock();
        if state.closed {
            return Err(DecodeError::PoolClosed);
        }
        match state.idle.pop() {
            Some(worker) => {
                // A worker whose channel is closed is not returned to the idle list
                if self.workers[worker].send(Message::Run(job)).is_err() {
                    warn!(worker, "decode worker has exited");
                    return Err(DecodeError::WorkerExited { worker });
                }
            }
            None => {
                trace!(queued = state.queue.len() + 1, "all decode workers busy");
                state.queue.push_back(job);
            }
        }
        Ok(DecodeHandle { rx })
    }

    /// Submit `task` and wait for its result.
    pub async fn decode(&self, task: DecodeTask) -> Result<Vec<u8>, DecodeError> {
        self.submit(task)?.wait().await
    }

    /// Stop accepting work and tell every worker to exit. Queued tasks fail
    /// with `PoolClosed`; running tasks have their results discarded, which
    /// their callers also see as `PoolClosed`.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.queue)
        };
        debug!(dropped = dropped.len(), "decode pool shutting down");
        drop(dropped);

        for worker in &self.workers {
            let _ = worker.send(Message::Shutdown);
        }
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, rx: mpsc::Receiver<Message>, shared: Arc<Shared>) {
    while let Ok(Message::Run(first)) = rx.recv() {
        let mut next = Some(first);
        while let Some(job) = next.take() {
            run_job(job, &shared);

            let mut state = shared.lock();
            if state.closed {
                return;
            }
            next = pop_live(&mut state.queue);
            if next.is_none() {
                state.idle.push(id);
            }
        }
    }
}

/// Oldest queued job whose caller is still waiting.
fn pop_live(queue: &mut VecDeque<Job>) -> Option<Job> {
    while let Some(job) = queue.pop_front() {
        if !job.reply.is_closed() {
            return Some(job);
        }
    }
    None
}

fn run_job(job: Job, shared: &Shared) {
    let Job { task, reply } = job;
    if reply.is_closed() {
        return;
    }

    shared.active.fetch_add(1, Ordering::SeqCst);
    let result = catch_unwind(AssertUnwindSafe(|| shared.decoder.decode(task))).unwrap_or_else(
        |_| {
            Err(DecodeError::Corrupt {
                codec: "worker",
                message: "decoder panicked".to_string(),
            })
        },
    );
    shared.active.fetch_sub(1, Ordering::SeqCst);

    if shared.lock().closed {
        return;
    }
    let _ = reply.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::codec::Codec;
    use bytes::Bytes;
    use std::time::Duration;

    /// Records start order and peak concurrency, sleeping in each task.
    struct SlowDecoder {
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<u8>>,
    }

    impl SlowDecoder {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::from_millis(delay_ms),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: Mutex::new(Vec::new()),
            })
        }
    }

    impl BlockDecoder for SlowDecoder {
        fn decode(&self, task: DecodeTask) -> Result<Vec<u8>, DecodeError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(task.payload[0]);
            thread::sleep(self.delay);
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(task.payload.to_vec())
        }
    }

    fn task(id: u8) -> DecodeTask {
        DecodeTask::new(Codec::None, Bytes::from(vec![id]))
    }

    #[tokio::test]
    async fn test_decode_roundtrip() {
        let pool = DecodePool::new(2).unwrap();
        assert_eq!(pool.size(), 2);
        let out = pool
            .decode(DecodeTask::new(Codec::None, Bytes::from_static(b"abc")))
            .await
            .unwrap();
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_pool_size() {
        let decoder = SlowDecoder::new(30);
        let pool = DecodePool::with_decoder(3, decoder.clone()).unwrap();

        let handles: Vec<_> = (0..9).map(|i| pool.submit(task(i)).unwrap()).collect();
        assert_eq!(pool.queued_tasks(), 6);
        for handle in handles {
            handle.wait().await.unwrap();
        }

        assert_eq!(decoder.peak.load(Ordering::SeqCst), 3);
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let decoder = SlowDecoder::new(5);
        let pool = DecodePool::with_decoder(1, decoder.clone()).unwrap();

        let handles: Vec<_> = (0..6).map(|i| pool.submit(task(i)).unwrap()).collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.wait().await.unwrap()[0]);
        }

        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(*decoder.started.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_abandoned_tasks_are_skipped() {
        let decoder = SlowDecoder::new(30);
        let pool = DecodePool::with_decoder(1, decoder.clone()).unwrap();

        let first = pool.submit(task(0)).unwrap();
        let abandoned = pool.submit(task(1)).unwrap();
        let last = pool.submit(task(2)).unwrap();
        drop(abandoned);

        first.wait().await.unwrap();
        last.wait().await.unwrap();
        assert_eq!(*decoder.started.lock().unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_tasks() {
        let decoder = SlowDecoder::new(50);
        let pool = DecodePool::with_decoder(1, decoder).unwrap();

        let running = pool.submit(task(0)).unwrap();
        let queued = pool.submit(task(1)).unwrap();
        pool.shutdown();

        assert!(matches!(queued.wait().await, Err(DecodeError::PoolClosed)));
        assert!(matches!(running.wait().await, Err(DecodeError::PoolClosed)));
        assert!(matches!(pool.submit(task(2)), Err(DecodeError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_submit_to_exited_worker_is_rejected() {
        let pool = DecodePool::new(1).unwrap();
        // Stop the worker thread without closing the pool
        let mut attempts = 0;
        while pool.workers[0].send(Message::Shutdown).is_ok() {
            attempts += 1;
            assert!(attempts < 5000, "worker thread did not exit");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(matches!(
            pool.submit(task(1)),
            Err(DecodeError::WorkerExited { worker: 0 })
        ));
        assert_eq!(pool.queued_tasks(), 0);
    }

    #[tokio::test]
    async fn test_decode_errors_reach_only_their_caller() {
        let pool = DecodePool::new(1).unwrap();
        let bad = pool.submit(DecodeTask::new(Codec::Zstd, Bytes::from_static(b"nope")));
        let good = pool.submit(task(7));

        assert!(bad.unwrap().wait().await.is_err());
        assert_eq!(good.unwrap().wait().await.unwrap(), vec![7]);
    }
}
