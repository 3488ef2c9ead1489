//! Dedicated background worker (§4.2).
//!
//! `CodecContext` is `Send` but explicitly not `Sync`: FFmpeg's decoder/encoder
//! state is unsafe to touch from more than one thread at a time, and profiling
//! a lock held across every `avcodec_send_frame`/`receive_packet` round trip
//! would serialize unrelated engines behind one mutex for no reason. Instead
//! each engine gets its own OS thread that owns the codec context exclusively;
//! work arrives as boxed closures over a `crossbeam_channel`, mirroring the
//! job-queue shape `ControlMessageQueue` already uses on the JS-thread side.

use crossbeam::channel::{self, Sender};
use std::thread::JoinHandle;

type Job<W> = Box<dyn FnOnce(&mut W) + Send>;

/// Owns a worker of type `W` (typically a bundle of `CodecContext` + `Scaler`
/// + bookkeeping) on a dedicated thread and accepts jobs to run against it.
pub struct CodecBackend<W: Send + 'static> {
    tx: Option<Sender<Job<W>>>,
    handle: Option<JoinHandle<()>>,
}

impl<W: Send + 'static> CodecBackend<W> {
    pub fn spawn(worker: W) -> Self {
        let (tx, rx) = channel::unbounded::<Job<W>>();
        let handle = std::thread::Builder::new()
            .name("codec-backend".into())
            .spawn(move || {
                let mut worker = worker;
                while let Ok(job) = rx.recv() {
                    job(&mut worker);
                }
            })
            .expect("failed to spawn codec backend thread");

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Enqueue a closure to run against the worker on the backend thread.
    /// Silently dropped if the backend has already shut down.
    pub fn submit(&self, job: Job<W>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(job);
        }
    }
}

impl<W: Send + 'static> Drop for CodecBackend<W> {
    fn drop(&mut self) {
        // Drop the sender first so `rx.recv()` unblocks with an error and the
        // thread exits its loop before we join it.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    struct CounterWorker {
        total: u32,
    }

    #[test]
    fn jobs_run_in_submission_order_on_the_backend_thread() {
        let backend = CodecBackend::spawn(CounterWorker { total: 0 });
        let seen = Arc::new(AtomicU32::new(0));

        for i in 1..=5u32 {
            let seen = Arc::clone(&seen);
            backend.submit(Box::new(move |w: &mut CounterWorker| {
                w.total += i;
                seen.store(w.total, Ordering::SeqCst);
            }));
        }

        // Flush: submit a job that signals completion via oneshot, block on it.
        let (tx, rx) = oneshot::channel();
        backend.submit(Box::new(move |w: &mut CounterWorker| {
            let _ = tx.send(w.total);
        }));
        let total = rx.blocking_recv().unwrap();
        assert_eq!(total, 15);
    }

    #[test]
    fn drop_joins_the_thread_without_deadlock() {
        let backend = CodecBackend::spawn(CounterWorker { total: 0 });
        backend.submit(Box::new(|w: &mut CounterWorker| w.total += 1));
        drop(backend);
    }
}
