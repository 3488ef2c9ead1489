//! Strict-FIFO control-message queue (§4.1).
//!
//! A single pump task drains a `VecDeque` of boxed futures one at a time —
//! "single-threaded cooperative" scheduling, so everything a work item does to
//! engine state is implicitly serialized. `clear()` drops only the
//! *not-yet-started* items; whichever item the pump is currently awaiting keeps
//! running to completion, matching §4.1's contract.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, Notify};

type Work = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Inner {
    queue: Mutex<VecDeque<Work>>,
    notify: Notify,
    running: AtomicBool,
    closed: AtomicBool,
    pending: AtomicUsize,
}

/// A per-engine FIFO of deferred work items, pumped on the napi-hosted tokio
/// runtime. Grounded on the `tokio::sync` dependency already carried by this
/// addon and the `Env::spawn_future` chaining pattern used for promise plumbing.
pub struct ControlMessageQueue {
    inner: Arc<Inner>,
}

impl ControlMessageQueue {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
        });
        tokio::spawn(Self::pump(Arc::clone(&inner)));
        Self { inner }
    }

    /// Enqueue work; returns immediately without running it.
    pub fn enqueue<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.queue.lock().unwrap().push_back(Box::pin(work));
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        self.inner.notify.notify_one();
    }

    /// Remove every item that hasn't started running yet.
    pub fn clear(&self) {
        let mut queue = self.inner.queue.lock().unwrap();
        let removed = queue.len();
        queue.clear();
        self.inner.pending.fetch_sub(removed, Ordering::AcqRel);
    }

    /// Count of pending items, including one currently running.
    pub fn size(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// A future that resolves once everything enqueued up to this call
    /// (inclusive) has finished running.
    pub fn flush(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let (tx, rx) = oneshot::channel::<()>();
        self.enqueue(async move {
            let _ = tx.send(());
        });
        Box::pin(async move {
            let _ = rx.await;
        })
    }

    async fn pump(inner: Arc<Inner>) {
        loop {
            let next = inner.queue.lock().unwrap().pop_front();
            match next {
                Some(work) => {
                    inner.running.store(true, Ordering::Release);
                    work.await;
                    inner.running.store(false, Ordering::Release);
                    inner.pending.fetch_sub(1, Ordering::AcqRel);
                }
                None => {
                    if inner.closed.load(Ordering::Acquire) {
                        return;
                    }
                    inner.notify.notified().await;
                    if inner.closed.load(Ordering::Acquire)
                        && inner.queue.lock().unwrap().is_empty()
                    {
                        return;
                    }
                }
            }
        }
    }
}

impl Default for ControlMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ControlMessageQueue {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn flush_waits_for_prior_enqueued_items_in_order() {
        rt().block_on(async {
            let queue = ControlMessageQueue::new();
            let order = Arc::new(Mutex::new(Vec::new()));

            for i in 0..5u32 {
                let order = Arc::clone(&order);
                queue.enqueue(async move {
                    order.lock().unwrap().push(i);
                });
            }

            queue.flush().await;
            assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
            assert_eq!(queue.size(), 0);
        });
    }

    #[test]
    fn clear_drops_not_yet_started_items() {
        rt().block_on(async {
            let queue = ControlMessageQueue::new();
            let ran = Arc::new(AtomicU32::new(0));

            // First item blocks briefly so the rest are still queued when we clear.
            queue.enqueue(async { tokio::time::sleep(Duration::from_millis(20)).await });
            for _ in 0..3 {
                let ran = Arc::clone(&ran);
                queue.enqueue(async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                });
            }

            // Give the pump a moment to start the first (sleeping) item.
            tokio::time::sleep(Duration::from_millis(5)).await;
            queue.clear();
            queue.flush().await;

            assert_eq!(ran.load(Ordering::SeqCst), 0);
        });
    }
}
