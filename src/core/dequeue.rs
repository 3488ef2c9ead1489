//! Schedule Dequeue Event algorithm (§4.3): coalesce any number of queue-size
//! decrements within one turn into a single `dequeue` event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use napi::threadsafe_function::{ThreadsafeFunction, ThreadsafeFunctionCallMode};

/// Per-engine coalescing scheduler plus the `ondequeue` slot. Re-expresses the
/// W3C "polymorphic capability" (`addListener`/`removeListener`/`dispatch`) as a
/// single nullable callback slot, which is all four engines ever need.
pub struct DequeueCoalescer {
    scheduled: AtomicBool,
    listener: Mutex<Option<ThreadsafeFunction<()>>>,
}

impl DequeueCoalescer {
    pub fn new() -> Self {
        Self {
            scheduled: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: Option<ThreadsafeFunction<()>>) {
        *self.listener.lock().unwrap() = listener;
    }

    /// Post a task that dispatches `dequeue` at most once per turn. `is_closed`
    /// is polled right before dispatch so a `close()` that races the scheduled
    /// task suppresses the event, per "no dequeue event fires after close".
    pub fn schedule(self: &Arc<Self>, is_closed: impl Fn() -> bool + Send + 'static) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.scheduled.store(false, Ordering::Release);
            if is_closed() {
                return;
            }
            if let Some(listener) = this.listener.lock().unwrap().as_ref() {
                listener.call(Ok::<(), napi::Error>(()), ThreadsafeFunctionCallMode::NonBlocking);
            }
        });
    }
}

impl Default for DequeueCoalescer {
    fn default() -> Self {
        Self::new()
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
    fn repeated_schedule_within_a_turn_coalesces() {
        rt().block_on(async {
            let coalescer = Arc::new(DequeueCoalescer::new());
            let dispatch_count = Arc::new(AtomicU32::new(0));

            // We can't install a ThreadsafeFunction without a live napi Env in
            // this unit test, so we assert on the coalescing guard directly:
            // five calls in the same turn must only arm the scheduled flag once.
            for _ in 0..5 {
                coalescer.schedule(|| false);
            }
            assert!(coalescer.scheduled.load(Ordering::SeqCst));

            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(!coalescer.scheduled.load(Ordering::SeqCst));
            let _ = dispatch_count; // listener dispatch itself is exercised at the engine level
        });
    }
}
