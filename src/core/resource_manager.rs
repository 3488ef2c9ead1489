//! Process-wide resource reclaimer (§4.9).
//!
//! A single registry of every open codec engine. `reclaim_inactive` closes any
//! engine that has made no backend progress within the configured inactivity
//! timeout, delivering `QuotaExceededError` first. Reachable only through an
//! explicit handle (`ResourceManager::global()` or a test-owned instance via
//! `ResourceManager::new`) — never an ambient global baked into engine code.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

/// What the manager needs from a codec engine to decide whether it is
/// reclaimable and to actually reclaim it.
pub trait Reclaimable: Send + Sync {
    fn last_activity_instant(&self) -> Instant;
    fn is_foreground(&self) -> bool;
    /// Invoke the engine's error callback with `QuotaExceededError`, then run
    /// the engine's Close algorithm.
    fn reclaim(&self);
}

struct Entry {
    id: u64,
    engine: Weak<dyn Reclaimable>,
}

pub struct ResourceManager {
    inactivity_timeout: Mutex<Duration>,
    engines: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

impl ResourceManager {
    pub fn new(inactivity_timeout: Duration) -> Self {
        Self {
            inactivity_timeout: Mutex::new(inactivity_timeout),
            engines: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide singleton, default 10s inactivity timeout.
    pub fn global() -> &'static ResourceManager {
        static INSTANCE: OnceLock<ResourceManager> = OnceLock::new();
        INSTANCE.get_or_init(|| ResourceManager::new(DEFAULT_INACTIVITY_TIMEOUT))
    }

    pub fn set_inactivity_timeout(&self, timeout: Duration) {
        *self.inactivity_timeout.lock().unwrap() = timeout;
    }

    pub fn inactivity_timeout(&self) -> Duration {
        *self.inactivity_timeout.lock().unwrap()
    }

    /// Register an engine; returns a handle used to `unregister` it on close.
    pub fn register(&self, engine: Weak<dyn Reclaimable>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.engines.lock().unwrap().push(Entry { id, engine });
        id
    }

    pub fn unregister(&self, id: u64) {
        self.engines.lock().unwrap().retain(|e| e.id != id);
    }

    /// Close every engine that is either inactive past the timeout or not in
    /// the foreground, delivering `QuotaExceededError` first (§4.9: the
    /// manager must not reclaim an engine that is both active and
    /// foreground, but may reclaim any other). Returns how many were
    /// reclaimed. Engines whose `Weak` no longer upgrades (already dropped)
    /// are pruned without counting as reclaimed.
    pub fn reclaim_inactive(&self) -> usize {
        let timeout = self.inactivity_timeout();
        let now = Instant::now();
        let mut engines = self.engines.lock().unwrap();
        let mut reclaimed = 0usize;

        engines.retain(|entry| match entry.engine.upgrade() {
            Some(engine) => {
                let inactive = now.duration_since(engine.last_activity_instant()) > timeout;
                let reclaimable = inactive || !engine.is_foreground();
                if reclaimable {
                    tracing::warn!(engine_id = entry.id, "reclaiming inactive codec engine");
                    engine.reclaim();
                    reclaimed += 1;
                    false
                } else {
                    true
                }
            }
            None => false,
        });

        reclaimed
    }

    pub fn len(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::thread::sleep;

    struct MockEngine {
        last_activity: Mutex<Instant>,
        foreground: AtomicBool,
        reclaimed: AtomicBool,
        closed: AtomicBool,
    }

    impl Reclaimable for MockEngine {
        fn last_activity_instant(&self) -> Instant {
            *self.last_activity.lock().unwrap()
        }
        fn is_foreground(&self) -> bool {
            self.foreground.load(AtomicOrdering::SeqCst)
        }
        fn reclaim(&self) {
            self.reclaimed.store(true, AtomicOrdering::SeqCst);
            self.closed.store(true, AtomicOrdering::SeqCst);
        }
    }

    #[test]
    fn reclaims_engines_past_the_inactivity_timeout() {
        let manager = ResourceManager::new(Duration::from_millis(5));
        let mock = Arc::new(MockEngine {
            last_activity: Mutex::new(Instant::now()),
            foreground: AtomicBool::new(false),
            reclaimed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let weak: Weak<dyn Reclaimable> = Arc::downgrade(&(mock.clone() as Arc<dyn Reclaimable>));
        manager.register(weak);

        sleep(Duration::from_millis(10));

        let count = manager.reclaim_inactive();
        assert_eq!(count, 1);
        assert!(mock.reclaimed.load(AtomicOrdering::SeqCst));
        assert!(mock.closed.load(AtomicOrdering::SeqCst));
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn active_engine_is_not_reclaimed() {
        let manager = ResourceManager::new(Duration::from_secs(10));
        let mock = Arc::new(MockEngine {
            last_activity: Mutex::new(Instant::now()),
            foreground: AtomicBool::new(true),
            reclaimed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let weak: Weak<dyn Reclaimable> = Arc::downgrade(&(mock.clone() as Arc<dyn Reclaimable>));
        manager.register(weak);

        assert_eq!(manager.reclaim_inactive(), 0);
        assert!(!mock.reclaimed.load(AtomicOrdering::SeqCst));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn active_backgrounded_engine_is_reclaimed() {
        let manager = ResourceManager::new(Duration::from_secs(10));
        let mock = Arc::new(MockEngine {
            last_activity: Mutex::new(Instant::now()),
            foreground: AtomicBool::new(false),
            reclaimed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let weak: Weak<dyn Reclaimable> = Arc::downgrade(&(mock.clone() as Arc<dyn Reclaimable>));
        manager.register(weak);

        assert_eq!(manager.reclaim_inactive(), 1);
        assert!(mock.reclaimed.load(AtomicOrdering::SeqCst));
        assert_eq!(manager.len(), 0);
    }
}
