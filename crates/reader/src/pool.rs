//! Bounded pool of parser engines
//!
//! At most `capacity` engines exist at any time. `borrow` hands out an idle
//! engine, creates one while below capacity, and otherwise blocks until an
//! engine comes back. Engines come back when their `PooledEngine` guard drops,
//! on every path including panics.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::engine::ParserEngine;

pub const DEFAULT_POOL_CAPACITY: usize = 5;

/// Creates engines on demand
pub type EngineFactory<E> = Box<dyn Fn() -> E + Send + Sync>;

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    /// Engines created so far and not dropped
    pub live: usize,
    pub idle: usize,
    pub active: usize,
}

struct PoolState<E> {
    idle: Vec<E>,
    live: usize,
}

pub struct ReaderPool<E: ParserEngine> {
    state: Mutex<PoolState<E>>,
    returned: Condvar,
    capacity: usize,
    factory: EngineFactory<E>,
}

impl<E: ParserEngine> std::fmt::Debug for ReaderPool<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderPool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl<E: ParserEngine> ReaderPool<E> {
    pub fn new(factory: impl Fn() -> E + Send + Sync + 'static) -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY, factory)
    }

    /// Pool of at most `capacity` engines; a capacity of 0 is raised to 1
    pub fn with_capacity(capacity: usize, factory: impl Fn() -> E + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(capacity),
                live: 0,
            }),
            returned: Condvar::new(),
            capacity: capacity.max(1),
            factory: Box::new(factory),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // The state is consistent after every critical section, so a panic in
    // another borrower cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, PoolState<E>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take an engine, blocking while `capacity` engines are in use
    pub fn borrow(&self) -> PooledEngine<'_, E> {
        let mut state = self.lock();
        loop {
            if let Some(engine) = state.idle.pop() {
                return PooledEngine::new(self, engine);
            }
            if state.live < self.capacity {
                state.live += 1;
                let live = state.live;
                drop(state);
                tracing::debug!("Creating parser engine {}/{}", live, self.capacity);
                return self.create();
            }
            state = self
                .returned
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Take an engine only if one is available without blocking
    pub fn try_borrow(&self) -> Option<PooledEngine<'_, E>> {
        let mut state = self.lock();
        if let Some(engine) = state.idle.pop() {
            return Some(PooledEngine::new(self, engine));
        }
        if state.live < self.capacity {
            state.live += 1;
            drop(state);
            return Some(self.create());
        }
        None
    }

    /// Build an engine for a slot already counted in `live`
    fn create(&self) -> PooledEngine<'_, E> {
        let reservation = SlotReservation { pool: self };
        let engine = (self.factory)();
        std::mem::forget(reservation);
        PooledEngine::new(self, engine)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            capacity: self.capacity,
            live: state.live,
            idle: state.idle.len(),
            active: state.live - state.idle.len(),
        }
    }

    fn give_back(&self, mut engine: E) {
        engine.reset();
        self.lock().idle.push(engine);
        self.returned.notify_one();
    }

    /// An engine that panicked mid-parse is not trusted again
    fn discard(&self) {
        let mut state = self.lock();
        state.live = state.live.saturating_sub(1);
        drop(state);
        self.returned.notify_one();
    }
}

/// Gives a reserved slot back if the factory panics
struct SlotReservation<'p, E: ParserEngine> {
    pool: &'p ReaderPool<E>,
}

impl<E: ParserEngine> Drop for SlotReservation<'_, E> {
    fn drop(&mut self) {
        tracing::warn!("Parser engine factory panicked");
        self.pool.discard();
    }
}

/// Borrowed engine; returns to its pool on drop
pub struct PooledEngine<'p, E: ParserEngine> {
    pool: &'p ReaderPool<E>,
    engine: Option<E>,
}

impl<'p, E: ParserEngine> PooledEngine<'p, E> {
    fn new(pool: &'p ReaderPool<E>, engine: E) -> Self {
        Self {
            pool,
            engine: Some(engine),
        }
    }
}

impl<E: ParserEngine> Deref for PooledEngine<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        match &self.engine {
            Some(engine) => engine,
            None => unreachable!("engine is only taken on drop"),
        }
    }
}

impl<E: ParserEngine> DerefMut for PooledEngine<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        match &mut self.engine {
            Some(engine) => engine,
            None => unreachable!("engine is only taken on drop"),
        }
    }
}

impl<E: ParserEngine> Drop for PooledEngine<'_, E> {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        if std::thread::panicking() {
            drop(engine);
            self.pool.discard();
        } else {
            self.pool.give_back(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ContentHandler;
    use crate::error::Result;
    use crate::handlers::{EntityResolver, ErrorHandler};
    use crate::input::ResolvedInput;
    use crate::settings::EngineConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct CountingEngine {
        config: EngineConfig,
        resets: usize,
        bound: bool,
    }

    impl ParserEngine for CountingEngine {
        fn config(&self) -> &EngineConfig {
            &self.config
        }

        fn bind(
            &mut self,
            _entity_resolver: Option<Arc<dyn EntityResolver>>,
            _error_handler: Option<Arc<dyn ErrorHandler>>,
        ) {
            self.bound = true;
        }

        fn parse(&mut self, _input: &ResolvedInput, _handler: &mut dyn ContentHandler) -> Result<()> {
            Ok(())
        }

        fn reset(&mut self) {
            self.bound = false;
            self.resets += 1;
        }
    }

    #[test]
    fn test_engines_are_reused_and_reset() {
        let pool = ReaderPool::with_capacity(2, CountingEngine::default);
        {
            let mut engine = pool.borrow();
            engine.bind(None, None);
            assert!(engine.bound);
        }
        assert_eq!(
            pool.stats(),
            PoolStats {
                capacity: 2,
                live: 1,
                idle: 1,
                active: 0
            }
        );

        let engine = pool.borrow();
        assert_eq!(engine.resets, 1);
        assert!(!engine.bound);
        assert_eq!(pool.stats().active, 1);
    }

    #[test]
    fn test_try_borrow_at_capacity() {
        let pool = ReaderPool::with_capacity(1, CountingEngine::default);
        let held = pool.borrow();
        assert!(pool.try_borrow().is_none());
        drop(held);
        assert!(pool.try_borrow().is_some());
    }

    #[test]
    fn test_concurrent_borrowers_never_exceed_capacity() {
        let capacity = 5;
        let pool = Arc::new(ReaderPool::with_capacity(capacity, CountingEngine::default));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let _engine = pool.borrow();
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(max_active.load(Ordering::SeqCst) <= capacity);
        let stats = pool.stats();
        assert!(stats.live <= capacity);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, stats.live);
    }

    #[test]
    fn test_panicking_borrower_releases_capacity() {
        let pool = Arc::new(ReaderPool::with_capacity(1, CountingEngine::default));
        let worker = Arc::clone(&pool);
        let result = thread::spawn(move || {
            let _engine = worker.borrow();
            panic!("parse blew up");
        })
        .join();
        assert!(result.is_err());

        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.active, 0);
        let _engine = pool.borrow();
    }

    #[test]
    fn test_failed_engine_creation_releases_slot() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let pool = Arc::new(ReaderPool::with_capacity(1, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("engine construction failed");
            }
            CountingEngine::default()
        }));

        let worker = Arc::clone(&pool);
        let result = thread::spawn(move || {
            let _engine = worker.borrow();
        })
        .join();
        assert!(result.is_err());
        assert_eq!(pool.stats().live, 0);

        let engine = pool.try_borrow();
        assert!(engine.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
