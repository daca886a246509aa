//! Named, lazily built, shared connections.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::events::{Dispatcher, ReloadEvent, RELOAD};
use crate::factory::error::FactoryError;
use crate::factory::pair::Pair;
use crate::observability::metrics;

type BuildFn<T> = dyn Fn(String) -> BoxFuture<'static, Result<Pair<T>, FactoryError>> + Send + Sync;
type Slot<T> = Arc<OnceCell<Pair<T>>>;

/// Anything that can hand out a connection by name.
///
/// Adapters depend on this rather than on [`Factory`] so tests can swap in
/// a fake.
pub trait Maker<T>: Send + Sync {
    fn make<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<T, FactoryError>>;
}

/// A thread-safe cache of connections keyed by name.
///
/// The first `make(name)` runs the builder; every later call gets a clone
/// of the cached handle. `T` is expected to be a cheap shared handle
/// (an `Arc`, a channel sender, a pooled client).
///
/// Concurrent calls for the same name run the builder at most once at a
/// time; the others wait. A failed build is not cached, so the next call
/// tries again. Different names never block each other.
pub struct Factory<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    kind: &'static str,
    build: Box<BuildFn<T>>,
    entries: DashMap<String, Slot<T>>,
    closed: AtomicBool,
}

impl<T> Clone for Factory<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Factory<T> {
    /// Create a factory. `kind` labels logs and metrics (e.g. `"kafka.writer"`).
    pub fn new<F, Fut>(kind: &'static str, build: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Pair<T>, FactoryError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                kind,
                build: Box::new(move |name| Box::pin(build(name))),
                entries: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Cached connection for `name`, building it on first use.
    pub async fn make(&self, name: &str) -> Result<T, FactoryError> {
        self.inner.make(name).await
    }

    /// Evict every cached entry whenever the dispatcher publishes a reload.
    ///
    /// The listener holds only a weak reference; dropping every clone of the
    /// factory makes it a no-op.
    pub fn subscribe_reload_event_from(&self, dispatcher: &Dispatcher) {
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        dispatcher.subscribe(RELOAD, move |event: &ReloadEvent| {
            if let Some(inner) = weak.upgrade() {
                let evicted = inner.evict_all();
                tracing::info!(
                    factory = inner.kind,
                    origin = %event.origin,
                    evicted,
                    "Factory entries evicted on reload"
                );
            }
            Ok(())
        });
    }

    /// Tear down the entry for `name`, if one is cached.
    ///
    /// Returns whether an entry was removed. A build still in flight for
    /// `name` is left alone.
    pub fn close_conn(&self, name: &str) -> Result<bool, FactoryError> {
        let Some((_, slot)) = self.inner.entries.remove_if(name, |_, slot| slot.initialized()) else {
            return Ok(false);
        };
        metrics::record_factory_eviction(self.inner.kind, "close_conn", 1);
        match slot.get() {
            Some(pair) => pair.closer.close().map(|()| true).map_err(|e| FactoryError::Teardown {
                errors: vec![(name.to_string(), e)],
            }),
            None => Ok(false),
        }
    }

    /// Tear down every entry and refuse further `make` calls.
    ///
    /// Every closer runs exactly once; all teardown failures are collected
    /// into one `Teardown` error. Calling `close` again is a no-op.
    pub fn close(&self) -> Result<(), FactoryError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let slots: Vec<(String, Slot<T>)> = self
            .inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        self.inner.entries.clear();

        let mut errors = Vec::new();
        let mut closed = 0;
        for (name, slot) in slots {
            if let Some(pair) = slot.get() {
                closed += 1;
                if let Err(e) = pair.closer.close() {
                    errors.push((name, e));
                }
            }
        }
        metrics::record_factory_eviction(self.inner.kind, "close", closed);
        tracing::info!(factory = self.inner.kind, closed, failed = errors.len(), "Factory closed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FactoryError::Teardown { errors })
        }
    }

    /// Names with a ready, cached connection.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of ready, cached connections.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn kind(&self) -> &'static str {
        self.inner.kind
    }
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    async fn make(&self, name: &str) -> Result<T, FactoryError> {
        let slot = self.slot(name)?;

        let pair = slot
            .get_or_try_init(|| async {
                tracing::debug!(factory = self.kind, name = %name, "Building connection");
                let result = (self.build)(name.to_string()).await;
                metrics::record_factory_build(self.kind, result.is_ok());
                if let Err(e) = &result {
                    tracing::warn!(factory = self.kind, name = %name, error = %e, "Connection build failed");
                }
                result
            })
            .await?;

        // close() may have drained the map while this build was in flight.
        if self.closed.load(Ordering::SeqCst) {
            if let Err(e) = pair.closer.close() {
                tracing::warn!(factory = self.kind, name = %name, error = %e, "Teardown failed");
            }
            return Err(FactoryError::Closed { kind: self.kind });
        }

        Ok(pair.conn.clone())
    }

    /// The slot for `name`. The map guard is released before returning.
    fn slot(&self, name: &str) -> Result<Slot<T>, FactoryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FactoryError::Closed { kind: self.kind });
        }
        if let Some(slot) = self.entries.get(name) {
            return Ok(Arc::clone(slot.value()));
        }
        let slot = self.entries.entry(name.to_string()).or_default();
        Ok(Arc::clone(slot.value()))
    }

    /// Remove and close every initialized entry. In-flight builds stay.
    fn evict_all(&self) -> usize {
        let mut evicted: Vec<(String, Slot<T>)> = Vec::new();
        self.entries.retain(|name, slot| {
            if slot.initialized() {
                evicted.push((name.clone(), Arc::clone(slot)));
                false
            } else {
                true
            }
        });

        for (name, slot) in &evicted {
            if let Some(pair) = slot.get() {
                if let Err(e) = pair.closer.close() {
                    tracing::warn!(factory = self.kind, name = %name, error = %e, "Teardown failed");
                }
            }
        }
        metrics::record_factory_eviction(self.kind, "reload", evicted.len());
        evicted.len()
    }
}

impl<T: Clone + Send + Sync + 'static> Maker<T> for Factory<T> {
    fn make<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<T, FactoryError>> {
        Box::pin(self.inner.make(name))
    }
}

impl<T> fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("kind", &self.inner.kind)
            .field("entries", &self.inner.entries.len())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}
