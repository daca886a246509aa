//! Synchronous event dispatcher.
//!
//! # Responsibilities
//! - Keep an ordered listener list per topic
//! - Deliver a payload to every listener of its topic, in order
//! - Abort delivery on the first listener error
//!
//! # Design Decisions
//! - Registry lives in an `ArcSwap`; subscribe is read-copy-update,
//!   dispatch works on a snapshot and never blocks a concurrent subscribe
//! - Listeners may subscribe from inside a dispatch (they see the change on
//!   the next dispatch)

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::events::topic::Topic;
use crate::BoxError;

type Listener = Arc<dyn Fn(&dyn Any) -> Result<(), BoxError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TopicKey {
    name: &'static str,
    payload: TypeId,
}

impl TopicKey {
    fn of<P: 'static>(topic: Topic<P>) -> Self {
        Self {
            name: topic.name(),
            payload: TypeId::of::<P>(),
        }
    }
}

/// Error returned when a listener rejects an event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A listener returned an error; later listeners were not invoked.
    #[error("listener #{position} for topic `{topic}` failed: {source}")]
    Listener {
        topic: &'static str,
        position: usize,
        #[source]
        source: BoxError,
    },
}

/// Publish/subscribe bus shared by the whole process.
#[derive(Default)]
pub struct Dispatcher {
    registry: ArcSwap<HashMap<TopicKey, Vec<Listener>>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `topic`.
    pub fn subscribe<P, F>(&self, topic: Topic<P>, listener: F)
    where
        P: 'static,
        F: Fn(&P) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let key = TopicKey::of(topic);
        let erased: Listener = Arc::new(move |payload: &dyn Any| match payload.downcast_ref::<P>() {
            Some(payload) => listener(payload),
            None => Ok(()),
        });

        self.registry.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.entry(key).or_default().push(Arc::clone(&erased));
            next
        });

        tracing::debug!(topic = topic.name(), "Listener subscribed");
    }

    /// Deliver `payload` to every listener of `topic`, in subscription order.
    ///
    /// Returns the first listener error; listeners after it are skipped.
    pub fn dispatch<P: 'static>(&self, topic: Topic<P>, payload: &P) -> Result<(), DispatchError> {
        let registry = self.registry.load_full();
        let Some(listeners) = registry.get(&TopicKey::of(topic)) else {
            return Ok(());
        };

        for (position, listener) in listeners.iter().enumerate() {
            listener(payload).map_err(|source| DispatchError::Listener {
                topic: topic.name(),
                position,
                source,
            })?;
        }
        Ok(())
    }

    /// Number of listeners currently subscribed to `topic`.
    pub fn listener_count<P: 'static>(&self, topic: Topic<P>) -> usize {
        self.registry
            .load()
            .get(&TopicKey::of(topic))
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("topics", &self.registry.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const GREETING: Topic<String> = Topic::new("greeting");
    const COUNT: Topic<u32> = Topic::new("greeting");

    #[test]
    fn dispatch_without_listeners_is_noop() {
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.dispatch(GREETING, &"hi".to_string()).is_ok());
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let seen = seen.clone();
            dispatcher.subscribe(GREETING, move |msg: &String| {
                seen.lock().unwrap().push(format!("{id}:{msg}"));
                Ok(())
            });
        }

        dispatcher.dispatch(GREETING, &"hi".to_string()).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["0:hi", "1:hi", "2:hi"]);
    }

    #[test]
    fn first_error_aborts_dispatch() {
        let dispatcher = Dispatcher::new();
        let later = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe(GREETING, |_: &String| Ok(()));
        dispatcher.subscribe(GREETING, |_: &String| Err("nope".into()));
        let l = later.clone();
        dispatcher.subscribe(GREETING, move |_: &String| {
            l.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let err = dispatcher.dispatch(GREETING, &"hi".to_string()).unwrap_err();
        match err {
            DispatchError::Listener { topic, position, .. } => {
                assert_eq!(topic, "greeting");
                assert_eq!(position, 1);
            }
        }
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn same_name_different_payload_are_distinct_topics() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher.subscribe(COUNT, move |n: &u32| {
            h.fetch_add(*n as usize, Ordering::SeqCst);
            Ok(())
        });

        dispatcher.dispatch(GREETING, &"hi".to_string()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        dispatcher.dispatch(COUNT, &5).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(dispatcher.listener_count(GREETING), 0);
        assert_eq!(dispatcher.listener_count(COUNT), 1);
    }

    #[test]
    fn subscribe_and_dispatch_from_many_threads() {
        let dispatcher = Arc::new(Dispatcher::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let hits = hits.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let h = hits.clone();
                        dispatcher.subscribe(COUNT, move |_: &u32| {
                            h.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        });
                        dispatcher.dispatch(COUNT, &1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(dispatcher.listener_count(COUNT), 400);
        assert!(hits.load(Ordering::SeqCst) >= 400);
    }
}
