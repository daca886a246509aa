//! Factory caching, eviction and teardown under concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bootkit::config::{self, Config, ConfigAccessor};
use bootkit::events::Dispatcher;
use bootkit::factory::{self, Closer, Factory, FactoryError, Pair};
use futures_util::future::join_all;
use serde::Deserialize;
use tokio::sync::Notify;

#[derive(Debug, Deserialize)]
struct WriterConfig {
    brokers: Vec<String>,
}

#[derive(Debug)]
struct Writer {
    brokers: Vec<String>,
}

/// A factory whose builds and teardowns are counted.
fn counted(builds: Arc<AtomicUsize>, closes: Arc<AtomicUsize>) -> Factory<Arc<String>> {
    Factory::new("counted", move |name: String| {
        let builds = builds.clone();
        let closes = closes.clone();
        async move {
            builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let closer = Closer::new(move || {
                closes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(Pair::new(Arc::new(name), closer))
        }
    })
}

#[tokio::test]
async fn concurrent_callers_share_one_build() {
    let builds = Arc::new(AtomicUsize::new(0));
    let factory = counted(builds.clone(), Arc::new(AtomicUsize::new(0)));

    let calls = (0..32).map(|_| {
        let factory = factory.clone();
        tokio::spawn(async move { factory.make("default").await })
    });
    let handles: Vec<Arc<String>> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    assert_eq!(factory.names(), vec!["default"]);
}

#[tokio::test]
async fn slow_name_does_not_block_others() {
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let factory: Factory<String> = Factory::new("gated", move |name: String| {
        let gate = gate.clone();
        async move {
            if name == "slow" {
                gate.notified().await;
            }
            Ok(Pair::without_closer(name))
        }
    });

    let slow = {
        let factory = factory.clone();
        tokio::spawn(async move { factory.make("slow").await })
    };
    tokio::task::yield_now().await;

    let fast = tokio::time::timeout(Duration::from_secs(1), factory.make("fast"))
        .await
        .expect("fast name blocked by slow build")
        .unwrap();
    assert_eq!(fast, "fast");
    assert!(!slow.is_finished());

    release.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), "slow");
}

#[tokio::test]
async fn failures_are_not_cached() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let factory: Factory<u32> = Factory::new("flaky", move |name: String| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FactoryError::construction(name, "connection refused"))
            } else {
                Ok(Pair::without_closer(7))
            }
        }
    });

    let err = factory.make("default").await.unwrap_err();
    assert!(matches!(err, FactoryError::ConstructionFailed { .. }));
    assert!(factory.is_empty());

    assert_eq!(factory.make("default").await.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn repeated_failures_retry_every_time() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let factory: Factory<u32> = Factory::new("down", move |name: String| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FactoryError::construction(name, "connection refused"))
        }
    });

    for expected in 1..=3 {
        let err = factory.make("default").await.unwrap_err();
        assert!(matches!(err, FactoryError::ConstructionFailed { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), expected);
        assert!(factory.is_empty());
    }
}

#[tokio::test]
async fn concurrent_callers_all_see_failure() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let factory: Factory<u32> = Factory::new("down", move |name: String| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(FactoryError::construction(name, "connection refused"))
        }
    });

    const CALLERS: usize = 8;
    let calls = (0..CALLERS).map(|_| {
        let factory = factory.clone();
        tokio::spawn(async move { factory.make("default").await })
    });
    for joined in join_all(calls).await {
        let err = joined.unwrap().unwrap_err();
        assert!(matches!(err, FactoryError::ConstructionFailed { .. }));
    }

    assert_eq!(attempts.load(Ordering::SeqCst), CALLERS);
    assert!(factory.is_empty());

    assert!(factory.make("default").await.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), CALLERS + 1);
}

#[tokio::test]
async fn reload_evicts_and_tears_down() {
    let config = Config::from_toml_str("[app]\nname = \"reload\"\n").unwrap();
    let dispatcher = Dispatcher::new();
    let builds = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let factory = counted(builds.clone(), closes.clone());
    factory.subscribe_reload_event_from(&dispatcher);

    let before = factory.make("default").await.unwrap();
    config::reload_and_notify(&config, &dispatcher, "test").unwrap();

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(factory.is_empty());

    let after = factory.make("default").await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reload_leaves_in_flight_build_alone() {
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let factory: Factory<usize> = Factory::new("gated", move |_name: String| {
        let gate = gate.clone();
        let counter = counter.clone();
        async move {
            gate.notified().await;
            Ok(Pair::without_closer(counter.fetch_add(1, Ordering::SeqCst)))
        }
    });
    let dispatcher = Dispatcher::new();
    factory.subscribe_reload_event_from(&dispatcher);

    let pending = {
        let factory = factory.clone();
        tokio::spawn(async move { factory.make("default").await })
    };
    tokio::task::yield_now().await;

    dispatcher
        .dispatch(bootkit::events::RELOAD, &bootkit::events::ReloadEvent::new("test"))
        .unwrap();
    release.notify_one();

    assert_eq!(pending.await.unwrap().unwrap(), 0);
    assert_eq!(factory.make("default").await.unwrap(), 0);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_close_tears_down_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    let factory = counted(Arc::new(AtomicUsize::new(0)), closes.clone());
    factory.make("a").await.unwrap();
    factory.make("b").await.unwrap();

    let closing = (0..8).map(|_| {
        let factory = factory.clone();
        tokio::spawn(async move { factory.close() })
    });
    for joined in join_all(closing).await {
        joined.unwrap().unwrap();
    }

    assert_eq!(closes.load(Ordering::SeqCst), 2);
    assert!(factory.is_closed());
    assert!(matches!(
        factory.make("a").await,
        Err(FactoryError::Closed { kind: "counted" })
    ));
}

#[tokio::test]
async fn teardown_errors_are_collected() {
    let factory: Factory<u8> = Factory::new("broken", |name: String| async move {
        let closer = Closer::new(move || Err(format!("{name} stuck").into()));
        Ok(Pair::new(1, closer))
    });
    factory.make("x").await.unwrap();
    factory.make("y").await.unwrap();

    match factory.close() {
        Err(FactoryError::Teardown { errors }) => {
            let mut names: Vec<_> = errors.iter().map(|(name, _)| name.as_str()).collect();
            names.sort();
            assert_eq!(names, vec!["x", "y"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn close_conn_only_touches_one_name() {
    let closes = Arc::new(AtomicUsize::new(0));
    let factory = counted(Arc::new(AtomicUsize::new(0)), closes.clone());
    factory.make("a").await.unwrap();
    factory.make("b").await.unwrap();

    assert!(factory.close_conn("a").unwrap());
    assert!(!factory.close_conn("a").unwrap());
    assert_eq!(factory.names(), vec!["b"]);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn writer_becomes_usable_once_configured() {
    let config = Arc::new(Config::empty());
    let conf: Arc<dyn ConfigAccessor> = config.clone();
    let writers: Factory<Arc<Writer>> = Factory::new("kafka.writer", move |name: String| {
        let conf = conf.clone();
        async move {
            let settings: WriterConfig = factory::named_config(conf.as_ref(), "kafka.writer", &name)?;
            Ok(Pair::without_closer(Arc::new(Writer {
                brokers: settings.brokers,
            })))
        }
    });

    match writers.make("default").await {
        Err(FactoryError::ConfigInvalid { name, path, .. }) => {
            assert_eq!(name, "default");
            assert_eq!(path, "kafka.writer.default");
        }
        other => panic!("unexpected: {other:?}"),
    }

    config
        .set("kafka.writer.default.brokers", vec!["127.0.0.1:9092"])
        .unwrap();
    let writer = writers.make("default").await.unwrap();
    assert_eq!(writer.brokers, vec!["127.0.0.1:9092"]);
}
