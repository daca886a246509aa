//! End-to-end bootstrap: essentials, reload propagation, config files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bootkit::config::{AppName, Env};
use bootkit::events::{Dispatcher, ReloadEvent, RELOAD};
use bootkit::factory::{self, Factory, Pair};
use bootkit::{App, Config, ConfigAccessor, ConfigAccessorExt, Provide};
use serde::Deserialize;

mod common;

#[derive(Debug, Deserialize)]
struct GreetingConfig {
    text: String,
}

#[test]
fn essentials_are_injectable() {
    let app = common::app(
        r#"
        [app]
        name = "billing"
        env = "production"
        "#,
    );

    let (name, env) = app.call(|name: AppName, env: Env| (name, env)).unwrap();
    assert_eq!(name.0, "billing");
    assert_eq!(env, Env::Production);

    let section = app
        .call(|conf: Arc<dyn ConfigAccessor>| conf.string("app.name"))
        .unwrap();
    assert_eq!(section.as_deref(), Some("billing"));

    let listeners = app
        .call(|dispatcher: Arc<Dispatcher>| dispatcher.listener_count(RELOAD))
        .unwrap();
    assert_eq!(listeners, 0);
}

#[test]
fn app_section_defaults() {
    let app = common::app("");
    assert_eq!(app.name().0, "app");
    assert_eq!(app.env(), Env::Local);
}

#[tokio::test]
async fn reload_rebuilds_factory_entries_from_new_config() {
    let path = std::env::temp_dir().join(format!("bootkit-app-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "[greetings.default]\ntext = \"hello\"\n").unwrap();

    let app = App::new(Config::builder().file(&path).build().unwrap()).unwrap();
    app.provide_essentials().unwrap();

    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    app.provide(move |conf: Arc<dyn ConfigAccessor>, dispatcher: Arc<Dispatcher>| {
        let counter = counter.clone();
        let greetings: Factory<Arc<String>> = Factory::new("greeting", move |name: String| {
            let conf = conf.clone();
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let config: GreetingConfig = factory::named_config(conf.as_ref(), "greetings", &name)?;
                Ok(Pair::without_closer(Arc::new(config.text)))
            }
        });
        greetings.subscribe_reload_event_from(&dispatcher);
        let closing = greetings.clone();
        Provide::value(greetings).with_cleanup("greetings", move || {
            let _ = closing.close();
        })
    })
    .unwrap();

    let greetings = app.call(|greetings: Factory<Arc<String>>| greetings).unwrap();
    assert_eq!(*greetings.make("default").await.unwrap(), "hello");
    assert_eq!(*greetings.make("default").await.unwrap(), "hello");
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    std::fs::write(&path, "[greetings.default]\ntext = \"bonjour\"\n").unwrap();
    app.reload("test").unwrap();

    assert!(greetings.is_empty());
    assert_eq!(*greetings.make("default").await.unwrap(), "bonjour");
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    assert_eq!(app.shutdown(), 1);
    assert!(greetings.is_closed());
    std::fs::remove_file(&path).ok();
}

#[test]
fn invalid_reload_keeps_previous_snapshot() {
    let path = std::env::temp_dir().join(format!("bootkit-app-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "[http]\naddr = \"127.0.0.1:8080\"\n").unwrap();

    let app = App::new(Config::builder().file(&path).build().unwrap()).unwrap();
    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = reloads.clone();
    app.dispatcher().subscribe(RELOAD, move |_: &ReloadEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    std::fs::write(&path, "[http]\naddr = \"not an address\"\n").unwrap();
    assert!(app.reload("test").is_err());
    assert_eq!(reloads.load(Ordering::SeqCst), 0);
    assert_eq!(app.config().string("http.addr").as_deref(), Some("127.0.0.1:8080"));
    std::fs::remove_file(&path).ok();
}
