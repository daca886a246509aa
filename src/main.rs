//! bootkit demo service.
//!
//! Wires a greeting "connection" factory, an HTTP module, an RPC module and
//! a cron module through the container, then serves them until SIGINT or
//! SIGTERM. SIGHUP (or editing the config file) reloads configuration and
//! evicts every cached greeting.
//!
//! ```toml
//! [app]
//! name = "greeter"
//!
//! [http]
//! addr = "127.0.0.1:8080"
//!
//! [greetings.default]
//! text = "hello"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use bootkit::config::{ConfigAccessor, ConfigAccessorExt, ConfigError, LogConfig};
use bootkit::factory::{self, Factory, Pair};
use bootkit::lifecycle::{signals, Shutdown};
use bootkit::modules::{CronModule, HttpModule, RpcError, RpcMethods, RpcModule};
use bootkit::observability::logging;
use bootkit::{App, BoxError, Config, Dispatcher, Provide};

#[derive(Parser)]
#[command(name = "bootkit")]
#[command(about = "Process bootstrap runtime demo service", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled module until interrupted
    Serve,
    /// List registered modules and cleanups
    Modules,
    /// Load and validate the configuration, then exit
    Check,
}

#[derive(Debug, Deserialize)]
struct GreetingConfig {
    text: String,
}

type Greetings = Factory<Arc<String>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(cli.config.as_deref())?;

    let log: LogConfig = config.unmarshal_or_default("log")?;
    if let Err(e) = logging::init(&log) {
        eprintln!("logging already initialized: {e}");
    }

    if let Commands::Check = cli.command {
        println!("configuration ok ({} file layer(s))", config.files().len());
        return Ok(());
    }

    let app = bootstrap(config)?;

    match cli.command {
        Commands::Modules => {
            for identity in app.modules() {
                println!("{identity}");
            }
        }
        Commands::Serve => {
            let shutdown = Shutdown::new();
            let _signals = signals::spawn(shutdown.clone(), Arc::clone(app.config()), Arc::clone(app.dispatcher()));
            let _watcher = app.watch_config()?;

            let result = app.serve(shutdown.token()).await;
            app.shutdown();
            result?;
        }
        Commands::Check => {}
    }

    Ok(())
}

fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.file(path);
    }
    builder.build()
}

fn bootstrap(config: Config) -> Result<App, bootkit::Error> {
    let app = App::new(config)?;
    app.provide_essentials()?;

    app.provide(|conf: Arc<dyn ConfigAccessor>, dispatcher: Arc<Dispatcher>| {
        let greetings = greetings_factory(conf);
        greetings.subscribe_reload_event_from(&dispatcher);
        let closing = greetings.clone();
        Provide::value(greetings).with_cleanup("greetings", move || {
            if let Err(e) = closing.close() {
                tracing::warn!(error = %e, "Greeting factory teardown failed");
            }
        })
    })?;

    app.add_module_fn(
        |conf: Arc<dyn ConfigAccessor>, greetings: Greetings| -> Result<Provide<HttpModule>, BoxError> {
            let router = Router::new()
                .route("/greet/{name}", get(greet))
                .with_state(greetings);
            Ok(Provide::value(HttpModule::from_config(conf.as_ref(), router)?))
        },
    )?;

    app.add_module_fn(
        |conf: Arc<dyn ConfigAccessor>, greetings: Greetings| -> Result<Provide<RpcModule>, BoxError> {
            let methods = RpcMethods::new().method("greet", move |params| {
                let greetings = greetings.clone();
                async move {
                    let name = params
                        .get("name")
                        .and_then(|name| name.as_str())
                        .unwrap_or("default")
                        .to_string();
                    let text = greetings
                        .make(&name)
                        .await
                        .map_err(|e| RpcError::Internal(e.to_string()))?;
                    Ok(serde_json::Value::from(text.as_str()))
                }
            });
            Ok(Provide::value(RpcModule::from_config(conf.as_ref(), methods)?))
        },
    )?;

    app.add_module(
        CronModule::new("maintenance")
            .job("heartbeat", Duration::from_secs(30), || async {
                tracing::info!("heartbeat");
                Ok(())
            })
            .configure(app.config().as_ref()),
    );

    Ok(app)
}

fn greetings_factory(conf: Arc<dyn ConfigAccessor>) -> Greetings {
    Factory::new("greeting", move |name: String| {
        let conf = Arc::clone(&conf);
        async move {
            let config: GreetingConfig = factory::named_config(conf.as_ref(), "greetings", &name)?;
            Ok(Pair::without_closer(Arc::new(config.text)))
        }
    })
}

async fn greet(
    State(greetings): State<Greetings>,
    UrlPath(name): UrlPath<String>,
) -> Result<String, (StatusCode, String)> {
    greetings
        .make(&name)
        .await
        .map(|text| format!("{text}, {name}\n"))
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}
