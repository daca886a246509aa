//! Scheduled job module.
//!
//! Runs named jobs on fixed intervals until the serve scope is cancelled.
//! A failing job is logged and counted; it does not stop the module.
//! `cron.jobs.<name>.every` overrides the interval a job was declared with.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigAccessor, ConfigAccessorExt};
use crate::lifecycle::{Module, ModuleIdentity, ModuleKind};
use crate::observability::metrics;
use crate::BoxError;

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

#[derive(Clone)]
struct Job {
    name: String,
    every: Duration,
    run: JobFn,
}

/// A set of interval jobs run as one module.
pub struct CronModule {
    identity: ModuleIdentity,
    jobs: Vec<Job>,
}

impl CronModule {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            identity: ModuleIdentity::new(ModuleKind::Cron, label),
            jobs: Vec::new(),
        }
    }

    /// Add a job running every `every`. The first run happens one period
    /// after the module starts.
    pub fn job<F, Fut>(mut self, name: impl Into<String>, every: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.jobs.push(Job {
            name: name.into(),
            every,
            run: Arc::new(move || Box::pin(job())),
        });
        self
    }

    /// Apply `cron.jobs.<name>.every` overrides from `conf`.
    pub fn configure(mut self, conf: &dyn ConfigAccessor) -> Self {
        for job in &mut self.jobs {
            if let Some(every) = conf.duration(&format!("cron.jobs.{}.every", job.name)) {
                tracing::debug!(job = %job.name, every = ?every, "Cron interval overridden");
                job.every = every;
            }
        }
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }
}

async fn run_job(job: Job, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + job.every, job.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match (job.run)().await {
                    Ok(()) => {
                        tracing::debug!(job = %job.name, "Cron job finished");
                        metrics::record_cron_run(&job.name, true);
                    }
                    Err(e) => {
                        tracing::warn!(job = %job.name, error = %e, "Cron job failed");
                        metrics::record_cron_run(&job.name, false);
                    }
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

impl Module for CronModule {
    fn identity(&self) -> ModuleIdentity {
        self.identity.clone()
    }

    fn run(&self, shutdown: CancellationToken) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            if let Some(job) = self.jobs.iter().find(|job| job.every.is_zero()) {
                return Err(BoxError::from(format!("cron job `{}` has a zero interval", job.name)));
            }

            let mut tasks = JoinSet::new();
            for job in self.jobs.iter().cloned() {
                tracing::info!(job = %job.name, every = ?job.every, "Cron job scheduled");
                tasks.spawn(run_job(job, shutdown.clone()));
            }
            while tasks.join_next().await.is_some() {}
            Ok(())
        })
    }
}

impl fmt::Debug for CronModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronModule")
            .field("identity", &self.identity)
            .field("jobs", &self.job_names())
            .finish()
    }
}
