//! Long-running service hosting many jobs.
//!
//! Every hosted job runs on its own tokio task with its own engine and job
//! context; nothing is shared between jobs except the persistent stores,
//! which serialize through the store claim registry. Stopping a job raises
//! its context error flag, the same halt signal the engine polls between
//! stage passes; there is no forced interrupt.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule as CronSchedule;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{JobConfig, ScheduledJobConfig};
use crate::context::{ContextStatus, JobContext};
use crate::errors::{ConfigurationError, DatexError};

use super::JobRunner;

/// Bookkeeping for one hosted job.
#[derive(Debug)]
struct JobHandle {
    /// The context of the latest run. Scheduled jobs replace this on every
    /// fire.
    current: Arc<RwLock<Arc<JobContext>>>,
    /// Tells a scheduled loop not to fire again.
    stop: Arc<AtomicBool>,
    /// Wakes a loop sleeping until its next fire.
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Hosts jobs as independent tokio tasks, keyed by job name.
#[derive(Debug)]
pub struct ServiceRunner {
    runner: JobRunner,
    jobs: DashMap<String, JobHandle>,
    accepting: AtomicBool,
}

impl ServiceRunner {
    /// Creates a service over a job runner.
    #[must_use]
    pub fn new(runner: JobRunner) -> Self {
        Self {
            runner,
            jobs: DashMap::new(),
            accepting: AtomicBool::new(true),
        }
    }

    /// The underlying job runner.
    #[must_use]
    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Starts a job immediately, returning its initial status.
    ///
    /// Fails when the service is shutting down, when a job with the same
    /// name is still running, or when the document does not resolve.
    pub fn start_job(&self, config: JobConfig) -> Result<ContextStatus, DatexError> {
        let name = config.name.clone();
        self.check_startable(&name)?;

        let mut engine = self.runner.prepare(&config)?;
        let context = Arc::clone(engine.context());
        let task = tokio::spawn(async move {
            let status = engine.execute().await;
            info!(
                job = %status.job,
                frames = status.frames_processed,
                error = status.error,
                "job finished"
            );
        });
        let status = context.status();
        self.register(name, context, task);
        Ok(status)
    }

    /// Starts a service job entry: immediately when it has no schedule,
    /// otherwise on its cron schedule until stopped.
    pub fn start_scheduled(&self, entry: ScheduledJobConfig) -> Result<ContextStatus, DatexError> {
        let Some(expression) = entry.schedule else {
            return self.start_job(entry.job);
        };
        let schedule = CronSchedule::from_str(&expression).map_err(|e| {
            ConfigurationError::invalid_option("service", "schedule", &e.to_string())
        })?;

        let name = entry.job.name.clone();
        self.check_startable(&name)?;

        let placeholder = Arc::new(JobContext::new(&name));
        placeholder.set_state("scheduled");
        let current = Arc::new(RwLock::new(Arc::clone(&placeholder)));
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(run_on_schedule(
            self.runner.clone(),
            entry.job,
            schedule,
            Arc::clone(&current),
            Arc::clone(&stop),
            Arc::clone(&wake),
        ));

        let status = placeholder.status();
        self.jobs.insert(
            name,
            JobHandle {
                current,
                stop,
                wake,
                task,
            },
        );
        Ok(status)
    }

    /// Starts every entry of a service document, logging entries that do not
    /// start instead of aborting the rest.
    pub fn start_configured(&self, jobs: Vec<ScheduledJobConfig>) {
        for entry in jobs {
            let name = entry.job.name.clone();
            if let Err(e) = self.start_scheduled(entry) {
                warn!(job = %name, "job not started: {e}");
            }
        }
    }

    /// Stops a job by raising its error flag, returning its status, or
    /// `None` for an unknown name.
    pub fn stop_job(&self, name: &str) -> Option<ContextStatus> {
        let handle = self.jobs.get(name)?;
        handle.stop.store(true, Ordering::SeqCst);
        let context = Arc::clone(&*handle.current.read());
        context.fail("stopped by operator");
        // A stored permit, so a loop that has not reached its sleep yet still
        // sees the wake.
        handle.wake.notify_one();
        info!(job = %name, "stop requested");
        Some(context.status())
    }

    /// The latest status of a hosted job.
    #[must_use]
    pub fn job_status(&self, name: &str) -> Option<ContextStatus> {
        self.jobs.get(name).map(|h| h.current.read().status())
    }

    /// Statuses of every hosted job, ordered by name.
    #[must_use]
    pub fn service_status(&self) -> Vec<ContextStatus> {
        let mut statuses: Vec<ContextStatus> = self
            .jobs
            .iter()
            .map(|entry| entry.value().current.read().status())
            .collect();
        statuses.sort_by(|a, b| a.job.cmp(&b.job));
        statuses
    }

    /// True while the named job's task is alive.
    #[must_use]
    pub fn is_running(&self, name: &str) -> bool {
        self.jobs
            .get(name)
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Stops every job and refuses new ones.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        info!("service shutting down");
        let names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.stop_job(&name);
        }
    }

    /// Waits for every hosted job task to finish, draining the registry.
    pub async fn wait_idle(&self) {
        loop {
            let names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
            if names.is_empty() {
                break;
            }
            let mut waits = Vec::new();
            for name in names {
                if let Some((name, handle)) = self.jobs.remove(&name) {
                    waits.push(async move { (name, handle.task.await) });
                }
            }
            for (name, result) in join_all(waits).await {
                if let Err(e) = result {
                    warn!(job = %name, "job task aborted: {e}");
                }
            }
        }
    }

    fn check_startable(&self, name: &str) -> Result<(), DatexError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(DatexError::processing("service", "shutting down"));
        }
        if let Some(existing) = self.jobs.get(name) {
            if !existing.task.is_finished() {
                return Err(DatexError::processing(
                    "service",
                    format!("job '{name}' is already running"),
                ));
            }
        }
        Ok(())
    }

    fn register(&self, name: String, context: Arc<JobContext>, task: JoinHandle<()>) {
        self.jobs.insert(
            name,
            JobHandle {
                current: Arc::new(RwLock::new(context)),
                stop: Arc::new(AtomicBool::new(false)),
                wake: Arc::new(Notify::new()),
                task,
            },
        );
    }
}

/// Runs a job on its cron schedule until told to stop or the schedule has no
/// further fire times.
async fn run_on_schedule(
    runner: JobRunner,
    config: JobConfig,
    schedule: CronSchedule,
    current: Arc<RwLock<Arc<JobContext>>>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    while !stop.load(Ordering::SeqCst) {
        let Some(next) = schedule.upcoming(Utc).next() else {
            info!(job = %config.name, "schedule exhausted");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(job = %config.name, at = %next, "next run scheduled");
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = wake.notified() => {}
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let mut engine = match runner.prepare(&config) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(job = %config.name, "cannot assemble scheduled job: {e}");
                break;
            }
        };
        *current.write() = Arc::clone(engine.context());
        let status = engine.execute().await;
        info!(
            job = %status.job,
            frames = status.frames_processed,
            error = status.error,
            "scheduled run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StageRegistry;
    use crate::testing::{CollectingWriter, RecordSink, VecReader};

    fn service_with(sink: RecordSink) -> ServiceRunner {
        let mut registry = StageRegistry::with_builtins();
        registry.register_reader("Vec", |o| Box::new(VecReader::from_config(o)));
        registry.register_writer("Collecting", move |o| {
            Box::new(CollectingWriter::from_config(o).with_sink(sink.clone()))
        });
        ServiceRunner::new(JobRunner::new(registry))
    }

    fn copy_job(name: &str) -> JobConfig {
        JobConfig::parse(&format!(
            r#"{{
                "name": "{name}",
                "reader": {{ "class": "Vec", "records": [ {{ "id": 1 }}, {{ "id": 2 }} ] }},
                "writer": {{ "class": "Collecting" }}
            }}"#
        ))
        .unwrap()
    }

    async fn wait_until_finished(service: &ServiceRunner, name: &str) {
        for _ in 0..200 {
            if !service.is_running(name) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job '{name}' did not finish in time");
    }

    #[tokio::test]
    async fn test_start_and_observe_completion() {
        let sink = RecordSink::new();
        let service = service_with(sink.clone());

        let status = service.start_job(copy_job("copy")).unwrap();
        assert_eq!(status.job, "copy");

        wait_until_finished(&service, "copy").await;
        let finished = service.job_status("copy").unwrap();
        assert_eq!(finished.state, "closed");
        assert_eq!(finished.frames_processed, 2);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_running_job_rejected() {
        let service = service_with(RecordSink::new());
        let entry = ScheduledJobConfig {
            // Fires once a year; the loop stays asleep for this test.
            schedule: Some("0 0 0 1 1 *".to_string()),
            job: JobConfig::named("sleeper"),
        };

        service.start_scheduled(entry.clone()).unwrap();
        assert!(service.is_running("sleeper"));

        let err = service.start_scheduled(entry).unwrap_err();
        assert!(err.to_string().contains("already running"));

        service.shutdown();
        service.wait_idle().await;
    }

    #[tokio::test]
    async fn test_stop_raises_the_error_flag() {
        let service = service_with(RecordSink::new());
        service
            .start_scheduled(ScheduledJobConfig {
                schedule: Some("0 0 0 1 1 *".to_string()),
                job: JobConfig::named("sleeper"),
            })
            .unwrap();

        let stopped = service.stop_job("sleeper").unwrap();
        assert!(stopped.error);
        assert_eq!(stopped.message.as_deref(), Some("stopped by operator"));

        service.wait_idle().await;
        assert!(!service.is_running("sleeper"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_job_fires() {
        let sink = RecordSink::new();
        let service = service_with(sink.clone());
        service
            .start_scheduled(ScheduledJobConfig {
                schedule: Some("* * * * * *".to_string()),
                job: copy_job("ticker"),
            })
            .unwrap();

        for _ in 0..500 {
            if service
                .job_status("ticker")
                .is_some_and(|s| s.frames_processed >= 2)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let status = service.job_status("ticker").unwrap();
        assert!(status.frames_processed >= 2, "scheduled job never fired");

        service.shutdown();
        service.wait_idle().await;
        assert!(!sink.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_yields_none() {
        let service = service_with(RecordSink::new());
        assert!(service.job_status("ghost").is_none());
        assert!(service.stop_job("ghost").is_none());
        assert!(!service.is_running("ghost"));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_jobs() {
        let service = service_with(RecordSink::new());
        service.shutdown();

        let err = service.start_job(copy_job("late")).unwrap_err();
        assert!(err.to_string().contains("shutting down"));
    }

    #[tokio::test]
    async fn test_service_status_ordered_by_name() {
        let service = service_with(RecordSink::new());
        service.start_job(copy_job("zulu")).unwrap();
        service.start_job(copy_job("alpha")).unwrap();

        let names: Vec<String> = service
            .service_status()
            .into_iter()
            .map(|s| s.job)
            .collect();
        assert_eq!(names, vec!["alpha", "zulu"]);

        service.wait_idle().await;
    }
}
