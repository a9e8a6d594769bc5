use anyhow::{bail, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Identity and cadence of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
    /// Fire once at start-up instead of waiting a full interval.
    pub run_immediately: bool,
}

impl JobSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            run_immediately: false,
        }
    }

    #[must_use]
    pub fn immediately(mut self) -> Self {
        self.run_immediately = true;
        self
    }
}

/// Trigger counts for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Triggers that started a run.
    pub runs: u64,
    /// Triggers dropped because the previous run was still in flight.
    pub skipped: u64,
    /// Runs that returned an error.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    runs: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> JobStats {
        JobStats {
            runs: self.runs.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

struct JobEntry {
    spec: JobSpec,
    task: JobFn,
    in_flight: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

/// Releases the in-flight flag when a run ends, including by panic.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Interval scheduler with one ticker task per job.
pub struct Scheduler {
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
    tickers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tickers: Mutex::new(Vec::new()),
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }

    /// Registers a job under a unique name.
    ///
    /// # Errors
    /// Returns an error for a duplicate name, a zero interval, or when the
    /// scheduler has already started.
    pub async fn register<F, Fut>(&self, spec: JobSpec, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.started.load(Ordering::Acquire) {
            bail!("cannot register job '{}' after the scheduler started", spec.name);
        }
        if spec.interval.is_zero() {
            bail!("job '{}' has a zero interval", spec.name);
        }

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&spec.name) {
            bail!("job '{}' is already registered", spec.name);
        }

        let task: JobFn = Arc::new(move || -> JobFuture { Box::pin(job()) });
        info!(job = %spec.name, interval_secs = spec.interval.as_secs(), "Registered job");
        jobs.insert(
            spec.name.clone(),
            JobEntry {
                spec,
                task,
                in_flight: Arc::new(AtomicBool::new(false)),
                counters: Arc::new(Counters::default()),
            },
        );
        Ok(())
    }

    /// Spawns one ticker per registered job.
    ///
    /// # Errors
    /// Returns an error if called twice.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            bail!("scheduler already started");
        }

        let jobs = self.jobs.read().await;
        let mut tickers = self.tickers.lock().await;
        for entry in jobs.values() {
            tickers.push(tokio::spawn(ticker(
                entry.spec.clone(),
                entry.task.clone(),
                entry.in_flight.clone(),
                entry.counters.clone(),
                self.shutdown_tx.subscribe(),
            )));
        }

        info!(jobs = jobs.len(), "Scheduler started");
        Ok(())
    }

    /// Stops all tickers and waits for them. A run in flight is allowed to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = self.tickers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Ticker task ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    /// Starts the scheduler and blocks until Ctrl+C, then shuts down.
    ///
    /// # Errors
    /// Returns an error if the scheduler cannot start or the signal handler
    /// cannot be installed.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        self.start().await?;
        info!("Press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, stopping scheduler");
        self.shutdown().await;
        Ok(())
    }

    /// Trigger counts for a job, if registered.
    pub async fn stats(&self, name: &str) -> Option<JobStats> {
        self.jobs.read().await.get(name).map(|e| e.counters.snapshot())
    }

    pub async fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

async fn ticker(
    spec: JobSpec,
    task: JobFn,
    in_flight: Arc<AtomicBool>,
    counters: Arc<Counters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let first = if spec.run_immediately {
        Instant::now()
    } else {
        Instant::now() + spec.interval
    };
    let mut interval = tokio::time::interval_at(first, spec.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_run: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if in_flight.swap(true, Ordering::AcqRel) {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            warn!(job = %spec.name, "Previous run still in flight, skipping trigger");
            continue;
        }

        counters.runs.fetch_add(1, Ordering::Relaxed);
        debug!(job = %spec.name, "Triggering job");

        let guard = InFlightGuard(in_flight.clone());
        let future = task();
        let counters = counters.clone();
        let name = spec.name.clone();
        last_run = Some(tokio::spawn(async move {
            let _guard = guard;
            let started = Instant::now();
            match future.await {
                Ok(()) => {
                    info!(job = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Job finished");
                }
                Err(e) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    error!(job = %name, "Job failed: {:#}", e);
                }
            }
        }));
    }

    if let Some(handle) = last_run {
        if let Err(e) = handle.await {
            error!(job = %spec.name, "Job run panicked: {}", e);
        }
    }
    debug!(job = %spec.name, "Ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn counting(counter: Arc<AtomicUsize>) -> impl Fn() -> JobFuture + Send + Sync + 'static {
        move || -> JobFuture {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    // ========== Registration Tests ==========

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(JobSpec::new("analysis", Duration::from_secs(60)), counting(counter.clone()))
            .await
            .unwrap();

        let err = scheduler
            .register(JobSpec::new("analysis", Duration::from_secs(30)), counting(counter))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(scheduler.job_names().await, vec!["analysis".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(scheduler
            .register(JobSpec::new("bad", Duration::ZERO), counting(counter))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_register_after_start_rejected() {
        let scheduler = Scheduler::new();
        scheduler.start().await.unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(scheduler
            .register(JobSpec::new("late", Duration::from_secs(1)), counting(counter))
            .await
            .is_err());
        assert!(scheduler.start().await.is_err());
        scheduler.shutdown().await;
    }

    // ========== Ticking Tests ==========

    #[tokio::test(start_paused = true)]
    async fn test_immediate_job_fires_at_start() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(
                JobSpec::new("analysis", Duration::from_secs(10)).immediately(),
                counting(counter.clone()),
            )
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_waits_one_interval() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(JobSpec::new("tracking", Duration::from_secs(60)), counting(counter.clone()))
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_never_overlaps() {
        let scheduler = Scheduler::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let (a, m) = (active.clone(), max_active.clone());
        scheduler
            .register(
                JobSpec::new("analysis", Duration::from_secs(10)).immediately(),
                move || {
                    let active = a.clone();
                    let max_active = m.clone();
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(25)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                },
            )
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(45)).await;

        let stats = scheduler.stats("analysis").await.unwrap();
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.skipped, 3);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_yields_single_catch_up_run() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(JobSpec::new("tracking", Duration::from_secs(10)), counting(counter.clone()))
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(55)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_and_do_not_stop_ticks() {
        let scheduler = Scheduler::new();
        scheduler
            .register(JobSpec::new("flaky", Duration::from_secs(10)).immediately(), || async {
                Err::<(), _>(anyhow!("upstream down"))
            })
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;

        let stats = scheduler.stats("flaky").await.unwrap();
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.skipped, 0);

        scheduler.shutdown().await;
    }

    // ========== Shutdown Tests ==========

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticking() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(
                JobSpec::new("analysis", Duration::from_secs(10)).immediately(),
                counting(counter.clone()),
            )
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        settle().await;
        scheduler.shutdown().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_run() {
        let scheduler = Scheduler::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        scheduler
            .register(
                JobSpec::new("slow", Duration::from_secs(60)).immediately(),
                move || {
                    let flag = flag.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        flag.store(true, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                },
            )
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        settle().await;
        scheduler.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
