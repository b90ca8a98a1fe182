//! Refresh orchestration.
//!
//! `UsageService` owns the last good report and the published snapshot. A refresh
//! runs the scan pipeline on a background task; at most one is in flight.
//! Results are applied under the state lock, and only when they belong to the
//! refresh that is still current, so a cancelled or superseded run can never
//! overwrite a newer snapshot.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Local;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::config::{self, ConfigError, Settings};
use crate::core::cost::pricing::{self, PricingSource};
use crate::core::cost::{cache, report, scanner};
use crate::core::error::{RefreshError, ScanError};
use crate::core::models::cost::CostReport;
use crate::core::models::snapshot::UsageSnapshot;

pub type PipelineFuture = Pin<Box<dyn Future<Output = Result<CostReport, RefreshError>> + Send>>;

/// Produces one report per call. The flag is raised when the run should stop early.
pub type Pipeline = Arc<dyn Fn(Arc<AtomicBool>) -> PipelineFuture + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub projects_dir: PathBuf,
    pub pricing: PricingSource,
    /// Where the last good report is persisted; `None` disables the cache.
    pub report_cache: Option<PathBuf>,
    pub refresh_interval: Duration,
    pub refresh_timeout: Option<Duration>,
}

impl ServiceSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            projects_dir: settings.projects_dir(),
            pricing: PricingSource {
                url: settings.pricing_url.clone(),
                ..PricingSource::default()
            },
            report_cache: Some(cache::default_report_path()),
            refresh_interval: settings.refresh_interval(),
            refresh_timeout: settings.refresh_timeout(),
        }
    }
}

/// Loading and error state, published alongside the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceStatus {
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Delivers a refresh's outcome exactly once, whichever side gets there first.
struct Completion {
    tx: Mutex<Option<oneshot::Sender<RefreshOutcome>>>,
}

impl Completion {
    fn new(tx: oneshot::Sender<RefreshOutcome>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn fire(&self, outcome: RefreshOutcome) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Awaitable result of one `refresh()` call.
pub struct RefreshHandle {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshHandle {
    pub async fn wait(self) -> RefreshOutcome {
        self.rx.await.unwrap_or(RefreshOutcome::Cancelled)
    }
}

struct InFlight {
    generation: u64,
    task: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
    completion: Completion,
}

impl InFlight {
    fn cancel(self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.task.abort();
        self.completion.fire(RefreshOutcome::Cancelled);
    }
}

struct State {
    report: Option<Arc<CostReport>>,
    error: Option<String>,
    generation: u64,
    in_flight: Option<InFlight>,
    timer: Option<oneshot::Sender<()>>,
    interval: Duration,
}

struct Inner {
    settings: ServiceSettings,
    pipeline: Pipeline,
    state: Mutex<State>,
    published: watch::Sender<Arc<UsageSnapshot>>,
    status: watch::Sender<ServiceStatus>,
    /// Generation of the report last written to the cache; held for the whole write.
    persisted: tokio::sync::Mutex<u64>,
}

/// Long-lived owner of the published usage snapshot. Cheap to clone.
#[derive(Clone)]
pub struct UsageService {
    inner: Arc<Inner>,
}

/// The real pipeline: resolve pricing, then scan and aggregate on a blocking thread.
pub fn default_pipeline(settings: &ServiceSettings) -> Pipeline {
    let root = settings.projects_dir.clone();
    let source = settings.pricing.clone();
    Arc::new(move |cancel: Arc<AtomicBool>| -> PipelineFuture {
        Box::pin(scan_and_price(root.clone(), source.clone(), cancel))
    })
}

async fn scan_and_price(
    root: PathBuf,
    source: PricingSource,
    cancel: Arc<AtomicBool>,
) -> Result<CostReport, RefreshError> {
    if !root.exists() {
        tracing::debug!("No log directory at {}, nothing to scan", root.display());
        return Ok(CostReport::default());
    }
    let table = pricing::fetch_pricing(&source).await;
    let report = tokio::task::spawn_blocking(move || scanner::read_usage(&root, &table, &cancel))
        .await
        .map_err(|e| RefreshError::Worker(e.to_string()))??;
    Ok(report)
}

impl UsageService {
    pub fn new(settings: ServiceSettings) -> Self {
        let pipeline = default_pipeline(&settings);
        Self::with_pipeline(settings, pipeline)
    }

    /// Build a service around a custom pipeline, seeding from the report cache if present.
    pub fn with_pipeline(settings: ServiceSettings, pipeline: Pipeline) -> Self {
        let today = Local::now().date_naive();
        let seeded = settings.report_cache.as_deref().and_then(cache::load_report);

        let (report, snapshot) = match seeded {
            Some((report, saved_at)) => {
                tracing::debug!("Seeded usage from cache ({} days)", report.daily.len());
                let snapshot = report::derive_snapshot_at(&report, 0, today, Some(saved_at));
                (Some(Arc::new(report)), snapshot)
            }
            None => (
                None,
                report::derive_snapshot_at(&CostReport::default(), 0, today, None),
            ),
        };

        let (published, _) = watch::channel(Arc::new(snapshot));
        let (status, _) = watch::channel(ServiceStatus::default());
        let interval = settings.refresh_interval;
        Self {
            inner: Arc::new(Inner {
                settings,
                pipeline,
                state: Mutex::new(State {
                    report,
                    error: None,
                    generation: 0,
                    in_flight: None,
                    timer: None,
                    interval,
                }),
                published,
                status,
                persisted: tokio::sync::Mutex::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The current snapshot. Never partially updated.
    pub fn snapshot(&self) -> Arc<UsageSnapshot> {
        self.inner.published.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<UsageSnapshot>> {
        self.inner.published.subscribe()
    }

    /// Receiver notified whenever a refresh starts, finishes, fails or is cancelled.
    pub fn subscribe_status(&self) -> watch::Receiver<ServiceStatus> {
        self.inner.status.subscribe()
    }

    fn publish_status(&self, state: &State) {
        self.inner.status.send_replace(ServiceStatus {
            is_loading: state.in_flight.is_some(),
            error: state.error.clone(),
        });
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.lock().timer.is_some()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.lock().interval
    }

    /// Start a refresh unless one is already running.
    ///
    /// Returns `None` when a refresh is in flight; that run's result will be published.
    pub fn refresh(&self) -> Option<RefreshHandle> {
        let mut state = self.lock();
        if let Some(flight) = &state.in_flight {
            if !flight.task.is_finished() {
                tracing::debug!("Refresh already in progress, skipping");
                return None;
            }
        }
        // A finished task that never reported back is stale.
        if let Some(stale) = state.in_flight.take() {
            stale.cancel();
        }

        state.error = None;
        state.generation += 1;
        let generation = state.generation;

        let (tx, rx) = oneshot::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let service = self.clone();
        let run_cancel = Arc::clone(&cancel);
        let task = tokio::spawn(async move {
            let result = service.run_pipeline(run_cancel).await;
            if let Some(report) = service.finish(generation, result) {
                service.persist(generation, report).await;
            }
        });

        state.in_flight = Some(InFlight {
            generation,
            task,
            cancel,
            completion: Completion::new(tx),
        });
        self.publish_status(&state);
        tracing::debug!("Refresh #{} started", generation);
        Some(RefreshHandle { rx })
    }

    async fn run_pipeline(&self, cancel: Arc<AtomicBool>) -> Result<CostReport, RefreshError> {
        let work = (self.inner.pipeline)(Arc::clone(&cancel));
        match self.inner.settings.refresh_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    cancel.store(true, Ordering::Relaxed);
                    Err(RefreshError::TimedOut(limit))
                }
            },
            None => work.await,
        }
    }

    /// Apply a finished run if it is still the current one.
    /// Returns the report when it was published.
    fn finish(
        &self,
        generation: u64,
        result: Result<CostReport, RefreshError>,
    ) -> Option<Arc<CostReport>> {
        let mut state = self.lock();
        if state.in_flight.as_ref().map(|f| f.generation) != Some(generation) {
            tracing::debug!("Dropping result of superseded refresh #{}", generation);
            return None;
        }
        let flight = state.in_flight.take()?;

        let (outcome, published) = match result {
            Ok(report) => {
                if report.is_empty() {
                    tracing::debug!("Refresh #{} found no usage", generation);
                }
                let report = Arc::new(report);
                let snapshot = report::derive_snapshot(&report, 0);
                state.report = Some(Arc::clone(&report));
                self.inner.published.send_replace(Arc::new(snapshot));
                tracing::info!(
                    "Refresh #{} published {} days, ${:.2} total",
                    generation,
                    report.daily.len(),
                    report.totals.total_cost
                );
                (RefreshOutcome::Succeeded, Some(report))
            }
            Err(RefreshError::Scan(ScanError::Cancelled)) => (RefreshOutcome::Cancelled, None),
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Refresh #{} failed: {}", generation, message);
                state.error = Some(message.clone());
                (RefreshOutcome::Failed(message), None)
            }
        };

        self.publish_status(&state);
        flight.completion.fire(outcome);
        published
    }

    /// Write a published report to the cache. Writes are serialized, and a report
    /// older than the one already written is skipped.
    async fn persist(&self, generation: u64, report: Arc<CostReport>) {
        let Some(path) = self.inner.settings.report_cache.clone() else {
            return;
        };
        let mut written = self.inner.persisted.lock().await;
        if *written > generation {
            tracing::debug!("Skipping cache write for superseded refresh #{}", generation);
            return;
        }
        let saved = tokio::task::spawn_blocking(move || cache::save_report(&path, &report)).await;
        match saved {
            Ok(Ok(())) => *written = generation,
            Ok(Err(e)) => tracing::warn!("{:#}", e),
            Err(e) => tracing::warn!("Usage cache writer failed: {}", e),
        }
    }

    /// Refresh now, then keep refreshing on the configured interval.
    pub fn start_auto_refresh(&self) {
        self.refresh();
        self.schedule_timer();
    }

    /// Cancel the timer and any in-flight refresh. Safe to call repeatedly.
    pub fn stop_auto_refresh(&self) {
        let mut state = self.lock();
        if let Some(shutdown) = state.timer.take() {
            let _ = shutdown.send(());
            tracing::debug!("Auto refresh stopped");
        }
        if let Some(flight) = state.in_flight.take() {
            tracing::debug!("Cancelling refresh #{}", flight.generation);
            flight.cancel();
            self.publish_status(&state);
        }
    }

    pub fn restart_auto_refresh(&self) {
        self.stop_auto_refresh();
        self.schedule_timer();
    }

    /// Change the interval; a running timer is restarted with the new value.
    pub fn set_refresh_interval(&self, minutes: u64) -> Result<(), ConfigError> {
        let minutes = config::validate_interval(minutes)?;
        let running = {
            let mut state = self.lock();
            state.interval = Duration::from_secs(minutes * 60);
            state.timer.is_some()
        };
        if running {
            self.restart_auto_refresh();
        }
        Ok(())
    }

    fn schedule_timer(&self) {
        let mut state = self.lock();
        if let Some(old) = state.timer.take() {
            let _ = old.send(());
        }
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        state.timer = Some(shutdown_tx);
        let period = state.interval;
        drop(state);

        tracing::debug!("Auto refresh every {}s", period.as_secs());
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        UsageService { inner }.refresh();
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });
    }

    /// Recompute the window `offset` weeks away from the last good report, without rescanning.
    pub fn snapshot_for_week_offset(&self, offset: i32) -> UsageSnapshot {
        let report = self.lock().report.clone().unwrap_or_default();
        let last_refresh = self.snapshot().last_refresh;
        report::derive_snapshot_at(&report, offset, Local::now().date_naive(), last_refresh)
    }
}
