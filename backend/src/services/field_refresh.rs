//! Field refresh orchestrator
//!
//! Keeps one analysis result per observed field. A single worker task walks
//! the observed set whenever it changes and on a fixed interval, analyzing
//! fields strictly one after another. Readers get whatever is cached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use shared::{AnalysisRequest, AnalysisResult, DateRange, FieldId, ObservedField};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Config;
use crate::error::{AppError, FailureKind};
use crate::services::analysis::FieldAnalyzer;

/// Orchestrator timing
#[derive(Debug, Clone, Copy)]
pub struct FieldRefreshConfig {
    pub interval: Duration,
    pub analysis_timeout: Duration,
    pub window_days: i64,
}

impl FieldRefreshConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.refresh.interval(),
            analysis_timeout: config.refresh.analysis_timeout(),
            window_days: config.imagery.default_window_days,
        }
    }
}

/// Outcome of replacing the observed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSetSummary {
    pub observed: usize,
    /// Fields whose boundary has fewer than three usable points
    pub skipped: usize,
}

/// Most recent failed analysis of a field
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFailure {
    pub message: String,
    pub kind: FailureKind,
    pub at: DateTime<Utc>,
}

impl FieldFailure {
    fn from_error(error: &AppError) -> Self {
        Self {
            message: error.to_string(),
            kind: error.kind(),
            at: Utc::now(),
        }
    }
}

/// What the dashboard knows about one field right now
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStatus {
    pub field_id: FieldId,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<FieldFailure>,
}

#[derive(Debug, Default)]
struct FieldCache {
    results: HashMap<FieldId, AnalysisResult>,
    in_flight: HashSet<FieldId>,
    failures: HashMap<FieldId, FieldFailure>,
}

impl FieldCache {
    fn status(&self, id: &FieldId) -> FieldStatus {
        FieldStatus {
            field_id: id.clone(),
            loading: self.in_flight.contains(id),
            result: self.results.get(id).cloned(),
            last_error: self.failures.get(id).cloned(),
        }
    }
}

struct Shared {
    cache: RwLock<FieldCache>,
    fields: watch::Sender<Vec<ObservedField>>,
}

impl Shared {
    /// Same id with the same boundary is still in the observed set
    fn still_observed(&self, field: &ObservedField) -> bool {
        self.fields.borrow().iter().any(|f| f == field)
    }

    fn commit(&self, field: &ObservedField, outcome: Result<AnalysisResult, AppError>) {
        let mut cache = self.cache.write();
        cache.in_flight.remove(&field.id);

        if !self.still_observed(field) {
            tracing::debug!(field = %field.id, "Field left the observed set mid-analysis; dropping result");
            return;
        }

        match outcome {
            Ok(result) => {
                tracing::info!(
                    field = %field.id,
                    mean_ndvi = result.vegetation_stats.mean,
                    scenes = result.scene_count,
                    "Field analysis refreshed"
                );
                cache.failures.remove(&field.id);
                cache.results.insert(field.id.clone(), result);
            }
            Err(e) => {
                if e.requires_setup() {
                    tracing::error!(field = %field.id, "Satellite analysis needs setup: {}", e);
                } else {
                    tracing::warn!(field = %field.id, "Field analysis failed: {}", e);
                }
                cache.failures.insert(field.id.clone(), FieldFailure::from_error(&e));
            }
        }
    }
}

/// Handle to the refresh worker
pub struct FieldRefresher {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FieldRefresher {
    /// Start the worker. Nothing is analyzed until the first call to
    /// [`FieldRefresher::set_fields`].
    pub fn spawn(analyzer: Arc<dyn FieldAnalyzer>, config: FieldRefreshConfig) -> Self {
        let (fields_tx, fields_rx) = watch::channel(Vec::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            cache: RwLock::new(FieldCache::default()),
            fields: fields_tx,
        });

        let worker = Worker {
            shared: shared.clone(),
            analyzer,
            config,
            fields: fields_rx,
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            shared,
            shutdown: shutdown_tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Replace the observed field set.
    ///
    /// Entries for fields that are no longer observed are dropped. A change
    /// to the set wakes the worker for a new cycle.
    pub fn set_fields(&self, fields: Vec<ObservedField>) -> FieldSetSummary {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(fields.len());
        for field in fields {
            if seen.insert(field.id.clone()) {
                unique.push(field);
            } else {
                tracing::warn!(field = %field.id, "Duplicate field id in observed set; keeping the first");
            }
        }

        let skipped = unique.iter().filter(|f| f.analyzable_polygon().is_none()).count();
        let summary = FieldSetSummary {
            observed: unique.len(),
            skipped,
        };

        let mut cache = self.shared.cache.write();
        cache.results.retain(|id, _| seen.contains(id));
        cache.failures.retain(|id, _| seen.contains(id));

        let changed = self.shared.fields.send_if_modified(|current| {
            if *current == unique {
                false
            } else {
                *current = unique;
                true
            }
        });
        drop(cache);

        tracing::debug!(
            observed = summary.observed,
            skipped = summary.skipped,
            changed,
            "Observed field set updated"
        );

        summary
    }

    /// Cached result for a field, if any. Never triggers an analysis.
    pub fn select(&self, id: &FieldId) -> Option<AnalysisResult> {
        self.shared.cache.read().results.get(id).cloned()
    }

    /// Status of one observed field; `None` if it is not observed
    pub fn status(&self, id: &FieldId) -> Option<FieldStatus> {
        let cache = self.shared.cache.read();
        let observed = self.shared.fields.borrow().iter().any(|f| &f.id == id);
        observed.then(|| cache.status(id))
    }

    /// Status of every observed field, in observation order
    pub fn statuses(&self) -> Vec<FieldStatus> {
        let cache = self.shared.cache.read();
        self.shared
            .fields
            .borrow()
            .iter()
            .map(|f| cache.status(&f.id))
            .collect()
    }

    /// Whether an analysis is outstanding
    pub fn is_loading(&self) -> bool {
        !self.shared.cache.read().in_flight.is_empty()
    }

    /// Stop the timer, abandon any in-progress analysis and wait for the
    /// worker to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Field refresh worker ended abnormally: {}", e);
            }
            tracing::info!("Field refresh worker stopped");
        }
    }
}

impl Drop for FieldRefresher {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

enum Trigger {
    FieldsChanged,
    Interval,
    Shutdown,
}

enum CycleEnd {
    Completed,
    Shutdown,
}

struct Worker {
    shared: Arc<Shared>,
    analyzer: Arc<dyn FieldAnalyzer>,
    config: FieldRefreshConfig,
    fields: watch::Receiver<Vec<ObservedField>>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => Trigger::Shutdown,
                changed = self.fields.changed() => match changed {
                    Ok(()) => Trigger::FieldsChanged,
                    Err(_) => Trigger::Shutdown,
                },
                _ = ticker.tick() => Trigger::Interval,
            };

            match trigger {
                Trigger::Shutdown => break,
                Trigger::FieldsChanged => tracing::debug!("Refreshing fields: observed set changed"),
                Trigger::Interval => tracing::debug!("Refreshing fields: interval elapsed"),
            }

            if let CycleEnd::Shutdown = self.run_cycle().await {
                break;
            }
        }
    }

    async fn run_cycle(&mut self) -> CycleEnd {
        let snapshot = self.fields.borrow_and_update().clone();
        let mut analyzed = 0usize;

        for field in snapshot {
            let Some(polygon) = field.analyzable_polygon() else {
                tracing::debug!(field = %field.id, "Skipping field without a usable boundary");
                continue;
            };

            if *self.shutdown.borrow() {
                return CycleEnd::Shutdown;
            }

            {
                let mut cache = self.shared.cache.write();
                if !self.shared.still_observed(&field) {
                    continue;
                }
                cache.in_flight.insert(field.id.clone());
            }

            let request = AnalysisRequest {
                field_id: Some(field.id.clone()),
                polygon,
                date_range: DateRange::ending_at(Utc::now().date_naive(), self.config.window_days),
            };

            let timeout = self.config.analysis_timeout;
            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => None,
                result = tokio::time::timeout(timeout, self.analyzer.analyze(request)) => Some(
                    result.unwrap_or_else(|_| {
                        Err(AppError::Timeout(format!("analysis exceeded {:?}", timeout)))
                    }),
                ),
            };

            match outcome {
                Some(result) => {
                    self.shared.commit(&field, result);
                    analyzed += 1;
                }
                None => {
                    self.shared.cache.write().in_flight.remove(&field.id);
                    tracing::debug!(field = %field.id, "Analysis abandoned on shutdown");
                    return CycleEnd::Shutdown;
                }
            }
        }

        tracing::debug!(analyzed, "Refresh cycle complete");
        CycleEnd::Completed
    }
}

/// Resolves once shutdown is requested or the handle is gone
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
