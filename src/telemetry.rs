//! Performance telemetry for flag resolution and any other operation a host wants to time.
//!
//! A [Telemetry] collector keeps a bounded, FIFO-evicting buffer of [MetricSample]s. Operations
//! are wrapped with [Telemetry::measure] (fallible) or [Telemetry::time] (infallible); the wrapped
//! operation's outcome is always passed through untouched, and a disabled collector does no work
//! at all.
//!
//! Analytics over samples are provided by the [MetricsSource] trait, which is implemented both by
//! the live collector and by plain slices of samples, e.g. samples loaded back from an export.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::TelemetryConfig;
use crate::ring::BoundedBuffer;
use crate::util::{nearest_rank, Metadata};

/// Metadata key under which the failure of a measured operation is recorded.
pub const ERROR_KEY: &str = "error";

const INCOMPLETE_OPERATION: &str = "operation did not complete";

/// A single timed operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub operation_name: String,
    pub duration_ms: f64,
    /// When the operation started.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MetricSample {
    pub fn new(operation_name: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            operation_name: operation_name.into(),
            duration_ms,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns the error recorded for this sample, if the operation failed.
    pub fn error(&self) -> Option<&str> {
        self.metadata.as_ref()?.get(ERROR_KEY)?.as_str()
    }
}

/// Aggregate statistics over the samples of one operation. Durations are in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub operation_name: String,
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl OperationStats {
    /// Computes statistics from the durations of an operation's samples, or `None` if there are
    /// none. Percentiles use the nearest-rank method.
    pub fn from_durations(
        operation_name: impl Into<String>,
        mut durations: Vec<f64>,
    ) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }
        durations.sort_by(|a, b| a.total_cmp(b));

        let count = durations.len();
        let total: f64 = durations.iter().sum();
        Some(Self {
            operation_name: operation_name.into(),
            count,
            avg: total / count as f64,
            min: durations[0],
            max: durations[count - 1],
            total,
            p50: nearest_rank(&durations, 50.0)?,
            p95: nearest_rank(&durations, 95.0)?,
            p99: nearest_rank(&durations, 99.0)?,
        })
    }
}

/// MetricsSource is the query capability shared by every holder of metric samples.
///
/// Implementors only provide [MetricsSource::samples]; every query is a pure filter over that
/// point-in-time copy.
pub trait MetricsSource {
    /// All retained samples, oldest first.
    fn samples(&self) -> Vec<MetricSample>;

    fn samples_for(&self, operation_name: &str) -> Vec<MetricSample> {
        self.samples()
            .into_iter()
            .filter(|s| s.operation_name == operation_name)
            .collect()
    }

    /// Samples whose timestamp lies within `[start, end]`.
    fn samples_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<MetricSample> {
        self.samples()
            .into_iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .collect()
    }

    /// Distinct operation names, sorted.
    fn operation_names(&self) -> Vec<String> {
        self.samples()
            .into_iter()
            .map(|s| s.operation_name)
            .sorted()
            .dedup()
            .collect()
    }

    /// Statistics for one operation, or `None` if no samples for it are retained.
    fn stats(&self, operation_name: &str) -> Option<OperationStats> {
        let durations = self
            .samples_for(operation_name)
            .into_iter()
            .map(|s| s.duration_ms)
            .collect();
        OperationStats::from_durations(operation_name, durations)
    }

    fn all_stats(&self) -> BTreeMap<String, OperationStats> {
        self.samples()
            .into_iter()
            .into_group_map_by(|s| s.operation_name.clone())
            .into_iter()
            .filter_map(|(name, samples)| {
                let durations = samples.into_iter().map(|s| s.duration_ms).collect();
                OperationStats::from_durations(name.clone(), durations).map(|stats| (name, stats))
            })
            .collect()
    }
}

impl MetricsSource for [MetricSample] {
    fn samples(&self) -> Vec<MetricSample> {
        self.to_vec()
    }
}

/// Telemetry is a bounded collector of [MetricSample]s.
///
/// Collectors are plain values: build one per scope that needs measuring and pass it by
/// reference. Appends are serialized by an internal mutex; queries work on a copy of the buffer.
pub struct Telemetry {
    enabled: AtomicBool,
    samples: Mutex<BoundedBuffer<MetricSample>>,
}

impl Telemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            samples: Mutex::new(BoundedBuffer::new(config.max_samples)),
        }
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self::new(TelemetryConfig {
            max_samples,
            ..TelemetryConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turns collection on or off. Samples already recorded are kept either way.
    pub fn set_enabled(&self, enabled: bool) {
        debug!("telemetry collection {}", if enabled { "enabled" } else { "disabled" });
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Runs `operation`, recording how long it took under `operation_name`.
    ///
    /// If the operation fails, the sample's metadata gains an `"error"` entry describing the
    /// failure and the error is returned unchanged. If the operation unwinds instead of returning,
    /// a sample is still recorded before the panic continues.
    pub fn measure<T, E, F>(
        &self,
        operation_name: &str,
        metadata: Option<Metadata>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        if !self.is_enabled() {
            return operation();
        }

        let in_flight = InFlight::start(self, operation_name, metadata);
        let result = operation();
        in_flight.finish(result.as_ref().err().map(|e| e.to_string()));
        result
    }

    /// Runs an infallible `operation`, recording how long it took under `operation_name`.
    pub fn time<T, F>(&self, operation_name: &str, metadata: Option<Metadata>, operation: F) -> T
    where
        F: FnOnce() -> T,
    {
        if !self.is_enabled() {
            return operation();
        }

        let in_flight = InFlight::start(self, operation_name, metadata);
        let value = operation();
        in_flight.finish(None);
        value
    }

    /// Records a sample that was timed elsewhere.
    pub fn record_metric(&self, sample: MetricSample) {
        if self.is_enabled() {
            self.push(sample);
        }
    }

    fn push(&self, sample: MetricSample) {
        if let Some(evicted) = self.samples.lock().push(sample) {
            trace!("evicted {} sample from telemetry buffer", evicted.operation_name);
        }
    }

    pub fn record(&self, operation_name: &str, duration_ms: f64, metadata: Option<Metadata>) {
        let mut sample = MetricSample::new(operation_name, duration_ms);
        sample.metadata = metadata;
        self.record_metric(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.lock().capacity()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

impl MetricsSource for Telemetry {
    fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().to_vec()
    }
}

// Records a sample when finished, or when dropped without being finished.
struct InFlight<'a> {
    telemetry: &'a Telemetry,
    operation_name: &'a str,
    metadata: Option<Metadata>,
    started_at: DateTime<Utc>,
    start: Instant,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn start(
        telemetry: &'a Telemetry,
        operation_name: &'a str,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            telemetry,
            operation_name,
            metadata,
            started_at: Utc::now(),
            start: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self, error: Option<String>) {
        self.finished = true;
        self.record(error);
    }

    fn record(&mut self, error: Option<String>) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        let mut metadata = self.metadata.take();
        if let Some(error) = error {
            metadata
                .get_or_insert_with(Metadata::new)
                .insert(ERROR_KEY.to_string(), error.into());
        }
        // an operation started while enabled is recorded even if collection stopped since
        self.telemetry.push(MetricSample {
            operation_name: self.operation_name.to_string(),
            duration_ms,
            timestamp: self.started_at,
            metadata,
        });
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.record(Some(INCOMPLETE_OPERATION.to_string()));
        }
    }
}
