//! Metrics for the rocket resequencer
//!
//! In-process counters, gauges and histograms, exported as JSON and as
//! Prometheus text. Names use dots internally and are rewritten with
//! underscores on export.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Metrics registry shared by the resequencer and the HTTP layer
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicU64>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Increment a counter
    pub async fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1).await;
    }

    /// Add to a counter
    pub async fn add_counter(&self, name: &str, value: u64) {
        let counters = self.counters.read().await;
        if let Some(counter) = counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        drop(counters);

        let mut counters = self.counters.write().await;
        let counter = counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Set a gauge value
    pub async fn set_gauge(&self, name: &str, value: u64) {
        let gauges = self.gauges.read().await;
        if let Some(gauge) = gauges.get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        drop(gauges);

        let mut gauges = self.gauges.write().await;
        gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .store(value, Ordering::Relaxed);
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let counters = self.counters.read().await;
        counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub async fn get_gauge(&self, name: &str) -> u64 {
        let gauges = self.gauges.read().await;
        gauges
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of observations recorded for a histogram
    pub async fn histogram_count(&self, name: &str) -> u64 {
        let histograms = self.histograms.read().await;
        histograms.get(name).map(|h| h.count()).unwrap_or(0)
    }

    /// Record a histogram observation
    pub async fn observe_histogram(&self, name: &str, value: f64) {
        let histograms = self.histograms.read().await;
        if let Some(histogram) = histograms.get(name) {
            histogram.observe(value);
            return;
        }
        drop(histograms);

        let mut histograms = self.histograms.write().await;
        histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::default()))
            .observe(value);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// All metrics as JSON
    pub async fn to_json(&self) -> serde_json::Value {
        let counters = self.counters.read().await;
        let gauges = self.gauges.read().await;
        let histograms = self.histograms.read().await;

        let counter_values: BTreeMap<&str, u64> = counters
            .iter()
            .map(|(k, v)| (k.as_str(), v.load(Ordering::Relaxed)))
            .collect();

        let gauge_values: BTreeMap<&str, u64> = gauges
            .iter()
            .map(|(k, v)| (k.as_str(), v.load(Ordering::Relaxed)))
            .collect();

        let histogram_values: BTreeMap<&str, serde_json::Value> = histograms
            .iter()
            .map(|(k, h)| (k.as_str(), h.to_json()))
            .collect();

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "counters": counter_values,
            "gauges": gauge_values,
            "histograms": histogram_values,
        })
    }

    /// Export metrics in Prometheus text format, sorted by name
    pub async fn to_prometheus(&self) -> String {
        let counters = self.counters.read().await;
        let gauges = self.gauges.read().await;
        let histograms = self.histograms.read().await;

        let mut output = String::new();

        let _ = writeln!(
            output,
            "# HELP resequencer_uptime_seconds Time since service start"
        );
        let _ = writeln!(output, "# TYPE resequencer_uptime_seconds gauge");
        let _ = writeln!(output, "resequencer_uptime_seconds {}\n", self.uptime_seconds());

        let sorted_counters: BTreeMap<_, _> = counters.iter().collect();
        for (name, counter) in sorted_counters {
            write_scalar(&mut output, name, "counter", counter.load(Ordering::Relaxed));
        }

        let sorted_gauges: BTreeMap<_, _> = gauges.iter().collect();
        for (name, gauge) in sorted_gauges {
            write_scalar(&mut output, name, "gauge", gauge.load(Ordering::Relaxed));
        }

        let sorted_histograms: BTreeMap<_, _> = histograms.iter().collect();
        for (name, histogram) in sorted_histograms {
            output.push_str(&histogram.to_prometheus(name));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn prometheus_name(name: &str) -> String {
    name.replace(['.', '-'], "_")
}

fn write_scalar(output: &mut String, name: &str, kind: &str, value: u64) {
    let prom = prometheus_name(name);
    if let Some(help) = metric_names::help(name) {
        let _ = writeln!(output, "# HELP {} {}", prom, help);
    }
    let _ = writeln!(output, "# TYPE {} {}", prom, kind);
    let _ = writeln!(output, "{} {}", prom, value);
}

/// Fixed-bucket histogram
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    /// Sum of observations in microseconds
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        let micros = (value.max(0.0) * 1_000_000.0) as u64;
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        if let Some(i) = self.buckets.iter().position(|bucket| value <= *bucket) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn to_json(&self) -> serde_json::Value {
        let bucket_counts: Vec<u64> = self
            .counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();

        serde_json::json!({
            "buckets": self.buckets,
            "counts": bucket_counts,
            "sum": self.sum(),
            "count": self.count(),
        })
    }

    pub fn to_prometheus(&self, name: &str) -> String {
        let prom = prometheus_name(name);
        let mut output = String::new();

        if let Some(help) = metric_names::help(name) {
            let _ = writeln!(output, "# HELP {} {}", prom, help);
        }
        let _ = writeln!(output, "# TYPE {} histogram", prom);

        let mut cumulative = 0u64;
        for (bucket, count) in self.buckets.iter().zip(&self.counts) {
            cumulative += count.load(Ordering::Relaxed);
            let _ = writeln!(output, "{}_bucket{{le=\"{}\"}} {}", prom, bucket, cumulative);
        }

        let _ = writeln!(output, "{}_bucket{{le=\"+Inf\"}} {}", prom, self.count());
        let _ = writeln!(output, "{}_sum {}", prom, self.sum());
        let _ = writeln!(output, "{}_count {}", prom, self.count());

        output
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // Latency buckets in seconds
        Self::new(vec![
            0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ])
    }
}

/// Predefined metric names
pub mod metric_names {
    // Ingest
    pub const MESSAGES_LOGGED: &str = "resequencer.messages.logged";
    pub const MESSAGES_APPLIED: &str = "resequencer.messages.applied";
    pub const INGESTS_DEFERRED: &str = "resequencer.ingests.deferred";

    // Errors
    pub const APPLY_FAILURES: &str = "resequencer.errors.apply";
    pub const LOG_WRITE_FAILURES: &str = "resequencer.errors.log_write";

    // Latency
    pub const RECONCILE_LATENCY: &str = "resequencer.reconcile.latency_seconds";

    // Projections
    pub const ROCKETS_TRACKED: &str = "resequencer.rockets.tracked";

    // HTTP
    pub const HTTP_REQUESTS_ACTIVE: &str = "resequencer.http.requests_active";
    pub const HTTP_REQUESTS_TOTAL: &str = "resequencer.http.requests_total";

    pub(super) fn help(name: &str) -> Option<&'static str> {
        let help = match name {
            MESSAGES_LOGGED => "Messages durably appended to the log",
            MESSAGES_APPLIED => "Messages folded into a projection",
            INGESTS_DEFERRED => "Ingests logged before their channel's first message",
            APPLY_FAILURES => "Messages that could not be applied",
            LOG_WRITE_FAILURES => "Failed appends to the message log",
            RECONCILE_LATENCY => "Time spent folding and persisting a channel",
            ROCKETS_TRACKED => "Projections currently stored",
            HTTP_REQUESTS_ACTIVE => "HTTP requests in flight",
            HTTP_REQUESTS_TOTAL => "HTTP requests handled since start",
            _ => return None,
        };
        Some(help)
    }
}

/// Time an async operation into a histogram
pub async fn timed<F, T>(metrics: &MetricsRegistry, metric_name: &str, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    metrics
        .observe_histogram(metric_name, start.elapsed().as_secs_f64())
        .await;
    result
}
