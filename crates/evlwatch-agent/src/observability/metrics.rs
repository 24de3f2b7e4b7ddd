//! Internal metrics for the watch engine
//!
//! Counters, gauges and latency histograms kept in a process-wide registry.
//! Nothing is exported over the network; the daemon logs a snapshot after
//! each cycle at debug level.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// Monotonically increasing value
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Value that is overwritten
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Upper bounds of the latency buckets, in milliseconds
const LATENCY_BUCKETS_MS: [f64; 10] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0, 5000.0, 30000.0];

/// Latency distribution in milliseconds
#[derive(Debug)]
pub struct Histogram {
    counts: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    /// Sum in microseconds
    sum_us: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }
}

impl Histogram {
    pub fn observe_ms(&self, ms: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add((ms * 1000.0) as u64, Ordering::Relaxed);

        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.counts[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe(&self, duration: Duration) {
        self.observe_ms(duration.as_secs_f64() * 1000.0);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ms(&self) -> f64 {
        self.sum_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn average_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum_ms() / n as f64,
        }
    }

    /// Observations per bucket, the last one being the overflow bucket
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

/// Records the elapsed time into a histogram when dropped
pub struct Timer {
    start: Instant,
    histogram: Arc<Histogram>,
}

impl Timer {
    pub fn start(histogram: Arc<Histogram>) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed());
    }
}

/// Named metrics, created on first use
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
    gauges: RwLock<BTreeMap<String, Arc<Gauge>>>,
    histograms: RwLock<BTreeMap<String, Arc<Histogram>>>,
}

fn get_or_create<T: Default>(map: &RwLock<BTreeMap<String, Arc<T>>>, name: &str) -> Arc<T> {
    if let Some(existing) = map.read().get(name) {
        return existing.clone();
    }
    map.write().entry(name.to_string()).or_default().clone()
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> Arc<Counter> {
        get_or_create(&self.counters, name)
    }

    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        get_or_create(&self.gauges, name)
    }

    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        get_or_create(&self.histograms, name)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.read().iter().map(|(k, v)| (k.clone(), v.get())).collect(),
            gauges: self.gauges.read().iter().map(|(k, v)| (k.clone(), v.get())).collect(),
            histograms: self
                .histograms
                .read()
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        HistogramSnapshot {
                            count: v.count(),
                            sum_ms: v.sum_ms(),
                            average_ms: v.average_ms(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_ms: f64,
    pub average_ms: f64,
}

/// Point-in-time copy of every metric
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

static METRICS: std::sync::OnceLock<MetricsRegistry> = std::sync::OnceLock::new();

/// Process-wide registry
pub fn metrics() -> &'static MetricsRegistry {
    METRICS.get_or_init(MetricsRegistry::new)
}

pub fn cycles_total() -> Arc<Counter> {
    metrics().counter("evlwatch_cycles_total")
}

pub fn records_scanned() -> Arc<Counter> {
    metrics().counter("evlwatch_records_scanned_total")
}

pub fn lines_emitted() -> Arc<Counter> {
    metrics().counter("evlwatch_lines_emitted_total")
}

/// Logs reported as `missing` because they could not be opened
pub fn logs_missing() -> Arc<Counter> {
    metrics().counter("evlwatch_logs_missing_total")
}

/// Dumps cut short by a size, entry or time budget
pub fn budget_stops() -> Arc<Counter> {
    metrics().counter("evlwatch_budget_stops_total")
}

pub fn tracked_logs() -> Arc<Gauge> {
    metrics().gauge("evlwatch_tracked_logs")
}

pub fn cycle_latency() -> Arc<Histogram> {
    metrics().histogram("evlwatch_cycle_latency_ms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_gauge() {
        let counter = Counter::default();
        counter.inc();
        counter.inc_by(4);
        assert_eq!(counter.get(), 5);

        let gauge = Gauge::default();
        gauge.set(7);
        gauge.set(3);
        assert_eq!(gauge.get(), 3);
    }

    #[test]
    fn test_histogram_buckets() {
        let histogram = Histogram::default();
        histogram.observe_ms(0.5);
        histogram.observe_ms(20.0);
        histogram.observe_ms(60_000.0);

        assert_eq!(histogram.count(), 3);
        let buckets = histogram.bucket_counts();
        assert_eq!(buckets[0], 1);
        assert_eq!(buckets[3], 1);
        assert_eq!(buckets[LATENCY_BUCKETS_MS.len()], 1);
        assert!((histogram.average_ms() - 20006.833).abs() < 0.01);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let histogram = Arc::new(Histogram::default());
        {
            let _timer = Timer::start(histogram.clone());
        }
        assert_eq!(histogram.count(), 1);
    }

    #[test]
    fn test_registry_shares_by_name() {
        let registry = MetricsRegistry::new();
        registry.counter("a").inc();
        registry.counter("a").inc();
        registry.gauge("g").set(9);
        registry.histogram("h").observe_ms(2.0);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counters.get("a"), Some(&2));
        assert_eq!(snapshot.gauges.get("g"), Some(&9));
        assert_eq!(snapshot.histograms["h"].count, 1);
    }
}
