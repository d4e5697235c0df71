//! ## hearth-telemetry::metrics
//! **Prometheus gauges and counters for the runtime**

use hearth_core::alloc::MemoryStats;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub live_bytes: IntGauge,
    pub peak_bytes: IntGauge,
    pub live_allocations: IntGauge,
    pub events_fired: IntCounter,
    pub plugins_loaded: IntGauge,
    pub frames: IntCounter,
    pub frame_time: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let live_bytes = IntGauge::new("hearth_memory_live_bytes", "Bytes held by live allocations")?;
        let peak_bytes = IntGauge::new("hearth_memory_peak_bytes", "Highest observed live bytes")?;
        let live_allocations =
            IntGauge::new("hearth_memory_live_allocations", "Allocations not yet freed")?;
        let events_fired = IntCounter::new("hearth_events_fired_total", "Events dispatched by the bus")?;
        let plugins_loaded = IntGauge::new("hearth_plugins_loaded", "Currently installed plugins")?;
        let frames = IntCounter::new("hearth_frames_total", "Completed loop iterations")?;
        let frame_time = Histogram::with_opts(
            HistogramOpts::new("hearth_frame_seconds", "Wall time per frame")
                .buckets(vec![0.001, 0.004, 0.008, 0.016, 0.033, 0.1]),
        )?;

        registry.register(Box::new(live_bytes.clone()))?;
        registry.register(Box::new(peak_bytes.clone()))?;
        registry.register(Box::new(live_allocations.clone()))?;
        registry.register(Box::new(events_fired.clone()))?;
        registry.register(Box::new(plugins_loaded.clone()))?;
        registry.register(Box::new(frames.clone()))?;
        registry.register(Box::new(frame_time.clone()))?;

        Ok(Self {
            registry,
            live_bytes,
            peak_bytes,
            live_allocations,
            events_fired,
            plugins_loaded,
            frames,
            frame_time,
        })
    }

    pub fn observe_memory(&self, stats: &MemoryStats) {
        self.live_bytes.set(saturating_i64(stats.live_bytes as u64));
        self.peak_bytes.set(saturating_i64(stats.peak_bytes as u64));
        self.live_allocations.set(saturating_i64(stats.live_records as u64));
    }

    /// Advances the fired-events counter to the bus' running total.
    pub fn observe_events(&self, total_fired: u64) {
        let seen = self.events_fired.get();
        if total_fired > seen {
            self.events_fired.inc_by(total_fired - seen);
        }
    }

    pub fn set_plugins_loaded(&self, loaded: usize) {
        self.plugins_loaded.set(saturating_i64(loaded as u64));
    }

    pub fn observe_frame(&self, seconds: f64) {
        self.frames.inc();
        self.frame_time.observe(seconds);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
