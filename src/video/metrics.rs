//! Per-frame codec statistics
//!
//! Contexts report every successful encode/decode to an optional observer.
//! Nothing is collected unless one is attached.

use parking_lot::Mutex;
use std::time::Duration;

/// Statistics for one processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame sequence number within the context (the encoder's pts)
    pub sequence: u64,
    pub input_bytes: usize,
    pub output_bytes: usize,
    /// Time spent inside the codec call
    pub elapsed: Duration,
}

/// Metrics sink for encoder and decoder contexts
pub trait CodecObserver: Send + Sync {
    fn on_encode(&self, _stats: &FrameStats) {}

    fn on_decode(&self, _stats: &FrameStats) {}
}

/// Aggregated timings for one direction
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub frames: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl StatsSummary {
    fn record(&mut self, stats: &FrameStats) {
        if self.frames == 0 || stats.elapsed < self.min {
            self.min = stats.elapsed;
        }
        if stats.elapsed > self.max {
            self.max = stats.elapsed;
        }
        self.frames += 1;
        self.input_bytes += stats.input_bytes as u64;
        self.output_bytes += stats.output_bytes as u64;
        self.total += stats.elapsed;
    }

    pub fn mean(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        self.total / self.frames as u32
    }

    /// Input bytes per output byte over all frames
    pub fn compression_ratio(&self) -> f64 {
        if self.output_bytes == 0 {
            return 0.0;
        }
        self.input_bytes as f64 / self.output_bytes as f64
    }

    /// Frames per second over the accumulated codec time
    pub fn fps(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.frames as f64 / secs
    }
}

/// Observer that accumulates encode and decode summaries
#[derive(Debug, Default)]
pub struct StatsCollector {
    encode: Mutex<StatsSummary>,
    decode: Mutex<StatsSummary>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode_summary(&self) -> StatsSummary {
        *self.encode.lock()
    }

    pub fn decode_summary(&self) -> StatsSummary {
        *self.decode.lock()
    }

    pub fn reset(&self) {
        *self.encode.lock() = StatsSummary::default();
        *self.decode.lock() = StatsSummary::default();
    }
}

impl CodecObserver for StatsCollector {
    fn on_encode(&self, stats: &FrameStats) {
        self.encode.lock().record(stats);
    }

    fn on_decode(&self, stats: &FrameStats) {
        self.decode.lock().record(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(ms: u64, input: usize, output: usize) -> FrameStats {
        FrameStats {
            sequence: 0,
            input_bytes: input,
            output_bytes: output,
            elapsed: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_collector_summary() {
        let collector = StatsCollector::new();
        collector.on_encode(&stats(4, 100, 10));
        collector.on_encode(&stats(2, 100, 20));
        collector.on_decode(&stats(1, 10, 100));

        let enc = collector.encode_summary();
        assert_eq!(enc.frames, 2);
        assert_eq!(enc.min, Duration::from_millis(2));
        assert_eq!(enc.max, Duration::from_millis(4));
        assert_eq!(enc.mean(), Duration::from_millis(3));
        assert_eq!(enc.output_bytes, 30);
        assert_eq!(collector.decode_summary().frames, 1);

        collector.reset();
        assert_eq!(collector.encode_summary().frames, 0);
    }

    #[test]
    fn test_compression_ratio() {
        let collector = StatsCollector::new();
        assert_eq!(collector.encode_summary().compression_ratio(), 0.0);
        collector.on_encode(&stats(1, 100, 10));
        collector.on_encode(&stats(1, 100, 40));
        assert!((collector.encode_summary().compression_ratio() - 4.0).abs() < f64::EPSILON);
    }
}
