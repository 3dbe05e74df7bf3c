//! Media clock utilities for export timestamps.
//!
//! Video and audio are timestamped independently during export:
//! - Video frames by index: `frame_index * 1_000_000 / fps` microseconds
//! - Audio blocks by the running sample count:
//!   `cumulative_samples * 1_000_000 / sample_rate` microseconds
//!
//! Both clocks start at zero when the export session starts.

/// Maps frame indices to presentation timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock for the given frame rate. A rate of zero is treated as 1.
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    /// Frame rate this clock was built with.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Presentation timestamp of a frame in microseconds.
    pub fn timestamp_us(&self, frame_index: u64) -> u64 {
        frame_index * 1_000_000 / self.fps as u64
    }

    /// Playback time of a frame in seconds.
    pub fn time_secs(&self, frame_index: u64) -> f64 {
        frame_index as f64 / self.fps as f64
    }

    /// Number of frames needed to cover `duration_secs`.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.fps as f64).ceil() as u64
    }
}

/// Running sample counter for an audio stream.
#[derive(Debug, Clone, Copy)]
pub struct SampleClock {
    sample_rate: u32,
    cumulative_samples: u64,
}

impl SampleClock {
    /// Create a clock at sample zero. A rate of zero is treated as 1.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            cumulative_samples: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples accounted for so far.
    pub fn cumulative_samples(&self) -> u64 {
        self.cumulative_samples
    }

    /// Timestamp of the next block in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.cumulative_samples * 1_000_000 / self.sample_rate as u64
    }

    /// Elapsed stream time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.cumulative_samples as f64 / self.sample_rate as f64
    }

    /// Stream time in seconds after `frames` more samples.
    pub fn secs_after(&self, frames: u64) -> f64 {
        (self.cumulative_samples + frames) as f64 / self.sample_rate as f64
    }

    /// Advance the counter by a block of `frames` samples.
    pub fn advance(&mut self, frames: u64) {
        self.cumulative_samples += frames;
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// End timestamp of the reference stream (µs).
    pub reference_us: u64,
    /// End timestamp of the measured stream (µs).
    pub measured_us: u64,
}

impl DriftMeasurement {
    /// Drift in microseconds (positive = measured is ahead).
    pub fn drift_us(&self) -> i64 {
        self.measured_us as i64 - self.reference_us as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_us() as f64 / 1_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timestamps() {
        let clock = FrameClock::new(30);
        assert_eq!(clock.timestamp_us(0), 0);
        assert_eq!(clock.timestamp_us(1), 33_333);
        assert_eq!(clock.timestamp_us(30), 1_000_000);
        assert_eq!(clock.timestamp_us(45), 1_500_000);
    }

    #[test]
    fn test_frame_count_rounds_up() {
        let clock = FrameClock::new(30);
        assert_eq!(clock.frame_count(1.0), 30);
        assert_eq!(clock.frame_count(1.01), 31);
        assert_eq!(clock.frame_count(0.0), 0);
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        let clock = FrameClock::new(0);
        assert_eq!(clock.fps(), 1);
        assert_eq!(clock.timestamp_us(2), 2_000_000);
    }

    #[test]
    fn test_sample_clock_accumulates() {
        let mut clock = SampleClock::new(48_000);
        assert_eq!(clock.timestamp_us(), 0);
        clock.advance(128);
        assert_eq!(clock.timestamp_us(), 2_666);
        clock.advance(48_000 - 128);
        assert_eq!(clock.timestamp_us(), 1_000_000);
        assert!((clock.elapsed_secs() - 1.0).abs() < 1e-12);
        assert!((clock.secs_after(24_000) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_us: 1_000_000,
            measured_us: 1_050_000,
        };
        assert_eq!(drift.drift_us(), 50_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }
}
