use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Monotonic time source the scheduler plans against, in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
    fn resume(&self);
    fn suspend(&self);
    fn is_running(&self) -> bool;
}

/// Clock driven by the output stream: time is frames rendered / sample rate.
///
/// The audio callback calls [`FrameClock::advance`] once per block, and only
/// while the clock is running.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    fn resume(&self) {
        self.running.store(true, Ordering::Release);
    }

    fn suspend(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Externally stepped clock for offline simulation and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
    running: AtomicBool,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
            running: AtomicBool::new(false),
        }
    }

    /// Move time forward to `time`; earlier values are ignored.
    pub fn set(&self, time: f64) {
        if let Ok(mut now) = self.now.lock()
            && time > *now
        {
            *now = time;
        }
    }

    #[cfg(test)]
    pub fn advance(&self, seconds: f64) {
        let target = self.now() + seconds;
        self.set(target);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|now| *now).unwrap_or(0.0)
    }

    fn resume(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    fn suspend(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_time() {
        let clock = FrameClock::new(48000);
        assert_eq!(clock.now(), 0.0);
        clock.advance(24000);
        assert!((clock.now() - 0.5).abs() < 1e-12);
        assert_eq!(clock.seconds_to_frame(1.25), 60000);
    }

    #[test]
    fn test_frame_clock_resume_suspend() {
        let clock = FrameClock::new(44100);
        assert!(!clock.is_running());
        clock.resume();
        assert!(clock.is_running());
        let shared = clock.clone();
        shared.suspend();
        assert!(!clock.is_running());
    }

    #[test]
    fn test_manual_clock_is_monotonic() {
        let clock = ManualClock::new(2.0);
        clock.advance(0.5);
        assert_eq!(clock.now(), 2.5);
        clock.set(1.0);
        assert_eq!(clock.now(), 2.5);
    }
}
