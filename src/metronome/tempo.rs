use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const MIN_TEMPO: f64 = 20.0;
pub const MAX_TEMPO: f64 = 400.0;
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Clamp user input to the supported range. Non-finite input falls back to the default.
pub fn clamp_tempo(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_TEMPO, MAX_TEMPO)
    } else {
        DEFAULT_TEMPO
    }
}

/// Seconds per beat at `bpm`.
pub fn beat_duration(bpm: f64) -> f64 {
    60.0 / bpm
}

/// Tempo from the average interval of recent taps.
#[derive(Debug, Clone, Default)]
pub struct TapTempo {
    taps: VecDeque<Instant>,
}

impl TapTempo {
    const MAX_TAPS: usize = 4;
    const MIN_INTERVAL: Duration = Duration::from_millis(150);
    const MAX_INTERVAL: Duration = Duration::from_secs(3);

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap. Returns the measured tempo once two or more taps are in range.
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        if let Some(&last) = self.taps.back() {
            let elapsed = now.saturating_duration_since(last);
            if !(Self::MIN_INTERVAL..=Self::MAX_INTERVAL).contains(&elapsed) {
                self.taps.clear();
            }
        }

        self.taps.push_back(now);
        if self.taps.len() > Self::MAX_TAPS {
            self.taps.pop_front();
        }

        let (first, last) = (self.taps.front()?, self.taps.back()?);
        if self.taps.len() < 2 {
            return None;
        }
        let total = last.duration_since(*first).as_secs_f64();
        let avg_interval = total / (self.taps.len() - 1) as f64;
        Some(clamp_tempo(60.0 / avg_interval))
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}
