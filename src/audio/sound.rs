use anyhow::Result;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::io::import_wav;
use crate::metronome::BeatKind;

/// Identifies one scheduled sound so it can be cancelled before it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(pub u64);

/// Plays beat sounds at clock times, including times in the future.
pub trait SoundSource: Send + Sync {
    fn trigger(&self, kind: BeatKind, at: f64) -> TriggerHandle;

    /// Silence a sound that has not started yet. Unknown or already played
    /// handles are ignored.
    fn cancel(&self, handle: TriggerHandle);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedTrigger {
    pub handle: TriggerHandle,
    pub kind: BeatKind,
    pub at: f64,
}

/// Sound source that only remembers what it was asked to play.
#[derive(Debug, Default)]
pub struct RecordingSource {
    next_id: AtomicU64,
    triggers: Mutex<Vec<RecordedTrigger>>,
    cancelled: Mutex<Vec<TriggerHandle>>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every trigger in call order, cancelled ones included.
    pub fn triggers(&self) -> Vec<RecordedTrigger> {
        self.triggers.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn cancelled(&self) -> Vec<TriggerHandle> {
        self.cancelled.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Triggers that were never cancelled.
    pub fn audible(&self) -> Vec<RecordedTrigger> {
        let cancelled = self.cancelled();
        self.triggers()
            .into_iter()
            .filter(|t| !cancelled.contains(&t.handle))
            .collect()
    }
}

impl SoundSource for RecordingSource {
    fn trigger(&self, kind: BeatKind, at: f64) -> TriggerHandle {
        let handle = TriggerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut triggers) = self.triggers.lock() {
            triggers.push(RecordedTrigger { handle, kind, at });
        }
        handle
    }

    fn cancel(&self, handle: TriggerHandle) {
        if let Ok(mut cancelled) = self.cancelled.lock()
            && !cancelled.contains(&handle)
        {
            cancelled.push(handle);
        }
    }
}

/// Mono click samples for each audible beat kind, at the output sample rate.
#[derive(Debug, Clone)]
pub struct ClickBank {
    accented: Vec<f32>,
    normal: Vec<f32>,
    soft: Vec<f32>,
}

impl ClickBank {
    const CLICK_DURATION_MS: f32 = 40.0;

    /// Decaying sine clicks: accented is highest and loudest, soft lowest and quietest.
    pub fn synthesized(sample_rate: u32) -> Self {
        Self {
            accented: Self::tone(sample_rate, 1760.0, 0.9),
            normal: Self::tone(sample_rate, 1320.0, 0.6),
            soft: Self::tone(sample_rate, 880.0, 0.3),
        }
    }

    /// Load WAV files where given, falling back to synthesized clicks per kind.
    pub fn load(
        sample_rate: u32,
        accented: Option<&Path>,
        normal: Option<&Path>,
        soft: Option<&Path>,
    ) -> Result<Self> {
        let mut bank = Self::synthesized(sample_rate);
        if let Some(path) = accented {
            bank.accented = import_wav(path, sample_rate)?;
        }
        if let Some(path) = normal {
            bank.normal = import_wav(path, sample_rate)?;
        }
        if let Some(path) = soft {
            bank.soft = import_wav(path, sample_rate)?;
        }
        Ok(bank)
    }

    pub fn sample(&self, kind: BeatKind) -> &[f32] {
        match kind {
            BeatKind::Accented => &self.accented,
            BeatKind::Normal => &self.normal,
            BeatKind::Soft => &self.soft,
            BeatKind::Muted => &[],
        }
    }

    fn tone(sample_rate: u32, freq: f32, gain: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * Self::CLICK_DURATION_MS / 1000.0) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let envelope = (1.0 - i as f32 / len as f32).powi(3);
                (2.0 * std::f32::consts::PI * freq * t).sin() * envelope * gain
            })
            .collect()
    }
}
