pub mod controller;
pub mod pattern;
pub mod scheduler;
pub mod tempo;
pub mod timer;

pub use controller::{PlaybackController, PlaybackState};
pub use pattern::{Beat, BeatKind, BeatPattern};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use tempo::{MAX_TEMPO, MIN_TEMPO, TapTempo, clamp_tempo};
pub use timer::{Deferrer, ManualTimer, ThreadTimer, TimerHandle};

use crate::error::MetronomeError;

/// Notifications from the scheduler to whoever drives the display.
#[derive(Debug, Clone, PartialEq)]
pub enum MetronomeEvent {
    /// Beat `index` is sounding now; `at` is its scheduled clock time.
    Beat {
        index: usize,
        kind: BeatKind,
        at: f64,
    },
    Started,
    Stopped,
    TempoChanged(f64),
    PatternChanged,
    Error(MetronomeError),
}
