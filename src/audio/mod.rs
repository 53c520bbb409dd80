pub mod clock;
pub mod io;
pub mod mixer;
pub mod queue;
pub mod renderer;
pub mod sound;
pub mod stream;

pub use clock::{AudioClock, FrameClock, ManualClock};
pub use io::{export_wav, import_wav};
pub use renderer::{ClickRenderer, render_offline};
pub use sound::{ClickBank, RecordedTrigger, RecordingSource, SoundSource, TriggerHandle};
pub use stream::{AudioStream, CpalSoundSource, enumerate_output_devices};

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub volume: f32,
    pub voice_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 0.8,
            voice_queue_capacity: 256,
        }
    }
}

/// Notifications from the audio thread to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Error(String),
    VoicesDropped(u64),
}
