pub mod audio;
pub mod config;
pub mod error;
pub mod metronome;
pub mod ui;

pub use audio::{AudioConfig, AudioStream};
pub use config::Settings;
pub use error::{ConfigError, MetronomeError};
pub use metronome::{PlaybackController, Scheduler};
pub use ui::TerminalUI;
