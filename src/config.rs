//! Settings file support.
//!
//! Settings are stored in TOML format at:
//! - Linux: `~/.config/beatkeeper/config.toml`
//! - macOS: `~/Library/Application Support/beatkeeper/config.toml`
//! - Windows: `%APPDATA%\beatkeeper\config\config.toml`

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::AudioConfig;
use crate::error::ConfigError;
use crate::metronome::scheduler::DEFAULT_LOOKAHEAD;
use crate::metronome::tempo::{DEFAULT_TEMPO, clamp_tempo};
use crate::metronome::{BeatPattern, SchedulerConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub metronome: MetronomeSettings,
    pub audio: AudioSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    /// Beats per minute
    pub tempo: f64,
    pub beats: BeatPattern,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            beats: BeatPattern::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Output gain, 0.0 to 1.0
    pub volume: f32,
    /// Output device name; the host default when unset
    pub device: Option<String>,
    /// WAV files replacing the synthesized clicks
    pub accented_sample: Option<PathBuf>,
    pub normal_sample: Option<PathBuf>,
    pub soft_sample: Option<PathBuf>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: AudioConfig::default().volume,
            device: None,
            accented_sample: None,
            normal_sample: None,
            soft_sample: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub lookahead_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lookahead_ms: DEFAULT_LOOKAHEAD.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&content)?;
        settings.metronome.tempo = clamp_tempo(settings.metronome.tempo);
        settings.audio.volume = settings.audio.volume.clamp(0.0, 1.0);
        log::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        log::debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Default settings file location.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "beatkeeper")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            lookahead: Duration::from_millis(self.scheduler.lookahead_ms.max(1)),
        }
    }

    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            volume: self.audio.volume,
            ..AudioConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metronome::{Beat, BeatKind};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.metronome.beats.len(), 4);
        assert_eq!(settings.scheduler_config().lookahead, Duration::from_millis(100));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.metronome.tempo = 96.0;
        settings.metronome.beats = BeatPattern::from_beats(vec![
            Beat::new(BeatKind::Accented),
            Beat {
                kind: BeatKind::Muted,
                layout_break: true,
            },
            Beat::new(BeatKind::Soft),
        ])
        .unwrap();
        settings.audio.device = Some("Speakers".to_string());
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[metronome]
tempo = 1000.0
beats = [{ kind = "accented" }, { kind = "normal", layout_break = true }]

[future]
unknown = 1
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.metronome.tempo, 400.0);
        assert_eq!(
            settings.metronome.beats.beat_at(0).unwrap().kind,
            BeatKind::Accented
        );
        assert!(settings.metronome.beats.beat_at(1).unwrap().layout_break);
        assert_eq!(settings.audio, AudioSettings::default());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[metronome]\nbeats = []\n").unwrap();

        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }
}
