//! Key handling and screen state, independent of the terminal backend.

use crossbeam::channel::Receiver;
use crossterm::event::{KeyCode, KeyEvent};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::audio::AudioEvent;
use crate::config::Settings;
use crate::metronome::{
    BeatPattern, MAX_TEMPO, MIN_TEMPO, MetronomeEvent, PlaybackController, PlaybackState,
};

const STATUS_DURATION: Duration = Duration::from_secs(3);
const MAX_INPUT_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    SetBpm,
    SetBeats,
    ConfirmReset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderStatus {
    InputPrompt(String, String), // (prompt, current_input)
    Success(String),
    Error(String),
    Cancelled,
}

pub struct App {
    controller: PlaybackController,
    settings: Settings,
    settings_path: Option<PathBuf>,
    audio_events: Option<Receiver<AudioEvent>>,
    selected: usize,
    input_mode: Option<InputMode>,
    input_buffer: String,
    header_status: Option<HeaderStatus>,
    status_timer: Option<Instant>,
    is_running: bool,
}

impl App {
    /// `settings_path` of None keeps edits in memory only.
    pub fn new(
        controller: PlaybackController,
        settings: Settings,
        settings_path: Option<PathBuf>,
    ) -> Self {
        Self {
            controller,
            settings,
            settings_path,
            audio_events: None,
            selected: 0,
            input_mode: None,
            input_buffer: String::new(),
            header_status: None,
            status_timer: None,
            is_running: true,
        }
    }

    pub fn with_audio_events(mut self, events: Receiver<AudioEvent>) -> Self {
        self.audio_events = Some(events);
        self
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn pattern(&self) -> BeatPattern {
        self.controller.scheduler().pattern()
    }

    pub fn tempo(&self) -> f64 {
        self.controller.tempo()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn now_playing(&self) -> Option<usize> {
        self.controller.now_playing()
    }

    pub fn header_status(&self) -> Option<&HeaderStatus> {
        self.header_status.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Drain scheduler and audio events and expire the status line.
    pub fn tick(&mut self) {
        for event in self.controller.poll_events() {
            if let MetronomeEvent::Error(err) = event {
                self.show_error(&err.to_string());
            }
        }

        let audio_events: Vec<AudioEvent> = self
            .audio_events
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for event in audio_events {
            match event {
                AudioEvent::Error(message) => self.show_error(&message),
                AudioEvent::VoicesDropped(count) => {
                    self.show_error(&format!("{} clicks dropped", count))
                }
            }
        }

        if let Some(timer) = self.status_timer
            && timer.elapsed() >= STATUS_DURATION
        {
            self.header_status = None;
            self.status_timer = None;
        }
    }

    /// Stop playback and persist the current state.
    pub fn shutdown(&mut self) {
        self.controller.stop();
        self.save_settings();
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if let Some(mode) = self.input_mode {
            self.handle_input_key(key, mode);
            return;
        }

        let len = self.controller.scheduler().pattern().len();
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => self.is_running = false,
            KeyCode::Char(' ') => {
                self.controller.toggle();
            }
            KeyCode::Left => self.selected = (self.selected + len - 1) % len,
            KeyCode::Right => self.selected = (self.selected + 1) % len,
            KeyCode::Enter => {
                let result = self.controller.scheduler().toggle_kind(self.selected);
                self.after_pattern_edit(result.map(|_| ()));
            }
            KeyCode::Char('l') | KeyCode::Char('L') => {
                let result = self
                    .controller
                    .scheduler()
                    .toggle_layout_break(self.selected);
                self.after_pattern_edit(result.map(|_| ()));
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.nudge_tempo(1.0),
            KeyCode::Char('-') => self.nudge_tempo(-1.0),
            KeyCode::PageUp => self.nudge_tempo(10.0),
            KeyCode::PageDown => self.nudge_tempo(-10.0),
            KeyCode::Char(']') => self.resize(len + 1),
            KeyCode::Char('[') => self.resize(len.saturating_sub(1)),
            KeyCode::Char('t') | KeyCode::Char('T') => self.start_input_mode(
                InputMode::SetBpm,
                &format!("Set BPM ({}-{}):", MIN_TEMPO, MAX_TEMPO),
            ),
            KeyCode::Char('n') | KeyCode::Char('N') => {
                self.start_input_mode(InputMode::SetBeats, "Beats per bar:")
            }
            KeyCode::Char('b') | KeyCode::Char('B') => {
                if let Some(bpm) = self.controller.tap(Instant::now()) {
                    self.show_success(&format!("Tap tempo: {} BPM", bpm));
                    self.save_settings();
                }
            }
            KeyCode::Char('x') | KeyCode::Char('X') => {
                self.start_input_mode(InputMode::ConfirmReset, "Reset to defaults? (y/n)")
            }
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent, mode: InputMode) {
        if mode == InputMode::ConfirmReset {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.exit_input_mode();
                    self.reset();
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.exit_input_mode();
                    self.show_cancelled();
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => {
                self.exit_input_mode();
                self.show_cancelled();
            }
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.input_buffer);
                self.exit_input_mode();
                self.apply_input(mode, input.trim());
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                self.update_input_display();
            }
            KeyCode::Char(c)
                if self.input_buffer.len() < MAX_INPUT_LEN
                    && (c.is_ascii_digit() || (c == '.' && mode == InputMode::SetBpm)) =>
            {
                self.input_buffer.push(c);
                self.update_input_display();
            }
            _ => {}
        }
    }

    fn apply_input(&mut self, mode: InputMode, input: &str) {
        match mode {
            InputMode::SetBpm => match input.parse::<f64>() {
                Ok(bpm) => {
                    let applied = self.controller.set_tempo(bpm);
                    self.show_success(&format!("Tempo set to {} BPM", applied));
                    self.save_settings();
                }
                Err(_) => self.show_error(&format!("Invalid BPM: '{}'", input)),
            },
            InputMode::SetBeats => match input.parse::<usize>() {
                Ok(count) => self.resize(count),
                Err(_) => self.show_error(&format!("Invalid beat count: '{}'", input)),
            },
            InputMode::ConfirmReset => {}
        }
    }

    fn nudge_tempo(&mut self, delta: f64) {
        self.controller.nudge_tempo(delta);
        self.save_settings();
    }

    fn resize(&mut self, len: usize) {
        let result = self.controller.scheduler().resize(len);
        self.after_pattern_edit(result);
    }

    fn reset(&mut self) {
        let defaults = Settings::default();
        let scheduler = self.controller.scheduler();
        let beats = defaults.metronome.beats.beats().to_vec();
        match scheduler.set_pattern(beats) {
            Ok(()) => {
                self.controller.set_tempo(defaults.metronome.tempo);
                self.controller.clear_taps();
                self.selected = 0;
                self.show_success("Reset to defaults");
                self.save_settings();
            }
            Err(err) => self.show_error(&err.to_string()),
        }
    }

    fn after_pattern_edit(&mut self, result: crate::error::Result<()>) {
        match result {
            Ok(()) => {
                let len = self.controller.scheduler().pattern().len();
                self.selected = self.selected.min(len - 1);
                self.save_settings();
            }
            Err(err) => self.show_error(&err.to_string()),
        }
    }

    /// Copy tempo and pattern into the settings and write them out.
    fn save_settings(&mut self) {
        self.settings.metronome.tempo = self.controller.tempo();
        self.settings.metronome.beats = self.controller.scheduler().pattern();

        let Some(path) = &self.settings_path else {
            return;
        };
        if let Err(err) = self.settings.save(path) {
            log::error!("Failed to save settings: {}", err);
            self.show_error(&format!("Failed to save settings: {}", err));
        }
    }

    fn start_input_mode(&mut self, mode: InputMode, prompt: &str) {
        self.input_mode = Some(mode);
        self.input_buffer.clear();
        self.header_status = Some(HeaderStatus::InputPrompt(
            prompt.to_string(),
            String::new(),
        ));
        self.status_timer = None;
    }

    fn exit_input_mode(&mut self) {
        self.input_mode = None;
        self.input_buffer.clear();
        self.header_status = None;
    }

    fn update_input_display(&mut self) {
        if let Some(HeaderStatus::InputPrompt(prompt, _)) = &self.header_status {
            self.header_status = Some(HeaderStatus::InputPrompt(
                prompt.clone(),
                self.input_buffer.clone(),
            ));
        }
    }

    fn show_success(&mut self, message: &str) {
        self.header_status = Some(HeaderStatus::Success(message.to_string()));
        self.status_timer = Some(Instant::now());
    }

    fn show_error(&mut self, message: &str) {
        self.header_status = Some(HeaderStatus::Error(message.to_string()));
        self.status_timer = Some(Instant::now());
    }

    fn show_cancelled(&mut self) {
        self.header_status = Some(HeaderStatus::Cancelled);
        self.status_timer = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ManualClock, RecordingSource};
    use crate::metronome::{BeatKind, ManualTimer, Scheduler, SchedulerConfig};
    use crossbeam::channel::unbounded;
    use crossterm::event::KeyModifiers;
    use std::sync::Arc;

    fn app(settings_path: Option<PathBuf>) -> (App, Arc<ManualTimer>) {
        let clock = Arc::new(ManualClock::new(0.0));
        let timer = Arc::new(ManualTimer::new(Arc::clone(&clock)));
        let (tx, rx) = unbounded();
        let settings = Settings::default();
        let scheduler = Scheduler::new(
            settings.metronome.beats.clone(),
            settings.metronome.tempo,
            SchedulerConfig::default(),
            clock.clone(),
            Arc::new(RecordingSource::new()),
            timer.clone(),
            tx,
        );
        let controller = PlaybackController::new(scheduler, clock, rx);
        (App::new(controller, settings, settings_path), timer)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_space_toggles_playback() {
        let (mut app, timer) = app(None);
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.playback_state(), PlaybackState::Playing);

        timer.run_until(0.6);
        app.tick();
        assert_eq!(app.now_playing(), Some(1));

        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.playback_state(), PlaybackState::Stopped);
        assert_eq!(app.now_playing(), None);
    }

    #[test]
    fn test_selection_wraps() {
        let (mut app, _timer) = app(None);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.selected(), 3);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.selected(), 0);
    }

    #[test]
    fn test_edit_selected_beat() {
        let (mut app, _timer) = app(None);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('l'));

        let beat = app.pattern().beat_at(1).unwrap();
        assert_eq!(beat.kind, BeatKind::Accented);
        assert!(beat.layout_break);
        assert_eq!(app.settings().metronome.beats, app.pattern());
    }

    #[test]
    fn test_tempo_keys() {
        let (mut app, _timer) = app(None);
        press(&mut app, KeyCode::Char('+'));
        assert_eq!(app.tempo(), 121.0);
        press(&mut app, KeyCode::PageDown);
        assert_eq!(app.tempo(), 111.0);

        press(&mut app, KeyCode::Char('t'));
        type_str(&mut app, "9x0");
        assert_eq!(
            app.header_status(),
            Some(&HeaderStatus::InputPrompt(
                "Set BPM (20-400):".to_string(),
                "90".to_string()
            ))
        );
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.tempo(), 90.0);
        assert_eq!(app.settings().metronome.tempo, 90.0);
    }

    #[test]
    fn test_remove_last_beat_reports_error() {
        let (mut app, _timer) = app(None);
        press(&mut app, KeyCode::Char('n'));
        type_str(&mut app, "1");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.pattern().len(), 1);

        press(&mut app, KeyCode::Char('['));
        assert_eq!(app.pattern().len(), 1);
        assert!(matches!(app.header_status(), Some(HeaderStatus::Error(_))));

        press(&mut app, KeyCode::Char(']'));
        press(&mut app, KeyCode::Char(']'));
        assert_eq!(app.pattern().len(), 3);
    }

    #[test]
    fn test_selection_follows_shrink() {
        let (mut app, _timer) = app(None);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Char('['));
        assert_eq!(app.selected(), 2);
    }

    #[test]
    fn test_reset_needs_confirmation() {
        let (mut app, _timer) = app(None);
        press(&mut app, KeyCode::Char('+'));
        press(&mut app, KeyCode::Char(']'));

        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.header_status(), Some(&HeaderStatus::Cancelled));
        assert_eq!(app.pattern().len(), 5);

        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Char('y'));
        assert_eq!(app.pattern(), BeatPattern::default());
        assert_eq!(app.tempo(), 120.0);
    }

    #[test]
    fn test_edits_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let (mut app, _timer) = app(Some(path.clone()));

        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::PageUp);

        let saved = Settings::load(&path).unwrap();
        assert_eq!(saved.metronome.tempo, 130.0);
        assert_eq!(
            saved.metronome.beats.beat_at(0).unwrap().kind,
            BeatKind::Accented
        );
    }

    #[test]
    fn test_quit() {
        let (mut app, _timer) = app(None);
        assert!(app.is_running());
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.is_running());
    }
}
