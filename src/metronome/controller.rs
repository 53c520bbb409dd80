use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::time::Instant;

use super::scheduler::Scheduler;
use super::tempo::{TapTempo, clamp_tempo};
use super::MetronomeEvent;
use crate::audio::AudioClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

/// Play/stop gate in front of the scheduler, plus the "now playing" beat.
pub struct PlaybackController {
    scheduler: Scheduler,
    clock: Arc<dyn AudioClock>,
    events: Receiver<MetronomeEvent>,
    now_playing: Option<usize>,
    tap: TapTempo,
}

impl PlaybackController {
    pub fn new(
        scheduler: Scheduler,
        clock: Arc<dyn AudioClock>,
        events: Receiver<MetronomeEvent>,
    ) -> Self {
        Self {
            scheduler,
            clock,
            events,
            now_playing: None,
            tap: TapTempo::new(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn state(&self) -> PlaybackState {
        if self.scheduler.is_playing() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn start(&mut self) {
        if !self.clock.is_running() {
            self.clock.resume();
        }
        self.scheduler.start();
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.now_playing = None;
    }

    pub fn toggle(&mut self) -> PlaybackState {
        match self.state() {
            PlaybackState::Playing => self.stop(),
            PlaybackState::Stopped => self.start(),
        }
        self.state()
    }

    /// Index of the beat sounding right now, if playing.
    pub fn now_playing(&self) -> Option<usize> {
        self.now_playing
    }

    /// Drain scheduler events, tracking the playing beat. Returns them for display.
    pub fn poll_events(&mut self) -> Vec<MetronomeEvent> {
        let events: Vec<MetronomeEvent> = self.events.try_iter().collect();
        for event in &events {
            match event {
                MetronomeEvent::Beat { index, .. } => self.now_playing = Some(*index),
                MetronomeEvent::Stopped => self.now_playing = None,
                _ => {}
            }
        }
        events
    }

    pub fn tempo(&self) -> f64 {
        self.scheduler.tempo()
    }

    /// Clamp and apply a user-entered tempo. Returns the value applied.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        let bpm = clamp_tempo(bpm);
        self.scheduler.set_tempo(bpm);
        bpm
    }

    pub fn nudge_tempo(&mut self, delta: f64) -> f64 {
        let current = self.scheduler.tempo();
        self.set_tempo(current.round() + delta)
    }

    /// Register a tap; applies the measured tempo once there are enough taps.
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        let bpm = self.tap.tap(now)?;
        Some(self.set_tempo(bpm.round()))
    }

    /// Forget earlier taps so the next one starts a new measurement.
    pub fn clear_taps(&mut self) {
        self.tap.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ManualClock, RecordingSource};
    use crate::metronome::pattern::BeatPattern;
    use crate::metronome::scheduler::SchedulerConfig;
    use crate::metronome::timer::ManualTimer;
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    fn controller() -> (PlaybackController, Arc<ManualClock>, Arc<ManualTimer>) {
        let clock = Arc::new(ManualClock::new(0.0));
        let timer = Arc::new(ManualTimer::new(Arc::clone(&clock)));
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new(
            BeatPattern::default(),
            120.0,
            SchedulerConfig::default(),
            clock.clone(),
            Arc::new(RecordingSource::new()),
            timer.clone(),
            tx,
        );
        (
            PlaybackController::new(scheduler, clock.clone(), rx),
            clock,
            timer,
        )
    }

    #[test]
    fn test_start_resumes_clock() {
        let (mut controller, clock, _timer) = controller();
        assert!(!clock.is_running());
        assert_eq!(controller.state(), PlaybackState::Stopped);

        controller.start();
        assert!(clock.is_running());
        assert_eq!(controller.state(), PlaybackState::Playing);

        controller.start();
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_toggle_mirrors_scheduler() {
        let (mut controller, _clock, _timer) = controller();
        assert_eq!(controller.toggle(), PlaybackState::Playing);
        assert!(controller.scheduler().is_playing());
        assert_eq!(controller.toggle(), PlaybackState::Stopped);
        assert!(!controller.scheduler().is_playing());

        controller.stop();
        assert_eq!(controller.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_now_playing_follows_beats() {
        let (mut controller, _clock, timer) = controller();
        controller.start();

        timer.run_until(0.05);
        controller.poll_events();
        assert_eq!(controller.now_playing(), Some(0));

        timer.run_until(1.01);
        controller.poll_events();
        assert_eq!(controller.now_playing(), Some(2));

        controller.stop();
        assert_eq!(controller.now_playing(), None);
        assert!(
            controller
                .poll_events()
                .contains(&MetronomeEvent::Stopped)
        );
        assert_eq!(controller.now_playing(), None);
    }

    #[test]
    fn test_set_tempo_is_clamped() {
        let (mut controller, _clock, _timer) = controller();
        assert_eq!(controller.set_tempo(1000.0), 400.0);
        assert_eq!(controller.tempo(), 400.0);
        assert_eq!(controller.nudge_tempo(-10.0), 390.0);
        assert_eq!(controller.set_tempo(5.0), 20.0);
        assert_eq!(controller.nudge_tempo(-1.0), 20.0);
    }

    #[test]
    fn test_tap_applies_tempo() {
        let (mut controller, _clock, _timer) = controller();
        let start = Instant::now();
        assert_eq!(controller.tap(start), None);
        assert_eq!(controller.tap(start + Duration::from_millis(600)), Some(100.0));
        assert_eq!(controller.tempo(), 100.0);
    }

    #[test]
    fn test_clear_taps_starts_new_measurement() {
        let (mut controller, _clock, _timer) = controller();
        let start = Instant::now();
        controller.tap(start);
        controller.clear_taps();
        assert_eq!(controller.tap(start + Duration::from_millis(500)), None);
        assert_eq!(controller.tempo(), 120.0);
    }
}
