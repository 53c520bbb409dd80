//! Look-ahead beat scheduler.
//!
//! Software timers wake late and unevenly, so the scheduler never plays a
//! beat "now". Each pass queues every beat that falls inside a short horizon
//! with the [`SoundSource`] at its exact clock time, then posts its own next
//! pass through the [`Deferrer`]. Audio timing is therefore set by the clock,
//! and the timer only has to wake up before the horizon runs dry.
//!
//! All pattern, tempo and session state lives behind one mutex. Passes,
//! `start`/`stop` and pattern edits are serialized through it.

use crossbeam::channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use super::MetronomeEvent;
use super::pattern::{Beat, BeatKind, BeatPattern};
use super::tempo::beat_duration;
use super::timer::{Deferrer, TimerHandle};
use crate::audio::{AudioClock, SoundSource, TriggerHandle};
use crate::error::{MetronomeError, Result};

pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);

/// Floor for the re-arm delay at extreme tempos.
const MIN_REARM: Duration = Duration::from_millis(1);

/// Beat intervals the scheduler accepts, in seconds. Outside this range a
/// tempo is reported as invalid like a non-positive one.
const MIN_BEAT_DURATION: f64 = 1e-3;
const MAX_BEAT_DURATION: f64 = 3600.0;

/// Seconds to a timer delay. Out-of-range and NaN inputs never panic.
fn delay_from_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.clamp(0.0, MAX_BEAT_DURATION)).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Horizon within which beats are queued ahead of time.
    pub lookahead: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScheduleCursor {
    beat_index: usize,
    /// Clock time of the next beat to queue.
    next_time: f64,
    last_scheduled_time: Option<f64>,
    last_tempo: Option<f64>,
}

impl ScheduleCursor {
    fn new(start_time: f64) -> Self {
        Self {
            beat_index: 0,
            next_time: start_time,
            last_scheduled_time: None,
            last_tempo: None,
        }
    }
}

/// A queued beat not yet known to have sounded.
struct PendingBeat {
    at: f64,
    trigger: Option<TriggerHandle>,
    notify: TimerHandle,
}

/// One Playing period. Created by `start`, dropped by `stop`.
struct Session {
    id: u64,
    cursor: ScheduleCursor,
    pending: Vec<PendingBeat>,
    rearm: Option<TimerHandle>,
    tempo_error_reported: bool,
}

struct State {
    pattern: BeatPattern,
    tempo: f64,
    session: Option<Session>,
    next_session_id: u64,
}

struct Inner {
    state: Mutex<State>,
    config: SchedulerConfig,
    clock: Arc<dyn AudioClock>,
    sound: Arc<dyn SoundSource>,
    timer: Arc<dyn Deferrer>,
    events: Sender<MetronomeEvent>,
}

/// Cheap to clone; all clones drive the same pattern and session.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        pattern: BeatPattern,
        tempo: f64,
        config: SchedulerConfig,
        clock: Arc<dyn AudioClock>,
        sound: Arc<dyn SoundSource>,
        timer: Arc<dyn Deferrer>,
        events: Sender<MetronomeEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    pattern,
                    tempo,
                    session: None,
                    next_session_id: 0,
                }),
                config,
                clock,
                sound,
                timer,
                events,
            }),
        }
    }

    /// Begin a session at beat 0. The first pass runs on the timer, not here.
    pub fn start(&self) {
        let mut state = self.lock();
        if state.session.is_some() {
            return;
        }

        let id = state.next_session_id;
        state.next_session_id += 1;
        let start_time = self.inner.clock.now();
        let rearm = self.post_pass(id, Duration::ZERO);
        state.session = Some(Session {
            id,
            cursor: ScheduleCursor::new(start_time),
            pending: Vec::new(),
            rearm: Some(rearm),
            tempo_error_reported: false,
        });

        log::debug!("Session {} started at {:.3}s", id, start_time);
        self.emit(MetronomeEvent::Started);
    }

    /// End the session: cancel future sounds, pending notifications and the
    /// next pass. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        let mut state = self.lock();
        self.stop_locked(&mut state);
    }

    pub fn is_playing(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn tempo(&self) -> f64 {
        self.lock().tempo
    }

    /// Takes effect from the next pass. Invalid values are stored and
    /// reported by that pass; already queued beats keep their times.
    pub fn set_tempo(&self, bpm: f64) {
        let mut state = self.lock();
        if state.tempo == bpm {
            return;
        }
        state.tempo = bpm;
        self.emit(MetronomeEvent::TempoChanged(bpm));
    }

    pub fn pattern(&self) -> BeatPattern {
        self.lock().pattern.clone()
    }

    pub fn beat_at(&self, index: usize) -> Result<Beat> {
        self.lock().pattern.beat_at(index)
    }

    pub fn resize(&self, len: usize) -> Result<()> {
        let mut state = self.lock();
        state.pattern.resize(len)?;
        Self::wrap_cursor(&mut state);
        self.emit(MetronomeEvent::PatternChanged);
        Ok(())
    }

    pub fn toggle_kind(&self, index: usize) -> Result<BeatKind> {
        let kind = self.lock().pattern.toggle_kind(index)?;
        self.emit(MetronomeEvent::PatternChanged);
        Ok(kind)
    }

    pub fn toggle_layout_break(&self, index: usize) -> Result<bool> {
        let layout_break = self.lock().pattern.toggle_layout_break(index)?;
        self.emit(MetronomeEvent::PatternChanged);
        Ok(layout_break)
    }

    /// Replace the whole pattern. An empty list stops playback and keeps the
    /// old pattern.
    pub fn set_pattern(&self, beats: Vec<Beat>) -> Result<()> {
        let mut state = self.lock();
        match BeatPattern::from_beats(beats) {
            Ok(pattern) => {
                state.pattern = pattern;
                Self::wrap_cursor(&mut state);
                self.emit(MetronomeEvent::PatternChanged);
                Ok(())
            }
            Err(err) => {
                log::warn!("Rejected pattern: {}", err);
                self.stop_locked(&mut state);
                self.emit(MetronomeEvent::Error(err.clone()));
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic elsewhere must not make stop() unusable.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: MetronomeEvent) {
        let _ = self.inner.events.send(event);
    }

    fn stop_locked(&self, state: &mut State) {
        let Some(session) = state.session.take() else {
            return;
        };

        if let Some(rearm) = &session.rearm {
            rearm.cancel();
        }

        let now = self.inner.clock.now();
        let mut cancelled = 0;
        for beat in &session.pending {
            beat.notify.cancel();
            if beat.at >= now
                && let Some(handle) = beat.trigger
            {
                self.inner.sound.cancel(handle);
                cancelled += 1;
            }
        }

        log::debug!(
            "Session {} stopped at {:.3}s, cancelled {} queued sounds",
            session.id,
            now,
            cancelled
        );
        self.emit(MetronomeEvent::Stopped);
    }

    /// Keep the cursor inside a pattern that shrank under it.
    fn wrap_cursor(state: &mut State) {
        let len = state.pattern.len();
        if let Some(session) = state.session.as_mut()
            && session.cursor.beat_index >= len
        {
            session.cursor.beat_index = 0;
        }
    }

    fn post_pass(&self, session_id: u64, delay: Duration) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        self.inner.timer.after(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Scheduler { inner }.run_pass(session_id);
                }
            }),
        )
    }

    fn run_pass(&self, session_id: u64) {
        let mut state = self.lock();
        if state.session.as_ref().map(|s| s.id) != Some(session_id) {
            return;
        }

        let delay = match self.schedule_ahead(&mut state) {
            Ok(delay) => delay,
            Err(err) => {
                // Report once per invalid stretch; keep the session alive.
                if let Some(session) = state.session.as_mut()
                    && !session.tempo_error_reported
                {
                    session.tempo_error_reported = true;
                    log::warn!("Scheduling pass skipped: {}", err);
                    self.emit(MetronomeEvent::Error(err));
                }
                self.inner.config.lookahead
            }
        };

        let rearm = self.post_pass(session_id, delay);
        if let Some(session) = state.session.as_mut() {
            session.rearm = Some(rearm);
        }
    }

    /// Queue every beat inside the look-ahead horizon. Returns the delay until
    /// the next pass.
    fn schedule_ahead(&self, state: &mut State) -> Result<Duration> {
        let now = self.inner.clock.now();
        let tempo = state.tempo;
        let lookahead = self.inner.config.lookahead.as_secs_f64();
        let State {
            pattern, session, ..
        } = state;
        let Some(session) = session.as_mut() else {
            return Ok(self.inner.config.lookahead);
        };

        session.pending.retain(|beat| beat.at >= now);

        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(MetronomeError::InvalidTempo(tempo));
        }
        let beat_duration = beat_duration(tempo);
        let horizon = now + lookahead;
        // The cursor must move forward by a whole beat at clock precision.
        if !(MIN_BEAT_DURATION..=MAX_BEAT_DURATION).contains(&beat_duration)
            || horizon + beat_duration <= horizon
        {
            return Err(MetronomeError::InvalidTempo(tempo));
        }
        let recovering = std::mem::take(&mut session.tempo_error_reported);
        let cursor = &mut session.cursor;

        // Realign after a tempo change, or after passes were skipped while
        // the tempo was invalid.
        if let (Some(last_tempo), Some(last_time)) = (cursor.last_tempo, cursor.last_scheduled_time)
            && (last_tempo != tempo || recovering)
        {
            let mut next_time = last_time + beat_duration;
            if next_time < now {
                let missed = ((now - next_time) / beat_duration).ceil();
                next_time += missed * beat_duration;
            }
            log::debug!(
                "Tempo {} -> {} bpm, next beat moved {:.3}s -> {:.3}s",
                last_tempo,
                tempo,
                cursor.next_time,
                next_time
            );
            cursor.next_time = next_time;
        }
        cursor.last_tempo = Some(tempo);

        // Nothing queued yet, e.g. the session started on an invalid tempo.
        if cursor.last_scheduled_time.is_none() && cursor.next_time < now {
            cursor.next_time = now;
        }

        while cursor.next_time < horizon {
            let index = cursor.beat_index;
            let beat = pattern.beat_at(index)?;
            let at = cursor.next_time;

            let notify = self.post_beat_notification(session.id, index, beat.kind, at, now);
            let trigger = beat
                .kind
                .is_audible()
                .then(|| self.inner.sound.trigger(beat.kind, at));
            session.pending.push(PendingBeat {
                at,
                trigger,
                notify,
            });

            cursor.last_scheduled_time = Some(at);
            cursor.beat_index = (index + 1) % pattern.len();
            cursor.next_time += beat_duration;
        }

        // Half a beat, but never later than halfway into the horizon before
        // the next beat is due.
        let until_due = cursor.next_time - now - lookahead / 2.0;
        let delay = (beat_duration / 2.0).min(until_due).max(0.0);
        Ok(delay_from_secs(delay).max(MIN_REARM))
    }

    fn post_beat_notification(
        &self,
        session_id: u64,
        index: usize,
        kind: BeatKind,
        at: f64,
        now: f64,
    ) -> TimerHandle {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = delay_from_secs(at - now);
        self.inner.timer.after(
            delay,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else { return };
                let scheduler = Scheduler { inner };
                // Hold the lock so a concurrent stop() is either fully before
                // or fully after this notification.
                let state = scheduler.lock();
                if state.session.as_ref().map(|s| s.id) == Some(session_id) {
                    scheduler.emit(MetronomeEvent::Beat { index, kind, at });
                }
            }),
        )
    }
}
