//! Musical time derived from the audio hardware clock.
//!
//! Beat positions are always recomputed from the hardware clock and an
//! anchor instead of being accumulated from frame deltas, so slow or uneven
//! frames never cause drift. Beats crossed between two ticks are all fired,
//! in order.

mod queue;

use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{AudioProvider, BeatSyncError, HardwareClock, Result};

pub use queue::{BeatCallback, BeatCallbackQueue};

/// Tempo settings of one looping clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub bpm: f64,
    /// Seconds of audio before the first beat.
    #[serde(default)]
    pub first_beat_offset: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            bpm: 60.0,
            first_beat_offset: 0.0,
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(BeatSyncError::InvalidTempo(self.bpm));
        }
        if !(self.first_beat_offset.is_finite() && self.first_beat_offset >= 0.0) {
            return Err(BeatSyncError::InvalidOffset(self.first_beat_offset));
        }
        Ok(())
    }
}

/// Notifications published by a [`BeatClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockEvent {
    Started,
    Stopped,
    Beat(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBeat {
    pub beat: i64,
    pub callbacks: usize,
}

/// Read-only view of a clock's counters, suitable for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub bpm: f64,
    pub playing: bool,
    pub seconds: f64,
    pub total_beats: f64,
    pub loop_beats: f64,
    pub loops: i64,
    pub loop_analog: f64,
    pub beats_per_loop: f64,
    pub last_fired_beat: i64,
    pub pending: Vec<PendingBeat>,
}

type Observer = Box<dyn FnMut(ClockEvent)>;

/// Beat and loop counters for one looping clip.
///
/// `T` is the context handed to scheduled callbacks when their beat fires.
pub struct BeatClock<T> {
    provider: Box<dyn AudioProvider>,
    hardware: Arc<dyn HardwareClock>,
    bpm: f64,
    first_beat_offset: f64,
    seconds_per_beat: f64,
    beats_per_loop: f64,
    clock_anchor: f64,
    seconds: f64,
    total_beats: f64,
    loops: i64,
    loop_beats: f64,
    loop_analog: f64,
    last_fired_beat: i64,
    queue: BeatCallbackQueue<T>,
    observers: Vec<Observer>,
}

impl<T> BeatClock<T> {
    /// Builds a clock for the clip currently loaded in `provider`.
    ///
    /// Fails when the tempo or offset is invalid, when the provider has no
    /// clip, or when the clip ends before its first beat.
    pub fn new(
        config: ClockConfig,
        provider: Box<dyn AudioProvider>,
        hardware: Arc<dyn HardwareClock>,
    ) -> Result<Self> {
        config.validate()?;

        let duration = provider
            .clip_duration_seconds()
            .ok_or(BeatSyncError::MissingClip)?;
        let seconds_per_beat = 60.0 / config.bpm;
        let beats_per_loop = (duration - config.first_beat_offset) / seconds_per_beat;
        if !(beats_per_loop.is_finite() && beats_per_loop > 0.0) {
            return Err(BeatSyncError::ClipTooShort {
                duration,
                offset: config.first_beat_offset,
            });
        }

        Ok(Self {
            provider,
            hardware,
            bpm: config.bpm,
            first_beat_offset: config.first_beat_offset,
            seconds_per_beat,
            beats_per_loop,
            clock_anchor: 0.0,
            seconds: 0.0,
            total_beats: 0.0,
            loops: 0,
            loop_beats: 0.0,
            loop_analog: 0.0,
            last_fired_beat: -1,
            queue: BeatCallbackQueue::new(),
            observers: Vec::new(),
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn first_beat_offset(&self) -> f64 {
        self.first_beat_offset
    }

    pub fn seconds_per_beat(&self) -> f64 {
        self.seconds_per_beat
    }

    pub fn beats_per_loop(&self) -> f64 {
        self.beats_per_loop
    }

    /// Seconds since the first beat; negative during the pre-roll.
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn total_beats(&self) -> f64 {
        self.total_beats
    }

    pub fn loops(&self) -> i64 {
        self.loops
    }

    pub fn loop_beats(&self) -> f64 {
        self.loop_beats
    }

    pub fn loop_analog(&self) -> f64 {
        self.loop_analog
    }

    pub fn last_fired_beat(&self) -> i64 {
        self.last_fired_beat
    }

    /// Whole beats elapsed, i.e. the beat the clock currently sits in.
    pub fn current_beat(&self) -> i64 {
        self.total_beats.floor() as i64
    }

    pub fn is_playing(&self) -> bool {
        self.provider.is_playing()
    }

    pub fn provider(&self) -> &dyn AudioProvider {
        self.provider.as_ref()
    }

    pub fn provider_mut(&mut self) -> &mut dyn AudioProvider {
        self.provider.as_mut()
    }

    pub fn queue(&self) -> &BeatCallbackQueue<T> {
        &self.queue
    }

    /// Registers an observer for start, stop and beat notifications.
    pub fn on_event(&mut self, observer: impl FnMut(ClockEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn play(&mut self) {
        self.seconds = 0.0;
        self.total_beats = 0.0;
        self.loops = 0;
        self.loop_beats = 0.0;
        self.loop_analog = 0.0;
        self.last_fired_beat = -1;
        self.clock_anchor = self.hardware.now();

        tracing::info!(bpm = self.bpm, anchor = self.clock_anchor, "audio started");
        self.emit(ClockEvent::Started);
        self.provider.play();
    }

    pub fn stop(&mut self) {
        tracing::info!(total_beats = self.total_beats, "audio stopped");
        self.emit(ClockEvent::Stopped);
        self.provider.stop();
    }

    /// Moves playback to `beat` as if the clip had been playing continuously
    /// since `beat` beats ago.
    ///
    /// Beats between the old and the new position are not replayed; callbacks
    /// queued for them stay pending until that beat is reached again. Landing
    /// in the pre-roll never fires negative beats.
    ///
    /// Both the provider cursor and the anchor include `first_beat_offset`,
    /// so `total_beats() == beat` right after the jump for any offset.
    pub fn jump_to(&mut self, beat: i64) {
        let target = beat as f64;
        self.loops = (target / self.beats_per_loop).floor() as i64;

        let in_loop = target.rem_euclid(self.beats_per_loop);
        self.provider
            .set_current_time(self.first_beat_offset + self.seconds_per_beat * in_loop);

        self.clock_anchor =
            self.hardware.now() - self.seconds_per_beat * target - self.first_beat_offset;
        self.refresh();
        self.last_fired_beat = beat.saturating_sub(1).max(-1);

        tracing::info!(beat, loops = self.loops, "jumped");
    }

    /// Queues `callback` to run once when `beat` fires.
    pub fn schedule_at(&mut self, beat: i64, callback: impl FnOnce(&mut T) -> Result<()> + 'static) {
        if beat <= self.last_fired_beat {
            tracing::debug!(beat, last_fired = self.last_fired_beat, "scheduled behind the clock");
        }
        self.queue.push(beat, Box::new(callback));
    }

    /// Fires every beat crossed since the last tick and runs the callbacks
    /// queued for them against `context`.
    pub fn tick(&mut self, context: &mut T) {
        for beat in self.advance() {
            for callback in self.fire_beat(beat) {
                run_callback(beat, callback, context);
            }
        }
    }

    /// Updates the counters from the hardware clock and returns the beats
    /// crossed since the previous call. The range is empty when no beat was
    /// crossed or the provider is not playing.
    ///
    /// Callers that need the clock itself inside callbacks drive the two
    /// halves of [`BeatClock::tick`] by hand: `advance` once, then
    /// [`BeatClock::fire_beat`] for each beat of the returned range.
    pub fn advance(&mut self) -> RangeInclusive<i64> {
        let idle = RangeInclusive::new(1, 0);
        if !self.provider.is_playing() {
            return idle;
        }

        self.refresh();
        loop {
            let next = self.loops.saturating_add(1);
            let boundary = next as f64 * self.beats_per_loop;
            // Past f64 precision the boundary stops moving.
            if self.total_beats < boundary || boundary <= self.loops as f64 * self.beats_per_loop {
                break;
            }
            self.loops = next;
            tracing::debug!(loops = self.loops, "loop rollover");
        }
        self.update_loop_position();

        tracing::trace!(
            total_beats = self.total_beats,
            loop_analog = self.loop_analog,
            "clock advanced"
        );

        if self.total_beats < 0.0 {
            return idle;
        }

        let current = self.current_beat();
        if current == self.last_fired_beat {
            return idle;
        }

        let first = self.last_fired_beat.saturating_add(1);
        self.last_fired_beat = current;
        first..=current
    }

    /// Publishes `beat` to observers and hands back its queued callbacks.
    pub fn fire_beat(&mut self, beat: i64) -> Vec<BeatCallback<T>> {
        tracing::debug!(beat, "beat");
        self.emit(ClockEvent::Beat(beat));
        self.queue.drain(beat)
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            bpm: self.bpm,
            playing: self.provider.is_playing(),
            seconds: self.seconds,
            total_beats: self.total_beats,
            loop_beats: self.loop_beats,
            loops: self.loops,
            loop_analog: self.loop_analog,
            beats_per_loop: self.beats_per_loop,
            last_fired_beat: self.last_fired_beat,
            pending: self
                .queue
                .pending()
                .map(|(beat, callbacks)| PendingBeat { beat, callbacks })
                .collect(),
        }
    }

    fn refresh(&mut self) {
        self.seconds = self.hardware.now() - self.clock_anchor - self.first_beat_offset;
        self.total_beats = self.seconds / self.seconds_per_beat;
        self.update_loop_position();
    }

    fn update_loop_position(&mut self) {
        self.loop_beats = self.total_beats - self.loops as f64 * self.beats_per_loop;
        self.loop_analog = self.loop_beats / self.beats_per_loop;
    }

    fn emit(&mut self, event: ClockEvent) {
        for observer in &mut self.observers {
            observer(event);
        }
    }
}

impl<T> std::fmt::Debug for BeatClock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatClock")
            .field("bpm", &self.bpm)
            .field("total_beats", &self.total_beats)
            .field("loops", &self.loops)
            .field("last_fired_beat", &self.last_fired_beat)
            .field("queue", &self.queue)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Runs one drained callback. Errors are logged and swallowed so the rest of
/// the beat still drains.
pub(crate) fn run_callback<T>(beat: i64, callback: BeatCallback<T>, context: &mut T) {
    if let Err(err) = callback(context) {
        tracing::warn!(beat, error = %err, "beat callback failed");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::{ManualClock, SimulatedSource};

    fn build_clock<T>(config: ClockConfig, clip: f64) -> (Arc<ManualClock>, BeatClock<T>) {
        let hardware = Arc::new(ManualClock::default());
        let source = SimulatedSource::new(hardware.clone(), Some(clip));
        let clock = BeatClock::new(config, Box::new(source), hardware.clone()).unwrap();
        (hardware, clock)
    }

    fn record_beats<T>(clock: &mut BeatClock<T>) -> Rc<RefCell<Vec<i64>>> {
        let beats = Rc::new(RefCell::new(Vec::new()));
        let sink = beats.clone();
        clock.on_event(move |event| {
            if let ClockEvent::Beat(beat) = event {
                sink.borrow_mut().push(beat);
            }
        });
        beats
    }

    #[test]
    fn slow_frames_never_skip_beats() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        let beats = record_beats(&mut clock);
        clock.play();

        hardware.set(0.5);
        clock.tick(&mut ());
        assert_eq!(*beats.borrow(), vec![0]);

        hardware.set(4.2);
        clock.tick(&mut ());
        assert_eq!(*beats.borrow(), vec![0, 1, 2, 3, 4]);

        hardware.set(4.9);
        clock.tick(&mut ());
        assert_eq!(beats.borrow().len(), 5);
        assert_eq!(clock.last_fired_beat(), 4);
    }

    #[test]
    fn scheduled_callback_fires_exactly_once() {
        let (hardware, mut clock) = build_clock::<Vec<i64>>(ClockConfig::default(), 8.0);
        clock.play();
        clock.schedule_at(5, |fired: &mut Vec<i64>| {
            fired.push(5);
            Ok(())
        });

        let mut fired = Vec::new();
        let mut now = 0.0;
        while now <= 6.0 {
            hardware.set(now);
            clock.tick(&mut fired);
            if now < 5.0 {
                assert!(fired.is_empty());
            }
            now += 0.25;
        }

        assert_eq!(fired, vec![5]);
        assert!(!clock.queue().contains(5));
    }

    #[test]
    fn callbacks_run_after_observers_in_insertion_order() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        let log = Rc::new(RefCell::new(Vec::<String>::new()));

        let sink = log.clone();
        clock.on_event(move |event| {
            if let ClockEvent::Beat(beat) = event {
                sink.borrow_mut().push(format!("beat {beat}"));
            }
        });

        clock.play();
        for (beat, label) in [(2, "first"), (1, "one"), (2, "second")] {
            let sink = log.clone();
            clock.schedule_at(beat, move |_: &mut ()| {
                sink.borrow_mut().push(label.to_string());
                Ok(())
            });
        }

        hardware.set(3.0);
        clock.tick(&mut ());

        assert_eq!(
            *log.borrow(),
            vec!["beat 0", "beat 1", "one", "beat 2", "first", "second", "beat 3"]
        );
        assert!(clock.queue().is_empty());
    }

    #[test]
    fn failing_callback_does_not_abort_drain() {
        let (hardware, mut clock) = build_clock::<u32>(ClockConfig::default(), 8.0);
        clock.play();
        clock.schedule_at(1, |_: &mut u32| Err(BeatSyncError::msg("boom")));
        clock.schedule_at(1, |count: &mut u32| {
            *count += 1;
            Ok(())
        });
        clock.schedule_at(2, |count: &mut u32| {
            *count += 10;
            Ok(())
        });

        let mut count = 0;
        hardware.set(2.5);
        clock.tick(&mut count);

        assert_eq!(count, 11);
        assert_eq!(clock.last_fired_beat(), 2);
    }

    #[test]
    fn loop_rollover_is_detected_per_loop() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        clock.play();

        hardware.set(8.5);
        clock.tick(&mut ());
        assert_eq!(clock.loops(), 1);
        assert!((clock.loop_beats() - 0.5).abs() < 1e-9);
        assert!((clock.loop_analog() - 0.0625).abs() < 1e-9);

        hardware.set(24.25);
        clock.tick(&mut ());
        assert_eq!(clock.loops(), 3);
        assert!((clock.loop_beats() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn jump_lands_on_target_without_replaying() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        let beats = record_beats(&mut clock);
        clock.play();
        hardware.set(3.5);
        clock.tick(&mut ());

        clock.jump_to(20);
        assert!((clock.total_beats() - 20.0).abs() < 1e-9);
        assert_eq!(clock.loops(), 2);
        assert!((clock.provider().current_time() - 4.0).abs() < 1e-9);

        hardware.set(3.6);
        clock.tick(&mut ());
        assert_eq!(*beats.borrow(), vec![0, 1, 2, 3, 20]);
        assert_eq!(clock.loops(), 2);
    }

    #[test]
    fn jump_strands_skipped_callbacks() {
        let (hardware, mut clock) = build_clock::<u32>(ClockConfig::default(), 8.0);
        clock.play();
        clock.schedule_at(10, |count: &mut u32| {
            *count += 1;
            Ok(())
        });

        let mut count = 0;
        clock.jump_to(12);
        hardware.set(2.0);
        clock.tick(&mut count);

        assert_eq!(count, 0);
        assert_eq!(clock.queue().len_at(10), 1);

        clock.jump_to(9);
        hardware.set(3.5);
        clock.tick(&mut count);
        assert_eq!(count, 1);
        assert!(clock.queue().is_empty());
    }

    #[test]
    fn first_beat_offset_delays_beats() {
        let config = ClockConfig {
            bpm: 120.0,
            first_beat_offset: 0.5,
        };
        let (hardware, mut clock) = build_clock::<()>(config, 4.5);
        assert!((clock.beats_per_loop() - 8.0).abs() < 1e-9);
        let beats = record_beats(&mut clock);
        clock.play();

        hardware.set(0.3);
        clock.tick(&mut ());
        assert!(clock.total_beats() < 0.0);
        assert!(beats.borrow().is_empty());

        hardware.set(1.1);
        clock.tick(&mut ());
        assert_eq!(*beats.borrow(), vec![0, 1]);

        clock.jump_to(3);
        assert!((clock.total_beats() - 3.0).abs() < 1e-9);
        assert!((clock.provider().current_time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn jump_into_pre_roll_fires_no_negative_beats() {
        let config = ClockConfig {
            bpm: 60.0,
            first_beat_offset: 2.0,
        };
        let (hardware, mut clock) = build_clock::<u32>(config, 16.0);
        let beats = record_beats(&mut clock);
        clock.schedule_at(-1, |count: &mut u32| {
            *count += 1;
            Ok(())
        });
        clock.play();

        hardware.set(0.5);
        clock.tick(&mut 0);
        clock.jump_to(-2);
        assert!((clock.total_beats() + 2.0).abs() < 1e-9);
        assert_eq!(clock.last_fired_beat(), -1);

        let mut count = 0;
        hardware.set(2.6);
        clock.tick(&mut count);

        assert_eq!(*beats.borrow(), vec![0]);
        assert_eq!(count, 0);
        assert_eq!(clock.queue().len_at(-1), 1);
    }

    #[test]
    fn extreme_jump_targets_do_not_overflow() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        let beats = record_beats(&mut clock);
        clock.play();

        clock.jump_to(i64::MIN);
        assert_eq!(clock.last_fired_beat(), -1);
        hardware.set(1.0);
        clock.tick(&mut ());
        assert!(beats.borrow().is_empty());

        clock.jump_to(i64::MAX);
        assert_eq!(clock.last_fired_beat(), i64::MAX - 1);
        hardware.set(2.0);
        clock.tick(&mut ());
        clock.tick(&mut ());
        assert_eq!(clock.last_fired_beat(), i64::MAX);
    }

    #[test]
    fn stopped_clock_keeps_queue_and_ignores_ticks() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        clock.on_event(move |event| sink.borrow_mut().push(event));

        clock.play();
        clock.schedule_at(3, |_: &mut ()| Ok(()));
        clock.stop();

        hardware.set(5.0);
        clock.tick(&mut ());

        assert_eq!(*events.borrow(), vec![ClockEvent::Started, ClockEvent::Stopped]);
        assert_eq!(clock.queue().len_at(3), 1);
        assert_eq!(clock.last_fired_beat(), -1);
    }

    #[test]
    fn replay_restarts_beat_numbering() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        let beats = record_beats(&mut clock);
        clock.play();
        hardware.set(2.5);
        clock.tick(&mut ());

        clock.stop();
        clock.play();
        hardware.set(3.2);
        clock.tick(&mut ());

        assert_eq!(*beats.borrow(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let hardware: Arc<ManualClock> = Arc::new(ManualClock::default());
        let build = |config: ClockConfig, clip: Option<f64>| {
            let source = SimulatedSource::new(hardware.clone(), clip);
            BeatClock::<()>::new(config, Box::new(source), hardware.clone())
        };

        let zero_bpm = ClockConfig {
            bpm: 0.0,
            first_beat_offset: 0.0,
        };
        assert!(matches!(
            build(zero_bpm, Some(4.0)),
            Err(BeatSyncError::InvalidTempo(_))
        ));

        let negative_offset = ClockConfig {
            bpm: 90.0,
            first_beat_offset: -1.0,
        };
        assert!(matches!(
            build(negative_offset, Some(4.0)),
            Err(BeatSyncError::InvalidOffset(_))
        ));

        assert!(matches!(
            build(ClockConfig::default(), None),
            Err(BeatSyncError::MissingClip)
        ));

        let long_offset = ClockConfig {
            bpm: 90.0,
            first_beat_offset: 4.0,
        };
        assert!(matches!(
            build(long_offset, Some(4.0)),
            Err(BeatSyncError::ClipTooShort { .. })
        ));
    }

    #[test]
    fn snapshot_lists_pending_beats() {
        let (hardware, mut clock) = build_clock::<()>(ClockConfig::default(), 8.0);
        clock.play();
        clock.schedule_at(6, |_: &mut ()| Ok(()));
        clock.schedule_at(6, |_: &mut ()| Ok(()));
        hardware.set(1.5);
        clock.tick(&mut ());

        let snapshot = clock.snapshot();
        assert!(snapshot.playing);
        assert_eq!(snapshot.last_fired_beat, 1);
        assert_eq!(
            snapshot.pending,
            vec![PendingBeat {
                beat: 6,
                callbacks: 2
            }]
        );
    }
}
