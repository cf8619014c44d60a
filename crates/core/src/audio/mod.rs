//! Seams towards the audio backend.
//!
//! The beat clock never decodes or mixes audio itself. It only needs a
//! handful of transport controls from an [`AudioProvider`] and a monotonic
//! [`HardwareClock`] that advances with the audio output rather than with
//! rendered frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::fader::ValueSlot;

/// Transport controls consumed from the playback backend.
pub trait AudioProvider {
    fn play(&mut self);
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    /// Playback cursor inside the clip, in seconds.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// Length of the loaded clip, or `None` when nothing is loaded.
    fn clip_duration_seconds(&self) -> Option<f64>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
}

/// Monotonic time source tied to the audio device.
pub trait HardwareClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Hardware clock that only moves when told to. Used to drive sessions
/// deterministically from tests and from the simulator.
#[derive(Debug)]
pub struct ManualClock {
    seconds_bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start_seconds: f64) -> Self {
        Self {
            seconds_bits: AtomicU64::new(start_seconds.to_bits()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds_bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, delta_seconds: f64) {
        self.set(self.now() + delta_seconds);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl HardwareClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::Relaxed))
    }
}

/// Wall clock measured from construction with [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transport {
    Stopped { cursor: f64 },
    Playing { started_at: f64, start_cursor: f64 },
}

/// Looping clip whose playback cursor follows a hardware clock.
///
/// Stands in for a real output device: nothing is rendered, but the cursor,
/// transport state and volume behave like a looping audio source.
pub struct SimulatedSource {
    clock: Arc<dyn HardwareClock>,
    clip_duration: Option<f64>,
    volume: f32,
    transport: Transport,
}

impl SimulatedSource {
    pub fn new(clock: Arc<dyn HardwareClock>, clip_duration: Option<f64>) -> Self {
        Self {
            clock,
            clip_duration,
            volume: 1.0,
            transport: Transport::Stopped { cursor: 0.0 },
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    fn wrap(&self, cursor: f64) -> f64 {
        match self.clip_duration {
            Some(duration) if duration > 0.0 => cursor.rem_euclid(duration),
            _ => 0.0,
        }
    }
}

impl AudioProvider for SimulatedSource {
    fn play(&mut self) {
        if self.clip_duration.is_none() {
            tracing::warn!("simulated source has no clip; ignoring play request");
            return;
        }
        self.transport = Transport::Playing {
            started_at: self.clock.now(),
            start_cursor: 0.0,
        };
    }

    fn stop(&mut self) {
        self.transport = Transport::Stopped { cursor: 0.0 };
    }

    fn is_playing(&self) -> bool {
        matches!(self.transport, Transport::Playing { .. })
    }

    fn current_time(&self) -> f64 {
        match self.transport {
            Transport::Stopped { cursor } => cursor,
            Transport::Playing {
                started_at,
                start_cursor,
            } => self.wrap(start_cursor + self.clock.now() - started_at),
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        let cursor = self.wrap(seconds);
        self.transport = match self.transport {
            Transport::Stopped { .. } => Transport::Stopped { cursor },
            Transport::Playing { .. } => Transport::Playing {
                started_at: self.clock.now(),
                start_cursor: cursor,
            },
        };
    }

    fn clip_duration_seconds(&self) -> Option<f64> {
        self.clip_duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

impl std::fmt::Debug for SimulatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSource")
            .field("clip_duration", &self.clip_duration)
            .field("volume", &self.volume)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Exposes a provider's volume as the value slot a fader writes to.
pub struct VolumeSlot<'a, P: AudioProvider + ?Sized>(pub &'a mut P);

impl<P: AudioProvider + ?Sized> ValueSlot for VolumeSlot<'_, P> {
    fn value(&self) -> f32 {
        self.0.volume()
    }

    fn set_value(&mut self, value: f32) {
        self.0.set_volume(value);
    }
}
