//! Core library for beat-synchronized adaptive audio.
//!
//! A [`BeatClock`] turns a hardware audio clock into beat and loop counters
//! and fires every beat exactly once, in order, together with callbacks
//! scheduled for it. A [`Fader`] runs interruptible curve fades of a single
//! value. The [`QuantizationController`] combines both per [`Track`] so that
//! volume changes land on a musical grid.

pub mod audio;
pub mod config;
pub mod controller;
pub mod curve;
pub mod error;
pub mod fader;
pub mod timeline;
pub mod track;

pub use audio::{AudioProvider, HardwareClock, ManualClock, MonotonicClock, SimulatedSource, VolumeSlot};
pub use config::{FaderConfig, ScriptedAction, SessionConfig, TrackConfig};
pub use controller::{ControlAction, ControllerConfig, QuantizationController};
pub use curve::{Curve, Interpolation, Keyframe};
pub use error::{BeatSyncError, Result};
pub use fader::{FadeDirection, FadeProgress, FadeTask, Fader, ValueSlot};
pub use timeline::{
    BeatCallback, BeatCallbackQueue, BeatClock, ClockConfig, ClockEvent, ClockSnapshot, PendingBeat,
};
pub use track::Track;
