use crate::audio::VolumeSlot;
use crate::timeline::run_callback;
use crate::{BeatClock, FadeDirection, FadeProgress, Fader};

/// A looping clip: its beat clock plus the fader driving its volume.
///
/// Callbacks scheduled on a track's clock receive the whole track, so they
/// can start fades, reschedule or jump.
#[derive(Debug)]
pub struct Track {
    name: String,
    clock: BeatClock<Track>,
    fader: Fader,
}

impl Track {
    /// Pairs `clock` with `fader`. Without a fader the track still keeps time
    /// but ignores every fade request.
    pub fn new(name: impl Into<String>, clock: BeatClock<Track>, fader: Option<Fader>) -> Self {
        let name = name.into();
        let fader = fader.unwrap_or_else(|| {
            tracing::warn!(
                track = %name,
                "track has not been assigned a fader, so its fades have been disabled"
            );
            Fader::disabled()
        });

        Self { name, clock, fader }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> &BeatClock<Track> {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut BeatClock<Track> {
        &mut self.clock
    }

    pub fn fader(&self) -> &Fader {
        &self.fader
    }

    pub fn fader_mut(&mut self) -> &mut Fader {
        &mut self.fader
    }

    pub fn volume(&self) -> f32 {
        self.clock.provider().volume()
    }

    pub fn fade(&mut self, direction: FadeDirection) {
        let mut slot = VolumeSlot(self.clock.provider_mut());
        self.fader.fade(direction, &mut slot);
    }

    /// Jumps the volume straight to fully on or off, dropping any running fade.
    pub fn snap(&mut self, direction: FadeDirection) {
        self.fader.cancel();
        let volume = match direction {
            FadeDirection::In => 1.0,
            FadeDirection::Out => 0.0,
        };
        self.clock.provider_mut().set_volume(volume);
        tracing::debug!(track = %self.name, volume, "volume snapped");
    }

    /// Fades `fade_in` up and `fade_out` down in the same step.
    pub fn crossfade(fade_in: &mut Track, fade_out: &mut Track) {
        let mut in_slot = VolumeSlot(fade_in.clock.provider_mut());
        let mut out_slot = VolumeSlot(fade_out.clock.provider_mut());
        Fader::crossfade(&mut fade_in.fader, &mut in_slot, &mut fade_out.fader, &mut out_slot);
    }

    /// Advances the fade by the frame delta, then fires the beats crossed on
    /// the hardware clock and runs their callbacks against this track.
    pub fn tick(&mut self, delta_seconds: f32) -> FadeProgress {
        let mut slot = VolumeSlot(self.clock.provider_mut());
        let progress = self.fader.tick(delta_seconds, &mut slot);

        for beat in self.clock.advance() {
            for callback in self.clock.fire_beat(beat) {
                run_callback(beat, callback, self);
            }
        }

        progress
    }
}
