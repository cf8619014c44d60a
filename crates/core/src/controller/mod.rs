//! Quantized control over a set of tracks.
//!
//! Fades requested here never start immediately: they are deferred to the
//! next boundary of the quantization grid so that changes land on the music.

use serde::{Deserialize, Serialize};

use crate::{BeatSyncError, FadeDirection, Result, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Size of the quantization grid in beats.
    pub grid: u32,
    /// Play the fade curves when true, snap the volume when false.
    pub fade_out_mode: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            grid: 4,
            fade_out_mode: true,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid < 1 {
            return Err(BeatSyncError::InvalidGrid);
        }
        Ok(())
    }
}

/// A command the controller can carry out, as written in session scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    FadeIn { track: usize },
    FadeOut { track: usize },
    Crossfade { fade_in: usize, fade_out: usize },
    SyncAll { reference: usize },
    JumpTo { track: usize, beat: i64 },
    SetFadeOutMode { enabled: bool },
    PlayAll,
    StopAll,
}

impl ControlAction {
    /// Track indices the action refers to.
    pub fn tracks(&self) -> Vec<usize> {
        match *self {
            ControlAction::FadeIn { track }
            | ControlAction::FadeOut { track }
            | ControlAction::JumpTo { track, .. } => vec![track],
            ControlAction::Crossfade { fade_in, fade_out } => vec![fade_in, fade_out],
            ControlAction::SyncAll { reference } => vec![reference],
            ControlAction::SetFadeOutMode { .. } | ControlAction::PlayAll | ControlAction::StopAll => {
                Vec::new()
            }
        }
    }
}

#[derive(Debug)]
pub struct QuantizationController {
    tracks: Vec<Track>,
    grid: u32,
    fade_out_mode: bool,
}

impl QuantizationController {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tracks: Vec::new(),
            grid: config.grid,
            fade_out_mode: config.fade_out_mode,
        })
    }

    /// Adds a track and returns its index.
    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Result<&Track> {
        let len = self.tracks.len();
        self.tracks
            .get(index)
            .ok_or(BeatSyncError::UnknownTrack { index, len })
    }

    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track> {
        let len = self.tracks.len();
        self.tracks
            .get_mut(index)
            .ok_or(BeatSyncError::UnknownTrack { index, len })
    }

    pub fn grid(&self) -> u32 {
        self.grid
    }

    pub fn fade_out_mode(&self) -> bool {
        self.fade_out_mode
    }

    pub fn set_fade_out_mode(&mut self, fade_out_mode: bool) {
        self.fade_out_mode = fade_out_mode;
    }

    /// First grid boundary strictly after the current beat. A clock sitting
    /// exactly on a boundary waits a whole grid cycle.
    pub fn next_grid_beat(total_beats: f64, grid: u32) -> i64 {
        let grid = i64::from(grid.max(1));
        let current = total_beats.floor() as i64;
        current.saturating_add(grid - current.rem_euclid(grid))
    }

    /// Schedules a fade in on the next grid boundary and returns that beat.
    pub fn fade_in(&mut self, index: usize) -> Result<i64> {
        self.quantize(index, FadeDirection::In)
    }

    /// Schedules a fade out on the next grid boundary and returns that beat.
    pub fn fade_out(&mut self, index: usize) -> Result<i64> {
        self.quantize(index, FadeDirection::Out)
    }

    fn quantize(&mut self, index: usize, direction: FadeDirection) -> Result<i64> {
        let grid = self.grid;
        let fade_out_mode = self.fade_out_mode;
        let track = self.track_mut(index)?;
        let target = Self::next_grid_beat(track.clock().total_beats(), grid);

        if fade_out_mode {
            track.clock_mut().schedule_at(target, move |track: &mut Track| {
                track.fade(direction);
                Ok(())
            });
        } else {
            track.clock_mut().schedule_at(target, move |track: &mut Track| {
                track.snap(direction);
                Ok(())
            });
        }

        tracing::info!(
            track = track.name(),
            ?direction,
            target,
            fade = fade_out_mode,
            "quantized volume change scheduled"
        );
        Ok(target)
    }

    /// Crossfades two tracks right away, without waiting for the grid.
    pub fn crossfade(&mut self, fade_in: usize, fade_out: usize) -> Result<()> {
        let len = self.tracks.len();
        for index in [fade_in, fade_out] {
            if index >= len {
                return Err(BeatSyncError::UnknownTrack { index, len });
            }
        }
        if fade_in == fade_out {
            return Err(BeatSyncError::msg("cannot crossfade a track with itself"));
        }

        let (low, high) = self.tracks.split_at_mut(fade_in.max(fade_out));
        let (first, second) = (&mut low[fade_in.min(fade_out)], &mut high[0]);
        if fade_in < fade_out {
            Track::crossfade(first, second);
        } else {
            Track::crossfade(second, first);
        }
        Ok(())
    }

    /// Jumps every track to the reference track's current beat and returns it.
    pub fn sync_all(&mut self, reference: usize) -> Result<i64> {
        let beat = self.track(reference)?.clock().current_beat();
        for track in &mut self.tracks {
            track.clock_mut().jump_to(beat);
        }

        tracing::info!(reference, beat, tracks = self.tracks.len(), "tracks synced");
        Ok(beat)
    }

    pub fn play_all(&mut self) {
        for track in &mut self.tracks {
            track.clock_mut().play();
        }
    }

    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            track.clock_mut().stop();
        }
    }

    pub fn apply(&mut self, action: ControlAction) -> Result<()> {
        tracing::debug!(?action, "applying control action");
        match action {
            ControlAction::FadeIn { track } => self.fade_in(track).map(drop),
            ControlAction::FadeOut { track } => self.fade_out(track).map(drop),
            ControlAction::Crossfade { fade_in, fade_out } => self.crossfade(fade_in, fade_out),
            ControlAction::SyncAll { reference } => self.sync_all(reference).map(drop),
            ControlAction::JumpTo { track, beat } => {
                self.track_mut(track)?.clock_mut().jump_to(beat);
                Ok(())
            }
            ControlAction::SetFadeOutMode { enabled } => {
                self.set_fade_out_mode(enabled);
                Ok(())
            }
            ControlAction::PlayAll => {
                self.play_all();
                Ok(())
            }
            ControlAction::StopAll => {
                self.stop_all();
                Ok(())
            }
        }
    }

    /// Advances every track by one frame.
    pub fn tick(&mut self, delta_seconds: f32) {
        for track in &mut self.tracks {
            track.tick(delta_seconds);
        }
    }
}
