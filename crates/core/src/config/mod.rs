use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    AudioProvider, BeatClock, BeatSyncError, ClockConfig, ControlAction, ControllerConfig, Curve,
    Fader, HardwareClock, QuantizationController, Result, Track,
};

/// Top-level description of an adaptive audio session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    pub tracks: Vec<TrackConfig>,
    /// Actions to run at fixed points of a simulated session.
    #[serde(default)]
    pub script: Vec<ScriptedAction>,
}

/// Configuration of a single looping clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    pub name: String,
    #[serde(flatten)]
    pub clock: ClockConfig,
    /// Length of the clip handed to the audio provider.
    pub clip_duration_seconds: Option<f64>,
    #[serde(default = "default_true")]
    pub play_on_start: bool,
    #[serde(default = "default_volume")]
    pub initial_volume: f32,
    /// Leaving the key out installs the default curves; `null` means the
    /// track has no fader at all.
    #[serde(default = "default_fader")]
    pub fader: Option<FaderConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaderConfig {
    #[serde(default = "Curve::default_fade_in")]
    pub fade_in: Curve,
    #[serde(default = "Curve::default_fade_out")]
    pub fade_out: Curve,
}

impl Default for FaderConfig {
    fn default() -> Self {
        Self {
            fade_in: Curve::default_fade_in(),
            fade_out: Curve::default_fade_out(),
        }
    }
}

impl FaderConfig {
    pub fn build(&self) -> Fader {
        Fader::new(self.fade_in.clone(), self.fade_out.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptedAction {
    pub at_seconds: f64,
    #[serde(flatten)]
    pub action: ControlAction,
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    1.0
}

fn default_fader() -> Option<FaderConfig> {
    Some(FaderConfig::default())
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks everything that can be checked without an audio provider.
    pub fn validate(&self) -> Result<()> {
        self.controller.validate()?;
        if self.tracks.is_empty() {
            return Err("session needs at least one track".into());
        }

        for track in &self.tracks {
            track.clock.validate()?;
        }

        let len = self.tracks.len();
        for scripted in &self.script {
            if !(scripted.at_seconds.is_finite() && scripted.at_seconds >= 0.0) {
                return Err(format!(
                    "scripted action time {} must be finite and >= 0",
                    scripted.at_seconds
                )
                .into());
            }
            if let Some(index) = scripted.action.tracks().into_iter().find(|index| *index >= len) {
                return Err(BeatSyncError::UnknownTrack { index, len });
            }
        }
        Ok(())
    }

    /// Builds a controller whose tracks play through the providers returned
    /// by `make_provider`. Tracks marked `play_on_start` are started.
    pub fn build<F>(&self, hardware: Arc<dyn HardwareClock>, mut make_provider: F) -> Result<QuantizationController>
    where
        F: FnMut(&TrackConfig) -> Box<dyn AudioProvider>,
    {
        self.validate()?;
        let mut controller = QuantizationController::new(self.controller)?;

        for config in &self.tracks {
            let mut provider = make_provider(config);
            provider.set_volume(config.initial_volume);

            let clock = BeatClock::new(config.clock, provider, hardware.clone())?;
            let fader = config.fader.as_ref().map(FaderConfig::build);
            let index = controller.add_track(Track::new(config.name.clone(), clock, fader));

            if config.play_on_start {
                controller.track_mut(index)?.clock_mut().play();
            }
        }

        Ok(controller)
    }

    /// Two looping tracks and a short script exercising every controller
    /// operation.
    pub fn demo() -> Self {
        let track = |name: &str, initial_volume: f32| TrackConfig {
            name: name.to_string(),
            clock: ClockConfig {
                bpm: 120.0,
                first_beat_offset: 0.0,
            },
            clip_duration_seconds: Some(8.0),
            play_on_start: true,
            initial_volume,
            fader: Some(FaderConfig::default()),
        };
        let at = |at_seconds: f64, action: ControlAction| ScriptedAction { at_seconds, action };

        Self {
            controller: ControllerConfig::default(),
            tracks: vec![track("drums", 1.0), track("strings", 0.0)],
            script: vec![
                at(1.0, ControlAction::FadeIn { track: 1 }),
                at(5.0, ControlAction::FadeOut { track: 0 }),
                at(9.0, ControlAction::JumpTo { track: 1, beat: 3 }),
                at(10.0, ControlAction::SyncAll { reference: 0 }),
                at(11.0, ControlAction::SetFadeOutMode { enabled: false }),
                at(11.5, ControlAction::FadeIn { track: 0 }),
                at(14.0, ControlAction::Crossfade { fade_in: 1, fade_out: 0 }),
            ],
        }
    }
}
