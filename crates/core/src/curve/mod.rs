use serde::{Deserialize, Serialize};

use crate::{BeatSyncError, Result};

/// A single `(time, value)` anchor of a [`Curve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
}

impl Keyframe {
    pub fn new(time: f32, value: f32) -> Self {
        Self { time, value }
    }
}

/// How values are blended between two neighbouring keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Linear,
    /// Smoothstep easing, flat at both keyframes.
    Smooth,
    /// Holds the left keyframe's value until the next keyframe is reached.
    Step,
}

impl Interpolation {
    fn shape(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Interpolation::Linear => t,
            Interpolation::Smooth => t * t * (3.0 - 2.0 * t),
            Interpolation::Step => 0.0,
        }
    }
}

/// Piecewise curve over time used to drive fades.
///
/// A curve always holds at least one keyframe and its keyframe times are
/// strictly increasing; both are checked on construction and on
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CurveDef", into = "CurveDef")]
pub struct Curve {
    keyframes: Vec<Keyframe>,
    interpolation: Interpolation,
}

impl Curve {
    pub fn new(keyframes: Vec<Keyframe>, interpolation: Interpolation) -> Result<Self> {
        if keyframes.is_empty() {
            return Err(BeatSyncError::EmptyCurve);
        }

        for (index, key) in keyframes.iter().enumerate() {
            let ordered = index == 0 || key.time > keyframes[index - 1].time;
            if !key.time.is_finite() || !key.value.is_finite() || !ordered {
                return Err(BeatSyncError::InvalidKeyframe { index });
            }
        }

        Ok(Self {
            keyframes,
            interpolation,
        })
    }

    /// Straight line from `(start_time, start_value)` to `(end_time, end_value)`.
    pub fn linear(start_time: f32, start_value: f32, end_time: f32, end_value: f32) -> Result<Self> {
        Self::new(
            vec![
                Keyframe::new(start_time, start_value),
                Keyframe::new(end_time, end_value),
            ],
            Interpolation::Linear,
        )
    }

    /// Default fade-in: 0 to 1 over three seconds.
    pub fn default_fade_in() -> Self {
        Self {
            keyframes: vec![Keyframe::new(0.0, 0.0), Keyframe::new(3.0, 1.0)],
            interpolation: Interpolation::Linear,
        }
    }

    /// Default fade-out: 1 to 0 over three seconds.
    pub fn default_fade_out() -> Self {
        Self {
            keyframes: vec![Keyframe::new(0.0, 1.0), Keyframe::new(3.0, 0.0)],
            interpolation: Interpolation::Linear,
        }
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn first_keyframe(&self) -> Keyframe {
        self.keyframes[0]
    }

    pub fn last_keyframe(&self) -> Keyframe {
        self.keyframes[self.keyframes.len() - 1]
    }

    /// Time of the final keyframe; a fade over this curve ends there.
    pub fn end_time(&self) -> f32 {
        self.last_keyframe().time
    }

    /// Overwrites the value of the first keyframe, keeping its time.
    pub fn set_first_value(&mut self, value: f32) {
        self.keyframes[0].value = value;
    }

    /// Samples the curve, clamping to the first and last keyframe outside
    /// their time range.
    pub fn evaluate(&self, time: f32) -> f32 {
        let first = self.first_keyframe();
        let last = self.last_keyframe();
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }

        // first.time < time < last.time, so 1 <= upper < len.
        let upper = self.keyframes.partition_point(|key| key.time <= time);
        let left = self.keyframes[upper - 1];
        let right = self.keyframes[upper];
        let t = (time - left.time) / (right.time - left.time);

        left.value + self.interpolation.shape(t) * (right.value - left.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CurveDef {
    keyframes: Vec<Keyframe>,
    #[serde(default)]
    interpolation: Interpolation,
}

impl TryFrom<CurveDef> for Curve {
    type Error = BeatSyncError;

    fn try_from(value: CurveDef) -> Result<Self> {
        Curve::new(value.keyframes, value.interpolation)
    }
}

impl From<Curve> for CurveDef {
    fn from(value: Curve) -> Self {
        Self {
            keyframes: value.keyframes,
            interpolation: value.interpolation,
        }
    }
}
