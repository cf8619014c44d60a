//! Curve driven fades of a single scalar value.
//!
//! A fade is an explicit task object advanced by [`Fader::tick`]; there is no
//! background scheduler. Starting a new fade replaces the running task, which
//! is how an in-flight fade gets cancelled.

use serde::{Deserialize, Serialize};

use crate::Curve;

/// Target of a fade: anything holding a live `f32`.
pub trait ValueSlot {
    fn value(&self) -> f32;
    fn set_value(&mut self, value: f32);
}

impl ValueSlot for f32 {
    fn value(&self) -> f32 {
        *self
    }

    fn set_value(&mut self, value: f32) {
        *self = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeDirection {
    In,
    Out,
}

/// Progress of the fade task owned by a [`Fader`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeTask {
    Idle,
    Sampling { direction: FadeDirection, elapsed: f32 },
}

/// What happened to the fade task during one [`Fader::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeProgress {
    Idle,
    Running,
    Completed(FadeDirection),
}

#[derive(Debug, Clone)]
pub struct Fader {
    fade_in: Curve,
    fade_out: Curve,
    enabled: bool,
    task: FadeTask,
}

impl Default for Fader {
    fn default() -> Self {
        Self::new(Curve::default_fade_in(), Curve::default_fade_out())
    }
}

impl Fader {
    pub fn new(fade_in: Curve, fade_out: Curve) -> Self {
        Self {
            fade_in,
            fade_out,
            enabled: true,
            task: FadeTask::Idle,
        }
    }

    /// Fader that ignores every fade request.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.cancel();
        }
    }

    pub fn task(&self) -> FadeTask {
        self.task
    }

    pub fn is_fading(&self) -> bool {
        matches!(self.task, FadeTask::Sampling { .. })
    }

    pub fn curve(&self, direction: FadeDirection) -> &Curve {
        match direction {
            FadeDirection::In => &self.fade_in,
            FadeDirection::Out => &self.fade_out,
        }
    }

    fn curve_mut(&mut self, direction: FadeDirection) -> &mut Curve {
        match direction {
            FadeDirection::In => &mut self.fade_in,
            FadeDirection::Out => &mut self.fade_out,
        }
    }

    /// Starts fading `slot` along the curve for `direction`.
    ///
    /// The curve's first keyframe is moved to the slot's current value so an
    /// interrupted fade continues from where the previous one left off.
    pub fn fade(&mut self, direction: FadeDirection, slot: &mut impl ValueSlot) {
        if !self.enabled {
            return;
        }

        if let FadeTask::Sampling { direction: prior, elapsed } = self.task {
            tracing::debug!(?prior, elapsed, "cancelling running fade");
        }

        let curve = self.curve_mut(direction);
        curve.set_first_value(slot.value());
        slot.set_value(curve.evaluate(0.0));

        tracing::debug!(?direction, from = slot.value(), "fade started");
        self.task = FadeTask::Sampling {
            direction,
            elapsed: 0.0,
        };
    }

    /// Drops the running fade without touching the slot.
    pub fn cancel(&mut self) {
        self.task = FadeTask::Idle;
    }

    /// Advances the running fade by one frame of `delta_seconds`.
    pub fn tick(&mut self, delta_seconds: f32, slot: &mut impl ValueSlot) -> FadeProgress {
        let FadeTask::Sampling { direction, elapsed } = self.task else {
            return FadeProgress::Idle;
        };

        let elapsed = elapsed + delta_seconds.max(0.0);
        let curve = self.curve(direction);

        if elapsed > curve.end_time() {
            slot.set_value(curve.last_keyframe().value);
            self.task = FadeTask::Idle;
            tracing::debug!(?direction, "fade completed");
            return FadeProgress::Completed(direction);
        }

        slot.set_value(curve.evaluate(elapsed));
        self.task = FadeTask::Sampling { direction, elapsed };
        FadeProgress::Running
    }

    /// Fades one value in and another out in the same step. Each fader runs
    /// on its own afterwards.
    pub fn crossfade(
        fade_in: &mut Fader,
        in_slot: &mut impl ValueSlot,
        fade_out: &mut Fader,
        out_slot: &mut impl ValueSlot,
    ) {
        fade_in.fade(FadeDirection::In, in_slot);
        fade_out.fade(FadeDirection::Out, out_slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn fade_out_samples_curve_each_tick() {
        let mut fader = Fader::default();
        let mut volume = 1.0_f32;

        fader.fade(FadeDirection::Out, &mut volume);
        assert_eq!(volume, 1.0);

        assert_eq!(fader.tick(1.5, &mut volume), FadeProgress::Running);
        assert!(close(volume, 0.5));
        assert_eq!(
            fader.task(),
            FadeTask::Sampling {
                direction: FadeDirection::Out,
                elapsed: 1.5
            }
        );
    }

    #[test]
    fn interrupting_fade_keeps_value_continuous() {
        let mut fader = Fader::default();
        let mut volume = 1.0_f32;

        fader.fade(FadeDirection::Out, &mut volume);
        fader.tick(1.8, &mut volume);
        assert!(close(volume, 0.4));

        fader.fade(FadeDirection::In, &mut volume);
        assert!(close(fader.curve(FadeDirection::In).evaluate(0.0), 0.4));
        assert!(close(volume, 0.4));

        fader.tick(1.5, &mut volume);
        assert!(close(volume, 0.7));
    }

    #[test]
    fn completion_writes_final_value_exactly() {
        for step in [0.016_f32, 0.1, 0.7, 2.9, 10.0] {
            let mut fader = Fader::default();
            let mut volume = 0.0_f32;
            fader.fade(FadeDirection::In, &mut volume);

            let mut ticks = 0;
            while fader.is_fading() {
                fader.tick(step, &mut volume);
                ticks += 1;
                assert!(ticks < 10_000);
            }

            assert_eq!(volume, 1.0, "step {step}");
            assert_eq!(fader.task(), FadeTask::Idle);
        }
    }

    #[test]
    fn cancelled_fade_stops_writing() {
        let mut fader = Fader::default();
        let mut volume = 1.0_f32;
        fader.fade(FadeDirection::Out, &mut volume);
        fader.tick(1.5, &mut volume);

        fader.cancel();
        let held = volume;
        assert_eq!(fader.tick(5.0, &mut volume), FadeProgress::Idle);
        assert_eq!(volume, held);
    }

    #[test]
    fn disabled_fader_is_inert() {
        let mut fader = Fader::disabled();
        let mut volume = 0.3_f32;

        fader.fade(FadeDirection::In, &mut volume);
        assert!(!fader.is_fading());
        assert_eq!(fader.tick(1.0, &mut volume), FadeProgress::Idle);
        assert_eq!(volume, 0.3);
    }

    #[test]
    fn crossfade_runs_both_independently() {
        let mut a = Fader::default();
        let mut b = Fader::new(
            Curve::default_fade_in(),
            Curve::linear(0.0, 1.0, 1.0, 0.0).unwrap(),
        );
        let mut a_volume = 0.0_f32;
        let mut b_volume = 1.0_f32;

        Fader::crossfade(&mut a, &mut a_volume, &mut b, &mut b_volume);
        assert!(matches!(
            a.task(),
            FadeTask::Sampling {
                direction: FadeDirection::In,
                ..
            }
        ));
        assert!(matches!(
            b.task(),
            FadeTask::Sampling {
                direction: FadeDirection::Out,
                ..
            }
        ));

        a.tick(1.5, &mut a_volume);
        assert_eq!(b.tick(1.5, &mut b_volume), FadeProgress::Completed(FadeDirection::Out));
        assert!(close(a_volume, 0.5));
        assert_eq!(b_volume, 0.0);
        assert!(a.is_fading());
    }
}
