// src/transition.rs
//! Time-driven morph between two models. Only one transition may be in
//! flight; the active model changes only in [`TransitionController::commit`].

use serde::Deserialize;

use crate::error::MorphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    QuadInOut,
    CubicInOut,
}

impl Easing {
    /// Maps normalized time in [0, 1] to progress in [0, 1].
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

/// Eased 0 -> 1 ramp. The clock starts at the first sample, so a request made
/// between frames begins on the next frame.
#[derive(Debug, Clone, Copy)]
struct Tween {
    start: Option<f32>,
    duration: f32,
    easing: Easing,
}

impl Tween {
    fn new(duration: f32, easing: Easing) -> Self {
        Self { start: None, duration, easing }
    }

    /// A zero, negative or non-finite duration completes on the first sample.
    fn sample(&mut self, time: f32) -> f32 {
        let start = *self.start.get_or_insert(time);
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return 1.0;
        }
        let t = (time - start) / self.duration;
        if t >= 1.0 { 1.0 } else { self.easing.apply(t) }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub source: usize,
    pub target: usize,
    pub progress: f32,
    tween: Tween,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionStatus {
    Idle,
    Running { progress: f32 },
    /// Progress reached exactly 1. The caller renders this frame, then commits.
    Finished { source: usize, target: usize },
}

#[derive(Debug)]
pub struct TransitionController {
    model_count: usize,
    active: usize,
    duration: f32,
    easing: Easing,
    transition: Option<Transition>,
}

impl TransitionController {
    pub fn new(model_count: usize, duration: f32, easing: Easing) -> Self {
        Self {
            model_count,
            active: 0,
            duration,
            easing,
            transition: None,
        }
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn target(&self) -> Option<usize> {
        self.transition.map(|t| t.target)
    }

    /// 0 when idle.
    pub fn progress(&self) -> f32 {
        self.transition.map_or(0.0, |t| t.progress)
    }

    pub fn in_flight(&self) -> Option<&Transition> {
        self.transition.as_ref()
    }

    /// Starts a morph from the active model to `target`.
    ///
    /// Fails with `InvalidModelIndex` for an unknown model and with `Busy`
    /// while another transition is running; neither touches the current state.
    /// Selecting the already active model while idle is accepted and does nothing.
    pub fn request_transition(&mut self, target: usize) -> Result<(), MorphError> {
        if target >= self.model_count {
            return Err(MorphError::InvalidModelIndex {
                index: target,
                count: self.model_count,
            });
        }
        if let Some(in_flight) = &self.transition {
            return Err(MorphError::Busy {
                in_flight_target: in_flight.target,
            });
        }
        if target == self.active {
            log::info!("Model {} is already active", target);
            return Ok(());
        }

        log::info!("Transition {} -> {} over {}s", self.active, target, self.duration);
        self.transition = Some(Transition {
            source: self.active,
            target,
            progress: 0.0,
            tween: Tween::new(self.duration, self.easing),
        });
        Ok(())
    }

    /// Samples the tween at `time`. Progress never decreases within a transition.
    pub fn tick(&mut self, time: f32) -> TransitionStatus {
        let Some(transition) = self.transition.as_mut() else {
            return TransitionStatus::Idle;
        };

        let sampled = transition.tween.sample(time).clamp(0.0, 1.0);
        transition.progress = transition.progress.max(sampled);

        if transition.progress >= 1.0 {
            TransitionStatus::Finished {
                source: transition.source,
                target: transition.target,
            }
        } else {
            TransitionStatus::Running {
                progress: transition.progress,
            }
        }
    }

    /// Makes the target the active model once progress has reached 1.
    /// Returns the new active index, or `None` if nothing was ready to commit.
    pub fn commit(&mut self) -> Option<usize> {
        match self.transition {
            Some(transition) if transition.progress >= 1.0 => {
                self.active = transition.target;
                self.transition = None;
                log::info!("Committed model {}", self.active);
                Some(self.active)
            }
            _ => None,
        }
    }
}
