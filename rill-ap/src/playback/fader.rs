//! Fade ramps and gain computation
//!
//! # Gain Model
//!
//! Evaluated every tick for every Player:
//!
//! ```text
//! effective_gain = master × category × player_base × fade_factor
//! ```
//!
//! `fade_factor` follows a timed ramp between two factors in [0, 1]; outside
//! a fade it holds the value the last ramp ended on (1.0 by default).

use rill_common::FadeCurve;

/// What the Player does once a fade ramp completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeEnd {
    /// Keep playing at the reached factor
    Continue,

    /// Pause the voice (fade-to-pause)
    Pause,

    /// Stop the voice (fade-to-stop)
    Stop,
}

/// A timed ramp of the fade factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    from: f32,
    to: f32,
    elapsed: f32,
    duration: f32,
    curve: FadeCurve,
    on_complete: FadeEnd,
}

impl Fade {
    /// Ramp from `from` to `to` over `duration` seconds
    pub fn new(from: f32, to: f32, duration: f32, curve: FadeCurve, on_complete: FadeEnd) -> Self {
        Self {
            from: from.clamp(0.0, 1.0),
            to: to.clamp(0.0, 1.0),
            elapsed: 0.0,
            duration: duration.max(0.0),
            curve,
            on_complete,
        }
    }

    /// Advance the ramp by `dt` seconds
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt.max(0.0);
    }

    /// Current fade factor
    pub fn factor(&self) -> f32 {
        if self.duration <= 0.0 {
            return self.to;
        }
        self.curve.interpolate(self.from, self.to, self.elapsed / self.duration)
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// True for ramps that raise the factor
    pub fn is_rising(&self) -> bool {
        self.to > self.from
    }

    pub fn on_complete(&self) -> FadeEnd {
        self.on_complete
    }

    /// Seconds left until completion
    pub fn remaining(&self) -> f32 {
        (self.duration - self.elapsed).max(0.0)
    }
}

/// Combine the gain stages into one linear gain in [0, 1]
pub fn effective_gain(master: f32, category: f32, base: f32, fade_factor: f32) -> f32 {
    (master * category * base * fade_factor).clamp(0.0, 1.0)
}
