//! Fade curve shapes for gain ramps
//!
//! A curve maps normalized fade progress `t` in [0, 1] onto a ramp weight in
//! [0, 1]. Every curve is monotonic non-decreasing and exact at both ends, so
//! a ramp always lands precisely on its target gain.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Fade curve types
///
/// - Linear: constant rate of change (default)
/// - SCurve: smooth acceleration and deceleration
/// - EqualPower: constant perceived loudness when two ramps overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FadeCurve {
    /// v(t) = t
    #[default]
    Linear,

    /// v(t) = 0.5 × (1 - cos(π × t))
    SCurve,

    /// v(t) = sin(t × π/2)
    EqualPower,
}

impl FadeCurve {
    /// Ramp weight at normalized progress `t` (clamped to [0, 1])
    pub fn weight(&self, t: f32) -> f32 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }

        match self {
            FadeCurve::Linear => t,
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Interpolate from `from` to `to` at normalized progress `t`
    ///
    /// Works in both directions: a fade-out is simply `from > to`.
    pub fn interpolate(&self, from: f32, to: f32, t: f32) -> f32 {
        let w = self.weight(t);
        if w >= 1.0 {
            return to;
        }
        from + (to - from) * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [FadeCurve; 3] = [FadeCurve::Linear, FadeCurve::SCurve, FadeCurve::EqualPower];

    #[test]
    fn test_endpoints_exact() {
        for curve in CURVES {
            assert_eq!(curve.weight(0.0), 0.0, "{:?}", curve);
            assert_eq!(curve.weight(1.0), 1.0, "{:?}", curve);
            assert_eq!(curve.weight(-3.0), 0.0, "{:?}", curve);
            assert_eq!(curve.weight(7.5), 1.0, "{:?}", curve);
        }
    }

    #[test]
    fn test_monotonic() {
        for curve in CURVES {
            let mut last = 0.0;
            for i in 0..=100 {
                let w = curve.weight(i as f32 / 100.0);
                assert!(w >= last, "{:?} decreased at step {}", curve, i);
                last = w;
            }
        }
    }

    #[test]
    fn test_linear_midpoint() {
        assert!((FadeCurve::Linear.weight(0.5) - 0.5).abs() < 1e-6);
        assert!((FadeCurve::SCurve.weight(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_lands_on_target() {
        assert_eq!(FadeCurve::Linear.interpolate(1.0, 0.0, 1.0), 0.0);
        assert_eq!(FadeCurve::EqualPower.interpolate(0.2, 0.9, 1.0), 0.9);
        assert!((FadeCurve::Linear.interpolate(1.0, 0.0, 0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Holder {
            curve: FadeCurve,
        }
        let holder: Holder = toml::from_str("curve = \"equal-power\"").unwrap();
        assert_eq!(holder.curve, FadeCurve::EqualPower);
    }
}
