use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// A closed interval `[lower, upper]` over a distance or an angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ValueBounds {
    /// Creates bounds from two values, swapping them if necessary so that
    /// `lower <= upper` always holds.
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }

    pub fn around(center: f64, absolute_variance: f64) -> Self {
        Self::new(center - absolute_variance, center + absolute_variance)
    }

    pub fn relative(center: f64, relative_variance: f64) -> Self {
        Self::new(
            (1.0 - relative_variance) * center,
            (1.0 + relative_variance) * center,
        )
    }

    /// The widest possible angle interval, `[0, π]`.
    pub fn full_angle() -> Self {
        Self {
            lower: 0.0,
            upper: PI,
        }
    }

    /// Restricts both ends to `[0, π]`.
    pub fn clamp_angle(self) -> Self {
        Self::new(self.lower.clamp(0.0, PI), self.upper.clamp(0.0, PI))
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn center(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

impl fmt::Display for ValueBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_orders_endpoints() {
        let bounds = ValueBounds::new(2.0, 1.0);
        assert_eq!(bounds.lower, 1.0);
        assert_eq!(bounds.upper, 2.0);
    }

    #[test]
    fn around_and_relative_center_on_value() {
        let around = ValueBounds::around(1.0, 0.25);
        assert_eq!(around, ValueBounds::new(0.75, 1.25));
        assert!((around.center() - 1.0).abs() < 1e-12);

        let relative = ValueBounds::relative(1.5, 0.01);
        assert!((relative.lower - 1.485).abs() < 1e-12);
        assert!((relative.upper - 1.515).abs() < 1e-12);
    }

    #[test]
    fn clamp_angle_restricts_to_zero_and_pi() {
        let clamped = ValueBounds::new(-0.3, 3.5).clamp_angle();
        assert_eq!(clamped, ValueBounds::full_angle());

        let inner = ValueBounds::new(0.5, 1.0).clamp_angle();
        assert_eq!(inner, ValueBounds::new(0.5, 1.0));
    }

    #[test]
    fn contains_is_inclusive() {
        let bounds = ValueBounds::new(1.0, 2.0);
        assert!(bounds.contains(1.0));
        assert!(bounds.contains(2.0));
        assert!(!bounds.contains(2.0001));
        assert!((bounds.width() - 1.0).abs() < 1e-12);
    }
}
