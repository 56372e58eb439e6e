use std::f64::consts::PI;

/// Easing curve mapping linear progress in [0, 1] to eased progress.
#[derive(Debug, Clone, Copy)]
pub enum Easing {
    Linear,
    QuadraticIn,
    QuadraticOut,
    QuadraticInOut,
    CubicInOut,
    QuinticOut,
    SineInOut,
    Custom(fn(f64) -> f64),
}

impl Default for Easing {
    fn default() -> Self {
        Easing::QuadraticInOut
    }
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadraticIn => t * t,
            Easing::QuadraticOut => t * (2.0 - t),
            Easing::QuadraticInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = 2.0 * t - 2.0;
                    0.5 * u * u * u + 1.0
                }
            }
            Easing::QuinticOut => {
                let u = t - 1.0;
                u * u * u * u * u + 1.0
            }
            Easing::SineInOut => 0.5 * (1.0 - (PI * t).cos()),
            Easing::Custom(f) => f(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ALL: [Easing; 7] = [
        Easing::Linear,
        Easing::QuadraticIn,
        Easing::QuadraticOut,
        Easing::QuadraticInOut,
        Easing::CubicInOut,
        Easing::QuinticOut,
        Easing::SineInOut,
    ];

    #[test]
    fn test_endpoints() {
        for easing in ALL {
            assert_abs_diff_eq!(easing.apply(0.0), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(easing.apply(1.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_monotonic() {
        for easing in ALL {
            let mut last = 0.0;
            for i in 1..=100 {
                let v = easing.apply(i as f64 / 100.0);
                assert!(v >= last - 1e-12, "{:?} not monotonic at {}", easing, i);
                last = v;
            }
        }
    }

    #[test]
    fn test_in_out_symmetry() {
        assert_abs_diff_eq!(Easing::QuadraticInOut.apply(0.5), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(
            Easing::QuadraticInOut.apply(0.25) + Easing::QuadraticInOut.apply(0.75),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_clamps_input() {
        assert_eq!(Easing::QuinticOut.apply(2.0), 1.0);
        assert_eq!(Easing::QuadraticIn.apply(-1.0), 0.0);
    }
}
