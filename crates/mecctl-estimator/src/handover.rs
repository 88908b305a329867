//! Handover-time prediction from a fitted trajectory and hysteresis (§4.3). Prefers
//! the trajectory-intersection form over the coefficient-solver path (open question c).

use crate::log_distance::PATH_LOSS_EXPONENT;

pub const DEFAULT_HYSTERESIS_DB: f64 = 7.0;

/// A straight-line fit `y = a*x + b` plus the current position and velocity used to
/// walk along it.
#[derive(Debug, Clone, Copy)]
pub struct Trajectory {
    pub a: f64,
    pub b: f64,
    pub x0: f64,
    pub vx: f64,
}

/// Solves `d_s^2 - omega*d_d^2 = 0` along the trajectory for the time at which the
/// user crosses from being closer to the source BS to closer (by the hysteresis
/// margin) to the destination BS. Returns `None` if no non-negative real root exists.
pub fn handover_time(
    trajectory: Trajectory,
    source_bs: (f64, f64),
    dest_bs: (f64, f64),
    hysteresis_db: f64,
) -> Option<f64> {
    let omega = 10f64.powf(hysteresis_db / (5.0 * PATH_LOSS_EXPONENT));
    let (xs, ys) = source_bs;
    let (xd, yd) = dest_bs;
    let a = trajectory.a;
    let b = trajectory.b;

    // (x-xs)^2 + (ax+b-ys)^2 - omega*((x-xd)^2 + (ax+b-yd)^2) = 0
    let quad_a = (1.0 + a * a) * (1.0 - omega);
    let quad_b = (-2.0 * xs + 2.0 * a * (b - ys)) - omega * (-2.0 * xd + 2.0 * a * (b - yd));
    let quad_c =
        (xs * xs + (b - ys).powi(2)) - omega * (xd * xd + (b - yd).powi(2));

    let roots = solve_quadratic(quad_a, quad_b, quad_c);
    if trajectory.vx.abs() < 1e-12 {
        return None;
    }
    roots
        .into_iter()
        .map(|x_root| (x_root - trajectory.x0) / trajectory.vx)
        .filter(|t| *t >= 0.0 && t.is_finite())
        .min_by(|l, r| l.partial_cmp(r).unwrap())
}

fn solve_quadratic(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a.abs() < 1e-12 {
        if b.abs() < 1e-12 {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let sqrt_disc = disc.sqrt();
    vec![(-b + sqrt_disc) / (2.0 * a), (-b - sqrt_disc) / (2.0 * a)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_toward_destination_finds_positive_time() {
        // Straight line along x-axis (a=0, b=0), source at x=0, dest at x=100, user
        // moving at +1 m/s from x=0: should produce a finite positive crossing time.
        let trajectory = Trajectory { a: 0.0, b: 0.0, x0: 0.0, vx: 1.0 };
        let t = handover_time(trajectory, (0.0, 0.0), (100.0, 0.0), DEFAULT_HYSTERESIS_DB);
        assert!(t.is_some());
        assert!(t.unwrap() > 0.0);
    }

    #[test]
    fn stationary_user_is_undefined() {
        let trajectory = Trajectory { a: 0.0, b: 0.0, x0: 0.0, vx: 0.0 };
        let t = handover_time(trajectory, (0.0, 0.0), (100.0, 0.0), DEFAULT_HYSTERESIS_DB);
        assert!(t.is_none());
    }

    #[test]
    fn higher_hysteresis_does_not_decrease_handover_time() {
        let trajectory = Trajectory { a: 0.0, b: 0.0, x0: 0.0, vx: 1.0 };
        let low = handover_time(trajectory, (0.0, 0.0), (100.0, 0.0), 3.0);
        let high = handover_time(trajectory, (0.0, 0.0), (100.0, 0.0), 10.0);
        if let (Some(low), Some(high)) = (low, high) {
            assert!(high >= low - 1e-9);
        }
    }
}
