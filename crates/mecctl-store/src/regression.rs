//! Trajectory refit (`y = a*x + b`) over the last-5 position ring, and velocity by
//! finite differences (§4.2).

use mecctl_types::model::PositionFix;

/// Ordinary least squares fit of `y = a*x + b`. Needs at least 2 points; with fewer,
/// returns `(0.0, mean_y)` (a degenerate flat line) rather than panicking.
pub fn fit_trajectory(points: &[PositionFix]) -> (f64, f64) {
    let n = points.len() as f64;
    if points.len() < 2 {
        let b = points.first().map(|p| p.y).unwrap_or(0.0);
        return (0.0, b);
    }
    let sum_x: f64 = points.iter().map(|p| p.x).sum();
    let sum_y: f64 = points.iter().map(|p| p.y).sum();
    let sum_xy: f64 = points.iter().map(|p| p.x * p.y).sum();
    let sum_xx: f64 = points.iter().map(|p| p.x * p.x).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < 1e-9 {
        // Vertical cluster of points (constant x): no slope is defined, fall back to
        // a flat line through the mean y, same as the <2-point case.
        return (0.0, sum_y / n);
    }
    let a = (n * sum_xy - sum_x * sum_y) / denom;
    let b = (sum_y - a * sum_x) / n;
    (a, b)
}

/// Finite-difference velocity between the last two ring entries. `(0.0, 0.0)` with
/// fewer than two samples or two samples at the same timestamp.
pub fn finite_difference_velocity(points: &[PositionFix]) -> (f64, f64) {
    let len = points.len();
    if len < 2 {
        return (0.0, 0.0);
    }
    let prev = points[len - 2];
    let last = points[len - 1];
    let dt = last.t - prev.t;
    if dt.abs() < 1e-9 {
        return (0.0, 0.0);
    }
    ((last.x - prev.x) / dt, (last.y - prev.y) / dt)
}

/// Push a new fix into the last-5 ring (§4.2), dropping the oldest once full.
pub fn push_position_ring(ring: &mut Vec<PositionFix>, fix: PositionFix) {
    ring.push(fix);
    if ring.len() > 5 {
        ring.remove(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exact_line() {
        let points = vec![
            PositionFix { t: 0.0, x: 0.0, y: 1.0 },
            PositionFix { t: 1.0, x: 1.0, y: 3.0 },
            PositionFix { t: 2.0, x: 2.0, y: 5.0 },
        ];
        let (a, b) = fit_trajectory(&points);
        assert!((a - 2.0).abs() < 1e-9);
        assert!((b - 1.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_from_last_two_points() {
        let points = vec![
            PositionFix { t: 0.0, x: 0.0, y: 0.0 },
            PositionFix { t: 2.0, x: 4.0, y: -2.0 },
        ];
        let (vx, vy) = finite_difference_velocity(&points);
        assert!((vx - 2.0).abs() < 1e-9);
        assert!((vy - -1.0).abs() < 1e-9);
    }

    #[test]
    fn ring_caps_at_five() {
        let mut ring = Vec::new();
        for i in 0..8 {
            push_position_ring(&mut ring, PositionFix { t: i as f64, x: i as f64, y: 0.0 });
        }
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first().unwrap().t, 3.0);
    }
}
