//! Small quadrature helpers for smooth integrands.

/// Composite Simpson rule of `f` over `[a, b]` with `intervals` sub-intervals
/// (rounded up to an even number).
pub fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, intervals: usize) -> f64 {
    let m = (intervals.max(2) + 1) & !1;
    let h = (b - a) / m as f64;
    let mut sum = f(a) + f(b);
    for i in 1..m {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + i as f64 * h);
    }
    sum * h / 3.0
}

/// Solve `f(x) = target` for monotonically increasing `f` on `[lo, hi]` by
/// bisection.
pub fn bisect<F: Fn(f64) -> f64>(f: F, target: f64, mut lo: f64, mut hi: f64) -> f64 {
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if f(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simpson_is_exact_for_cubics() {
        let got = simpson(|x| x * x * x - 2.0 * x + 1.0, 0.0, 2.0, 4);
        assert!((got - 2.0).abs() < 1e-12);
    }

    #[test]
    fn simpson_rounds_odd_interval_counts() {
        let got = simpson(|x| x.sin(), 0.0, std::f64::consts::PI, 101);
        assert!((got - 2.0).abs() < 1e-6);
    }

    #[test]
    fn bisection_finds_root() {
        let x = bisect(|x| x * x, 2.0, 0.0, 2.0);
        assert!((x - 2.0_f64.sqrt()).abs() < 1e-12);
    }
}
