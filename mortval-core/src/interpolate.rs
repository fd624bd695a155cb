//! Linear interpolation of sparsely observed annual series
//!
//! Demographic sources are observed every five years. These helpers fill the
//! gaps of a year-indexed series by linear interpolation between the
//! surrounding observed anchors:
//!
//! $$ v(t) = v(t_0) + \frac{t - t_0}{t_1 - t_0} \left( v(t_1) - v(t_0) \right) $$
//!
//! Missing values after the last anchor hold the last anchor's value. Missing
//! values before the first anchor stay missing; there is nothing to
//! interpolate from.

use num::Float;

/// Fill the missing (NaN) entries of a series observed on consecutive
/// positions by linear interpolation between observed neighbours.
///
/// Positions are assumed equally spaced, which holds for a year axis
/// without gaps.
///
/// Returns the number of leading entries that could not be filled.
///
/// # Example
///
/// ```
/// use mortval_core::interpolate::fill_linear;
///
/// let mut series = vec![1.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, 6.0, f64::NAN];
/// let unfilled = fill_linear(&mut series);
/// assert_eq!(unfilled, 0);
/// assert_eq!(series, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 6.0]);
/// ```
pub fn fill_linear<T: Float>(values: &mut [T]) -> usize {
    let anchors: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, _)| i)
        .collect();

    let Some(&first) = anchors.first() else {
        return values.len();
    };

    for pair in anchors.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let (v_lo, v_hi) = (values[lo], values[hi]);
        let span = T::from(hi - lo).unwrap_or_else(T::one);
        for i in (lo + 1)..hi {
            let frac = T::from(i - lo).unwrap_or_else(T::zero) / span;
            values[i] = lerp(v_lo, v_hi, frac);
        }
    }

    if let Some(&last) = anchors.last() {
        let held = values[last];
        for v in values.iter_mut().skip(last + 1) {
            *v = held;
        }
    }

    first
}

/// Linear combination `a + frac * (b - a)`.
pub fn lerp<T: Float>(a: T, b: T, frac: T) -> T {
    a + frac * (b - a)
}

/// Evaluate the piecewise-linear function through `(xs, ys)` at `x`.
///
/// `xs` must be strictly increasing. Outside the anchor range the nearest
/// anchor value is returned. Returns `None` if there are no anchors.
pub fn interpolate_at<T: Float>(xs: &[T], ys: &[T], x: T) -> Option<T> {
    assert_eq!(xs.len(), ys.len(), "xs and ys must have the same length");
    let n = xs.len();
    if n == 0 {
        return None;
    }
    if x <= xs[0] {
        return Some(ys[0]);
    }
    if x >= xs[n - 1] {
        return Some(ys[n - 1]);
    }
    let hi = xs.partition_point(|&v| v < x);
    if xs[hi] == x {
        return Some(ys[hi]);
    }
    let lo = hi - 1;
    let frac = (x - xs[lo]) / (xs[hi] - xs[lo]);
    Some(lerp(ys[lo], ys[hi], frac))
}
