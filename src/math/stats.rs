//! Order statistics over voxel samples.
//!
//! Percentiles use linear interpolation between closest ranks, so that
//! `percentile(v, 50.0)` and `median(v)` agree for even-length inputs:
//!
//! ```text
//! rank = q / 100 * (n - 1)
//! p    = v[floor(rank)] + (rank - floor(rank)) * (v[ceil(rank)] - v[floor(rank)])
//! ```
//!
//! A NaN anywhere in the input makes the result NaN. Use
//! [`finite_percentile`] to ignore non-finite values instead.

/// `q`-th percentile (0..=100) of `values`, or `None` for empty input.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    percentile_mut(&mut sorted, q)
}

/// Like [`percentile`] but sorts `values` in place to avoid a copy.
pub fn percentile_mut(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    if values.iter().any(|v| v.is_nan()) {
        return Some(f64::NAN);
    }
    values.sort_by(f64::total_cmp);

    let q = q.clamp(0.0, 100.0);
    let rank = q / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(values[lo] + frac * (values[hi] - values[lo]))
}

/// [`percentile`] over the finite entries only; `None` if there are none.
pub fn finite_percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    percentile_mut(&mut finite, q)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    percentile_mut(values, 50.0)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
