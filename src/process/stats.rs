//! NaN-ignoring reductions over flux arrays.

/// Median of the finite values, `None` when there are none.
pub fn nan_median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) * 0.5)
    } else {
        Some(v[mid])
    }
}

/// Mean of the finite values.
pub fn nan_mean(values: &[f64]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Population variance (normalized by N) of the finite values.
pub fn nan_variance(values: &[f64]) -> Option<f64> {
    let mean = nan_mean(values)?;
    let (sum, n) = values
        .iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0usize), |(s, n), x| (s + (x - mean).powi(2), n + 1));
    Some(sum / n as f64)
}

pub fn nan_min(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|x| x.is_finite()).reduce(f64::min)
}

pub fn nan_max(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|x| x.is_finite()).reduce(f64::max)
}
