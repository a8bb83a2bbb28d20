use log::{debug, warn};

use super::stats::nan_median;
use crate::data::model::Spectrum;
use crate::error::{SpecError, SpecResult};

/// Tolerance added to the upper edge when checking that an interval holds data.
const EDGE_SLACK: f64 = 0.0022;

// ---------------------------------------------------------------------------
// Trapezoidal integration
// ---------------------------------------------------------------------------

/// Integrate `y(x)` with the trapezoid rule.
pub fn integrate(x: &[f64], y: &[f64]) -> SpecResult<f64> {
    if x.len() != y.len() {
        return Err(SpecError::LengthMismatch {
            what: "integrate y",
            expected: x.len(),
            found: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(SpecError::EmptyInput("integrate needs at least 2 points"));
    }
    Ok(x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| (xw[1] - xw[0]) * (yw[1] + yw[0]) * 0.5)
        .sum())
}

// ---------------------------------------------------------------------------
// Band-averaged flux
// ---------------------------------------------------------------------------

/// Average flux over a wavelength interval and its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandFlux {
    pub flux: f64,
    pub sigma: f64,
}

/// Average flux between `start` and `end`, counting the two edge pixels by
/// the fraction of their width that falls inside the interval.
///
/// With an uncertainty array the error is the quadrature sum of the weighted
/// pixel errors; otherwise it is the standard error of the selected fluxes.
/// With `median` set and more than five pixels selected, the median flux is
/// returned instead (a warning is logged if it differs from the mean by more
/// than 3%).
pub fn avg_flux(spectrum: &Spectrum, start: f64, end: f64, median: bool) -> SpecResult<BandFlux> {
    if !(start < end) {
        return Err(SpecError::InvalidLimits {
            low: start,
            high: end,
        });
    }
    let wl = &spectrum.wavelength;
    let min_wl = wl.iter().copied().fold(f64::INFINITY, f64::min);
    let max_wl = wl.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min_wl > start || max_wl < end {
        return Err(SpecError::OutsideLimits);
    }
    if !wl.iter().any(|w| *w >= start && *w <= end + EDGE_SLACK) {
        return Err(SpecError::NoBand);
    }

    // pixel scale at the first sample inside the interval
    let first_in = wl
        .iter()
        .position(|w| *w >= start)
        .ok_or(SpecError::OutsideLimits)?;
    if first_in + 1 >= wl.len() {
        return Err(SpecError::NoBand);
    }
    let pix_scale = wl[first_in + 1] - wl[first_in];

    let selected: Vec<usize> = (0..wl.len())
        .filter(|&i| wl[i] + pix_scale / 2.0 >= start && wl[i] - pix_scale / 2.0 <= end)
        .collect();
    let (Some(&first), Some(&last)) = (selected.first(), selected.last()) else {
        return Err(SpecError::NoBand);
    };
    let n = selected.len();
    let flux: Vec<f64> = selected.iter().map(|&i| spectrum.flux[i]).collect();

    let frac_first = (wl[first] + pix_scale / 2.0 - start) / pix_scale;
    let frac_last = (end - wl[last] + pix_scale / 2.0) / pix_scale;
    let weight = |pos: usize| {
        if pos == 0 {
            frac_first
        } else if pos == n - 1 {
            frac_last
        } else {
            1.0
        }
    };

    let real_pix = n as f64 - 2.0 + frac_first + frac_last;
    let sum_flux: f64 = flux.iter().enumerate().map(|(p, f)| weight(p) * f).sum();
    let mut avg = sum_flux / real_pix;

    let sigma = match &spectrum.uncertainty {
        Some(unc) => {
            let sum_sq: f64 = selected
                .iter()
                .enumerate()
                .map(|(p, &i)| (weight(p) * unc[i]).powi(2))
                .sum();
            sum_sq.sqrt() / real_pix
        }
        None => {
            let mean = flux.iter().sum::<f64>() / n as f64;
            let sum_dev: f64 = flux.iter().map(|f| (f - mean).powi(2)).sum();
            (sum_dev / (n as f64 - 1.0)).sqrt() / (n as f64).sqrt()
        }
    };

    if median && n > 5 {
        let average = avg;
        avg = nan_median(&flux).unwrap_or(f64::NAN);
        let diff = 100.0 * (avg - average).abs() / average;
        if diff > 3.0 {
            warn!(
                "avg_flux: median {avg} and average {average} differ by {diff:.1}% (more than 3%)"
            );
        } else {
            debug!("avg_flux: median used ({avg})");
        }
    }

    Ok(BandFlux { flux: avg, sigma })
}
