use log::{debug, warn};

use super::clean::clean_outliers;
use super::stats::{nan_max, nan_mean, nan_median, nan_min, nan_variance};
use crate::data::model::{Extrema, Spectrum, Template};
use crate::error::{SpecError, SpecResult};

// ---------------------------------------------------------------------------
// Linear resampling
// ---------------------------------------------------------------------------

/// Linearly interpolate `(x, y)` at the points `at`.
///
/// `x` must be increasing. Points outside `[x[0], x[n-1]]` give NaN, and a
/// NaN neighbour makes the interpolated value NaN.
pub fn interpolate(x: &[f64], y: &[f64], at: &[f64]) -> Vec<f64> {
    let n = x.len().min(y.len());
    at.iter()
        .map(|&q| {
            let idx = x[..n].partition_point(|v| *v < q);
            if idx < n && x[idx] == q {
                return y[idx];
            }
            if idx == 0 || idx == n {
                return f64::NAN;
            }
            let (lo, hi) = (idx - 1, idx);
            y[lo] + (y[hi] - y[lo]) * (q - x[lo]) / (x[hi] - x[lo])
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Mean combination
// ---------------------------------------------------------------------------

/// Switches for [`mean_comb`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CombineOptions {
    /// MAD threshold for rejecting flux outliers before combining.
    pub robust: Option<f64>,
    /// Use a plain mean even when every member has uncertainties.
    pub force_unweighted: bool,
    /// Also compute per-sample min and max flux.
    pub extremes: bool,
    /// Rescale each member against the combined mean and return the results.
    pub renormalize: bool,
}

/// Output of [`mean_comb`].
#[derive(Debug, Clone, PartialEq)]
pub struct Combined {
    pub template: Template,
    /// Whether inverse-variance weights were used.
    pub weighted: bool,
    /// Members on the mask grid divided by their median ratio to the template;
    /// present when requested.
    pub renormalized: Option<Vec<Spectrum>>,
}

/// One member resampled onto the mask.
struct Resampled<'a> {
    source: &'a Spectrum,
    flux: Vec<f64>,
    uncertainty: Option<Vec<f64>>,
}

/// Combine spectra into a template with a (weighted) mean.
///
/// `None` slots are ignored. Without a `mask`, the first member's wavelength
/// grid is used as-is and only the other members are interpolated onto it.
/// Weights `1/σ²` are used only when every member carries usable
/// uncertainties; the variance is then `1 / Σ(1/σ²)`. Otherwise the mean and
/// the population variance across members are reported. Non-finite samples
/// are left out of every per-sample statistic.
pub fn mean_comb(
    spectra: &[Option<Spectrum>],
    mask: Option<&[f64]>,
    options: &CombineOptions,
) -> SpecResult<Combined> {
    let members: Vec<&Spectrum> = spectra.iter().flatten().collect();
    if members.is_empty() {
        return Err(SpecError::EmptyInput("mean_comb needs at least one spectrum"));
    }
    let wl_mask: Vec<f64> = match mask {
        Some(m) if m.is_empty() => return Err(SpecError::EmptyInput("mean_comb mask")),
        Some(m) => m.to_vec(),
        None => members[0].wavelength.clone(),
    };

    let weighted =
        !options.force_unweighted && members.iter().all(|sp| sp.has_finite_uncertainty());
    debug!(
        "mean_comb: {} members on {} points, weighted = {weighted}",
        members.len(),
        wl_mask.len()
    );

    let resampled: Vec<Resampled> = members
        .iter()
        .copied()
        .enumerate()
        .map(|(idx, sp)| {
            let flux = match options.robust {
                Some(thresh) => clean_outliers(&sp.flux, thresh),
                None => sp.flux.clone(),
            };
            let unc = if weighted { sp.uncertainty.as_ref() } else { None };

            if idx == 0 && mask.is_none() {
                Resampled {
                    source: sp,
                    flux,
                    uncertainty: unc.cloned(),
                }
            } else {
                Resampled {
                    source: sp,
                    flux: interpolate(&sp.wavelength, &flux, &wl_mask),
                    uncertainty: unc.map(|u| interpolate(&sp.wavelength, u, &wl_mask)),
                }
            }
        })
        .collect();

    let n_points = wl_mask.len();
    let mut mean = Vec::with_capacity(n_points);
    let mut variance = Vec::with_capacity(n_points);
    let mut column = Vec::with_capacity(resampled.len());
    let mut min = Vec::new();
    let mut max = Vec::new();

    for k in 0..n_points {
        column.clear();
        column.extend(resampled.iter().map(|r| r.flux[k]));

        if weighted {
            let (sum_w, sum_wx) = resampled
                .iter()
                .filter_map(|r| {
                    let x = r.flux[k];
                    let sigma = r.uncertainty.as_ref()?[k];
                    (x.is_finite() && sigma.is_finite() && sigma > 0.0)
                        .then(|| (x, 1.0 / (sigma * sigma)))
                })
                .fold((0.0, 0.0), |(sw, swx), (x, w)| (sw + w, swx + w * x));
            if sum_w > 0.0 {
                let var = 1.0 / sum_w;
                variance.push(var);
                mean.push(var * sum_wx);
            } else {
                variance.push(f64::NAN);
                mean.push(f64::NAN);
            }
        } else {
            mean.push(nan_mean(&column).unwrap_or(f64::NAN));
            variance.push(nan_variance(&column).unwrap_or(f64::NAN));
        }

        if options.extremes {
            min.push(nan_min(&column).unwrap_or(f64::NAN));
            max.push(nan_max(&column).unwrap_or(f64::NAN));
        }
    }

    let renormalized = options
        .renormalize
        .then(|| renormalize_members(&resampled, &mean, &wl_mask));

    Ok(Combined {
        template: Template {
            wavelength: wl_mask,
            mean_flux: mean,
            variance,
            extrema: options.extremes.then_some(Extrema { min, max }),
        },
        weighted,
        renormalized,
    })
}

/// Divide each member by the median of `member / mean` over the grid.
fn renormalize_members(resampled: &[Resampled], mean: &[f64], wl_mask: &[f64]) -> Vec<Spectrum> {
    resampled
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            let ratio: Vec<f64> = r.flux.iter().zip(mean).map(|(f, m)| f / m).collect();
            let factor = match nan_median(&ratio) {
                Some(f) if f != 0.0 => f,
                _ => {
                    warn!("mean_comb: member #{idx} has no usable ratio to the template, kept unscaled");
                    1.0
                }
            };
            Spectrum {
                wavelength: wl_mask.to_vec(),
                flux: r.flux.iter().map(|f| f / factor).collect(),
                uncertainty: r
                    .uncertainty
                    .as_ref()
                    .map(|u| u.iter().map(|s| s / factor).collect()),
                header: r.source.header.clone(),
            }
        })
        .collect()
}
