use std::ops::Range;

use log::warn;

use crate::data::model::{BandLimits, Spectrum, SpectrumCollection};
use crate::error::{SpecError, SpecResult};

// ---------------------------------------------------------------------------
// Band index search
// ---------------------------------------------------------------------------

/// Index range of the samples with `low <= wavelength <= high`.
///
/// A bound past the edge of the data clamps to the first/last sample; a
/// window entirely beyond the data is `OutsideLimits`, and fewer than two
/// samples is `NoBand`.
fn band_range(wavelength: &[f64], low: f64, high: f64) -> SpecResult<Range<usize>> {
    let n = wavelength.len();

    let below = wavelength.iter().filter(|w| **w < low).count();
    let start = match wavelength.iter().rposition(|w| *w < low) {
        None => 0,
        Some(_) if below == n => return Err(SpecError::OutsideLimits),
        Some(last) => last + 1,
    };

    let above = wavelength.iter().filter(|w| **w > high).count();
    let end = match wavelength.iter().position(|w| *w > high) {
        None => n,
        Some(_) if above == n => return Err(SpecError::OutsideLimits),
        Some(first) => first,
    };

    if end < start + 2 {
        return Err(SpecError::NoBand);
    }
    Ok(start..end)
}

// ---------------------------------------------------------------------------
// Band selector
// ---------------------------------------------------------------------------

/// Cut the part of `spectrum` that falls inside `limits`.
pub fn select_band(spectrum: &Spectrum, limits: &BandLimits) -> SpecResult<Spectrum> {
    let range = band_range(&spectrum.wavelength, limits.low, limits.high)?;
    Ok(spectrum.slice(range))
}

/// Cut `[low, high]` out of every spectrum in the collection.
///
/// Bad limits abort the whole call. A spectrum the window misses is logged
/// and left as `None`; the other slots are unaffected.
pub fn select_bands(
    spectra: &[Option<Spectrum>],
    low: f64,
    high: f64,
) -> SpecResult<SpectrumCollection> {
    let limits = BandLimits::new(low, high)?;
    Ok(spectra
        .iter()
        .enumerate()
        .map(|(idx, slot)| {
            let sp = slot.as_ref()?;
            select_band(sp, &limits)
                .map_err(|err| warn!("sel_band: spectrum #{idx} skipped: {err}"))
                .ok()
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Result of normalizing a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub spectra: SpectrumCollection,
    /// True when at least one spectrum needed a narrower window than requested.
    pub limits_adjusted: bool,
}

/// Scale `spectrum` so the mean finite flux inside `limits` is 1.
///
/// The window is first shrunk to the extent of finite flux; the returned flag
/// says whether that happened. The whole flux (and uncertainty) array is
/// divided by the window mean, not only the windowed part.
pub fn normalize(spectrum: &Spectrum, limits: &BandLimits) -> SpecResult<(Spectrum, bool)> {
    let mut low = limits.low;
    let mut high = limits.high;
    let mut adjusted = false;

    if let Some((first, last)) = spectrum.finite_extent() {
        if spectrum.wavelength[first] > low {
            low = spectrum.wavelength[first];
            adjusted = true;
        }
        if spectrum.wavelength[last] < high {
            high = spectrum.wavelength[last];
            adjusted = true;
        }
    }

    let range = band_range(&spectrum.wavelength, low, high)?;
    let finite: Vec<f64> = spectrum.flux[range]
        .iter()
        .copied()
        .filter(|f| f.is_finite())
        .collect();
    if finite.len() < 2 {
        return Err(SpecError::NoBand);
    }

    let avg = finite.iter().sum::<f64>() / finite.len() as f64;
    if avg == 0.0 || !avg.is_finite() {
        return Err(SpecError::DegenerateStatistic("normalization mean is zero"));
    }

    Ok((spectrum.divided_by(avg), adjusted))
}

/// Normalize every spectrum of the collection to `[low, high]`.
pub fn normalize_all(spectra: &[Option<Spectrum>], low: f64, high: f64) -> SpecResult<Normalized> {
    let limits = BandLimits::new(low, high)?;
    let mut limits_adjusted = false;

    let spectra = spectra
        .iter()
        .enumerate()
        .map(|(idx, slot)| {
            let sp = slot.as_ref()?;
            match normalize(sp, &limits) {
                Ok((normed, adjusted)) => {
                    limits_adjusted |= adjusted;
                    Some(normed)
                }
                Err(err) => {
                    warn!("norm_spec: spectrum #{idx} skipped: {err}");
                    None
                }
            }
        })
        .collect();

    Ok(Normalized {
        spectra,
        limits_adjusted,
    })
}
