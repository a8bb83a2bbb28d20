use log::debug;

use crate::data::model::{header_number, Spectrum, SpectrumCollection};

/// How to pick the smoothing window of each spectrum.
#[derive(Debug, Clone, Copy)]
pub struct SmoothSettings<'a> {
    /// Resolution of the input, if known for the whole batch.
    pub old_resolution: Option<f64>,
    /// Resolution to degrade to.
    pub new_resolution: f64,
    /// Window used when the input resolution is unknown.
    pub default_window: usize,
    /// Header keys to look the input resolution up in.
    pub resolution_keys: &'a [String],
}

/// Width of the moving-average window.
///
/// `old_resolution` of zero means unknown and falls back to `default_window`.
/// A known resolution at or below the target gives 0, i.e. no smoothing.
pub fn window_width(old_resolution: f64, new_resolution: f64, default_window: usize) -> usize {
    if old_resolution > new_resolution {
        (old_resolution / new_resolution) as usize
    } else if old_resolution == 0.0 {
        default_window
    } else {
        0
    }
}

/// Mirror an out-of-range index back into `0..n` (`d c b a | a b c d | d c b a`).
fn reflect(j: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = j.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Moving average of width `size` with reflected edges.
///
/// The window of sample `i` spans `i - size/2 ..= i - size/2 + size - 1`.
pub fn uniform_filter(values: &[f64], size: usize) -> Vec<f64> {
    let n = values.len();
    if size <= 1 || n == 0 {
        return values.to_vec();
    }
    let left = (size / 2) as isize;
    (0..n as isize)
        .map(|i| {
            let sum: f64 = (i - left..i - left + size as isize)
                .map(|j| values[reflect(j, n)])
                .sum();
            sum / size as f64
        })
        .collect()
}

/// Apply `uniform_filter` to the finite part of `data`, in place; positions
/// listed in `keep` are compacted, filtered and written back.
fn filter_at(data: &mut [f64], keep: &[usize], size: usize) {
    let compact: Vec<f64> = keep.iter().map(|&i| data[i]).collect();
    for (&i, v) in keep.iter().zip(uniform_filter(&compact, size)) {
        data[i] = v;
    }
}

/// Smooth flux and uncertainty with a window of `width` samples.
///
/// Only samples with finite flux take part; NaN positions stay NaN and the
/// finite samples on either side of a gap are filtered as if adjacent.
pub fn smooth(spectrum: &Spectrum, width: usize) -> Spectrum {
    let mut out = spectrum.clone();
    if width <= 1 {
        return out;
    }
    let finite: Vec<usize> = spectrum
        .flux
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_finite())
        .map(|(i, _)| i)
        .collect();

    filter_at(&mut out.flux, &finite, width);
    if let Some(unc) = out.uncertainty.as_mut() {
        filter_at(unc, &finite, width);
    }
    out
}

/// Smooth every spectrum of a collection, choosing each window from the
/// batch resolution, the spectrum's header, or the default window.
pub fn smooth_all(spectra: &[Option<Spectrum>], settings: &SmoothSettings) -> SpectrumCollection {
    spectra
        .iter()
        .enumerate()
        .map(|(idx, slot)| {
            let sp = slot.as_ref()?;
            let old_res = settings
                .old_resolution
                .or_else(|| header_number(&sp.header, settings.resolution_keys).map(|(_, v)| v))
                .unwrap_or(0.0);
            let width = window_width(old_res, settings.new_resolution, settings.default_window);
            debug!("smooth_spec: spectrum #{idx} resolution {old_res}, window {width}");
            Some(smooth(sp, width))
        })
        .collect()
}
