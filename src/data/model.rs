use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use crate::error::{SpecError, SpecResult};

// ---------------------------------------------------------------------------
// HeaderValue – a single header card value
// ---------------------------------------------------------------------------

/// A dynamically-typed header value, as found in FITS header cards.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    String(String),
    Float(f64),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::String(s) => write!(f, "{s}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl HeaderValue {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::String(s) => s.trim().parse().ok(),
        }
    }
}

/// Header cards kept alongside a spectrum: key → value.
pub type Header = BTreeMap<String, HeaderValue>;

/// First key out of `keys` present in `header`, with its numeric value.
pub fn header_number<'a>(header: &Header, keys: &'a [String]) -> Option<(&'a str, f64)> {
    keys.iter()
        .find_map(|k| header.get(k).and_then(HeaderValue::as_f64).map(|v| (k.as_str(), v)))
}

// ---------------------------------------------------------------------------
// Spectrum
// ---------------------------------------------------------------------------

/// One spectrum: wavelength, flux and optional per-sample uncertainty.
///
/// NaN flux marks a masked or missing sample. A missing uncertainty array
/// means "unknown", which is not the same as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub uncertainty: Option<Vec<f64>>,
    /// Header cards retained from the source file (may be empty).
    pub header: Header,
}

/// Ordered batch of spectra; `None` keeps the slot of a missing spectrum so
/// the batch stays aligned with parallel metadata.
pub type SpectrumCollection = Vec<Option<Spectrum>>;

impl Spectrum {
    /// Build a spectrum, checking that all arrays have the same length.
    pub fn new(
        wavelength: Vec<f64>,
        flux: Vec<f64>,
        uncertainty: Option<Vec<f64>>,
    ) -> SpecResult<Self> {
        if flux.len() != wavelength.len() {
            return Err(SpecError::LengthMismatch {
                what: "flux",
                expected: wavelength.len(),
                found: flux.len(),
            });
        }
        if let Some(unc) = &uncertainty {
            if unc.len() != wavelength.len() {
                return Err(SpecError::LengthMismatch {
                    what: "uncertainty",
                    expected: wavelength.len(),
                    found: unc.len(),
                });
            }
        }
        Ok(Spectrum {
            wavelength,
            flux,
            uncertainty,
            header: Header::new(),
        })
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Indices of the first and last finite flux samples.
    pub fn finite_extent(&self) -> Option<(usize, usize)> {
        let first = self.flux.iter().position(|f| f.is_finite())?;
        let last = self.flux.iter().rposition(|f| f.is_finite())?;
        Some((first, last))
    }

    /// Whether an uncertainty array is present with at least one usable
    /// (finite, positive) value.
    pub fn has_finite_uncertainty(&self) -> bool {
        self.uncertainty
            .as_ref()
            .is_some_and(|u| u.iter().any(|s| s.is_finite() && *s > 0.0))
    }

    /// Copy of the samples in `range`, header included.
    pub fn slice(&self, range: Range<usize>) -> Spectrum {
        Spectrum {
            wavelength: self.wavelength[range.clone()].to_vec(),
            flux: self.flux[range.clone()].to_vec(),
            uncertainty: self.uncertainty.as_ref().map(|u| u[range].to_vec()),
            header: self.header.clone(),
        }
    }

    /// Copy with flux and uncertainty divided by `factor`.
    pub fn divided_by(&self, factor: f64) -> Spectrum {
        Spectrum {
            wavelength: self.wavelength.clone(),
            flux: self.flux.iter().map(|f| f / factor).collect(),
            uncertainty: self
                .uncertainty
                .as_ref()
                .map(|u| u.iter().map(|s| s / factor).collect()),
            header: self.header.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// BandLimits
// ---------------------------------------------------------------------------

/// A wavelength window `[low, high]` with `low < high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandLimits {
    pub low: f64,
    pub high: f64,
}

impl BandLimits {
    pub fn new(low: f64, high: f64) -> SpecResult<Self> {
        if !(low < high) {
            return Err(SpecError::InvalidLimits { low, high });
        }
        Ok(BandLimits { low, high })
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.low && wavelength <= self.high
    }

    /// Whether `other` lies entirely within this window.
    pub fn encloses(&self, other: &BandLimits) -> bool {
        other.low >= self.low && other.high <= self.high
    }
}

impl fmt::Display for BandLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

// ---------------------------------------------------------------------------
// Template – the combined spectrum
// ---------------------------------------------------------------------------

/// Per-sample flux extrema across the combined members.
#[derive(Debug, Clone, PartialEq)]
pub struct Extrema {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

/// Statistical combination of a collection of spectra on one wavelength grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub wavelength: Vec<f64>,
    pub mean_flux: Vec<f64>,
    pub variance: Vec<f64>,
    pub extrema: Option<Extrema>,
}

impl Template {
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Output columns in file order: wavelength, mean, variance, [min, max].
    pub fn columns(&self) -> Vec<&[f64]> {
        let mut cols: Vec<&[f64]> = vec![&self.wavelength, &self.mean_flux, &self.variance];
        if let Some(ext) = &self.extrema {
            cols.push(&ext.min);
            cols.push(&ext.max);
        }
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_mismatched_lengths() {
        let err = Spectrum::new(vec![1.0, 2.0], vec![1.0], None).unwrap_err();
        assert!(matches!(err, SpecError::LengthMismatch { what: "flux", .. }));

        let err = Spectrum::new(vec![1.0, 2.0], vec![1.0, 2.0], Some(vec![0.1])).unwrap_err();
        assert!(matches!(err, SpecError::LengthMismatch { what: "uncertainty", .. }));
    }

    #[test]
    fn test_finite_extent_skips_nan_edges() {
        let sp = Spectrum::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![f64::NAN, 2.0, 3.0, f64::NAN],
            None,
        )
        .unwrap();
        assert_eq!(sp.finite_extent(), Some((1, 2)));

        let empty = Spectrum::new(vec![1.0], vec![f64::NAN], None).unwrap();
        assert_eq!(empty.finite_extent(), None);
    }

    #[test]
    fn test_band_limits_validation() {
        assert!(BandLimits::new(1.0, 2.0).is_ok());
        assert_eq!(
            BandLimits::new(2.0, 2.0),
            Err(SpecError::InvalidLimits { low: 2.0, high: 2.0 })
        );
        assert!(BandLimits::new(f64::NAN, 2.0).is_err());
    }

    #[test]
    fn test_header_number_takes_first_present_key() {
        let mut header = Header::new();
        header.insert("CDELT1".into(), HeaderValue::Float(0.5));
        header.insert("CD1_1".into(), HeaderValue::Float(0.7));
        let keys = vec!["COEFF1".to_string(), "CDELT1".to_string(), "CD1_1".to_string()];
        assert_eq!(header_number(&header, &keys), Some(("CDELT1", 0.5)));
    }

    #[test]
    fn test_template_columns_include_extrema() {
        let t = Template {
            wavelength: vec![1.0],
            mean_flux: vec![2.0],
            variance: vec![0.0],
            extrema: Some(Extrema {
                min: vec![1.5],
                max: vec![2.5],
            }),
        };
        assert_eq!(t.columns().len(), 5);
    }
}
