use log::debug;

use super::model::{header_number, Extrema, Header};
use crate::config::HeaderKeys;
use crate::error::{SpecError, SpecResult};

/// Sample of the first array inspected to tell flux from wavelength.
pub const DIAGNOSTIC_INDEX: usize = 20;

/// Below this the diagnostic sample is taken to be a flux value.
pub const FLUX_THRESHOLD: f64 = 1e-4;

/// A lone vector longer than this is one unrolled flux array.
const UNROLLED_MIN_LEN: usize = 10;

// ---------------------------------------------------------------------------
// ArrayStack – the numeric payload of a binary file
// ---------------------------------------------------------------------------

/// Numeric image data of a file, row-major, as a stack of parallel arrays.
///
/// Singleton axes after the first are dropped, so `[3, 1, n]` reads as three
/// arrays of `n` samples and `[n, 1]` as a single vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayStack {
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl ArrayStack {
    /// `shape` is slowest axis first.
    pub fn new(shape: &[usize], data: Vec<f64>) -> SpecResult<Self> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || expected != data.len() {
            return Err(SpecError::LengthMismatch {
                what: "image data",
                expected,
                found: data.len(),
            });
        }
        let mut dims = vec![shape[0]];
        dims.extend(shape[1..].iter().copied().filter(|d| *d != 1));
        Ok(ArrayStack { dims, data })
    }

    /// Number of parallel arrays (the length for a lone vector).
    pub fn count(&self) -> usize {
        self.dims[0]
    }

    /// Samples per array; 1 for a lone vector.
    pub fn width(&self) -> usize {
        self.dims[1..].iter().product()
    }

    fn is_vector(&self) -> bool {
        self.dims.len() == 1
    }

    fn row(&self, i: usize) -> &[f64] {
        let w = self.width();
        &self.data[i * w..(i + 1) * w]
    }

    fn dims_str(&self) -> String {
        self.dims
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x")
    }
}

// ---------------------------------------------------------------------------
// Layout classification
// ---------------------------------------------------------------------------

/// Known arrangements of spectral arrays in a binary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// `[flux]`
    FluxOnly,
    /// `[flux, unknown]`
    FluxUnknown,
    /// `[wavelength, flux]`
    WavelengthFlux,
    /// `[wavelength, flux, uncertainty]`
    WavelengthFluxError,
    /// `[cleaned flux, raw flux, background, uncertainty]`
    CleanedFlux,
    /// `[wavelength, mean, variance, min, max]`
    Template,
    /// `[flux, continuum-subtracted, uncertainty, mask, unknown]`
    MultiProduct,
    /// One long flux vector.
    UnrolledFlux,
    /// `n` rows of `(wavelength, flux)`.
    Pairs,
}

impl LayoutKind {
    /// Whether the layout stores its own wavelength axis.
    pub fn has_wavelength(self) -> bool {
        matches!(
            self,
            LayoutKind::WavelengthFlux
                | LayoutKind::WavelengthFluxError
                | LayoutKind::Template
                | LayoutKind::Pairs
        )
    }

    pub fn has_uncertainty(self) -> bool {
        matches!(
            self,
            LayoutKind::WavelengthFluxError
                | LayoutKind::CleanedFlux
                | LayoutKind::Template
                | LayoutKind::MultiProduct
        )
    }
}

/// Work out which [`LayoutKind`] `stack` holds.
///
/// Five arrays are a template only when `template` is set.
pub fn classify(stack: &ArrayStack, template: bool) -> SpecResult<LayoutKind> {
    let count = stack.count();
    if stack.is_vector() {
        return if count > UNROLLED_MIN_LEN {
            Ok(LayoutKind::UnrolledFlux)
        } else {
            Err(SpecError::UnrecognizedLayout(format!(
                "single vector of {count} samples"
            )))
        };
    }

    let kind = match count {
        1 => LayoutKind::FluxOnly,
        2 => {
            let sample = stack.row(0).get(DIAGNOSTIC_INDEX).copied().ok_or_else(|| {
                SpecError::UnrecognizedLayout(format!(
                    "2 arrays of {} samples, too short to inspect",
                    stack.width()
                ))
            })?;
            if sample < FLUX_THRESHOLD {
                LayoutKind::FluxUnknown
            } else {
                LayoutKind::WavelengthFlux
            }
        }
        3 => LayoutKind::WavelengthFluxError,
        4 => LayoutKind::CleanedFlux,
        5 if template => LayoutKind::Template,
        5 => LayoutKind::MultiProduct,
        n if n > UNROLLED_MIN_LEN && stack.dims.len() == 2 && stack.width() == 2 => {
            LayoutKind::Pairs
        }
        _ => {
            return Err(SpecError::UnrecognizedLayout(format!(
                "{} array(s)",
                stack.dims_str()
            )))
        }
    };
    debug!("layout {} classified as {kind:?}", stack.dims_str());
    Ok(kind)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Arrays pulled out of a stack according to its layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// `None` when the axis has to be synthesized from the header.
    pub wavelength: Option<Vec<f64>>,
    pub flux: Vec<f64>,
    pub uncertainty: Option<Vec<f64>>,
    pub extrema: Option<Extrema>,
}

impl Decoded {
    fn new(wavelength: Option<&[f64]>, flux: &[f64], uncertainty: Option<&[f64]>) -> Self {
        Decoded {
            wavelength: wavelength.map(<[f64]>::to_vec),
            flux: flux.to_vec(),
            uncertainty: uncertainty.map(<[f64]>::to_vec),
            extrema: None,
        }
    }
}

/// Extract the arrays `kind` describes from `stack`.
pub fn decode(stack: &ArrayStack, kind: LayoutKind) -> Decoded {
    let row = move |i: usize| stack.row(i);
    match kind {
        LayoutKind::FluxOnly | LayoutKind::FluxUnknown => Decoded::new(None, row(0), None),
        LayoutKind::WavelengthFlux => Decoded::new(Some(row(0)), row(1), None),
        LayoutKind::WavelengthFluxError => Decoded::new(Some(row(0)), row(1), Some(row(2))),
        LayoutKind::CleanedFlux => Decoded::new(None, row(0), Some(row(3))),
        LayoutKind::MultiProduct => Decoded::new(None, row(0), Some(row(2))),
        LayoutKind::Template => Decoded {
            extrema: Some(Extrema {
                min: row(3).to_vec(),
                max: row(4).to_vec(),
            }),
            ..Decoded::new(Some(row(0)), row(1), Some(row(2)))
        },
        LayoutKind::UnrolledFlux => Decoded::new(None, &stack.data, None),
        LayoutKind::Pairs => {
            let (wavelength, flux) = stack.data.chunks_exact(2).map(|p| (p[0], p[1])).unzip();
            Decoded {
                wavelength: Some(wavelength),
                flux,
                uncertainty: None,
                extrema: None,
            }
        }
    }
}

/// Whether an uncertainty array is a constant placeholder rather than real errors.
///
/// Archives without error propagation fill the array with one value; samples
/// 10 to 12 being identical is taken as that signature. Arrays too short to
/// hold those samples are kept.
pub fn is_placeholder_uncertainty(uncertainty: &[f64]) -> bool {
    match uncertainty.get(10..13) {
        Some(&[a, b, c]) => a == b && b == c,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Wavelength-axis synthesis
// ---------------------------------------------------------------------------

/// Build a wavelength axis of `len` samples from header cards.
///
/// Uses the first reference and delta keys present, and the pixel offset if
/// any. An axis whose reference is the logarithmic key is
/// `10^(i * delta + ref)`; otherwise it is `i * delta + ref - offset * delta`.
pub fn synthesize_axis(header: &Header, keys: &HeaderKeys, len: usize) -> SpecResult<Vec<f64>> {
    let (ref_key, reference) = header_number(header, &keys.reference).ok_or_else(|| {
        SpecError::AxisSynthesis(format!("none of {:?} in header", keys.reference))
    })?;
    let (_, delta) = header_number(header, &keys.delta)
        .ok_or_else(|| SpecError::AxisSynthesis(format!("none of {:?} in header", keys.delta)))?;
    let offset = header_number(header, &keys.offset).map_or(0.0, |(_, v)| v);

    let axis = if ref_key == keys.log_reference {
        (0..len)
            .map(|i| 10f64.powf(i as f64 * delta + reference))
            .collect()
    } else {
        (0..len)
            .map(|i| i as f64 * delta + reference - offset * delta)
            .collect()
    };
    debug!("synthesized {len}-sample axis from {ref_key} = {reference}, delta {delta}");
    Ok(axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::HeaderValue;
    use approx::assert_relative_eq;

    fn stack(rows: usize, cols: usize, fill: impl Fn(usize, usize) -> f64) -> ArrayStack {
        let data = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| fill(r, c))
            .collect();
        ArrayStack::new(&[rows, cols], data).unwrap()
    }

    #[test]
    fn test_classify_by_array_count() {
        let cases = [
            (1, LayoutKind::FluxOnly),
            (3, LayoutKind::WavelengthFluxError),
            (4, LayoutKind::CleanedFlux),
            (5, LayoutKind::MultiProduct),
        ];
        for (rows, kind) in cases {
            assert_eq!(classify(&stack(rows, 30, |_, _| 1.0), false).unwrap(), kind);
        }
        assert_eq!(
            classify(&stack(5, 30, |_, _| 1.0), true).unwrap(),
            LayoutKind::Template
        );
    }

    #[test]
    fn test_two_arrays_use_diagnostic_sample() {
        let wl_first = stack(2, 30, |r, c| if r == 0 { 0.5 + c as f64 * 0.01 } else { 1e-15 });
        assert_eq!(classify(&wl_first, false).unwrap(), LayoutKind::WavelengthFlux);

        let flux_first = stack(2, 30, |_, _| 3e-16);
        assert_eq!(classify(&flux_first, false).unwrap(), LayoutKind::FluxUnknown);

        let short = stack(2, 20, |_, _| 1.0);
        assert!(matches!(
            classify(&short, false),
            Err(SpecError::UnrecognizedLayout(_))
        ));
    }

    #[test]
    fn test_vectors_pairs_and_rejects() {
        let long = ArrayStack::new(&[50], vec![1.0; 50]).unwrap();
        assert_eq!(classify(&long, false).unwrap(), LayoutKind::UnrolledFlux);

        let tiny = ArrayStack::new(&[4], vec![1.0; 4]).unwrap();
        assert!(classify(&tiny, false).is_err());

        let pairs = stack(40, 2, |r, c| if c == 0 { r as f64 } else { 2.0 * r as f64 });
        assert_eq!(classify(&pairs, false).unwrap(), LayoutKind::Pairs);
        let decoded = decode(&pairs, LayoutKind::Pairs);
        assert_eq!(decoded.wavelength.as_ref().unwrap()[3], 3.0);
        assert_eq!(decoded.flux[3], 6.0);

        for rows in [6, 8, 10] {
            assert!(classify(&stack(rows, 30, |_, _| 1.0), false).is_err());
        }
        assert!(classify(&stack(40, 3, |_, _| 1.0), false).is_err());
    }

    #[test]
    fn test_singleton_axes_are_dropped() {
        let st = ArrayStack::new(&[3, 1, 25], vec![0.0; 75]).unwrap();
        assert_eq!(st.count(), 3);
        assert_eq!(st.width(), 25);

        let single_row = ArrayStack::new(&[1, 25], vec![0.0; 25]).unwrap();
        assert_eq!(classify(&single_row, false).unwrap(), LayoutKind::FluxOnly);

        assert!(ArrayStack::new(&[3, 10], vec![0.0; 29]).is_err());
    }

    #[test]
    fn test_decode_picks_rows() {
        let st = stack(4, 15, |r, _| r as f64);
        let d = decode(&st, LayoutKind::CleanedFlux);
        assert!(d.wavelength.is_none());
        assert!(d.flux.iter().all(|v| *v == 0.0));
        assert!(d.uncertainty.unwrap().iter().all(|v| *v == 3.0));

        let st = stack(5, 15, |r, _| r as f64);
        let d = decode(&st, LayoutKind::Template);
        assert_eq!(d.extrema.as_ref().unwrap().max[0], 4.0);
        assert_eq!(d.uncertainty.unwrap()[0], 2.0);

        let d = decode(&st, LayoutKind::MultiProduct);
        assert_eq!(d.uncertainty.unwrap()[0], 2.0);
        assert!(d.extrema.is_none());
    }

    #[test]
    fn test_placeholder_uncertainty() {
        let mut unc: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        assert!(!is_placeholder_uncertainty(&unc));
        unc[11] = unc[10];
        unc[12] = unc[10];
        assert!(is_placeholder_uncertainty(&unc));
        assert!(!is_placeholder_uncertainty(&[1.0; 12]));
        assert!(!is_placeholder_uncertainty(&[f64::NAN; 20]));
    }

    fn header(cards: &[(&str, f64)]) -> Header {
        cards
            .iter()
            .map(|(k, v)| (k.to_string(), HeaderValue::Float(*v)))
            .collect()
    }

    #[test]
    fn test_linear_axis_with_offset() {
        let keys = HeaderKeys::default();
        let h = header(&[("CRVAL1", 6000.0), ("CDELT1", 2.0), ("LTV1", -5.0)]);
        let axis = synthesize_axis(&h, &keys, 4).unwrap();
        assert_eq!(axis, vec![6010.0, 6012.0, 6014.0, 6016.0]);
    }

    #[test]
    fn test_log_axis() {
        let keys = HeaderKeys::default();
        let h = header(&[("COEFF0", 3.6), ("COEFF1", 1e-4)]);
        let axis = synthesize_axis(&h, &keys, 3).unwrap();
        assert_relative_eq!(axis[0], 10f64.powf(3.6), max_relative = 1e-12);
        assert_relative_eq!(axis[2], 10f64.powf(3.6002), max_relative = 1e-12);
    }

    #[test]
    fn test_axis_needs_reference_and_delta() {
        let keys = HeaderKeys::default();
        assert!(matches!(
            synthesize_axis(&header(&[("CDELT1", 1.0)]), &keys, 3),
            Err(SpecError::AxisSynthesis(_))
        ));
        assert!(matches!(
            synthesize_axis(&header(&[("CRVAL1", 1.0)]), &keys, 3),
            Err(SpecError::AxisSynthesis(_))
        ));
    }
}
