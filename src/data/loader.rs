use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::FitsFile;
use log::{debug, info, warn};

use super::layout::{
    classify, decode, is_placeholder_uncertainty, synthesize_axis, ArrayStack, Decoded,
};
use super::model::{Extrema, Header, HeaderValue, Spectrum, SpectrumCollection, Template};
use crate::config::ReadOptions;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read one spectrum. Dispatch by extension.
///
/// Supported formats:
/// * `.fits` / `.fit` / `.fts` – primary HDU image, layout inferred from the
///   number of stacked arrays (see [`super::layout`])
/// * anything else – delimited text, columns `wavelength flux [uncertainty]`
pub fn read_spectrum(path: &Path, options: &ReadOptions) -> Result<Spectrum> {
    let raw = load_file(path, options)?;
    let uncertainty = if options.errors {
        Some(uncertainty_or_nan(raw.columns.uncertainty, raw.columns.flux.len()))
    } else {
        None
    };
    let spectrum = Spectrum::new(raw.wavelength, raw.columns.flux, uncertainty)
        .with_context(|| format!("{}: inconsistent arrays", path.display()))?;
    Ok(spectrum.with_header(raw.header))
}

/// Read one template file (wavelength, mean, variance, min, max).
pub fn read_template(path: &Path, options: &ReadOptions) -> Result<Template> {
    let options = ReadOptions {
        template: true,
        ..options.clone()
    };
    let raw = load_file(path, &options)?;
    let n = raw.columns.flux.len();
    let Some(extrema) = raw.columns.extrema else {
        bail!("{}: not a template (no min/max arrays)", path.display());
    };
    Ok(Template {
        wavelength: raw.wavelength,
        mean_flux: raw.columns.flux,
        variance: raw.columns.uncertainty.unwrap_or_else(|| vec![f64::NAN; n]),
        extrema: Some(extrema),
    })
}

/// Read a batch of spectra, one slot per path.
///
/// Unreadable or uninterpretable files are logged and leave `None` in their
/// slot, as do `None` paths; the output always has `paths.len()` entries.
pub fn read_spectra(paths: &[Option<PathBuf>], options: &ReadOptions) -> SpectrumCollection {
    info!("read_spec: reading {} file(s)", paths.iter().flatten().count());
    paths
        .iter()
        .map(|slot| {
            let path = slot.as_ref()?;
            read_spectrum(path, options)
                .map_err(|err| warn!("read_spec: {} skipped: {err:#}", path.display()))
                .ok()
        })
        .collect()
}

/// Read a batch of template files, one slot per path.
pub fn read_templates(paths: &[PathBuf], options: &ReadOptions) -> Vec<Option<Template>> {
    paths
        .iter()
        .map(|path| {
            read_template(path, options)
                .map_err(|err| warn!("read_spec: template {} skipped: {err:#}", path.display()))
                .ok()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Shared loading path
// ---------------------------------------------------------------------------

/// Arrays of one file after axis synthesis and post-processing.
struct RawSpectrum {
    wavelength: Vec<f64>,
    columns: Decoded,
    header: Header,
}

fn is_fits(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(ext.as_str(), "fits" | "fit" | "fts")
}

fn load_file(path: &Path, options: &ReadOptions) -> Result<RawSpectrum> {
    let (mut columns, header) = if is_fits(path) {
        load_fits(path, options)?
    } else {
        (load_text(path, options)?, Header::new())
    };

    let mut wavelength = match columns.wavelength.take() {
        Some(wl) => wl,
        None => synthesize_axis(&header, &options.header_keys, columns.flux.len())
            .with_context(|| format!("{}: no wavelength axis", path.display()))?,
    };

    post_process(&mut wavelength, &mut columns.flux, options, path);
    Ok(RawSpectrum {
        wavelength,
        columns,
        header,
    })
}

fn uncertainty_or_nan(uncertainty: Option<Vec<f64>>, len: usize) -> Vec<f64> {
    uncertainty.unwrap_or_else(|| vec![f64::NAN; len])
}

/// Unit conversion, negative clamp, then zero → NaN (always, last).
fn post_process(wavelength: &mut [f64], flux: &mut [f64], options: &ReadOptions, path: &Path) {
    if options.angstrom_to_micron {
        if let Some(&last) = wavelength.last() {
            if last > options.unit_threshold {
                wavelength.iter_mut().for_each(|w| *w /= options.unit_divisor);
            }
        }
    }

    if options.negative_to_zero {
        let mut negatives = 0usize;
        for f in flux.iter_mut().filter(|f| **f < 0.0) {
            *f = 0.0;
            negatives += 1;
        }
        if negatives > 0 {
            warn!("{negatives} negative data points found in {}", path.display());
        }
    }

    for f in flux.iter_mut().filter(|f| **f == 0.0) {
        *f = f64::NAN;
    }
}

// ---------------------------------------------------------------------------
// FITS loader
// ---------------------------------------------------------------------------

fn load_fits(path: &Path, options: &ReadOptions) -> Result<(Decoded, Header)> {
    let mut fptr = FitsFile::open(path)
        .with_context(|| format!("could not open {}", path.display()))?;
    let hdu = fptr.primary_hdu().context("reading primary HDU")?;

    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        HduInfo::TableInfo { .. } => bail!("primary HDU is a table, not an image"),
        HduInfo::AnyInfo => bail!("unknown HDU type"),
    };
    let data: Vec<f64> = hdu.read_image(&mut fptr).context("reading image data")?;

    let keys = &options.header_keys;
    let mut header = Header::new();
    for key in keys.all() {
        if let Some(value) = read_card(&hdu, &mut fptr, key) {
            header.insert(key.clone(), value);
        }
    }

    let coord_type = keys
        .coord_type
        .iter()
        .find_map(|k| header.get(k).map(|v| v.to_string()));
    match coord_type {
        None => debug!("data in {} assumed to be linear", path.display()),
        Some(ctype) if ctype.trim().eq_ignore_ascii_case("LINEAR") => {}
        Some(ctype) if options.linear_only => {
            bail!("data is not linear (axis type {})", ctype.trim())
        }
        Some(ctype) => debug!("{}: axis type {}", path.display(), ctype.trim()),
    }

    let stack = ArrayStack::new(&shape, data)?;
    let kind = classify(&stack, options.template)?;
    if options.errors && !kind.has_uncertainty() {
        debug!("{}: {kind:?} carries no uncertainty", path.display());
    }
    if !kind.has_wavelength() {
        debug!("{}: {kind:?} needs a synthesized axis", path.display());
    }
    let mut decoded = decode(&stack, kind);
    if options.errors && !options.template {
        if let Some(unc) = &decoded.uncertainty {
            if is_placeholder_uncertainty(unc) {
                debug!("{}: constant uncertainty array discarded", path.display());
                decoded.uncertainty = None;
            }
        }
    }
    Ok((decoded, header))
}

/// Value of one header card, as a number when it parses as one.
fn read_card(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<HeaderValue> {
    if let Ok(v) = hdu.read_key::<f64>(fptr, key) {
        return Some(HeaderValue::Float(v));
    }
    hdu.read_key::<String>(fptr, key)
        .ok()
        .map(|s| HeaderValue::String(s.trim().to_string()))
}

// ---------------------------------------------------------------------------
// Delimited-text loader
// ---------------------------------------------------------------------------

/// Text layout: one sample per line, `wavelength flux [uncertainty]`, lines
/// starting with `#` ignored. In template mode five columns are read as
/// `wavelength mean variance min max`.
///
/// Columns are fixed-position. With a space delimiter runs of blanks
/// separate one column; with any other delimiter an empty field reads as NaN.
fn load_text(path: &Path, options: &ReadOptions) -> Result<Decoded> {
    if !options.delimiter.is_ascii() {
        bail!("delimiter {:?} is not a single byte", options.delimiter);
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter as u8)
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("could not open {}", path.display()))?;

    let whitespace = options.delimiter == ' ';
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("line {}", line_no + 1))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row = record
            .iter()
            .filter(|field| !(whitespace && field.is_empty()))
            .map(|field| {
                if field.is_empty() {
                    return Ok(f64::NAN);
                }
                field
                    .parse::<f64>()
                    .with_context(|| format!("line {}: '{field}' is not a number", line_no + 1))
            })
            .collect::<Result<Vec<f64>>>()?;
        if row.len() < 2 {
            bail!("line {}: expected at least 2 columns", line_no + 1);
        }
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("{} holds no data", path.display());
    }

    let n_cols = rows.iter().map(Vec::len).min().unwrap_or(0);
    let column = |c: usize| rows.iter().map(|r| r[c]).collect::<Vec<f64>>();
    let uncertainty = (n_cols >= 3 && (options.errors || options.template)).then(|| column(2));
    let extrema = (options.template && n_cols >= 5).then(|| Extrema {
        min: column(3),
        max: column(4),
    });
    debug!("{}: {} rows, {n_cols} columns", path.display(), rows.len());

    Ok(Decoded {
        wavelength: Some(column(0)),
        flux: column(1),
        uncertainty,
        extrema,
    })
}
