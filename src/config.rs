use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::BandLimits;
use crate::error::{SpecError, SpecResult};

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// Named wavelength band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "OPT")]
    Optical,
    J,
    H,
    K,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::Optical => "OPT",
            Band::J => "J",
            Band::H => "H",
            Band::K => "K",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Band {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPT" => Ok(Band::Optical),
            "J" => Ok(Band::J),
            "H" => Ok(Band::H),
            "K" => Ok(Band::K),
            other => Err(SpecError::InvalidConfig(format!("unknown band {other:?}"))),
        }
    }
}

/// Which spectrum of an object a band is cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Optical,
    NearInfrared,
}

/// Raw band entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub band: Band,
    pub limits: [f64; 2],
    pub norm_limits: [f64; 2],
    pub source: Source,
}

/// Validated limits of one band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandWindow {
    /// Extraction window.
    pub limits: BandLimits,
    /// Normalization window, nested inside `limits`.
    pub norm: BandLimits,
    pub source: Source,
}

/// Band → window mapping, validated at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable {
    windows: BTreeMap<Band, BandWindow>,
}

impl BandTable {
    pub fn new(specs: &[BandSpec]) -> SpecResult<Self> {
        let mut windows = BTreeMap::new();
        for spec in specs {
            let limits = BandLimits::new(spec.limits[0], spec.limits[1])?;
            let norm = BandLimits::new(spec.norm_limits[0], spec.norm_limits[1])?;
            if !limits.encloses(&norm) {
                return Err(SpecError::InvalidConfig(format!(
                    "band {}: normalization window {norm} is not inside {limits}",
                    spec.band
                )));
            }
            let window = BandWindow {
                limits,
                norm,
                source: spec.source,
            };
            if windows.insert(spec.band, window).is_some() {
                return Err(SpecError::InvalidConfig(format!(
                    "band {} defined twice",
                    spec.band
                )));
            }
        }
        Ok(BandTable { windows })
    }

    pub fn get(&self, band: Band) -> Option<&BandWindow> {
        self.windows.get(&band)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, &BandWindow)> {
        self.windows.iter().map(|(b, w)| (*b, w))
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Optical plus zJ/H/K near-infrared windows, in microns.
pub fn default_bands() -> Vec<BandSpec> {
    vec![
        BandSpec {
            band: Band::Optical,
            limits: [0.65, 0.90],
            norm_limits: [0.66, 0.89],
            source: Source::Optical,
        },
        BandSpec {
            band: Band::J,
            limits: [0.8, 1.4],
            norm_limits: [0.87, 1.39],
            source: Source::NearInfrared,
        },
        BandSpec {
            band: Band::H,
            limits: [1.4, 1.9],
            norm_limits: [1.41, 1.89],
            source: Source::NearInfrared,
        },
        BandSpec {
            band: Band::K,
            limits: [1.9, 2.4],
            norm_limits: [1.91, 2.39],
            source: Source::NearInfrared,
        },
    ]
}

// ---------------------------------------------------------------------------
// Archive header keys
// ---------------------------------------------------------------------------

fn strings(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Header key names used by the archive the spectra come from.
///
/// Each list is searched in order; the first key present wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderKeys {
    /// Wavelength of the reference pixel.
    pub reference: Vec<String>,
    /// Wavelength step per pixel.
    pub delta: Vec<String>,
    /// Pixel offset of a subsection start.
    pub offset: Vec<String>,
    /// Coordinate type (linear or not).
    pub coord_type: Vec<String>,
    /// Spectral resolution.
    pub resolution: Vec<String>,
    /// Reference key whose axis is stored as log10(wavelength).
    pub log_reference: String,
}

impl Default for HeaderKeys {
    fn default() -> Self {
        Self {
            reference: strings(&["COEFF0", "CRVAL1"]),
            delta: strings(&["COEFF1", "CDELT1", "CD1_1"]),
            offset: strings(&["LTV1"]),
            coord_type: strings(&["CTYPE1"]),
            resolution: strings(&["RES", "RP"]),
            log_reference: "COEFF0".to_string(),
        }
    }
}

impl HeaderKeys {
    /// Every key worth copying out of a file header.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.reference
            .iter()
            .chain(&self.delta)
            .chain(&self.offset)
            .chain(&self.coord_type)
            .chain(&self.resolution)
    }
}

// ---------------------------------------------------------------------------
// Reader options
// ---------------------------------------------------------------------------

/// Toggles for the spectrum reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Return an uncertainty array (NaN-filled when the file has none).
    pub errors: bool,
    /// Divide wavelengths by `unit_divisor` when the last sample exceeds `unit_threshold`.
    pub angstrom_to_micron: bool,
    /// Clamp negative flux to zero (and hence to NaN).
    pub negative_to_zero: bool,
    /// Skip FITS files whose axis is declared non-linear.
    pub linear_only: bool,
    /// Interpret 5-array files as templates.
    pub template: bool,
    /// Column delimiter of text spectra.
    pub delimiter: char,
    pub unit_threshold: f64,
    pub unit_divisor: f64,
    pub header_keys: HeaderKeys,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            errors: true,
            angstrom_to_micron: false,
            negative_to_zero: false,
            linear_only: false,
            template: false,
            delimiter: '\t',
            unit_threshold: 8000.0,
            unit_divisor: 10000.0,
            header_keys: HeaderKeys::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Target resolution.
    pub new_resolution: f64,
    /// Window width for optical spectra of unknown resolution.
    pub optical_window: usize,
    /// Window width for near-infrared spectra of unknown resolution.
    pub near_infrared_window: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            new_resolution: 200.0,
            optical_window: 10,
            near_infrared_window: 0,
        }
    }
}

impl SmoothingConfig {
    pub fn default_window(&self, source: Source) -> usize {
        match source {
            Source::Optical => self.optical_window,
            Source::NearInfrared => self.near_infrared_window,
        }
    }
}

// ---------------------------------------------------------------------------
// Groups and the top-level config
// ---------------------------------------------------------------------------

/// One template to build: a spectral type and gravity class with the files of
/// its members. `optical[i]` and `near_infrared[i]` belong to the same object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub gravity: String,
    #[serde(default)]
    pub optical: Vec<Option<PathBuf>>,
    #[serde(default)]
    pub near_infrared: Vec<Option<PathBuf>>,
}

impl GroupSpec {
    /// Label used in file names and logs, e.g. `L3_f`.
    pub fn label(&self) -> String {
        if self.gravity.is_empty() {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, self.gravity)
        }
    }
}

/// Everything the pipeline needs, built once at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub bands: Vec<BandSpec>,
    pub read: ReadOptions,
    pub smoothing: SmoothingConfig,
    /// MAD threshold for outlier rejection before combination.
    pub outlier_sigma: Option<f64>,
    /// Never use inverse-variance weights.
    pub force_unweighted: bool,
    /// Rescale members against a first-pass template, then recombine.
    pub renormalize: bool,
    /// Drop near-infrared members without finite uncertainties.
    pub require_uncertainty: bool,
    pub groups: Vec<GroupSpec>,
    pub output_dir: PathBuf,
    pub write_header: bool,
    pub write_parquet: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            read: ReadOptions {
                angstrom_to_micron: true,
                negative_to_zero: true,
                ..ReadOptions::default()
            },
            smoothing: SmoothingConfig::default(),
            outlier_sigma: None,
            force_unweighted: false,
            renormalize: true,
            require_uncertainty: true,
            groups: Vec::new(),
            output_dir: PathBuf::from("templates"),
            write_header: false,
            write_parquet: false,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: PipelineConfig =
            serde_json::from_str(&text).context("parsing config JSON")?;
        config.validate()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Make relative file and output paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for group in &mut self.groups {
            group
                .optical
                .iter_mut()
                .chain(group.near_infrared.iter_mut())
                .flatten()
                .for_each(join);
        }
        join(&mut self.output_dir);
    }

    /// Check constraints that serde cannot express.
    pub fn validate(&self) -> SpecResult<()> {
        self.band_table()?;
        if let Some(sigma) = self.outlier_sigma {
            if !(sigma > 0.0) {
                return Err(SpecError::InvalidConfig(format!(
                    "outlier_sigma must be positive, got {sigma}"
                )));
            }
        }
        if !(self.smoothing.new_resolution > 0.0) {
            return Err(SpecError::InvalidConfig(
                "smoothing.new_resolution must be positive".into(),
            ));
        }
        for group in &self.groups {
            if !group.optical.is_empty()
                && !group.near_infrared.is_empty()
                && group.optical.len() != group.near_infrared.len()
            {
                return Err(SpecError::InvalidConfig(format!(
                    "group {}: {} optical files but {} near-infrared files",
                    group.label(),
                    group.optical.len(),
                    group.near_infrared.len()
                )));
            }
        }
        Ok(())
    }

    pub fn band_table(&self) -> SpecResult<BandTable> {
        BandTable::new(&self.bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands_are_valid() {
        let table = BandTable::new(&default_bands()).unwrap();
        assert_eq!(table.len(), 4);
        let j = table.get(Band::J).unwrap();
        assert_eq!(j.limits, BandLimits { low: 0.8, high: 1.4 });
        assert_eq!(j.norm, BandLimits { low: 0.87, high: 1.39 });
        assert_eq!(j.source, Source::NearInfrared);
    }

    #[test]
    fn test_band_table_rejects_unnested_norm_window() {
        let specs = vec![BandSpec {
            band: Band::H,
            limits: [1.4, 1.9],
            norm_limits: [1.3, 1.8],
            source: Source::NearInfrared,
        }];
        assert!(matches!(
            BandTable::new(&specs),
            Err(SpecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_band_table_rejects_inverted_limits() {
        let specs = vec![BandSpec {
            band: Band::K,
            limits: [2.4, 1.9],
            norm_limits: [1.91, 2.39],
            source: Source::NearInfrared,
        }];
        assert!(matches!(
            BandTable::new(&specs),
            Err(SpecError::InvalidLimits { .. })
        ));
    }

    #[test]
    fn test_config_json_uses_defaults_for_missing_fields() {
        let json = r#"{
            "outlier_sigma": 5.0,
            "groups": [
                { "name": "L3", "gravity": "f",
                  "optical": ["opt/a.fits", null],
                  "near_infrared": ["nir/a.fits", "nir/b.fits"] }
            ]
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.outlier_sigma, Some(5.0));
        assert_eq!(config.bands.len(), 4);
        assert_eq!(config.groups[0].label(), "L3_f");
        assert_eq!(config.groups[0].optical[1], None);
        assert_eq!(config.read.delimiter, '\t');
    }

    #[test]
    fn test_band_name_round_trip() {
        for band in [Band::Optical, Band::J, Band::H, Band::K] {
            assert_eq!(band.to_string().parse::<Band>().unwrap(), band);
        }
        assert!("Y".parse::<Band>().is_err());
    }

    #[test]
    fn test_band_names_deserialize() {
        let spec: BandSpec = serde_json::from_str(
            r#"{"band": "OPT", "limits": [0.65, 0.9], "norm_limits": [0.66, 0.89], "source": "optical"}"#,
        )
        .unwrap();
        assert_eq!(spec.band, Band::Optical);
        assert_eq!(spec.source, Source::Optical);
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let mut config = PipelineConfig {
            groups: vec![GroupSpec {
                name: "L3".into(),
                gravity: String::new(),
                optical: vec![Some(PathBuf::from("opt/a.txt")), None],
                near_infrared: vec![Some(PathBuf::from("/data/nir/a.txt")), None],
            }],
            ..PipelineConfig::default()
        };
        config.resolve_paths(Path::new("/work"));
        assert_eq!(
            config.groups[0].optical[0].as_deref(),
            Some(Path::new("/work/opt/a.txt"))
        );
        assert_eq!(
            config.groups[0].near_infrared[0].as_deref(),
            Some(Path::new("/data/nir/a.txt"))
        );
        assert_eq!(config.output_dir, PathBuf::from("/work/templates"));
    }

    #[test]
    fn test_validate_rejects_mismatched_group() {
        let config = PipelineConfig {
            groups: vec![GroupSpec {
                name: "L0".into(),
                gravity: String::new(),
                optical: vec![None],
                near_infrared: vec![None, None],
            }],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
