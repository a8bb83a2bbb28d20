//! Spectral template builder for brown dwarf spectra.
//!
//! Reads optical and near-infrared spectra (FITS or delimited text), cuts
//! them into bands, normalizes, smooths and combines them into per-band
//! templates with mean flux, variance and flux extrema.

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod process;

pub use config::{Band, PipelineConfig, ReadOptions, Source};
pub use data::export::TemplateRecord;
pub use data::model::{BandLimits, Spectrum, SpectrumCollection, Template};
pub use error::{SpecError, SpecResult};
