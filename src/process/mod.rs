/// Numerical components of template construction.
///
/// ```text
///   smooth ──▶ select_band ──▶ normalize ──▶ mean_comb ──▶ Template
///     ▲                                        │
///  window_width                           clean_outliers
/// ```
///
/// `measure` holds the integration helpers used on finished spectra.

pub mod band;
pub mod clean;
pub mod combine;
pub mod measure;
pub mod smooth;
pub mod stats;
