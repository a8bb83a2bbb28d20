use thiserror::Error;

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Errors raised by the numerical components.
///
/// Whole-call violations (bad limits, mismatched arrays) abort the call.
/// Per-item conditions (`OutsideLimits`, `NoBand`, ...) are returned by the
/// single-spectrum functions; the collection variants log them and leave a
/// `None` in the affected slot.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpecError {
    #[error("limits are not reasonable: low {low} must be below high {high}")]
    InvalidLimits { low: f64, high: f64 },

    #[error("{what}: expected {expected} values, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("wavelength data is outside the given limits")]
    OutsideLimits,

    #[error("the limits yield no band (fewer than 2 samples)")]
    NoBand,

    #[error("degenerate statistic: {0}")]
    DegenerateStatistic(&'static str),

    #[error("unrecognized data layout: {0}")]
    UnrecognizedLayout(String),

    #[error("could not synthesize wavelength axis: {0}")]
    AxisSynthesis(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SpecResult<T> = Result<T, SpecError>;
