use log::{info, warn};

use super::model::Spectrum;
use crate::config::Source;

// ---------------------------------------------------------------------------
// Optical / near-infrared pairing
// ---------------------------------------------------------------------------

/// Clear the slot of every object missing either of its two spectra.
///
/// `optical[i]` and `near_infrared[i]` belong to the same object. When one of
/// the collections is empty the other is left as it is. Returns the number of
/// complete pairs.
pub fn pair_sources(
    optical: &mut [Option<Spectrum>],
    near_infrared: &mut [Option<Spectrum>],
) -> usize {
    if optical.is_empty() || near_infrared.is_empty() {
        return optical.iter().chain(near_infrared.iter()).flatten().count();
    }
    if optical.len() != near_infrared.len() {
        warn!(
            "pairing {} optical with {} near-infrared slots; extra slots ignored",
            optical.len(),
            near_infrared.len()
        );
    }

    let mut pairs = 0;
    for (idx, (opt, nir)) in optical.iter_mut().zip(near_infrared.iter_mut()).enumerate() {
        match (opt.is_some(), nir.is_some()) {
            (true, true) => pairs += 1,
            (false, false) => {}
            _ => {
                info!("object #{idx} lacks one of its spectra, dropped from both");
                *opt = None;
                *nir = None;
            }
        }
    }
    pairs
}

// ---------------------------------------------------------------------------
// Template membership
// ---------------------------------------------------------------------------

/// Whether `spectrum` may enter a template built from `source` data.
///
/// Near-infrared members must carry finite uncertainties when
/// `require_uncertainty` is set; optical members are always usable.
pub fn usable_member(spectrum: &Spectrum, source: Source, require_uncertainty: bool) -> bool {
    match source {
        Source::Optical => true,
        Source::NearInfrared => !require_uncertainty || spectrum.has_finite_uncertainty(),
    }
}

/// Which objects of a group still take part in its templates.
///
/// Bands are processed one after the other; an object dropped from one band
/// (missing, failed normalization, no uncertainties) stays out of the bands
/// that follow.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberMask {
    included: Vec<bool>,
}

impl MemberMask {
    pub fn new(len: usize) -> Self {
        MemberMask {
            included: vec![true; len],
        }
    }

    /// Number of objects still included.
    pub fn count(&self) -> usize {
        self.included.iter().filter(|i| **i).count()
    }

    pub fn is_included(&self, idx: usize) -> bool {
        self.included.get(idx).copied().unwrap_or(false)
    }

    /// Members of `spectra` that may enter the template, updating the mask.
    pub fn select(
        &mut self,
        spectra: &[Option<Spectrum>],
        source: Source,
        require_uncertainty: bool,
    ) -> Vec<Spectrum> {
        if self.included.len() < spectra.len() {
            self.included.resize(spectra.len(), true);
        }
        let mut members = Vec::new();
        for (idx, slot) in spectra.iter().enumerate() {
            if !self.is_included(idx) {
                continue;
            }
            match slot {
                None => self.included[idx] = false,
                Some(sp) if !usable_member(sp, source, require_uncertainty) => {
                    warn!("object #{idx} has no uncertainties, excluded from template");
                    self.included[idx] = false;
                }
                Some(sp) => members.push(sp.clone()),
            }
        }
        members
    }
}
