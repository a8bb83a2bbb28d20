use log::{debug, info, warn};

use crate::config::{BandTable, GroupSpec, PipelineConfig, Source};
use crate::data::export::TemplateRecord;
use crate::data::filter::{pair_sources, usable_member, MemberMask};
use crate::data::loader::read_spectra;
use crate::data::model::{Spectrum, SpectrumCollection, Template};
use crate::error::{SpecError, SpecResult};
use crate::process::band::{normalize_all, select_bands};
use crate::process::combine::{mean_comb, CombineOptions};
use crate::process::smooth::{smooth_all, SmoothSettings};

/// A template and the bookkeeping of its construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTemplate {
    pub template: Template,
    /// Spectra that went into it.
    pub members: usize,
    /// Whether the mean used inverse-variance weights.
    pub weighted: bool,
}

// ---------------------------------------------------------------------------
// Template construction for one band
// ---------------------------------------------------------------------------

/// Combine the normalized spectra of one band into a template.
///
/// Optical members are averaged once with extremes. Near-infrared members are
/// averaged, rescaled against that first template and averaged again (unless
/// `renormalize` is off). Either way the reported variance is the unweighted
/// scatter of the final members around their plain mean.
pub fn build_template(
    spectra: &[Spectrum],
    source: Source,
    config: &PipelineConfig,
) -> SpecResult<BuiltTemplate> {
    let members: SpectrumCollection = spectra
        .iter()
        .filter(|sp| usable_member(sp, source, config.require_uncertainty))
        .cloned()
        .map(Some)
        .collect();
    if members.len() < 2 {
        return Err(SpecError::EmptyInput("a template needs at least 2 spectra"));
    }

    let base = CombineOptions {
        robust: config.outlier_sigma,
        force_unweighted: config.force_unweighted,
        ..CombineOptions::default()
    };
    let with_extremes = CombineOptions {
        extremes: true,
        ..base
    };

    let (combined, finals) = match source {
        Source::NearInfrared if config.renormalize => {
            let first = mean_comb(
                &members,
                None,
                &CombineOptions {
                    renormalize: true,
                    ..base
                },
            )?;
            let renormalized: SpectrumCollection = first
                .renormalized
                .unwrap_or_default()
                .into_iter()
                .map(Some)
                .collect();
            (mean_comb(&renormalized, None, &with_extremes)?, renormalized)
        }
        _ => (mean_comb(&members, None, &with_extremes)?, members),
    };

    let plain = mean_comb(
        &finals,
        None,
        &CombineOptions {
            force_unweighted: true,
            ..base
        },
    )?;

    let mut template = combined.template;
    template.variance = plain.template.variance;
    debug!(
        "template of {} members on {} points (weighted = {})",
        finals.len(),
        template.len(),
        combined.weighted
    );
    Ok(BuiltTemplate {
        template,
        members: finals.len(),
        weighted: combined.weighted,
    })
}

// ---------------------------------------------------------------------------
// Whole group
// ---------------------------------------------------------------------------

fn smooth_source(
    spectra: &[Option<Spectrum>],
    source: Source,
    config: &PipelineConfig,
) -> SpectrumCollection {
    let settings = SmoothSettings {
        old_resolution: None,
        new_resolution: config.smoothing.new_resolution,
        default_window: config.smoothing.default_window(source),
        resolution_keys: &config.read.header_keys.resolution,
    };
    smooth_all(spectra, &settings)
}

/// Build every band template of one group.
///
/// Reads the group's optical and near-infrared files, drops objects missing
/// either spectrum, smooths, and then for each band of `bands` (in band
/// order) selects, normalizes and combines. A band that cannot be built is
/// logged and left out.
pub fn build_group(
    group: &GroupSpec,
    config: &PipelineConfig,
    bands: &BandTable,
) -> Vec<TemplateRecord> {
    let label = group.label();
    let mut optical = read_spectra(&group.optical, &config.read);
    let mut near_infrared = read_spectra(&group.near_infrared, &config.read);

    let pairs = pair_sources(&mut optical, &mut near_infrared);
    if pairs == 0 {
        warn!("{label}: no spectral data found");
        return Vec::new();
    }
    info!("{label}: {pairs} object(s) with spectra");

    let optical = smooth_source(&optical, Source::Optical, config);
    let near_infrared = smooth_source(&near_infrared, Source::NearInfrared, config);

    let mut mask = MemberMask::new(optical.len().max(near_infrared.len()));
    let mut records = Vec::new();
    for (band, window) in bands.iter() {
        let spectra = match window.source {
            Source::Optical => &optical,
            Source::NearInfrared => &near_infrared,
        };
        if spectra.iter().all(Option::is_none) {
            debug!("{label} {band}: no {:?} spectra", window.source);
            continue;
        }

        let normalized = select_bands(spectra, window.limits.low, window.limits.high)
            .and_then(|selected| normalize_all(&selected, window.norm.low, window.norm.high));
        let normalized = match normalized {
            Ok(n) => n,
            Err(err) => {
                warn!("{label} {band}: {err}");
                continue;
            }
        };
        if normalized.limits_adjusted {
            warn!("{label} {band}: limits for normalization changed");
        }

        let members = mask.select(&normalized.spectra, window.source, config.require_uncertainty);
        debug!("{label} {band}: {} object(s) still in the templates", mask.count());
        match build_template(&members, window.source, config) {
            Ok(built) => {
                info!("{label} {band}: template from {} spectra", built.members);
                records.push(TemplateRecord {
                    label: label.clone(),
                    band,
                    members: built.members,
                    template: built.template,
                });
            }
            Err(err) => warn!("{label} {band}: no template: {err}"),
        }
    }
    records
}
