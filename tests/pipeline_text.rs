use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;

use spectemplate::config::{BandTable, GroupSpec};
use spectemplate::data::export::{
    read_templates_parquet, write_records_ascii, write_templates_parquet,
};
use spectemplate::data::loader::read_templates;
use spectemplate::pipeline::build_group;
use spectemplate::{Band, PipelineConfig};

fn write_spectrum(
    dir: &Path,
    name: &str,
    wl: &[f64],
    flux: &[f64],
    unc: Option<&[f64]>,
) -> PathBuf {
    let mut body = String::from("# wavelength flux [error]\n");
    for i in 0..wl.len() {
        match unc {
            Some(u) => writeln!(body, "{}\t{}\t{}", wl[i], flux[i], u[i]).unwrap(),
            None => writeln!(body, "{}\t{}", wl[i], flux[i]).unwrap(),
        }
    }
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn shape(wl: f64) -> f64 {
    1.0 + 0.3 * (3.0 * wl).sin()
}

/// Four objects; object 3 has no near-infrared uncertainties, object 2 has
/// no near-infrared file at all.
fn make_group(dir: &Path) -> GroupSpec {
    let opt_wl: Vec<f64> = (0..400).map(|i| 6400.0 + i as f64 * 7.0).collect();
    let nir_wl: Vec<f64> = (0..900).map(|i| 0.78 + i as f64 * 0.002).collect();

    let mut group = GroupSpec {
        name: "L3".into(),
        gravity: "f".into(),
        optical: Vec::new(),
        near_infrared: Vec::new(),
    };
    for obj in 0..4 {
        let scale = 1.0 + obj as f64;
        let opt_flux: Vec<f64> = opt_wl.iter().map(|w| scale * shape(w / 1e4)).collect();
        group.optical.push(Some(write_spectrum(
            dir,
            &format!("opt{obj}.txt"),
            &opt_wl,
            &opt_flux,
            None,
        )));

        if obj == 2 {
            group.near_infrared.push(None);
            continue;
        }
        let nir_flux: Vec<f64> = nir_wl.iter().map(|w| scale * shape(*w)).collect();
        let nir_unc: Vec<f64> = nir_flux.iter().map(|f| 0.02 * f).collect();
        let unc = (obj != 3).then_some(nir_unc.as_slice());
        group.near_infrared.push(Some(write_spectrum(
            dir,
            &format!("nir{obj}.txt"),
            &nir_wl,
            &nir_flux,
            unc,
        )));
    }
    group
}

#[test]
fn builds_all_band_templates_from_text_spectra() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        groups: vec![make_group(dir.path())],
        ..PipelineConfig::default()
    };
    let bands = config.band_table().unwrap();

    let records = build_group(&config.groups[0], &config, &bands);
    let found: Vec<Band> = records.iter().map(|r| r.band).collect();
    assert_eq!(found, vec![Band::Optical, Band::J, Band::H, Band::K]);

    let by_band = |band| records.iter().find(|r| r.band == band).unwrap();
    // object 2 dropped by pairing; object 3 dropped from the NIR bands
    assert_eq!(by_band(Band::Optical).members, 3);
    assert_eq!(by_band(Band::J).members, 2);
    assert_eq!(by_band(Band::K).members, 2);

    // members only differ by scale, so every template is the normalized shape
    for rec in &records {
        let window = bands.get(rec.band).unwrap();
        let tpl = &rec.template;
        assert!(tpl.wavelength.iter().all(|w| window.limits.contains(*w)));
        let inside: Vec<f64> = tpl
            .wavelength
            .iter()
            .zip(&tpl.mean_flux)
            .filter(|(w, f)| window.norm.contains(**w) && f.is_finite())
            .map(|(_, f)| *f)
            .collect();
        let mean = inside.iter().sum::<f64>() / inside.len() as f64;
        assert_abs_diff_eq!(mean, 1.0, epsilon = 0.02);

        let ext = tpl.extrema.as_ref().unwrap();
        for i in 0..tpl.len() {
            if tpl.mean_flux[i].is_finite() {
                assert!(ext.min[i] <= tpl.mean_flux[i] + 1e-9);
                assert!(ext.max[i] >= tpl.mean_flux[i] - 1e-9);
            }
        }
    }
}

#[test]
fn group_without_pairs_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let group = GroupSpec {
        name: "T0".into(),
        gravity: String::new(),
        optical: vec![Some(dir.path().join("missing.txt")), None],
        near_infrared: vec![None, Some(dir.path().join("gone.txt"))],
    };
    let config = PipelineConfig::default();
    let bands = BandTable::new(&config.bands).unwrap();
    assert!(build_group(&group, &config, &bands).is_empty());
}

#[test]
fn exported_templates_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        groups: vec![make_group(dir.path())],
        ..PipelineConfig::default()
    };
    let bands = config.band_table().unwrap();
    let records = build_group(&config.groups[0], &config, &bands);

    let out = dir.path().join("templates");
    let paths = write_records_ascii(&out, &records, true).unwrap();
    assert!(paths.iter().any(|p| p.ends_with("L3_f_OPT.txt")));

    let templates = read_templates(&paths, &config.read);
    assert_eq!(templates.len(), records.len());
    let j = records.iter().position(|r| r.band == Band::J).unwrap();
    let back = templates[j].as_ref().unwrap();
    assert_eq!(back.len(), records[j].template.len());
    assert_abs_diff_eq!(back.wavelength[10], records[j].template.wavelength[10], epsilon = 1e-12);

    let parquet = out.join("templates.parquet");
    write_templates_parquet(&parquet, &records).unwrap();
    let rows = read_templates_parquet(&parquet).unwrap();
    assert_eq!(rows.len(), records.len());
    assert_eq!(rows[j].label, "L3_f");
    assert_eq!(rows[j].members, records[j].members);
}
