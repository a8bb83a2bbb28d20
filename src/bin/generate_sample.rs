use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use spectemplate::config::GroupSpec;
use spectemplate::PipelineConfig;

/// Write synthetic optical and near-infrared spectra plus a config that
/// builds templates from them.
#[derive(Debug, Parser)]
struct Args {
    /// Directory to create the sample in.
    #[arg(default_value = "sample_data")]
    dir: PathBuf,

    /// Objects per group.
    #[arg(short, long, default_value_t = 6)]
    objects: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Smooth red continuum with the water and alkali absorptions of an L dwarf,
/// wavelength in microns.
fn l_dwarf_flux(wl: f64, temperature: f64) -> f64 {
    let peak = 2898.0 / temperature;
    let continuum = (-(wl - peak).powi(2) / 0.5).exp() + 0.05;
    let absorption = gaussian(wl, 0.7665, 0.01, 0.4)
        + gaussian(wl, 1.15, 0.04, 0.3)
        + gaussian(wl, 1.4, 0.06, 0.6)
        + gaussian(wl, 1.9, 0.08, 0.6)
        + gaussian(wl, 2.3, 0.03, 0.15);
    continuum * (1.0 - absorption).max(0.05)
}

fn write_columns(path: &Path, columns: &[&[f64]]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "# synthetic spectrum")?;
    for i in 0..columns[0].len() {
        let row: Vec<String> = columns.iter().map(|c| format!("{:.6e}", c[i])).collect();
        writeln!(out, "{}", row.join("\t"))?;
    }
    out.flush()?;
    Ok(())
}

fn write_group(
    dir: &Path,
    name: &str,
    temperature: f64,
    objects: usize,
    rng: &mut StdRng,
) -> Result<GroupSpec> {
    // optical in Angstrom, converted by the reader
    let opt_wl: Vec<f64> = (0..1600).map(|i| 6000.0 + i as f64 * 2.0).collect();
    let nir_wl: Vec<f64> = (0..900).map(|i| 0.75 + i as f64 * 0.002).collect();

    let noise = 0.02;
    let temp_jitter = Normal::new(0.0, 50.0).context("temperature jitter")?;
    let opt_noise = Normal::new(1.0, 0.03).context("optical noise")?;
    let nir_noise = Normal::new(1.0, noise).context("near-infrared noise")?;

    let mut group = GroupSpec {
        name: name.to_string(),
        gravity: "f".to_string(),
        optical: Vec::new(),
        near_infrared: Vec::new(),
    };

    for obj in 0..objects {
        let scale = rng.random_range(0.5..2.0) * 1e-15;
        let temp = temperature + temp_jitter.sample(rng);

        let opt_flux: Vec<f64> = opt_wl
            .iter()
            .map(|w| scale * l_dwarf_flux(w / 1e4, temp) * opt_noise.sample(rng))
            .collect();
        let opt_name = format!("{name}_{obj}_opt.txt");
        write_columns(&dir.join(&opt_name), &[&opt_wl, &opt_flux])?;

        let nir_flux: Vec<f64> = nir_wl
            .iter()
            .map(|w| scale * l_dwarf_flux(*w, temp) * nir_noise.sample(rng))
            .collect();
        let nir_unc: Vec<f64> = nir_flux.iter().map(|f| f.abs() * noise).collect();
        let nir_name = format!("{name}_{obj}_nir.txt");
        // the last object has no uncertainties and is left out of the NIR templates
        if obj + 1 == objects {
            write_columns(&dir.join(&nir_name), &[&nir_wl, &nir_flux])?;
        } else {
            write_columns(&dir.join(&nir_name), &[&nir_wl, &nir_flux, &nir_unc])?;
        }

        group.optical.push(Some(PathBuf::from(opt_name)));
        group.near_infrared.push(Some(PathBuf::from(nir_name)));
    }
    Ok(group)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);
    fs::create_dir_all(&args.dir).with_context(|| format!("creating {}", args.dir.display()))?;

    let groups = [("L1", 2000.0), ("L3", 1800.0), ("L5", 1600.0)]
        .into_iter()
        .map(|(name, temp)| write_group(&args.dir, name, temp, args.objects, &mut rng))
        .collect::<Result<Vec<_>>>()?;

    let config = PipelineConfig {
        groups,
        ..PipelineConfig::default()
    };
    let config_path = args.dir.join("config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!(
        "Wrote {} groups of {} objects and {}",
        config.groups.len(),
        args.objects,
        config_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_lines(path: &Path) -> Vec<Vec<f64>> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(|l| l.split('\t').map(|v| v.parse().unwrap()).collect())
            .collect()
    }

    #[test]
    fn test_group_files_and_noise() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let group = write_group(dir.path(), "L3", 1800.0, 3, &mut rng).unwrap();
        assert_eq!(group.optical.len(), 3);
        assert_eq!(group.near_infrared.len(), 3);

        let opt = data_lines(&dir.path().join("L3_0_opt.txt"));
        assert_eq!(opt.len(), 1600);
        assert!(opt.iter().all(|row| row.len() == 2 && row[1] > 0.0));

        let nir = data_lines(&dir.path().join("L3_0_nir.txt"));
        assert!(nir.iter().all(|row| row.len() == 3 && row[2] > 0.0));
        let last = data_lines(&dir.path().join("L3_2_nir.txt"));
        assert!(last.iter().all(|row| row.len() == 2));
    }
}
