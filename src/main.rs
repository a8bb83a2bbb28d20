use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use rayon::prelude::*;

use spectemplate::data::export::{write_records_ascii, write_templates_parquet};
use spectemplate::pipeline::build_group;
use spectemplate::{PipelineConfig, TemplateRecord};

/// Build band templates for every group listed in a config file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON pipeline config.
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory (overrides the config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write all templates to `templates.parquet`.
    #[arg(long)]
    parquet: bool,

    /// Start each text template with a `#` column header line.
    #[arg(long)]
    header: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = PipelineConfig::from_file(&cli.config)?;
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    config.write_parquet |= cli.parquet;
    config.write_header |= cli.header;
    let bands = config.band_table()?;

    info!("building templates for {} group(s)", config.groups.len());
    let records: Vec<TemplateRecord> = config
        .groups
        .par_iter()
        .flat_map_iter(|group| build_group(group, &config, &bands))
        .collect();

    let written = write_records_ascii(&config.output_dir, &records, config.write_header)?;
    info!("wrote {} template file(s) to {}", written.len(), config.output_dir.display());

    if config.write_parquet {
        write_templates_parquet(&config.output_dir.join("templates.parquet"), &records)?;
    }
    Ok(())
}
