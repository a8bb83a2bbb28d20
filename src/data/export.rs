use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, Float64Array, Float64Builder, Int64Array, ListArray, ListBuilder, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::model::{Extrema, Template};
use crate::config::Band;

/// A finished template together with what it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRecord {
    /// Group label, e.g. `L3_f`.
    pub label: String,
    pub band: Band,
    /// Number of spectra that went into the template.
    pub members: usize,
    pub template: Template,
}

impl TemplateRecord {
    /// `<label>_<band>.txt`
    pub fn file_name(&self) -> String {
        format!("{}_{}.txt", self.label, self.band)
    }
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// Write a template as tab-delimited columns: wavelength, mean, variance and,
/// when present, min and max. NaN is written as `NaN`.
pub fn write_template_ascii(path: &Path, template: &Template, header: bool) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    if header {
        let mut names = vec!["wavelength", "mean", "variance"];
        if template.extrema.is_some() {
            names.extend(["min", "max"]);
        }
        writeln!(file, "# {}", names.join("\t")).context("writing header line")?;
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(file);
    let columns = template.columns();
    for i in 0..template.len() {
        writer
            .write_record(columns.iter().map(|c| c[i].to_string()))
            .with_context(|| format!("writing row {i}"))?;
    }
    writer.flush().context("flushing template file")?;
    Ok(())
}

/// Write every record to `dir` as `<label>_<band>.txt`; returns the paths.
pub fn write_records_ascii(
    dir: &Path,
    records: &[TemplateRecord],
    header: bool,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    records
        .iter()
        .map(|rec| {
            let path = dir.join(rec.file_name());
            write_template_ascii(&path, &rec.template, header)?;
            Ok(path)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn list_field(name: &str, nullable: bool) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        nullable,
    )
}

fn list_array<'a>(rows: impl Iterator<Item = Option<&'a [f64]>>) -> ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        match row {
            Some(values) => {
                builder.values().append_slice(values);
                builder.append(true);
            }
            None => builder.append(false),
        }
    }
    builder.finish()
}

/// Write templates as one Parquet row each.
///
/// Schema: `x` (wavelength) and `y` (mean flux) list columns, as any
/// spectrum viewer reading `x`/`y` expects, then `variance`, `min`, `max`
/// lists and the `label`, `band`, `members` metadata columns.
pub fn write_templates_parquet(path: &Path, records: &[TemplateRecord]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        list_field("x", false),
        list_field("y", false),
        list_field("variance", false),
        list_field("min", true),
        list_field("max", true),
        Field::new("label", DataType::Utf8, false),
        Field::new("band", DataType::Utf8, false),
        Field::new("members", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(list_array(
                records.iter().map(|r| Some(r.template.wavelength.as_slice())),
            )),
            Arc::new(list_array(
                records.iter().map(|r| Some(r.template.mean_flux.as_slice())),
            )),
            Arc::new(list_array(
                records.iter().map(|r| Some(r.template.variance.as_slice())),
            )),
            Arc::new(list_array(
                records
                    .iter()
                    .map(|r| r.template.extrema.as_ref().map(|e| e.min.as_slice())),
            )),
            Arc::new(list_array(
                records
                    .iter()
                    .map(|r| r.template.extrema.as_ref().map(|e| e.max.as_slice())),
            )),
            Arc::new(StringArray::from(
                records.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                records.iter().map(|r| r.band.to_string()).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                records.iter().map(|r| r.members as i64).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    info!("wrote {} template(s) to {}", records.len(), path.display());
    Ok(())
}

/// Read back a file written by [`write_templates_parquet`].
pub fn read_templates_parquet(path: &Path) -> Result<Vec<TemplateRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?
        .build()
        .context("building parquet reader")?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.context("reading record batch")?;
        let x: &ListArray = column(&batch, "x")?;
        let y: &ListArray = column(&batch, "y")?;
        let var: &ListArray = column(&batch, "variance")?;
        let min: &ListArray = column(&batch, "min")?;
        let max: &ListArray = column(&batch, "max")?;
        let labels: &StringArray = column(&batch, "label")?;
        let bands: &StringArray = column(&batch, "band")?;
        let members: &Int64Array = column(&batch, "members")?;

        for row in 0..batch.num_rows() {
            let extrema = if min.is_null(row) || max.is_null(row) {
                None
            } else {
                Some(Extrema {
                    min: f64_list(min, row)?,
                    max: f64_list(max, row)?,
                })
            };
            records.push(TemplateRecord {
                label: labels.value(row).to_string(),
                band: bands.value(row).parse()?,
                members: members.value(row).max(0) as usize,
                template: Template {
                    wavelength: f64_list(x, row)?,
                    mean_flux: f64_list(y, row)?,
                    variance: f64_list(var, row)?,
                    extrema,
                },
            });
        }
    }
    Ok(records)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .with_context(|| format!("missing or mistyped column '{name}'"))
}

fn f64_list(col: &ListArray, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }
    let values = col.value(row);
    let Some(arr) = values.as_any().downcast_ref::<Float64Array>() else {
        bail!("list inner type is {:?}, expected Float64", values.data_type());
    };
    Ok(arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(band: Band, extremes: bool) -> TemplateRecord {
        TemplateRecord {
            label: "L3_f".into(),
            band,
            members: 4,
            template: Template {
                wavelength: vec![1.0, 1.1, 1.2],
                mean_flux: vec![0.9, f64::NAN, 1.1],
                variance: vec![0.01, f64::NAN, 0.03],
                extrema: extremes.then(|| Extrema {
                    min: vec![0.8, f64::NAN, 1.0],
                    max: vec![1.0, f64::NAN, 1.2],
                }),
            },
        }
    }

    #[test]
    fn test_ascii_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record(Band::J, true);
        let paths = write_records_ascii(dir.path(), &[rec], true).unwrap();
        assert!(paths[0].ends_with("L3_f_J.txt"));

        let text = std::fs::read_to_string(&paths[0]).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("# wavelength\tmean\tvariance\tmin\tmax"));
        assert_eq!(lines.next(), Some("1\t0.9\t0.01\t0.8\t1"));
        assert_eq!(lines.next(), Some("1.1\tNaN\tNaN\tNaN\tNaN"));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn test_ascii_without_extrema_has_three_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        write_template_ascii(&path, &record(Band::K, false).template, false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().all(|l| l.split('\t').count() == 3));
        assert!(!text.starts_with('#'));
    }

    #[test]
    fn test_parquet_records_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.parquet");
        let records = vec![record(Band::Optical, true), record(Band::H, false)];
        write_templates_parquet(&path, &records).unwrap();

        let back = read_templates_parquet(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].band, Band::Optical);
        assert_eq!(back[0].members, 4);
        assert_eq!(back[0].template.wavelength, records[0].template.wavelength);
        assert!(back[0].template.mean_flux[1].is_nan());
        assert_eq!(back[0].template.extrema.as_ref().unwrap().max[2], 1.2);
        assert!(back[1].template.extrema.is_none());
    }
}
