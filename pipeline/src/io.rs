//! Loading of the input tables and index lists, writing of the submission
//!
//! All readers and writers work on `Read` / `Write` implementations, the `*_path` helpers only
//! open the file.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use csv::ReaderBuilder;
use ndarray::{Array1, Array2};
use tracing::info;

use crate::error::{PipelineError, Result};

pub const ID_COLUMN: &str = "ID_code";
pub const TARGET_COLUMN: &str = "target";

/// One input table
///
/// `targets` is present exactly for labeled tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub ids: Vec<String>,
    pub feature_names: Vec<String>,
    pub records: Array2<f64>,
    pub targets: Option<Array1<bool>>,
}

impl Table {
    pub fn nsamples(&self) -> usize {
        self.records.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.records.ncols()
    }
}

fn malformed(msg: String) -> PipelineError {
    PipelineError::MalformedInput(msg)
}

/// Reads a table with header `ID_code[,target],<features…>`
///
/// Every feature value has to be a finite number, targets have to be `0` or `1`.
pub fn read_table<R: Read>(reader: R, labeled: bool) -> Result<Table> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut columns = headers.iter();
    if columns.next() != Some(ID_COLUMN) {
        return Err(malformed(format!(
            "first column should be {}, header is {:?}",
            ID_COLUMN, headers
        )));
    }
    if labeled && columns.next() != Some(TARGET_COLUMN) {
        return Err(malformed(format!(
            "second column should be {}, header is {:?}",
            TARGET_COLUMN, headers
        )));
    }
    let feature_names = columns.map(String::from).collect::<Vec<_>>();
    if feature_names.is_empty() {
        return Err(malformed("table has no feature columns".into()));
    }
    let first_feature = if labeled { 2 } else { 1 };

    let mut ids = Vec::new();
    let mut targets = Vec::new();
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let mut fields = record.iter();
        ids.push(fields.next().unwrap_or_default().to_string());

        if labeled {
            let field = fields.next().unwrap_or_default().trim();
            let target = match field.parse::<f64>() {
                Ok(x) if x == 0.0 => false,
                Ok(x) if x == 1.0 => true,
                _ => {
                    return Err(malformed(format!(
                        "row {}: target {:?} is neither 0 nor 1",
                        row, field
                    )))
                }
            };
            targets.push(target);
        }

        for (j, field) in fields.enumerate() {
            match field.trim().parse::<f64>() {
                Ok(x) if x.is_finite() => values.push(x),
                _ => {
                    return Err(malformed(format!(
                        "row {}: value {:?} of {} is not a finite number",
                        row,
                        field,
                        headers.get(first_feature + j).unwrap_or_default()
                    )))
                }
            }
        }
    }

    let records = Array2::from_shape_vec((ids.len(), feature_names.len()), values)
        .map_err(tabfuse::error::Error::from)?;
    Ok(Table {
        ids,
        feature_names,
        records,
        targets: if labeled {
            Some(Array1::from(targets))
        } else {
            None
        },
    })
}

/// Reads one non-negative index per line
///
/// Blank lines and everything after a `#` are ignored.
pub fn read_indices<R: Read>(reader: R) -> Result<Vec<usize>> {
    let mut indices = Vec::new();
    for (number, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        let index = content.parse::<usize>().map_err(|_| {
            malformed(format!(
                "line {}: {:?} is not a non-negative integer",
                number + 1,
                content
            ))
        })?;
        indices.push(index);
    }
    Ok(indices)
}

/// Writes `ID_code,target` rows
pub fn write_submission<W: Write>(writer: W, ids: &[String], targets: &[f64]) -> Result<()> {
    tabfuse::error::ensure_len("submission rows", ids.len(), targets.len())?;
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(&[ID_COLUMN, TARGET_COLUMN])?;
    for (id, target) in ids.iter().zip(targets) {
        writer.write_record(&[id.as_str(), target.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_table_path<P: AsRef<Path>>(path: P, labeled: bool) -> Result<Table> {
    let path = path.as_ref();
    let table = read_table(BufReader::new(File::open(path)?), labeled)?;
    info!(
        path = %path.display(),
        samples = table.nsamples(),
        features = table.nfeatures(),
        "table loaded"
    );
    Ok(table)
}

pub fn read_indices_path<P: AsRef<Path>>(path: P) -> Result<Vec<usize>> {
    read_indices(File::open(path)?)
}

pub fn write_submission_path<P: AsRef<Path>>(path: P, ids: &[String], targets: &[f64]) -> Result<()> {
    let path = path.as_ref();
    write_submission(File::create(path)?, ids, targets)?;
    info!(path = %path.display(), rows = ids.len(), "submission written");
    Ok(())
}
