//! Delimited file reading into all-string DataFrames.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use encoding_rs::Encoding;
use polars::prelude::DataFrame;

use omop_common::string_column;

use crate::encoding::decode_bytes;
use crate::error::{IngestError, Result};

/// Parsed file before conversion to a DataFrame.
#[derive(Debug, Clone)]
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

fn normalize_header(raw: &str, idx: usize) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        format!("column_{}", idx + 1)
    } else {
        trimmed.to_string()
    }
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_raw(text: &str, delimiter: u8, path: &Path) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header_record = match records.next() {
        Some(record) => record.map_err(|err| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?,
        None => {
            return Err(IngestError::EmptyCsv {
                path: path.to_path_buf(),
            });
        }
    };
    let headers: Vec<String> = header_record
        .iter()
        .enumerate()
        .map(|(idx, raw)| normalize_header(raw, idx))
        .collect();
    if headers.is_empty() {
        return Err(IngestError::EmptyCsv {
            path: path.to_path_buf(),
        });
    }
    let mut seen = HashMap::new();
    for header in &headers {
        if seen.insert(header.as_str(), ()).is_some() {
            return Err(IngestError::DuplicateColumn {
                column: header.clone(),
                path: path.to_path_buf(),
            });
        }
    }

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|err| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut row: Vec<Option<String>> = record.iter().map(normalize_cell).collect();
        if row.iter().all(Option::is_none) {
            continue;
        }
        if row.len() > headers.len() {
            tracing::debug!(
                path = %path.display(),
                extra = row.len() - headers.len(),
                "dropping cells beyond the header width"
            );
        }
        row.resize(headers.len(), None);
        rows.push(row);
    }
    Ok(RawTable { headers, rows })
}

fn into_frame(table: RawTable) -> Result<DataFrame> {
    let RawTable { headers, rows } = table;
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); headers.len()];
    for row in rows {
        for (column, cell) in columns.iter_mut().zip(row) {
            column.push(cell);
        }
    }
    let columns = headers
        .iter()
        .zip(columns)
        .map(|(name, values)| string_column(name, values))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Parses delimited text; `origin` only labels errors.
pub fn parse_delimited(text: &str, delimiter: u8, origin: &Path) -> Result<DataFrame> {
    into_frame(parse_raw(text, delimiter, origin)?)
}

fn read_raw(path: &Path, encoding: &'static Encoding, delimiter: u8) -> Result<RawTable> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IngestError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            IngestError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    let text = decode_bytes(&bytes, encoding, path);
    parse_raw(&text, delimiter, path)
}

/// Reads one delimited file.
pub fn read_delimited(path: &Path, encoding: &'static Encoding, delimiter: u8) -> Result<DataFrame> {
    let table = read_raw(path, encoding, delimiter)?;
    tracing::debug!(
        path = %path.display(),
        rows = table.rows.len(),
        columns = table.headers.len(),
        "loaded csv"
    );
    into_frame(table)
}

/// Reads and stacks the source files of one table.
///
/// Columns are the union of all headers in first-seen order; a file lacking
/// a column contributes nulls for it.
pub fn read_sources(
    paths: &[PathBuf],
    encoding: &'static Encoding,
    delimiter: u8,
) -> Result<DataFrame> {
    if paths.is_empty() {
        return Err(IngestError::NoSourceFiles);
    }
    let mut headers: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();

    for path in paths {
        let table = read_raw(path, encoding, delimiter)?;
        let mut slots = Vec::with_capacity(table.headers.len());
        for header in &table.headers {
            let slot = *positions.entry(header.clone()).or_insert_with(|| {
                headers.push(header.clone());
                headers.len() - 1
            });
            slots.push(slot);
        }
        tracing::debug!(path = %path.display(), rows = table.rows.len(), "loaded source file");
        for row in table.rows {
            let mut stacked = vec![None; headers.len()];
            for (slot, cell) in slots.iter().zip(row) {
                stacked[*slot] = cell;
            }
            rows.push(stacked);
        }
    }
    for row in &mut rows {
        row.resize(headers.len(), None);
    }
    into_frame(RawTable { headers, rows })
}

/// Reads a CDM table written by an earlier run.
pub fn read_cdm_table(path: &Path, encoding: &'static Encoding) -> Result<DataFrame> {
    read_delimited(path, encoding, b',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use omop_common::string_values;

    #[test]
    fn empty_cells_become_null() {
        let df = parse_delimited("\u{feff} ID ,NAME\n1, \n2,Kim\n,\n", b',', Path::new("t.csv"))
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            string_values(&df, "NAME").unwrap(),
            vec![None, Some("Kim".to_string())]
        );
        assert_eq!(
            string_values(&df, "ID").unwrap(),
            vec![Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[test]
    fn short_rows_are_padded() {
        let df = parse_delimited("A\tB\tC\nx\n", b'\t', Path::new("t.tsv")).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(string_values(&df, "C").unwrap(), vec![None]);
    }

    #[test]
    fn duplicate_headers_rejected() {
        let err = parse_delimited("A,a,A\n1,2,3\n", b',', Path::new("d.csv")).unwrap_err();
        assert!(matches!(err, IngestError::DuplicateColumn { ref column, .. } if column == "A"));
    }

    #[test]
    fn empty_text_is_empty_csv() {
        let err = parse_delimited("", b',', Path::new("e.csv")).unwrap_err();
        assert!(matches!(err, IngestError::EmptyCsv { .. }));
    }
}
