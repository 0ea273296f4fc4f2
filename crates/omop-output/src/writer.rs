use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use omop_common::any_to_string;
use omop_model::CdmTable;
use polars::prelude::{AnyValue, DataFrame};
use sha2::{Digest, Sha256};

use crate::error::{OutputError, Result};

/// A CDM file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenTable {
    pub table: CdmTable,
    pub path: PathBuf,
    pub rows: usize,
    /// Lowercase hex SHA-256 of the encoded file.
    pub sha256: String,
}

/// Renders a frame as CSV text with a header row and `\n` line endings.
pub fn render_csv(df: &DataFrame) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(df.get_column_names().iter().map(|name| name.as_str()))?;

    let columns = df.get_columns();
    let mut record: Vec<String> = Vec::with_capacity(columns.len());
    for idx in 0..df.height() {
        record.clear();
        for column in columns {
            record.push(any_to_string(column.get(idx).unwrap_or(AnyValue::Null)));
        }
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|err| OutputError::Csv {
        message: err.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|err| OutputError::Csv {
        message: err.to_string(),
    })
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| OutputError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Writes a table's frame to `path` in `encoding`.
///
/// Characters the encoding cannot represent are written as numeric
/// character references and reported as a warning.
pub fn write_cdm_csv(
    table: CdmTable,
    path: &Path,
    df: &DataFrame,
    encoding: &'static Encoding,
) -> Result<WrittenTable> {
    let text = render_csv(df)?;
    let (bytes, used, unmappable) = encoding.encode(&text);
    if unmappable {
        tracing::warn!(
            %table,
            path = %path.display(),
            encoding = used.name(),
            "characters not representable in the output encoding were escaped"
        );
    }

    ensure_parent_dir(path)?;
    fs::write(path, &bytes).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let sha256 = hex::encode(Sha256::digest(&bytes));
    tracing::debug!(%table, path = %path.display(), rows = df.height(), %sha256, "wrote table");
    Ok(WrittenTable {
        table,
        path: path.to_path_buf(),
        rows: df.height(),
        sha256,
    })
}

#[cfg(test)]
mod tests {
    use omop_common::{i64_column, string_column};

    use super::*;

    #[test]
    fn nulls_are_empty_and_fields_quoted_when_needed() {
        let df = DataFrame::new(vec![
            i64_column("id", vec![Some(1), None]),
            string_column("name", vec![Some("a, b".to_string()), None]),
        ])
        .unwrap();
        insta::assert_snapshot!(render_csv(&df).unwrap(), @r#"
        id,name
        1,"a, b"
        ,
        "#);
    }
}
