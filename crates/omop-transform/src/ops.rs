//! Row-level helpers shared by the transformers.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::{Column, DataFrame, IntoColumn, NamedFrom, Series};

use omop_common::{i64_column, i64_values, parse_datetime, string_column, string_values};
use omop_model::CdmTable;

use crate::error::{Result, TransformError};

/// Dense 1-based surrogate keys.
pub fn dense_ids(count: usize) -> Vec<i64> {
    (1..=count as i64).collect()
}

/// Marks the first row of each key; rows without a key are dropped.
pub fn first_occurrence(keys: &[Option<String>]) -> Vec<bool> {
    let mut seen = HashSet::new();
    keys.iter()
        .map(|key| match key {
            Some(key) => seen.insert(key.as_str()),
            None => false,
        })
        .collect()
}

/// Indices of the rows whose mask entry is `true`.
pub fn kept_rows(keep: &[bool]) -> Vec<usize> {
    keep.iter()
        .enumerate()
        .filter_map(|(idx, keep)| keep.then_some(idx))
        .collect()
}

/// Parses source timestamps. Also returns how many non-empty cells did not
/// parse.
pub fn parse_datetimes(values: &[Option<String>]) -> (Vec<Option<NaiveDateTime>>, usize) {
    let mut unparsable = 0;
    let parsed = values
        .iter()
        .map(|value| {
            let value = value.as_deref()?;
            let parsed = parse_datetime(value);
            if parsed.is_none() {
                unparsable += 1;
            }
            parsed
        })
        .collect();
    (parsed, unparsable)
}

/// Keeps the values at `rows`, in that order.
pub fn pick<T: Clone>(values: &[T], rows: &[usize]) -> Vec<T> {
    rows.iter().map(|idx| values[*idx].clone()).collect()
}

/// Whether an event date lies within the configured `data_range` cutoff.
pub fn within_data_range(date: NaiveDate, cutoff: Option<NaiveDate>) -> bool {
    cutoff.is_none_or(|cutoff| date <= cutoff)
}

/// Composite key joining events back to their visit: patient id, visit
/// start timestamp and department.
pub fn visit_source_key(patient: &str, start: NaiveDateTime, department: &str) -> String {
    format!("{}{}{}", patient, start.format("%Y%m%d%H%M%S"), department)
}

/// Maps a text column of a CDM frame to its id column (`person_source_value`
/// to `person_id`, ...). The first id seen for a key wins.
pub fn id_lookup(df: &DataFrame, key_column: &str, id_column: &str) -> Result<HashMap<String, i64>> {
    let keys = string_values(df, key_column)?;
    let ids = i64_values(df, id_column)?;
    let mut lookup = HashMap::with_capacity(keys.len());
    for (key, id) in keys.into_iter().zip(ids) {
        if let (Some(key), Some(id)) = (key, id) {
            lookup.entry(key).or_insert(id);
        }
    }
    Ok(lookup)
}

/// Looks up optional keys; unknown or absent keys give `None`.
pub fn lookup_all(lookup: &HashMap<String, i64>, keys: &[Option<String>]) -> Vec<Option<i64>> {
    keys.iter()
        .map(|key| key.as_ref().and_then(|key| lookup.get(key).copied()))
        .collect()
}

/// Builds a frame in a table's fixed column layout.
///
/// Columns that are never set are written as nulls.
#[derive(Debug)]
pub struct OutputFrame {
    table: CdmTable,
    height: usize,
    columns: HashMap<&'static str, Column>,
}

impl OutputFrame {
    pub fn new(table: CdmTable, height: usize) -> Self {
        Self {
            table,
            height,
            columns: HashMap::new(),
        }
    }

    /// Dense 1-based surrogate keys for every row.
    pub fn ids(&mut self, name: &'static str) -> &mut Self {
        let ids = dense_ids(self.height).into_iter().map(Some).collect();
        self.ints(name, ids)
    }

    pub fn strings(&mut self, name: &'static str, values: Vec<Option<String>>) -> &mut Self {
        self.columns.insert(name, string_column(name, values));
        self
    }

    pub fn ints(&mut self, name: &'static str, values: Vec<Option<i64>>) -> &mut Self {
        self.columns.insert(name, i64_column(name, values));
        self
    }

    pub fn floats(&mut self, name: &'static str, values: Vec<Option<f64>>) -> &mut Self {
        self.columns
            .insert(name, Series::new(name.into(), values).into_column());
        self
    }

    pub fn constant(&mut self, name: &'static str, value: i64) -> &mut Self {
        let values = vec![Some(value); self.height];
        self.ints(name, values)
    }

    pub fn dates(&mut self, name: &'static str, values: &[Option<NaiveDate>]) -> &mut Self {
        let formatted = values
            .iter()
            .map(|value| value.map(omop_common::format_date))
            .collect();
        self.strings(name, formatted)
    }

    pub fn datetimes(&mut self, name: &'static str, values: &[Option<NaiveDateTime>]) -> &mut Self {
        let formatted = values
            .iter()
            .map(|value| value.map(omop_common::format_datetime))
            .collect();
        self.strings(name, formatted)
    }

    /// Assembles the columns in layout order.
    pub fn finish(mut self) -> Result<DataFrame> {
        let layout = self.table.columns();
        if let Some(unknown) = self.columns.keys().find(|name| !layout.contains(*name)) {
            return Err(TransformError::Layout {
                table: self.table,
                column: (*unknown).to_string(),
            });
        }
        let columns = layout
            .iter()
            .map(|name| {
                self.columns
                    .remove(name)
                    .unwrap_or_else(|| string_column(name, vec![None; self.height]))
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_keeps_input_order() {
        let keys = vec![
            Some("a".to_string()),
            Some("b".to_string()),
            Some("a".to_string()),
            None,
        ];
        assert_eq!(first_occurrence(&keys), vec![true, true, false, false]);
    }

    #[test]
    fn unparsable_timestamps_are_counted() {
        let values = vec![
            Some("2021-03-04 09:05:00".to_string()),
            None,
            Some("yesterday".to_string()),
        ];
        let (parsed, unparsable) = parse_datetimes(&values);
        assert!(parsed[0].is_some());
        assert!(parsed[1].is_none());
        assert_eq!(unparsable, 1);
        assert_eq!(kept_rows(&[true, false, true]), vec![0, 2]);
    }

    #[test]
    fn data_range_is_inclusive() {
        let cutoff = NaiveDate::from_ymd_opt(2023, 12, 31);
        let last = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let after = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(within_data_range(last, cutoff));
        assert!(!within_data_range(after, cutoff));
        assert!(within_data_range(after, None));
    }

    #[test]
    fn output_follows_layout_and_fills_nulls() {
        let mut output = OutputFrame::new(CdmTable::ObservationPeriod, 2);
        output
            .ints("person_id", vec![Some(7), Some(9)])
            .ids("observation_period_id");
        let df = output.finish().unwrap();
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, CdmTable::ObservationPeriod.columns());
        assert_eq!(df.column("period_type_concept_id").unwrap().null_count(), 2);
    }

    #[test]
    fn unknown_output_column_is_rejected() {
        let mut output = OutputFrame::new(CdmTable::Location, 0);
        output.strings("zipcode", vec![]);
        assert!(matches!(output.finish(), Err(TransformError::Layout { .. })));
    }

    #[test]
    fn visit_key_concatenates_parts() {
        let start = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(visit_source_key("P1", start, "IM"), "P120210304090500IM");
    }
}
