//! Observation period aggregation over the clinical tables.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::DataFrame;

use omop_common::{i64_values, open_end, open_start, parse_date, string_values};

use crate::error::Result;

/// One clinical row projected to its date span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub person_id: i64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationPeriod {
    pub observation_period_id: i64,
    pub person_id: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Unparsable dates and dates outside 1900-01-01..=2099-12-31 become null.
fn plausible_date(value: Option<&str>) -> Option<NaiveDate> {
    value
        .and_then(parse_date)
        .filter(|date| (open_start()..=open_end()).contains(date))
}

/// Projects a CDM frame to spans; single-date tables pass the same column
/// twice. Rows without a person id are skipped.
pub fn project_spans(
    df: &DataFrame,
    start_column: &str,
    end_column: &str,
) -> Result<Vec<Span>> {
    let persons = i64_values(df, "person_id")?;
    let starts = string_values(df, start_column)?;
    let ends = string_values(df, end_column)?;
    Ok(persons
        .into_iter()
        .zip(starts.iter().zip(&ends))
        .filter_map(|(person, (start, end))| {
            Some(Span {
                person_id: person?,
                start: plausible_date(start.as_deref()),
                end: plausible_date(end.as_deref()),
            })
        })
        .collect())
}

/// Groups spans by person into one period spanning min(start)..max(end).
///
/// A missing end takes the start of its row; rows without a start are
/// dropped. Periods are ordered by person id and numbered from 1.
pub fn aggregate_periods<I>(spans: I) -> Vec<ObservationPeriod>
where
    I: IntoIterator<Item = Span>,
{
    let mut bounds: BTreeMap<i64, (NaiveDate, NaiveDate)> = BTreeMap::new();
    for span in spans {
        let Some(start) = span.start else {
            continue;
        };
        let end = span.end.unwrap_or(start).max(start);
        bounds
            .entry(span.person_id)
            .and_modify(|(min_start, max_end)| {
                *min_start = (*min_start).min(start);
                *max_end = (*max_end).max(end);
            })
            .or_insert((start, end));
    }
    bounds
        .into_iter()
        .enumerate()
        .map(|(position, (person_id, (start, end)))| ObservationPeriod {
            observation_period_id: position as i64 + 1,
            person_id,
            start,
            end,
        })
        .collect()
}
