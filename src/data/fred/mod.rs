/*!
CSV IO in the format used by [FRED](https://fred.stlouisfed.org/) series exports: a date column followed by one or more
numeric columns, with missing values written as `.`
*/
use super::{Observation, TimeSeries};
use crate::{CpuFloat, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use log::debug;
use std::io::{Read, Write};
use std::str::FromStr;

/// The FRED date format
pub const FRED_DATE: &str = "%Y-%m-%d";

/// The name of the date column written by `write_series`
pub const DATE_COLUMN: &str = "observation_date";

/// Read a series from a Reader.
///
/// The first column of every record is its date, and the remaining columns are named by the header row. Records
/// with an unparseable date or a missing, unparseable or non-finite value are dropped. The result is sorted by date,
/// keeping records with equal dates in file order.
pub fn read_series<R: Read>(rdr: R, date_format: &str) -> Result<TimeSeries> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(rdr);
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .skip(1)
        .map(|name| name.trim().to_owned())
        .collect();
    let width = columns.len();
    let mut rows = Vec::new();
    let mut dropped = 0;
    for record in reader.records() {
        match parse_record(&record?, date_format, width) {
            Some(row) => rows.push(row),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("Dropped {} incomplete records", dropped);
    }
    rows.sort_by_key(|row| row.t);
    TimeSeries::from_rows(columns, rows)
}

fn parse_record(record: &StringRecord, date_format: &str, width: usize) -> Option<Observation> {
    let mut fields = record.iter();
    let t = NaiveDate::parse_from_str(fields.next()?.trim(), date_format).ok()?;
    let values = fields
        .map(|field| {
            CpuFloat::from_str(field.trim())
                .ok()
                .filter(|value| value.is_finite())
        })
        .collect::<Option<Vec<_>>>()?;
    if values.len() != width {
        return None;
    }
    Some(Observation { t, values })
}

/// Write a series to a Writer.
/// On success, return how many rows were written
pub fn write_series<W: Write>(wtr: W, series: &TimeSeries, date_format: &str) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(wtr);
    wtr.write_record(std::iter::once(DATE_COLUMN).chain(series.columns().iter().map(String::as_str)))?;
    let mut written = 0;
    for row in series.rows() {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.t.format(date_format).to_string());
        record.extend(row.values.iter().map(|value| value.to_string()));
        wtr.write_record(&record)?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_are_dropped() {
        let data = "observation_date,VIXCLS\n\
                    2020-01-03,14.02\n\
                    2020-01-02,12.47\n\
                    2020-01-06,.\n\
                    not-a-date,13.0\n\
                    2020-01-07,13.79\n\
                    2020-01-08\n";
        let series = read_series(data.as_bytes(), FRED_DATE).unwrap();
        assert_eq!(series.columns(), &["VIXCLS".to_owned()]);
        assert_eq!(series.column(0).collect::<Vec<_>>(), vec![12.47, 14.02, 13.79]);
        assert_eq!(series.first_unsorted(), None);
    }

    #[test]
    fn multiple_columns() {
        let data = "date,a,b\n2021-03-01,1,2\n2021-03-02,3,\n2021-03-03,5,6\n";
        let series = read_series(data.as_bytes(), FRED_DATE).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.rows()[1].values, vec![5.0, 6.0]);
    }
}
