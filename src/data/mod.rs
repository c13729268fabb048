/*!
Data processing and IO functions
*/
use crate::*;
use chrono::NaiveDate;
use itertools::Itertools;
use log::info;
use ndarray::Array2;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod fake;
pub mod fred;
pub mod merge;
pub mod scale;

/// A single dated row of a time series
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<F = CpuFloat> {
    /// This observation's date
    pub t: NaiveDate,
    /// The values of each column on this date
    pub values: Vec<F>,
}

impl<F> Observation<F> {
    /// Create a new observation
    pub fn new(t: NaiveDate, values: Vec<F>) -> Observation<F> {
        Observation { t, values }
    }
}

/// A table of observations with named columns, sorted ascending by date
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    columns: Vec<String>,
    rows: Vec<Observation>,
}

impl TimeSeries {
    /// Create an empty series with the given column names
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> TimeSeries {
        TimeSeries {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a series from rows, checking their width and order
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Observation>,
    ) -> Result<TimeSeries> {
        let mut series = TimeSeries::new(columns);
        for row in rows {
            series.push(row)?;
        }
        Ok(series)
    }

    /// Append a row, which must have one value per column and must not be dated before the last row
    pub fn push(&mut self, row: Observation) -> Result<()> {
        if row.values.len() != self.columns.len() {
            return Err(Error::DimensionMismatch {
                what: "observation width",
                expected: self.columns.len(),
                found: row.values.len(),
            });
        }
        if let Some(last) = self.rows.last() {
            if row.t < last.t {
                return Err(Error::UnsortedSeries {
                    row: self.rows.len(),
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    /// The names of this series' columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The rows of this series, in date order
    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    /// The number of rows in this series
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether this series has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The index of the first column with a given name
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| Error::MissingColumn(name.to_owned()))
    }

    /// The values of a single column, in date order
    pub fn column(&self, index: usize) -> impl Iterator<Item = CpuFloat> + '_ {
        self.rows.iter().map(move |row| row.values[index])
    }

    /// Extract the given columns, in the given order, as a (rows x columns) matrix
    pub fn matrix(&self, columns: &[usize]) -> Result<Array2<CpuFloat>> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.columns.len()) {
            return Err(Error::DimensionMismatch {
                what: "column index",
                expected: self.columns.len(),
                found: bad,
            });
        }
        Ok(Array2::from_shape_fn(
            (self.rows.len(), columns.len()),
            |(i, j)| self.rows[i].values[columns[j]],
        ))
    }

    /// The index of the first row dated before its predecessor, if any
    pub fn first_unsorted(&self) -> Option<usize> {
        self.rows
            .iter()
            .tuple_windows()
            .position(|(prev, next)| next.t < prev.t)
            .map(|i| i + 1)
    }
}

/// A source of cleaned, date-aligned time series data
pub trait SeriesProvider {
    /// Fetch the series. Rows must be sorted ascending by date and must not contain missing values.
    fn fetch_series(&mut self) -> Result<TimeSeries>;
}

impl SeriesProvider for TimeSeries {
    fn fetch_series(&mut self) -> Result<TimeSeries> {
        Ok(self.clone())
    }
}

/// Provides a series read from a primary CSV file, joined with auxiliary CSV files by most recent prior date
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CsvProvider {
    /// The file containing the primary series
    pub primary: PathBuf,
    /// Files containing auxiliary series, joined in order
    pub auxiliary: Vec<PathBuf>,
    /// The date format used by every file
    pub date_format: String,
}

impl CsvProvider {
    /// Create a provider for a primary file, with no auxiliary files, in FRED date format
    pub fn new<P: Into<PathBuf>>(primary: P) -> CsvProvider {
        CsvProvider {
            primary: primary.into(),
            auxiliary: Vec::new(),
            date_format: fred::FRED_DATE.to_owned(),
        }
    }

    /// Add an auxiliary file
    pub fn with_auxiliary<P: Into<PathBuf>>(mut self, path: P) -> CsvProvider {
        self.auxiliary.push(path.into());
        self
    }

    fn read(&self, path: &Path) -> Result<TimeSeries> {
        let series = fred::read_series(File::open(path)?, &self.date_format)?;
        info!(
            "Read {} rows of {:?} from {}",
            series.len(),
            series.columns(),
            path.display()
        );
        Ok(series)
    }
}

impl SeriesProvider for CsvProvider {
    fn fetch_series(&mut self) -> Result<TimeSeries> {
        let mut merged = self.read(&self.primary)?;
        for path in &self.auxiliary {
            let auxiliary = self.read(path)?;
            merged = merge::merge_asof(&merged, &auxiliary)?;
        }
        if merged.is_empty() {
            return Err(Error::EmptySeries);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    #[test]
    fn push_checks_width_and_order() {
        let mut series = TimeSeries::new(vec!["a", "b"]);
        series.push(Observation::new(date(2), vec![1.0, 2.0])).unwrap();
        series.push(Observation::new(date(2), vec![1.5, 2.5])).unwrap();
        assert!(matches!(
            series.push(Observation::new(date(3), vec![1.0])),
            Err(Error::DimensionMismatch { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            series.push(Observation::new(date(1), vec![1.0, 2.0])),
            Err(Error::UnsortedSeries { row: 2 })
        ));
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_unsorted(), None);
    }

    #[test]
    fn matrix_selects_columns() {
        let series = TimeSeries::from_rows(
            vec!["vix", "dgs10", "unrate"],
            vec![
                Observation::new(date(1), vec![20.0, 1.5, 3.5]),
                Observation::new(date(2), vec![21.0, 1.6, 3.5]),
            ],
        )
        .unwrap();
        let m = series.matrix(&[2, 0]).unwrap();
        assert_eq!(m.shape(), &[2, 2]);
        assert_eq!(m[[1, 0]], 3.5);
        assert_eq!(m[[1, 1]], 21.0);
        assert_eq!(series.column_index("dgs10").unwrap(), 1);
        assert!(matches!(
            series.column_index("gdp"),
            Err(Error::MissingColumn(_))
        ));
        assert!(series.matrix(&[3]).is_err());
        assert_eq!(series.column(0).collect::<Vec<_>>(), vec![20.0, 21.0]);
    }
}
