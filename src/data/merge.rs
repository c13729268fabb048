/*!
Joining series observed on different calendars
*/
use super::{Observation, TimeSeries};
use crate::{Error, Result};
use log::debug;

/// Join `right` onto `left` by date, taking for every row of `left` the most recent row of `right` dated at or
/// before it.
///
/// The result has the columns of `left` followed by those of `right`. Rows of `left` dated before the first row of
/// `right` have nothing to join and are dropped. Both inputs must be sorted.
pub fn merge_asof(left: &TimeSeries, right: &TimeSeries) -> Result<TimeSeries> {
    for series in &[left, right] {
        if let Some(row) = series.first_unsorted() {
            return Err(Error::UnsortedSeries { row });
        }
    }
    let columns = left.columns().iter().chain(right.columns()).cloned();
    let mut merged = TimeSeries::new(columns);
    let mut right_rows = right.rows().iter().peekable();
    let mut current: Option<&Observation> = None;
    let mut dropped = 0;
    for row in left.rows() {
        while let Some(next) = right_rows.peek() {
            if next.t > row.t {
                break;
            }
            current = right_rows.next();
        }
        match current {
            Some(matched) => {
                let mut values = row.values.clone();
                values.extend_from_slice(&matched.values);
                merged.push(Observation::new(row.t, values))?;
            }
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("Dropped {} rows with no prior observation to join", dropped);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, d).unwrap()
    }

    #[test]
    fn backward_join() {
        let vix = TimeSeries::from_rows(
            vec!["vix"],
            vec![
                Observation::new(date(1, 2), vec![12.5]),
                Observation::new(date(1, 3), vec![14.0]),
                Observation::new(date(2, 3), vec![17.9]),
                Observation::new(date(3, 2), vec![33.4]),
            ],
        )
        .unwrap();
        let unemployment = TimeSeries::from_rows(
            vec!["unrate"],
            vec![
                Observation::new(date(1, 3), vec![3.6]),
                Observation::new(date(2, 1), vec![3.5]),
                Observation::new(date(3, 1), vec![4.4]),
            ],
        )
        .unwrap();
        let merged = merge_asof(&vix, &unemployment).unwrap();
        assert_eq!(merged.columns(), &["vix".to_owned(), "unrate".to_owned()]);
        let rows: Vec<_> = merged.rows().iter().map(|r| (r.t, r.values.clone())).collect();
        assert_eq!(
            rows,
            vec![
                (date(1, 3), vec![14.0, 3.6]),
                (date(2, 3), vec![17.9, 3.5]),
                (date(3, 2), vec![33.4, 4.4]),
            ]
        );
    }
}
