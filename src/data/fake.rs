/*!
Generate fake series data, for testing purposes
*/
use super::{Observation, TimeSeries};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

/// Generate series data using a value generator and a date generator
#[derive(Debug, Clone)]
pub struct SeriesGen<D: Iterator<Item = NaiveDate>, V: ValueGen> {
    /// The date generator in use
    pub date_generator: D,
    /// The value generator in use
    pub value_generator: V,
    /// The date of the last generated observation
    pub last: Option<NaiveDate>,
}

impl<D: Iterator<Item = NaiveDate>, V: ValueGen> SeriesGen<D, V> {
    /// Create a new generator
    pub fn new(dates: D, values: V) -> SeriesGen<D, V> {
        SeriesGen {
            date_generator: dates,
            value_generator: values,
            last: None,
        }
    }
}

impl<D: Iterator<Item = NaiveDate>, V: ValueGen> Iterator for SeriesGen<D, V> {
    type Item = Observation;
    fn next(&mut self) -> Option<Observation> {
        let t = self.date_generator.next()?;
        let after = self.last.map(|last| t - last).unwrap_or_else(Duration::zero);
        self.last = Some(t);
        let value = self.value_generator.value_after(after);
        Some(Observation::new(t, vec![value]))
    }
}

/// A trait implemented by value generators
pub trait ValueGen {
    /// Generate a value, jumping forward a given duration
    fn value_after(&mut self, after: Duration) -> f64;
}

/// A sine wave in calendar time
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SineWave {
    /// The value the wave oscillates around
    pub offset: f64,
    /// The wave's amplitude
    pub amplitude: f64,
    /// The wave's period, in days
    pub period: f64,
    /// Days elapsed since the start of the wave
    pub elapsed: f64,
}

impl SineWave {
    /// A wave around zero with unit amplitude
    pub fn unit(period: f64) -> SineWave {
        SineWave {
            offset: 0.0,
            amplitude: 1.0,
            period,
            elapsed: 0.0,
        }
    }
}

impl ValueGen for SineWave {
    fn value_after(&mut self, after: Duration) -> f64 {
        self.elapsed += after.num_days() as f64;
        self.offset + self.amplitude * (2.0 * PI * self.elapsed / self.period).sin()
    }
}

/// Generate fake values using a time-weighted random walk, floored at a minimum value
#[derive(Debug, Copy, Clone)]
pub struct RandomWalk<R> {
    /// The RNG used by this random walk
    pub rng: R,
    /// The current value
    pub value: f64,
    /// The distribution of one day's change
    pub step: Normal<f64>,
    /// The lowest value the walk may take
    pub floor: f64,
}

impl<R: Rng> ValueGen for RandomWalk<R> {
    fn value_after(&mut self, after: Duration) -> f64 {
        let days = after.num_days() as f64;
        let change = self.step.sample(&mut self.rng) * days.sqrt();
        self.value = (self.value + change).max(self.floor);
        self.value
    }
}

/// Days on which US markets may trade: every day except Saturday and Sunday
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Weekdays(pub NaiveDate);

impl Iterator for Weekdays {
    type Item = NaiveDate;
    fn next(&mut self) -> Option<NaiveDate> {
        while matches!(self.0.weekday(), Weekday::Sat | Weekday::Sun) {
            self.0 = self.0.succ_opt()?;
        }
        let today = self.0;
        self.0 = today.succ_opt()?;
        Some(today)
    }
}

/// Every day from a given date on
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Days(pub NaiveDate);

impl Iterator for Days {
    type Item = NaiveDate;
    fn next(&mut self) -> Option<NaiveDate> {
        let today = self.0;
        self.0 = today.succ_opt()?;
        Some(today)
    }
}

/// A daily unit sine wave of a given length and period, in a single column named `sine`
pub fn sine_series(start: NaiveDate, len: usize, period: f64) -> TimeSeries {
    let rows = SeriesGen::new(Days(start), SineWave::unit(period)).take(len);
    TimeSeries::from_rows(vec!["sine"], rows).expect("Generated dates are sorted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 10, 9).unwrap()
    }

    #[test]
    fn weekdays_skip_weekends() {
        let days: Vec<_> = Weekdays(start()).take(3).collect();
        assert_eq!(
            days,
            vec![
                start(),
                NaiveDate::from_ymd_opt(2020, 10, 12).unwrap(),
                NaiveDate::from_ymd_opt(2020, 10, 13).unwrap(),
            ]
        );
    }

    #[test]
    fn sine_wave_has_expected_shape() {
        let series = sine_series(start(), 9, 4.0);
        let values: Vec<_> = series.column(0).collect();
        assert_eq!(values.len(), 9);
        assert!(values[0].abs() < 1e-12);
        assert!((values[1] - 1.0).abs() < 1e-12);
        assert!((values[3] + 1.0).abs() < 1e-12);
        assert!((values[5] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn random_walk_respects_floor() {
        let walk = RandomWalk {
            rng: StdRng::seed_from_u64(7),
            value: 15.0,
            step: Normal::new(0.0, 5.0).unwrap(),
            floor: 9.0,
        };
        let series: Vec<_> = SeriesGen::new(Weekdays(start()), walk).take(500).collect();
        assert_eq!(series.len(), 500);
        assert!(series.iter().all(|obs| obs.values[0] >= 9.0));
    }
}
