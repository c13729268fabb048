/*!
Reporting training progress and validation results
*/
use crate::{CpuFloat, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Losses at the end of one epoch
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// The (zero based) epoch
    pub epoch: usize,
    /// The mean half squared error over the training samples
    pub training_loss: CpuFloat,
    /// The mean half squared error over the validation samples, if there are any
    pub validation_loss: Option<CpuFloat>,
}

/// A prediction for a held-out sample, next to the value actually observed
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction<F = CpuFloat> {
    /// The predicted value
    pub predicted: F,
    /// The observed value
    pub actual: F,
}

/// A sink for training metrics
pub trait Reporter {
    /// Called once at the end of every epoch
    fn epoch(&mut self, report: &EpochReport);
    /// Called once after training halts, with a prediction for every validation sample
    fn validation(&mut self, _predictions: &[Prediction]) {}
}

impl Reporter for () {
    fn epoch(&mut self, _report: &EpochReport) {}
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn epoch(&mut self, report: &EpochReport) {
        (**self).epoch(report)
    }
    fn validation(&mut self, predictions: &[Prediction]) {
        (**self).validation(predictions)
    }
}

/// Reports through the `log` facade
#[derive(Debug, Copy, Clone, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn epoch(&mut self, report: &EpochReport) {
        match report.validation_loss {
            Some(validation_loss) => info!(
                "Epoch {}: training loss = {:.6}, validation loss = {:.6}",
                report.epoch, report.training_loss, validation_loss
            ),
            None => info!(
                "Epoch {}: training loss = {:.6}",
                report.epoch, report.training_loss
            ),
        }
    }
    fn validation(&mut self, predictions: &[Prediction]) {
        info!(
            "Validated {} samples: mean absolute error = {:.6}",
            predictions.len(),
            mean_absolute_error(predictions)
        );
    }
}

/// Keeps every report in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    /// Every epoch reported so far
    pub epochs: Vec<EpochReport>,
    /// The latest validation predictions
    pub predictions: Vec<Prediction>,
}

impl Reporter for History {
    fn epoch(&mut self, report: &EpochReport) {
        self.epochs.push(*report)
    }
    fn validation(&mut self, predictions: &[Prediction]) {
        self.predictions = predictions.to_vec()
    }
}

/// The mean absolute difference between predicted and actual values, or zero if there are no predictions
pub fn mean_absolute_error(predictions: &[Prediction]) -> CpuFloat {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .map(|p| (p.predicted - p.actual).abs())
        .sum::<CpuFloat>()
        / predictions.len() as CpuFloat
}

/// Write predictions as CSV to a Writer, for plotting.
/// On success, return how many predictions were written
pub fn write_predictions<W: Write>(wtr: W, predictions: &[Prediction]) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(wtr);
    for prediction in predictions {
        wtr.serialize(prediction)?;
    }
    wtr.flush()?;
    Ok(predictions.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictions_csv() {
        let predictions = [
            Prediction {
                predicted: 15.5,
                actual: 16.0,
            },
            Prediction {
                predicted: 20.0,
                actual: 19.0,
            },
        ];
        let mut out = Vec::new();
        assert_eq!(write_predictions(&mut out, &predictions).unwrap(), 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "predicted,actual\n15.5,16.0\n20.0,19.0\n"
        );
        assert_eq!(mean_absolute_error(&predictions), 0.75);
        assert_eq!(mean_absolute_error(&[]), 0.0);
    }

    #[test]
    fn history_collects() {
        let mut history = History::default();
        {
            let reporter: &mut dyn Reporter = &mut history;
            reporter.epoch(&EpochReport {
                epoch: 0,
                training_loss: 1.0,
                validation_loss: None,
            });
            reporter.validation(&[Prediction {
                predicted: 1.0,
                actual: 2.0,
            }]);
        }
        assert_eq!(history.epochs.len(), 1);
        assert_eq!(history.predictions.len(), 1);
    }
}
