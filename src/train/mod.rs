/*!
The training loop: per-sample gradient descent over a windowed dataset, with early stopping
*/
use crate::report::{EpochReport, Prediction, Reporter};
use crate::rnn::{Gradients, Rnn};
use crate::util::half_squared_error;
use crate::window::Dataset;
use crate::{CpuFloat, Error, Result};
use log::{debug, error, info, warn};
use ndarray::arr2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Which loss early stopping watches
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMetric {
    /// The mean training loss of the epoch
    Training,
    /// The mean validation loss after the epoch, falling back to the training loss without validation data
    Validation,
}

/// Training loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// The maximum number of epochs
    pub epochs: usize,
    /// How many consecutive epochs without improvement end training
    pub patience: usize,
    /// How many samples contribute to each parameter update
    pub batch_size: usize,
    /// The loss early stopping watches
    pub monitor: StopMetric,
    /// Whether to reshuffle the training samples before every epoch
    pub reshuffle: bool,
    /// Seed for the reshuffling generator
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> TrainConfig {
        TrainConfig {
            epochs: 20,
            patience: 2,
            batch_size: 1,
            monitor: StopMetric::Validation,
            reshuffle: false,
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Set the maximum number of epochs
    pub fn with_epochs(mut self, epochs: usize) -> TrainConfig {
        self.epochs = epochs;
        self
    }

    /// Set the early stopping patience
    pub fn with_patience(mut self, patience: usize) -> TrainConfig {
        self.patience = patience;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> TrainConfig {
        self.batch_size = batch_size;
        self
    }

    /// Set the loss watched by early stopping
    pub fn with_monitor(mut self, monitor: StopMetric) -> TrainConfig {
        self.monitor = monitor;
        self
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be positive".to_owned()));
        }
        if self.patience == 0 {
            return Err(Error::InvalidConfig("patience must be positive".to_owned()));
        }
        Ok(())
    }
}

/// Where a training run is
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TrainingState {
    /// No epoch has started yet
    Initializing,
    /// An epoch is in progress
    EpochRunning {
        /// The (zero based) epoch
        epoch: usize,
    },
    /// Training halted early after an epoch because the monitored loss stopped improving
    EarlyStopped {
        /// The (zero based) last epoch run
        epoch: usize,
    },
    /// Every configured epoch ran
    Completed {
        /// The number of epochs run
        epochs: usize,
    },
}

impl TrainingState {
    /// Whether training has halted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrainingState::EarlyStopped { .. } | TrainingState::Completed { .. }
        )
    }
}

/// Counts consecutive epochs which fail to strictly improve on the best loss seen
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyStopping {
    patience: usize,
    best: CpuFloat,
    strikes: usize,
}

impl EarlyStopping {
    /// Stop after `patience` consecutive epochs without improvement
    pub fn new(patience: usize) -> EarlyStopping {
        EarlyStopping {
            patience,
            best: CpuFloat::INFINITY,
            strikes: 0,
        }
    }

    /// Record an epoch's loss, returning whether to stop
    pub fn observe(&mut self, loss: CpuFloat) -> bool {
        if loss < self.best {
            self.best = loss;
            self.strikes = 0;
        } else {
            self.strikes += 1;
        }
        self.strikes >= self.patience
    }

    /// The best loss seen so far
    pub fn best(&self) -> CpuFloat {
        self.best
    }

    /// The number of consecutive epochs without improvement
    pub fn strikes(&self) -> usize {
        self.strikes
    }
}

/// The outcome of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRun {
    /// The state training halted in
    pub final_state: TrainingState,
    /// The losses of every epoch run
    pub epochs: Vec<EpochReport>,
    /// A prediction for every validation sample, made after training halted
    pub predictions: Vec<Prediction>,
    /// The mean half squared error of `predictions`, if there are any
    pub validation_loss: Option<CpuFloat>,
}

/// Drives training of a network over a dataset
#[derive(Debug)]
pub struct Trainer {
    config: TrainConfig,
    state: TrainingState,
    rng: StdRng,
}

impl Trainer {
    /// Create a trainer
    pub fn new(config: TrainConfig) -> Result<Trainer> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Trainer {
            config,
            state: TrainingState::Initializing,
            rng,
        })
    }

    /// This trainer's configuration
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Where training is
    pub fn state(&self) -> TrainingState {
        self.state
    }

    fn check_shapes(rnn: &Rnn, dataset: &Dataset) -> Result<()> {
        let config = rnn.config();
        if config.output_size != 1 {
            return Err(Error::DimensionMismatch {
                what: "network outputs",
                expected: 1,
                found: config.output_size,
            });
        }
        if !dataset.is_empty() && dataset.features() != config.input_size {
            return Err(Error::DimensionMismatch {
                what: "sample features",
                expected: config.input_size,
                found: dataset.features(),
            });
        }
        Ok(())
    }

    /// Train until early stopping fires or the epochs run out, reporting after every epoch
    pub fn fit<P: Reporter + ?Sized>(
        &mut self,
        rnn: &mut Rnn,
        train: &mut Dataset,
        validation: &Dataset,
        reporter: &mut P,
    ) -> Result<Vec<EpochReport>> {
        Self::check_shapes(rnn, train)?;
        Self::check_shapes(rnn, validation)?;
        if train.is_empty() {
            return Err(Error::InsufficientData {
                len: 0,
                window_size: train.window_size(),
            });
        }

        self.state = TrainingState::Initializing;
        let mut stopping = EarlyStopping::new(self.config.patience);
        let mut reports = Vec::with_capacity(self.config.epochs);
        info!(
            "Training on {} samples, validating on {}, for up to {} epochs",
            train.len(),
            validation.len(),
            self.config.epochs
        );

        for epoch in 0..self.config.epochs {
            self.state = TrainingState::EpochRunning { epoch };
            if self.config.reshuffle {
                train.shuffle(&mut self.rng);
            }
            let training_loss = self.train_epoch(epoch, rnn, train)?;
            let validation_loss = if validation.is_empty() {
                None
            } else {
                let loss = evaluate(rnn, validation)?;
                if !loss.is_finite() {
                    error!("Validation loss diverged in epoch {}", epoch);
                    return Err(Error::NumericalDivergence {
                        epoch: Some(epoch),
                        sample: Some(validation.len()),
                        quantity: "validation loss",
                    });
                }
                Some(loss)
            };
            let report = EpochReport {
                epoch,
                training_loss,
                validation_loss,
            };
            reporter.epoch(&report);
            reports.push(report);

            let monitored = match (self.config.monitor, validation_loss) {
                (StopMetric::Validation, Some(loss)) => loss,
                _ => training_loss,
            };
            if stopping.observe(monitored) {
                warn!(
                    "Stopping early after epoch {}: no improvement on {:.6} for {} epochs",
                    epoch,
                    stopping.best(),
                    stopping.strikes()
                );
                self.state = TrainingState::EarlyStopped { epoch };
                return Ok(reports);
            }
        }

        self.state = TrainingState::Completed {
            epochs: self.config.epochs,
        };
        info!("Training complete after {} epochs", self.config.epochs);
        Ok(reports)
    }

    /// Run one epoch, returning the mean half squared error over the training samples
    fn train_epoch(&mut self, epoch: usize, rnn: &mut Rnn, train: &Dataset) -> Result<CpuFloat> {
        let mut total_loss = 0.0;
        let mut batch: Option<Gradients> = None;
        let mut batched = 0;
        for (i, sample) in train.iter().enumerate() {
            let (output, trace) = rnn.forward_pass(sample.inputs.view())?;
            let predicted = output[[0, 0]];
            total_loss += half_squared_error(predicted, sample.label);
            if !total_loss.is_finite() {
                error!("Training loss diverged in epoch {} at sample {}", epoch, i);
                return Err(Error::NumericalDivergence {
                    epoch: Some(epoch),
                    sample: Some(i),
                    quantity: "training loss",
                });
            }

            let grads = rnn.compute_gradients(&arr2(&[[predicted - sample.label]]), trace)?;
            if !grads.is_finite() {
                error!("Gradients diverged in epoch {} at sample {}", epoch, i);
                return Err(Error::NumericalDivergence {
                    epoch: Some(epoch),
                    sample: Some(i),
                    quantity: "gradient",
                });
            }
            match batch.as_mut() {
                Some(sum) => sum.accumulate(&grads),
                None => batch = Some(grads),
            }
            batched += 1;

            if batched == self.config.batch_size || i + 1 == train.len() {
                if let Some(mut grads) = batch.take() {
                    if batched > 1 {
                        grads.scale(1.0 / batched as CpuFloat);
                    }
                    debug!(
                        "Epoch {} sample {}: updating from {} samples, largest gradient {:.4}",
                        epoch,
                        i,
                        batched,
                        grads.max_abs()
                    );
                    rnn.apply_gradients(grads)?;
                }
                batched = 0;
            }
        }
        Ok(total_loss / train.len() as CpuFloat)
    }

    /// Train, then predict every validation sample and report the predictions
    pub fn run<P: Reporter + ?Sized>(
        &mut self,
        rnn: &mut Rnn,
        train: &mut Dataset,
        validation: &Dataset,
        reporter: &mut P,
    ) -> Result<TrainingRun> {
        let epochs = self.fit(rnn, train, validation, reporter)?;
        let predictions = validate(rnn, validation)?;
        reporter.validation(&predictions);
        let validation_loss = mean_loss(&predictions);
        Ok(TrainingRun {
            final_state: self.state,
            epochs,
            predictions,
            validation_loss,
        })
    }
}

/// The mean half squared error of a set of predictions, if there are any
pub fn mean_loss(predictions: &[Prediction]) -> Option<CpuFloat> {
    if predictions.is_empty() {
        return None;
    }
    let total: CpuFloat = predictions
        .iter()
        .map(|p| half_squared_error(p.predicted, p.actual))
        .sum();
    Some(total / predictions.len() as CpuFloat)
}

/// Predict every sample of a dataset without updating the network
pub fn validate(rnn: &Rnn, dataset: &Dataset) -> Result<Vec<Prediction>> {
    dataset
        .iter()
        .map(|sample| {
            let output = rnn.predict(sample.inputs.view())?;
            Ok(Prediction {
                predicted: output[[0, 0]],
                actual: sample.label,
            })
        })
        .collect()
}

/// The mean half squared error of a network over a dataset, without updating the network
pub fn evaluate(rnn: &Rnn, dataset: &Dataset) -> Result<CpuFloat> {
    if dataset.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for sample in dataset {
        let output = rnn.predict(sample.inputs.view())?;
        total += half_squared_error(output[[0, 0]], sample.label);
    }
    Ok(total / dataset.len() as CpuFloat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::History;
    use crate::rnn::RnnConfig;
    use crate::window::make_scalar_windows;

    fn network(config: RnnConfig) -> Rnn {
        Rnn::new(config, &mut StdRng::seed_from_u64(42)).unwrap()
    }

    fn wave(len: usize) -> Vec<f64> {
        (0..len).map(|i| (i as f64 * 0.3).sin()).collect()
    }

    #[test]
    fn early_stopping_counts_consecutive_non_improvements() {
        let mut stopping = EarlyStopping::new(2);
        assert!(!stopping.observe(5.0));
        assert!(!stopping.observe(4.0));
        assert!(!stopping.observe(4.5));
        assert_eq!(stopping.strikes(), 1);
        assert!(stopping.observe(4.6));
        assert_eq!(stopping.best(), 4.0);
    }

    #[test]
    fn improvement_resets_strikes() {
        let mut stopping = EarlyStopping::new(2);
        let losses = [3.0, 3.5, 2.0, 2.0, 1.0, 1.5, 0.5];
        let stops: Vec<bool> = losses.iter().map(|&l| stopping.observe(l)).collect();
        assert_eq!(stops, vec![false, false, false, false, false, false, false]);
        assert_eq!(stopping.strikes(), 0);
        assert!(!stopping.observe(0.5));
        assert!(stopping.observe(0.5));
    }

    #[test]
    fn states_progress_to_completion() {
        let mut rnn = network(RnnConfig::new(1, 8, 1));
        let (mut train, validation) = make_scalar_windows(&wave(60), 5)
            .unwrap()
            .split_ratio(0.8)
            .unwrap();
        let mut trainer = Trainer::new(TrainConfig::default().with_epochs(3).with_patience(10)).unwrap();
        assert_eq!(trainer.state(), TrainingState::Initializing);
        let mut history = History::default();
        let run = trainer
            .run(&mut rnn, &mut train, &validation, &mut history)
            .unwrap();
        assert_eq!(run.final_state, TrainingState::Completed { epochs: 3 });
        assert!(run.final_state.is_terminal());
        assert_eq!(run.epochs.len(), 3);
        assert_eq!(history.epochs, run.epochs);
        assert_eq!(run.predictions.len(), validation.len());
        assert_eq!(history.predictions, run.predictions);
        assert!(run.epochs.iter().all(|e| e.validation_loss.is_some()));
        let final_loss = run.validation_loss.unwrap();
        let expected = evaluate(&rnn, &validation).unwrap();
        assert!((final_loss - expected).abs() < 1e-12);
        assert_eq!(mean_loss(&[]), None);
    }

    #[test]
    fn early_stop_halts_before_next_epoch() {
        // a learning rate this small leaves the loss flat, so every epoch after the first is a strike
        let mut rnn = network(RnnConfig::new(1, 4, 1).with_learning_rate(1e-300));
        let mut train = make_scalar_windows(&wave(30), 4).unwrap();
        let none = make_scalar_windows(&wave(30), 4).unwrap().split_at(0).0;
        let mut trainer = Trainer::new(
            TrainConfig::default()
                .with_epochs(10)
                .with_patience(2)
                .with_monitor(StopMetric::Training),
        )
        .unwrap();
        let reports = trainer.fit(&mut rnn, &mut train, &none, &mut ()).unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(trainer.state(), TrainingState::EarlyStopped { epoch: 2 });
    }

    #[test]
    fn validation_does_not_update_parameters() {
        let rnn = network(RnnConfig::new(1, 4, 1));
        let data = make_scalar_windows(&wave(20), 3).unwrap();
        let before = rnn.parameters().clone();
        let predictions = validate(&rnn, &data).unwrap();
        assert_eq!(predictions.len(), data.len());
        assert_eq!(&before, rnn.parameters());
        for (prediction, sample) in predictions.iter().zip(data.iter()) {
            assert_eq!(prediction.actual, sample.label);
        }
    }

    #[test]
    fn non_finite_loss_is_fatal() {
        let mut series = wave(30);
        series[12] = f64::NAN;
        let mut train = make_scalar_windows(&series, 4).unwrap();
        let (_, validation) = make_scalar_windows(&wave(30), 4).unwrap().split_at(26);
        let mut rnn = network(RnnConfig::new(1, 4, 1));
        let mut trainer = Trainer::new(TrainConfig::default()).unwrap();
        let err = trainer
            .fit(&mut rnn, &mut train, &validation, &mut ())
            .unwrap_err();
        assert!(err.is_divergence());
        match err {
            Error::NumericalDivergence { epoch, sample, .. } => {
                assert_eq!(epoch, Some(0));
                assert_eq!(sample, Some(8));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(trainer.state(), TrainingState::EpochRunning { epoch: 0 });
    }

    #[test]
    fn batching_changes_the_trajectory() {
        let data = make_scalar_windows(&wave(40), 5).unwrap();
        let empty = data.clone().split_at(0).0;
        let train_with = |batch_size| {
            let mut rnn = network(RnnConfig::new(1, 6, 1));
            let mut train = data.clone();
            let mut trainer =
                Trainer::new(TrainConfig::default().with_epochs(2).with_batch_size(batch_size).with_patience(5))
                    .unwrap();
            trainer.fit(&mut rnn, &mut train, &empty, &mut ()).unwrap();
            rnn.parameters().clone()
        };
        assert_eq!(train_with(1), train_with(1));
        assert_ne!(train_with(1), train_with(7));
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let data = make_scalar_windows(&wave(20), 3).unwrap();
        let mut trainer = Trainer::new(TrainConfig::default()).unwrap();
        let mut two_outputs = network(RnnConfig::new(1, 4, 2));
        assert!(matches!(
            trainer.fit(&mut two_outputs, &mut data.clone(), &data, &mut ()),
            Err(Error::DimensionMismatch { .. })
        ));
        let mut two_inputs = network(RnnConfig::new(2, 4, 1));
        assert!(matches!(
            trainer.fit(&mut two_inputs, &mut data.clone(), &data, &mut ()),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(Trainer::new(TrainConfig::default().with_batch_size(0)).is_err());
    }
}
