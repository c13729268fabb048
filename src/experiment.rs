/*!
An end-to-end experiment: fetch a series, scale it, window it, train a network on it and validate the result
*/
use crate::data::scale::StandardScaler;
use crate::data::SeriesProvider;
use crate::report::{EpochReport, Prediction, Reporter};
use crate::rnn::{Rnn, RnnConfig};
use crate::train::{mean_loss, validate, TrainConfig, Trainer, TrainingState};
use crate::window::make_windows;
use crate::{CpuFloat, Error, Result};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// The FRED name of the daily VIX close
pub const VIX_COLUMN: &str = "VIXCLS";

/// Everything needed to run an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// The number of rows in each input window
    pub window_size: usize,
    /// The column to predict. It is always the first input feature.
    pub target: String,
    /// Further input columns. `None` uses every column of the series.
    pub features: Option<Vec<String>>,
    /// Whether to standardize every column before windowing
    pub scale: bool,
    /// Whether to shuffle the samples before splitting them
    pub shuffle: bool,
    /// The fraction of samples used for training, the rest being held out for validation
    pub train_ratio: f64,
    /// Seeds shuffling, weight initialization and per-epoch reshuffles
    pub seed: u64,
    /// The network. Its input size is overwritten with the number of features.
    pub rnn: RnnConfig,
    /// The training loop. Its seed is overwritten with `seed`.
    pub train: TrainConfig,
}

impl Default for ExperimentConfig {
    fn default() -> ExperimentConfig {
        ExperimentConfig {
            window_size: 20,
            target: VIX_COLUMN.to_owned(),
            features: None,
            scale: true,
            shuffle: true,
            train_ratio: 0.8,
            seed: 42,
            rnn: RnnConfig::default(),
            train: TrainConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Set the window size
    pub fn with_window_size(mut self, window_size: usize) -> ExperimentConfig {
        self.window_size = window_size;
        self
    }

    /// Set the target column
    pub fn with_target<S: Into<String>>(mut self, target: S) -> ExperimentConfig {
        self.target = target.into();
        self
    }

    /// Restrict the extra input columns
    pub fn with_features<S: Into<String>>(
        mut self,
        features: impl IntoIterator<Item = S>,
    ) -> ExperimentConfig {
        self.features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable scaling
    pub fn with_scale(mut self, scale: bool) -> ExperimentConfig {
        self.scale = scale;
        self
    }

    /// Enable or disable shuffling before the split
    pub fn with_shuffle(mut self, shuffle: bool) -> ExperimentConfig {
        self.shuffle = shuffle;
        self
    }

    /// Set the training ratio
    pub fn with_train_ratio(mut self, train_ratio: f64) -> ExperimentConfig {
        self.train_ratio = train_ratio;
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> ExperimentConfig {
        self.seed = seed;
        self
    }

    /// Set the network configuration
    pub fn with_rnn(mut self, rnn: RnnConfig) -> ExperimentConfig {
        self.rnn = rnn;
        self
    }

    /// Set the training configuration
    pub fn with_train(mut self, train: TrainConfig) -> ExperimentConfig {
        self.train = train;
        self
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window size must be at least 1".to_owned()));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "train ratio must lie in (0, 1], got {}",
                self.train_ratio
            )));
        }
        if self.rnn.output_size != 1 {
            return Err(Error::InvalidConfig(format!(
                "experiments predict a single value, got output size {}",
                self.rnn.output_size
            )));
        }
        // input_size is derived from the series, so validate against a placeholder
        let mut rnn = self.rnn.clone();
        rnn.input_size = rnn.input_size.max(1);
        rnn.validate()?;
        self.train.validate()
    }
}

/// The outcome of an experiment
#[derive(Debug)]
pub struct RunSummary {
    /// The state training halted in
    pub final_state: TrainingState,
    /// The losses of every epoch run, in scaled units
    pub epochs: Vec<EpochReport>,
    /// A prediction for every validation sample, in the target's original units
    pub predictions: Vec<Prediction>,
    /// The mean half squared error over the validation samples in scaled units, if there are any
    pub validation_loss: Option<CpuFloat>,
    /// The input columns, target first
    pub features: Vec<String>,
    /// The scaler fit to the inputs, if scaling was enabled
    pub scaler: Option<StandardScaler>,
    /// The trained network
    pub network: Rnn,
}

/// A configured experiment
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    /// Create an experiment, validating its configuration
    pub fn new(config: ExperimentConfig) -> Result<Experiment> {
        config.validate()?;
        Ok(Experiment { config })
    }

    /// This experiment's configuration
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run the experiment on the series fetched from `provider`, reporting to `reporter`.
    ///
    /// Predictions passed to `reporter` are in the target's original units.
    pub fn run<S, P>(&self, provider: &mut S, reporter: &mut P) -> Result<RunSummary>
    where
        S: SeriesProvider + ?Sized,
        P: Reporter + ?Sized,
    {
        let config = &self.config;
        let series = provider.fetch_series()?;
        if series.is_empty() {
            return Err(Error::EmptySeries);
        }
        if let Some(row) = series.first_unsorted() {
            return Err(Error::UnsortedSeries { row });
        }

        let target = series.column_index(&config.target)?;
        let mut columns = vec![target];
        match &config.features {
            Some(names) => {
                for name in names {
                    let column = series.column_index(name)?;
                    if !columns.contains(&column) {
                        columns.push(column)
                    }
                }
            }
            None => columns.extend((0..series.columns().len()).filter(|&c| c != target)),
        }
        let features: Vec<String> = columns
            .iter()
            .map(|&c| series.columns()[c].clone())
            .collect();
        info!(
            "Predicting {} from {} rows of {:?}",
            config.target,
            series.len(),
            features
        );

        let mut data = series.matrix(&columns)?;
        let scaler = if config.scale {
            let scaler = StandardScaler::fit(data.view())?;
            data = scaler.transform(data.view())?;
            Some(scaler)
        } else {
            None
        };

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut dataset = make_windows(data.view(), config.window_size, 0)?;
        if config.shuffle {
            dataset.shuffle(&mut rng);
        }
        let (mut train, validation) = dataset.split_ratio(config.train_ratio)?;
        info!(
            "Split {} samples into {} for training and {} for validation",
            train.len() + validation.len(),
            train.len(),
            validation.len()
        );

        let mut rnn_config = config.rnn.clone();
        rnn_config.input_size = features.len();
        let mut network = Rnn::new(rnn_config, &mut rng)?;

        let mut train_config = config.train.clone();
        train_config.seed = config.seed;
        let mut trainer = Trainer::new(train_config)?;
        let epochs = trainer.fit(&mut network, &mut train, &validation, reporter)?;
        let scaled = validate(&network, &validation)?;
        let validation_loss = mean_loss(&scaled);
        let predictions: Vec<Prediction> = match &scaler {
            Some(scaler) => scaled
                .into_iter()
                .map(|p| Prediction {
                    predicted: scaler.unscale(0, p.predicted),
                    actual: scaler.unscale(0, p.actual),
                })
                .collect(),
            None => scaled,
        };
        reporter.validation(&predictions);

        Ok(RunSummary {
            final_state: trainer.state(),
            epochs,
            predictions,
            validation_loss,
            features,
            scaler,
            network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Observation, TimeSeries};
    use crate::report::History;
    use chrono::NaiveDate;

    fn two_column_series(len: usize) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let rows = (0..len).map(|i| {
            let x = i as f64 * 0.25;
            Observation::new(
                start + chrono::Duration::days(i as i64),
                vec![4.0, 20.0 + 5.0 * x.sin()],
            )
        });
        TimeSeries::from_rows(vec!["DGS10", VIX_COLUMN], rows).unwrap()
    }

    fn small_config() -> ExperimentConfig {
        ExperimentConfig::default()
            .with_window_size(5)
            .with_rnn(RnnConfig::default().with_learning_rate(0.01))
            .with_train(TrainConfig::default().with_epochs(2).with_patience(5))
    }

    #[test]
    fn target_comes_first_and_predictions_are_unscaled() {
        let mut series = two_column_series(60);
        let mut config = small_config();
        config.rnn.hidden_size = 8;
        let mut history = History::default();
        let summary = Experiment::new(config)
            .unwrap()
            .run(&mut series, &mut history)
            .unwrap();
        assert_eq!(summary.features, vec![VIX_COLUMN, "DGS10"]);
        assert_eq!(summary.network.config().input_size, 2);
        assert_eq!(summary.epochs.len(), 2);
        assert_eq!(summary.final_state, TrainingState::Completed { epochs: 2 });
        assert_eq!(summary.predictions.len(), 11);
        assert_eq!(history.predictions, summary.predictions);
        for prediction in &summary.predictions {
            assert!(prediction.actual >= 15.0 - 1e-9 && prediction.actual <= 25.0 + 1e-9);
        }
        let scaler = summary.scaler.unwrap();
        assert_eq!(scaler.std[1], 0.0);
        let unscaled_loss = mean_loss(&summary.predictions).unwrap();
        let scaled_loss = summary.validation_loss.unwrap();
        assert!((unscaled_loss - scaled_loss * scaler.std[0] * scaler.std[0]).abs() < 1e-9);
    }

    #[test]
    fn explicit_features_select_columns() {
        let mut series = two_column_series(40);
        let config = small_config().with_features(Vec::<String>::new()).with_scale(false);
        let summary = Experiment::new(config)
            .unwrap()
            .run(&mut series, &mut ())
            .unwrap();
        assert_eq!(summary.features, vec![VIX_COLUMN]);
        assert!(summary.scaler.is_none());
        assert_eq!(summary.validation_loss, mean_loss(&summary.predictions));

        let missing = small_config().with_features(vec!["UNRATE"]);
        assert!(matches!(
            Experiment::new(missing).unwrap().run(&mut series, &mut ()),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn experiment_seed_drives_reshuffles() {
        let run = |train_seed| {
            let mut config = small_config().with_seed(7);
            config.rnn.hidden_size = 6;
            config.train.reshuffle = true;
            config.train.seed = train_seed;
            let mut series = two_column_series(40);
            Experiment::new(config)
                .unwrap()
                .run(&mut series, &mut ())
                .unwrap()
        };
        let a = run(1);
        let b = run(99);
        assert_eq!(a.network.parameters(), b.network.parameters());
        assert_eq!(a.epochs, b.epochs);
    }

    #[test]
    fn bad_configs_are_rejected() {
        assert!(Experiment::new(ExperimentConfig::default()).is_ok());
        assert!(Experiment::new(ExperimentConfig::default().with_window_size(0)).is_err());
        assert!(Experiment::new(ExperimentConfig::default().with_train_ratio(0.0)).is_err());
        let mut two_outputs = ExperimentConfig::default();
        two_outputs.rnn.output_size = 2;
        assert!(Experiment::new(two_outputs).is_err());
    }

    #[test]
    fn short_series_is_insufficient() {
        let mut series = two_column_series(5);
        let result = Experiment::new(small_config())
            .unwrap()
            .run(&mut series, &mut ());
        assert!(matches!(result, Err(Error::InsufficientData { len: 5, window_size: 5 })));
    }
}
