/*!
Train a recurrent network to predict the VIX from FRED CSV exports
*/
use anyhow::format_err;
use clap::{App, Arg, ArgMatches};
use indicatif::{ProgressBar, ProgressStyle};
use io_enum::*;
use log::info;
use std::fs::File;
use std::io::{stdout, Stdout};
use std::str::FromStr;
use vixburn::data::CsvProvider;
use vixburn::experiment::{Experiment, ExperimentConfig};
use vixburn::report::{mean_absolute_error, write_predictions, EpochReport, Prediction, Reporter};
use vixburn::rnn::Activation;

#[derive(Debug, Write)]
pub enum PredictionSink {
    Stdout(Stdout),
    File(File),
}

/// Shows one progress bar tick per epoch, printing the losses above it
struct ProgressReporter {
    epochs: ProgressBar,
}

impl ProgressReporter {
    fn new(epochs: usize) -> ProgressReporter {
        let epochs = ProgressBar::new(epochs as u64);
        epochs.set_style(
            ProgressStyle::default_bar().template("[{msg:<24}] {wide_bar} {pos:>4}/{len:4}"),
        );
        epochs.set_message("training");
        ProgressReporter { epochs }
    }
}

impl Reporter for ProgressReporter {
    fn epoch(&mut self, report: &EpochReport) {
        let message = match report.validation_loss {
            Some(validation_loss) => format!(
                "Epoch {}: training loss = {:.6}, validation loss = {:.6}",
                report.epoch, report.training_loss, validation_loss
            ),
            None => format!(
                "Epoch {}: training loss = {:.6}",
                report.epoch, report.training_loss
            ),
        };
        self.epochs.println(message);
        self.epochs
            .set_message(&format!("loss = {:.6}", report.training_loss));
        self.epochs.inc(1);
    }

    fn validation(&mut self, predictions: &[Prediction]) {
        self.epochs.finish_and_clear();
        eprintln!(
            "Validated {} samples: mean absolute error = {:.4}",
            predictions.len(),
            mean_absolute_error(predictions)
        );
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str, default: T) -> anyhow::Result<T> {
    match matches.value_of(name) {
        Some(value) => value
            .parse()
            .map_err(|_| format_err!("Invalid value for --{}: {:?}", name, value)),
        None => Ok(default),
    }
}

fn config_from_args(matches: &ArgMatches) -> anyhow::Result<ExperimentConfig> {
    let mut config = ExperimentConfig::default();
    config.window_size = parse_arg(matches, "window", config.window_size)?;
    config.seed = parse_arg(matches, "seed", config.seed)?;
    config.train_ratio = parse_arg(matches, "train-ratio", config.train_ratio)?;
    config.rnn.hidden_size = parse_arg(matches, "hidden", config.rnn.hidden_size)?;
    config.rnn.learning_rate = parse_arg(matches, "learning-rate", config.rnn.learning_rate)?;
    config.rnn.clip_bound = parse_arg(matches, "clip", config.rnn.clip_bound)?;
    config.rnn.truncation_depth = parse_arg(matches, "truncation", config.rnn.truncation_depth)?;
    config.train.epochs = parse_arg(matches, "epochs", config.train.epochs)?;
    config.train.patience = parse_arg(matches, "patience", config.train.patience)?;
    config.train.batch_size = parse_arg(matches, "batch", config.train.batch_size)?;
    if let Some(activation) = matches.value_of("activation") {
        config.rnn.activation = Activation::from_str(activation)?;
    }
    if let Some(target) = matches.value_of("target") {
        config.target = target.to_owned();
    }
    config.shuffle = !matches.is_present("no-shuffle");
    config.scale = !matches.is_present("no-scale");
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("vixburn")
        .version("0.1")
        .about("Trains a recurrent neural network to predict the VIX from its own history and auxiliary series")
        .arg(
            Arg::with_name("INPUT")
                .help("The primary series, as a FRED CSV export")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("auxiliary")
                .help("Auxiliary series joined by most recent prior date, e.g. DGS10 or UNRATE")
                .short("a")
                .long("auxiliary")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("predictions")
                .help("Write validation predictions as CSV to a file, or to stdout given -")
                .short("o")
                .long("predictions")
                .takes_value(true),
        )
        .arg(Arg::with_name("target").long("target").takes_value(true))
        .arg(Arg::with_name("window").short("w").long("window").takes_value(true))
        .arg(Arg::with_name("hidden").long("hidden").takes_value(true))
        .arg(Arg::with_name("learning-rate").long("learning-rate").takes_value(true))
        .arg(Arg::with_name("clip").long("clip").takes_value(true))
        .arg(Arg::with_name("truncation").long("truncation").takes_value(true))
        .arg(
            Arg::with_name("activation")
                .long("activation")
                .takes_value(true)
                .possible_values(&["tanh", "sigmoid"]),
        )
        .arg(Arg::with_name("epochs").short("e").long("epochs").takes_value(true))
        .arg(Arg::with_name("patience").long("patience").takes_value(true))
        .arg(Arg::with_name("batch").long("batch").takes_value(true))
        .arg(Arg::with_name("train-ratio").long("train-ratio").takes_value(true))
        .arg(Arg::with_name("seed").long("seed").takes_value(true))
        .arg(Arg::with_name("no-shuffle").long("no-shuffle"))
        .arg(Arg::with_name("no-scale").long("no-scale"))
        .get_matches();
    env_logger::init();

    let config = config_from_args(&matches)?;
    let input = matches
        .value_of("INPUT")
        .ok_or_else(|| format_err!("No input file given"))?;
    let mut provider = CsvProvider::new(input);
    for path in matches.values_of("auxiliary").into_iter().flatten() {
        provider = provider.with_auxiliary(path);
    }

    let experiment = Experiment::new(config)?;
    let mut reporter = ProgressReporter::new(experiment.config().train.epochs);
    let summary = experiment.run(&mut provider, &mut reporter)?;
    info!(
        "Finished in state {:?} after {} epochs",
        summary.final_state,
        summary.epochs.len()
    );

    if let Some(path) = matches.value_of("predictions") {
        let sink = if path == "-" {
            PredictionSink::Stdout(stdout())
        } else {
            PredictionSink::File(File::create(path)?)
        };
        let written = write_predictions(sink, &summary.predictions)?;
        info!("Wrote {} predictions to {}", written, path);
    }
    Ok(())
}
