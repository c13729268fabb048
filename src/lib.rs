/*!
A from-scratch recurrent neural network for predicting the VIX volatility index, written in Rust as an experiment.

The network is a single Elman-style recurrent layer trained with truncated backpropagation through time and
element-wise gradient clipping. It is fed fixed-length windows of the index's own history, optionally joined
with auxiliary macroeconomic series (treasury yields, unemployment) aligned by date.

Designed to be run on daily CSV exports of the VIX and related series, but also to be modular, extensible and
easily modifiable: the data provider, the reporting sink and every hyperparameter can be swapped out.
*/
#![forbid(missing_docs)]

pub mod data;
pub mod error;
pub mod experiment;
pub mod report;
pub mod rnn;
pub mod train;
pub mod util;
pub mod window;

pub use error::{Error, Result};

/// The floating point type used for all calculations
pub type CpuFloat = f64;
