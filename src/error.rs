/*!
Errors produced by `vixburn`
*/
use thiserror::Error;

/// A `Result` specialized to `vixburn`'s error type
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while loading data, building windows or training
#[derive(Debug, Error)]
pub enum Error {
    /// A series was too short to build even a single window
    #[error("need more than {window_size} observations to build a window, got {len}")]
    InsufficientData {
        /// The number of observations available
        len: usize,
        /// The requested window size
        window_size: usize,
    },
    /// A shape contract was violated at the boundary of the network
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// What was being checked
        what: &'static str,
        /// The expected size
        expected: usize,
        /// The size actually found
        found: usize,
    },
    /// A backward pass was handed a trace which is not from the most recent forward pass
    #[error("hidden state trace is stale: it was not produced by the latest forward pass of this network")]
    StaleTrace,
    /// A NaN or an infinity showed up in the loss or in the gradients
    #[error("numerical divergence{}: {quantity} is not finite", location(.epoch, .sample))]
    NumericalDivergence {
        /// The (zero based) epoch in which the divergence was detected, when raised by the training loop
        epoch: Option<usize>,
        /// The index of the sample being processed within the epoch, when raised by the training loop
        sample: Option<usize>,
        /// Which quantity went non-finite
        quantity: &'static str,
    },
    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A series was not sorted by timestamp
    #[error("series is not sorted by timestamp at row {row}")]
    UnsortedSeries {
        /// The first row which is out of order
        row: usize,
    },
    /// A named column does not exist in a series
    #[error("no column named {0:?}")]
    MissingColumn(String),
    /// A series had no usable rows
    #[error("series has no usable rows")]
    EmptySeries,
    /// Error reading or writing CSV
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn location(epoch: &Option<usize>, sample: &Option<usize>) -> String {
    match (epoch, sample) {
        (Some(epoch), Some(sample)) => format!(" in epoch {} at sample {}", epoch, sample),
        (Some(epoch), None) => format!(" in epoch {}", epoch),
        _ => String::new(),
    }
}

impl Error {
    /// Whether this error indicates the training run diverged
    pub fn is_divergence(&self) -> bool {
        matches!(self, Error::NumericalDivergence { .. })
    }
}
