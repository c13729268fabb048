/*!
Hyperparameters of the recurrent network
*/
use crate::{CpuFloat, Error, Result};
use serde::{Deserialize, Serialize};

/// The saturating nonlinearity applied to hidden states
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Hyperbolic tangent
    Tanh,
    /// Logistic sigmoid
    Sigmoid,
}

impl Activation {
    /// Apply the nonlinearity
    #[inline]
    pub fn apply(self, x: CpuFloat) -> CpuFloat {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// The derivative of the nonlinearity, given its output
    #[inline]
    pub fn derivative(self, y: CpuFloat) -> CpuFloat {
        match self {
            Activation::Tanh => 1.0 - y * y,
            Activation::Sigmoid => y * (1.0 - y),
        }
    }
}

impl Default for Activation {
    fn default() -> Activation {
        Activation::Tanh
    }
}

impl std::str::FromStr for Activation {
    type Err = Error;
    fn from_str(s: &str) -> Result<Activation> {
        match s {
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(Error::InvalidConfig(format!(
                "unknown activation {:?}, expected tanh or sigmoid",
                other
            ))),
        }
    }
}

/// How to draw the initial weights
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Init {
    /// Weights uniform in `[-1/sqrt(hidden), 1/sqrt(hidden))`, biases zero
    Symmetric,
    /// Weights and biases uniform in `[low, high)`
    Uniform {
        /// Inclusive lower bound
        low: CpuFloat,
        /// Exclusive upper bound
        high: CpuFloat,
    },
}

impl Default for Init {
    fn default() -> Init {
        Init::Symmetric
    }
}

/// A descriptor for an instance of the recurrent network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RnnConfig {
    /// The number of features fed in at each timestep
    pub input_size: usize,
    /// The size of the hidden state
    pub hidden_size: usize,
    /// The number of outputs
    pub output_size: usize,
    /// The gradient descent step size
    pub learning_rate: CpuFloat,
    /// Gradients are clamped element-wise into `[-clip_bound, clip_bound]` before every update
    pub clip_bound: CpuFloat,
    /// How many timesteps before the last one gradients flow back through the recurrence
    pub truncation_depth: usize,
    /// The hidden state nonlinearity
    pub activation: Activation,
    /// Whether the output layer has a bias
    pub output_bias: bool,
    /// How to draw the initial parameters
    pub init: Init,
}

impl Default for RnnConfig {
    fn default() -> RnnConfig {
        RnnConfig {
            input_size: 1,
            hidden_size: 64,
            output_size: 1,
            learning_rate: 0.005,
            clip_bound: 1.0,
            truncation_depth: 5,
            activation: Activation::Tanh,
            output_bias: true,
            init: Init::Symmetric,
        }
    }
}

impl RnnConfig {
    /// A default configuration with the given layer sizes
    pub fn new(input_size: usize, hidden_size: usize, output_size: usize) -> RnnConfig {
        RnnConfig {
            input_size,
            hidden_size,
            output_size,
            ..RnnConfig::default()
        }
    }

    /// Set the learning rate
    pub fn with_learning_rate(mut self, learning_rate: CpuFloat) -> RnnConfig {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the gradient clipping bound
    pub fn with_clip_bound(mut self, clip_bound: CpuFloat) -> RnnConfig {
        self.clip_bound = clip_bound;
        self
    }

    /// Set the truncation depth. `usize::MAX` backpropagates through the whole sequence.
    pub fn with_truncation_depth(mut self, truncation_depth: usize) -> RnnConfig {
        self.truncation_depth = truncation_depth;
        self
    }

    /// Set the activation
    pub fn with_activation(mut self, activation: Activation) -> RnnConfig {
        self.activation = activation;
        self
    }

    /// Set the initialization scheme
    pub fn with_init(mut self, init: Init) -> RnnConfig {
        self.init = init;
        self
    }

    /// Enable or disable the output bias
    pub fn with_output_bias(mut self, output_bias: bool) -> RnnConfig {
        self.output_bias = output_bias;
        self
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("input_size", self.input_size),
            ("hidden_size", self.hidden_size),
            ("output_size", self.output_size),
        ];
        for (name, size) in sizes.iter() {
            if *size == 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if !(self.clip_bound.is_finite() && self.clip_bound > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "clip bound must be positive and finite, got {}",
                self.clip_bound
            )));
        }
        if let Init::Uniform { low, high } = self.init {
            if !(low.is_finite() && high.is_finite() && low < high) {
                return Err(Error::InvalidConfig(format!(
                    "uniform init needs finite low < high, got [{}, {})",
                    low, high
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_match_finite_differences() {
        for &activation in &[Activation::Tanh, Activation::Sigmoid] {
            for &x in &[-2.0, -0.3, 0.0, 0.7, 1.9] {
                let h = 1e-6;
                let numeric = (activation.apply(x + h) - activation.apply(x - h)) / (2.0 * h);
                let analytic = activation.derivative(activation.apply(x));
                assert!((numeric - analytic).abs() < 1e-6, "{:?} at {}", activation, x);
            }
        }
    }

    #[test]
    fn config_validation() {
        assert!(RnnConfig::default().validate().is_ok());
        assert!(RnnConfig::new(0, 4, 1).validate().is_err());
        assert!(RnnConfig::new(1, 4, 1)
            .with_learning_rate(0.0)
            .validate()
            .is_err());
        assert!(RnnConfig::new(1, 4, 1)
            .with_clip_bound(f64::NAN)
            .validate()
            .is_err());
        assert!(RnnConfig::new(1, 4, 1)
            .with_init(Init::Uniform { low: 1.0, high: 0.0 })
            .validate()
            .is_err());
        assert_eq!("sigmoid".parse::<Activation>().unwrap(), Activation::Sigmoid);
        assert!("relu".parse::<Activation>().is_err());
    }
}
