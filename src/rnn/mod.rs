/*!
The recurrent network: a single hidden layer with a linear readout, trained by truncated backpropagation through
time and plain gradient descent
*/

mod config;

pub use config::{Activation, Init, RnnConfig};

use crate::util::{all_finite, clip};
use crate::{CpuFloat, Error, Result};
use log::error;
use ndarray::{Array2, ArrayView2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of network identities, so traces can be matched to the network which produced them
static NETWORK_IDS: AtomicU64 = AtomicU64::new(0);

/// The trainable parameters of a network. Vectors are stored as single-column matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct RnnParameters {
    /// Input to hidden weights, (hidden x input)
    pub w_ih: Array2<CpuFloat>,
    /// Hidden to hidden weights, (hidden x hidden)
    pub w_hh: Array2<CpuFloat>,
    /// Hidden bias, (hidden x 1)
    pub b_h: Array2<CpuFloat>,
    /// Hidden to output weights, (output x hidden)
    pub w_ho: Array2<CpuFloat>,
    /// Output bias, (output x 1)
    pub b_o: Array2<CpuFloat>,
}

impl RnnParameters {
    /// All-zero parameters shaped for a configuration
    pub fn zeros(config: &RnnConfig) -> RnnParameters {
        let (i, h, o) = (config.input_size, config.hidden_size, config.output_size);
        RnnParameters {
            w_ih: Array2::zeros((h, i)),
            w_hh: Array2::zeros((h, h)),
            b_h: Array2::zeros((h, 1)),
            w_ho: Array2::zeros((o, h)),
            b_o: Array2::zeros((o, 1)),
        }
    }

    /// Draw parameters for a configuration from its initialization scheme
    pub fn init<R: Rng + ?Sized>(config: &RnnConfig, rng: &mut R) -> RnnParameters {
        let (i, h, o) = (config.input_size, config.hidden_size, config.output_size);
        match config.init {
            Init::Symmetric => {
                let bound = 1.0 / (h as CpuFloat).sqrt();
                let dist = Uniform::new(-bound, bound);
                RnnParameters {
                    w_ih: Array2::random_using((h, i), &dist, rng),
                    w_hh: Array2::random_using((h, h), &dist, rng),
                    b_h: Array2::zeros((h, 1)),
                    w_ho: Array2::random_using((o, h), &dist, rng),
                    b_o: Array2::zeros((o, 1)),
                }
            }
            Init::Uniform { low, high } => {
                let dist = Uniform::new(low, high);
                RnnParameters {
                    w_ih: Array2::random_using((h, i), &dist, rng),
                    w_hh: Array2::random_using((h, h), &dist, rng),
                    b_h: Array2::random_using((h, 1), &dist, rng),
                    w_ho: Array2::random_using((o, h), &dist, rng),
                    b_o: if config.output_bias {
                        Array2::random_using((o, 1), &dist, rng)
                    } else {
                        Array2::zeros((o, 1))
                    },
                }
            }
        }
    }

    fn tensors(&self) -> [&Array2<CpuFloat>; 5] {
        [&self.w_ih, &self.w_hh, &self.b_h, &self.w_ho, &self.b_o]
    }

    fn tensors_mut(&mut self) -> [&mut Array2<CpuFloat>; 5] {
        [
            &mut self.w_ih,
            &mut self.w_hh,
            &mut self.b_h,
            &mut self.w_ho,
            &mut self.b_o,
        ]
    }

    /// Whether every parameter is finite
    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| all_finite(t.iter()))
    }
}

/// Gradients of a scalar loss with respect to each parameter, shaped like `RnnParameters`
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    /// Gradient of the input to hidden weights
    pub w_ih: Array2<CpuFloat>,
    /// Gradient of the hidden to hidden weights
    pub w_hh: Array2<CpuFloat>,
    /// Gradient of the hidden bias
    pub b_h: Array2<CpuFloat>,
    /// Gradient of the hidden to output weights
    pub w_ho: Array2<CpuFloat>,
    /// Gradient of the output bias
    pub b_o: Array2<CpuFloat>,
}

impl Gradients {
    /// All-zero gradients shaped for a configuration
    pub fn zeros(config: &RnnConfig) -> Gradients {
        let RnnParameters {
            w_ih,
            w_hh,
            b_h,
            w_ho,
            b_o,
        } = RnnParameters::zeros(config);
        Gradients {
            w_ih,
            w_hh,
            b_h,
            w_ho,
            b_o,
        }
    }

    fn tensors(&self) -> [&Array2<CpuFloat>; 5] {
        [&self.w_ih, &self.w_hh, &self.b_h, &self.w_ho, &self.b_o]
    }

    fn tensors_mut(&mut self) -> [&mut Array2<CpuFloat>; 5] {
        [
            &mut self.w_ih,
            &mut self.w_hh,
            &mut self.b_h,
            &mut self.w_ho,
            &mut self.b_o,
        ]
    }

    /// Clamp every element into `[-bound, bound]`
    pub fn clip(&mut self, bound: CpuFloat) {
        for tensor in self.tensors_mut().iter_mut() {
            tensor.mapv_inplace(|g| clip(g, bound));
        }
    }

    /// Whether every element is finite
    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| all_finite(t.iter()))
    }

    /// The largest absolute element
    pub fn max_abs(&self) -> CpuFloat {
        self.tensors()
            .iter()
            .flat_map(|t| t.iter())
            .fold(0.0, |max: CpuFloat, g| max.max(g.abs()))
    }

    /// Add another set of gradients to this one
    pub fn accumulate(&mut self, other: &Gradients) {
        for (mine, theirs) in self.tensors_mut().iter_mut().zip(other.tensors().iter()) {
            **mine += *theirs;
        }
    }

    /// Multiply every element by a factor
    pub fn scale(&mut self, factor: CpuFloat) {
        for tensor in self.tensors_mut().iter_mut() {
            tensor.mapv_inplace(|g| g * factor);
        }
    }
}

/// The hidden states visited by one forward pass, `h_0` (all zeros) through `h_T`, along with the inputs which
/// produced them.
///
/// A trace is single use: it is consumed by the backward pass, and only the trace of a network's latest forward pass
/// is accepted.
#[derive(Debug)]
pub struct HiddenStateTrace {
    network: u64,
    pass: u64,
    inputs: Array2<CpuFloat>,
    states: Vec<Array2<CpuFloat>>,
}

impl HiddenStateTrace {
    /// The number of timesteps in the traced sequence
    pub fn timesteps(&self) -> usize {
        self.inputs.nrows()
    }

    /// The hidden states, indexed by timestep, starting from the initial zero state
    pub fn states(&self) -> &[Array2<CpuFloat>] {
        &self.states
    }
}

/// A recurrent network and its parameters
#[derive(Debug)]
pub struct Rnn {
    config: RnnConfig,
    params: RnnParameters,
    id: u64,
    passes: u64,
    pending: Option<u64>,
}

impl Rnn {
    /// Build a network, drawing its initial parameters from `rng`
    pub fn new<R: Rng + ?Sized>(config: RnnConfig, rng: &mut R) -> Result<Rnn> {
        config.validate()?;
        let params = RnnParameters::init(&config, rng);
        Ok(Rnn::build(config, params))
    }

    /// Build a network with given parameters, which must be shaped for the configuration
    pub fn with_parameters(config: RnnConfig, params: RnnParameters) -> Result<Rnn> {
        config.validate()?;
        let expected = RnnParameters::zeros(&config);
        for (have, want) in params.tensors().iter().zip(expected.tensors().iter()) {
            if have.dim() != want.dim() {
                return Err(Error::DimensionMismatch {
                    what: "parameter elements",
                    expected: want.len(),
                    found: have.len(),
                });
            }
        }
        Ok(Rnn::build(config, params))
    }

    fn build(config: RnnConfig, params: RnnParameters) -> Rnn {
        Rnn {
            config,
            params,
            id: NETWORK_IDS.fetch_add(1, Ordering::Relaxed),
            passes: 0,
            pending: None,
        }
    }

    /// This network's configuration
    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    /// This network's current parameters
    pub fn parameters(&self) -> &RnnParameters {
        &self.params
    }

    fn check_inputs(&self, inputs: &ArrayView2<CpuFloat>) -> Result<()> {
        if inputs.nrows() == 0 {
            return Err(Error::DimensionMismatch {
                what: "sequence timesteps",
                expected: 1,
                found: 0,
            });
        }
        if inputs.ncols() != self.config.input_size {
            return Err(Error::DimensionMismatch {
                what: "input vector",
                expected: self.config.input_size,
                found: inputs.ncols(),
            });
        }
        Ok(())
    }

    /// Run the recurrence over a (timesteps x input) sequence, returning every hidden state including the initial one
    fn unroll(&self, inputs: ArrayView2<CpuFloat>) -> Vec<Array2<CpuFloat>> {
        let activation = self.config.activation;
        let mut states = Vec::with_capacity(inputs.nrows() + 1);
        let mut h = Array2::zeros((self.config.hidden_size, 1));
        states.push(h.clone());
        for x in inputs.rows() {
            let x = x.insert_axis(Axis(1));
            let z = self.params.w_ih.dot(&x) + self.params.w_hh.dot(&h) + &self.params.b_h;
            h = z.mapv_into(|v| activation.apply(v));
            states.push(h.clone());
        }
        states
    }

    fn readout(&self, h: &Array2<CpuFloat>) -> Array2<CpuFloat> {
        let y = self.params.w_ho.dot(h);
        if self.config.output_bias {
            y + &self.params.b_o
        } else {
            y
        }
    }

    /// Run a (timesteps x input) sequence through the network, returning the (output x 1) output and the trace
    /// needed to backpropagate it. Any earlier trace of this network becomes stale.
    pub fn forward_pass(
        &mut self,
        inputs: ArrayView2<CpuFloat>,
    ) -> Result<(Array2<CpuFloat>, HiddenStateTrace)> {
        self.check_inputs(&inputs)?;
        let states = self.unroll(inputs.view());
        let output = self.readout(&states[states.len() - 1]);
        self.passes += 1;
        self.pending = Some(self.passes);
        let trace = HiddenStateTrace {
            network: self.id,
            pass: self.passes,
            inputs: inputs.to_owned(),
            states,
        };
        Ok((output, trace))
    }

    /// Run a sequence through the network without recording a trace
    pub fn predict(&self, inputs: ArrayView2<CpuFloat>) -> Result<Array2<CpuFloat>> {
        self.check_inputs(&inputs)?;
        let states = self.unroll(inputs);
        Ok(self.readout(&states[states.len() - 1]))
    }

    /// Backpropagate the gradient of the loss with respect to the output through a trace, without touching the
    /// parameters
    pub fn compute_gradients(
        &mut self,
        output_grad: &Array2<CpuFloat>,
        trace: HiddenStateTrace,
    ) -> Result<Gradients> {
        if output_grad.dim() != (self.config.output_size, 1) {
            return Err(Error::DimensionMismatch {
                what: "output gradient",
                expected: self.config.output_size,
                found: output_grad.len(),
            });
        }
        if trace.network != self.id || self.pending != Some(trace.pass) {
            return Err(Error::StaleTrace);
        }
        self.pending = None;

        let activation = self.config.activation;
        let steps = trace.timesteps();
        let mut grads = Gradients::zeros(&self.config);

        grads.w_ho = output_grad.dot(&trace.states[steps].t());
        if self.config.output_bias {
            grads.b_o = output_grad.clone();
        }

        // dL/dh_t, starting from the last hidden state
        let mut d_h = self.params.w_ho.t().dot(output_grad);
        let first = steps
            .saturating_sub(self.config.truncation_depth)
            .max(1);
        for t in (first..=steps).rev() {
            let delta = &d_h * &trace.states[t].mapv(|h| activation.derivative(h));
            let x = trace.inputs.row(t - 1).insert_axis(Axis(1));
            grads.w_ih += &delta.dot(&x.t());
            grads.w_hh += &delta.dot(&trace.states[t - 1].t());
            grads.b_h += &delta;
            d_h = self.params.w_hh.t().dot(&delta);
        }
        Ok(grads)
    }

    /// Clip gradients element-wise and take one gradient descent step.
    ///
    /// Non-finite gradients are rejected before clipping, leaving the parameters untouched.
    pub fn apply_gradients(&mut self, mut grads: Gradients) -> Result<()> {
        if !grads.is_finite() {
            error!("Refusing to apply non-finite gradients");
            return Err(Error::NumericalDivergence {
                epoch: None,
                sample: None,
                quantity: "gradient",
            });
        }
        grads.clip(self.config.clip_bound);
        let step = -self.config.learning_rate;
        for (param, grad) in self
            .params
            .tensors_mut()
            .iter_mut()
            .zip(grads.tensors().iter())
        {
            param.scaled_add(step, *grad);
        }
        Ok(())
    }

    /// Backpropagate the gradient of the loss with respect to the output through a trace, then update the
    /// parameters
    pub fn backward_pass(
        &mut self,
        output_grad: &Array2<CpuFloat>,
        trace: HiddenStateTrace,
    ) -> Result<()> {
        let grads = self.compute_gradients(output_grad, trace)?;
        self.apply_gradients(grads)
    }
}
