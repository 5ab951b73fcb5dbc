use crate::error::LayerError;
use crate::recurrent::Matrix;
use crate::recurrent::activation;
use crate::recurrent::buffer::{SequenceBuffer, Unit};
use crate::recurrent::cell::CellKind;
use crate::recurrent::config::CellConfig;
use crate::recurrent::layer_weight::{
    LayerGradient, LayerWeight, LstmParallelGradient, LstmParallelWeight,
};
use crate::traits::{Layer, Recurrent, Trainable};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Proof that a forward pass ran on a layer instance.
///
/// Returned by [`Recurrent::propagate`] and consumed by
/// [`Recurrent::backpropagate`], which refuses tokens from any pass other
/// than the most recent one on the same instance. Reconfiguring the stream
/// lengths also invalidates an outstanding token.
#[derive(Debug)]
pub struct ForwardPass {
    serial: u64,
    frames: usize,
    streams: usize,
}

impl ForwardPass {
    /// Number of time steps in the batch this pass processed.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of parallel streams in the batch this pass processed.
    pub fn streams(&self) -> usize {
        self.streams
    }
}

/// Batched LSTM layer with peephole connections over parallel streams.
///
/// The layer processes `S` independent sequences in lockstep: a batch of
/// `T*S` input rows carries frame `t` of every stream in row block `t`.
/// Each time step runs one batched pass over all streams, so the sequential
/// dependency stays on the time axis while the per-step work is data
/// parallel across streams and channels.
///
/// For each time step `t` the forward recurrence computes, per stream and
/// channel:
///
/// 1. `(g, i, f, o)_pre = x_t . Wx^T + m_{t-1} . Wm^T + b`
/// 2. `i_t = sigmoid(i_pre + c_{t-1} * p_i)`, `f_t = sigmoid(f_pre + c_{t-1} * p_f)`
/// 3. `g_t = tanh(g_pre)`
/// 4. `c_t = g_t * i_t + c_{t-1} * f_t`
/// 5. `h_t = tanh(c_t)`
/// 6. `o_t = sigmoid(o_pre + c_t * p_o)`
/// 7. `m_t = h_t * o_t`
///
/// where the peephole vectors `p_*` weight the cell state per channel. The
/// output gate reads the current cell state while the input and forget
/// gates read the previous one; the backward pass mirrors that asymmetry in
/// its peephole gradients.
///
/// The backward pass walks time in reverse over the retained activations,
/// producing the input gradient and folding the raw parameter gradients
/// into momentum-blended accumulators (`acc = momentum * acc + raw`) that
/// an external optimizer consumes.
///
/// # Example
/// ```rust
/// use ndarray::Array2;
/// use streamcell::prelude::*;
///
/// let mut cell = LstmParallel::new(4, 3, 0.9, Some(7)).unwrap();
/// cell.set_stream_lengths(vec![5, 5]);
///
/// // Two streams of five frames each, interleaved per time step
/// let input = Array2::ones((10, 4));
/// let (output, pass) = cell.propagate(&input).unwrap();
/// assert_eq!(output.dim(), (10, 3));
///
/// let grad = Array2::ones((10, 3));
/// let input_grad = cell.backpropagate(pass, &input, &output, &grad).unwrap();
/// assert_eq!(input_grad.dim(), (10, 4));
/// ```
#[derive(Debug, Clone)]
pub struct LstmParallel {
    input_dim: usize,
    cell_dim: usize,
    momentum: f32,
    mask_padded_frames: bool,
    stream_lengths: Vec<usize>,

    // parameters
    input_weights: Array2<f32>,     // (4 * cell_dim, input_dim)
    recurrent_weights: Array2<f32>, // (4 * cell_dim, cell_dim)
    bias: Array1<f32>,              // (4 * cell_dim)
    peephole_input: Array1<f32>,    // (cell_dim)
    peephole_forget: Array1<f32>,
    peephole_output: Array1<f32>,

    // momentum-blended gradient accumulators, same shapes as the parameters
    input_weights_grad: Array2<f32>,
    recurrent_weights_grad: Array2<f32>,
    bias_grad: Array1<f32>,
    peephole_input_grad: Array1<f32>,
    peephole_forget_grad: Array1<f32>,
    peephole_output_grad: Array1<f32>,

    // per-pass scratch arenas, forward activations and backward errors
    propagate_buf: SequenceBuffer,
    backpropagate_buf: SequenceBuffer,
    pass_serial: u64,
}

impl LstmParallel {
    /// Creates a cell with uniformly random weights in `(-0.05, 0.05)`,
    /// zero biases, and random peephole weights.
    ///
    /// # Parameters
    ///
    /// - `input_dim` - Width of each input frame
    /// - `cell_dim` - Cell width; the layer outputs `cell_dim` channels
    /// - `momentum` - Gradient accumulator blending factor, in `[0, 1)`
    /// - `seed` - Seed for reproducible initialization; entropy-seeded when `None`
    ///
    /// # Errors
    ///
    /// * `LayerError::InvalidConfig` - for zero dimensions or a momentum
    ///   outside `[0, 1)`
    pub fn new(
        input_dim: usize,
        cell_dim: usize,
        momentum: f32,
        seed: Option<u64>,
    ) -> Result<Self, LayerError> {
        let mut config = CellConfig::new(CellKind::LstmParallel, input_dim, cell_dim);
        config.momentum = momentum;
        config.seed = seed;
        Self::from_config(&config)
    }

    /// Creates a cell from a validated description, using its explicit
    /// initial weights when present and random initialization otherwise.
    ///
    /// # Errors
    ///
    /// * `LayerError::InvalidConfig` - if the description fails
    ///   [`CellConfig::validate`]
    pub fn from_config(config: &CellConfig) -> Result<Self, LayerError> {
        config.validate()?;
        let (input_dim, cell_dim) = (config.input_dim, config.cell_dim);

        let (input_weights, recurrent_weights, bias, peep_i, peep_f, peep_o) =
            match &config.weights {
                Some(weights) => {
                    let decoded = weights.decode(input_dim, cell_dim)?;
                    (
                        decoded.input_weights,
                        decoded.recurrent_weights,
                        decoded.bias,
                        decoded.peephole_input,
                        decoded.peephole_forget,
                        decoded.peephole_output,
                    )
                }
                None => {
                    let mut rng = match config.seed {
                        Some(seed) => StdRng::seed_from_u64(seed),
                        None => StdRng::from_rng(&mut rand::rng()),
                    };
                    let mut random = |rows: usize, cols: usize| {
                        Array2::from_shape_fn((rows, cols), |_| rng.random_range(-0.05..0.05))
                    };
                    let input_weights = random(4 * cell_dim, input_dim);
                    let recurrent_weights = random(4 * cell_dim, cell_dim);
                    let peep_i = random(1, cell_dim).row(0).to_owned();
                    let peep_f = random(1, cell_dim).row(0).to_owned();
                    let peep_o = random(1, cell_dim).row(0).to_owned();
                    (
                        input_weights,
                        recurrent_weights,
                        Array1::zeros(4 * cell_dim),
                        peep_i,
                        peep_f,
                        peep_o,
                    )
                }
            };

        Ok(Self {
            input_dim,
            cell_dim,
            momentum: config.momentum,
            mask_padded_frames: config.mask_padded_frames,
            stream_lengths: Vec::new(),
            input_weights,
            recurrent_weights,
            bias,
            peephole_input: peep_i,
            peephole_forget: peep_f,
            peephole_output: peep_o,
            input_weights_grad: Array2::zeros((4 * cell_dim, input_dim)),
            recurrent_weights_grad: Array2::zeros((4 * cell_dim, cell_dim)),
            bias_grad: Array1::zeros(4 * cell_dim),
            peephole_input_grad: Array1::zeros(cell_dim),
            peephole_forget_grad: Array1::zeros(cell_dim),
            peephole_output_grad: Array1::zeros(cell_dim),
            propagate_buf: SequenceBuffer::new(),
            backpropagate_buf: SequenceBuffer::new(),
            pass_serial: 0,
        })
    }

    /// Gradient accumulator blending factor.
    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    /// Whether frames past a stream's valid length are masked out.
    pub fn mask_padded_frames(&self) -> bool {
        self.mask_padded_frames
    }

    /// Enables or disables masking of frames past a stream's valid length.
    ///
    /// Changing the setting invalidates any outstanding [`ForwardPass`]
    /// token, since it alters what the retained activations mean.
    pub fn set_mask_padded_frames(&mut self, enabled: bool) {
        self.mask_padded_frames = enabled;
        self.pass_serial += 1;
    }

    #[cfg(test)]
    pub(crate) fn activations(&self) -> &SequenceBuffer {
        &self.propagate_buf
    }

    fn check_input_shape(&self, input: &Matrix) -> Result<(usize, usize), LayerError> {
        let streams = self.stream_lengths.len();
        if streams == 0 {
            return Err(LayerError::InvalidState(
                "stream lengths must be configured before propagation".to_string(),
            ));
        }
        if input.nrows() == 0 {
            return Err(LayerError::ShapeMismatch(
                "input batch holds no frames".to_string(),
            ));
        }
        if input.nrows() % streams != 0 {
            return Err(LayerError::ShapeMismatch(format!(
                "{} input rows do not divide into {} streams",
                input.nrows(),
                streams
            )));
        }
        if input.ncols() != self.input_dim {
            return Err(LayerError::ShapeMismatch(format!(
                "input has {} columns, layer expects {}",
                input.ncols(),
                self.input_dim
            )));
        }
        Ok((input.nrows() / streams, streams))
    }

    fn check_output_shape(&self, name: &str, m: &Matrix, rows: usize) -> Result<(), LayerError> {
        if m.dim() != (rows, self.cell_dim) {
            return Err(LayerError::ShapeMismatch(format!(
                "{} has shape {:?}, expected ({}, {})",
                name,
                m.dim(),
                rows,
                self.cell_dim
            )));
        }
        Ok(())
    }

    fn mask_padded(buf: &mut SequenceBuffer, lengths: &[usize], t: usize) {
        for (stream, &len) in lengths.iter().enumerate() {
            if t > len {
                buf.zero_stream_row(t, stream);
            }
        }
    }
}

/// Folds a raw gradient into its accumulator: `acc = momentum * acc + raw`.
fn blend<D: ndarray::Dimension>(
    acc: &mut ndarray::Array<f32, D>,
    raw: &ndarray::Array<f32, D>,
    momentum: f32,
) {
    acc.zip_mut_with(raw, |a, &r| *a = momentum * *a + r);
}

impl Layer for LstmParallel {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.cell_dim
    }

    fn kind(&self) -> CellKind {
        CellKind::LstmParallel
    }
}

impl Trainable for LstmParallel {
    fn num_parameters(&self) -> usize {
        self.input_weights.len()
            + self.recurrent_weights.len()
            + self.bias.len()
            + self.peephole_input.len()
            + self.peephole_forget.len()
            + self.peephole_output.len()
    }

    fn parameters(&self) -> Array1<f32> {
        let mut flat = Vec::with_capacity(self.num_parameters());
        flat.extend(self.input_weights.iter().copied());
        flat.extend(self.recurrent_weights.iter().copied());
        flat.extend(self.bias.iter().copied());
        flat.extend(self.peephole_input.iter().copied());
        flat.extend(self.peephole_forget.iter().copied());
        flat.extend(self.peephole_output.iter().copied());
        Array1::from_vec(flat)
    }

    fn scale(&mut self, factor: f32) {
        self.input_weights *= factor;
        self.recurrent_weights *= factor;
        self.bias *= factor;
        self.peephole_input *= factor;
        self.peephole_forget *= factor;
        self.peephole_output *= factor;
    }

    fn add_scaled(&mut self, factor: f32, other: &Self) -> Result<(), LayerError> {
        if self.input_dim != other.input_dim || self.cell_dim != other.cell_dim {
            return Err(LayerError::ShapeMismatch(format!(
                "cannot combine a {}x{} cell with a {}x{} cell",
                self.input_dim, self.cell_dim, other.input_dim, other.cell_dim
            )));
        }
        self.input_weights
            .scaled_add(factor, &other.input_weights);
        self.recurrent_weights
            .scaled_add(factor, &other.recurrent_weights);
        self.bias.scaled_add(factor, &other.bias);
        self.peephole_input
            .scaled_add(factor, &other.peephole_input);
        self.peephole_forget
            .scaled_add(factor, &other.peephole_forget);
        self.peephole_output
            .scaled_add(factor, &other.peephole_output);
        Ok(())
    }

    fn weights(&self) -> LayerWeight<'_> {
        LayerWeight::LstmParallel(LstmParallelWeight {
            input_weights: &self.input_weights,
            recurrent_weights: &self.recurrent_weights,
            bias: &self.bias,
            peephole_input: &self.peephole_input,
            peephole_forget: &self.peephole_forget,
            peephole_output: &self.peephole_output,
        })
    }

    fn gradients(&self) -> LayerGradient<'_> {
        LayerGradient::LstmParallel(LstmParallelGradient {
            input_weights: &self.input_weights_grad,
            recurrent_weights: &self.recurrent_weights_grad,
            bias: &self.bias_grad,
            peephole_input: &self.peephole_input_grad,
            peephole_forget: &self.peephole_forget_grad,
            peephole_output: &self.peephole_output_grad,
        })
    }
}

impl Recurrent for LstmParallel {
    fn set_stream_lengths(&mut self, lengths: Vec<usize>) {
        self.stream_lengths = lengths;
        // any retained activations no longer match the stream layout
        self.pass_serial += 1;
    }

    fn stream_lengths(&self) -> &[usize] {
        &self.stream_lengths
    }

    fn propagate(&mut self, input: &Matrix) -> Result<(Matrix, ForwardPass), LayerError> {
        let (frames, streams) = self.check_input_shape(input)?;
        self.propagate_buf.reset(frames, streams, self.cell_dim)?;

        // every frame's non-recurrent gate pre-activation in one product
        let pre = input.dot(&self.input_weights.t()) + &self.bias;
        self.propagate_buf.gate_span_mut(1, frames).assign(&pre);

        for t in 1..=frames {
            let c_prev = self.propagate_buf.unit(Unit::CellState, t - 1).to_owned();
            let m_prev = self.propagate_buf.unit(Unit::CellOutput, t - 1).to_owned();

            {
                let mut gates = self.propagate_buf.gates_mut(t);
                gates += &m_prev.dot(&self.recurrent_weights.t());
            }
            {
                let mut input_gate = self.propagate_buf.unit_mut(Unit::InputGate, t);
                input_gate += &(&c_prev * &self.peephole_input);
                activation::sigmoid_inplace(&mut input_gate);
            }
            {
                let mut forget_gate = self.propagate_buf.unit_mut(Unit::ForgetGate, t);
                forget_gate += &(&c_prev * &self.peephole_forget);
                activation::sigmoid_inplace(&mut forget_gate);
            }
            activation::tanh_inplace(&mut self.propagate_buf.unit_mut(Unit::Modulation, t));

            let cell = {
                let g = self.propagate_buf.unit(Unit::Modulation, t);
                let i = self.propagate_buf.unit(Unit::InputGate, t);
                let f = self.propagate_buf.unit(Unit::ForgetGate, t);
                &g * &i + &c_prev * &f
            };
            self.propagate_buf.unit_mut(Unit::CellState, t).assign(&cell);
            self.propagate_buf
                .unit_mut(Unit::SquashedCell, t)
                .assign(&cell.mapv(f32::tanh));

            // the output gate reads the current cell state, not the previous one
            {
                let mut output_gate = self.propagate_buf.unit_mut(Unit::OutputGate, t);
                output_gate += &(&cell * &self.peephole_output);
                activation::sigmoid_inplace(&mut output_gate);
            }

            let out = {
                let h = self.propagate_buf.unit(Unit::SquashedCell, t);
                let o = self.propagate_buf.unit(Unit::OutputGate, t);
                &h * &o
            };
            self.propagate_buf.unit_mut(Unit::CellOutput, t).assign(&out);

            if self.mask_padded_frames {
                Self::mask_padded(&mut self.propagate_buf, &self.stream_lengths, t);
            }
        }

        let output = self
            .propagate_buf
            .unit_span(Unit::CellOutput, 1, frames)
            .to_owned();
        self.pass_serial += 1;
        Ok((
            output,
            ForwardPass {
                serial: self.pass_serial,
                frames,
                streams,
            },
        ))
    }

    fn backpropagate(
        &mut self,
        pass: ForwardPass,
        input: &Matrix,
        output: &Matrix,
        output_grad: &Matrix,
    ) -> Result<Matrix, LayerError> {
        if pass.serial != self.pass_serial {
            return Err(LayerError::InvalidState(
                "forward pass context is stale; run propagate on this batch first".to_string(),
            ));
        }
        if pass.streams != self.stream_lengths.len() {
            return Err(LayerError::InvalidState(
                "stream configuration changed since the forward pass".to_string(),
            ));
        }
        let (frames, streams) = (pass.frames, pass.streams);
        let rows = frames * streams;
        if input.dim() != (rows, self.input_dim) {
            return Err(LayerError::ShapeMismatch(format!(
                "input has shape {:?}, expected ({}, {})",
                input.dim(),
                rows,
                self.input_dim
            )));
        }
        self.check_output_shape("output", output, rows)?;
        self.check_output_shape("output gradient", output_grad, rows)?;

        self.backpropagate_buf.reset(frames, streams, self.cell_dim)?;
        // the layer's own output is the only downstream consumer
        self.backpropagate_buf
            .unit_span_mut(Unit::CellOutput, 1, frames)
            .assign(output_grad);

        for t in (1..=frames).rev() {
            // feedback from the following frame through the recurrent weights
            {
                let future_gates = self.backpropagate_buf.gates(t + 1).to_owned();
                let mut dm = self.backpropagate_buf.unit_mut(Unit::CellOutput, t);
                dm += &future_gates.dot(&self.recurrent_weights);
            }
            {
                let dh = {
                    let dm = self.backpropagate_buf.unit(Unit::CellOutput, t);
                    let o = self.propagate_buf.unit(Unit::OutputGate, t);
                    &dm * &o
                };
                let mut dh_slot = self.backpropagate_buf.unit_mut(Unit::SquashedCell, t);
                dh_slot.assign(&dh);
                activation::tanh_diff_inplace(
                    &mut dh_slot,
                    &self.propagate_buf.unit(Unit::SquashedCell, t),
                );
            }
            {
                let d_out_gate = {
                    let dm = self.backpropagate_buf.unit(Unit::CellOutput, t);
                    let h = self.propagate_buf.unit(Unit::SquashedCell, t);
                    &dm * &h
                };
                let mut o_slot = self.backpropagate_buf.unit_mut(Unit::OutputGate, t);
                o_slot.assign(&d_out_gate);
                activation::sigmoid_diff_inplace(
                    &mut o_slot,
                    &self.propagate_buf.unit(Unit::OutputGate, t),
                );
            }
            {
                let dc = {
                    let dh = self.backpropagate_buf.unit(Unit::SquashedCell, t);
                    let dc_next = self.backpropagate_buf.unit(Unit::CellState, t + 1);
                    let f_next = self.propagate_buf.unit(Unit::ForgetGate, t + 1);
                    let di_next = self.backpropagate_buf.unit(Unit::InputGate, t + 1);
                    let df_next = self.backpropagate_buf.unit(Unit::ForgetGate, t + 1);
                    let d_o = self.backpropagate_buf.unit(Unit::OutputGate, t);
                    &dh + &(&dc_next * &f_next)
                        + &(&di_next * &self.peephole_input)
                        + &(&df_next * &self.peephole_forget)
                        + &(&d_o * &self.peephole_output)
                };
                self.backpropagate_buf.unit_mut(Unit::CellState, t).assign(&dc);
            }
            {
                let df = {
                    let dc = self.backpropagate_buf.unit(Unit::CellState, t);
                    let c_prev = self.propagate_buf.unit(Unit::CellState, t - 1);
                    &dc * &c_prev
                };
                let mut f_slot = self.backpropagate_buf.unit_mut(Unit::ForgetGate, t);
                f_slot.assign(&df);
                activation::sigmoid_diff_inplace(
                    &mut f_slot,
                    &self.propagate_buf.unit(Unit::ForgetGate, t),
                );
            }
            {
                let di = {
                    let dc = self.backpropagate_buf.unit(Unit::CellState, t);
                    let g = self.propagate_buf.unit(Unit::Modulation, t);
                    &dc * &g
                };
                let mut i_slot = self.backpropagate_buf.unit_mut(Unit::InputGate, t);
                i_slot.assign(&di);
                activation::sigmoid_diff_inplace(
                    &mut i_slot,
                    &self.propagate_buf.unit(Unit::InputGate, t),
                );
            }
            {
                let dg = {
                    let dc = self.backpropagate_buf.unit(Unit::CellState, t);
                    let i = self.propagate_buf.unit(Unit::InputGate, t);
                    &dc * &i
                };
                let mut g_slot = self.backpropagate_buf.unit_mut(Unit::Modulation, t);
                g_slot.assign(&dg);
                activation::tanh_diff_inplace(
                    &mut g_slot,
                    &self.propagate_buf.unit(Unit::Modulation, t),
                );
            }

            if self.mask_padded_frames {
                Self::mask_padded(&mut self.backpropagate_buf, &self.stream_lengths, t);
            }
        }

        let gate_err = self.backpropagate_buf.gate_span(1, frames);
        let input_grad = gate_err.dot(&self.input_weights);

        // raw parameter gradients for this batch
        let raw_input_weights = gate_err.t().dot(input);
        let raw_recurrent_weights = {
            let m_history = self.propagate_buf.unit_span(Unit::CellOutput, 0, frames - 1);
            gate_err.t().dot(&m_history)
        };
        let raw_bias = gate_err.sum_axis(Axis(0));
        let c_history = self.propagate_buf.unit_span(Unit::CellState, 0, frames - 1);
        let raw_peephole_input = (&self
            .backpropagate_buf
            .unit_span(Unit::InputGate, 1, frames)
            * &c_history)
            .sum_axis(Axis(0));
        let raw_peephole_forget = (&self
            .backpropagate_buf
            .unit_span(Unit::ForgetGate, 1, frames)
            * &c_history)
            .sum_axis(Axis(0));
        // reads the current cell state, matching the forward output gate
        let raw_peephole_output = (&self
            .backpropagate_buf
            .unit_span(Unit::OutputGate, 1, frames)
            * &self.propagate_buf.unit_span(Unit::CellState, 1, frames))
            .sum_axis(Axis(0));

        let momentum = self.momentum;
        blend(&mut self.input_weights_grad, &raw_input_weights, momentum);
        blend(
            &mut self.recurrent_weights_grad,
            &raw_recurrent_weights,
            momentum,
        );
        blend(&mut self.bias_grad, &raw_bias, momentum);
        blend(&mut self.peephole_input_grad, &raw_peephole_input, momentum);
        blend(
            &mut self.peephole_forget_grad,
            &raw_peephole_forget,
            momentum,
        );
        blend(
            &mut self.peephole_output_grad,
            &raw_peephole_output,
            momentum,
        );

        Ok(input_grad)
    }
}
