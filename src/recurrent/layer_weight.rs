use ndarray::{Array1, Array2};

/// Container for the parameter values of a recurrent cell
///
/// Each variant corresponds to a cell type and borrows the parameter
/// matrices of a live layer instance.
pub enum LayerWeight<'a> {
    LstmParallel(LstmParallelWeight<'a>),
}

/// Parameters of a parallel-stream LSTM cell
///
/// # Fields
///
/// - `input_weights` - Input-to-gates weight matrix with shape (4 * cell_dim, input_dim)
/// - `recurrent_weights` - Recurrent-to-gates weight matrix with shape (4 * cell_dim, cell_dim)
/// - `bias` - Gate bias vector of length 4 * cell_dim
/// - `peephole_input` - Per-channel cell-to-input-gate weights of length cell_dim
/// - `peephole_forget` - Per-channel cell-to-forget-gate weights of length cell_dim
/// - `peephole_output` - Per-channel cell-to-output-gate weights of length cell_dim
pub struct LstmParallelWeight<'a> {
    pub input_weights: &'a Array2<f32>,
    pub recurrent_weights: &'a Array2<f32>,
    pub bias: &'a Array1<f32>,
    pub peephole_input: &'a Array1<f32>,
    pub peephole_forget: &'a Array1<f32>,
    pub peephole_output: &'a Array1<f32>,
}

/// Container for the gradient accumulators of a recurrent cell
///
/// Accumulators have the same shapes as their parameters and hold the
/// momentum-blended sum of the raw gradients of successive backward passes.
/// An external optimizer consumes them; the layer never applies them itself.
pub enum LayerGradient<'a> {
    LstmParallel(LstmParallelGradient<'a>),
}

/// Gradient accumulators of a parallel-stream LSTM cell, shaped like
/// [`LstmParallelWeight`].
pub struct LstmParallelGradient<'a> {
    pub input_weights: &'a Array2<f32>,
    pub recurrent_weights: &'a Array2<f32>,
    pub bias: &'a Array1<f32>,
    pub peephole_input: &'a Array1<f32>,
    pub peephole_forget: &'a Array1<f32>,
    pub peephole_output: &'a Array1<f32>,
}
