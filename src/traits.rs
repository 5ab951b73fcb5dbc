use crate::error::LayerError;
use crate::recurrent::layer_weight::{LayerGradient, LayerWeight};
use crate::recurrent::lstm_parallel::ForwardPass;
use crate::recurrent::{CellKind, Matrix};
use ndarray::Array1;

/// Shape and identity of a network layer.
///
/// Every concrete cell carries its fixed input and output widths and a
/// variant tag used by model builders in place of runtime type inspection.
pub trait Layer {
    /// Width of the frames this layer consumes.
    fn input_dim(&self) -> usize;

    /// Width of the frames this layer produces.
    fn output_dim(&self) -> usize;

    /// Variant tag identifying the concrete cell.
    fn kind(&self) -> CellKind;
}

/// Parameter access for layers with trainable state.
///
/// The layer owns its parameters and their momentum-blended gradient
/// accumulators; the update step that folds accumulators back into the
/// parameters belongs to an external optimizer, which reads them through
/// [`Trainable::gradients`].
pub trait Trainable: Layer {
    /// Total number of trainable parameter values in the layer.
    fn num_parameters(&self) -> usize;

    /// All parameters flattened into one vector.
    ///
    /// Values appear in a fixed order: input weights row by row, recurrent
    /// weights row by row, bias, then the input, forget, and output peephole
    /// vectors.
    fn parameters(&self) -> Array1<f32>;

    /// Multiplies every parameter by `factor` in place.
    fn scale(&mut self, factor: f32);

    /// Adds `factor` times the parameters of `other` to this layer's
    /// parameters in place. Used by model-averaging code.
    ///
    /// # Errors
    ///
    /// * `LayerError::ShapeMismatch` - if the two layers do not share the
    ///   same dimensions
    fn add_scaled(&mut self, factor: f32, other: &Self) -> Result<(), LayerError>;

    /// Read access to the current parameter values.
    fn weights(&self) -> LayerWeight<'_>;

    /// Read access to the momentum-blended gradient accumulators.
    fn gradients(&self) -> LayerGradient<'_>;
}

/// Propagation over batches of parallel streams.
///
/// A batch interleaves `S` independent sequences in lockstep: row block `t`
/// of the input holds frame `t` of every stream. The stream count and the
/// per-stream valid lengths are configured up front and reused by
/// subsequent calls.
///
/// `propagate` returns a [`ForwardPass`] token alongside the output; the
/// token must be handed back to `backpropagate`, which ties each backward
/// pass to the forward pass whose activations it consumes.
pub trait Recurrent: Trainable {
    /// Configures the stream count and per-stream valid frame counts for
    /// subsequent calls. Invalidates any outstanding [`ForwardPass`] token.
    fn set_stream_lengths(&mut self, lengths: Vec<usize>);

    /// Currently configured per-stream valid frame counts.
    fn stream_lengths(&self) -> &[usize];

    /// Runs the forward pass over one batch.
    ///
    /// # Parameters
    ///
    /// * `input` - `T*S` rows of `input_dim` values, time-major over `S` streams
    ///
    /// # Returns
    ///
    /// * `Ok((output, pass))` - `T*S` rows of `output_dim` values plus the
    ///   token required by [`Recurrent::backpropagate`]
    ///
    /// # Errors
    ///
    /// - `LayerError::InvalidState` - if no stream lengths are configured
    /// - `LayerError::ShapeMismatch` - if the row count does not divide by the
    ///   stream count or the column count is wrong
    /// - `LayerError::AllocationFailed` - if the activation buffer cannot be sized
    fn propagate(&mut self, input: &Matrix) -> Result<(Matrix, ForwardPass), LayerError>;

    /// Runs the backward pass paired with the forward pass that produced
    /// `pass`, returning the gradient with respect to `input` and folding
    /// parameter gradients into the layer's accumulators.
    ///
    /// # Parameters
    ///
    /// - `pass` - Token returned by the matching [`Recurrent::propagate`] call
    /// - `input` - The batch given to the forward pass
    /// - `output` - The output the forward pass produced
    /// - `output_grad` - Gradient of the training loss with respect to `output`
    ///
    /// # Errors
    ///
    /// - `LayerError::InvalidState` - if the token is stale or the stream
    ///   configuration changed since the forward pass
    /// - `LayerError::ShapeMismatch` - if any matrix does not match the
    ///   forward batch's geometry
    /// - `LayerError::AllocationFailed` - if the error buffer cannot be sized
    fn backpropagate(
        &mut self,
        pass: ForwardPass,
        input: &Matrix,
        output: &Matrix,
        output_grad: &Matrix,
    ) -> Result<Matrix, LayerError>;
}
