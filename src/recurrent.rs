/// Module that contains the elementwise nonlinearity kernels
pub mod activation;
/// Module that contains the time-major propagation scratch buffer
pub mod buffer;
/// Module that contains the cell variant tag and enum-dispatched cell
pub mod cell;
/// Module that contains the serde-backed cell description
pub mod config;
/// Module that contains borrowed views of cell parameters and gradients
pub mod layer_weight;
/// Module that contains the parallel-stream peephole LSTM layer
pub mod lstm_parallel;

pub use buffer::{SequenceBuffer, Unit};
pub use cell::{CellKind, RecurrentCell};
pub use config::{CellConfig, InitialWeights};
pub use layer_weight::{LayerGradient, LayerWeight, LstmParallelGradient, LstmParallelWeight};
pub use lstm_parallel::{ForwardPass, LstmParallel};

/// Type alias for the two-dimensional `f32` matrices exchanged with a layer
pub type Matrix = ndarray::Array2<f32>;

pub use crate::traits::Layer;
pub use crate::traits::Recurrent;
pub use crate::traits::Trainable;
