use crate::error::LayerError;
use crate::recurrent::Matrix;
use crate::recurrent::config::CellConfig;
use crate::recurrent::layer_weight::{LayerGradient, LayerWeight};
use crate::recurrent::lstm_parallel::{ForwardPass, LstmParallel};
use crate::traits::{Layer, Recurrent, Trainable};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Tag selecting a concrete recurrent cell variant.
///
/// Model descriptions name the variant through this tag and the matching
/// cell is built at construction time; there is no runtime dispatch through
/// a layer hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Peephole LSTM over parallel streams
    LstmParallel,
}

impl CellKind {
    /// Human-readable tag name, as used in model summaries.
    pub fn name(self) -> &'static str {
        match self {
            CellKind::LstmParallel => "LstmParallel",
        }
    }
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete recurrent cell selected by [`CellKind`].
///
/// Holds whichever cell variant a description asked for and forwards the
/// [`Layer`], [`Trainable`], and [`Recurrent`] capabilities to it.
#[derive(Debug, Clone)]
pub enum RecurrentCell {
    LstmParallel(LstmParallel),
}

impl RecurrentCell {
    /// Builds the cell variant named by `config.kind`.
    ///
    /// # Errors
    ///
    /// * `LayerError::InvalidConfig` - if the description fails validation
    pub fn from_config(config: &CellConfig) -> Result<Self, LayerError> {
        match config.kind {
            CellKind::LstmParallel => Ok(Self::LstmParallel(LstmParallel::from_config(config)?)),
        }
    }
}

impl Layer for RecurrentCell {
    fn input_dim(&self) -> usize {
        match self {
            Self::LstmParallel(cell) => cell.input_dim(),
        }
    }

    fn output_dim(&self) -> usize {
        match self {
            Self::LstmParallel(cell) => cell.output_dim(),
        }
    }

    fn kind(&self) -> CellKind {
        match self {
            Self::LstmParallel(cell) => cell.kind(),
        }
    }
}

impl Trainable for RecurrentCell {
    fn num_parameters(&self) -> usize {
        match self {
            Self::LstmParallel(cell) => cell.num_parameters(),
        }
    }

    fn parameters(&self) -> Array1<f32> {
        match self {
            Self::LstmParallel(cell) => cell.parameters(),
        }
    }

    fn scale(&mut self, factor: f32) {
        match self {
            Self::LstmParallel(cell) => cell.scale(factor),
        }
    }

    fn add_scaled(&mut self, factor: f32, other: &Self) -> Result<(), LayerError> {
        match (self, other) {
            (Self::LstmParallel(cell), Self::LstmParallel(other)) => {
                cell.add_scaled(factor, other)
            }
        }
    }

    fn weights(&self) -> LayerWeight<'_> {
        match self {
            Self::LstmParallel(cell) => cell.weights(),
        }
    }

    fn gradients(&self) -> LayerGradient<'_> {
        match self {
            Self::LstmParallel(cell) => cell.gradients(),
        }
    }
}

impl Recurrent for RecurrentCell {
    fn set_stream_lengths(&mut self, lengths: Vec<usize>) {
        match self {
            Self::LstmParallel(cell) => cell.set_stream_lengths(lengths),
        }
    }

    fn stream_lengths(&self) -> &[usize] {
        match self {
            Self::LstmParallel(cell) => cell.stream_lengths(),
        }
    }

    fn propagate(&mut self, input: &Matrix) -> Result<(Matrix, ForwardPass), LayerError> {
        match self {
            Self::LstmParallel(cell) => cell.propagate(input),
        }
    }

    fn backpropagate(
        &mut self,
        pass: ForwardPass,
        input: &Matrix,
        output: &Matrix,
        output_grad: &Matrix,
    ) -> Result<Matrix, LayerError> {
        match self {
            Self::LstmParallel(cell) => cell.backpropagate(pass, input, output, output_grad),
        }
    }
}
