use crate::error::LayerError;
use crate::recurrent::cell::CellKind;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Textual description of a recurrent cell, as produced by an external
/// model builder or serializer.
///
/// A description carries the cell variant, its dimensions and training
/// hyperparameters, and optionally a full set of initial parameter values.
/// When no initial values are supplied the cell draws them from a uniform
/// distribution, seeded through `seed` when reproducibility matters.
///
/// # Fields
///
/// - `kind` - Cell variant to construct
/// - `input_dim` - Width of each input frame
/// - `cell_dim` - Cell width; the layer outputs `cell_dim` channels per frame
/// - `momentum` - Gradient accumulator blending factor, in `[0, 1)`
/// - `mask_padded_frames` - When true, frames past a stream's valid length are zeroed as they are produced instead of propagating through time
/// - `seed` - Seed for random parameter initialization
/// - `weights` - Explicit initial parameter values overriding random initialization
///
/// # Example
/// ```rust
/// use streamcell::recurrent::{CellConfig, CellKind};
///
/// let config = CellConfig::from_json(
///     r#"{ "kind": "lstm_parallel", "input_dim": 40, "cell_dim": 320, "momentum": 0.9 }"#,
/// ).unwrap();
/// assert_eq!(config.kind, CellKind::LstmParallel);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellConfig {
    pub kind: CellKind,
    pub input_dim: usize,
    pub cell_dim: usize,
    #[serde(default)]
    pub momentum: f32,
    #[serde(default)]
    pub mask_padded_frames: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub weights: Option<InitialWeights>,
}

/// Explicit initial parameter values for a recurrent cell.
///
/// Matrices are stored row by row. For a cell of width `H` over inputs of
/// width `D`, `input_weights` must be `4H` rows of `D` values,
/// `recurrent_weights` `4H` rows of `H` values, `bias` `4H` values, and each
/// peephole vector `H` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialWeights {
    pub input_weights: Vec<Vec<f32>>,
    pub recurrent_weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub peephole_input: Vec<f32>,
    pub peephole_forget: Vec<f32>,
    pub peephole_output: Vec<f32>,
}

impl CellConfig {
    /// Creates a description with default hyperparameters and random
    /// initialization.
    ///
    /// # Parameters
    ///
    /// - `kind` - Cell variant to construct
    /// - `input_dim` - Width of each input frame
    /// - `cell_dim` - Cell width
    pub fn new(kind: CellKind, input_dim: usize, cell_dim: usize) -> Self {
        Self {
            kind,
            input_dim,
            cell_dim,
            momentum: 0.0,
            mask_padded_frames: false,
            seed: None,
            weights: None,
        }
    }

    /// Parses and validates a JSON description.
    ///
    /// # Errors
    ///
    /// * `LayerError::InvalidConfig` - if the text is not valid JSON or the
    ///   description fails [`CellConfig::validate`]
    pub fn from_json(text: &str) -> Result<Self, LayerError> {
        let config: Self = serde_json::from_str(text).map_err(|e| {
            LayerError::InvalidConfig(format!("failed to parse cell description: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON description from a reader.
    ///
    /// # Errors
    ///
    /// * `LayerError::InvalidConfig` - if reading or parsing fails, or the
    ///   description fails [`CellConfig::validate`]
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LayerError> {
        let config: Self = serde_json::from_reader(reader).map_err(|e| {
            LayerError::InvalidConfig(format!("failed to parse cell description: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the description is internally consistent.
    ///
    /// # Errors
    ///
    /// * `LayerError::InvalidConfig` - for non-positive dimensions, a
    ///   momentum outside `[0, 1)`, or initial weights whose shapes do not
    ///   match the declared dimensions
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.input_dim == 0 {
            return Err(LayerError::InvalidConfig(
                "input_dim must be greater than 0".to_string(),
            ));
        }
        if self.cell_dim == 0 {
            return Err(LayerError::InvalidConfig(
                "cell_dim must be greater than 0".to_string(),
            ));
        }
        if !self.momentum.is_finite() || !(0.0..1.0).contains(&self.momentum) {
            return Err(LayerError::InvalidConfig(format!(
                "momentum must lie in [0, 1), got {}",
                self.momentum
            )));
        }
        if let Some(weights) = &self.weights {
            weights.validate(self.input_dim, self.cell_dim)?;
        }
        Ok(())
    }
}

impl InitialWeights {
    fn validate(&self, input_dim: usize, cell_dim: usize) -> Result<(), LayerError> {
        check_matrix(
            &self.input_weights,
            4 * cell_dim,
            input_dim,
            "input_weights",
        )?;
        check_matrix(
            &self.recurrent_weights,
            4 * cell_dim,
            cell_dim,
            "recurrent_weights",
        )?;
        check_vector(&self.bias, 4 * cell_dim, "bias")?;
        check_vector(&self.peephole_input, cell_dim, "peephole_input")?;
        check_vector(&self.peephole_forget, cell_dim, "peephole_forget")?;
        check_vector(&self.peephole_output, cell_dim, "peephole_output")?;
        Ok(())
    }

    pub(crate) fn decode(
        &self,
        input_dim: usize,
        cell_dim: usize,
    ) -> Result<DecodedWeights, LayerError> {
        self.validate(input_dim, cell_dim)?;
        Ok(DecodedWeights {
            input_weights: rows_to_matrix(&self.input_weights, input_dim),
            recurrent_weights: rows_to_matrix(&self.recurrent_weights, cell_dim),
            bias: Array1::from_vec(self.bias.clone()),
            peephole_input: Array1::from_vec(self.peephole_input.clone()),
            peephole_forget: Array1::from_vec(self.peephole_forget.clone()),
            peephole_output: Array1::from_vec(self.peephole_output.clone()),
        })
    }
}

/// Initial weights converted into their in-memory matrix shapes.
pub(crate) struct DecodedWeights {
    pub input_weights: Array2<f32>,
    pub recurrent_weights: Array2<f32>,
    pub bias: Array1<f32>,
    pub peephole_input: Array1<f32>,
    pub peephole_forget: Array1<f32>,
    pub peephole_output: Array1<f32>,
}

fn check_matrix(
    rows: &[Vec<f32>],
    expected_rows: usize,
    expected_cols: usize,
    name: &str,
) -> Result<(), LayerError> {
    if rows.len() != expected_rows {
        return Err(LayerError::InvalidConfig(format!(
            "{} must have {} rows, got {}",
            name,
            expected_rows,
            rows.len()
        )));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != expected_cols {
            return Err(LayerError::InvalidConfig(format!(
                "{} row {} must have {} values, got {}",
                name,
                i,
                expected_cols,
                row.len()
            )));
        }
    }
    Ok(())
}

fn check_vector(values: &[f32], expected_len: usize, name: &str) -> Result<(), LayerError> {
    if values.len() != expected_len {
        return Err(LayerError::InvalidConfig(format!(
            "{} must have {} values, got {}",
            name,
            expected_len,
            values.len()
        )));
    }
    Ok(())
}

fn rows_to_matrix(rows: &[Vec<f32>], cols: usize) -> Array2<f32> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    // shape is already validated
    Array2::from_shape_vec((rows.len(), cols), flat).expect("validated weight shape")
}
