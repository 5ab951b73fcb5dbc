use crate::error::LayerError;
use ndarray::{Array2, ArrayView2, ArrayViewMut2, s};

/// Number of per-cell units recorded in a propagation buffer: the four gate
/// pre-activations plus cell state, squashed cell state, and cell output.
pub const UNIT_COUNT: usize = 7;

/// Number of units filled by the batched pre-activation product (g, i, f, o).
pub const GATE_UNITS: usize = 4;

/// One of the seven per-channel unit slices of a [`SequenceBuffer`].
///
/// The column order is fixed by the recurrence equations and matches the
/// order in which the forward pass produces each unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Candidate input modulation (tanh-squashed)
    Modulation,
    /// Input gate (sigmoid-squashed)
    InputGate,
    /// Forget gate (sigmoid-squashed)
    ForgetGate,
    /// Output gate (sigmoid-squashed)
    OutputGate,
    /// Cell state
    CellState,
    /// Tanh-squashed cell state
    SquashedCell,
    /// Cell output, the value handed to the next layer
    CellOutput,
}

impl Unit {
    /// Index of this unit's column slice inside the buffer.
    pub fn index(self) -> usize {
        match self {
            Unit::Modulation => 0,
            Unit::InputGate => 1,
            Unit::ForgetGate => 2,
            Unit::OutputGate => 3,
            Unit::CellState => 4,
            Unit::SquashedCell => 5,
            Unit::CellOutput => 6,
        }
    }
}

/// Time-major scratch arena for one propagation pass over a batch of
/// parallel streams.
///
/// The buffer holds `(frames + 2) * streams` rows and `7 * cell_dim`
/// columns. Row block `t` (a contiguous group of `streams` rows) carries the
/// per-stream values of time step `t`. Row block 0 is the zero boundary
/// standing in for the state before the first frame; row block `frames + 1`
/// is the symmetric zero boundary the backward pass reads in place of a
/// future time step. Only row blocks `1..=frames` ever carry content.
///
/// The same geometry serves both directions: the forward pass stores unit
/// activations, the backward pass stores per-unit errors. Buffers are owned
/// by a layer instance and resized (reusing the allocation when the batch
/// geometry repeats) at the start of each pass.
#[derive(Debug, Clone)]
pub struct SequenceBuffer {
    data: Array2<f32>,
    frames: usize,
    streams: usize,
    cell_dim: usize,
}

impl SequenceBuffer {
    /// Creates an empty buffer. The first [`SequenceBuffer::reset`] sizes it.
    pub fn new() -> Self {
        Self {
            data: Array2::zeros((0, 0)),
            frames: 0,
            streams: 0,
            cell_dim: 0,
        }
    }

    /// Sizes the buffer for a batch of `frames` time steps over `streams`
    /// parallel sequences and zeroes every element.
    ///
    /// The previous allocation is reused when the requested geometry matches
    /// the current one.
    ///
    /// # Errors
    ///
    /// * `LayerError::AllocationFailed` - if the requested size is not
    ///   representable, before anything is allocated
    pub fn reset(
        &mut self,
        frames: usize,
        streams: usize,
        cell_dim: usize,
    ) -> Result<(), LayerError> {
        let rows = frames
            .checked_add(2)
            .and_then(|blocks| blocks.checked_mul(streams))
            .ok_or_else(|| {
                LayerError::AllocationFailed(format!(
                    "buffer row count overflows for {} frames over {} streams",
                    frames, streams
                ))
            })?;
        let cols = cell_dim.checked_mul(UNIT_COUNT).ok_or_else(|| {
            LayerError::AllocationFailed(format!(
                "buffer column count overflows for cell width {}",
                cell_dim
            ))
        })?;
        rows.checked_mul(cols)
            .filter(|&len| len <= isize::MAX as usize)
            .ok_or_else(|| {
                LayerError::AllocationFailed(format!(
                    "buffer of {} x {} elements is not representable",
                    rows, cols
                ))
            })?;

        if self.data.dim() == (rows, cols) {
            self.data.fill(0.0);
        } else {
            self.data = Array2::zeros((rows, cols));
        }
        self.frames = frames;
        self.streams = streams;
        self.cell_dim = cell_dim;
        Ok(())
    }

    /// Number of time steps the buffer is currently sized for.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of parallel streams the buffer is currently sized for.
    pub fn streams(&self) -> usize {
        self.streams
    }

    /// Cell width the buffer is currently sized for.
    pub fn cell_dim(&self) -> usize {
        self.cell_dim
    }

    /// Read-only view of the whole arena.
    pub fn as_matrix(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    fn rows(&self, first_block: usize, last_block: usize) -> (usize, usize) {
        debug_assert!(first_block <= last_block);
        debug_assert!(last_block <= self.frames + 1);
        (first_block * self.streams, (last_block + 1) * self.streams)
    }

    /// View of one unit slice at row block `t`.
    pub fn unit(&self, unit: Unit, t: usize) -> ArrayView2<'_, f32> {
        self.unit_span(unit, t, t)
    }

    /// Mutable view of one unit slice at row block `t`.
    pub fn unit_mut(&mut self, unit: Unit, t: usize) -> ArrayViewMut2<'_, f32> {
        self.unit_span_mut(unit, t, t)
    }

    /// View of one unit slice over row blocks `first_block..=last_block`.
    pub fn unit_span(
        &self,
        unit: Unit,
        first_block: usize,
        last_block: usize,
    ) -> ArrayView2<'_, f32> {
        let (r0, r1) = self.rows(first_block, last_block);
        let c0 = unit.index() * self.cell_dim;
        self.data.slice(s![r0..r1, c0..c0 + self.cell_dim])
    }

    /// Mutable view of one unit slice over row blocks `first_block..=last_block`.
    pub fn unit_span_mut(
        &mut self,
        unit: Unit,
        first_block: usize,
        last_block: usize,
    ) -> ArrayViewMut2<'_, f32> {
        let (r0, r1) = self.rows(first_block, last_block);
        let c0 = unit.index() * self.cell_dim;
        self.data.slice_mut(s![r0..r1, c0..c0 + self.cell_dim])
    }

    /// View of the combined g|i|f|o slice at row block `t`.
    pub fn gates(&self, t: usize) -> ArrayView2<'_, f32> {
        self.gate_span(t, t)
    }

    /// Mutable view of the combined g|i|f|o slice at row block `t`.
    pub fn gates_mut(&mut self, t: usize) -> ArrayViewMut2<'_, f32> {
        self.gate_span_mut(t, t)
    }

    /// View of the combined g|i|f|o slice over row blocks
    /// `first_block..=last_block`.
    pub fn gate_span(&self, first_block: usize, last_block: usize) -> ArrayView2<'_, f32> {
        let (r0, r1) = self.rows(first_block, last_block);
        self.data.slice(s![r0..r1, 0..GATE_UNITS * self.cell_dim])
    }

    /// Mutable view of the combined g|i|f|o slice over row blocks
    /// `first_block..=last_block`.
    pub fn gate_span_mut(
        &mut self,
        first_block: usize,
        last_block: usize,
    ) -> ArrayViewMut2<'_, f32> {
        let (r0, r1) = self.rows(first_block, last_block);
        self.data
            .slice_mut(s![r0..r1, 0..GATE_UNITS * self.cell_dim])
    }

    /// Zeroes every unit of one stream's row inside row block `t`.
    ///
    /// Used when padded frames past a stream's valid length are masked out.
    pub fn zero_stream_row(&mut self, t: usize, stream: usize) {
        debug_assert!(stream < self.streams);
        let row = t * self.streams + stream;
        self.data.row_mut(row).fill(0.0);
    }
}

impl Default for SequenceBuffer {
    fn default() -> Self {
        Self::new()
    }
}
