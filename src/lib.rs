//! Batched recurrent memory-cell layers for acoustic sequence labeling.
//!
//! The crate centers on one workhorse: a peephole LSTM layer that processes
//! several independent input sequences in lockstep ("parallel streams") so
//! that training and inference batch their matrix work across streams. It
//! provides forward activation propagation, backward error propagation
//! through time, and momentum-blended gradient accumulation; the parameter
//! update step belongs to an external optimizer.
//!
//! # Example
//! ```rust
//! use ndarray::Array2;
//! use streamcell::prelude::*;
//!
//! // A cell over 4-channel frames with 8 memory channels
//! let mut cell = LstmParallel::new(4, 8, 0.9, Some(1)).unwrap();
//!
//! // Three streams processed in lockstep, 6 frames each
//! cell.set_stream_lengths(vec![6, 6, 6]);
//! let input = Array2::ones((18, 4));
//!
//! let (output, pass) = cell.propagate(&input).unwrap();
//! let loss_grad = Array2::ones(output.dim());
//! let input_grad = cell.backpropagate(pass, &input, &output, &loss_grad).unwrap();
//! assert_eq!(input_grad.dim(), (18, 4));
//! ```

/// Error types shared by every layer operation.
pub mod error;

/// A convenience module that re-exports the most commonly used types and
/// traits from this crate.
pub mod prelude;

/// Recurrent layer implementations and their supporting pieces: the
/// propagation scratch buffer, elementwise nonlinearity kernels, cell
/// descriptions, and the parallel-stream LSTM itself.
pub mod recurrent;

/// Capability traits implemented by every concrete cell: [`traits::Layer`]
/// for shape and identity, [`traits::Trainable`] for parameter access, and
/// [`traits::Recurrent`] for batched propagation over parallel streams.
pub mod traits;

pub use error::LayerError;
