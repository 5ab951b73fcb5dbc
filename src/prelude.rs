pub use crate::error::LayerError;
pub use crate::recurrent::{
    CellConfig, CellKind, ForwardPass, InitialWeights, LayerGradient, LayerWeight, LstmParallel,
    Matrix, RecurrentCell,
};
pub use crate::traits::{Layer, Recurrent, Trainable};
