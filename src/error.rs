/// Error types that can occur during layer operations
///
/// # Variants
///
/// - `ShapeMismatch` - indicates the rows/columns of an input, gradient, or parameter matrix do not match what the layer expects
/// - `InvalidState` - indicates an operation was invoked out of order, such as a backward pass without a matching forward pass
/// - `InvalidConfig` - indicates a layer description is malformed (non-positive dimensions, inconsistent weight shapes, bad hyperparameters)
/// - `AllocationFailed` - indicates a propagation buffer could not be sized; the operation is aborted and buffer contents are unspecified
#[derive(Debug, Clone, PartialEq)]
pub enum LayerError {
    ShapeMismatch(String),
    InvalidState(String),
    InvalidConfig(String),
    AllocationFailed(String),
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            LayerError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            LayerError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            LayerError::AllocationFailed(msg) => write!(f, "Allocation failed: {}", msg),
        }
    }
}

/// Implements the standard error trait for LayerError
impl std::error::Error for LayerError {}
