//! Error types for object emission.

use thiserror::Error;

/// Error type for object emission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjError {
    /// An `L32R` ended up too far from its literal slot for the 16-bit
    /// displacement field. Cannot happen for realistic inputs (the window
    /// is 256 KiB), so hitting this means the layout is corrupt.
    #[error("L32R displacement out of range for literal slot {lit}")]
    DisplacementOutOfRange { lit: usize },
}

/// Result type alias for object emission.
pub type Result<T> = std::result::Result<T, ObjError>;
