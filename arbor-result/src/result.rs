use crate::error::Error;

/// Result alias used throughout the arbor crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;
