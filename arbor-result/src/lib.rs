//! Error and result types shared across the arbor workspace.
//!
//! One error enum covers every failure mode, so errors propagate across
//! crate boundaries with `?` and callers can still match on the specific
//! kind. Transport-level codes that have no dedicated variant travel as
//! [`Error::Transport`].

pub mod error;
pub mod result;

pub use error::{Error, NO_SUCH_GROUP};
pub use result::Result;
