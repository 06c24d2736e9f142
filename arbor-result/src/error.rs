use thiserror::Error;

/// Transport code for a replica group that is permanently unreachable.
///
/// A group answering with this code is dropped from consideration; recovery
/// must not be attempted against it until the session re-adds it.
pub const NO_SUCH_GROUP: i32 = -6;

/// Unified error type for all arbor operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested page or key is absent from every replica that answered.
    #[error("not found")]
    NotFound,

    /// Every replica group rejected a write; the blob reached no group.
    #[error("all replica writes failed")]
    Io,

    /// A stored blob failed to decode.
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),

    /// Any other error code surfaced by the transport, preserved verbatim.
    #[error("transport error: {0}")]
    Transport(i32),
}

impl Error {
    /// True when the transport reported the group as permanently gone.
    #[inline]
    pub fn is_group_gone(&self) -> bool {
        matches!(self, Error::Transport(code) if *code == NO_SUCH_GROUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_gone_matches_only_the_reserved_code() {
        assert!(Error::Transport(NO_SUCH_GROUP).is_group_gone());
        assert!(!Error::Transport(-5).is_group_gone());
        assert!(!Error::NotFound.is_group_gone());
    }
}
