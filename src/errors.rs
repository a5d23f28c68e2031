use core::fmt;

/// Errors surfaced by transactional operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmError {
    /// The transaction observed a conflicting commit or a held lock and has
    /// aborted. The handle is dead; retry with a fresh transaction.
    Conflict,
    /// The allocator could not satisfy a region or segment request. Not a
    /// transactional abort: after `Nomem` from `alloc` the transaction is
    /// still usable.
    Nomem,
}

impl fmt::Display for TmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TmError::Conflict => write!(f, "transaction aborted on conflict"),
            TmError::Nomem => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for TmError {}
