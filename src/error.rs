use core::error::Error;
use core::fmt::{self, Display, Formatter};

/// Recoverable memory-management failures.
///
/// Everything here is an ordinary value the caller unwinds from; invariant
/// violations (misaligned frees, remaps, missing required mappings) are
/// `panic!` at the detection site and never appear as a variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MmError {
    /// The free list is empty. The caller releases any partial state and
    /// reports failure upward; user-facing layers turn this into a failed
    /// system call, never a crash.
    AllocationExhausted,
    /// A user virtual address was absent or not user-accessible.
    BadUserAccess,
    /// A segment source delivered fewer bytes than asked for; the exec
    /// attempt is aborted, the process is otherwise unaffected.
    ShortRead,
    /// A requested user size reaches into the kernel half.
    BeyondUserRange,
}

impl Display for MmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MmError::AllocationExhausted => write!(f, "out of physical frames"),
            MmError::BadUserAccess => write!(f, "bad user address"),
            MmError::ShortRead => write!(f, "short read from segment source"),
            MmError::BeyondUserRange => write!(f, "user size reaches kernel base"),
        }
    }
}

impl Error for MmError {}

pub type Result<T> = core::result::Result<T, MmError>;
