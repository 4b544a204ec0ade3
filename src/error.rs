use thiserror::Error;

use crate::backend::Primitive;
use crate::ordering::Ordering;

/// The kind of atomic access an [`Ordering`] was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Store,
    /// The reload performed when a compare-exchange fails.
    FailureLoad,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Load => "load",
            Operation::Store => "store",
            Operation::FailureLoad => "compare-exchange failure load",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The ordering has no meaning for the operation, e.g. `Release` on a load.
    /// This is a programmer error; the cell types panic with this message.
    #[error("{ordering:?} ordering is not valid for an atomic {op}")]
    InvalidOrdering { op: Operation, ordering: Ordering },

    /// A failure ordering stronger than what the success ordering reads with.
    #[error("failure ordering {failure:?} is stronger than success ordering {success:?}")]
    FailureStronger { success: Ordering, failure: Ordering },

    /// The backend neither implements `primitive` nor provides what is needed
    /// to synthesize it.
    #[error("backend `{backend}` cannot provide {primitive}")]
    Unsupported {
        backend: &'static str,
        primitive: Primitive,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Aborts the current operation on a contract violation.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn violated(err: Error) -> ! {
    panic!("{}", err)
}
