use crate::selector::{Address, Selector};
use crate::state::FieldKind;
use thiserror::Error;

/// Shared-state access and snapshot errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field}' holds {actual}, not {expected}")]
    KindMismatch {
        field: String,
        expected: FieldKind,
        actual: FieldKind,
    },

    #[error("field '{0}' is already defined")]
    DuplicateField(String),

    #[error("snapshot digest does not match its contents")]
    SnapshotIntegrity,

    #[error("snapshot layout is incompatible: {0}")]
    SnapshotIncompatible(String),
}

/// Kernel errors. Every variant aborts the enclosing call or batch as a
/// whole; previously committed state is never touched by a rejected call.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no module bound for selector {0}")]
    FunctionNotFound(Selector),

    #[error("caller {0} is not the administrator")]
    Unauthorized(Address),

    #[error("selector {0} is already registered")]
    DuplicateRegistration(Selector),

    #[error("selector {0} is not registered")]
    NotFound(Selector),

    #[error("selector {0} is already bound to the replacement module")]
    NoOpReplace(Selector),

    #[error("invalid target module {0}")]
    InvalidTarget(Address),

    #[error("selector {0} is reserved and cannot be rebound or removed")]
    ProtectedSelector(Selector),

    #[error("initialization call failed: {0}")]
    InitializationFailed(String),

    #[error("registry mutation attempted inside an open invocation window")]
    ReentrantMutation,

    #[error("operation for module {0} names no selectors")]
    EmptySelectorSet(Address),

    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(u32),

    #[error("malformed mutation payload: {0}")]
    BatchCodec(String),

    #[error("module failure: {0}")]
    Module(String),

    #[error(transparent)]
    State(#[from] StateError),
}
