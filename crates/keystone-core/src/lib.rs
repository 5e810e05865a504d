//! Runtime module-dispatch kernel.
//!
//! One logical entry point routes inbound calls to independently installed
//! behavior modules by hash-derived selector, while every module operates on
//! a single shared, append-only state record. Modules can be added, replaced,
//! or removed at runtime through atomic mutation batches without redeploying
//! the entry point and without losing accumulated state.

#![deny(unsafe_code)]

pub mod audit;
pub mod error;
pub mod introspection;
pub mod kernel;
pub mod module;
pub mod mutator;
pub mod registry;
pub mod selector;
pub mod state;

pub use audit::{AuditKind, AuditLog, AuditRecord, BatchAudit, OperationAudit};
pub use error::{KernelError, StateError};
pub use introspection::ModuleReport;
pub use kernel::{DispatchKernel, MUTATION_SIGNATURE};
pub use module::{Env, Module, ModuleStore, MAX_CALL_DEPTH};
pub use mutator::{InitCall, MutationBatch, MutationOp, OpKind};
pub use registry::{Binding, SelectorRegistry};
pub use selector::{Address, ParseHexError, Selector};
pub use state::{
    FieldDef, FieldKind, FieldSlot, FieldValue, SharedState, StateSchema, StateSnapshot,
};
