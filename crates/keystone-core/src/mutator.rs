use crate::audit::OperationAudit;
use crate::error::KernelError;
use crate::kernel::DispatchKernel;
use crate::module::{Env, ModuleStore};
use crate::registry::SelectorRegistry;
use crate::selector::{Address, Selector};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Kind of one batch operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Add,
    Replace,
    Remove,
}

/// One ordered operation within a mutation batch.
///
/// Remove operations carry the sentinel as their target, signalling that the
/// named selectors get no new owner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MutationOp {
    pub target: Address,
    pub kind: OpKind,
    pub selectors: Vec<Selector>,
}

/// Optional one-shot initialization call executed after a batch applies,
/// typically to seed state fields a newly added module depends on.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitCall {
    pub module: Address,
    pub payload: Vec<u8>,
}

/// An ordered, all-or-nothing rewrite of the selector directory.
///
/// The JSON encoding of this type is also the dispatchable payload of the
/// mutation selector itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MutationBatch {
    pub operations: Vec<MutationOp>,
    pub init: Option<InitCall>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, target: Address, selectors: Vec<Selector>) -> Self {
        self.operations.push(MutationOp {
            target,
            kind: OpKind::Add,
            selectors,
        });
        self
    }

    pub fn replace(mut self, target: Address, selectors: Vec<Selector>) -> Self {
        self.operations.push(MutationOp {
            target,
            kind: OpKind::Replace,
            selectors,
        });
        self
    }

    pub fn remove(mut self, selectors: Vec<Selector>) -> Self {
        self.operations.push(MutationOp {
            target: Address::ZERO,
            kind: OpKind::Remove,
            selectors,
        });
        self
    }

    pub fn with_init(mut self, module: Address, payload: Vec<u8>) -> Self {
        self.init = Some(InitCall { module, payload });
        self
    }
}

impl DispatchKernel {
    /// Apply an ordered batch of Add, Replace, and Remove operations,
    /// optionally followed by one in-context initialization call.
    ///
    /// Operations run against a staged copy of the directory; the committed
    /// directory and the shared record change only once every operation and
    /// the init call have succeeded. Any failure leaves zero observable
    /// effect. Only the administrator may call this, and never from inside
    /// an open invocation window (nested attempts are cut off in
    /// [`Env::call`](crate::module::Env::call) before they reach here).
    pub fn apply_mutation(
        &mut self,
        caller: Address,
        batch: MutationBatch,
    ) -> Result<(), KernelError> {
        if caller != self.admin {
            return Err(KernelError::Unauthorized(caller));
        }

        let mut staged = self.registry.clone();
        for op in &batch.operations {
            apply_operation(&mut staged, &self.modules, self.mutation_selector, op)?;
        }

        if let Some(init) = &batch.init {
            self.run_init(&staged, caller, init)?;
        }

        let operations: Vec<OperationAudit> = batch
            .operations
            .iter()
            .map(|op| OperationAudit {
                kind: op.kind,
                target: op.target,
                selectors: op.selectors.clone(),
            })
            .collect();
        let init_module = batch.init.as_ref().map(|init| init.module);

        self.registry = staged;
        self.audit.append_batch(operations, init_module);
        info!(
            operations = batch.operations.len(),
            init = init_module.is_some(),
            "mutation batch committed"
        );
        Ok(())
    }

    /// Reassign the administrator. Only the current administrator may do
    /// this; the sentinel is not a valid administrator.
    pub fn transfer_administration(
        &mut self,
        caller: Address,
        new_admin: Address,
    ) -> Result<(), KernelError> {
        if caller != self.admin {
            return Err(KernelError::Unauthorized(caller));
        }
        if new_admin.is_zero() {
            return Err(KernelError::InvalidTarget(new_admin));
        }
        let previous = self.admin;
        self.admin = new_admin;
        self.audit.append_admin_transfer(previous, new_admin);
        info!(%previous, %new_admin, "administration transferred");
        Ok(())
    }

    /// Run the post-batch init call in-context against the staged directory.
    /// State writes are rolled back if the call fails.
    fn run_init(
        &mut self,
        staged: &SelectorRegistry,
        caller: Address,
        init: &InitCall,
    ) -> Result<(), KernelError> {
        let module = self
            .modules
            .get(init.module)
            .ok_or(KernelError::InvalidTarget(init.module))?;
        let checkpoint = self.state.clone();
        let outcome = {
            let mut env = Env::new(
                &mut self.state,
                staged,
                &self.modules,
                self.mutation_selector,
                caller,
                self.mutation_selector,
                &init.payload,
            );
            module.invoke(&mut env)
        };
        match outcome {
            Ok(_) => Ok(()),
            Err(err) => {
                self.state = checkpoint;
                Err(KernelError::InitializationFailed(err.to_string()))
            }
        }
    }
}

fn apply_operation(
    registry: &mut SelectorRegistry,
    modules: &ModuleStore,
    protected: Selector,
    op: &MutationOp,
) -> Result<(), KernelError> {
    if op.selectors.is_empty() {
        return Err(KernelError::EmptySelectorSet(op.target));
    }
    match op.kind {
        OpKind::Add => {
            if op.target.is_zero() || !modules.contains(op.target) {
                return Err(KernelError::InvalidTarget(op.target));
            }
            registry.bind(op.target, &op.selectors)
        }
        OpKind::Replace => {
            if op.target.is_zero() || !modules.contains(op.target) {
                return Err(KernelError::InvalidTarget(op.target));
            }
            if op.selectors.contains(&protected) {
                return Err(KernelError::ProtectedSelector(protected));
            }
            registry.rebind(op.target, &op.selectors)
        }
        OpKind::Remove => {
            if !op.target.is_zero() {
                return Err(KernelError::InvalidTarget(op.target));
            }
            if op.selectors.contains(&protected) {
                return Err(KernelError::ProtectedSelector(protected));
            }
            registry.unbind(&op.selectors)
        }
    }
}
