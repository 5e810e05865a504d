use crate::audit::AuditLog;
use crate::error::KernelError;
use crate::module::{Env, Module, ModuleStore};
use crate::mutator::MutationBatch;
use crate::registry::SelectorRegistry;
use crate::selector::{Address, Selector};
use crate::state::SharedState;
use std::sync::Arc;
use tracing::debug;

/// Declared signature of the kernel's own mutation operation. Its selector
/// is bound at construction time, so the directory can rewrite itself from
/// the very first call.
pub const MUTATION_SIGNATURE: &str = "applyMutation(operations,initModule,initPayload)";

/// The single entry point.
///
/// Owns the shared record, the selector directory, the installed module
/// code, and the audit chain. Every public operation runs to completion,
/// either committing or rolling back in full, before the next is observed;
/// all entry points take `&mut self`, so two calls can never interleave.
pub struct DispatchKernel {
    pub(crate) address: Address,
    pub(crate) admin: Address,
    pub(crate) mutation_selector: Selector,
    pub(crate) registry: SelectorRegistry,
    pub(crate) modules: ModuleStore,
    pub(crate) state: SharedState,
    pub(crate) audit: AuditLog,
}

impl DispatchKernel {
    /// Create a kernel administered by `admin`. The directory starts with a
    /// single binding: the mutation operation, bound to the kernel itself.
    pub fn new(admin: Address) -> Self {
        let address = Address::derive("keystone/kernel");
        let mutation_selector = Selector::from_signature(MUTATION_SIGNATURE);
        let mut registry = SelectorRegistry::new();
        registry
            .bind(address, &[mutation_selector])
            .expect("empty directory accepts the bootstrap binding");
        Self {
            address,
            admin,
            mutation_selector,
            registry,
            modules: ModuleStore::new(),
            state: SharedState::new(),
            audit: AuditLog::new(),
        }
    }

    /// The kernel's own address, owner of the bootstrap binding.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn administrator(&self) -> Address {
        self.admin
    }

    /// Selector of the mutation operation.
    pub fn mutation_selector(&self) -> Selector {
        self.mutation_selector
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Host-side access to the shared record, e.g. for seeding genesis
    /// fields or taking snapshots. Routed calls go through [`Self::dispatch`].
    pub fn state_mut(&mut self) -> &mut SharedState {
        &mut self.state
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Install module code at an address. Installation alone routes
    /// nothing; a mutation batch must bind selectors to the address.
    pub fn install_module(
        &mut self,
        address: Address,
        module: Arc<dyn Module>,
    ) -> Result<(), KernelError> {
        if address.is_zero() || address == self.address {
            return Err(KernelError::InvalidTarget(address));
        }
        self.modules.install(address, module);
        Ok(())
    }

    /// Route one inbound call.
    ///
    /// The bound module runs in-context: it writes the kernel's shared
    /// record directly and sees `caller` as the invoking identity. The
    /// whole call is atomic; on any failure the record is restored to its
    /// pre-call contents, including writes made before the failure point.
    pub fn dispatch(
        &mut self,
        caller: Address,
        selector: Selector,
        payload: &[u8],
    ) -> Result<Vec<u8>, KernelError> {
        if selector == self.mutation_selector {
            let batch: MutationBatch = serde_json::from_slice(payload)
                .map_err(|err| KernelError::BatchCodec(err.to_string()))?;
            self.apply_mutation(caller, batch)?;
            return Ok(Vec::new());
        }

        let module_address = self
            .registry
            .lookup(selector)
            .ok_or(KernelError::FunctionNotFound(selector))?;
        let module = self
            .modules
            .get(module_address)
            .ok_or(KernelError::InvalidTarget(module_address))?;
        debug!(%caller, %selector, module = %module_address, "dispatching");

        let checkpoint = self.state.clone();
        let outcome = {
            let mut env = Env::new(
                &mut self.state,
                &self.registry,
                &self.modules,
                self.mutation_selector,
                caller,
                selector,
                payload,
            );
            module.invoke(&mut env)
        };
        match outcome {
            Ok(output) => Ok(output),
            Err(err) => {
                self.state = checkpoint;
                debug!(%selector, error = %err, "dispatch rolled back");
                Err(err)
            }
        }
    }
}
