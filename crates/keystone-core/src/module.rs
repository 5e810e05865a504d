use crate::error::KernelError;
use crate::registry::SelectorRegistry;
use crate::selector::{Address, Selector};
use crate::state::SharedState;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maximum nesting for in-context calls.
pub const MAX_CALL_DEPTH: u32 = 16;

/// A stateless behavior unit routed by the kernel.
///
/// Implementations hold no persistent state of their own; everything durable
/// lives in the [`SharedState`] handed to each invocation through [`Env`].
/// Swapping the binding for a selector changes behavior on the next call
/// without touching that state.
pub trait Module: Send + Sync {
    fn invoke(&self, env: &mut Env<'_>) -> Result<Vec<u8>, KernelError>;
}

/// Installed module code, addressed by module address.
///
/// Installation is separate from selector binding: code present here is
/// routable only once a mutation batch binds selectors to its address.
#[derive(Clone, Default)]
pub struct ModuleStore {
    modules: HashMap<Address, Arc<dyn Module>>,
}

impl ModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, address: Address, module: Arc<dyn Module>) {
        self.modules.insert(address, module);
    }

    pub fn contains(&self, address: Address) -> bool {
        self.modules.contains_key(&address)
    }

    pub fn get(&self, address: Address) -> Option<Arc<dyn Module>> {
        self.modules.get(&address).cloned()
    }
}

/// One open invocation window.
///
/// The module behind a dispatched selector runs against the kernel's own
/// shared record and under the original external caller's identity; both are
/// threaded through nested calls unchanged. The registry reachable from here
/// is read-only: rewriting it mid-window is rejected.
pub struct Env<'a> {
    state: &'a mut SharedState,
    registry: &'a SelectorRegistry,
    modules: &'a ModuleStore,
    mutation_selector: Selector,
    caller: Address,
    selector: Selector,
    payload: &'a [u8],
    depth: u32,
}

impl<'a> Env<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        state: &'a mut SharedState,
        registry: &'a SelectorRegistry,
        modules: &'a ModuleStore,
        mutation_selector: Selector,
        caller: Address,
        selector: Selector,
        payload: &'a [u8],
    ) -> Self {
        Self {
            state,
            registry,
            modules,
            mutation_selector,
            caller,
            selector,
            payload,
            depth: 1,
        }
    }

    /// The shared record, writable in place.
    pub fn state_mut(&mut self) -> &mut SharedState {
        self.state
    }

    pub fn state(&self) -> &SharedState {
        self.state
    }

    /// The original external caller. Never the kernel, never another module.
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// The selector this invocation was routed by.
    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn payload(&self) -> &[u8] {
        self.payload
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Resolve a selector against the committed directory.
    pub fn resolve(&self, selector: Selector) -> Option<Address> {
        self.registry.lookup(selector)
    }

    /// Nested in-context call.
    ///
    /// The callee runs against the same shared record and sees the same
    /// original caller. The directory's own mutation operation cannot be
    /// reached from inside a window: the directory may not change while a
    /// routed call is mid-flight.
    pub fn call(&mut self, selector: Selector, payload: &[u8]) -> Result<Vec<u8>, KernelError> {
        if selector == self.mutation_selector {
            return Err(KernelError::ReentrantMutation);
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(KernelError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        let module_address = self
            .registry
            .lookup(selector)
            .ok_or(KernelError::FunctionNotFound(selector))?;
        let module = self
            .modules
            .get(module_address)
            .ok_or(KernelError::InvalidTarget(module_address))?;
        debug!(%selector, module = %module_address, depth = self.depth + 1, "nested call");
        let mut nested = Env {
            state: &mut *self.state,
            registry: self.registry,
            modules: self.modules,
            mutation_selector: self.mutation_selector,
            caller: self.caller,
            selector,
            payload,
            depth: self.depth + 1,
        };
        module.invoke(&mut nested)
    }
}
