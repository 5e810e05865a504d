use crate::kernel::DispatchKernel;
use crate::selector::{Address, Selector};
use serde::{Deserialize, Serialize};

/// One module and the selectors it currently owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: Address,
    pub selectors: Vec<Selector>,
}

/// Read-only queries over the committed directory.
///
/// Batches in flight stage their changes on a copy, so nothing here can
/// ever observe a partially applied rewrite.
impl DispatchKernel {
    /// Every module owning at least one selector, with its selectors.
    pub fn module_reports(&self) -> Vec<ModuleReport> {
        self.registry
            .modules()
            .iter()
            .map(|&module| ModuleReport {
                module,
                selectors: self.registry.selectors_of(module).to_vec(),
            })
            .collect()
    }

    /// Selectors currently owned by `module`. Empty for unknown modules.
    pub fn selectors_of(&self, module: Address) -> Vec<Selector> {
        self.registry.selectors_of(module).to_vec()
    }

    /// The module a selector routes to, if any.
    pub fn resolve(&self, selector: Selector) -> Option<Address> {
        self.registry.lookup(selector)
    }
}
