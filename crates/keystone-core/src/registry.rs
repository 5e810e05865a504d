use crate::error::KernelError;
use crate::selector::{Address, Selector};
use std::collections::HashMap;

/// Routing entry for one selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub module: Address,
    /// Index of the selector within its module's selector list. Kept exact
    /// by swap-with-last removal.
    pub position: u32,
}

/// Authoritative selector directory: the forward selector-to-module map plus
/// the per-module selector lists and the module list, all kept mutually
/// consistent.
///
/// Operations are all-or-nothing: a failing call leaves the directory
/// exactly as it was.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectorRegistry {
    bindings: HashMap<Selector, Binding>,
    selectors_by_module: HashMap<Address, Vec<Selector>>,
    modules: Vec<Address>,
    module_positions: HashMap<Address, u32>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, selector: Selector) -> Option<Address> {
        self.bindings.get(&selector).map(|binding| binding.module)
    }

    pub fn is_bound(&self, selector: Selector) -> bool {
        self.bindings.contains_key(&selector)
    }

    pub fn selectors_of(&self, module: Address) -> &[Selector] {
        self.selectors_by_module
            .get(&module)
            .map(|list| list.as_slice())
            .unwrap_or_default()
    }

    /// Modules currently owning at least one selector, in list order.
    pub fn modules(&self) -> &[Address] {
        &self.modules
    }

    pub fn selector_count(&self) -> usize {
        self.bindings.len()
    }

    /// Bind each selector to `module`. Fails on the sentinel and on any
    /// selector that is already bound.
    pub fn bind(&mut self, module: Address, selectors: &[Selector]) -> Result<(), KernelError> {
        if module.is_zero() {
            return Err(KernelError::InvalidTarget(module));
        }
        let mut staged = self.clone();
        for &selector in selectors {
            staged.bind_one(module, selector)?;
        }
        *self = staged;
        Ok(())
    }

    /// Move each selector from its current module to `module`. Fails on
    /// unbound selectors and on selectors already owned by `module`.
    pub fn rebind(&mut self, module: Address, selectors: &[Selector]) -> Result<(), KernelError> {
        if module.is_zero() {
            return Err(KernelError::InvalidTarget(module));
        }
        let mut staged = self.clone();
        for &selector in selectors {
            match staged.bindings.get(&selector) {
                None => return Err(KernelError::NotFound(selector)),
                Some(binding) if binding.module == module => {
                    return Err(KernelError::NoOpReplace(selector));
                }
                Some(_) => {}
            }
            staged.unbind_one(selector)?;
            staged.bind_one(module, selector)?;
        }
        *self = staged;
        Ok(())
    }

    /// Drop each selector's binding. Fails on unbound selectors.
    pub fn unbind(&mut self, selectors: &[Selector]) -> Result<(), KernelError> {
        let mut staged = self.clone();
        for &selector in selectors {
            staged.unbind_one(selector)?;
        }
        *self = staged;
        Ok(())
    }

    fn bind_one(&mut self, module: Address, selector: Selector) -> Result<(), KernelError> {
        if self.bindings.contains_key(&selector) {
            return Err(KernelError::DuplicateRegistration(selector));
        }
        let list = self.selectors_by_module.entry(module).or_default();
        if list.is_empty() {
            self.module_positions
                .insert(module, self.modules.len() as u32);
            self.modules.push(module);
        }
        let position = list.len() as u32;
        list.push(selector);
        self.bindings.insert(selector, Binding { module, position });
        Ok(())
    }

    fn unbind_one(&mut self, selector: Selector) -> Result<(), KernelError> {
        let binding = self
            .bindings
            .remove(&selector)
            .ok_or(KernelError::NotFound(selector))?;
        let list = self
            .selectors_by_module
            .get_mut(&binding.module)
            .expect("bound selector has a module list");

        // Swap-with-last: the final selector takes the vacated slot and its
        // stored position is fixed up, then the list shrinks by one.
        let removed = binding.position as usize;
        let last = list.len() - 1;
        if removed != last {
            let moved = list[last];
            list[removed] = moved;
            self.bindings
                .get_mut(&moved)
                .expect("moved selector is bound")
                .position = removed as u32;
        }
        list.pop();

        if list.is_empty() {
            self.selectors_by_module.remove(&binding.module);
            self.remove_module(binding.module);
        }
        Ok(())
    }

    /// Swap-with-last removal on the module list itself.
    fn remove_module(&mut self, module: Address) {
        let Some(position) = self.module_positions.remove(&module) else {
            return;
        };
        let position = position as usize;
        let last = self.modules.len() - 1;
        if position != last {
            let moved = self.modules[last];
            self.modules[position] = moved;
            self.module_positions.insert(moved, position as u32);
        }
        self.modules.pop();
    }

    /// Verify the cross-index consistency of the directory. Used by tests;
    /// a violation message names the first broken link found.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (selector, binding) in &self.bindings {
            let list = self
                .selectors_by_module
                .get(&binding.module)
                .ok_or_else(|| format!("binding for {selector} has no module list"))?;
            let position = binding.position as usize;
            if list.get(position) != Some(selector) {
                return Err(format!("stored position of {selector} is stale"));
            }
        }
        for (module, list) in &self.selectors_by_module {
            if list.is_empty() {
                return Err(format!("module {module} owns an empty selector list"));
            }
            for (index, selector) in list.iter().enumerate() {
                match self.bindings.get(selector) {
                    Some(binding) if binding.module == *module => {
                        if binding.position as usize != index {
                            return Err(format!("position of {selector} disagrees with its list"));
                        }
                    }
                    _ => return Err(format!("{selector} listed under {module} but not bound to it")),
                }
            }
            let position = self
                .module_positions
                .get(module)
                .copied()
                .ok_or_else(|| format!("module {module} has no list position"))?;
            if self.modules.get(position as usize) != Some(module) {
                return Err(format!("module position of {module} is stale"));
            }
        }
        if self.modules.len() != self.selectors_by_module.len() {
            return Err("module list and selector lists disagree".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(byte: u8) -> Selector {
        Selector::from_bytes([byte, 0, 0, 0])
    }

    #[test]
    fn bind_and_lookup() {
        let mut registry = SelectorRegistry::new();
        let module = Address::derive("module-a");
        registry.bind(module, &[sel(1), sel(2)]).unwrap();
        assert_eq!(registry.lookup(sel(1)), Some(module));
        assert_eq!(registry.lookup(sel(2)), Some(module));
        assert_eq!(registry.modules(), &[module]);
        registry.check_consistency().unwrap();
    }

    #[test]
    fn duplicate_bind_leaves_registry_untouched() {
        let mut registry = SelectorRegistry::new();
        let a = Address::derive("module-a");
        let b = Address::derive("module-b");
        registry.bind(a, &[sel(1)]).unwrap();

        let before = registry.clone();
        let err = registry.bind(b, &[sel(9), sel(1)]).unwrap_err();
        assert!(matches!(err, KernelError::DuplicateRegistration(_)));
        assert_eq!(registry, before);
    }

    #[test]
    fn sentinel_module_rejected() {
        let mut registry = SelectorRegistry::new();
        assert!(matches!(
            registry.bind(Address::ZERO, &[sel(1)]),
            Err(KernelError::InvalidTarget(_))
        ));
    }

    #[test]
    fn rebind_moves_only_named_selectors() {
        let mut registry = SelectorRegistry::new();
        let a = Address::derive("module-a");
        let b = Address::derive("module-b");
        registry.bind(a, &[sel(1), sel(2)]).unwrap();
        registry.rebind(b, &[sel(1)]).unwrap();
        assert_eq!(registry.lookup(sel(1)), Some(b));
        assert_eq!(registry.lookup(sel(2)), Some(a));
        registry.check_consistency().unwrap();
    }

    #[test]
    fn rebind_to_current_owner_is_rejected() {
        let mut registry = SelectorRegistry::new();
        let a = Address::derive("module-a");
        registry.bind(a, &[sel(1)]).unwrap();
        assert!(matches!(
            registry.rebind(a, &[sel(1)]),
            Err(KernelError::NoOpReplace(_))
        ));
    }

    #[test]
    fn unbind_uses_swap_with_last() {
        let mut registry = SelectorRegistry::new();
        let module = Address::derive("module-a");
        registry.bind(module, &[sel(1), sel(2), sel(3)]).unwrap();
        registry.unbind(&[sel(1)]).unwrap();

        // The last selector moved into the vacated slot.
        assert_eq!(registry.selectors_of(module), &[sel(3), sel(2)]);
        assert_eq!(registry.lookup(sel(1)), None);
        registry.check_consistency().unwrap();
    }

    #[test]
    fn module_leaves_list_when_emptied() {
        let mut registry = SelectorRegistry::new();
        let a = Address::derive("module-a");
        let b = Address::derive("module-b");
        registry.bind(a, &[sel(1)]).unwrap();
        registry.bind(b, &[sel(2)]).unwrap();
        registry.unbind(&[sel(1)]).unwrap();
        assert_eq!(registry.modules(), &[b]);
        assert!(registry.selectors_of(a).is_empty());
        registry.check_consistency().unwrap();
    }

    #[test]
    fn unbind_unknown_selector_fails_whole_call() {
        let mut registry = SelectorRegistry::new();
        let a = Address::derive("module-a");
        registry.bind(a, &[sel(1), sel(2)]).unwrap();

        let before = registry.clone();
        let err = registry.unbind(&[sel(1), sel(9)]).unwrap_err();
        assert!(matches!(err, KernelError::NotFound(_)));
        assert_eq!(registry, before);
    }
}
