//! Property tests: the selector directory stays bidirectionally consistent
//! under arbitrary operation sequences, and failed operations change nothing.

use keystone_core::{Address, Selector, SelectorRegistry};
use proptest::prelude::*;
use std::collections::HashMap;

const SELECTOR_POOL: usize = 8;
const MODULE_POOL: usize = 4;

fn selector_at(index: usize) -> Selector {
    Selector::from_bytes([0xc0, 0, 0, index as u8])
}

fn module_at(index: usize) -> Address {
    Address::derive(&format!("module/prop-{index}"))
}

#[derive(Clone, Debug)]
enum Op {
    Bind(usize, Vec<usize>),
    Rebind(usize, Vec<usize>),
    Unbind(Vec<usize>),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let selectors = prop::collection::vec(0..SELECTOR_POOL, 1..4);
    prop_oneof![
        (0..MODULE_POOL, selectors.clone()).prop_map(|(m, s)| Op::Bind(m, s)),
        (0..MODULE_POOL, selectors.clone()).prop_map(|(m, s)| Op::Rebind(m, s)),
        selectors.prop_map(Op::Unbind),
    ]
}

fn apply(registry: &mut SelectorRegistry, op: &Op) -> Result<(), keystone_core::KernelError> {
    match op {
        Op::Bind(module, selectors) => {
            let selectors: Vec<Selector> = selectors.iter().map(|&i| selector_at(i)).collect();
            registry.bind(module_at(*module), &selectors)
        }
        Op::Rebind(module, selectors) => {
            let selectors: Vec<Selector> = selectors.iter().map(|&i| selector_at(i)).collect();
            registry.rebind(module_at(*module), &selectors)
        }
        Op::Unbind(selectors) => {
            let selectors: Vec<Selector> = selectors.iter().map(|&i| selector_at(i)).collect();
            registry.unbind(&selectors)
        }
    }
}

/// Mirror the operation into a plain selector-to-module map.
fn apply_to_model(model: &mut HashMap<Selector, Address>, op: &Op) {
    match op {
        Op::Bind(module, selectors) | Op::Rebind(module, selectors) => {
            for &index in selectors {
                model.insert(selector_at(index), module_at(*module));
            }
        }
        Op::Unbind(selectors) => {
            for &index in selectors {
                model.remove(&selector_at(index));
            }
        }
    }
}

proptest! {
    #[test]
    fn operation_sequences_preserve_consistency(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut registry = SelectorRegistry::new();
        let mut model: HashMap<Selector, Address> = HashMap::new();

        for op in &ops {
            let before = registry.clone();
            match apply(&mut registry, op) {
                Ok(()) => apply_to_model(&mut model, op),
                // A rejected operation must leave the directory untouched.
                Err(_) => prop_assert_eq!(&registry, &before),
            }

            if let Err(violation) = registry.check_consistency() {
                prop_assert!(false, "inconsistent directory: {}", violation);
            }

            for index in 0..SELECTOR_POOL {
                let selector = selector_at(index);
                prop_assert_eq!(registry.lookup(selector), model.get(&selector).copied());
            }
        }

        prop_assert_eq!(registry.selector_count(), model.len());
    }

    #[test]
    fn module_list_matches_live_bindings(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut registry = SelectorRegistry::new();
        for op in &ops {
            let _ = apply(&mut registry, op);
        }

        // Exactly the modules with at least one selector are listed.
        for index in 0..MODULE_POOL {
            let module = module_at(index);
            let listed = registry.modules().contains(&module);
            let owns_any = !registry.selectors_of(module).is_empty();
            prop_assert_eq!(listed, owns_any);
        }
    }
}
