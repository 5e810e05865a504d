//! Built-in demo module catalog.
//!
//! The kernel ships no business modules of its own; these exist so the demo
//! and scenario runner have something to route calls to.

use keystone_core::{Address, Env, FieldValue, KernelError, Module};
use std::sync::Arc;

pub const NAMES: &[&str] = &["counter-v1", "counter-v2", "governance-seed"];

pub fn demo_address(name: &str) -> Address {
    Address::derive(&format!("module/{name}"))
}

/// Instantiate a catalog module by name.
pub fn build(name: &str) -> Option<Arc<dyn Module>> {
    match name {
        "counter-v1" => Some(Arc::new(Counter)),
        "counter-v2" => Some(Arc::new(StrideCounter)),
        "governance-seed" => Some(Arc::new(GovernanceSeed)),
        _ => None,
    }
}

/// Increment a shared `count` field by one per call.
struct Counter;

impl Module for Counter {
    fn invoke(&self, env: &mut Env<'_>) -> Result<Vec<u8>, KernelError> {
        let state = env.state_mut();
        let slot = state.ensure_field("count", FieldValue::U64(0))?;
        let next = state.get_u64(slot)? + 1;
        state.set_u64(slot, next)?;
        Ok(next.to_le_bytes().to_vec())
    }
}

/// Second-generation counter over the same `count` field. The first payload
/// byte, when present, is the stride.
struct StrideCounter;

impl Module for StrideCounter {
    fn invoke(&self, env: &mut Env<'_>) -> Result<Vec<u8>, KernelError> {
        let stride = env.payload().first().copied().unwrap_or(1) as u64;
        let state = env.state_mut();
        let slot = state.ensure_field("count", FieldValue::U64(0))?;
        let next = state.get_u64(slot)? + stride;
        state.set_u64(slot, next)?;
        Ok(next.to_le_bytes().to_vec())
    }
}

/// Seed governance fields from a JSON init payload.
struct GovernanceSeed;

impl Module for GovernanceSeed {
    fn invoke(&self, env: &mut Env<'_>) -> Result<Vec<u8>, KernelError> {
        let raw: serde_json::Value = serde_json::from_slice(env.payload())
            .map_err(|err| KernelError::Module(format!("governance seed: {err}")))?;
        let threshold = raw
            .get("proposal_threshold")
            .and_then(|value| value.as_u64())
            .ok_or_else(|| {
                KernelError::Module("governance seed: missing proposal_threshold".to_string())
            })?;
        let state = env.state_mut();
        let slot = state.ensure_field("proposal_threshold", FieldValue::U64(0))?;
        state.set_u64(slot, threshold)?;
        Ok(Vec::new())
    }
}
