//! Scripted kernel sessions: the built-in demo walkthrough and JSON
//! scenario files.

use crate::modules;
use anyhow::{bail, Context};
use keystone_core::{Address, DispatchKernel, MutationBatch, Selector};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub admin: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Install {
        module: String,
    },
    Mutate {
        operations: Vec<OperationSpec>,
        #[serde(default)]
        init: Option<InitSpec>,
    },
    Dispatch {
        caller: String,
        signature: String,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Inspect,
    Audit,
}

#[derive(Debug, Deserialize)]
pub struct OperationSpec {
    pub kind: OperationKind,
    /// Catalog module name. Omitted for remove operations.
    #[serde(default)]
    pub module: Option<String>,
    pub signatures: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Replace,
    Remove,
}

#[derive(Debug, Deserialize)]
pub struct InitSpec {
    pub module: String,
    pub payload: serde_json::Value,
}

fn account_address(name: &str) -> Address {
    Address::derive(&format!("account/{name}"))
}

fn selectors_for(signatures: &[String]) -> Vec<Selector> {
    signatures
        .iter()
        .map(|signature| Selector::from_signature(signature))
        .collect()
}

/// Execute a scenario file against a fresh kernel.
pub fn run_file(path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read(path)
        .with_context(|| format!("reading scenario file {}", path.display()))?;
    let scenario: Scenario = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing scenario file {}", path.display()))?;
    run(scenario)
}

fn run(scenario: Scenario) -> anyhow::Result<()> {
    let admin = account_address(&scenario.admin);
    let mut kernel = DispatchKernel::new(admin);
    info!(%admin, "kernel created");

    for (index, step) in scenario.steps.iter().enumerate() {
        execute_step(&mut kernel, admin, step)
            .with_context(|| format!("scenario step {}", index + 1))?;
    }
    Ok(())
}

fn execute_step(
    kernel: &mut DispatchKernel,
    admin: Address,
    step: &Step,
) -> anyhow::Result<()> {
    match step {
        Step::Install { module } => {
            let code = modules::build(module)
                .with_context(|| format!("unknown catalog module '{module}'"))?;
            kernel.install_module(modules::demo_address(module), code)?;
            println!("installed {module} at {}", modules::demo_address(module));
        }
        Step::Mutate { operations, init } => {
            let mut batch = MutationBatch::new();
            for op in operations {
                let selectors = selectors_for(&op.signatures);
                batch = match op.kind {
                    OperationKind::Add | OperationKind::Replace => {
                        let name = op.module.as_deref().with_context(|| {
                            "add/replace operations need a module name".to_string()
                        })?;
                        if modules::build(name).is_none() {
                            bail!("unknown catalog module '{name}'");
                        }
                        let target = modules::demo_address(name);
                        match op.kind {
                            OperationKind::Add => batch.add(target, selectors),
                            _ => batch.replace(target, selectors),
                        }
                    }
                    OperationKind::Remove => batch.remove(selectors),
                };
            }
            if let Some(init) = init {
                let payload = serde_json::to_vec(&init.payload)?;
                batch = batch.with_init(modules::demo_address(&init.module), payload);
            }
            kernel.apply_mutation(admin, batch)?;
            println!("mutation batch committed");
        }
        Step::Dispatch {
            caller,
            signature,
            payload,
        } => {
            let bytes = match payload {
                Some(value) => serde_json::to_vec(value)?,
                None => Vec::new(),
            };
            let selector = Selector::from_signature(signature);
            let output = kernel.dispatch(account_address(caller), selector, &bytes)?;
            println!("{signature} -> {}", render_bytes(&output));
        }
        Step::Inspect => {
            let reports = kernel.module_reports();
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Step::Audit => {
            let verified = if kernel.audit().verify_chain() {
                "verified"
            } else {
                "BROKEN"
            };
            println!(
                "audit chain: {} records, {verified}",
                kernel.audit().records().len()
            );
            for record in kernel.audit().records() {
                println!("  [{}] {:?} {}", record.index, record.kind, record.record_hash);
            }
        }
    }
    Ok(())
}

fn render_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "ok".to_string();
    }
    if bytes.len() == 8 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        return u64::from_le_bytes(buf).to_string();
    }
    let mut rendered = String::from("0x");
    for byte in bytes {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

/// The counter hot-swap and governance seeding walkthrough.
pub fn run_demo() -> anyhow::Result<()> {
    let operator = account_address("operator");
    let caller = account_address("alice");
    let mut kernel = DispatchKernel::new(operator);

    for name in modules::NAMES {
        let code = modules::build(name).expect("catalog module");
        kernel.install_module(modules::demo_address(name), code)?;
    }

    let increment = Selector::from_signature("increment()");
    println!("== counter v1 ==");
    kernel.apply_mutation(
        operator,
        MutationBatch::new().add(modules::demo_address("counter-v1"), vec![increment]),
    )?;
    for _ in 0..2 {
        let output = kernel.dispatch(caller, increment, b"")?;
        println!("increment() -> {}", render_bytes(&output));
    }

    println!("== hot swap to counter v2, state intact ==");
    kernel.apply_mutation(
        operator,
        MutationBatch::new().replace(modules::demo_address("counter-v2"), vec![increment]),
    )?;
    let output = kernel.dispatch(caller, increment, &[3])?;
    println!("increment() stride 3 -> {}", render_bytes(&output));

    println!("== governance threshold seeded by an init call ==");
    let payload = serde_json::to_vec(&serde_json::json!({"proposal_threshold": 100}))?;
    kernel.apply_mutation(
        operator,
        MutationBatch::new().with_init(modules::demo_address("governance-seed"), payload),
    )?;
    let slot = kernel
        .state()
        .slot("proposal_threshold")
        .expect("seeded field");
    println!("proposal_threshold = {}", kernel.state().get_u64(slot)?);

    println!("== directory ==");
    println!(
        "{}",
        serde_json::to_string_pretty(&kernel.module_reports())?
    );
    println!(
        "audit chain: {} records, verified: {}",
        kernel.audit().records().len(),
        kernel.audit().verify_chain()
    );
    Ok(())
}
