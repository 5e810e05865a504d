use crate::mutator::OpKind;
use crate::selector::{Address, Selector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kinds of auditable kernel events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    BatchCommitted,
    AdministrationTransferred,
}

/// Per-operation summary stored with a committed batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationAudit {
    pub kind: OpKind,
    pub target: Address,
    pub selectors: Vec<Selector>,
}

/// Payload of a committed-batch record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchAudit {
    pub operations: Vec<OperationAudit>,
    pub init_module: Option<Address>,
}

/// Hash-chained audit record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: String,
    pub index: u64,
    pub kind: AuditKind,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub previous_hash: Option<String>,
    pub record_hash: String,
}

/// Append-only audit chain over committed directory rewrites.
///
/// No in-place mutation APIs exist; every committed batch and every
/// administration transfer becomes one more record in the chain.
#[derive(Clone, Debug, Default)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn append_batch(
        &mut self,
        operations: Vec<OperationAudit>,
        init_module: Option<Address>,
    ) {
        let payload = serde_json::to_value(BatchAudit {
            operations,
            init_module,
        })
        .unwrap_or(Value::Null);
        self.append(AuditKind::BatchCommitted, payload);
    }

    pub(crate) fn append_admin_transfer(&mut self, previous: Address, next: Address) {
        let payload = serde_json::json!({
            "previous": previous,
            "next": next,
        });
        self.append(AuditKind::AdministrationTransferred, payload);
    }

    fn append(&mut self, kind: AuditKind, payload: Value) {
        let index = self.records.len() as u64;
        let timestamp = Utc::now();
        let previous_hash = self.records.last().map(|record| record.record_hash.clone());
        let record_hash =
            compute_record_hash(index, kind, timestamp, &payload, previous_hash.as_deref());
        self.records.push(AuditRecord {
            record_id: Uuid::new_v4().to_string(),
            index,
            kind,
            timestamp,
            payload,
            previous_hash,
            record_hash,
        });
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for record in &self.records {
            let expected = compute_record_hash(
                record.index,
                record.kind,
                record.timestamp,
                &record.payload,
                previous_hash.as_deref(),
            );
            if record.record_hash != expected || record.previous_hash != previous_hash {
                return false;
            }
            previous_hash = Some(record.record_hash.clone());
        }
        true
    }
}

fn compute_record_hash(
    index: u64,
    kind: AuditKind,
    timestamp: DateTime<Utc>,
    payload: &Value,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "kind": kind,
        "timestamp": timestamp,
        "payload": payload,
        "previous_hash": previous_hash,
    });
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_operation() -> OperationAudit {
        OperationAudit {
            kind: OpKind::Add,
            target: Address::derive("module-a"),
            selectors: vec![Selector::from_signature("increment()")],
        }
    }

    #[test]
    fn verifies_hash_chain() {
        let mut log = AuditLog::new();
        log.append_batch(vec![sample_operation()], None);
        log.append_admin_transfer(Address::derive("ops"), Address::derive("ops-2"));
        assert_eq!(log.records().len(), 2);
        assert!(log.verify_chain());
    }

    #[test]
    fn detects_tampered_records() {
        let mut log = AuditLog::new();
        log.append_batch(vec![sample_operation()], None);

        // Tamper outside of append APIs to validate proof behavior.
        let mut tampered = log.clone();
        tampered.records[0].payload = serde_json::json!({"tampered": true});
        assert!(!tampered.verify_chain());
    }

    #[test]
    fn records_link_by_previous_hash() {
        let mut log = AuditLog::new();
        log.append_batch(vec![sample_operation()], None);
        log.append_batch(vec![sample_operation()], Some(Address::derive("init")));
        let records = log.records();
        assert_eq!(records[0].previous_hash, None);
        assert_eq!(
            records[1].previous_hash.as_deref(),
            Some(records[0].record_hash.as_str())
        );
    }
}
