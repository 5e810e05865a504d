use crate::error::StateError;
use crate::selector::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds a shared-state field can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    U64,
    I64,
    Bool,
    Text,
    Bytes,
    Address,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Address => "address",
        };
        f.write_str(name)
    }
}

/// A value stored in one shared-state field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    U64(u64),
    I64(i64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Address(Address),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::U64(_) => FieldKind::U64,
            Self::I64(_) => FieldKind::I64,
            Self::Bool(_) => FieldKind::Bool,
            Self::Text(_) => FieldKind::Text,
            Self::Bytes(_) => FieldKind::Bytes,
            Self::Address(_) => FieldKind::Address,
        }
    }
}

/// Position handle for one field, returned by [`SharedState::define_field`].
///
/// Slots stay valid for the lifetime of the record because the layout only
/// ever grows at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSlot(usize);

/// Name and kind of one field in the layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field layout of the shared record, with a version that advances
/// on every append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSchema {
    version: u32,
    fields: Vec<FieldDef>,
}

impl StateSchema {
    fn empty() -> Self {
        Self {
            version: 0,
            fields: Vec::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// True when `older` is a prefix of this layout with identical names
    /// and kinds. This is the review check for layout changes: anything
    /// that is not an extension reinterprets previously stored values.
    pub fn is_extension_of(&self, older: &StateSchema) -> bool {
        older.fields.len() <= self.fields.len()
            && older.fields.iter().zip(&self.fields).all(|(a, b)| a == b)
    }
}

/// The one mutable record shared by every module invocation.
///
/// Layout discipline: fields are appended, never reordered, retyped, or
/// deleted. All access goes through kind-checked accessors keyed by name or
/// [`FieldSlot`]; nothing exposes positional writes.
#[derive(Clone, Debug, PartialEq)]
pub struct SharedState {
    schema: StateSchema,
    values: Vec<FieldValue>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            schema: StateSchema::empty(),
            values: Vec::new(),
        }
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Append a new field holding `default`. Fails if the name is taken.
    pub fn define_field(
        &mut self,
        name: &str,
        default: FieldValue,
    ) -> Result<FieldSlot, StateError> {
        if self.slot(name).is_some() {
            return Err(StateError::DuplicateField(name.to_string()));
        }
        self.schema.fields.push(FieldDef {
            name: name.to_string(),
            kind: default.kind(),
        });
        self.schema.version += 1;
        self.values.push(default);
        Ok(FieldSlot(self.values.len() - 1))
    }

    /// Return the slot of an existing field of the same kind as `default`,
    /// or append it. The stored value is never overwritten.
    pub fn ensure_field(
        &mut self,
        name: &str,
        default: FieldValue,
    ) -> Result<FieldSlot, StateError> {
        match self.slot(name) {
            Some(slot) => {
                let existing = self.schema.fields[slot.0].kind;
                if existing != default.kind() {
                    return Err(StateError::KindMismatch {
                        field: name.to_string(),
                        expected: existing,
                        actual: default.kind(),
                    });
                }
                Ok(slot)
            }
            None => self.define_field(name, default),
        }
    }

    pub fn slot(&self, name: &str) -> Option<FieldSlot> {
        self.schema
            .fields
            .iter()
            .position(|field| field.name == name)
            .map(FieldSlot)
    }

    /// Kind-checked read of a field.
    pub fn get(&self, slot: FieldSlot) -> Result<&FieldValue, StateError> {
        self.values
            .get(slot.0)
            .ok_or_else(|| StateError::UnknownField(format!("slot {}", slot.0)))
    }

    /// Kind-checked write. The new value must match the declared kind.
    pub fn set(&mut self, slot: FieldSlot, value: FieldValue) -> Result<(), StateError> {
        let field = self
            .schema
            .fields
            .get(slot.0)
            .ok_or_else(|| StateError::UnknownField(format!("slot {}", slot.0)))?;
        if field.kind != value.kind() {
            return Err(StateError::KindMismatch {
                field: field.name.clone(),
                expected: field.kind,
                actual: value.kind(),
            });
        }
        self.values[slot.0] = value;
        Ok(())
    }

    pub fn get_u64(&self, slot: FieldSlot) -> Result<u64, StateError> {
        match self.get(slot)? {
            FieldValue::U64(value) => Ok(*value),
            other => Err(self.mismatch(slot, FieldKind::U64, other.kind())),
        }
    }

    pub fn set_u64(&mut self, slot: FieldSlot, value: u64) -> Result<(), StateError> {
        self.set(slot, FieldValue::U64(value))
    }

    pub fn get_bool(&self, slot: FieldSlot) -> Result<bool, StateError> {
        match self.get(slot)? {
            FieldValue::Bool(value) => Ok(*value),
            other => Err(self.mismatch(slot, FieldKind::Bool, other.kind())),
        }
    }

    pub fn set_bool(&mut self, slot: FieldSlot, value: bool) -> Result<(), StateError> {
        self.set(slot, FieldValue::Bool(value))
    }

    pub fn get_text(&self, slot: FieldSlot) -> Result<&str, StateError> {
        match self.get(slot)? {
            FieldValue::Text(value) => Ok(value),
            other => Err(self.mismatch(slot, FieldKind::Text, other.kind())),
        }
    }

    pub fn set_text(&mut self, slot: FieldSlot, value: impl Into<String>) -> Result<(), StateError> {
        self.set(slot, FieldValue::Text(value.into()))
    }

    pub fn get_address(&self, slot: FieldSlot) -> Result<Address, StateError> {
        match self.get(slot)? {
            FieldValue::Address(value) => Ok(*value),
            other => Err(self.mismatch(slot, FieldKind::Address, other.kind())),
        }
    }

    pub fn set_address(&mut self, slot: FieldSlot, value: Address) -> Result<(), StateError> {
        self.set(slot, FieldValue::Address(value))
    }

    fn mismatch(&self, slot: FieldSlot, expected: FieldKind, actual: FieldKind) -> StateError {
        let field = self
            .schema
            .fields
            .get(slot.0)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| format!("slot {}", slot.0));
        StateError::KindMismatch {
            field,
            expected,
            actual,
        }
    }

    /// Capture the full record, layout included, for persistence.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            digest: compute_digest(&self.schema, &self.values),
            schema: self.schema.clone(),
            values: self.values.clone(),
        }
    }

    /// Rebuild a record from a persisted snapshot, verifying its digest and
    /// internal layout agreement.
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Result<Self, StateError> {
        if compute_digest(&snapshot.schema, &snapshot.values) != snapshot.digest {
            return Err(StateError::SnapshotIntegrity);
        }
        if snapshot.values.len() != snapshot.schema.fields.len() {
            return Err(StateError::SnapshotIntegrity);
        }
        for (field, value) in snapshot.schema.fields.iter().zip(&snapshot.values) {
            if field.kind != value.kind() {
                return Err(StateError::SnapshotIntegrity);
            }
        }
        Ok(Self {
            schema: snapshot.schema.clone(),
            values: snapshot.values.clone(),
        })
    }

    /// Load a snapshot into this record.
    ///
    /// The snapshot layout must equal the current layout or be an older
    /// prefix of it. Fields appended since the snapshot was taken keep their
    /// current values, which is how an old snapshot migrates forward.
    pub fn restore_from(&mut self, snapshot: &StateSnapshot) -> Result<(), StateError> {
        let restored = Self::from_snapshot(snapshot)?;
        if !self.schema.is_extension_of(&restored.schema) {
            return Err(StateError::SnapshotIncompatible(format!(
                "snapshot version {} does not prefix the current layout (version {})",
                restored.schema.version(),
                self.schema.version()
            )));
        }
        for (index, value) in restored.values.into_iter().enumerate() {
            self.values[index] = value;
        }
        Ok(())
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted form of the shared record. The layout and its version travel
/// with the values so an old snapshot can be checked and migrated forward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema: StateSchema,
    pub values: Vec<FieldValue>,
    pub digest: String,
}

fn compute_digest(schema: &StateSchema, values: &[FieldValue]) -> String {
    let material = serde_json::json!({
        "schema": schema,
        "values": values,
    });
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_access_roundtrip() {
        let mut state = SharedState::new();
        let count = state.define_field("count", FieldValue::U64(0)).unwrap();
        state.set_u64(count, 7).unwrap();
        assert_eq!(state.get_u64(count).unwrap(), 7);
    }

    #[test]
    fn duplicate_field_rejected() {
        let mut state = SharedState::new();
        state.define_field("count", FieldValue::U64(0)).unwrap();
        assert_eq!(
            state.define_field("count", FieldValue::U64(0)),
            Err(StateError::DuplicateField("count".to_string()))
        );
    }

    #[test]
    fn kind_mismatch_rejected_on_write() {
        let mut state = SharedState::new();
        let count = state.define_field("count", FieldValue::U64(0)).unwrap();
        let err = state.set(count, FieldValue::Bool(true)).unwrap_err();
        assert!(matches!(err, StateError::KindMismatch { .. }));
        assert_eq!(state.get_u64(count).unwrap(), 0);
    }

    #[test]
    fn ensure_field_is_idempotent() {
        let mut state = SharedState::new();
        let first = state.ensure_field("count", FieldValue::U64(0)).unwrap();
        state.set_u64(first, 3).unwrap();
        let second = state.ensure_field("count", FieldValue::U64(0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(state.get_u64(second).unwrap(), 3);
    }

    #[test]
    fn ensure_field_checks_kind() {
        let mut state = SharedState::new();
        state.define_field("count", FieldValue::U64(0)).unwrap();
        let err = state
            .ensure_field("count", FieldValue::Text(String::new()))
            .unwrap_err();
        assert!(matches!(err, StateError::KindMismatch { .. }));
    }

    #[test]
    fn schema_version_advances_per_append() {
        let mut state = SharedState::new();
        assert_eq!(state.schema().version(), 0);
        state.define_field("a", FieldValue::U64(0)).unwrap();
        state.define_field("b", FieldValue::Bool(false)).unwrap();
        assert_eq!(state.schema().version(), 2);
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut state = SharedState::new();
        let count = state.define_field("count", FieldValue::U64(0)).unwrap();
        state.set_u64(count, 42).unwrap();
        let snapshot = state.snapshot();
        let restored = SharedState::from_snapshot(&snapshot).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn tampered_snapshot_rejected() {
        let mut state = SharedState::new();
        let count = state.define_field("count", FieldValue::U64(0)).unwrap();
        state.set_u64(count, 42).unwrap();
        let mut snapshot = state.snapshot();
        snapshot.values[0] = FieldValue::U64(1_000_000);
        assert_eq!(
            SharedState::from_snapshot(&snapshot),
            Err(StateError::SnapshotIntegrity)
        );
    }

    #[test]
    fn older_snapshot_migrates_into_extended_layout() {
        let mut old = SharedState::new();
        let count = old.define_field("count", FieldValue::U64(0)).unwrap();
        old.set_u64(count, 9).unwrap();
        let snapshot = old.snapshot();

        let mut current = SharedState::new();
        let count = current.define_field("count", FieldValue::U64(0)).unwrap();
        let threshold = current
            .define_field("proposal_threshold", FieldValue::U64(50))
            .unwrap();
        current.restore_from(&snapshot).unwrap();

        assert_eq!(current.get_u64(count).unwrap(), 9);
        // Appended field keeps the value it already held.
        assert_eq!(current.get_u64(threshold).unwrap(), 50);
    }

    #[test]
    fn reordered_layout_rejected_on_restore() {
        let mut old = SharedState::new();
        old.define_field("a", FieldValue::U64(0)).unwrap();
        old.define_field("b", FieldValue::Bool(false)).unwrap();
        let snapshot = old.snapshot();

        let mut reordered = SharedState::new();
        reordered.define_field("b", FieldValue::Bool(false)).unwrap();
        reordered.define_field("a", FieldValue::U64(0)).unwrap();
        assert!(matches!(
            reordered.restore_from(&snapshot),
            Err(StateError::SnapshotIncompatible(_))
        ));
    }

    #[test]
    fn extension_check_rejects_retyped_field() {
        let mut a = SharedState::new();
        a.define_field("count", FieldValue::U64(0)).unwrap();

        let mut b = SharedState::new();
        b.define_field("count", FieldValue::I64(0)).unwrap();

        assert!(!b.schema().is_extension_of(a.schema()));
        assert!(a.schema().is_extension_of(a.schema()));
    }
}
