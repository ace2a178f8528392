use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::graph::FieldValue;

pub mod builtin;
pub mod custom;

#[derive(Error, Debug, PartialEq)]
pub enum BlockError {
    #[error("block kind {kind}: duplicate field {field}")]
    DuplicateField { kind: String, field: String },
    #[error("block kind {kind}: duplicate slot {slot}")]
    DuplicateSlot { kind: String, slot: String },
    #[error("custom block name must not be empty")]
    EmptyName,
    #[error("invalid block color {0:?} (expected #rrggbb)")]
    InvalidColor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Dropdown,
    Checkbox,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub default: FieldValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    /// `true` for a single value-producing child, `false` for a statement chain.
    pub accepts_value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockKind {
    pub id: String,
    pub fields: Vec<FieldSpec>,
    pub slots: Vec<SlotSpec>,
    pub produces_value: bool,
}

impl FieldSpec {
    pub fn text(name: &str, default: &str) -> Self {
        Self { name: name.into(), kind: FieldKind::Text, default: default.into(), options: vec![] }
    }

    pub fn dropdown(name: &str, default: &str, options: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Dropdown,
            default: default.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub fn checkbox(name: &str, default: bool) -> Self {
        Self { name: name.into(), kind: FieldKind::Checkbox, default: default.into(), options: vec![] }
    }

    pub fn number(name: &str, default: i64) -> Self {
        Self { name: name.into(), kind: FieldKind::Number, default: default.into(), options: vec![] }
    }
}

impl SlotSpec {
    pub fn value(name: &str) -> Self {
        Self { name: name.into(), accepts_value: true }
    }

    pub fn statement(name: &str) -> Self {
        Self { name: name.into(), accepts_value: false }
    }
}

impl BlockKind {
    pub fn new(
        id: impl Into<String>,
        fields: Vec<FieldSpec>,
        slots: Vec<SlotSpec>,
        produces_value: bool,
    ) -> Result<Self, BlockError> {
        let id = id.into();
        let mut seen = HashSet::new();
        for f in &fields {
            if !seen.insert(f.name.as_str()) {
                return Err(BlockError::DuplicateField { kind: id, field: f.name.clone() });
            }
        }
        let mut seen = HashSet::new();
        for s in &slots {
            if !seen.insert(s.name.as_str()) {
                return Err(BlockError::DuplicateSlot { kind: id, slot: s.name.clone() });
            }
        }
        Ok(Self { id, fields, slots, produces_value })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn slot(&self, name: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|s| s.name == name)
    }
}

/// Catalog of block kinds known to one compiler session.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: BTreeMap<String, BlockKind>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in kind.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        for kind in builtin::kinds() {
            reg.register(kind);
        }
        reg
    }

    /// Adds `kind`, replacing any earlier kind with the same id.
    pub fn register(&mut self, kind: BlockKind) {
        if self.kinds.contains_key(&kind.id) {
            tracing::debug!(kind = %kind.id, "replacing registered block kind");
        }
        self.kinds.insert(kind.id.clone(), kind);
    }

    pub fn lookup(&self, id: &str) -> Option<&BlockKind> {
        self.kinds.get(id)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &BlockKind> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_field_is_rejected() {
        let err = BlockKind::new(
            "dup",
            vec![FieldSpec::text("A", ""), FieldSpec::checkbox("A", true)],
            vec![],
            false,
        )
        .unwrap_err();
        assert_eq!(err, BlockError::DuplicateField { kind: "dup".into(), field: "A".into() });
    }

    #[test]
    fn register_overwrites_same_id() {
        let mut reg = Registry::new();
        reg.register(BlockKind::new("k", vec![], vec![], false).unwrap());
        reg.register(BlockKind::new("k", vec![], vec![SlotSpec::value("X")], true).unwrap());
        assert_eq!(reg.len(), 1);
        let k = reg.lookup("k").unwrap();
        assert!(k.produces_value);
        assert!(k.slot("X").is_some());
    }

    #[test]
    fn builtin_registry_has_core_kinds() {
        let reg = Registry::builtin();
        for id in ["ai_persona", "ai_task", "ai_constraint", "ai_output_format", "text"] {
            assert!(reg.lookup(id).is_some(), "missing {id}");
        }
        assert!(reg.lookup("controls_if").is_none());
    }
}
