use anyhow::{Context, Result};
use fs_err as fs;
use serde::de::value::{MapAccessDeserializer, SeqAccessDeserializer};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::errors::AppError;

/// ========================================
/// Workspace snapshot
/// ========================================

/// The top-level blocks of an editor canvas, in canvas order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub blocks: Vec<BlockInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInstance {
    #[serde(default)]
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
    /// Slots bound to `null` in a snapshot are dropped on load.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "deserialize_slots")]
    pub slots: BTreeMap<String, SlotBinding>,
    /// Accepts a single block or a flat list of blocks chained in order.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_next")]
    pub next: Option<Box<BlockInstance>>,
    #[serde(default = "enabled_default", skip_serializing_if = "is_enabled")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

fn is_enabled(v: &bool) -> bool {
    *v
}

fn deserialize_slots<'de, D>(d: D) -> Result<BTreeMap<String, SlotBinding>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Option<SlotBinding>>::deserialize(d)?;
    Ok(raw.into_iter().filter_map(|(name, b)| b.map(|b| (name, b))).collect())
}

fn deserialize_next<'de, D>(d: D) -> Result<Option<Box<BlockInstance>>, D::Error>
where
    D: Deserializer<'de>,
{
    d.deserialize_option(NextVisitor)
}

struct NextVisitor;

impl<'de> Visitor<'de> for NextVisitor {
    type Value = Option<Box<BlockInstance>>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a block, a list of blocks, or null")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        BlockInstance::deserialize(MapAccessDeserializer::new(map)).map(|b| Some(Box::new(b)))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
        let list = Vec::<BlockInstance>::deserialize(SeqAccessDeserializer::new(seq))?;
        Ok(link(list))
    }
}

/// Chains `blocks` in order. Each element's own `next` chain is kept and
/// continues into the following element.
fn link(blocks: Vec<BlockInstance>) -> Option<Box<BlockInstance>> {
    let mut flat = Vec::with_capacity(blocks.len());
    for mut block in blocks {
        loop {
            let next = block.next.take();
            flat.push(block);
            match next {
                Some(b) => block = *b,
                None => break,
            }
        }
    }
    let mut head = None;
    for mut block in flat.into_iter().rev() {
        block.next = head;
        head = Some(Box::new(block));
    }
    head
}

/// Scalar value of a block field as the editor serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// What a named slot is connected to. A list is compiled as a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotBinding {
    Block(Box<BlockInstance>),
    Chain(Vec<BlockInstance>),
}

impl BlockInstance {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind: kind.into(),
            fields: BTreeMap::new(),
            slots: BTreeMap::new(),
            next: None,
            enabled: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn slot(mut self, name: impl Into<String>, child: BlockInstance) -> Self {
        self.slots.insert(name.into(), SlotBinding::Block(Box::new(child)));
        self
    }

    pub fn chain_slot(mut self, name: impl Into<String>, children: Vec<BlockInstance>) -> Self {
        self.slots.insert(name.into(), SlotBinding::Chain(children));
        self
    }

    pub fn then(mut self, next: BlockInstance) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// This block followed by every block on its `next` chain.
    pub fn chain(&self) -> impl Iterator<Item = &BlockInstance> {
        std::iter::successors(Some(self), |b| b.next.as_deref())
    }
}

impl SlotBinding {
    /// Blocks bound to the slot in chain order, flattening `next` links.
    pub fn blocks(&self) -> Vec<&BlockInstance> {
        match self {
            SlotBinding::Block(b) => b.chain().collect(),
            SlotBinding::Chain(list) => list.iter().flat_map(|b| b.chain()).collect(),
        }
    }

    /// The single block a value slot reads from.
    pub fn first(&self) -> Option<&BlockInstance> {
        match self {
            SlotBinding::Block(b) => Some(b),
            SlotBinding::Chain(list) => list.first(),
        }
    }
}

impl FieldValue {
    /// Text form of the value. Checkboxes use the editor's `TRUE`/`FALSE` spelling.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bool(true) => "TRUE".into(),
            FieldValue::Bool(false) => "FALSE".into(),
            FieldValue::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            FieldValue::Number(n) => n.to_string(),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Text(s) => s.trim().eq_ignore_ascii_case("TRUE"),
            FieldValue::Number(n) => *n != 0.0,
        }
    }

    /// Integer reading with `parseInt` leniency: optional sign then leading
    /// digits; anything else reads as 0.
    pub fn as_int(&self) -> i64 {
        match self {
            FieldValue::Number(n) if n.is_finite() => n.trunc() as i64,
            FieldValue::Number(_) | FieldValue::Bool(_) => 0,
            FieldValue::Text(s) => parse_int_prefix(s),
        }
    }
}

/// Digit runs too long for `i64` saturate rather than reading as 0.
fn parse_int_prefix(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let magnitude = rest
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    sign * magnitude
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl Workspace {
    pub fn new(blocks: Vec<BlockInstance>) -> Self {
        Self { blocks }
    }

    /// Parses a JSON snapshot. Long `next` chains nest deeply, so the parser's
    /// recursion limit is lifted and the stack grows on demand instead.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut de = serde_json::Deserializer::from_str(text);
        de.disable_recursion_limit();
        let ws = Self::deserialize(serde_stacker::Deserializer::new(&mut de))
            .and_then(|ws| de.end().map(|()| ws))
            .map_err(|e| AppError::Snapshot(e.to_string()))?;
        Ok(ws)
    }

    /// YAML keeps its parser's nesting limit; long chains can use the flat
    /// `next: [..]` list form.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| AppError::Snapshot(e.to_string()).into())
    }

    /// Read a snapshot file, choosing the format by extension (`.yaml`/`.yml`, else JSON).
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let ws = match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            _ => Self::from_json(&text),
        };
        ws.with_context(|| format!("failed to parse workspace snapshot {}", path.display()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_snapshot() {
        let json = r#"{
            "blocks": [{
                "id": "p1",
                "kind": "ai_persona",
                "fields": { "ROLE": "編輯", "TONE": "friendly" },
                "next": {
                    "kind": "ai_task",
                    "slots": {
                        "TASK_INPUT": { "kind": "text", "fields": { "TEXT": "摘要" } },
                        "TASK_DESCRIPTION": [
                            { "kind": "ai_context" },
                            { "kind": "ai_constraint", "enabled": false }
                        ]
                    }
                }
            }]
        }"#;
        let ws = Workspace::from_json(json).unwrap();
        let root = &ws.blocks[0];
        assert_eq!(root.chain().count(), 2);
        let task = root.next.as_deref().unwrap();
        match &task.slots["TASK_INPUT"] {
            SlotBinding::Block(b) => assert_eq!(b.kind, "text"),
            other => panic!("unexpected binding {other:?}"),
        }
        let desc = task.slots["TASK_DESCRIPTION"].blocks();
        assert_eq!(desc.len(), 2);
        assert!(!desc[1].enabled);
    }

    #[test]
    fn yaml_and_json_agree() {
        let yaml = "blocks:\n  - kind: ai_output_format\n    fields:\n      FORMAT: json\n";
        let json = r#"{"blocks":[{"kind":"ai_output_format","fields":{"FORMAT":"json"}}]}"#;
        assert_eq!(Workspace::from_yaml(yaml).unwrap(), Workspace::from_json(json).unwrap());
    }

    #[test]
    fn int_parsing_is_lenient() {
        assert_eq!(FieldValue::from("500").as_int(), 500);
        assert_eq!(FieldValue::from(" 42字").as_int(), 42);
        assert_eq!(FieldValue::from("-3").as_int(), -3);
        assert_eq!(FieldValue::from("abc").as_int(), 0);
        assert_eq!(FieldValue::from("").as_int(), 0);
        assert_eq!(FieldValue::Number(120.9).as_int(), 120);
        assert_eq!(FieldValue::Number(f64::NAN).as_int(), 0);
        assert_eq!(FieldValue::from("99999999999999999999").as_int(), i64::MAX);
        assert_eq!(FieldValue::from("-99999999999999999999字").as_int(), -i64::MAX);
    }

    #[test]
    fn checkbox_spellings() {
        assert!(FieldValue::from("TRUE").as_bool());
        assert!(FieldValue::from(true).as_bool());
        assert!(!FieldValue::from("FALSE").as_bool());
        assert_eq!(FieldValue::Bool(false).as_text(), "FALSE");
        assert_eq!(FieldValue::Number(500.0).as_text(), "500");
    }

    #[test]
    fn serialization_omits_defaults() {
        let b = BlockInstance::new("text").field("TEXT", "hi");
        let json = serde_json::to_string(&b).unwrap();
        assert!(!json.contains("enabled"));
        assert!(!json.contains("next"));
    }

    #[test]
    fn null_slot_is_unbound() {
        let ws = Workspace::from_json(
            r#"{"blocks":[{"kind":"ai_task","slots":{"TASK_INPUT":null,"TASK_DESCRIPTION":[{"kind":"ai_context"}]}}]}"#,
        )
        .unwrap();
        let task = &ws.blocks[0];
        assert!(!task.slots.contains_key("TASK_INPUT"));
        assert_eq!(task.slots["TASK_DESCRIPTION"].blocks().len(), 1);

        let yaml = Workspace::from_yaml("blocks:\n  - kind: ai_context\n    slots:\n      CONTEXT: ~\n").unwrap();
        assert!(yaml.blocks[0].slots.is_empty());
    }

    fn nested_chain_json(len: usize) -> String {
        let mut json = String::from(r#"{"blocks":["#);
        for i in 0..len {
            if i > 0 {
                json.push_str(r#","next":"#);
            }
            json.push_str(&format!(r#"{{"kind":"ai_knowledge_base","fields":{{"KB_ID":"kb{i}"}}"#));
        }
        json.push_str(&"}".repeat(len));
        json.push_str("]}");
        json
    }

    #[test]
    fn long_next_chain_loads() {
        let ws = Workspace::from_json(&nested_chain_json(200)).unwrap();
        let blocks: Vec<_> = ws.blocks[0].chain().collect();
        assert_eq!(blocks.len(), 200);
        assert_eq!(blocks[199].fields["KB_ID"], FieldValue::from("kb199"));

        let again = Workspace::from_json(&ws.to_json_pretty().unwrap()).unwrap();
        assert_eq!(again, ws);
        assert!(Workspace::from_json(&format!("{} trailing", nested_chain_json(3))).is_err());
    }

    #[test]
    fn flat_next_list_is_chained_in_order() {
        let yaml = "\
blocks:
  - kind: ai_persona
    next:
      - kind: ai_task
        next: { kind: ai_context }
      - kind: ai_output_format
      - kind: ai_knowledge_base
";
        let ws = Workspace::from_yaml(yaml).unwrap();
        let kinds: Vec<_> = ws.blocks[0].chain().map(|b| b.kind.as_str()).collect();
        assert_eq!(kinds, ["ai_persona", "ai_task", "ai_context", "ai_output_format", "ai_knowledge_base"]);

        let json = r#"{"blocks":[{"kind":"text","next":[]},{"kind":"text","next":null}]}"#;
        let ws = Workspace::from_json(json).unwrap();
        assert!(ws.blocks.iter().all(|b| b.next.is_none()));
    }
}
