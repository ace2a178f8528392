//! Built-in block kinds. Field names and defaults match what the editor
//! serializes, so snapshots saved there compile unchanged.

use super::{BlockKind, FieldSpec, SlotSpec};

pub const PERSONA: &str = "ai_persona";
pub const TASK: &str = "ai_task";
pub const CONTEXT: &str = "ai_context";
pub const ATTACHMENT: &str = "ai_attachment";
pub const KNOWLEDGE_BASE: &str = "ai_knowledge_base";
pub const CONSTRAINT: &str = "ai_constraint";
pub const OUTPUT_FORMAT: &str = "ai_output_format";
pub const OPTIMIZER: &str = "ai_optimizer";
pub const TEXT: &str = "text";
pub const TEXT_MULTILINE: &str = "text_multiline";
pub const VARIABLE_INPUT: &str = "ai_variable_input";

pub const EXPERTISE_PRESETS: &[&str] = &[
    "",
    "Frontend Engineer",
    "Backend Engineer",
    "Product Manager",
    "Data Scientist",
    "custom",
];

fn kind(id: &str, fields: Vec<FieldSpec>, slots: Vec<SlotSpec>, produces_value: bool) -> BlockKind {
    BlockKind { id: id.into(), fields, slots, produces_value }
}

pub fn kinds() -> Vec<BlockKind> {
    vec![
        kind(
            PERSONA,
            vec![
                FieldSpec::text("ROLE", "資深程式專家"),
                FieldSpec::dropdown("EXPERTISE_PRESET", "", EXPERTISE_PRESETS),
                FieldSpec::text("EXPERTISE", ""),
                FieldSpec::dropdown("TONE", "professional", &["professional", "friendly", "concise"]),
            ],
            vec![],
            false,
        ),
        kind(
            TASK,
            vec![],
            vec![SlotSpec::value("TASK_INPUT"), SlotSpec::statement("TASK_DESCRIPTION")],
            false,
        ),
        kind(CONTEXT, vec![], vec![SlotSpec::value("CONTEXT")], false),
        kind(
            ATTACHMENT,
            vec![FieldSpec::dropdown("SOURCE_TYPE", "file", &["file", "url", "text"])],
            vec![SlotSpec::value("ATTACHMENT")],
            false,
        ),
        kind(KNOWLEDGE_BASE, vec![FieldSpec::text("KB_ID", "")], vec![], false),
        kind(
            CONSTRAINT,
            vec![
                FieldSpec::checkbox("USE_BULLETS", true),
                FieldSpec::checkbox("NO_MARKETING", false),
                FieldSpec::number("MAX_WORDS", 0),
                FieldSpec::dropdown("LANGUAGE", "zh-TW", &["zh-TW", "zh-CN", "en"]),
            ],
            vec![],
            false,
        ),
        kind(
            OUTPUT_FORMAT,
            vec![FieldSpec::dropdown(
                "FORMAT",
                "structured",
                &["structured", "json", "markdown", "table", "plain"],
            )],
            vec![],
            false,
        ),
        kind(
            OPTIMIZER,
            vec![FieldSpec::checkbox("AUTO_OPTIMIZE", true)],
            vec![SlotSpec::value("ORIGINAL_PROMPT")],
            true,
        ),
        kind(TEXT, vec![FieldSpec::text("TEXT", "")], vec![], true),
        kind(TEXT_MULTILINE, vec![FieldSpec::text("TEXT", "輸入文字")], vec![], true),
        kind(VARIABLE_INPUT, vec![FieldSpec::text("VAR_NAME", "變數名稱")], vec![], true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_ids_and_fields_are_unique() {
        let all = kinds();
        let ids: HashSet<_> = all.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids.len(), all.len());
        for k in &all {
            let rebuilt = BlockKind::new(k.id.clone(), k.fields.clone(), k.slots.clone(), k.produces_value);
            assert!(rebuilt.is_ok(), "{} has duplicate names", k.id);
        }
    }
}
