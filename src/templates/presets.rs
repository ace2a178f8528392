use crate::graph::{BlockInstance as B, Workspace};

#[derive(Debug, Clone)]
pub struct PresetTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub workspace: Workspace,
}

struct Recipe {
    role: &'static str,
    expertise: &'static str,
    tone: &'static str,
    task: &'static str,
    context: &'static str,
    max_words: i64,
    format: &'static str,
}

fn build(r: Recipe) -> Workspace {
    let text = |s: &str| B::new("text").field("TEXT", s);
    let chain = B::new("ai_persona")
        .field("ROLE", r.role)
        .field("EXPERTISE_PRESET", r.expertise)
        .field("TONE", r.tone)
        .then(
            B::new("ai_task").slot("TASK_INPUT", text(r.task)).then(
                B::new("ai_context").slot("CONTEXT", text(r.context)).then(
                    B::new("ai_constraint")
                        .field("USE_BULLETS", true)
                        .field("NO_MARKETING", false)
                        .field("MAX_WORDS", r.max_words)
                        .field("LANGUAGE", "zh-TW")
                        .then(B::new("ai_output_format").field("FORMAT", r.format)),
                ),
            ),
        );
    Workspace::new(vec![chain])
}

pub fn all() -> Vec<PresetTemplate> {
    vec![
        PresetTemplate {
            id: "code-review",
            name: "Code Review 助手",
            description: "專業的程式碼審查與改進建議",
            icon: "👨‍💻",
            workspace: build(Recipe {
                role: "資深程式專家",
                expertise: "Frontend Engineer",
                tone: "professional",
                task: "請審查以下程式碼並提供改進建議",
                context: "{程式碼}",
                max_words: 500,
                format: "structured",
            }),
        },
        PresetTemplate {
            id: "meeting-notes",
            name: "會議紀錄整理",
            description: "快速整理會議內容成結構化紀錄",
            icon: "📋",
            workspace: build(Recipe {
                role: "專業會議記錄員",
                expertise: "Product Manager",
                tone: "concise",
                task: "整理會議內容成結構化的會議紀錄",
                context: "{會議逐字稿}",
                max_words: 0,
                format: "markdown",
            }),
        },
        PresetTemplate {
            id: "qa-log-analysis",
            name: "QA Log 分析",
            description: "分析測試 log 找出問題根源",
            icon: "🔍",
            workspace: build(Recipe {
                role: "資深 QA 工程師",
                expertise: "Backend Engineer",
                tone: "professional",
                task: "分析測試 log 找出根本原因",
                context: "{測試 log}",
                max_words: 300,
                format: "structured",
            }),
        },
    ]
}

pub fn find(id: &str) -> Option<PresetTemplate> {
    all().into_iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;

    #[test]
    fn meeting_notes_compiles() {
        let preset = find("meeting-notes").unwrap();
        let c = Compiler::new().compile_workspace(&preset.workspace);
        assert!(c.diagnostics.is_empty());
        assert_eq!(
            c.prompt,
            "你是專業會議記錄員，擅長Product Manager。請使用簡潔直接的語氣。\n\n\
             請協助完成以下任務：\n整理會議內容成結構化的會議紀錄\n\n\
             情境/輸入資料：\n{會議逐字稿}\n\n\
             請遵守以下限制條件：\n- 使用條列式呈現\n- 使用繁體中文\n\n\
             請以Markdown格式輸出"
        );
    }

    #[test]
    fn every_preset_compiles_cleanly() {
        let compiler = Compiler::new();
        for p in all() {
            let c = compiler.compile_workspace(&p.workspace);
            assert!(c.diagnostics.is_empty(), "{}", p.id);
            assert!(c.prompt.starts_with("你是"), "{}", p.id);
        }
        assert!(find("missing").is_none());
    }
}
