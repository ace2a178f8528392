//! Per-kind render rules. Each is a pure function of the block's fields and
//! its resolved slots.

use crate::blocks::custom::CONTENT_SLOT;
use crate::compiler::{CompileError, Scope};

type Rendered = Result<String, CompileError>;

fn tone_sentence(tone: &str) -> Option<&'static str> {
    match tone {
        "professional" => Some("請使用專業嚴謹的語氣"),
        "friendly" => Some("請使用親切友善的語氣"),
        "concise" => Some("請使用簡潔直接的語氣"),
        _ => None,
    }
}

fn language_name(code: &str) -> Option<&'static str> {
    match code {
        "zh-TW" => Some("繁體中文"),
        "zh-CN" => Some("簡體中文"),
        "en" => Some("English"),
        _ => None,
    }
}

fn source_label(source: &str) -> Option<&'static str> {
    match source {
        "file" => Some("檔案"),
        "url" => Some("網址"),
        "text" => Some("文字"),
        _ => None,
    }
}

fn format_instruction(format: &str) -> Option<&'static str> {
    match format {
        "structured" => Some("請以下列格式輸出：\n- 標題\n- 重點摘要\n- 行動建議"),
        "json" => Some("請以JSON格式輸出"),
        "markdown" => Some("請以Markdown格式輸出"),
        "table" => Some("請以表格格式輸出"),
        "plain" => Some("請以純文字格式輸出"),
        _ => None,
    }
}

pub(super) fn persona(s: &Scope<'_, '_>) -> String {
    let preset = s.text("EXPERTISE_PRESET");
    let expertise = if preset.is_empty() || preset == "custom" {
        s.text("EXPERTISE")
    } else {
        preset
    };

    let mut out = format!("你是{}", s.text("ROLE"));
    if !expertise.is_empty() {
        out.push_str(&format!("，擅長{expertise}"));
    }
    if let Some(tone) = tone_sentence(&s.text("TONE")) {
        out.push_str(&format!("。{tone}。"));
    }
    out
}

pub(super) fn task(s: &mut Scope<'_, '_>) -> Rendered {
    let input = s.value("TASK_INPUT")?;
    let description = s.statement("TASK_DESCRIPTION")?;

    let mut out = String::from("請協助完成以下任務：");
    if !input.is_empty() {
        out.push('\n');
        out.push_str(&input);
    }
    if !description.is_empty() {
        out.push_str("\n\n詳細說明：\n");
        out.push_str(&description);
    }
    Ok(out)
}

pub(super) fn context(s: &mut Scope<'_, '_>) -> Rendered {
    let content = s.value("CONTEXT")?;
    if content.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("情境/輸入資料：\n{content}"))
}

pub(super) fn attachment(s: &mut Scope<'_, '_>) -> Rendered {
    let content = s.value("ATTACHMENT")?;
    if content.is_empty() {
        return Ok(String::new());
    }
    let source = s.text("SOURCE_TYPE");
    let label = source_label(&source).map(str::to_string).unwrap_or(source);
    Ok(format!("附件（{label}）：\n{content}"))
}

pub(super) fn knowledge_base(s: &Scope<'_, '_>) -> String {
    format!("請優先使用知識庫資料：{}", s.text("KB_ID"))
}

pub(super) fn constraint(s: &Scope<'_, '_>) -> String {
    let mut bullets: Vec<String> = Vec::new();
    if s.checked("USE_BULLETS") {
        bullets.push("- 使用條列式呈現".into());
    }
    if s.checked("NO_MARKETING") {
        bullets.push("- 不使用行銷語言".into());
    }
    let max_words = s.int("MAX_WORDS");
    if max_words > 0 {
        bullets.push(format!("- 字數不超過{max_words}字"));
    }
    if let Some(lang) = language_name(&s.text("LANGUAGE")) {
        bullets.push(format!("- 使用{lang}"));
    }

    if bullets.is_empty() {
        return String::new();
    }
    format!("請遵守以下限制條件：\n{}", bullets.join("\n"))
}

pub(super) fn output_format(s: &Scope<'_, '_>) -> String {
    format_instruction(&s.text("FORMAT")).unwrap_or_default().to_string()
}

pub(super) fn optimizer(s: &mut Scope<'_, '_>) -> Rendered {
    let inner = s.value("ORIGINAL_PROMPT")?;
    if s.checked("AUTO_OPTIMIZE") && !inner.is_empty() {
        return Ok(format!("[OPTIMIZER] {inner}"));
    }
    Ok(inner)
}

pub(super) fn custom(name: &str, s: &mut Scope<'_, '_>) -> Rendered {
    let content = s.value(CONTENT_SLOT)?;
    if content.is_empty() {
        return Ok(name.to_string());
    }
    Ok(format!("{name}：{content}"))
}
