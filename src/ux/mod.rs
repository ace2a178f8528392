use colored::Colorize;
use regex::Regex;
use std::io::{self, Write};
use std::sync::OnceLock;

use crate::blocks::custom::CustomBlockDefinition;
use crate::blocks::{BlockKind, FieldKind};
use crate::compiler::Diagnostic;
use crate::queue::{QueueTask, TaskStatus};
use crate::templates::presets::PresetTemplate;
use crate::templates::TemplateEntry;

pub const NO_RESULT: &str = "無結果";

pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes"
    } else {
        false
    }
}

pub fn print_diagnostics(diags: &[Diagnostic]) {
    for d in diags {
        eprintln!("{} {}", "warning:".yellow().bold(), d);
    }
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*]\s+").expect("static regex"))
}

fn numbered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\s+").expect("static regex"))
}

/// Plain-text rendering of a model response: JSON is pretty-printed,
/// anything else gets light markdown treatment line by line.
pub fn render_result(result: Option<&str>) -> String {
    let Some(result) = result.filter(|r| !r.is_empty()) else {
        return NO_RESULT.to_string();
    };
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(result) {
        if value.is_object() || value.is_array() {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    result.lines().map(render_line).collect::<Vec<_>>().join("\n")
}

fn render_line(line: &str) -> String {
    let trimmed = line.trim();
    if let Some(h) = trimmed.strip_prefix("### ") {
        return h.bold().to_string();
    }
    if let Some(h) = trimmed.strip_prefix("## ") {
        return h.bold().underline().to_string();
    }
    if let Some(h) = trimmed.strip_prefix("# ") {
        return h.to_uppercase().bold().underline().to_string();
    }
    if bullet_re().is_match(trimmed) {
        return format!("  • {}", bullet_re().replace(trimmed, ""));
    }
    if numbered_re().is_match(trimmed) {
        return format!("  {trimmed}");
    }
    trimmed.to_string()
}

pub fn print_outcome(task: &QueueTask) {
    let label = match task.status {
        TaskStatus::Completed => "completed".green().bold(),
        TaskStatus::Failed => "failed".red().bold(),
        TaskStatus::Running => "running".cyan().bold(),
        TaskStatus::Queued => "queued".dimmed(),
    };
    let short = task.id.simple().to_string();
    println!(
        "\n=== 任務 {} [{}]{} ===",
        &short[short.len() - 6..],
        label,
        task.execution_time_ms.map(|ms| format!("  {ms}ms")).unwrap_or_default()
    );
    match task.status {
        TaskStatus::Failed => println!("{} {}", "錯誤:".red(), task.result.as_deref().unwrap_or("")),
        _ => println!("{}", render_result(task.result.as_deref())),
    }
}

pub fn print_kinds<'a>(kinds: impl Iterator<Item = &'a BlockKind>) {
    for k in kinds {
        let shape = if k.produces_value { "value".magenta() } else { "statement".cyan() };
        println!("{}  ({})", k.id.bold(), shape);
        for f in &k.fields {
            let kind = match f.kind {
                FieldKind::Text => "text",
                FieldKind::Dropdown => "dropdown",
                FieldKind::Checkbox => "checkbox",
                FieldKind::Number => "number",
            };
            let opts = if f.options.is_empty() {
                String::new()
            } else {
                format!(" [{}]", f.options.join("|"))
            };
            println!("    field {} : {}{} = {:?}", f.name, kind, opts, f.default.as_text());
        }
        for s in &k.slots {
            println!("    slot  {} : {}", s.name, if s.accepts_value { "value" } else { "statement" });
        }
    }
}

pub fn print_templates(entries: &[TemplateEntry]) {
    if entries.is_empty() {
        println!("沒有已儲存的模板");
        return;
    }
    for (i, e) in entries.iter().enumerate() {
        println!(
            "{}. {} ({})  {}",
            i + 1,
            e.name.bold(),
            e.saved_at.format("%Y-%m-%d %H:%M:%S"),
            e.key.dimmed()
        );
    }
}

pub fn print_presets(presets: &[PresetTemplate]) {
    for p in presets {
        println!("{} {}  {}  {}", p.icon, p.name.bold(), p.id.dimmed(), p.description);
    }
}

pub fn print_custom_blocks(defs: &[CustomBlockDefinition]) {
    if defs.is_empty() {
        println!("(no custom blocks)");
        return;
    }
    for d in defs {
        println!("{} {}  {}  {}", d.icon, d.name.bold(), d.kind_id().dimmed(), d.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_placeholder() {
        assert_eq!(render_result(None), NO_RESULT);
        assert_eq!(render_result(Some("")), NO_RESULT);
    }

    #[test]
    fn json_is_pretty_printed() {
        let out = render_result(Some(r#"{"a":[1,2]}"#));
        assert_eq!(out, "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn markdown_lines() {
        colored::control::set_override(false);
        let out = render_result(Some("## 標題\n- 第一點\n* 第二點\n1. 步驟\n  普通  "));
        assert_eq!(out, "標題\n  • 第一點\n  • 第二點\n  1. 步驟\n普通");
    }
}
