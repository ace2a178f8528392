pub const SEPARATOR: &str = "\n\n";

/// Joins fragments with a blank line, dropping empty and whitespace-only ones
/// so an omitted block never leaves a stray separator.
pub fn assemble<I>(fragments: I) -> String
where
    I: IntoIterator<Item = String>,
{
    fragments
        .into_iter()
        .filter(|f| !f.trim().is_empty())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Prefixes every line with `indent`, leaving a trailing newline unindented.
pub fn prefix_lines(text: &str, indent: &str) -> String {
    let (body, tail) = match text.strip_suffix('\n') {
        Some(body) => (body, "\n"),
        None => (text, ""),
    };
    let mut out = String::with_capacity(text.len() + indent.len() * 4);
    out.push_str(indent);
    out.push_str(&body.replace('\n', &format!("\n{indent}")));
    out.push_str(tail);
    out
}
