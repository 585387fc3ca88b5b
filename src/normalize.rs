//! String cleanup applied to OCR text before it is sent to the model and to
//! every value the model sends back.

use regex::Regex;
use std::sync::OnceLock;

fn parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\s*\([^)]*\))+\s*").expect("parenthetical regex"))
}

/// Remove every `(...)` span together with the whitespace around it.
/// A run of spans between two words leaves a single space; a run at either end leaves nothing.
pub fn strip_parenthetical(text: &str) -> String {
    let re = parenthetical_re();
    if !re.is_match(text) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        if m.start() != 0 && m.end() != text.len() {
            out.push(' ');
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}

/// Placeholder values the model emits when it has nothing to report.
///
/// Matches the empty string, `N/A`, a run of the placeholder digit `9`
/// (`9`, `99999`, `9999999999`) and anything fully wrapped in parentheses.
pub fn is_invalid_value(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value == "N/A"
        || value.chars().all(|c| c == '9')
        || (value.len() >= 2 && value.starts_with('(') && value.ends_with(')'))
}

/// Trim, drop parenthetical notes, and blank out placeholders.
pub fn clean_value(raw: &str) -> String {
    let cleaned = strip_parenthetical(raw.trim());
    if is_invalid_value(&cleaned) {
        String::new()
    } else {
        cleaned
    }
}

/// "home phone" -> "Home phone"
fn capitalize(label: &str) -> String {
    let lower = label.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Rewrite bolded labels such as `**Fax:**` to their canonical form (`**Phone-1:**`).
pub fn remap_labels(text: &str, labels: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (raw, canonical) in labels {
        let marker = format!("**{}:**", capitalize(raw));
        if out.contains(&marker) {
            out = out.replace(&marker, &format!("**{}:**", canonical));
        }
    }
    out
}
