//! Common helpers shared by the export renderers.

/// Escape special characters for Typst string literals.
pub fn escape_typst_string(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', r#"\""#)
        .replace('\r', "")
        .replace('\n', r"\n")
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Download name for an exported document: `{Prefix}_{Subject}.pdf`.
///
/// Path separators and reserved characters are stripped from the subject;
/// an empty subject becomes `Document`.
pub fn export_filename(prefix: &str, subject: &str) -> String {
    let subject = sanitize_filename::sanitize(subject.trim());
    let subject = if subject.trim().is_empty() {
        "Document".to_string()
    } else {
        subject.trim().to_string()
    };
    format!("{}_{}.pdf", prefix, subject)
}

/// Convert a CSS length into a Typst length. Pixels map at 96 dpi.
pub fn css_length_to_typst(value: &str) -> Option<String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f32 = number.parse().ok()?;

    match unit.trim() {
        "px" => Some(format!("{}pt", trim_float(number * 0.75))),
        "pt" | "mm" | "cm" | "em" | "%" => Some(format!("{}{}", trim_float(number), unit.trim())),
        "in" => Some(format!("{}in", trim_float(number))),
        "rem" => Some(format!("{}em", trim_float(number))),
        "" if number == 0.0 => Some("0pt".to_string()),
        _ => None,
    }
}

/// Convert a CSS color into a Typst color expression.
pub fn css_color_to_typst(value: &str) -> Option<String> {
    let value = value.trim().trim_end_matches("!important").trim();
    let lower = value.to_ascii_lowercase();

    match lower.as_str() {
        "white" => return Some("white".to_string()),
        "black" => return Some("black".to_string()),
        "transparent" | "none" | "inherit" | "currentcolor" => return None,
        _ => {}
    }

    if let Some(hex) = lower.strip_prefix('#') {
        let valid = matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit());
        return valid.then(|| format!("rgb(\"#{}\")", hex));
    }

    if let Some(args) = lower.strip_prefix("rgb(").and_then(|s| s.strip_suffix(')')) {
        let channels: Vec<u8> = args
            .split(',')
            .filter_map(|c| c.trim().parse::<u8>().ok())
            .collect();
        if channels.len() == 3 {
            return Some(format!("rgb({}, {}, {})", channels[0], channels[1], channels[2]));
        }
    }

    None
}

fn trim_float(value: f32) -> String {
    let formatted = format!("{:.2}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
