//! Response parsing for model output
//!
//! Model text is untrusted. It may wrap the JSON in prose, use full-width
//! punctuation, be slightly malformed, or nest the record inside arrays or
//! strings. The parser tolerates all of that and produces either a usable
//! record or a `Parse` error carrying the raw text.

use super::repair::parse_lenient;
use crate::error::{Result, StoryloomError};
use serde_json::{Map, Value};

/// Maximum number of array/string layers unwrapped to reach a mapping
pub const MAX_UNWRAP_DEPTH: usize = 4;

/// A parsed story turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRecord {
    /// Narrative text, reflowed for display
    pub description: String,
    /// Turn summary; blank when the model omitted it
    pub summary: String,
}

/// Parses the reply to an opening or continuation prompt
///
/// # Errors
///
/// Returns `Parse` when no mapping can be recovered or `description` is
/// missing or blank
///
/// # Examples
///
/// ```
/// use storyloom::engine::parser::parse_story;
///
/// let record = parse_story("Sure! {“description”： “门开了。』走吧』”， “summary”: “opened”}").unwrap();
/// assert_eq!(record.description, "门开了。』\n走吧』\n");
/// assert_eq!(record.summary, "opened");
/// ```
pub fn parse_story(raw: &str) -> Result<StoryRecord> {
    let map = extract_mapping(raw)?;

    let description = field_text(&map, "description");
    if description.trim().is_empty() {
        tracing::warn!("Model reply has no description");
        return Err(parse_error("response has no description", raw));
    }

    let summary = field_text(&map, "summary");
    if summary.trim().is_empty() {
        tracing::debug!("Model reply has no summary, recording a blank one");
    }

    Ok(StoryRecord {
        description: reflow(&description),
        summary: summary.trim().to_string(),
    })
}

/// Parses the reply to a summary prompt
///
/// # Errors
///
/// Returns `Parse` when no mapping can be recovered or `summary` is
/// missing or blank
pub fn parse_summary(raw: &str) -> Result<String> {
    let map = extract_mapping(raw)?;
    let summary = field_text(&map, "summary");
    if summary.trim().is_empty() {
        tracing::warn!("Summary reply has no summary field");
        return Err(parse_error("response has no summary", raw));
    }
    Ok(summary.trim().to_string())
}

/// Replaces full-width quotes, colon and comma with ASCII equivalents
pub fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '“' | '”' => '"',
            '：' => ':',
            '，' => ',',
            other => other,
        })
        .collect()
}

/// Inserts display line breaks
///
/// A newline follows each full-width sentence terminator (`。！？`) unless
/// a closing `』` comes next, and follows each `』`. In Latin text the space
/// after `.`, `!` or `?` (or after a `"` closing such a sentence) becomes a
/// newline. Existing newlines are not doubled.
///
/// # Examples
///
/// ```
/// use storyloom::engine::parser::reflow;
///
/// assert_eq!(reflow("雨停了。他说：『走吧。』我们出发！"), "雨停了。\n他说：『走吧。』\n我们出发！\n");
/// assert_eq!(
///     reflow("The door opens. \"Who is there?\" she asks."),
///     "The door opens.\n\"Who is there?\"\nshe asks."
/// );
/// ```
pub fn reflow(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + chars.len() / 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        let next = chars.get(i).copied();

        let full_width_break = match c {
            '。' | '！' | '？' => next != Some('』'),
            '』' => true,
            _ => false,
        };
        if full_width_break {
            if next != Some('\n') {
                out.push('\n');
            }
            continue;
        }

        if ends_latin_sentence(&chars, i - 1) {
            let mut after = i;
            while matches!(chars.get(after), Some(' ') | Some('\t')) {
                after += 1;
            }
            // trailing blanks and blanks before an existing newline stay
            if after > i && !matches!(chars.get(after), None | Some('\n') | Some('\r')) {
                out.push('\n');
                i = after;
            }
        }
    }
    out
}

fn ends_latin_sentence(chars: &[char], at: usize) -> bool {
    let terminator = |c: char| matches!(c, '.' | '!' | '?');
    match chars[at] {
        c if terminator(c) => true,
        '"' => at > 0 && terminator(chars[at - 1]),
        _ => false,
    }
}

fn extract_mapping(raw: &str) -> Result<Map<String, Value>> {
    let normalized = normalize_punctuation(raw);
    let whole = normalized.trim();

    // the first-`{` to last-`}` slice is tried before the whole text,
    // strict parses before repairs
    let mut candidates = Vec::with_capacity(2);
    if let (Some(start), Some(end)) = (whole.find('{'), whole.rfind('}')) {
        if end > start && (start > 0 || end + 1 < whole.len()) {
            candidates.push(&whole[start..=end]);
        }
    }
    candidates.push(whole);

    let parsed = candidates
        .iter()
        .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .or_else(|| candidates.iter().find_map(|candidate| repair(candidate)));
    let mut value = parsed.ok_or_else(|| parse_error("no JSON found", raw))?;

    for depth in 0..=MAX_UNWRAP_DEPTH {
        value = match value {
            Value::Object(map) => return Ok(map),
            _ if depth == MAX_UNWRAP_DEPTH => break,
            Value::Array(items) => {
                tracing::debug!("Unwrapping array reply (depth {})", depth + 1);
                items
                    .into_iter()
                    .next()
                    .ok_or_else(|| parse_error("reply is an empty array", raw))?
            }
            Value::String(text) => {
                tracing::debug!("Re-parsing string reply (depth {})", depth + 1);
                parse_value(&text).ok_or_else(|| parse_error("string reply is not JSON", raw))?
            }
            _ => return Err(parse_error("reply is not a JSON object", raw)),
        };
    }

    Err(parse_error("reply nested too deeply", raw))
}

fn repair(text: &str) -> Option<Value> {
    match parse_lenient(text) {
        Ok(value) => {
            tracing::debug!("Strict JSON parse failed, repaired reply");
            Some(value)
        }
        Err(e) => {
            tracing::debug!("JSON repair failed: {}", e);
            None
        }
    }
}

fn parse_value(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| repair(text))
}

fn field_text(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn parse_error(message: &str, raw: &str) -> anyhow::Error {
    StoryloomError::Parse {
        message: message.to_string(),
        raw: raw.to_string(),
    }
    .into()
}
