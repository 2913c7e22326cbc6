//! Lenient JSON reader for model output
//!
//! Models often return almost-JSON: trailing commas, single quotes, bare
//! keys, Python literals, comments, raw newlines inside strings, unescaped
//! quotes in prose, or output cut off mid-object. `parse_lenient` reads
//! such text into a `serde_json::Value`, closing whatever is left open.

use serde_json::{Map, Number, Value};

const MAX_NESTING: usize = 128;

/// Parses almost-JSON text
///
/// # Errors
///
/// Returns a description of the failure when nothing value-like is found
/// or nesting is too deep
///
/// # Examples
///
/// ```
/// use storyloom::engine::repair::parse_lenient;
///
/// let value = parse_lenient("{description: 'A quiet hall', done: True,}").unwrap();
/// assert_eq!(value["description"], "A quiet hall");
/// assert_eq!(value["done"], true);
/// ```
pub fn parse_lenient(text: &str) -> Result<Value, String> {
    let mut reader = Reader::new(text);
    reader.skip_insignificant();
    if reader.peek().is_none() {
        return Err("empty input".to_string());
    }
    reader.value(0)
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Skips whitespace and `//`, `/* */` and `#` comments
    fn skip_insignificant(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some('/'), Some('/')) | (Some('#'), _) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    while self.peek().is_some() {
                        if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    /// Whether a quote just consumed ends the current string
    fn quote_closes(&self, quote: char) -> bool {
        let mut index = self.pos;
        let mut crossed_newline = false;
        while let Some(c) = self.chars.get(index).copied() {
            if c == '\n' {
                crossed_newline = true;
            }
            if !c.is_whitespace() {
                return match c {
                    ',' | ':' | '}' | ']' | '#' => true,
                    '/' => matches!(self.chars.get(index + 1).copied(), Some('/') | Some('*')),
                    // missing comma between members on separate lines
                    c if c == quote || c == '"' => crossed_newline,
                    _ => false,
                };
            }
            index += 1;
        }
        true
    }

    fn value(&mut self, depth: usize) -> Result<Value, String> {
        if depth > MAX_NESTING {
            return Err("nesting too deep".to_string());
        }
        self.skip_insignificant();
        match self.peek() {
            None => Ok(Value::Null),
            Some('{') => self.object(depth),
            Some('[') => self.array(depth),
            Some(q @ ('"' | '\'')) => Ok(Value::String(self.string(q))),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => Ok(self.number_or_word()),
            Some(_) => Ok(self.bare_value()),
        }
    }

    fn object(&mut self, depth: usize) -> Result<Value, String> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_insignificant();
            match self.peek() {
                None => break,
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                Some(']') => {
                    // mismatched closer, treat as end of object
                    self.pos += 1;
                    break;
                }
                _ => {}
            }

            let key = match self.peek() {
                Some(q @ ('"' | '\'')) => self.string(q),
                _ => self.bare_key(),
            };

            self.skip_insignificant();
            let value = if self.peek() == Some(':') {
                self.pos += 1;
                self.skip_insignificant();
                match self.peek() {
                    None | Some('}') | Some(',') => Value::Null,
                    _ => self.value(depth + 1)?,
                }
            } else {
                Value::Null
            };

            if !key.is_empty() {
                map.insert(key, value);
            }
        }
        Ok(Value::Object(map))
    }

    fn array(&mut self, depth: usize) -> Result<Value, String> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_insignificant();
            match self.peek() {
                None => break,
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                _ => items.push(self.value(depth + 1)?),
            }
        }
        Ok(Value::Array(items))
    }

    /// Reads a quoted string; the opening quote is at the cursor
    ///
    /// A quote only closes the string when what follows can end a value:
    /// `,`, `:`, `}`, `]`, a comment, the end of input, or another member
    /// starting on a new line. Any other quote is kept as literal text.
    fn string(&mut self, quote: char) -> String {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('/') => out.push('/'),
                    Some('u') => out.push(self.unicode_escape()),
                    Some(other) => out.push(other),
                    None => break,
                },
                c if c == quote => {
                    if self.quote_closes(quote) {
                        return out;
                    }
                    out.push(c);
                }
                c => out.push(c),
            }
        }
        out
    }

    fn unicode_escape(&mut self) -> char {
        let hex: String = (0..4).filter_map(|_| self.bump()).collect();
        let Ok(code) = u32::from_str_radix(&hex, 16) else {
            return '\u{fffd}';
        };
        if (0xD800..0xDC00).contains(&code)
            && self.peek() == Some('\\')
            && self.peek_at(1) == Some('u')
        {
            let save = self.pos;
            self.pos += 2;
            let low: String = (0..4).filter_map(|_| self.bump()).collect();
            if let Ok(low) = u32::from_str_radix(&low, 16) {
                if (0xDC00..0xE000).contains(&low) {
                    let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(combined).unwrap_or('\u{fffd}');
                }
            }
            self.pos = save;
        }
        char::from_u32(code).unwrap_or('\u{fffd}')
    }

    fn bare_key(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ':' || c == ',' || c == '}' || c == '\n' {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn read_bare(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == '}' || c == ']' || c == '\n' {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn number_or_word(&mut self) -> Value {
        let word = self.read_bare();
        let trimmed = word.trim_start_matches('+');
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Number(i.into());
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
        Value::String(word)
    }

    fn bare_value(&mut self) -> Value {
        let word = self.read_bare();
        match word.as_str() {
            "true" | "True" => Value::Bool(true),
            "false" | "False" => Value::Bool(false),
            "null" | "None" | "undefined" => Value::Null,
            _ => Value::String(word),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_unchanged() {
        let text = r#"{"description": "A hall", "summary": "hall", "n": [1, 2.5, null]}"#;
        let expected: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parse_lenient(text).unwrap(), expected);
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(
            parse_lenient(r#"{"a": [1, 2,], "b": "x",}"#).unwrap(),
            json!({"a": [1, 2], "b": "x"})
        );
    }

    #[test]
    fn test_unquoted_keys_and_single_quotes() {
        assert_eq!(
            parse_lenient("{description: 'It\\'s dark', summary: 'dark'}").unwrap(),
            json!({"description": "It's dark", "summary": "dark"})
        );
    }

    #[test]
    fn test_python_literals() {
        assert_eq!(
            parse_lenient("{'a': True, 'b': False, 'c': None}").unwrap(),
            json!({"a": true, "b": false, "c": null})
        );
    }

    #[test]
    fn test_comments() {
        let text = "{\n  // the scene\n  \"description\": \"x\", /* inline */ \"summary\": \"y\" # tail\n}";
        assert_eq!(
            parse_lenient(text).unwrap(),
            json!({"description": "x", "summary": "y"})
        );
    }

    #[test]
    fn test_unterminated_string_and_object() {
        assert_eq!(
            parse_lenient(r#"{"description": "The door creaks open"#).unwrap(),
            json!({"description": "The door creaks open"})
        );
    }

    #[test]
    fn test_unterminated_nested_containers() {
        assert_eq!(
            parse_lenient(r#"{"a": {"b": [1, 2"#).unwrap(),
            json!({"a": {"b": [1, 2]}})
        );
    }

    #[test]
    fn test_unescaped_inner_quotes() {
        let text = r#"{"description": "She said "run" and left.", "summary": "fled"}"#;
        assert_eq!(
            parse_lenient(text).unwrap(),
            json!({"description": "She said \"run\" and left.", "summary": "fled"})
        );
    }

    #[test]
    fn test_raw_newlines_in_string() {
        let text = "{\"description\": \"line one\nline two\"}";
        assert_eq!(
            parse_lenient(text).unwrap(),
            json!({"description": "line one\nline two"})
        );
    }

    #[test]
    fn test_missing_comma_between_lines() {
        let text = "{\"description\": \"x\"\n  \"summary\": \"y\"}";
        assert_eq!(
            parse_lenient(text).unwrap(),
            json!({"description": "x", "summary": "y"})
        );
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(
            parse_lenient(r#"{"description": "x", "summary":}"#).unwrap(),
            json!({"description": "x", "summary": null})
        );
    }

    #[test]
    fn test_unicode_escapes() {
        assert_eq!(
            parse_lenient(r#"{"a": "\u4f60\u597d", "b": "\ud83d\ude00"}"#).unwrap(),
            json!({"a": "你好", "b": "😀"})
        );
    }

    #[test]
    fn test_top_level_array_and_string() {
        assert_eq!(parse_lenient("[{'a': 1}]").unwrap(), json!([{"a": 1}]));
        assert_eq!(parse_lenient("\"{\\\"a\\\": 1}\"").unwrap(), json!("{\"a\": 1}"));
    }

    #[test]
    fn test_empty_input_errors() {
        assert!(parse_lenient("   ").is_err());
        assert!(parse_lenient("// only a comment").is_err());
    }

    #[test]
    fn test_deep_nesting_errors() {
        let text = "[".repeat(MAX_NESTING + 10);
        assert!(parse_lenient(&text).is_err());
    }
}
