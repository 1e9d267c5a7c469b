//! Tolerant JSON parsing for hand-written and model-generated text.
//!
//! [`repair`] rewrites the first JSON value found in the input into strict
//! JSON. It handles:
//! - Markdown code fences and prose around the value
//! - single-quoted strings and unquoted object keys
//! - `True`/`False`/`None`/`undefined` literals
//! - `//` and `/* */` comments
//! - trailing commas
//! - strings and containers cut off at the end of the input

#[derive(thiserror::Error, Debug)]
pub enum RepairError {
    #[error("no JSON value found")]
    Empty,

    #[error("cannot repair JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Repair `input` and parse it.
pub fn parse(input: &str) -> Result<serde_json::Value, RepairError> {
    let body = strip_fences(input);
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(RepairError::Empty);
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let Some(start) = trimmed.find(|c: char| c == '{' || c == '[') else {
        return Ok(serde_json::from_str(trimmed)?);
    };
    let fixed = Scanner::new(&trimmed[start..]).run();
    tracing::trace!(repaired = %fixed, "json repaired");
    Ok(serde_json::from_str(&fixed)?)
}

/// Repair `input` into compact strict JSON text.
pub fn repair(input: &str) -> Result<String, RepairError> {
    let value = parse(input)?;
    Ok(serde_json::to_string(&value)?)
}

/// The body of the first fenced block, or the input itself.
fn strip_fences(input: &str) -> &str {
    let Some(open) = input.find("```") else {
        return input;
    };
    let after = &input[open + 3..];
    // Skip the info string (` ```json `).
    let body = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => after,
    };
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    out: String,
    closers: Vec<char>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            out: String::with_capacity(input.len() + 16),
            closers: Vec::new(),
        }
    }

    fn run(mut self) -> String {
        while let Some(c) = self.chars.next() {
            match c {
                '{' => self.open(c, '}'),
                '[' => self.open(c, ']'),
                '}' | ']' => {
                    self.close(c);
                    if self.closers.is_empty() {
                        break;
                    }
                }
                '"' | '\'' => self.string(c),
                '/' if matches!(self.chars.peek(), Some('/') | Some('*')) => self.comment(),
                c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.word(c),
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(c),
                ',' | ':' => self.out.push(c),
                c if c.is_whitespace() => self.out.push(c),
                _ => {}
            }
        }
        self.finish()
    }

    fn open(&mut self, c: char, closer: char) {
        self.out.push(c);
        self.closers.push(closer);
    }

    fn close(&mut self, c: char) {
        self.drop_trailing_comma();
        while let Some(expected) = self.closers.pop() {
            if self.out.trim_end().ends_with(':') {
                self.out.push_str("null");
            }
            self.out.push(expected);
            if expected == c {
                break;
            }
        }
    }

    fn drop_trailing_comma(&mut self) {
        let end = self.out.trim_end().len();
        if self.out[..end].ends_with(',') {
            self.out.truncate(end - 1);
        }
    }

    fn string(&mut self, quote: char) {
        self.out.push('"');
        while let Some(c) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some('\'') => self.out.push('\''),
                    Some(escaped) => {
                        self.out.push('\\');
                        self.out.push(escaped);
                    }
                    None => break,
                },
                c if c == quote => {
                    self.out.push('"');
                    return;
                }
                '"' => self.out.push_str("\\\""),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                c => self.out.push(c),
            }
        }
        // Unterminated.
        self.out.push('"');
    }

    fn comment(&mut self) {
        match self.chars.next() {
            Some('/') => {
                for c in self.chars.by_ref() {
                    if c == '\n' {
                        self.out.push('\n');
                        break;
                    }
                }
            }
            _ => {
                let mut star = false;
                for c in self.chars.by_ref() {
                    if star && c == '/' {
                        break;
                    }
                    star = c == '*';
                }
            }
        }
    }

    fn word(&mut self, first: char) {
        let mut word = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        if self.next_is_colon() {
            self.out.push('"');
            self.out.push_str(&word);
            self.out.push('"');
            return;
        }
        match word.as_str() {
            "true" | "True" | "TRUE" => self.out.push_str("true"),
            "false" | "False" | "FALSE" => self.out.push_str("false"),
            "null" | "None" | "NULL" | "nil" | "undefined" => self.out.push_str("null"),
            _ => {
                self.out.push('"');
                self.out.push_str(&word);
                self.out.push('"');
            }
        }
    }

    fn next_is_colon(&self) -> bool {
        let rest: String = self.chars.clone().collect();
        rest.trim_start().starts_with(':')
    }

    fn number(&mut self, first: char) {
        let mut number = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+') {
                number.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let number = number.trim_start_matches('+');
        if number.starts_with('.') {
            self.out.push('0');
        }
        self.out.push_str(number.trim_end_matches('.'));
    }

    fn finish(mut self) -> String {
        let trimmed = self.out.trim_end().len();
        self.out.truncate(trimmed);
        while let Some(closer) = self.closers.pop() {
            self.drop_trailing_comma();
            if self.out.ends_with(':') {
                self.out.push_str("null");
            }
            self.out.push(closer);
        }
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_passes_through() {
        assert_eq!(parse(r#"{"a": [1, 2]}"#).unwrap(), json!({"a": [1, 2]}));
        assert_eq!(parse("42").unwrap(), json!(42));
    }

    #[test]
    fn fences_and_prose_are_dropped() {
        let input = "Here is the result:\n```json\n{\"ok\": true}\n```\nHope it helps.";
        assert_eq!(parse(input).unwrap(), json!({"ok": true}));

        let input = "The answer is [1, 2, 3] as requested.";
        assert_eq!(parse(input).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn loose_syntax_is_normalised() {
        let input = "{name: 'O\\'Neil', says: 'a \"quote\"', ok: True, none: None,}";
        assert_eq!(
            parse(input).unwrap(),
            json!({"name": "O'Neil", "says": "a \"quote\"", "ok": true, "none": null})
        );
    }

    #[test]
    fn comments_are_skipped() {
        let input = "{\n  // count\n  \"n\": 1, /* inline */ \"m\": 2\n}";
        assert_eq!(parse(input).unwrap(), json!({"n": 1, "m": 2}));
    }

    #[test]
    fn truncated_input_is_closed() {
        assert_eq!(parse(r#"{"items": [1, 2, "thr"#).unwrap(), json!({"items": [1, 2, "thr"]}));
        assert_eq!(parse(r#"{"a": {"b": 1,"#).unwrap(), json!({"a": {"b": 1}}));
        assert_eq!(parse(r#"{"a":"#).unwrap(), json!({"a": null}));
    }

    #[test]
    fn repair_emits_compact_json() {
        assert_eq!(repair("[1, 2, ]").unwrap(), "[1,2]");
    }

    #[test]
    fn hopeless_input_fails() {
        assert!(matches!(parse("   "), Err(RepairError::Empty)));
        assert!(matches!(parse("no json here"), Err(RepairError::Invalid(_))));
    }
}
