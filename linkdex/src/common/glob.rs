use crate::errors::{IndexError, IndexResult};
use regex::Regex;

/// Shell-style pattern matched against index entry names.
///
/// Supports `*` (any run of characters), `?` (one character), bracket
/// classes `[abc]`, `[a-z]`, negated `[!abc]` / `[^abc]`, and `\` to escape
/// the next character. The pattern always matches the whole name.
///
/// # Examples
///
/// ```
/// use linkdex::common::GlobPattern;
///
/// let pattern = GlobPattern::new("j*@example.com").unwrap();
/// assert!(pattern.matches("jacky@example.com"));
/// assert!(!pattern.matches("mikey@example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> IndexResult<Self> {
        if pattern.is_empty() {
            return Err(IndexError::invalid_value("search pattern must not be empty"));
        }

        let regex = Regex::new(&translate(pattern))?;
        Ok(GlobPattern {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                push_literal(&mut out, chars[i]);
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut out, &chars[i + 1..end]);
                    i = end;
                }
                None => push_literal(&mut out, '['),
            },
            c => push_literal(&mut out, c),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if i < chars.len() && (chars[i] == '!' || chars[i] == '^') {
        i += 1;
    }
    // a leading ']' is a member, not the terminator
    if i < chars.len() && chars[i] == ']' {
        i += 1;
    }
    while i < chars.len() {
        if chars[i] == ']' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn push_class(out: &mut String, body: &[char]) {
    out.push('[');
    let mut members = body;
    if let Some(first) = members.first() {
        if *first == '!' || *first == '^' {
            out.push('^');
            members = &members[1..];
        }
    }
    for c in members {
        match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => {
                out.push('\\');
                out.push(*c);
            }
            c => out.push(*c),
        }
    }
    out.push(']');
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}
