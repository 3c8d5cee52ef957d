//! Structural metrics for chunks and files.
//!
//! Everything here is a text heuristic over the source with comments and
//! string contents masked out. It never fails, so malformed sources and
//! languages without a parser get metrics the same way.

use super::language::{CommentSyntax, Language};
use serde::{Deserialize, Serialize};

/// Metrics of one chunk, or the aggregate of a file's chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Cyclomatic complexity: decision points + 1
    pub complexity: u32,
    pub nesting_depth: u32,
    pub lines: u32,
    pub code_lines: u32,
    pub comment_lines: u32,
    pub blank_lines: u32,
    pub tokens: u32,
    pub meaningful_tokens: u32,
    /// `meaningful_tokens / tokens`, 0 for an empty chunk
    pub density: f32,
}

impl Metrics {
    /// File-level metrics: max complexity and nesting, summed counts
    pub fn aggregate<'a, I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'a Metrics>,
    {
        let mut total = Metrics::default();
        for m in chunks {
            total.complexity = total.complexity.max(m.complexity);
            total.nesting_depth = total.nesting_depth.max(m.nesting_depth);
            total.lines += m.lines;
            total.code_lines += m.code_lines;
            total.comment_lines += m.comment_lines;
            total.blank_lines += m.blank_lines;
            total.tokens += m.tokens;
            total.meaningful_tokens += m.meaningful_tokens;
        }
        total.density = ratio(total.meaningful_tokens, total.tokens);
        total
    }
}

/// Compute metrics for a piece of source text
pub fn calculate(text: &str, language: Option<Language>) -> Metrics {
    let masked = mask_source(text, language);

    let mut metrics = Metrics::default();
    for (original, code) in text.lines().zip(masked.lines()) {
        metrics.lines += 1;
        if original.trim().is_empty() {
            metrics.blank_lines += 1;
        } else if code.trim().is_empty() {
            metrics.comment_lines += 1;
        } else {
            metrics.code_lines += 1;
        }
    }

    let (tokens, meaningful) = count_tokens(&masked);
    metrics.tokens = tokens;
    metrics.meaningful_tokens = meaningful;
    metrics.density = ratio(meaningful, tokens);

    metrics.complexity = decision_points(&masked, language) + 1;
    metrics.nesting_depth = if uses_braces(language) {
        brace_depth(&masked)
    } else {
        indent_depth(&masked)
    };

    metrics
}

fn ratio(part: u32, whole: u32) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}

fn uses_braces(language: Option<Language>) -> bool {
    matches!(
        language,
        Some(
            Language::Rust
                | Language::JavaScript
                | Language::TypeScript
                | Language::Tsx
                | Language::Go
                | Language::Java
                | Language::C
                | Language::Cpp
                | Language::CSharp
                | Language::Php
                | Language::Swift
                | Language::Kotlin
                | Language::Scala
                | Language::Css
                | Language::Json
        )
    )
}

fn string_delimiters(language: Option<Language>) -> &'static [&'static str] {
    match language {
        Some(Language::Python) => &["\"\"\"", "'''", "\"", "'"],
        Some(Language::JavaScript | Language::TypeScript | Language::Tsx | Language::Go) => {
            &["`", "\"", "'"]
        }
        Some(Language::Kotlin | Language::Scala | Language::Swift) => &["\"\"\"", "\""],
        // Single quotes are lifetimes or char literals, handled separately
        Some(Language::Rust) => &["\""],
        Some(Language::Markdown | Language::Text) | None => &[],
        Some(_) => &["\"", "'"],
    }
}

/// Replace comments with spaces and string contents with `_`, keeping byte
/// offsets and line breaks intact
pub(crate) fn mask_source(text: &str, language: Option<Language>) -> String {
    let syntax = language.map(|l| l.comment_syntax()).unwrap_or(CommentSyntax {
        line: &[],
        block: None,
    });
    let delimiters = string_delimiters(language);
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    let blank = |b: u8, fill: u8| if b == b'\n' { b'\n' } else { fill };

    'outer: while i < bytes.len() {
        let rest = &bytes[i..];

        if let Some((open, close)) = syntax.block
            && rest.starts_with(open.as_bytes())
        {
            let end = find(bytes, i + open.len(), close.as_bytes())
                .map(|p| p + close.len())
                .unwrap_or(bytes.len());
            out.extend(bytes[i..end].iter().map(|&b| blank(b, b' ')));
            i = end;
            continue;
        }

        for prefix in syntax.line {
            if rest.starts_with(prefix.as_bytes()) {
                let end = find(bytes, i, b"\n").unwrap_or(bytes.len());
                out.extend(std::iter::repeat_n(b' ', end - i));
                i = end;
                continue 'outer;
            }
        }

        for delimiter in delimiters {
            if rest.starts_with(delimiter.as_bytes()) {
                let multiline = delimiter.len() == 3 || *delimiter == "`";
                i = mask_string(bytes, i, delimiter.as_bytes(), multiline, &mut out);
                continue 'outer;
            }
        }

        if language == Some(Language::Rust) && bytes[i] == b'\'' {
            let is_char = match rest.get(1) {
                Some(b'\\') => true,
                Some(_) => rest.get(2) == Some(&b'\'') || char_literal_len(rest).is_some(),
                None => false,
            };
            if is_char {
                i = mask_string(bytes, i, b"'", false, &mut out);
                continue;
            }
        }

        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// `'é'` and other multi-byte char literals
fn char_literal_len(rest: &[u8]) -> Option<usize> {
    let slice = &rest[1..rest.len().min(5)];
    let text = match std::str::from_utf8(slice) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&slice[..e.valid_up_to()]).ok()?,
    };
    let c = text.chars().next()?;
    let len = c.len_utf8();
    (rest.get(1 + len) == Some(&b'\'')).then_some(len)
}

fn mask_string(bytes: &[u8], start: usize, delimiter: &[u8], multiline: bool, out: &mut Vec<u8>) -> usize {
    out.extend_from_slice(delimiter);
    let mut i = start + delimiter.len();
    while i < bytes.len() {
        if bytes[i..].starts_with(delimiter) {
            out.extend_from_slice(delimiter);
            return i + delimiter.len();
        }
        match bytes[i] {
            b'\n' if !multiline => return i,
            b'\n' => out.push(b'\n'),
            b'\\' if i + 1 < bytes.len() && bytes[i + 1] != b'\n' => {
                out.extend_from_slice(b"__");
                i += 2;
                continue;
            }
            _ => out.push(b'_'),
        }
        i += 1;
    }
    i
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn words(code: &str) -> impl Iterator<Item = &str> {
    code.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

fn decision_keywords(language: Option<Language>) -> &'static [&'static str] {
    match language {
        Some(Language::Python) => &["if", "elif", "for", "while", "except", "case", "and", "or"],
        Some(Language::Ruby) => &[
            "if", "elsif", "unless", "while", "until", "for", "when", "rescue", "and", "or",
        ],
        Some(Language::Shell) => &["if", "elif", "for", "while", "until", "case"],
        Some(Language::Rust) => &["if", "for", "while"],
        Some(Language::Go) => &["if", "for", "case"],
        Some(Language::Swift) => &["if", "guard", "for", "while", "case", "catch"],
        Some(Language::Php) => &["if", "elseif", "for", "foreach", "while", "case", "catch"],
        Some(Language::CSharp) => &["if", "for", "foreach", "while", "case", "catch"],
        Some(Language::Kotlin) => &["if", "for", "while", "when", "catch"],
        Some(Language::Sql) => &["when"],
        Some(l) if l.is_code() => &["if", "for", "while", "case", "catch"],
        _ => &[],
    }
}

fn decision_points(code: &str, language: Option<Language>) -> u32 {
    let keywords = decision_keywords(language);
    if keywords.is_empty() {
        return 0;
    }

    let mut count = words(code).filter(|w| keywords.contains(w)).count();

    if !matches!(language, Some(Language::Python)) {
        count += code.matches("&&").count() + code.matches("||").count();
    }

    match language {
        Some(Language::Rust) => count += code.matches("=>").count(),
        Some(
            Language::JavaScript
            | Language::TypeScript
            | Language::Tsx
            | Language::Java
            | Language::C
            | Language::Cpp
            | Language::CSharp
            | Language::Php,
        ) => {
            let bytes = code.as_bytes();
            count += bytes
                .iter()
                .enumerate()
                .filter(|&(i, &b)| {
                    b == b'?'
                        && !matches!(bytes.get(i + 1), Some(b'.' | b'?'))
                        && (i == 0 || bytes[i - 1] != b'?')
                })
                .count();
        }
        _ => {}
    }

    count as u32
}

fn brace_depth(code: &str) -> u32 {
    let mut depth: i64 = 0;
    let mut max = 0;
    for b in code.bytes() {
        match b {
            b'{' => {
                depth += 1;
                max = max.max(depth);
            }
            b'}' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    max as u32
}

fn indent_depth(code: &str) -> u32 {
    let indents: Vec<usize> = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.chars()
                .take_while(|c| c.is_whitespace())
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum()
        })
        .collect();

    let Some(&base) = indents.iter().min() else {
        return 0;
    };
    let unit = indents
        .iter()
        .filter(|&&i| i > base)
        .map(|&i| i - base)
        .min()
        .unwrap_or(4)
        .max(1);

    indents
        .iter()
        .map(|&i| ((i - base) / unit) as u32)
        .max()
        .unwrap_or(0)
}

/// (all tokens, meaningful tokens). Identifiers, keywords and literals are
/// meaningful; each punctuation character is a token of its own. Quotes are
/// not counted, so a string literal is a single meaningful token.
fn count_tokens(code: &str) -> (u32, u32) {
    let mut tokens = 0;
    let mut meaningful = 0;
    let mut in_word = false;

    for c in code.chars() {
        if c.is_alphanumeric() || c == '_' {
            if !in_word {
                tokens += 1;
                meaningful += 1;
                in_word = true;
            }
            continue;
        }
        in_word = false;
        if !c.is_whitespace() && !matches!(c, '"' | '\'' | '`') {
            tokens += 1;
        }
    }

    (tokens, meaningful)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_metrics() {
        let source = r#"def classify(x):
    # comment with if and or
    if x > 10 and x < 20:
        return "if or while"
    elif x < 0:
        for i in range(3):
            pass

    return None
"#;
        let m = calculate(source, Some(Language::Python));
        // if, and, elif, for
        assert_eq!(m.complexity, 5);
        assert_eq!(m.nesting_depth, 3);
        assert_eq!(m.lines, 9);
        assert_eq!(m.blank_lines, 1);
        assert_eq!(m.comment_lines, 1);
        assert_eq!(m.code_lines, 7);
        assert!(m.density > 0.0 && m.density <= 1.0);
    }

    #[test]
    fn test_rust_match_arms_and_braces() {
        let source = r#"fn kind<'a>(v: &'a str) -> u8 {
    // if while for
    match v {
        "a" => 1,
        "b" if v.len() > 1 && true => 2,
        _ => { if v.is_empty() { 3 } else { 4 } }
    }
}
"#;
        let m = calculate(source, Some(Language::Rust));
        // 3 arms, 2 ifs, one &&
        assert_eq!(m.complexity, 7);
        assert_eq!(m.nesting_depth, 4);
        assert_eq!(m.comment_lines, 1);
    }

    #[test]
    fn test_javascript_ternary_and_block_comment() {
        let source = "/* if if if\n   while */\nconst f = (a) => a ? b?.c : d ?? e;\n";
        let m = calculate(source, Some(Language::JavaScript));
        assert_eq!(m.complexity, 2);
        assert_eq!(m.comment_lines, 2);
        assert_eq!(m.code_lines, 1);
    }

    #[test]
    fn test_prose_has_no_decisions() {
        let m = calculate("If you read this, or not, while waiting.\n", Some(Language::Markdown));
        assert_eq!(m.complexity, 1);
        assert_eq!(m.nesting_depth, 0);
    }

    #[test]
    fn test_empty_text() {
        let m = calculate("", None);
        assert_eq!(m.lines, 0);
        assert_eq!(m.tokens, 0);
        assert_eq!(m.density, 0.0);
        assert_eq!(m.complexity, 1);
    }

    #[test]
    fn test_mask_keeps_offsets() {
        let source = "let s = \"héllo // not a comment\"; // real\nlet t = 1;\n";
        let masked = mask_source(source, Some(Language::Rust));
        assert_eq!(masked.len(), source.len());
        assert!(masked.starts_with("let s = \"_"));
        assert!(!masked.contains("real"));
        assert!(masked.ends_with("let t = 1;\n"));
    }

    #[test]
    fn test_unterminated_string_stops_at_newline() {
        let masked = mask_source("x = 'abc\nif y:\n    pass\n", Some(Language::Python));
        assert!(masked.contains("if y:"));
    }

    #[test]
    fn test_aggregate() {
        let a = Metrics {
            complexity: 3,
            nesting_depth: 1,
            lines: 10,
            code_lines: 8,
            comment_lines: 1,
            blank_lines: 1,
            tokens: 40,
            meaningful_tokens: 20,
            density: 0.5,
        };
        let b = Metrics {
            complexity: 5,
            nesting_depth: 2,
            lines: 4,
            code_lines: 4,
            tokens: 10,
            meaningful_tokens: 10,
            density: 1.0,
            ..Default::default()
        };
        let total = Metrics::aggregate([&a, &b]);
        assert_eq!(total.complexity, 5);
        assert_eq!(total.nesting_depth, 2);
        assert_eq!(total.lines, 14);
        assert_eq!(total.tokens, 50);
        assert!((total.density - 0.6).abs() < f32::EPSILON);
    }
}
