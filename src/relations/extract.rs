//! Symbol and reference extraction for one file.
//!
//! Symbols come from the parse result. References are found by text matching
//! over the source with comments and string contents masked out: import
//! statements, inheritance clauses, call sites (`name(`) and plain identifier
//! mentions. Each reference is attributed to the innermost enclosing symbol,
//! or to the file when it occurs outside any symbol.

use super::types::{EdgeSource, RawReference, RelationKind, Symbol, SymbolId};
use crate::indexer::chunker::chunk_at_offset;
use crate::indexer::metrics::mask_source;
use crate::indexer::{CodeChunk, Language, ParseResult};
use anyhow::Result;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const KEYWORDS: &[&str] = &[
    "abstract", "and", "as", "assert", "async", "await", "bool", "boolean", "break", "byte",
    "case", "catch", "char", "class", "const", "continue", "crate", "def", "default", "defer",
    "del", "delete", "do", "double", "dyn", "elif", "else", "elsif", "end", "enum", "except",
    "export", "extends", "extern", "false", "False", "final", "finally", "float", "fn", "for",
    "foreach", "from", "func", "function", "go", "guard", "if", "impl", "implements", "import",
    "in", "include", "instanceof", "int", "interface", "is", "lambda", "let", "long", "loop",
    "match", "mod", "module", "mut", "namespace", "new", "nil", "None", "nonlocal", "not", "null",
    "nullptr", "object", "or", "override", "package", "pass", "print", "private", "protected",
    "pub", "public", "raise", "ref", "require", "rescue", "return", "self", "Self", "short",
    "signed", "sizeof", "static", "str", "string", "struct", "super", "switch", "this", "throw",
    "throws", "trait", "true", "True", "try", "type", "typedef", "typeof", "u8", "u16", "u32",
    "u64", "usize", "i8", "i16", "i32", "i64", "isize", "f32", "f64", "union", "unless",
    "unsafe", "unsigned", "until", "use", "using", "var", "virtual", "void", "volatile", "when",
    "where", "while", "with", "yield",
];

/// Build the symbols of a parsed file, each attributed to the chunk containing
/// its start
pub fn build_symbols(file_path: &str, parsed: &ParseResult, chunks: &[CodeChunk]) -> Vec<Symbol> {
    let unique_names = parsed.unique_names();
    let ids: Vec<SymbolId> = unique_names
        .iter()
        .map(|name| SymbolId::new(file_path, name))
        .collect();

    parsed
        .symbols
        .iter()
        .enumerate()
        .filter_map(|(i, parsed_symbol)| {
            let chunk = chunk_at_offset(chunks, parsed_symbol.start_byte)?;
            Some(Symbol {
                id: ids[i].clone(),
                name: parsed_symbol.name.clone(),
                qualified_name: parsed_symbol.qualified_name.clone(),
                kind: parsed_symbol.kind,
                visibility: parsed_symbol.visibility,
                file_path: file_path.to_string(),
                chunk_id: chunk.id.clone(),
                line: parsed_symbol.line,
                start_line: parsed_symbol.start_line,
                end_line: parsed_symbol.end_line,
                parent: parsed_symbol.parent.map(|p| ids[p].clone()),
                signature: parsed_symbol.signature.clone(),
            })
        })
        .collect()
}

/// Finds references using regex matching over masked source lines
pub struct ReferenceExtractor {
    identifier: Regex,
    call: Regex,
    python_import: Regex,
    python_from: Regex,
    python_class: Regex,
    js_import: Regex,
    js_bare_import: Regex,
    require: Regex,
    rust_use: Regex,
    rust_impl_for: Regex,
    dotted_import: Regex,
    go_import: Regex,
    go_import_spec: Regex,
    include: Regex,
    csharp_using: Regex,
    php_use: Regex,
    extends: Regex,
    colon_bases: Regex,
    ruby_class: Regex,
    keywords: HashSet<&'static str>,
}

impl ReferenceExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            identifier: Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b")?,
            call: Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(")?,
            python_import: Regex::new(r"^\s*import\s+(.+)$")?,
            python_from: Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+(.+)$")?,
            python_class: Regex::new(r"^\s*class\s+\w+\s*\(([^)]*)\)")?,
            js_import: Regex::new(r#"^\s*import\s+(.+?)\s+from\s+['"]([^'"]+)['"]"#)?,
            js_bare_import: Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#)?,
            require: Regex::new(r#"\brequire(?:_relative)?\s*\(?\s*['"]([^'"]+)['"]"#)?,
            rust_use: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([^;]+);")?,
            rust_impl_for: Regex::new(r"^\s*impl\b(?:\s*<[^>]*>)?\s+([\w:]+)(?:<[^>]*>)?\s+for\s+")?,
            dotted_import: Regex::new(r"^\s*import\s+(?:static\s+)?([\w.]+?)(?:\.\*)?\s*;?\s*$")?,
            go_import: Regex::new(r#"^\s*import\s+(?:[\w.]+\s+)?"([^"]+)""#)?,
            go_import_spec: Regex::new(r#"^\s*(?:[\w.]+\s+)?"([^"]+)"\s*$"#)?,
            include: Regex::new(r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#)?,
            csharp_using: Regex::new(r"^\s*using\s+(?:static\s+)?([\w.]+)\s*;")?,
            php_use: Regex::new(r"^\s*use\s+([\w\\]+)")?,
            extends: Regex::new(r"\b(?:extends|implements)\s+([^{]+)")?,
            colon_bases: Regex::new(r"\b(?:class|struct|protocol|enum)\s+\w+\s*(?:final\s*)?:\s*([^{;]+)")?,
            ruby_class: Regex::new(r"^\s*class\s+\w+\s*<\s*([\w:]+)")?,
            keywords: KEYWORDS.iter().copied().collect(),
        })
    }

    /// Raw references of one file, deduplicated per (source, kind, name)
    pub fn extract(
        &self,
        file_path: &str,
        content: &str,
        language: Option<Language>,
        symbols: &[Symbol],
        chunks: &[CodeChunk],
    ) -> Vec<RawReference> {
        let mut references = Vec::new();
        if chunks.is_empty() {
            return references;
        }

        let masked = mask_source(content, language);
        let mut declared_on_line: HashMap<usize, Vec<&str>> = HashMap::new();
        for symbol in symbols {
            declared_on_line
                .entry(symbol.line)
                .or_default()
                .push(symbol.name.as_str());
        }

        let mut seen: HashSet<(EdgeSource, RelationKind, String)> = HashSet::new();
        let mut in_go_import_block = false;
        let mut line_offset = 0;

        for (index, (raw, code)) in content.split_inclusive('\n').zip(masked.split_inclusive('\n')).enumerate() {
            let line = index + 1;
            let offset = line_offset;
            line_offset += raw.len();

            let raw = raw.trim_end_matches(['\n', '\r']);
            let code = code.trim_end_matches(['\n', '\r']);
            if code.trim().is_empty() {
                continue;
            }

            let Some(chunk) = chunk_at_offset(chunks, offset) else {
                continue;
            };
            let source = enclosing_source(file_path, symbols, line);
            let mut push = |name: &str, kind: RelationKind| {
                let name = name.trim();
                if name.is_empty() {
                    return;
                }
                if seen.insert((source.clone(), kind, name.to_string())) {
                    references.push(RawReference {
                        name: name.to_string(),
                        kind,
                        source: source.clone(),
                        chunk: chunk.id.clone(),
                        line,
                    });
                }
            };

            if language == Some(Language::Go) {
                let trimmed = code.trim();
                if in_go_import_block {
                    if trimmed.starts_with(')') {
                        in_go_import_block = false;
                    } else if let Some(caps) = self.go_import_spec.captures(raw) {
                        push(&caps[1], RelationKind::Imports);
                    }
                    continue;
                }
                if trimmed.starts_with("import") && trimmed.ends_with('(') {
                    in_go_import_block = true;
                    continue;
                }
            }

            let imports = self.import_names(raw, language);
            if !imports.is_empty() {
                for name in &imports {
                    push(name, RelationKind::Imports);
                }
                continue;
            }

            let bases = self.inheritance_names(code, language);
            for name in &bases {
                push(name, RelationKind::Inherits);
            }

            let declared = declared_on_line.get(&line);
            let is_declared = |name: &str| declared.is_some_and(|names| names.contains(&name));

            let mut call_positions = HashSet::new();
            for caps in self.call.captures_iter(code) {
                let Some(m) = caps.get(1) else { continue };
                let name = m.as_str();
                if self.keywords.contains(name) || is_declared(name) || is_definition_keyword_before(code, m.start()) {
                    continue;
                }
                call_positions.insert(m.start());
                push(name, RelationKind::Calls);
            }

            for m in self.identifier.find_iter(code) {
                let name = m.as_str();
                if call_positions.contains(&m.start())
                    || self.keywords.contains(name)
                    || is_declared(name)
                    || bases.iter().any(|b| b == name)
                    || name.chars().all(|c| c == '_')
                {
                    continue;
                }
                push(name, RelationKind::References);
            }
        }

        references
    }

    fn import_names(&self, raw: &str, language: Option<Language>) -> Vec<String> {
        let Some(language) = language else {
            return Vec::new();
        };
        let mut names = Vec::new();

        match language {
            Language::Python => {
                if let Some(caps) = self.python_from.captures(raw) {
                    let module = &caps[1];
                    for item in split_items(&caps[2]) {
                        if item == "*" {
                            names.push(module.to_string());
                        } else {
                            names.push(item);
                        }
                    }
                } else if let Some(caps) = self.python_import.captures(raw) {
                    names.extend(split_items(&caps[1]));
                }
            }
            Language::JavaScript | Language::TypeScript | Language::Tsx => {
                if let Some(caps) = self.js_import.captures(raw) {
                    let clause = caps[1].trim().trim_start_matches("type ");
                    if clause.contains("* as") {
                        names.push(caps[2].to_string());
                    } else {
                        names.extend(split_items(&clause.replace(['{', '}'], ",")));
                    }
                } else if let Some(caps) = self.js_bare_import.captures(raw) {
                    names.push(caps[1].to_string());
                } else if let Some(caps) = self.require.captures(raw) {
                    names.push(caps[1].to_string());
                }
            }
            Language::Rust => {
                if let Some(caps) = self.rust_use.captures(raw) {
                    let items = caps[1].replace(['{', '}'], ",");
                    for item in split_items(&items) {
                        let simple = item.rsplit("::").next().unwrap_or(&item).to_string();
                        if !matches!(simple.as_str(), "self" | "super" | "crate" | "*" | "") {
                            names.push(simple);
                        }
                    }
                }
            }
            Language::Java | Language::Kotlin | Language::Scala | Language::Swift => {
                if let Some(caps) = self.dotted_import.captures(raw) {
                    names.push(caps[1].to_string());
                }
            }
            Language::Go => {
                if let Some(caps) = self.go_import.captures(raw) {
                    names.push(caps[1].to_string());
                }
            }
            Language::C | Language::Cpp => {
                if let Some(caps) = self.include.captures(raw) {
                    names.push(caps[1].to_string());
                }
            }
            Language::CSharp => {
                if let Some(caps) = self.csharp_using.captures(raw) {
                    names.push(caps[1].to_string());
                }
            }
            Language::Php => {
                if let Some(caps) = self.php_use.captures(raw) {
                    names.push(caps[1].to_string());
                }
            }
            Language::Ruby => {
                if let Some(caps) = self.require.captures(raw) {
                    names.push(caps[1].to_string());
                }
            }
            _ => {}
        }

        names
    }

    fn inheritance_names(&self, code: &str, language: Option<Language>) -> Vec<String> {
        let Some(language) = language else {
            return Vec::new();
        };

        let clause = match language {
            Language::Python => self
                .python_class
                .captures(code)
                .map(|caps| caps[1].to_string()),
            Language::Rust => self
                .rust_impl_for
                .captures(code)
                .map(|caps| caps[1].to_string()),
            Language::Ruby => self.ruby_class.captures(code).map(|caps| caps[1].to_string()),
            Language::JavaScript
            | Language::TypeScript
            | Language::Tsx
            | Language::Java
            | Language::Php
            | Language::Kotlin
            | Language::Scala => {
                let clauses: Vec<String> = self
                    .extends
                    .captures_iter(code)
                    .map(|caps| caps[1].replace("implements", ","))
                    .collect();
                (!clauses.is_empty()).then(|| clauses.join(","))
            }
            Language::Cpp | Language::CSharp | Language::Swift => self
                .colon_bases
                .captures(code)
                .map(|caps| caps[1].to_string()),
            _ => None,
        };

        let Some(clause) = clause else {
            return Vec::new();
        };

        strip_generics(&clause)
            .split(',')
            .filter_map(|base| {
                // `public Base`, `virtual Base`, `metaclass=ABCMeta`
                let base = base.split_whitespace().last()?;
                if base.contains('=') {
                    return None;
                }
                let base = super::types::simple_name(base.trim_end_matches(['(', ')']));
                let valid = base
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphabetic() || c == '_')
                    && base.chars().all(|c| c.is_alphanumeric() || c == '_');
                (valid && !self.keywords.contains(base)).then(|| base.to_string())
            })
            .collect()
    }
}

/// Comma-separated import items without aliases or grouping parentheses
fn split_items(list: &str) -> Vec<String> {
    list.split(',')
        .map(|item| item.trim().trim_matches(['(', ')']).trim())
        .filter_map(|item| {
            let item = item.split(" as ").next()?.trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}

fn strip_generics(text: &str) -> String {
    let mut depth = 0usize;
    text.chars()
        .filter(|&c| match c {
            '<' => {
                depth += 1;
                false
            }
            '>' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        })
        .collect()
}

/// `def name(`, `fn name(`, `function name(` ... declare rather than call
fn is_definition_keyword_before(code: &str, position: usize) -> bool {
    let before = code[..position].trim_end();
    let previous = before
        .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    matches!(
        previous,
        "def" | "fn" | "function" | "func" | "fun" | "class" | "struct" | "interface" | "trait"
    )
}

/// Innermost symbol whose span contains the line, or the file itself
fn enclosing_source(file_path: &str, symbols: &[Symbol], line: usize) -> EdgeSource {
    symbols
        .iter()
        .filter(|s| s.start_line <= line && line <= s.end_line)
        .min_by_key(|s| (s.end_line - s.start_line, std::cmp::Reverse(s.start_line)))
        .map(|s| EdgeSource::Symbol(s.id.clone()))
        .unwrap_or_else(|| EdgeSource::File(file_path.to_string()))
}
