//! Parser adapter: per-language parse backends behind one capability trait.
//!
//! A backend turns source text into the symbols it defines (name, scope-qualified
//! name, kind, spans) or a typed [`ParseError`]. The tree-sitter backend covers
//! every language with a bundled grammar; other languages have no backend and are
//! chunked by line windows.

use super::language::Language;
use crate::error::ParseError;
use crate::relations::types::{SymbolKind, Visibility};
use std::collections::HashMap;
use std::sync::Arc;
use tree_sitter::{Node, Parser};

const MAX_SIGNATURE_LEN: usize = 200;

/// A symbol definition found by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub name: String,
    /// Scope-qualified name within the file, e.g. `Server.handle`
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    /// Span including leading doc comments, attributes and decorators
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based, inclusive
    pub start_line: usize,
    pub end_line: usize,
    /// Line of the declaration itself, after leading comments and decorators
    pub line: usize,
    /// Index of the enclosing symbol in the same result
    pub parent: Option<usize>,
    /// First line of the declaration
    pub signature: String,
}

/// Output of a successful parse
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub symbols: Vec<ParsedSymbol>,
}

impl ParseResult {
    /// Symbols not nested in another symbol, in source order
    pub fn top_level(&self) -> impl Iterator<Item = (usize, &ParsedSymbol)> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| s.parent.is_none())
    }

    /// Qualified names made unique within the file: the second and later
    /// occurrences of a name get `~2`, `~3`, ... in source order
    pub fn unique_names(&self) -> Vec<String> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        self.symbols
            .iter()
            .map(|symbol| {
                let count = seen.entry(symbol.qualified_name.as_str()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    symbol.qualified_name.clone()
                } else {
                    format!("{}~{}", symbol.qualified_name, count)
                }
            })
            .collect()
    }
}

/// A per-language parse capability
pub trait ParseBackend: Send + Sync {
    fn language(&self) -> Language;

    /// Deterministic: the same text yields the same symbols and spans
    fn parse(&self, source: &str) -> Result<ParseResult, ParseError>;
}

/// Tree-sitter backed parser for one language
pub struct TreeSitterBackend {
    language: Language,
    grammar: tree_sitter::Language,
}

impl TreeSitterBackend {
    /// Backend for a language with a bundled grammar
    pub fn for_language(language: Language) -> Option<Self> {
        let grammar: tree_sitter::Language = match language {
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Swift => tree_sitter_swift::LANGUAGE.into(),
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Language::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Language::Ruby => tree_sitter_ruby::LANGUAGE.into(),
            Language::Php => tree_sitter_php::LANGUAGE_PHP.into(),
            _ => return None,
        };
        Some(Self { language, grammar })
    }
}

impl ParseBackend for TreeSitterBackend {
    fn language(&self) -> Language {
        self.language
    }

    fn parse(&self, source: &str) -> Result<ParseResult, ParseError> {
        // Parsers are not Sync; one per call keeps the backend shareable across workers
        let mut parser = Parser::new();
        parser
            .set_language(&self.grammar)
            .map_err(|_| ParseError::Unsupported {
                language: self.language.name().to_string(),
            })?;

        let tree = parser.parse(source, None).ok_or(ParseError::Aborted)?;
        let root = tree.root_node();

        if root.has_error() {
            let (line, column) = first_error_position(root).unwrap_or((1, 0));
            return Err(ParseError::Syntax { line, column });
        }

        let mut symbols = Vec::new();
        let mut extractor = Extractor {
            source,
            language: self.language,
            symbols: &mut symbols,
        };
        extractor.visit(root, None);

        Ok(ParseResult { symbols })
    }
}

/// Dispatches parsing by language
#[derive(Clone, Default)]
pub struct ParserRegistry {
    backends: HashMap<Language, Arc<dyn ParseBackend>>,
}

impl ParserRegistry {
    /// Registry with a tree-sitter backend for every bundled grammar
    pub fn with_default_backends() -> Self {
        let mut registry = Self::default();
        for language in [
            Language::Rust,
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Tsx,
            Language::Go,
            Language::Java,
            Language::Swift,
            Language::C,
            Language::Cpp,
            Language::CSharp,
            Language::Ruby,
            Language::Php,
        ] {
            if let Some(backend) = TreeSitterBackend::for_language(language) {
                registry.register(Arc::new(backend));
            }
        }
        registry
    }

    pub fn register(&mut self, backend: Arc<dyn ParseBackend>) {
        self.backends.insert(backend.language(), backend);
    }

    pub fn supports(&self, language: Language) -> bool {
        self.backends.contains_key(&language)
    }

    /// `None` when the language has no backend and should bypass parsing
    pub fn parse(&self, language: Language, source: &str) -> Option<Result<ParseResult, ParseError>> {
        self.backends
            .get(&language)
            .map(|backend| backend.parse(source))
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<_> = self.backends.keys().collect();
        languages.sort();
        f.debug_struct("ParserRegistry")
            .field("languages", &languages)
            .finish()
    }
}

fn first_error_position(node: Node) -> Option<(usize, usize)> {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        return Some((pos.row + 1, pos.column));
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error()
            && let Some(pos) = first_error_position(child)
        {
            return Some(pos);
        }
    }
    None
}

struct Extractor<'s, 'v> {
    source: &'s str,
    language: Language,
    symbols: &'v mut Vec<ParsedSymbol>,
}

impl Extractor<'_, '_> {
    fn visit(&mut self, node: Node, parent: Option<usize>) {
        if let Some(kind) = definition_kind(node.kind(), self.language)
            && let Some(symbol) = self.node_to_symbol(node, kind, parent)
        {
            let index = self.symbols.len();
            self.symbols.push(symbol);

            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                self.visit(child, Some(index));
            }
            return;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, parent);
        }
    }

    fn node_to_symbol(
        &self,
        node: Node,
        mut kind: SymbolKind,
        parent: Option<usize>,
    ) -> Option<ParsedSymbol> {
        let name_node = find_name_node(node, self.language)?;
        let name = self.source.get(name_node.start_byte()..name_node.end_byte())?;
        let name = name.trim();
        if name.is_empty() || name.contains('\n') {
            return None;
        }

        let parent_symbol = parent.map(|i| &self.symbols[i]);
        if kind == SymbolKind::Function
            && parent_symbol.is_some_and(|p| {
                matches!(
                    p.kind,
                    SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface | SymbolKind::Trait
                )
            })
        {
            kind = SymbolKind::Method;
        }

        let qualified_name = match parent_symbol {
            Some(p) => format!("{}.{}", p.qualified_name, name),
            None => name.to_string(),
        };

        let outer = span_node(node);
        let start = leading_trivia_start(outer);
        let text = &self.source[node.start_byte()..node.end_byte().min(self.source.len())];
        // Annotations sit inside Java and C# declarations
        let header = self
            .source
            .get(outer.start_byte()..node.end_byte())
            .unwrap_or(text)
            .lines()
            .find(|line| !line.trim_start().starts_with(['@', '[']))
            .unwrap_or("");

        Some(ParsedSymbol {
            name: name.to_string(),
            qualified_name,
            kind,
            visibility: declared_visibility(self.language, kind, name, header),
            start_byte: start.start_byte(),
            end_byte: outer.end_byte(),
            start_line: start.start_position().row + 1,
            end_line: end_line(outer),
            line: node.start_position().row + 1,
            parent,
            signature: signature(text),
        })
    }
}

/// Last line containing text of the node. A node ending at column 0 ends on
/// the previous line (tree-sitter places some trailing newlines inside nodes).
fn end_line(node: Node) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row
    } else {
        end.row + 1
    }
}

/// The node whose span the symbol should occupy: decorators, `export` and
/// `const f = () => ...` wrappers belong to the symbol.
fn span_node(node: Node) -> Node {
    let mut current = node;
    while let Some(parent) = current.parent() {
        let wraps = match parent.kind() {
            "decorated_definition" | "export_statement" => true,
            "variable_declarator" => {
                matches!(current.kind(), "arrow_function" | "function_expression")
                    && parent.named_child_count() <= 2
            }
            "lexical_declaration" | "variable_declaration" => {
                current.kind() == "variable_declarator" && parent.named_child_count() == 1
            }
            _ => false,
        };
        if !wraps {
            break;
        }
        current = parent;
    }
    current
}

/// Earliest contiguous preceding comment/attribute sibling
fn leading_trivia_start(node: Node) -> Node {
    let mut start = node;
    while let Some(prev) = start.prev_sibling() {
        let kind = prev.kind();
        let is_trivia = kind.contains("comment")
            || kind == "attribute_item"
            || kind == "decorator"
            || kind == "annotation"
            || kind == "marker_annotation";
        let adjacent = prev.end_position().row + 1 >= start.start_position().row;
        if !is_trivia || !adjacent {
            break;
        }
        start = prev;
    }
    start
}

fn signature(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim_end();
    if first_line.len() <= MAX_SIGNATURE_LEN {
        return first_line.to_string();
    }
    let mut cut = MAX_SIGNATURE_LEN;
    while !first_line.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &first_line[..cut])
}

/// Symbol kind of a definition node, or `None` for nodes that define nothing.
/// Functions nested in a type are promoted to methods by the extractor.
fn definition_kind(kind: &str, language: Language) -> Option<SymbolKind> {
    use SymbolKind::*;
    let symbol = match (language, kind) {
        (Language::Rust, "function_item") => Function,
        (Language::Rust, "impl_item") => Class,
        (Language::Rust, "trait_item") => Trait,
        (Language::Rust, "struct_item") => Struct,
        (Language::Rust, "enum_item") => Enum,
        (Language::Rust, "mod_item") => Module,
        (Language::Rust, "const_item") => Constant,
        (Language::Rust, "static_item") => Variable,
        (Language::Rust, "type_item") => TypeAlias,

        (Language::Python, "function_definition") => Function,
        (Language::Python, "class_definition") => Class,

        (Language::JavaScript | Language::TypeScript | Language::Tsx, kind) => match kind {
            "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "arrow_function" => Function,
            "method_definition" => Method,
            "class_declaration" | "abstract_class_declaration" => Class,
            "interface_declaration" => Interface,
            "type_alias_declaration" => TypeAlias,
            "enum_declaration" => Enum,
            _ => return None,
        },

        (Language::Go, "function_declaration") => Function,
        (Language::Go, "method_declaration") => Method,
        (Language::Go, "type_declaration") => TypeAlias,

        (Language::Java | Language::CSharp, kind) => match kind {
            "method_declaration" | "constructor_declaration" => Method,
            "class_declaration" => Class,
            "struct_declaration" => Struct,
            "interface_declaration" => Interface,
            "enum_declaration" => Enum,
            "namespace_declaration" => Module,
            _ => return None,
        },

        (Language::Swift, "function_declaration") => Function,
        (Language::Swift, "class_declaration") => Class,
        (Language::Swift, "struct_declaration") => Struct,
        (Language::Swift, "enum_declaration") => Enum,
        (Language::Swift, "protocol_declaration") => Interface,

        (Language::C | Language::Cpp, "function_definition") => Function,
        (Language::C | Language::Cpp, "struct_specifier") => Struct,
        (Language::C | Language::Cpp, "enum_specifier") => Enum,
        (Language::Cpp, "class_specifier") => Class,
        (Language::Cpp, "namespace_definition") => Module,

        (Language::Ruby, "method" | "singleton_method") => Method,
        (Language::Ruby, "class") => Class,
        (Language::Ruby, "module") => Module,

        (Language::Php, "function_definition") => Function,
        (Language::Php, "method_declaration") => Method,
        (Language::Php, "class_declaration") => Class,
        (Language::Php, "interface_declaration") => Interface,
        (Language::Php, "trait_declaration") => Trait,

        _ => return None,
    };
    Some(symbol)
}

/// Access level written on a definition's header line, or the language's
/// default when none is written. Python and Go encode it in the name.
fn declared_visibility(language: Language, kind: SymbolKind, name: &str, header: &str) -> Visibility {
    // Only modifiers written before the name count
    let modifiers = header.find(name).map_or(header, |at| &header[..at]);
    let has = |word: &str| {
        modifiers
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|token| token == word)
    };
    let written = || {
        if has("private") || has("fileprivate") {
            Some(Visibility::Private)
        } else if has("protected") {
            Some(Visibility::Protected)
        } else if has("internal") {
            Some(Visibility::Internal)
        } else if has("public") || has("open") || has("export") {
            Some(Visibility::Public)
        } else {
            None
        }
    };

    match language {
        Language::Rust => {
            let modifiers = modifiers.trim_start();
            if modifiers.starts_with("pub(self)") {
                Visibility::Private
            } else if modifiers.starts_with("pub(") {
                Visibility::Internal
            } else if has("pub") {
                Visibility::Public
            } else {
                Visibility::Private
            }
        }
        Language::Python => {
            let dunder = name.starts_with("__") && name.ends_with("__");
            if name.starts_with('_') && !dunder {
                Visibility::Private
            } else {
                Visibility::Public
            }
        }
        Language::Go => {
            if name.starts_with(|c: char| c.is_uppercase()) {
                Visibility::Public
            } else {
                Visibility::Internal
            }
        }
        Language::JavaScript | Language::TypeScript | Language::Tsx => {
            written().unwrap_or(if kind == SymbolKind::Method {
                Visibility::Public
            } else {
                Visibility::Internal
            })
        }
        // Package-private
        Language::Java => written().unwrap_or(Visibility::Internal),
        Language::CSharp => written().unwrap_or(if kind == SymbolKind::Method {
            Visibility::Private
        } else {
            Visibility::Internal
        }),
        Language::Swift => written().unwrap_or(Visibility::Internal),
        Language::Php => written().unwrap_or(Visibility::Public),
        Language::C | Language::Cpp if has("static") => Visibility::Private,
        _ => Visibility::Public,
    }
}

/// Find the child node containing the symbol name
fn find_name_node<'a>(node: Node<'a>, language: Language) -> Option<Node<'a>> {
    let kind = node.kind();

    match language {
        Language::Rust => {
            if let Some(name_node) = node.child_by_field_name("name") {
                return Some(name_node);
            }
            // impl blocks are named after the implementing type
            if kind == "impl_item"
                && let Some(type_node) = node.child_by_field_name("type")
            {
                return Some(type_node);
            }
        }
        Language::JavaScript | Language::TypeScript | Language::Tsx => {
            if let Some(name_node) = node.child_by_field_name("name") {
                return Some(name_node);
            }
            // Arrow functions and function expressions take the variable's name
            if matches!(kind, "arrow_function" | "function_expression")
                && let Some(parent) = node.parent()
                && parent.kind() == "variable_declarator"
            {
                return parent
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "identifier");
            }
            return None;
        }
        Language::Go => {
            if let Some(name_node) = node.child_by_field_name("name") {
                return Some(name_node);
            }
            if kind == "type_declaration" {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        return Some(name_node);
                    }
                }
            }
        }
        Language::C | Language::Cpp => {
            if matches!(
                kind,
                "struct_specifier" | "class_specifier" | "enum_specifier" | "namespace_definition"
            ) {
                return node.child_by_field_name("name");
            }
            // Navigate through pointer/reference declarators
            if let Some(declarator) = node.child_by_field_name("declarator") {
                return find_innermost_identifier(declarator);
            }
        }
        _ => {
            if let Some(name_node) = node.child_by_field_name("name") {
                return Some(name_node);
            }
        }
    }

    // Fallback: find first identifier child
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(
            child.kind(),
            "identifier" | "type_identifier" | "name" | "constant" | "simple_identifier"
        ) {
            return Some(child);
        }
    }

    None
}

/// Find the innermost identifier in a declarator chain (for C/C++)
fn find_innermost_identifier(node: Node) -> Option<Node> {
    if matches!(
        node.kind(),
        "identifier" | "field_identifier" | "destructor_name" | "operator_name"
    ) {
        return Some(node);
    }

    if let Some(inner) = node.child_by_field_name("declarator") {
        return find_innermost_identifier(inner);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(id) = find_innermost_identifier(child) {
            return Some(id);
        }
    }

    None
}
