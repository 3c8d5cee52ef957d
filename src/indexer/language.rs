//! Programming language detection from file extensions and shebang lines

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Languages recognized by the scanner. Only some have a parse backend;
/// the rest are chunked by line windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Scala,
    Shell,
    Sql,
    Html,
    Css,
    Json,
    Yaml,
    Toml,
    Xml,
    Config,
    Markdown,
    Text,
}

/// How a language spells comments, used by the text heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: Option<(&'static str, &'static str)>,
}

const C_STYLE: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
};
const HASH_STYLE: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: None,
};
const NO_COMMENTS: CommentSyntax = CommentSyntax {
    line: &[],
    block: None,
};

impl Language {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rust => "Rust",
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Tsx => "TypeScript (TSX)",
            Self::Go => "Go",
            Self::Java => "Java",
            Self::C => "C",
            Self::Cpp => "C++",
            Self::CSharp => "C#",
            Self::Ruby => "Ruby",
            Self::Php => "PHP",
            Self::Swift => "Swift",
            Self::Kotlin => "Kotlin",
            Self::Scala => "Scala",
            Self::Shell => "Shell",
            Self::Sql => "SQL",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Xml => "XML",
            Self::Config => "Config",
            Self::Markdown => "Markdown",
            Self::Text => "Text",
        }
    }

    /// Parse a name produced by [`Language::name`] or its snake_case form
    pub fn from_name(name: &str) -> Option<Self> {
        ALL.iter().copied().find(|lang| {
            lang.name().eq_ignore_ascii_case(name)
                || format!("{:?}", lang).eq_ignore_ascii_case(name)
        })
    }

    /// Whether blocks are delimited by indentation rather than braces
    pub fn is_indent_scoped(&self) -> bool {
        matches!(self, Self::Python | Self::Yaml)
    }

    /// Whether this language carries program structure worth measuring
    pub fn is_code(&self) -> bool {
        !matches!(
            self,
            Self::Json
                | Self::Yaml
                | Self::Toml
                | Self::Xml
                | Self::Config
                | Self::Markdown
                | Self::Text
                | Self::Html
                | Self::Css
        )
    }

    pub fn comment_syntax(&self) -> CommentSyntax {
        match self {
            Self::Python | Self::Ruby | Self::Shell | Self::Yaml | Self::Toml | Self::Config => {
                HASH_STYLE
            }
            Self::Php => CommentSyntax {
                line: &["//", "#"],
                block: Some(("/*", "*/")),
            },
            Self::Sql => CommentSyntax {
                line: &["--"],
                block: Some(("/*", "*/")),
            },
            Self::Html | Self::Xml | Self::Markdown => CommentSyntax {
                line: &[],
                block: Some(("<!--", "-->")),
            },
            Self::Css => CommentSyntax {
                line: &[],
                block: Some(("/*", "*/")),
            },
            Self::Json | Self::Text => NO_COMMENTS,
            _ => C_STYLE,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const ALL: &[Language] = &[
    Language::Rust,
    Language::Python,
    Language::JavaScript,
    Language::TypeScript,
    Language::Tsx,
    Language::Go,
    Language::Java,
    Language::C,
    Language::Cpp,
    Language::CSharp,
    Language::Ruby,
    Language::Php,
    Language::Swift,
    Language::Kotlin,
    Language::Scala,
    Language::Shell,
    Language::Sql,
    Language::Html,
    Language::Css,
    Language::Json,
    Language::Yaml,
    Language::Toml,
    Language::Xml,
    Language::Config,
    Language::Markdown,
    Language::Text,
];

/// Detect programming language from file extension
pub fn detect_language(extension: &str) -> Option<Language> {
    let lang = match extension.to_lowercase().as_str() {
        "rs" => Language::Rust,
        "py" | "pyi" => Language::Python,
        "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
        "ts" | "mts" | "cts" => Language::TypeScript,
        "tsx" => Language::Tsx,
        "java" => Language::Java,
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
        "c" | "h" => Language::C,
        "cs" => Language::CSharp,
        "go" => Language::Go,
        "rb" => Language::Ruby,
        "php" => Language::Php,
        "swift" => Language::Swift,
        "kt" | "kts" => Language::Kotlin,
        "scala" => Language::Scala,
        "sh" | "bash" | "zsh" => Language::Shell,
        "sql" => Language::Sql,
        "html" | "htm" => Language::Html,
        "css" | "scss" | "sass" => Language::Css,
        "json" => Language::Json,
        "yaml" | "yml" => Language::Yaml,
        "toml" => Language::Toml,
        "xml" => Language::Xml,
        "ini" | "conf" | "config" | "cfg" | "properties" | "env" => Language::Config,
        "md" | "markdown" | "rst" | "adoc" | "asciidoc" | "org" => Language::Markdown,
        "txt" => Language::Text,
        _ => return None,
    };

    Some(lang)
}

/// Detect language from a `#!` interpreter line
pub fn detect_shebang(content: &str) -> Option<Language> {
    let first = content.lines().next()?;
    let interpreter_line = first.strip_prefix("#!")?;

    // "/usr/bin/env python3 -u" -> "python3"; "/bin/bash" -> "bash"
    let mut parts = interpreter_line.split_whitespace();
    let mut program = parts.next()?.rsplit('/').next()?;
    if program == "env" {
        program = parts.find(|p| !p.starts_with('-'))?;
    }

    let program = program.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    match program {
        "python" => Some(Language::Python),
        "node" | "nodejs" | "deno" | "bun" => Some(Language::JavaScript),
        "ruby" => Some(Language::Ruby),
        "php" => Some(Language::Php),
        "bash" | "sh" | "zsh" | "dash" | "ksh" => Some(Language::Shell),
        _ => None,
    }
}

/// Dotfiles that behave like configuration and are worth indexing
pub fn dotfile_language(file_name: &str) -> Option<Language> {
    match file_name {
        ".env" | ".editorconfig" | ".flake8" | ".coveragerc" | ".pylintrc" | ".gitignore"
        | ".gitattributes" | ".dockerignore" => Some(Language::Config),
        ".prettierrc" | ".eslintrc" => Some(Language::Json),
        ".pre-commit-config.yaml" | ".pre-commit-hooks.yaml" => Some(Language::Yaml),
        _ => None,
    }
}

/// Extension first, then dotfile names, then shebang
pub fn detect_for_path(path: &Path, content: &str) -> Option<Language> {
    if let Some(lang) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(detect_language)
    {
        return Some(lang);
    }
    if let Some(lang) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(dotfile_language)
    {
        return Some(lang);
    }
    detect_shebang(content)
}
