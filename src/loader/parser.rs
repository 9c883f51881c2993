//! The narrow interface the loader needs from a language front end.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::Result;
use crate::loader::DocumentUri;

/// An import as written in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    /// Raw address string
    pub address: String,

    /// Optional `as Name` binding
    pub alias: Option<String>,
}

impl ImportStatement {
    pub fn new(address: impl Into<String>) -> Self {
        ImportStatement {
            address: address.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// A parsed document: the front end's root node plus the imports it declares.
#[derive(Debug, Clone)]
pub struct ParsedDocument<R> {
    pub root: R,
    pub imports: Vec<ImportStatement>,
}

/// Parses one document. Implemented by the language front end.
pub trait DocumentParser: Send + Sync + 'static {
    /// The front end's AST root.
    type Root: Send + 'static;

    fn parse(&self, uri: &DocumentUri, text: &str) -> Result<ParsedDocument<Self::Root>>;
}

static IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+"([^"]+)"(?:\s+as\s+([A-Za-z_][A-Za-z0-9_]*))?\s*;?\s*$"#)
        .expect("import pattern is valid")
});

/// Line-based import scanner.
///
/// Recognises `import "<address>" [as Name]` lines and nothing else. Good
/// enough to walk an import graph without the real grammar; the root is the
/// document text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportScanner;

impl ImportScanner {
    pub fn scan(text: &str) -> Vec<ImportStatement> {
        IMPORT_LINE
            .captures_iter(text)
            .map(|caps| ImportStatement {
                address: caps[1].to_string(),
                alias: caps.get(2).map(|m| m.as_str().to_string()),
            })
            .collect()
    }
}

impl DocumentParser for ImportScanner {
    type Root = String;

    fn parse(&self, _uri: &DocumentUri, text: &str) -> Result<ParsedDocument<String>> {
        Ok(ParsedDocument {
            root: text.to_string(),
            imports: Self::scan(text),
        })
    }
}
