//! Per-language front ends: tree-sitter grammars behind one [`LanguageParser`] port.
//!
//! Three language families are implemented (SPEC_FULL.md §1): Rust, Python, and the
//! ECMAScript family (TypeScript/JavaScript share a single extraction pass since their
//! declaration grammars differ only in type-annotation nodes). Adding a fourth language
//! means writing one more module behind the same trait; nothing above this layer is
//! language-aware.

mod ecmascript;
mod factory;
mod parser;
mod python;
mod rust;

pub use factory::ParserFactory;
pub use parser::{safe_truncate_str, LanguageParser, ParseUnit, MAX_AST_DEPTH};

use crate::error::IrResult;
use crate::types::Language;

/// Construct the parser for `language`, or `None` if it isn't one of the three
/// supported families.
pub fn parser_for(language: Language) -> Option<Box<dyn LanguageParser>> {
    match language {
        Language::Rust => Some(Box::new(rust::RustParser::new())),
        Language::Python => Some(Box::new(python::PythonParser::new())),
        Language::TypeScript => Some(Box::new(ecmascript::EcmaScriptParser::typescript())),
        Language::JavaScript => Some(Box::new(ecmascript::EcmaScriptParser::javascript())),
    }
}

/// Parse `source` (already read from `file_path`) into a [`ParseUnit`], dispatching on
/// the language inferred from the file's extension.
pub fn parse_file(repo_id: &str, file_path: &str, source: &str) -> IrResult<ParseUnit> {
    let ext = std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let language = Language::from_extension(ext)
        .ok_or_else(|| crate::error::IrError::UnsupportedLanguage(file_path.into()))?;
    let mut parser = parser_for(language)
        .ok_or_else(|| crate::error::IrError::UnsupportedLanguage(file_path.into()))?;
    parser.parse(repo_id, file_path, source)
}
