//! Compiler core for the Scorelang music notation language.
//!
//! A deterministic text-to-text pipeline: source → tokens → AST → MusicXML,
//! with a token-stream formatter and minifier on the side. Every stage is a
//! pure function returning an owned result bundled with diagnostics; nothing
//! is thrown across the API boundary.
//!
//! ```rust
//! use scorelang::{compile, parse, to_musicxml, MusicXmlOptions};
//!
//! let source = r#"---
//! title: Scale
//! time: 4/4
//! &main:
//!   clef: treble
//! ---
//! &main { C D E F G A B C }
//! "#;
//!
//! let result = parse(source);
//! assert!(result.errors.is_empty());
//! let xml = to_musicxml(&result.ast.unwrap(), &MusicXmlOptions::default());
//! assert!(xml.contains("<score-partwise"));
//!
//! let compiled = compile(source);
//! assert!(compiled.musicxml.is_some());
//! ```

pub mod ast;
pub mod error;
pub mod format;
pub mod lexer;
pub mod musicxml;
pub mod parser;
pub mod semantic;

pub use ast::*;
pub use error::{Diagnostic, Severity};
pub use format::{format, minify, FormatOptions};
pub use lexer::{tokenize, LexResult, Token, TokenKind};
pub use musicxml::{to_musicxml, MusicXmlOptions};
pub use parser::{parse, ParseResult};
pub use semantic::{validate, ValidationResult};

/// Result of [`compile`]: the MusicXML document (absent when errors block
/// generation) plus every diagnostic the pipeline produced.
pub struct CompileResult {
    pub musicxml: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile a Scorelang source string to MusicXML.
///
/// Runs parse, validate, and the transpiler in sequence. Warnings and info
/// diagnostics do not prevent generation; error-severity diagnostics do.
pub fn compile(source: &str) -> CompileResult {
    let parsed = parse(source);
    let mut diagnostics = parsed.errors;
    diagnostics.extend(parsed.warnings);

    let Some(score) = parsed.ast else {
        return CompileResult {
            musicxml: None,
            diagnostics,
        };
    };

    let validation = validate(&score);
    diagnostics.extend(validation.diagnostics);

    let blocked = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let musicxml = if blocked {
        None
    } else {
        Some(to_musicxml(&score, &MusicXmlOptions::default()))
    };
    CompileResult {
        musicxml,
        diagnostics,
    }
}
