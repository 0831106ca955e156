//! Structural validation for TeX and LaTeX documents.
//!
//! A document goes through four stages on every run:
//!
//! 1. [`lexer`] splits the text into tokens and a line index,
//! 2. [`interpreter`] turns tokens into group and environment events, skipping
//!    definitions and verbatim commands and checking math mode,
//! 3. [`checker`] verifies that the events nest,
//! 4. [`reporter`] converts what went wrong into positioned [`Diagnostic`]s.
//!
//! ```
//! let diagnostics = texvalid_syntax::parse("\\begin{a}\n\\end{b}").unwrap();
//! assert_eq!(diagnostics[0].message, "unexpected \\end{b} after \\begin{a}");
//! ```

pub mod checker;
pub mod diagnostic;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod reporter;

pub use diagnostic::{Diagnostic, DiagnosticKey, Severity};
pub use error::ParseFault;

use lexer::{DEFAULT_MAX_TOKENS, Lexer};
use reporter::ErrorReporter;

/// Limits applied to a single parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub max_tokens: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Validates `text` with default options.
pub fn parse(text: &str) -> Result<Vec<Diagnostic>, ParseFault> {
    parse_with(text, &ParseOptions::default())
}

/// Validates `text`, returning diagnostics in emission order: token-level
/// problems first, then structural ones.
///
/// A document carrying a `%novalidate` comment yields no diagnostics.
pub fn parse_with(text: &str, options: &ParseOptions) -> Result<Vec<Diagnostic>, ParseFault> {
    let Some(stream) = Lexer::new(text)
        .with_max_tokens(options.max_tokens)
        .tokenize()?
    else {
        log::debug!("validation disabled by %novalidate");
        return Ok(Vec::new());
    };

    let mut reporter = ErrorReporter::new(&stream);
    let events = interpreter::interpret(&stream, &mut reporter);
    checker::check(&events, &mut reporter);
    let diagnostics = reporter.into_diagnostics();

    log::debug!(
        "parsed {} tokens into {} events, {} diagnostics",
        stream.tokens.len(),
        events.len(),
        diagnostics.len()
    );
    Ok(diagnostics)
}
