use crate::diagnostic::{Diagnostic, Severity};
use crate::interpreter::Environment;
use crate::lexer::{Token, TokenStream};

/// A diagnostic attached to one token or token range.
///
/// Raw offsets are kept so the balance checker can discard diagnostics that
/// turn out to lie inside a verbatim environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDiagnostic {
    pub diagnostic: Diagnostic,
    pub start: usize,
    pub end: usize,
    pub ignore: bool,
}

/// Options for [`ErrorReporter::env_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvErrorOptions {
    /// Put the margin point at the start of the range instead of its end.
    pub error_at_start: bool,
    pub severity: Severity,
    pub suppress_if_editing: bool,
}

impl Default for EnvErrorOptions {
    fn default() -> Self {
        Self {
            error_at_start: false,
            severity: Severity::Error,
            suppress_if_editing: false,
        }
    }
}

/// Shared sink for diagnostics raised while interpreting and checking.
///
/// Diagnostics are kept on two channels: token-level ones, which may later be
/// marked ignored, and structural ones for environment mismatches. All
/// positions are converted to row/column with the stream's line index.
pub struct ErrorReporter<'a> {
    stream: &'a TokenStream,
    token_errors: Vec<TokenDiagnostic>,
    env_errors: Vec<Diagnostic>,
}

impl<'a> ErrorReporter<'a> {
    pub fn new(stream: &'a TokenStream) -> Self {
        Self {
            stream,
            token_errors: Vec::new(),
            env_errors: Vec::new(),
        }
    }

    pub fn stream(&self) -> &'a TokenStream {
        self.stream
    }

    /// Reports a problem with a single token.
    pub fn token_error(&mut self, token: &Token, message: impl Into<String>) {
        self.push_token_error(token.start, token.end, message.into());
    }

    /// Reports a problem spanning from the start of `from` to the end of `to`.
    pub fn token_error_range(&mut self, from: &Token, to: &Token, message: impl Into<String>) {
        self.push_token_error(from.start, to.end.max(from.end), message.into());
    }

    fn push_token_error(&mut self, start: usize, end: usize, message: String) {
        let lines = &self.stream.lines;
        let (start_row, start_col) = lines.line_col(start);
        let (end_row, end_col) = lines.line_col(end);
        self.token_errors.push(TokenDiagnostic {
            diagnostic: Diagnostic {
                row: start_row,
                column: start_col,
                start_row,
                start_col,
                end_row,
                end_col: Some(end_col),
                severity: Severity::Error,
                message,
                suppress_if_editing: true,
            },
            start,
            end,
            ignore: false,
        });
    }

    /// Reports a structural problem from the opening token of `from` to the
    /// closing token of `to` (or its opening token when it has none).
    pub fn env_error(
        &mut self,
        from: &Environment,
        to: &Environment,
        message: impl Into<String>,
        options: EnvErrorOptions,
    ) {
        let tokens = &self.stream.tokens;
        let lines = &self.stream.lines;
        let from_token = &tokens[from.open_token];
        let to_token = &tokens[to.close_token.unwrap_or(to.open_token)];

        let (start_row, start_col) = lines.line_col(from_token.start);
        let (end_row, end_col) = lines.line_col(to_token.end);
        let (row, column) = if options.error_at_start {
            (start_row, start_col)
        } else {
            (end_row, end_col)
        };

        self.env_errors.push(Diagnostic {
            row,
            column,
            start_row,
            start_col,
            end_row,
            end_col: Some(end_col),
            severity: options.severity,
            message: message.into(),
            suppress_if_editing: options.suppress_if_editing,
        });
    }

    /// Reports a structural problem running from the start of the document to `env`.
    pub fn env_error_from_start(&mut self, env: &Environment, message: impl Into<String>) {
        let token = &self.stream.tokens[env.close_token.unwrap_or(env.open_token)];
        let (end_row, end_col) = self.stream.lines.line_col(token.end);

        self.env_errors.push(Diagnostic {
            row: end_row,
            column: end_col,
            start_row: 0,
            start_col: 0,
            end_row,
            end_col: Some(end_col),
            severity: Severity::Error,
            message: message.into(),
            suppress_if_editing: false,
        });
    }

    /// Reports a structural problem running from `env` to the end of the document.
    pub fn env_error_to_end(&mut self, env: &Environment, message: impl Into<String>) {
        let token = &self.stream.tokens[env.open_token];
        let lines = &self.stream.lines;
        let (start_row, start_col) = lines.line_col(token.start);

        self.env_errors.push(Diagnostic {
            row: start_row,
            column: start_col,
            start_row,
            start_col,
            end_row: lines.last_line(),
            end_col: None,
            severity: Severity::Error,
            message: message.into(),
            suppress_if_editing: false,
        });
    }

    /// Marks token diagnostics starting strictly inside any of `ranges` as ignored.
    pub fn ignore_within(&mut self, ranges: &[(usize, usize)]) {
        for error in &mut self.token_errors {
            if ranges
                .iter()
                .any(|&(start, end)| error.start > start && error.start < end)
            {
                error.ignore = true;
            }
        }
    }

    pub fn token_diagnostics(&self) -> &[TokenDiagnostic] {
        &self.token_errors
    }

    pub fn structural_diagnostics(&self) -> &[Diagnostic] {
        &self.env_errors
    }

    /// Merges both channels in emission order, dropping ignored token diagnostics.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.token_errors
            .into_iter()
            .filter(|e| !e.ignore)
            .map(|e| e.diagnostic)
            .chain(self.env_errors)
            .collect()
    }
}
