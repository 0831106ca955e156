use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Info => f.write_str("info"),
        }
    }
}

/// A positioned problem found in a document.
///
/// Rows and columns are zero-based character positions. `end_col` is `None`
/// when the range runs to the end of the line (serialised as `null`).
/// `row`/`column` locate the single point an editor annotates in its margin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub row: usize,
    pub column: usize,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: Option<usize>,
    #[serde(rename = "type")]
    pub severity: Severity,
    #[serde(rename = "text")]
    pub message: String,
    #[serde(rename = "suppressIfEditing", default)]
    pub suppress_if_editing: bool,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Normalised position key, `(sRow,sCol):(eRow,eCol)`.
    pub fn key(&self) -> DiagnosticKey {
        DiagnosticKey {
            start_row: self.start_row,
            start_col: self.start_col,
            end_row: self.end_row,
            end_col: self.end_col,
        }
    }
}

/// Identity of a diagnostic for display purposes: its range and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiagnosticKey {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: Option<usize>,
}

impl fmt::Display for DiagnosticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}):({},", self.start_row, self.start_col, self.end_row)?;
        match self.end_col {
            Some(col) => write!(f, "{col})"),
            None => f.write_str("Infinity)"),
        }
    }
}
