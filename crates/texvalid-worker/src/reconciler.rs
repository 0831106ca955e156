use std::collections::BTreeMap;

use texvalid_syntax::{Diagnostic, DiagnosticKey, Severity};

use crate::config::DEFAULT_MAX_DIAGNOSTICS;

pub const ERROR_MARKER_CLASS: &str = "error-marker";
pub const INFO_MARKER_CLASS: &str = "info-marker";

/// Zero-based editor cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub row: usize,
    pub column: usize,
}

impl Cursor {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// How a marker is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerMode {
    /// Underline the covered text.
    Text,
    /// Highlight whole lines; used for ranges running to end of content.
    FullLine,
}

/// Marker and annotation primitives provided by the editor.
pub trait MarkerHost {
    /// Handle for a live marker.
    type Marker;

    /// Creates an edit-tracking marker over `range`.
    fn add_marker(&mut self, range: DiagnosticKey, class: &str, mode: MarkerMode) -> Self::Marker;

    fn remove_marker(&mut self, marker: Self::Marker);

    /// Replaces the full list of margin annotations.
    fn set_annotations(&mut self, annotations: &[Diagnostic]);
}

/// Range of a diagnostic hidden because the cursor is at its edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: Option<usize>,
}

impl SuppressionRange {
    fn of(diagnostic: &Diagnostic) -> Self {
        Self {
            start_row: diagnostic.start_row,
            start_col: diagnostic.start_col,
            end_row: diagnostic.end_row,
            end_col: diagnostic.end_col,
        }
    }

    /// Whether a diagnostic starting at `(row, column)` falls inside this
    /// single-line range.
    pub fn covers(&self, row: usize, column: usize) -> bool {
        row == self.start_row
            && row == self.end_row
            && column >= self.start_col
            && self.end_col.map_or(true, |end| column <= end)
    }
}

/// The cursor sits one column inside the start or the end of `diagnostic`.
fn is_being_edited(diagnostic: &Diagnostic, cursor: Cursor) -> bool {
    (cursor.row == diagnostic.start_row && cursor.column == diagnostic.start_col + 1)
        || (cursor.row == diagnostic.end_row && diagnostic.end_col == Some(cursor.column + 1))
}

fn marker_class(diagnostic: &Diagnostic) -> &'static str {
    match diagnostic.severity {
        Severity::Error => ERROR_MARKER_CLASS,
        Severity::Info => INFO_MARKER_CLASS,
    }
}

/// Keeps the editor's markers in step with the latest diagnostics.
///
/// Markers are keyed by diagnostic range: a diagnostic whose range is already
/// marked keeps its marker, so an unchanged list causes no host calls at all.
/// Diagnostics flagged `suppress_if_editing` are hidden while the cursor sits
/// at their edge, together with any diagnostic starting inside them on the
/// same line.
pub struct Reconciler<H: MarkerHost> {
    host: H,
    max_diagnostics: usize,
    /// Latest diagnostics, already capped.
    hints: Vec<Diagnostic>,
    displayed: BTreeMap<DiagnosticKey, H::Marker>,
    suppressions: Vec<SuppressionRange>,
}

impl<H: MarkerHost> Reconciler<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            hints: Vec::new(),
            displayed: BTreeMap::new(),
            suppressions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_max_diagnostics(mut self, max_diagnostics: usize) -> Self {
        self.max_diagnostics = max_diagnostics;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Takes a fresh diagnostic list and updates the display. Returns the
    /// number of markers created or removed.
    pub fn apply(&mut self, mut diagnostics: Vec<Diagnostic>, cursor: Cursor) -> usize {
        diagnostics.truncate(self.max_diagnostics);
        self.hints = diagnostics;
        self.refresh(cursor)
    }

    /// Re-evaluates suppressions for the current diagnostics at `cursor`.
    pub fn refresh(&mut self, cursor: Cursor) -> usize {
        self.suppressions.clear();
        let mut wanted: BTreeMap<DiagnosticKey, &Diagnostic> = BTreeMap::new();
        let mut annotations = Vec::new();

        for diagnostic in &self.hints {
            if diagnostic.suppress_if_editing && is_being_edited(diagnostic, cursor) {
                self.suppressions.push(SuppressionRange::of(diagnostic));
                continue;
            }
            if self
                .suppressions
                .iter()
                .any(|range| range.covers(diagnostic.start_row, diagnostic.start_col))
            {
                continue;
            }
            wanted.entry(diagnostic.key()).or_insert(diagnostic);
            annotations.push(diagnostic.clone());
        }

        let mut changes = 0;
        for (key, diagnostic) in &wanted {
            if !self.displayed.contains_key(key) {
                let mode = match key.end_col {
                    Some(_) => MarkerMode::Text,
                    None => MarkerMode::FullLine,
                };
                let marker = self.host.add_marker(*key, marker_class(diagnostic), mode);
                self.displayed.insert(*key, marker);
                changes += 1;
            }
        }

        let stale: Vec<DiagnosticKey> = self
            .displayed
            .keys()
            .filter(|key| !wanted.contains_key(*key))
            .copied()
            .collect();
        for key in stale {
            if let Some(marker) = self.displayed.remove(&key) {
                self.host.remove_marker(marker);
                changes += 1;
            }
        }

        if changes > 0 {
            self.host.set_annotations(&annotations);
        }
        changes
    }

    pub fn has_suppressions(&self) -> bool {
        !self.suppressions.is_empty()
    }

    pub fn suppressions(&self) -> &[SuppressionRange] {
        &self.suppressions
    }

    pub fn displayed(&self) -> impl Iterator<Item = &DiagnosticKey> {
        self.displayed.keys()
    }

    /// Releases every marker; used when the worker session ends.
    pub fn dispose(&mut self) {
        for (_, marker) in std::mem::take(&mut self.displayed) {
            self.host.remove_marker(marker);
        }
        self.hints.clear();
        self.suppressions.clear();
    }
}
