use std::panic::{self, AssertUnwindSafe};

use texvalid_syntax::{parse_with, Diagnostic, ParseOptions};

/// Lints successive versions of one document.
///
/// The first parser fault or panic disables the session for good: every later
/// call returns no diagnostics rather than a partial or misleading list.
#[derive(Debug)]
pub struct LintSession {
    options: ParseOptions,
    disabled: bool,
}

impl LintSession {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            disabled: false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn lint(&mut self, text: &str) -> Vec<Diagnostic> {
        if self.disabled {
            return Vec::new();
        }

        let options = self.options;
        match panic::catch_unwind(AssertUnwindSafe(|| parse_with(text, &options))) {
            Ok(Ok(diagnostics)) => diagnostics,
            Ok(Err(fault)) => {
                log::warn!("validation disabled for this session: {}", fault);
                self.disabled = true;
                Vec::new()
            }
            Err(_) => {
                log::warn!("validation disabled for this session: parser panicked");
                self.disabled = true;
                Vec::new()
            }
        }
    }
}

impl Default for LintSession {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lint_is_repeatable() {
        let mut session = LintSession::default();
        let first = session.lint("\\begin{a}\n}");
        assert_eq!(first.len(), 2);
        assert_eq!(session.lint("\\begin{a}\n}"), first);
        assert!(session.lint("$x^2$").is_empty());
    }

    #[test]
    fn test_fault_disables_session() {
        let mut session = LintSession::new(ParseOptions { max_tokens: 8 });
        assert_eq!(session.lint("a^b").len(), 1);

        assert!(session.lint(&"{}".repeat(10)).is_empty());
        assert!(session.is_disabled());

        // Still silent for a small document that would otherwise be reported.
        assert!(session.lint("a^b").is_empty());
    }
}
