use crate::diagnostic::Severity;
use crate::interpreter::{EnvCommand, Environment};
use crate::reporter::{EnvErrorOptions, ErrorReporter};

/// What the balance checker does with its stack after a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// The innermost open entry is closed and popped.
    Matched,
    /// Nothing was open.
    NothingOpen,
    /// The close is extraneous; the stack is left as it was.
    StrayClose,
    /// The innermost group is discarded and the close is retried against the
    /// next entry.
    AbandonGroup,
    /// The innermost environment is discarded and the close consumed.
    DropInnermost,
    /// The close belongs to the entry below the innermost one; both are popped.
    MatchOuter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub message: String,
    pub suppress_if_editing: bool,
}

impl Report {
    fn new(message: String) -> Self {
        Self {
            message,
            suppress_if_editing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub action: CloseAction,
    pub report: Option<Report>,
}

fn close_label(env: &Environment) -> String {
    match env.command {
        EnvCommand::CloseGroup => "end group }".to_string(),
        _ => env.describe(),
    }
}

/// Decides how a close event relates to the open entries on `stack`.
///
/// When an `\end{B}` meets an open `\begin{A}`, two guesses keep one typo from
/// cascading through the rest of the document:
///
/// 1. if a later `\end{A}` exists in `future`, the `\end{B}` is the stray one
///    and `\begin{A}` stays open;
/// 2. otherwise, if the entry below `\begin{A}` is `\begin{B}`, the
///    `\begin{A}` was never closed and the `\end{B}` closes the outer entry.
///
/// Failing both, `\begin{A}` is dropped without a separate "unclosed" report.
pub fn resolve_close(
    stack: &[&Environment],
    current: &Environment,
    future: &[Environment],
) -> Resolution {
    let Some(last) = stack.last() else {
        return Resolution {
            action: CloseAction::NothingOpen,
            report: Some(Report::new(format!("unexpected {}", close_label(current)))),
        };
    };

    match (last.is_group(), current.is_group()) {
        (true, true) => Resolution {
            action: CloseAction::Matched,
            report: None,
        },
        (false, true) => Resolution {
            action: CloseAction::StrayClose,
            report: Some(Report::new(format!(
                "unexpected end group }} after {}",
                last.describe()
            ))),
        },
        (true, false) => Resolution {
            action: CloseAction::AbandonGroup,
            report: Some(Report {
                message: format!("unexpected {} inside group {{", current.describe()),
                suppress_if_editing: true,
            }),
        },
        (false, false) if last.name == current.name => Resolution {
            action: CloseAction::Matched,
            report: None,
        },
        (false, false) => {
            let closes_later = future
                .iter()
                .any(|e| e.command == EnvCommand::End && e.name == last.name);
            let outer_matches = stack.len() >= 2 && stack[stack.len() - 2].name == current.name;

            let action = if closes_later {
                CloseAction::StrayClose
            } else if outer_matches {
                CloseAction::MatchOuter
            } else {
                CloseAction::DropInnermost
            };
            Resolution {
                action,
                report: Some(Report::new(format!(
                    "unexpected {} after {}",
                    current.describe(),
                    last.describe()
                ))),
            }
        }
    }
}

/// Stack machine verifying that structural events nest.
#[derive(Default)]
pub struct BalanceChecker<'e> {
    stack: Vec<&'e Environment>,
    /// Open verbatim environment; everything but its own `\end` is ignored.
    verbatim: Option<&'e Environment>,
    verbatim_ranges: Vec<(usize, usize)>,
    /// First `\end{document}` seen.
    document_close: Option<&'e Environment>,
}

/// Checks `events` for balance, reporting on `reporter`.
pub fn check(events: &[Environment], reporter: &mut ErrorReporter<'_>) {
    BalanceChecker::default().run(events, reporter);
}

impl<'e> BalanceChecker<'e> {
    pub fn run(mut self, events: &'e [Environment], reporter: &mut ErrorReporter<'_>) {
        let mut i = 0;
        while i < events.len() {
            let event = &events[i];

            if let Some(open) = self.verbatim {
                if event.command == EnvCommand::End && event.name == open.name {
                    self.stack.pop();
                    self.verbatim = None;
                    self.verbatim_ranges
                        .push(Self::span(reporter, open, Some(event)));
                }
                i += 1;
                continue;
            }

            if event.is_open() {
                self.stack.push(event);
                if event.is_verbatim {
                    self.verbatim = Some(event);
                }
                i += 1;
                continue;
            }

            let resolution = resolve_close(&self.stack, event, &events[i + 1..]);
            if let Some(report) = &resolution.report {
                self.report(reporter, resolution.action, report, event);
            }

            match resolution.action {
                CloseAction::Matched => {
                    if let Some(open) = self.stack.pop() {
                        if open.command == EnvCommand::Begin
                            && open.name() == "document"
                            && self.document_close.is_none()
                        {
                            self.document_close = Some(event);
                        }
                    }
                }
                CloseAction::NothingOpen | CloseAction::StrayClose => {}
                CloseAction::AbandonGroup => {
                    self.stack.pop();
                    continue;
                }
                CloseAction::DropInnermost => {
                    self.stack.pop();
                }
                CloseAction::MatchOuter => {
                    self.stack.pop();
                    self.stack.pop();
                }
            }
            i += 1;
        }

        if let Some(open) = self.verbatim {
            self.verbatim_ranges.push(Self::span(reporter, open, None));
        }

        while let Some(open) = self.stack.pop() {
            let message = match open.command {
                EnvCommand::OpenGroup => "unclosed group {".to_string(),
                _ => format!("unclosed environment {}", open.describe()),
            };
            reporter.env_error_to_end(open, message);
        }

        reporter.ignore_within(&self.verbatim_ranges);
    }

    fn report(
        &self,
        reporter: &mut ErrorReporter<'_>,
        action: CloseAction,
        report: &Report,
        event: &Environment,
    ) {
        match (action, self.stack.last(), self.document_close) {
            (CloseAction::NothingOpen, _, Some(document)) => reporter.env_error(
                document,
                event,
                format!("{} after \\end{{document}}", report.message),
                EnvErrorOptions {
                    severity: Severity::Info,
                    ..EnvErrorOptions::default()
                },
            ),
            (CloseAction::NothingOpen, _, None) | (_, None, _) => {
                reporter.env_error_from_start(event, report.message.clone())
            }
            (_, Some(open), _) => reporter.env_error(
                open,
                event,
                report.message.clone(),
                EnvErrorOptions {
                    error_at_start: matches!(
                        action,
                        CloseAction::DropInnermost | CloseAction::MatchOuter
                    ),
                    suppress_if_editing: report.suppress_if_editing,
                    ..EnvErrorOptions::default()
                },
            ),
        }
    }

    /// Character range from `open` to the end of `close`, or to end of input.
    fn span(
        reporter: &ErrorReporter<'_>,
        open: &Environment,
        close: Option<&Environment>,
    ) -> (usize, usize) {
        let stream = reporter.stream();
        let start = stream.tokens[open.open_token].start;
        let end = match close {
            Some(close) => stream.tokens[close.close_token.unwrap_or(close.open_token)].end,
            None => stream.len(),
        };
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::interpret;
    use crate::lexer::Lexer;

    fn begin(name: &str, token: usize) -> Environment {
        Environment {
            command: EnvCommand::Begin,
            name: Some(name.to_string()),
            open_token: token,
            close_token: Some(token + 3),
            is_verbatim: false,
        }
    }

    fn end(name: &str, token: usize) -> Environment {
        Environment {
            command: EnvCommand::End,
            ..begin(name, token)
        }
    }

    fn group(command: EnvCommand, token: usize) -> Environment {
        Environment {
            command,
            name: None,
            open_token: token,
            close_token: None,
            is_verbatim: false,
        }
    }

    fn messages(input: &str) -> Vec<String> {
        let stream = Lexer::new(input).tokenize().unwrap().unwrap();
        let mut reporter = ErrorReporter::new(&stream);
        let events = interpret(&stream, &mut reporter);
        check(&events, &mut reporter);
        reporter
            .into_diagnostics()
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    #[test]
    fn test_resolve_matching_close() {
        let a = begin("a", 0);
        let resolution = resolve_close(&[&a], &end("a", 4), &[]);
        assert_eq!(resolution.action, CloseAction::Matched);
        assert!(resolution.report.is_none());

        let open = group(EnvCommand::OpenGroup, 0);
        let resolution = resolve_close(&[&open], &group(EnvCommand::CloseGroup, 1), &[]);
        assert_eq!(resolution.action, CloseAction::Matched);
    }

    #[test]
    fn test_resolve_nothing_open() {
        let resolution = resolve_close(&[], &group(EnvCommand::CloseGroup, 0), &[]);
        assert_eq!(resolution.action, CloseAction::NothingOpen);
        assert_eq!(resolution.report.unwrap().message, "unexpected end group }");
    }

    #[test]
    fn test_resolve_group_close_after_begin() {
        let a = begin("a", 0);
        let resolution = resolve_close(&[&a], &group(EnvCommand::CloseGroup, 4), &[]);
        assert_eq!(resolution.action, CloseAction::StrayClose);
        assert_eq!(
            resolution.report.unwrap().message,
            "unexpected end group } after \\begin{a}"
        );
    }

    #[test]
    fn test_resolve_end_inside_group() {
        let a = begin("a", 0);
        let open = group(EnvCommand::OpenGroup, 4);
        let resolution = resolve_close(&[&a, &open], &end("a", 5), &[]);
        assert_eq!(resolution.action, CloseAction::AbandonGroup);
        let report = resolution.report.unwrap();
        assert_eq!(report.message, "unexpected \\end{a} inside group {");
        assert!(report.suppress_if_editing);
    }

    #[test]
    fn test_resolve_extra_end() {
        // \begin{A} \end{B} \end{A}
        let a = begin("A", 0);
        let future = [end("A", 8)];
        let resolution = resolve_close(&[&a], &end("B", 4), &future);
        assert_eq!(resolution.action, CloseAction::StrayClose);
        assert_eq!(
            resolution.report.unwrap().message,
            "unexpected \\end{B} after \\begin{A}"
        );
    }

    #[test]
    fn test_resolve_extra_begin() {
        // \begin{A} \begin{B} \end{A}
        let a = begin("A", 0);
        let b = begin("B", 4);
        let resolution = resolve_close(&[&a, &b], &end("A", 8), &[]);
        assert_eq!(resolution.action, CloseAction::MatchOuter);
    }

    #[test]
    fn test_resolve_unrelated_end_drops_innermost() {
        let a = begin("A", 0);
        let b = begin("B", 4);
        let resolution = resolve_close(&[&a, &b], &end("C", 8), &[]);
        assert_eq!(resolution.action, CloseAction::DropInnermost);
    }

    #[test]
    fn test_balanced_document() {
        assert!(messages("\\begin{foo}\n{a}\n\\end{foo}\n").is_empty());
    }

    #[test]
    fn test_unclosed_entries_reported_innermost_first() {
        assert_eq!(
            messages("\\begin{a}\n{\n"),
            vec!["unclosed group {", "unclosed environment \\begin{a}"]
        );
    }

    #[test]
    fn test_unexpected_closes() {
        assert_eq!(messages("a}"), vec!["unexpected end group }"]);
        assert_eq!(messages("\\end{a}"), vec!["unexpected \\end{a}"]);
    }

    #[test]
    fn test_stray_group_close_keeps_environment_open() {
        assert_eq!(
            messages("\\begin{a} } \\end{a}"),
            vec!["unexpected end group } after \\begin{a}"]
        );
    }

    #[test]
    fn test_end_inside_group_retries_outer() {
        assert_eq!(
            messages("\\begin{a} { \\end{a}"),
            vec!["unexpected \\end{a} inside group {"]
        );
    }

    #[test]
    fn test_extra_begin_is_absorbed() {
        // The inner environment is dropped without its own unclosed report.
        assert_eq!(
            messages("\\begin{A}\\begin{B}\\end{A}"),
            vec!["unexpected \\end{A} after \\begin{B}"]
        );
    }

    #[test]
    fn test_unrelated_end_drops_open_environment() {
        assert_eq!(
            messages("\\begin{A}\\begin{B}\\end{C}\\end{A}"),
            vec!["unexpected \\end{C} after \\begin{B}"]
        );
    }

    #[test]
    fn test_extra_end_is_skipped() {
        assert_eq!(
            messages("\\begin{A}\\end{B}\\end{A}"),
            vec!["unexpected \\end{B} after \\begin{A}"]
        );
    }

    #[test]
    fn test_trailing_close_after_document_is_info() {
        let stream = Lexer::new("\\begin{document}\n\\end{document}\n}")
            .tokenize()
            .unwrap()
            .unwrap();
        let mut reporter = ErrorReporter::new(&stream);
        let events = interpret(&stream, &mut reporter);
        check(&events, &mut reporter);
        let diagnostics = reporter.into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Info);
        assert_eq!(
            diagnostics[0].message,
            "unexpected end group } after \\end{document}"
        );
        assert_eq!(diagnostics[0].start_row, 1);
        assert_eq!(diagnostics[0].end_row, 2);
    }

    #[test]
    fn test_verbatim_contents_are_exempt() {
        assert!(
            messages("\\begin{verbatim}\n} a^b \\end{x} {\n\\end{verbatim}\n").is_empty()
        );
    }

    #[test]
    fn test_unclosed_verbatim() {
        assert_eq!(
            messages("\\begin{lstlisting}\na_b }"),
            vec!["unclosed environment \\begin{lstlisting}"]
        );
    }

    #[test]
    fn test_unclosed_count_matches_open_entries() {
        let diagnostics = messages("{{\\begin{x}{");
        assert_eq!(
            diagnostics
                .iter()
                .filter(|m| m.starts_with("unclosed"))
                .count(),
            4
        );
    }
}
