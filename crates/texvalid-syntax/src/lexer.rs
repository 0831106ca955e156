use crate::error::ParseFault;

/// Default cap on the number of scan steps (and so tokens) for one document.
pub const DEFAULT_MAX_TOKENS: usize = 100_000;

/// The TeX special characters the scanner stops at.
const SPECIAL: [char; 10] = ['\\', '{', '}', '$', '&', '#', '^', '_', '~', '%'];

/// Classification of a [`Token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A run of ordinary characters between two special characters.
    Text,
    /// `\foo` (control word) or `\@` (control symbol). Holds the name without
    /// the backslash; empty for a backslash at end of input.
    ControlSequence(String),
    OpenGroup,
    CloseGroup,
    /// `$`
    MathInline,
    /// `$$`
    MathDisplay,
    /// `&`
    TabAlign,
    /// `#`
    MacroParam,
    /// `^`
    Superscript,
    /// `_`
    Subscript,
    /// `~`
    ActiveChar,
}

/// A lexical token.
///
/// Offsets are character indices into the document; `end` is exclusive. For a
/// control word `end` stops after the name, so the whitespace TeX gobbles
/// after it belongs to no token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Zero-based line on which the token starts.
    pub line: usize,
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Returns the control sequence name if this is a control sequence.
    pub fn control_sequence(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::ControlSequence(name) => Some(name),
            _ => None,
        }
    }

    pub fn is(&self, kind: &TokenKind) -> bool {
        &self.kind == kind
    }
}

/// Maps zero-based line numbers to the character offset where the line starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePositions {
    starts: Vec<usize>,
}

impl Default for LinePositions {
    fn default() -> Self {
        Self::new()
    }
}

impl LinePositions {
    pub fn new() -> Self {
        Self { starts: vec![0] }
    }

    /// Builds the index for a whole text in one go.
    pub fn from_text(text: &str) -> Self {
        let mut lines = Self::new();
        for (offset, c) in text.chars().enumerate() {
            if c == '\n' {
                lines.push(offset + 1);
            }
        }
        lines
    }

    fn push(&mut self, offset: usize) {
        self.starts.push(offset);
    }

    /// Line the scanner is currently on.
    pub fn current_line(&self) -> usize {
        self.starts.len() - 1
    }

    /// Last line of the document.
    pub fn last_line(&self) -> usize {
        self.current_line()
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Offset of the first character of `line`, clamped to the last known line.
    pub fn line_start(&self, line: usize) -> usize {
        self.starts[line.min(self.starts.len() - 1)]
    }

    /// Line containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset) - 1
    }

    /// Converts an absolute offset to a zero-based `(row, column)` pair.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self.line_of(offset);
        (line, offset - self.starts[line])
    }
}

/// Output of a successful tokenizer run.
#[derive(Debug, Clone)]
pub struct TokenStream {
    pub chars: Vec<char>,
    pub tokens: Vec<Token>,
    pub lines: LinePositions,
}

impl TokenStream {
    /// Source text covered by a token.
    pub fn text(&self, token: &Token) -> String {
        self.slice(token.start, token.end)
    }

    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        let start = start.min(end);
        self.chars[start..end].iter().collect()
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(offset).copied()
    }

    /// Length of the document in characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// In-comment directives recognised by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    NoValidate,
    BeginNoValidate,
    EndNoValidate,
}

impl Directive {
    /// Parses the text of a comment following its `%`.
    fn parse(body: &str) -> Option<Self> {
        let body = body.trim_start_matches('%');
        if body.starts_with("novalidate") {
            Some(Self::NoValidate)
        } else if body.starts_with("begin novalidate") {
            Some(Self::BeginNoValidate)
        } else if body.starts_with("end novalidate") {
            Some(Self::EndNoValidate)
        } else {
            None
        }
    }
}

fn is_tex_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// A cursor-driven scanner splitting TeX source at its special characters.
///
/// ## Overview
///
/// The lexer repeatedly locates the next special character
/// (`\ { } $ & # ^ _ ~ %`), emits a [`TokenKind::Text`] token for whatever
/// precedes it, then classifies the special character:
///
/// - `%` starts a comment running to end of line; comments produce no token
///   but may carry a `novalidate` directive
/// - `\` starts a control word (`\section`, trailing whitespace gobbled) or a
///   control symbol (`\%`, exactly one character)
/// - `$$` is display math, a lone `$` inline math
/// - `{ } & # ^ _ ~` are single-character tokens
///
/// Line starts are recorded as the scan crosses newlines, so every token
/// carries its line and offsets convert cheaply to row/column.
///
/// ## Examples
///
/// ```
/// use texvalid_syntax::lexer::{Lexer, TokenKind};
///
/// let stream = Lexer::new(r"\section{Hello}").tokenize().unwrap().unwrap();
/// assert_eq!(stream.tokens[0].kind, TokenKind::ControlSequence("section".into()));
/// assert_eq!(stream.tokens[1].kind, TokenKind::OpenGroup);
/// assert_eq!(stream.tokens[2].kind, TokenKind::Text);
/// ```
///
/// A `%novalidate` comment opts the whole document out:
///
/// ```
/// use texvalid_syntax::lexer::Lexer;
///
/// assert!(Lexer::new("%novalidate\n\\begin{x}").tokenize().unwrap().is_none());
/// ```
pub struct Lexer {
    chars: Vec<char>,
    /// Index of the first character not yet consumed.
    position: usize,
    lines: LinePositions,
    tokens: Vec<Token>,
    /// Inside a `%begin novalidate` ... `%end novalidate` region.
    checking_disabled: bool,
    max_tokens: usize,
}

impl Lexer {
    /// Creates a new `Lexer` for the given input string.
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            lines: LinePositions::new(),
            tokens: Vec::new(),
            checking_disabled: false,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Scans the whole input.
    ///
    /// Returns `Ok(None)` when the document contains a `%novalidate`
    /// directive.
    pub fn tokenize(mut self) -> Result<Option<TokenStream>, ParseFault> {
        let mut steps = 0usize;
        let mut previous: Option<usize> = None;

        loop {
            steps += 1;
            if steps > self.max_tokens {
                return Err(ParseFault::TokenLimitExceeded {
                    limit: self.max_tokens,
                });
            }

            let Some(pos) = self.find_special(self.position) else {
                let end = self.chars.len();
                if self.position < end {
                    self.emit(TokenKind::Text, self.position, end);
                    self.track_newlines(self.position, end);
                    self.position = end;
                }
                break;
            };

            if previous.is_some_and(|p| pos <= p) {
                return Err(ParseFault::NonProgressingScan { offset: pos });
            }
            previous = Some(pos);

            if pos > self.position {
                self.emit(TokenKind::Text, self.position, pos);
                self.track_newlines(self.position, pos);
            }
            self.position = pos + 1;

            match self.chars[pos] {
                '%' => {
                    if self.comment() == Some(Directive::NoValidate) {
                        return Ok(None);
                    }
                }
                '\\' => self.control_sequence(pos),
                '{' => self.emit(TokenKind::OpenGroup, pos, pos + 1),
                '}' => self.emit(TokenKind::CloseGroup, pos, pos + 1),
                '$' => {
                    if self.chars.get(self.position) == Some(&'$') {
                        self.position += 1;
                        self.emit(TokenKind::MathDisplay, pos, pos + 2);
                    } else {
                        self.emit(TokenKind::MathInline, pos, pos + 1);
                    }
                }
                '&' => self.emit(TokenKind::TabAlign, pos, pos + 1),
                '#' => self.emit(TokenKind::MacroParam, pos, pos + 1),
                '^' => self.emit(TokenKind::Superscript, pos, pos + 1),
                '_' => self.emit(TokenKind::Subscript, pos, pos + 1),
                '~' => self.emit(TokenKind::ActiveChar, pos, pos + 1),
                ch => return Err(ParseFault::UnrecognizedCharacter { ch, offset: pos }),
            }
        }

        Ok(Some(TokenStream {
            chars: self.chars,
            tokens: self.tokens,
            lines: self.lines,
        }))
    }

    fn find_special(&self, from: usize) -> Option<usize> {
        self.chars
            .get(from..)?
            .iter()
            .position(|c| SPECIAL.contains(c))
            .map(|i| from + i)
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) {
        if self.checking_disabled {
            return;
        }
        let line = self.lines.line_of(start);
        self.tokens.push(Token {
            line,
            kind,
            start,
            end,
        });
    }

    fn track_newlines(&mut self, from: usize, to: usize) {
        for offset in from..to {
            if self.chars[offset] == '\n' {
                self.lines.push(offset + 1);
            }
        }
    }

    /// Consumes a comment up to and including its newline.
    fn comment(&mut self) -> Option<Directive> {
        let body_start = self.position;
        let eol = self.chars[body_start..]
            .iter()
            .position(|&c| c == '\n')
            .map(|i| body_start + i);

        let body_end = eol.unwrap_or(self.chars.len());
        let body: String = self.chars[body_start..body_end].iter().collect();
        let directive = Directive::parse(&body);

        match directive {
            Some(Directive::BeginNoValidate) if !self.checking_disabled => {
                self.checking_disabled = true;
            }
            Some(Directive::EndNoValidate) if self.checking_disabled => {
                self.checking_disabled = false;
            }
            _ => {}
        }

        match eol {
            Some(nl) => {
                self.position = nl + 1;
                self.lines.push(nl + 1);
            }
            None => self.position = self.chars.len(),
        }
        directive
    }

    /// Consumes `\name` plus trailing whitespace, or a control symbol.
    fn control_sequence(&mut self, backslash: usize) {
        let name_start = self.position;
        let mut name_end = name_start;
        while name_end < self.chars.len() && self.chars[name_end].is_ascii_alphabetic() {
            name_end += 1;
        }

        if name_end > name_start {
            let name: String = self.chars[name_start..name_end].iter().collect();
            self.emit(TokenKind::ControlSequence(name), backslash, name_end);

            let mut next = name_end;
            while next < self.chars.len() && is_tex_whitespace(self.chars[next]) {
                if self.chars[next] == '\n' {
                    self.lines.push(next + 1);
                }
                next += 1;
            }
            self.position = next;
        } else if let Some(&symbol) = self.chars.get(name_start) {
            self.emit(
                TokenKind::ControlSequence(symbol.to_string()),
                backslash,
                name_start + 1,
            );
            if symbol == '\n' {
                self.lines.push(name_start + 1);
            }
            self.position = name_start + 1;
        } else {
            // Backslash at end of input.
            self.emit(TokenKind::ControlSequence(String::new()), backslash, name_start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{Expect, expect};

    fn tokenize(input: &str) -> TokenStream {
        Lexer::new(input).tokenize().unwrap().unwrap()
    }

    fn check(input: &str, expected: Expect) {
        let stream = tokenize(input);
        let dump: Vec<String> = stream
            .tokens
            .iter()
            .map(|t| match &t.kind {
                TokenKind::Text => format!("{} Text {:?}", t.line, stream.text(t)),
                TokenKind::ControlSequence(name) => format!("{} Cs {name:?}", t.line),
                kind => format!("{} {kind:?}", t.line),
            })
            .collect();
        expected.assert_eq(&dump.join("\n"));
    }

    #[test]
    fn test_basic_tokens() {
        check(
            r"\section{Hello} % comment",
            expect![[r#"
                0 Cs "section"
                0 OpenGroup
                0 Text "Hello"
                0 CloseGroup
                0 Text " ""#]],
        );
    }

    #[test]
    fn test_special_characters() {
        check(
            "a$b$$c$$&#^_~",
            expect![[r#"
                0 Text "a"
                0 MathInline
                0 Text "b"
                0 MathDisplay
                0 Text "c"
                0 MathDisplay
                0 TabAlign
                0 MacroParam
                0 Superscript
                0 Subscript
                0 ActiveChar"#]],
        );
    }

    #[test]
    fn test_control_word_gobbles_whitespace() {
        let stream = tokenize("\\foo  \n  bar");
        assert_eq!(stream.tokens.len(), 2);
        assert_eq!(stream.tokens[0].end, 4);
        assert_eq!(stream.tokens[1].start, 9);
        assert_eq!(stream.tokens[1].line, 1);
        assert_eq!(stream.lines.line_start(1), 7);
    }

    #[test]
    fn test_control_symbol_consumes_one_character() {
        check(
            r"50\% \\x",
            expect![[r#"
                0 Text "50"
                0 Cs "%"
                0 Text " "
                0 Cs "\\"
                0 Text "x""#]],
        );
    }

    #[test]
    fn test_backslash_newline_advances_line() {
        let stream = tokenize("a\\\nb");
        assert_eq!(stream.lines.line_count(), 2);
        assert_eq!(stream.tokens[2].line, 1);
    }

    #[test]
    fn test_trailing_backslash() {
        let stream = tokenize("abc\\");
        assert_eq!(
            stream.tokens[1].kind,
            TokenKind::ControlSequence(String::new())
        );
    }

    #[test]
    fn test_comment_is_skipped_and_counts_line() {
        check(
            "a % {unbalanced\nb",
            expect![[r#"
                0 Text "a "
                1 Text "b""#]],
        );
    }

    #[test]
    fn test_line_positions() {
        let stream = tokenize("ab\ncd\n\nef");
        assert_eq!(stream.lines.line_count(), 4);
        assert_eq!(stream.lines.line_col(0), (0, 0));
        assert_eq!(stream.lines.line_col(4), (1, 1));
        assert_eq!(stream.lines.line_col(7), (3, 0));
        assert_eq!(stream.lines, LinePositions::from_text("ab\ncd\n\nef"));
    }

    #[test]
    fn test_offsets_are_characters() {
        let stream = tokenize("Étude $x$");
        assert_eq!(stream.tokens[1].start, 6);
        assert_eq!(stream.text(&stream.tokens[0]), "Étude ");
    }

    #[test]
    fn test_novalidate_aborts() {
        assert!(Lexer::new("x\n%novalidate\n{").tokenize().unwrap().is_none());
        assert!(Lexer::new("%%novalidate").tokenize().unwrap().is_none());
        assert!(Lexer::new("% novalidate").tokenize().unwrap().is_some());
    }

    #[test]
    fn test_begin_end_novalidate_region() {
        check(
            "{\n%begin novalidate\n}}}\n%end novalidate\n}",
            expect![[r#"
                0 OpenGroup
                0 Text "\n"
                4 CloseGroup"#]],
        );
    }

    #[test]
    fn test_token_limit() {
        let err = Lexer::new("{{{{{{").with_max_tokens(3).tokenize().unwrap_err();
        assert_eq!(err, ParseFault::TokenLimitExceeded { limit: 3 });
    }

    #[test]
    fn test_offsets_monotonic() {
        let stream = tokenize("\\begin{x}a^b $c$ \\\\ % d\n\\end{x}");
        for pair in stream.tokens.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").tokens.is_empty());
    }
}
