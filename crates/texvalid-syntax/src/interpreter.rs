use crate::lexer::{Token, TokenKind, TokenStream};
use crate::reporter::ErrorReporter;
use once_cell::sync::Lazy;
use regex::Regex;

/// Environments whose contents are opaque literal text.
pub const VERBATIM_ENVIRONMENTS: &[&str] = &["verbatim", "boxedverbatim", "lstlisting"];

const MATH_ENVIRONMENTS: &[&str] = &[
    "equation",
    "equation*",
    "align",
    "align*",
    "gather",
    "gather*",
    "multline",
    "multline*",
    "flalign",
    "flalign*",
    "alignat",
    "alignat*",
    "eqnarray",
    "eqnarray*",
    "math",
    "displaymath",
];

/// Commands whose braced argument is typeset in text mode, even inside math.
const TEXT_ARGUMENT_COMMANDS: &[&str] = &[
    "hbox",
    "vbox",
    "mbox",
    "fbox",
    "makebox",
    "framebox",
    "parbox",
    "text",
    "textrm",
    "textsf",
    "texttt",
    "textbf",
    "textit",
    "textsl",
    "textsc",
    "textup",
    "textmd",
    "textnormal",
    "emph",
    "intertext",
    "shortintertext",
];

const MATH_ARGUMENT_COMMANDS: &[&str] = &["ensuremath"];

/// Commands whose argument is a key, name or path rather than typeset text.
const OPAQUE_ARGUMENT_COMMANDS: &[&str] = &[
    "label",
    "ref",
    "eqref",
    "pageref",
    "autoref",
    "nameref",
    "cref",
    "Cref",
    "cite",
    "citep",
    "citet",
    "nocite",
    "input",
    "include",
    "includeonly",
    "includegraphics",
    "graphicspath",
    "usepackage",
    "RequirePackage",
    "documentclass",
    "bibliography",
    "bibliographystyle",
    "addbibresource",
    "href",
    "hyperref",
    "newtheorem",
    "lstinputlisting",
];

/// `[N]` parameter count at the start of a text token.
static PARAM_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t\r\n]*\[[0-9]+\]").expect("parameter count pattern is valid"));

pub fn is_verbatim_environment(name: &str) -> bool {
    VERBATIM_ENVIRONMENTS.contains(&name)
}

fn is_math_environment(name: &str) -> bool {
    MATH_ENVIRONMENTS.contains(&name)
}

fn is_tex_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvCommand {
    Begin,
    End,
    OpenGroup,
    CloseGroup,
}

/// A structural event: a named environment boundary or an anonymous group brace.
///
/// Token fields are indices into the [`TokenStream`] the event came from. For
/// `\begin{name}` / `\end{name}` `open_token` is the control sequence and
/// `close_token` the closing brace of the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub command: EnvCommand,
    pub name: Option<String>,
    pub open_token: usize,
    pub close_token: Option<usize>,
    pub is_verbatim: bool,
}

impl Environment {
    fn group(command: EnvCommand, token: usize) -> Self {
        Self {
            command,
            name: None,
            open_token: token,
            close_token: None,
            is_verbatim: false,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.command, EnvCommand::Begin | EnvCommand::OpenGroup)
    }

    pub fn is_group(&self) -> bool {
        matches!(self.command, EnvCommand::OpenGroup | EnvCommand::CloseGroup)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Source-like rendering used in messages: `\begin{x}`, `\end{x}`, `{`, `}`.
    pub fn describe(&self) -> String {
        match self.command {
            EnvCommand::Begin => format!("\\begin{{{}}}", self.name()),
            EnvCommand::End => format!("\\end{{{}}}", self.name()),
            EnvCommand::OpenGroup => "{".to_string(),
            EnvCommand::CloseGroup => "}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Math,
    /// Argument holding a label, path or similar; scripts are legal and `$` is literal.
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOrigin {
    Document,
    Group,
    Environment,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    mode: Mode,
    origin: FrameOrigin,
    /// Math was entered with a single `$`.
    inline: bool,
}

impl Frame {
    fn new(mode: Mode, origin: FrameOrigin) -> Self {
        Self {
            mode,
            origin,
            inline: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefinitionStyle {
    /// `\newcommand{\foo}[N][default]{...}`, optionally starred.
    Latex,
    /// `\def\foo#1#2{...}`
    Primitive,
}

/// Walks a token stream and produces the structural events the balance
/// checker consumes.
///
/// Definitions (`\newcommand`, `\def`, `\newenvironment`, ...) and verbatim
/// commands (`\verb`, `\url`) are skipped as a unit so `\begin`/`\end` or
/// braces written inside them never become events. Along the way the
/// interpreter tracks math mode per group and reports scripts used outside it.
pub struct Interpreter<'a, 'r> {
    stream: &'a TokenStream,
    reporter: &'r mut ErrorReporter<'a>,
    events: Vec<Environment>,
    frames: Vec<Frame>,
    /// Name of the verbatim environment currently open, if any.
    verbatim: Option<String>,
}

/// Interprets `stream`, recording malformed commands on `reporter`.
pub fn interpret<'a>(
    stream: &'a TokenStream,
    reporter: &mut ErrorReporter<'a>,
) -> Vec<Environment> {
    Interpreter::new(stream, reporter).run()
}

impl<'a, 'r> Interpreter<'a, 'r> {
    pub fn new(stream: &'a TokenStream, reporter: &'r mut ErrorReporter<'a>) -> Self {
        Self {
            stream,
            reporter,
            events: Vec::new(),
            frames: vec![Frame::new(Mode::Text, FrameOrigin::Document)],
            verbatim: None,
        }
    }

    pub fn run(mut self) -> Vec<Environment> {
        let count = self.stream.tokens.len();
        let mut j = 0;
        while j < count {
            j = self.step(j) + 1;
        }
        self.events
    }

    /// Interprets the token at `j` and returns the index of the last token consumed.
    fn step(&mut self, j: usize) -> usize {
        let stream = self.stream;
        let token = &stream.tokens[j];
        let in_verbatim = self.verbatim.is_some();

        match &token.kind {
            TokenKind::ControlSequence(name) => return self.control_sequence(j, name),
            TokenKind::OpenGroup => {
                self.events.push(Environment::group(EnvCommand::OpenGroup, j));
                if !in_verbatim {
                    self.enter_group(j);
                }
            }
            TokenKind::CloseGroup => {
                self.events.push(Environment::group(EnvCommand::CloseGroup, j));
                if !in_verbatim {
                    self.leave_group();
                }
            }
            TokenKind::MathInline if !in_verbatim => self.toggle_math(true),
            TokenKind::MathDisplay if !in_verbatim => self.toggle_math(false),
            TokenKind::Superscript | TokenKind::Subscript if !in_verbatim => {
                self.check_script(token)
            }
            _ => {}
        }
        j
    }

    fn control_sequence(&mut self, j: usize, name: &str) -> usize {
        match name {
            "begin" => self.environment_command(j, EnvCommand::Begin),
            "end" => self.environment_command(j, EnvCommand::End),
            _ if self.verbatim.is_some() => j,
            "newcommand" | "renewcommand" | "providecommand" | "DeclareRobustCommand" => {
                self.skip_command_definition(j, DefinitionStyle::Latex)
            }
            "def" | "gdef" | "edef" | "xdef" => {
                self.skip_command_definition(j, DefinitionStyle::Primitive)
            }
            "newenvironment" | "renewenvironment" => self.skip_environment_definition(j, 2),
            "newcolumntype" => self.skip_environment_definition(j, 1),
            "verb" => self.skip_verb(j),
            "url" => self.skip_url(j),
            "(" | "[" => {
                self.set_math(true);
                j
            }
            ")" | "]" => {
                self.set_math(false);
                j
            }
            _ => j,
        }
    }

    // Environments

    fn environment_command(&mut self, j: usize, command: EnvCommand) -> usize {
        let Some((name, close)) = self.read_environment_name(j) else {
            self.report_invalid_environment(j);
            return j;
        };

        match &self.verbatim {
            Some(open) => {
                if command == EnvCommand::End && *open == name {
                    self.verbatim = None;
                }
            }
            None if command == EnvCommand::Begin => {
                if is_verbatim_environment(&name) {
                    self.verbatim = Some(name.clone());
                } else if is_math_environment(&name) {
                    self.frames
                        .push(Frame::new(Mode::Math, FrameOrigin::Environment));
                }
            }
            None => {
                if is_math_environment(&name) {
                    self.leave_math_environment();
                }
            }
        }

        let is_verbatim = is_verbatim_environment(&name);
        self.events.push(Environment {
            command,
            name: Some(name),
            open_token: j,
            close_token: Some(close),
            is_verbatim,
        });
        close
    }

    /// Reads `{name}` after the token at `j`, returning the name and the index
    /// of the closing brace.
    ///
    /// Besides a plain text name this accepts single-word segments joined by
    /// `_`, which the lexer splits into separate tokens (`new_theorem`).
    fn read_environment_name(&self, j: usize) -> Option<(String, usize)> {
        let stream = self.stream;
        let tokens = &stream.tokens;

        if !tokens.get(j + 1)?.is(&TokenKind::OpenGroup) {
            return None;
        }
        let first = tokens.get(j + 2)?;
        if first.kind != TokenKind::Text {
            return None;
        }
        if tokens.get(j + 3).is_some_and(|t| t.is(&TokenKind::CloseGroup)) {
            return Some((stream.text(first), j + 3));
        }

        let mut name = String::new();
        let mut k = j + 2;
        loop {
            let token = tokens.get(k)?;
            match token.kind {
                TokenKind::Text => {
                    let text = stream.text(token);
                    if text.chars().any(is_tex_whitespace) {
                        return None;
                    }
                    name.push_str(&text);
                }
                TokenKind::Subscript => name.push('_'),
                TokenKind::CloseGroup => return Some((name, k)),
                _ => return None,
            }
            k += 1;
        }
    }

    /// Reports as much of a malformed `\begin`/`\end` as can be read, stopping
    /// at the first whitespace of a partial name.
    fn report_invalid_environment(&mut self, j: usize) {
        let stream = self.stream;
        let tokens = &stream.tokens;
        let token = &tokens[j];

        let mut end_token: Option<Token> = None;
        if let Some(open) = tokens.get(j + 1).filter(|t| t.is(&TokenKind::OpenGroup)) {
            end_token = Some(open.clone());
            if let Some(text) = tokens.get(j + 2).filter(|t| t.is(&TokenKind::Text)) {
                let mut partial = text.clone();
                partial.end = (text.start..text.end)
                    .find(|&i| is_tex_whitespace(stream.chars[i]))
                    .unwrap_or(text.end)
                    .max(open.end);
                end_token = Some(partial);
            }
        }

        match end_token {
            Some(end) => {
                let message = format!(
                    "invalid environment command {}",
                    stream.slice(token.start, end.end)
                );
                self.reporter.token_error_range(token, &end, message);
            }
            None => self.reporter.token_error(token, "invalid environment command"),
        }
    }

    // Definitions

    fn skip_command_definition(&mut self, j: usize, style: DefinitionStyle) -> usize {
        let mut k = j;
        if style == DefinitionStyle::Latex {
            if let Some(next) = self.read_star(k) {
                k = next;
            }
        }

        let Some(next) = self.read_command_name(k) else {
            return j;
        };
        k = next;

        let params = match style {
            DefinitionStyle::Latex => self.read_optional_params(k),
            DefinitionStyle::Primitive => self.read_parameter_text(k),
        };
        if let Some(next) = params {
            k = next;
        }
        if let Some(next) = self.read_definition(k) {
            k = next;
        }
        k
    }

    fn skip_environment_definition(&mut self, j: usize, bodies: usize) -> usize {
        let Some((_, mut k)) = self.read_environment_name(j) else {
            return j;
        };
        if let Some(next) = self.read_optional_params(k) {
            k = next;
        }
        for _ in 0..bodies {
            match self.read_definition(k) {
                Some(next) => k = next,
                None => break,
            }
        }
        k
    }

    fn read_star(&self, k: usize) -> Option<usize> {
        let token = self.stream.tokens.get(k + 1)?;
        (token.kind == TokenKind::Text && self.stream.text(token).trim() == "*").then_some(k + 1)
    }

    /// Reads the command being defined: `\foo` or `{\foo}`.
    fn read_command_name(&self, k: usize) -> Option<usize> {
        let tokens = &self.stream.tokens;
        let next = tokens.get(k + 1)?;
        if next.control_sequence().is_some() {
            return Some(k + 1);
        }
        if next.is(&TokenKind::OpenGroup) {
            let name = tokens.get(k + 2)?;
            let close = tokens.get(k + 3)?;
            if name.control_sequence().is_some() && close.is(&TokenKind::CloseGroup) {
                return Some(k + 3);
            }
        }
        None
    }

    /// Reads `[N]` and an optional `[default]` following it.
    fn read_optional_params(&self, k: usize) -> Option<usize> {
        let stream = self.stream;
        let token = stream.tokens.get(k + 1)?;
        if token.kind != TokenKind::Text {
            return None;
        }
        let text = stream.text(token);
        let count = PARAM_COUNT.find(&text)?;

        // The pattern is ASCII-only, so its byte length is its character length.
        let after = token.start + count.end();
        if stream.char_at(after) != Some('[') {
            return Some(k + 1);
        }
        let consumed = self
            .find_closing_bracket(after)
            .map_or(k + 1, |close| self.last_token_at(close).max(k + 1));
        Some(consumed)
    }

    /// Reads a `\def` parameter text up to the body's brace. Delimiters may be
    /// text or control sequences (`#1#2`, `#1\par`, `#1\@nil`).
    fn read_parameter_text(&self, k: usize) -> Option<usize> {
        let tokens = &self.stream.tokens;
        let mut n = k;
        loop {
            match tokens.get(n + 1)?.kind {
                TokenKind::OpenGroup => break,
                TokenKind::CloseGroup => return None,
                _ => n += 1,
            }
        }
        (n > k).then_some(n)
    }

    /// Reads a brace-delimited definition body after optional whitespace,
    /// matching braces by depth only. Returns the index of the closing brace.
    fn read_definition(&self, k: usize) -> Option<usize> {
        let stream = self.stream;
        let tokens = &stream.tokens;

        let mut n = k + 1;
        while let Some(token) = tokens.get(n) {
            if token.kind != TokenKind::Text {
                break;
            }
            if !stream.chars[token.start..token.end]
                .iter()
                .all(|&c| is_tex_whitespace(c))
            {
                return None;
            }
            n += 1;
        }
        if !tokens.get(n)?.is(&TokenKind::OpenGroup) {
            return None;
        }

        let mut depth = 0usize;
        for (i, token) in tokens.iter().enumerate().skip(n) {
            match token.kind {
                TokenKind::OpenGroup => depth += 1,
                TokenKind::CloseGroup => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    // Verbatim commands

    fn skip_verb(&mut self, j: usize) -> usize {
        let stream = self.stream;
        let token = &stream.tokens[j];

        let mut p = token.end;
        if stream.char_at(p) == Some('*') {
            p += 1;
        }
        let close = match stream.char_at(p) {
            Some(delim) if !is_tex_whitespace(delim) => (p + 1..stream.len())
                .take_while(|&i| stream.chars[i] != '\n')
                .find(|&i| stream.chars[i] == delim),
            _ => None,
        };

        match close {
            Some(close) => self.last_token_at(close).max(j),
            None => {
                self.reporter.token_error(token, "invalid verbatim command");
                j
            }
        }
    }

    fn skip_url(&mut self, j: usize) -> usize {
        let stream = self.stream;
        let token = &stream.tokens[j];

        let mut p = token.end;
        while stream.char_at(p).is_some_and(is_tex_whitespace) {
            p += 1;
        }
        let close = match stream.char_at(p) {
            Some('{') => self.find_matching_brace(p),
            Some(delim) => (p + 1..stream.len())
                .take_while(|&i| stream.chars[i] != '\n')
                .find(|&i| stream.chars[i] == delim),
            None => None,
        };

        match close {
            Some(close) => self.last_token_at(close).max(j),
            None => {
                self.reporter.token_error(token, "invalid url command");
                j
            }
        }
    }

    fn find_matching_brace(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, &c) in self.stream.chars.iter().enumerate().skip(open) {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Finds the `]` closing an optional argument opened at `open`, skipping
    /// over brace groups.
    fn find_closing_bracket(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, &c) in self.stream.chars.iter().enumerate().skip(open + 1) {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.checked_sub(1)?,
                ']' if depth == 0 => return Some(i),
                _ => {}
            }
        }
        None
    }

    /// Index of the last token starting at or before `offset`.
    fn last_token_at(&self, offset: usize) -> usize {
        self.stream
            .tokens
            .partition_point(|t| t.start <= offset)
            .saturating_sub(1)
    }

    // Math mode

    fn current_mode(&self) -> Mode {
        self.frames.last().map_or(Mode::Text, |frame| frame.mode)
    }

    fn set_math(&mut self, on: bool) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.mode != Mode::Opaque {
                frame.mode = if on { Mode::Math } else { Mode::Text };
                frame.inline = false;
            }
        }
    }

    /// Handles `$` (`inline`) or `$$`. A `$$` met inside `$...$` math closes
    /// it and opens another inline formula, as in `$a$$b$`.
    fn toggle_math(&mut self, inline: bool) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        match frame.mode {
            Mode::Text => {
                frame.mode = Mode::Math;
                frame.inline = inline;
            }
            Mode::Math if frame.inline && !inline => {}
            Mode::Math => {
                frame.mode = Mode::Text;
                frame.inline = false;
            }
            Mode::Opaque => {}
        }
    }

    fn enter_group(&mut self, j: usize) {
        let current = self.current_mode();
        let mode = match self.argument_owner(j) {
            _ if current == Mode::Opaque => Mode::Opaque,
            Some(name) if TEXT_ARGUMENT_COMMANDS.contains(&name) => Mode::Text,
            Some(name) if MATH_ARGUMENT_COMMANDS.contains(&name) => Mode::Math,
            Some(name) if OPAQUE_ARGUMENT_COMMANDS.contains(&name) => Mode::Opaque,
            _ => current,
        };
        self.frames.push(Frame::new(mode, FrameOrigin::Group));
    }

    /// Pops the frame of the innermost group. A stray `}` leaves an open math
    /// environment in place, as the balance checker does.
    fn leave_group(&mut self) {
        if self.frames.len() > 1
            && self
                .frames
                .last()
                .is_some_and(|f| f.origin == FrameOrigin::Group)
        {
            self.frames.pop();
        }
    }

    fn leave_math_environment(&mut self) {
        if let Some(pos) = self
            .frames
            .iter()
            .rposition(|f| f.origin == FrameOrigin::Environment)
        {
            self.frames.truncate(pos);
        }
    }

    /// Control sequence whose argument starts with the brace at `j`, looking
    /// through one optional `[...]` argument.
    fn argument_owner(&self, j: usize) -> Option<&'a str> {
        let stream = self.stream;
        let tokens = &stream.tokens;
        let mut k = j.checked_sub(1)?;

        if tokens[k].kind == TokenKind::Text {
            if !stream.text(&tokens[k]).trim_end().ends_with(']') {
                return None;
            }
            loop {
                let token = &tokens[k];
                match token.kind {
                    TokenKind::Text if stream.text(token).trim_start().starts_with('[') => break,
                    TokenKind::OpenGroup | TokenKind::CloseGroup => return None,
                    _ if j - k > 16 => return None,
                    _ => k = k.checked_sub(1)?,
                }
            }
            k = k.checked_sub(1)?;
        }
        tokens[k].control_sequence()
    }

    fn check_script(&mut self, token: &Token) {
        if self.current_mode() != Mode::Text {
            return;
        }
        let message = match token.kind {
            TokenKind::Superscript => "^ must be inside math mode",
            _ => "_ must be inside math mode",
        };
        self.reporter.token_error(token, message);
    }
}
