use texvalid_syntax::parse;

#[test]
fn test_incomplete_environment() {
    let diagnostics = parse("\\begin{itemize").unwrap();
    let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["invalid environment command \\begin{itemize", "unclosed group {"]
    );
}

#[test]
fn test_incomplete_group() {
    let diagnostics = parse("\\textbf{Hello").unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "unclosed group {");
}

#[test]
fn test_escaped_braces() {
    assert!(parse("\\} \\{").unwrap().is_empty());
}

#[test]
fn test_trailing_backslash() {
    assert!(parse("abc \\").unwrap().is_empty());
}

#[test]
fn test_unterminated_commands() {
    for input in [
        "\\verb",
        "\\verb|abc",
        "\\url",
        "\\url{abc",
        "\\newcommand",
        "\\newcommand{",
        "\\newcommand{\\x}[",
        "\\newenvironment{x}[1][",
        "\\def\\x#",
        "\\begin{",
        "\\end{}",
        "$$",
        "%",
    ] {
        assert!(parse(input).is_ok(), "{input:?}");
    }
}

#[test]
fn test_non_ascii_input() {
    let diagnostics = parse("Ünïcödé {\n日本語 a^b").unwrap();
    let caret = diagnostics
        .iter()
        .find(|d| d.message.starts_with('^'))
        .unwrap();
    assert_eq!((caret.start_row, caret.start_col), (1, 5));
}

#[test]
fn test_deep_nesting() {
    let input = format!("{}{}", "{".repeat(5000), "}".repeat(5000));
    assert!(parse(&input).unwrap().is_empty());
}
