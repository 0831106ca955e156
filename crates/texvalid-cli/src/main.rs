use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use crossbeam_channel::{select, unbounded};
use notify::{EventKind, RecursiveMode, Watcher};
use texvalid_syntax::{parse_with, Diagnostic};
use texvalid_worker::{Event, Request, WorkerConfig, WorkerHandle};

#[derive(Parser)]
#[command(name = "texvalid")]
#[command(about = "Structural validator for TeX/LaTeX documents", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Parser token cap, overriding TEXVALID_MAX_TOKENS
    #[arg(long, global = true, value_name = "N")]
    max_tokens: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a file once and print its diagnostics
    Check {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the lint worker over stdin/stdout (JSON lines)
    Serve,
    /// Re-validate a file every time it changes
    Watch {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = WorkerConfig::from_env()?;
    if let Some(max_tokens) = cli.max_tokens {
        config = config.with_max_tokens(max_tokens);
    }

    match &cli.command {
        Commands::Check { path, json } => check(path, *json, &config),
        Commands::Serve => serve(config).map(|()| ExitCode::SUCCESS),
        Commands::Watch { path } => watch(path, config).map(|()| ExitCode::SUCCESS),
    }
}

fn check(path: &Path, json: bool, config: &WorkerConfig) -> anyhow::Result<ExitCode> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let diagnostics = parse_with(&text, &config.parse_options())
        .with_context(|| format!("validating {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        print_diagnostics(path, &diagnostics);
    }

    if diagnostics.iter().any(Diagnostic::is_error) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn serve(config: WorkerConfig) -> anyhow::Result<()> {
    let worker = WorkerHandle::spawn(config)?;
    let events = worker.events().clone();

    let printer = thread::spawn(move || -> anyhow::Result<()> {
        let stdout = io::stdout();
        for event in events.iter() {
            let mut out = stdout.lock();
            writeln!(out, "{}", event.to_json()?)?;
            out.flush()?;
            if event == Event::Terminate {
                break;
            }
        }
        Ok(())
    });

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match Request::from_json(&line) {
            Ok(Request::Terminate) => break,
            Ok(request) => worker.send(request),
            Err(err) => log::warn!("ignoring malformed request: {}", err),
        }
    }

    worker.terminate();
    printer
        .join()
        .map_err(|_| anyhow!("output thread panicked"))?
}

fn watch(path: &Path, config: WorkerConfig) -> anyhow::Result<()> {
    let path = fs::canonicalize(path).with_context(|| format!("resolving {}", path.display()))?;
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;

    let (fs_tx, fs_rx) = unbounded();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = fs_tx.send(res);
    })?;
    // Watch the directory so editors that replace the file are still seen.
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    let worker = WorkerHandle::spawn(config)?;
    worker.set_value(fs::read_to_string(&path)?);
    log::info!("watching {}", path.display());

    loop {
        select! {
            recv(fs_rx) -> res => match res {
                Ok(Ok(event)) => {
                    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        && event.paths.iter().any(|p| p == &path);
                    if relevant {
                        match fs::read_to_string(&path) {
                            Ok(text) => worker.set_value(text),
                            Err(err) => log::warn!("could not read {}: {}", path.display(), err),
                        }
                    }
                }
                Ok(Err(err)) => log::error!("watch error: {:?}", err),
                Err(_) => break,
            },
            recv(worker.events()) -> event => match event {
                Ok(Event::Lint { data }) => {
                    println!("--- {} ({} diagnostics)", path.display(), data.len());
                    print_diagnostics(&path, &data);
                }
                Ok(Event::Terminate) | Err(_) => break,
            },
        }
    }
    Ok(())
}

fn print_diagnostics(path: &Path, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        println!("{}", format_diagnostic(path, diagnostic));
    }
}

/// `file:row:col: severity: message`, with 1-based row and column.
fn format_diagnostic(path: &Path, diagnostic: &Diagnostic) -> String {
    format!(
        "{}:{}:{}: {}: {}",
        path.display(),
        diagnostic.start_row + 1,
        diagnostic.start_col + 1,
        diagnostic.severity,
        diagnostic.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_format_diagnostic() {
        let diagnostics = texvalid_syntax::parse("x\nthis is a^b").unwrap();
        assert_eq!(
            format_diagnostic(Path::new("doc.tex"), &diagnostics[0]),
            "doc.tex:2:10: error: ^ must be inside math mode"
        );
    }

    #[test]
    fn test_parse_check_arguments() {
        let cli = Cli::try_parse_from([
            "texvalid",
            "check",
            "a.tex",
            "--json",
            "--max-tokens",
            "10",
        ])
        .unwrap();
        assert_eq!(cli.max_tokens, Some(10));
        match cli.command {
            Commands::Check { path, json } => {
                assert_eq!(path, PathBuf::from("a.tex"));
                assert!(json);
            }
            _ => panic!("expected check"),
        }
    }
}
