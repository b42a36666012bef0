//! A demo shell that exercises the library end to end: a prompt,
//! persistent history, and a small fixed-word completer.
//!
//! Out of the library's scope (spec §1); kept only as an integration
//! smoke test, the way the teacher's own `src/bin/rile.rs` drives
//! `rile` as a real terminal program rather than only through tests.

use std::path::PathBuf;

use clap::Parser;
use liner_engine::{Editor, Outcome};
use tracing::info;

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

const WORDLIST: &[&str] = &["help", "history", "hello", "quit", "exit", "clear"];

#[derive(Parser)]
#[command(name = PKG_NAME, version = PKG_VERSION, about = PKG_DESCRIPTION)]
struct Args {
    /// File to load/save line history from.
    #[arg(long, default_value = "linerline-history.txt")]
    history_file: PathBuf,

    /// Prompt string shown before each line.
    #[arg(long, default_value = "> ")]
    prompt: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut editor = Editor::new(0, 1);
    editor.set_prompt(&args.prompt);
    editor.set_completion_callback(|buf, cursor, builder| {
        let word_start = buf[..cursor]
            .iter()
            .rposition(|&b| b == b' ')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let prefix = String::from_utf8_lossy(&buf[word_start..cursor]).into_owned();
        if prefix.is_empty() {
            return;
        }
        for word in WORDLIST.iter().filter(|w| w.starts_with(prefix.as_str())) {
            let mut replacement = String::from_utf8_lossy(&buf[..word_start]).into_owned();
            replacement.push_str(word);
            let cursor = replacement.len();
            builder.add(*word, replacement, cursor);
        }
    });

    if let Err(err) = editor.history_load(&args.history_file) {
        eprintln!("warning: could not load history from {:?}: {}", args.history_file, err);
    }
    if let Err(err) = editor.watch_winch() {
        eprintln!("warning: could not watch for terminal resizes: {}", err);
    }

    loop {
        match editor.read_line() {
            Ok(Outcome::HaveText(line)) => {
                if line == "quit" || line == "exit" {
                    break;
                }
                editor.history_add(line.clone());
                println!("{}", line);
            }
            Ok(Outcome::Closed) => {
                println!();
                break;
            }
            Ok(Outcome::Cancelled) => continue,
            Ok(Outcome::Continue) => unreachable!("read_line never yields Continue"),
            Err(err) => {
                eprintln!("error: {}", err);
                break;
            }
        }
    }

    if let Err(err) = editor.history_save(&args.history_file) {
        eprintln!("warning: could not save history to {:?}: {}", args.history_file, err);
    }
    info!("exiting");
}
