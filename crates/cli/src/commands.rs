//! Line commands shared by shell mode (a single `argv` line), REPL mode, and
//! pipe mode (one line per `stdin` read) — the same three modes the teacher
//! offers, chosen the same way in `main.rs`.

use crate::state::SessionState;
use std::fs;

#[derive(Debug)]
pub enum Outcome {
    Ok(String),
    Quit,
}

/// Splits a line into a command word and the rest, trimming comments (`#`)
/// and blank lines to nothing.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => Some((cmd, rest.trim())),
        None => Some((line, "")),
    }
}

/// Runs one line against `state`, returning its human-readable result.
pub fn run_line(state: &mut SessionState, line: &str) -> Result<Outcome, String> {
    let Some((cmd, rest)) = split_line(line) else {
        return Ok(Outcome::Ok(String::new()));
    };

    let output = match cmd {
        "init" => {
            let rev = state.init()?;
            format!("initialized empty repository at r{}", rev)
        }
        "mkdir" => {
            let path = require_arg(rest, "mkdir PATH")?;
            let (repo, txn) = state.repo_and_txn()?;
            repo.make_dir(txn, path).map_err(|e| e.to_string())?;
            format!("mkdir {path}")
        }
        "put" => {
            let (path, content) = split_line(rest).ok_or_else(|| "usage: put PATH CONTENT | put PATH @FILE".to_string())?;
            let bytes = if let Some(file) = content.strip_prefix('@') {
                fs::read(file).map_err(|e| e.to_string())?
            } else {
                content.as_bytes().to_vec()
            };
            let (repo, txn) = state.repo_and_txn()?;
            repo.set_file_contents(txn, path, &bytes).map_err(|e| e.to_string())?;
            format!("put {path} ({} bytes)", bytes.len())
        }
        "rm" => {
            let path = require_arg(rest, "rm PATH")?;
            let (repo, txn) = state.repo_and_txn()?;
            repo.delete(txn, path).map_err(|e| e.to_string())?;
            format!("rm {path}")
        }
        "begin" => {
            state.repo_and_txn()?;
            "transaction started".to_string()
        }
        "commit" => {
            let rev = state.commit()?;
            format!("committed r{}", rev)
        }
        "abort" => {
            state.abort()?;
            "transaction aborted".to_string()
        }
        "youngest" => {
            let repo = state.repo_mut()?;
            format!("r{}", repo.youngest())
        }
        "help" | "?" => HELP.to_string(),
        "quit" | "exit" => return Ok(Outcome::Quit),
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Outcome::Ok(output))
}

fn require_arg<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest)
    }
}

const HELP: &str = "commands: init | mkdir PATH | put PATH CONTENT | put PATH @FILE | rm PATH | begin | commit | abort | youngest | quit";
