//! Line-oriented shell over [`fsfs_engine::Repo`].
//!
//! Three modes, same split as the teacher's CLI:
//! - **Shell mode**: `fsfs --repo PATH COMMAND ARGS...` — one command, exit.
//! - **REPL mode**: `fsfs --repo PATH` with a TTY on stdin — interactive prompt.
//! - **Pipe mode**: `cat script.txt | fsfs --repo PATH` — one command per line.
//!
//! [`fsfs_engine::Repo::open`] can only resume a repository still at
//! revision 0 (see its own doc comment) or one this same process created, so
//! REPL/pipe mode — which keeps one `Repo` open for the whole run — is the
//! only way to script more than a single commit against an existing
//! repository from this shell.

use clap::{Arg, Command};
use fsfs_cli::commands::{self, Outcome};
use fsfs_cli::state::SessionState;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("fsfs")
        .about("Line-oriented shell over the commit core")
        .arg(Arg::new("repo").long("repo").help("repository path (default: .fsfs)").global(true))
        .arg(
            Arg::new("command")
                .help("a single command to run, then exit (otherwise reads lines from stdin)")
                .num_args(0..)
                .trailing_var_arg(true),
        )
}

fn main() {
    let matches = build_cli().get_matches();
    let repo_path = PathBuf::from(matches.get_one::<String>("repo").map(String::as_str).unwrap_or(".fsfs"));

    let mut state = match SessionState::open_existing(&repo_path) {
        Ok(s) => s,
        Err(_) => SessionState::new(repo_path),
    };

    let inline: Vec<&String> = matches.get_many::<String>("command").map(|v| v.collect()).unwrap_or_default();
    if !inline.is_empty() {
        let line = inline.into_iter().cloned().collect::<Vec<_>>().join(" ");
        match commands::run_line(&mut state, &line) {
            Ok(Outcome::Ok(msg)) => {
                if !msg.is_empty() {
                    println!("{msg}");
                }
            }
            Ok(Outcome::Quit) => {}
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    run_interactive(&mut state);
}

fn run_interactive(state: &mut SessionState) {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut out = io::stdout();

    loop {
        if interactive {
            print!("fsfs> ");
            let _ = out.flush();
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("error: {e}");
                break;
            }
        }
        match commands::run_line(state, &line) {
            Ok(Outcome::Ok(msg)) => {
                if !msg.is_empty() {
                    println!("{msg}");
                }
            }
            Ok(Outcome::Quit) => break,
            Err(e) => eprintln!("error: {e}"),
        }
    }
}
