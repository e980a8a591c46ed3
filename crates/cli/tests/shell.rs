use fsfs_cli::commands::{run_line, Outcome};
use fsfs_cli::state::SessionState;
use tempfile::tempdir;

fn expect_ok(outcome: Result<Outcome, String>) -> String {
    match outcome.expect("command should succeed") {
        Outcome::Ok(msg) => msg,
        Outcome::Quit => panic!("expected Ok, got Quit"),
    }
}

#[test]
fn init_mkdir_put_commit_round_trip() {
    let dir = tempdir().unwrap();
    let mut state = SessionState::new(dir.path().to_path_buf());

    assert!(expect_ok(run_line(&mut state, "init")).contains("r0"));
    expect_ok(run_line(&mut state, "mkdir /docs"));
    expect_ok(run_line(&mut state, "put /docs/a.txt hello there"));
    let commit_msg = expect_ok(run_line(&mut state, "commit"));
    assert!(commit_msg.contains("r1"));

    let youngest_msg = expect_ok(run_line(&mut state, "youngest"));
    assert_eq!(youngest_msg, "r1");
}

#[test]
fn unknown_command_is_an_error() {
    let dir = tempdir().unwrap();
    let mut state = SessionState::new(dir.path().to_path_buf());
    run_line(&mut state, "init").unwrap();
    let err = run_line(&mut state, "frobnicate").unwrap_err();
    assert!(err.contains("unknown command"));
}

#[test]
fn commit_without_mutation_is_a_no_op_commit() {
    let dir = tempdir().unwrap();
    let mut state = SessionState::new(dir.path().to_path_buf());
    run_line(&mut state, "init").unwrap();
    run_line(&mut state, "begin").unwrap();
    let msg = expect_ok(run_line(&mut state, "commit"));
    assert!(msg.contains("r1"));
}
