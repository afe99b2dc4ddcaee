#![cfg(unix)]

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};
use subproc::{
    ExitState, NOT_IN_USE, ProcessHandle, SpawnError, TerminationResult, UnixProcessHandle,
};

const WORDS: [&str; 5] = ["put", "a", "ring", "on", "it"];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_file(true)
        .with_target(false)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

fn publish_words(fd: OwnedFd, words: &[&str]) {
    let mut writer = File::from(fd);
    for word in words {
        writeln!(writer, "{word}").unwrap();
    }
    // writer dropped: the child sees end of input
}

fn ingest_lines(fd: OwnedFd) -> Vec<String> {
    BufReader::new(File::from(fd))
        .lines()
        .collect::<std::io::Result<_>>()
        .unwrap()
}

fn spawn_sort(redirect_input: bool, redirect_output: bool) -> UnixProcessHandle {
    subproc::spawn(&["sort"], redirect_input, redirect_output).expect("failed to spawn sort")
}

#[test]
fn test_supply_and_ingest() {
    init_tracing();
    let mut child = spawn_sort(true, true);
    assert!(child.pid() > 0);
    assert!(child.supply_raw_fd() > 0);
    assert!(child.ingest_raw_fd() > 0);

    publish_words(child.take_supply().unwrap(), &WORDS);
    let sorted = ingest_lines(child.take_ingest().unwrap());
    assert_eq!(sorted, vec!["a", "it", "on", "put", "ring"]);

    assert!(subproc::wait(child.pid()).unwrap().success());
}

#[test]
fn test_supply_and_no_ingest() {
    init_tracing();
    // sort writes to the inherited stdout, so give it nothing to print
    let mut child = spawn_sort(true, false);
    assert!(child.pid() > 0);
    assert!(child.supply_raw_fd() > 0);
    assert_eq!(child.ingest_raw_fd(), NOT_IN_USE);

    publish_words(child.take_supply().unwrap(), &[]);
    assert!(subproc::wait(child.pid()).unwrap().success());
}

#[test]
fn test_no_supply_and_ingest() {
    init_tracing();
    let child = subproc::spawn(&["sleep", "30"], false, true).unwrap();
    assert!(child.pid() > 0);
    assert!(child.ingest_raw_fd() > 0);
    assert_eq!(child.supply_raw_fd(), NOT_IN_USE);

    assert_eq!(subproc::terminate(child.pid()), TerminationResult::Success);
    let state = subproc::wait(child.pid()).unwrap();
    assert_eq!(state.signal(), Some(subproc::Signal::SIGTERM as i32));
}

#[test]
fn test_no_supply_and_no_ingest() {
    init_tracing();
    let child = subproc::spawn(&["sleep", "30"], false, false).unwrap();
    assert!(child.pid() > 0);
    assert_eq!(child.ingest_raw_fd(), NOT_IN_USE);
    assert_eq!(child.supply_raw_fd(), NOT_IN_USE);

    assert_eq!(subproc::terminate(child.pid()), TerminationResult::Success);
    let state = subproc::wait(child.pid()).unwrap();
    assert!(state.is_abnormal());
    assert!(!state.success());
}

#[test]
fn test_empty_input_gives_empty_output() {
    init_tracing();
    let mut child = spawn_sort(true, true);
    assert!(child.close_supply());

    assert!(ingest_lines(child.take_ingest().unwrap()).is_empty());
    assert!(subproc::wait(child.pid()).unwrap().success());
}

#[test]
fn test_supply_close_before_child_finishes() {
    init_tracing();
    // The child reads until end of input, then lingers briefly before exiting
    let mut child = subproc::spawn(&["sh", "-c", "cat >/dev/null; sleep 0.2"], true, false).unwrap();

    let mut writer = File::from(child.take_supply().unwrap());
    writeln!(writer, "partial").unwrap();
    drop(writer);

    let started = Instant::now();
    let state = subproc::wait(child.pid()).unwrap();
    assert!(state.success());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_pids_are_unique_among_live_children() {
    init_tracing();
    let children: Vec<_> = (0..4)
        .map(|_| subproc::spawn(&["sleep", "30"], false, false).unwrap())
        .collect();

    let mut pids: Vec<_> = children.iter().map(ProcessHandle::pid).collect();
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), children.len());

    for pid in pids {
        assert_eq!(subproc::force_kill(pid), TerminationResult::Success);
        assert!(subproc::wait(pid).unwrap().is_abnormal());
    }
}

#[test]
fn test_concurrent_children_do_not_hold_each_others_pipes() {
    init_tracing();
    let mut first = subproc::spawn(&["cat"], true, true).unwrap();
    // Spawned while the first child's stdin write end is open in this process
    let mut second = subproc::spawn(&["cat"], true, true).unwrap();

    publish_words(first.take_supply().unwrap(), &["only"]);
    // Would hang if the second cat had inherited the first one's write end
    assert_eq!(ingest_lines(first.take_ingest().unwrap()), vec!["only"]);
    assert!(subproc::wait(first.pid()).unwrap().success());

    second.close_supply();
    assert!(ingest_lines(second.take_ingest().unwrap()).is_empty());
    assert!(subproc::wait(second.pid()).unwrap().success());
}

#[test]
fn test_reaping_twice_fails() {
    init_tracing();
    let child = subproc::spawn(&["true"], false, false).unwrap();
    assert_eq!(subproc::wait(child.pid()).unwrap(), ExitState::Exited(0));

    let err = subproc::wait(child.pid()).unwrap_err();
    assert!(matches!(err, SpawnError::ReapMisuse { .. }));
    assert!(err.is_caller_error());
}

#[test]
fn test_bad_executable_is_reported_at_reap() {
    init_tracing();
    let child = subproc::spawn(&["./definitely-not-here"], true, true)
        .expect("process creation succeeds even if exec will not");

    let state = subproc::wait(child.pid()).unwrap();
    assert!(state.is_exec_failure());
    assert!(!state.success());
}

#[test]
fn test_nonzero_exit_is_an_ordinary_outcome() {
    init_tracing();
    let child = subproc::spawn(&["sh", "-c", "exit 2"], false, false).unwrap();
    assert_eq!(subproc::wait(child.pid()).unwrap().code(), Some(2));
}

#[tokio::test]
async fn test_wait_async_with_sort() {
    init_tracing();
    let mut child = spawn_sort(true, true);
    publish_words(child.take_supply().unwrap(), &["b", "a"]);
    let ingest = child.take_ingest().unwrap();

    let lines = tokio::task::spawn_blocking(move || ingest_lines(ingest))
        .await
        .unwrap();
    assert_eq!(lines, vec!["a", "b"]);

    assert!(subproc::wait_async(child.pid()).await.unwrap().success());
}

#[test]
fn test_spawn_with_retry_on_default_spawner() {
    init_tracing();
    let config = subproc::SpawnConfig::from_argv(&["sort"], true, true).unwrap();
    let mut child =
        subproc::spawn_with_retry(subproc::default_spawner(), &config, &subproc::RetryConfig::aggressive())
            .unwrap();

    publish_words(child.take_supply().unwrap(), &["z", "y"]);
    assert_eq!(ingest_lines(child.take_ingest().unwrap()), vec!["y", "z"]);
    assert!(subproc::wait(child.pid()).unwrap().success());
}
