//! Testonly utilities for concurrent tests.
use std::io::IsTerminal as _;

/// Installs a test-friendly tracing subscriber and, iff the current process
/// is executed under nextest in process-per-test mode, changes the behavior
/// of the process to [panic=abort].
/// In particular it doesn't enable [panic=abort] when run via "cargo test".
pub fn abort_on_panic() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .with_ansi(std::env::var("NO_COLOR").is_err() && std::io::stdout().is_terminal())
        .with_line_number(true)
        .try_init();

    // https://nexte.st/book/env-vars.html#environment-variables-nextest-sets
    let Ok(nextest) = std::env::var("NEXTEST") else {
        return;
    };
    let Ok(nextest_execution_mode) = std::env::var("NEXTEST_EXECUTION_MODE") else {
        return;
    };
    if nextest != "1" || nextest_execution_mode != "process-per-test" {
        return;
    }
    tracing::info!("[panic=abort] enabled");
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::abort();
    }));
}

/// Guard which has to be dropped before timeout is reached.
/// Otherwise the test will panic.
#[must_use]
pub struct TimeoutGuard(#[allow(dead_code)] std::sync::mpsc::Sender<()>);

/// Panics if (real time) timeout is reached before the guard is dropped.
/// Implemented without using tokio, so that a stuck runtime cannot delay
/// the timeout evaluation.
pub fn set_timeout(timeout: std::time::Duration) -> TimeoutGuard {
    use std::sync::mpsc;
    let (send, recv) = mpsc::channel();
    std::thread::spawn(move || {
        if let Err(mpsc::RecvTimeoutError::Timeout) = recv.recv_timeout(timeout) {
            panic!("TIMEOUT");
        }
    });
    TimeoutGuard(send)
}
