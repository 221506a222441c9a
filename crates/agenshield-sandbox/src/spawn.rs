//! Deadline-supervised child execution.
//!
//! Reads stdout/stderr on background threads while polling the child -
//! without this a child writing more than the pipe buffer would deadlock.
//! On deadline expiry the child gets SIGTERM, then SIGKILL two seconds
//! later, and the result reports exit code 124 with the delivered signal.

use anyhow::{Context, Result};
use std::io::Read;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while waiting on the child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Grace period between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Exec timeout exit code (mirrors `timeout(1)`).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Fork-bomb cap applied to wrapped children.
const MAX_CHILD_PROCESSES: u64 = 128;

/// Output file size cap in MB applied to wrapped children.
const MAX_FILE_SIZE_MB: u64 = 512;

/// Result of a supervised execution.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Signal that terminated the child, when one did (`SIGTERM`/`SIGKILL`).
    pub signal: Option<String>,
    pub timed_out: bool,
}

/// Apply rlimit hardening to a command before spawn.
#[cfg(unix)]
pub fn harden(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(|| {
            use nix::libc::{rlimit, setrlimit, RLIMIT_FSIZE, RLIMIT_NPROC};
            let nproc = rlimit {
                rlim_cur: MAX_CHILD_PROCESSES,
                rlim_max: MAX_CHILD_PROCESSES,
            };
            setrlimit(RLIMIT_NPROC, &nproc);
            let fsize = rlimit {
                rlim_cur: MAX_FILE_SIZE_MB * 1024 * 1024,
                rlim_max: MAX_FILE_SIZE_MB * 1024 * 1024,
            };
            setrlimit(RLIMIT_FSIZE, &fsize);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub fn harden(_cmd: &mut Command) {}

#[cfg(unix)]
fn send_signal(child: &Child, sig: nix::sys::signal::Signal) {
    use nix::unistd::Pid;
    let _ = nix::sys::signal::kill(Pid::from_raw(child.id() as i32), sig);
}

/// Spawn `cmd` with piped stdio, optionally write `stdin_data`, and wait at
/// most `timeout`.
pub fn run_with_deadline(
    mut cmd: Command,
    stdin_data: Option<&[u8]>,
    timeout: Duration,
) -> Result<ExecOutcome> {
    cmd.stdin(if stdin_data.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().context("Failed to spawn child process")?;

    if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
        stdin
            .write_all(data)
            .context("Failed to write child stdin")?;
    }

    // Drain pipes while the process runs.
    let stdout_handle = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut s = String::new();
            let _ = out.read_to_string(&mut s);
            s
        })
    });
    let stderr_handle = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut s = String::new();
            let _ = err.read_to_string(&mut s);
            s
        })
    });

    let start = Instant::now();
    let status = loop {
        match child.try_wait().context("Failed to wait for child")? {
            Some(status) => break Some(status),
            None => {}
        }
        if start.elapsed() > timeout {
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let join = |h: Option<thread::JoinHandle<String>>| {
        h.map(|h| h.join().unwrap_or_default()).unwrap_or_default()
    };

    match status {
        Some(status) => {
            let stdout = join(stdout_handle);
            let stderr = join(stderr_handle);
            #[cfg(unix)]
            let signal = {
                use std::os::unix::process::ExitStatusExt;
                status.signal().map(signal_name)
            };
            #[cfg(not(unix))]
            let signal = None;
            Ok(ExecOutcome {
                stdout,
                stderr,
                exit_code: status.code().unwrap_or(-1),
                signal,
                timed_out: false,
            })
        }
        None => {
            // Deadline expired: SIGTERM, grace period, SIGKILL.
            #[cfg(unix)]
            {
                send_signal(&child, nix::sys::signal::Signal::SIGTERM);
                let grace_start = Instant::now();
                let mut exited = false;
                while grace_start.elapsed() < KILL_GRACE {
                    if child.try_wait().ok().flatten().is_some() {
                        exited = true;
                        break;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                if !exited {
                    let _ = child.kill();
                }
            }
            #[cfg(not(unix))]
            {
                let _ = child.kill();
            }
            let _ = child.wait();
            let stdout = join(stdout_handle);
            let stderr = join(stderr_handle);
            tracing::warn!(timeout_secs = timeout.as_secs(), "child exceeded deadline");
            Ok(ExecOutcome {
                stdout,
                stderr,
                exit_code: TIMEOUT_EXIT_CODE,
                signal: Some("SIGKILL".to_string()),
                timed_out: true,
            })
        }
    }
}

#[cfg(unix)]
fn signal_name(sig: i32) -> String {
    match nix::sys::signal::Signal::try_from(sig) {
        Ok(s) => s.as_str().to_string(),
        Err(_) => format!("SIG{}", sig),
    }
}
