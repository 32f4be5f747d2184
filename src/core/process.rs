//! Subprocess execution with a deadline and cooperative cancellation.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long the output readers may lag behind the process once it is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            success: false,
            exit_code: -1,
            timed_out: false,
            cancelled: false,
        }
    }

    /// stdout followed by stderr, for callers that want one transcript.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }
}

/// Limits applied to one subprocess.
#[derive(Clone, Copy)]
pub struct RunLimits<'a> {
    pub timeout: Option<Duration>,
    pub cancel: &'a CancelToken,
}

/// Run `sh -c <command>` with optional extra environment.
pub fn run_shell(command: &str, env: &[(String, String)], limits: RunLimits<'_>) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    run(cmd, limits)
}

/// Spawn `cmd`, capture its output and wait for it within `limits`.
///
/// The command runs in its own process group. The group is killed on
/// timeout, on cancellation and once the direct child has exited, so
/// background grandchildren holding the output pipes cannot stretch the
/// wait past the deadline.
pub fn run(mut cmd: Command, limits: RunLimits<'_>) -> CommandOutput {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutput::spawn_failed(format!("Command error: {}", e)),
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let mut timed_out = false;
    let mut cancelled = false;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                #[cfg(unix)]
                kill_process_group(child.id());
                break Some(status);
            }
            Ok(None) => {}
            Err(_) => break None,
        }
        if limits.timeout.is_some_and(|t| started.elapsed() >= t) {
            timed_out = true;
            break kill(&mut child);
        }
        if limits.cancel.is_cancelled() {
            cancelled = true;
            break kill(&mut child);
        }
        thread::sleep(POLL_INTERVAL);
    };

    let drain_until = Instant::now()
        + limits
            .timeout
            .map(|t| t.saturating_sub(started.elapsed()))
            .unwrap_or_default()
            .max(DRAIN_GRACE);
    let stdout = collect(stdout, drain_until);
    let mut stderr = collect(stderr, drain_until);

    if timed_out {
        if let Some(t) = limits.timeout {
            stderr.push_str(&format!("command timed out after {}s", t.as_secs_f64()));
        }
    } else if cancelled {
        stderr.push_str("command cancelled");
    }

    let (success, exit_code) = match status {
        Some(s) if !timed_out && !cancelled => (s.success(), s.code().unwrap_or(-1)),
        _ => (false, -1),
    };

    CommandOutput {
        stdout,
        stderr,
        success,
        exit_code,
        timed_out,
        cancelled,
    }
}

fn kill(child: &mut Child) -> Option<std::process::ExitStatus> {
    #[cfg(unix)]
    kill_process_group(child.id());
    let _ = child.kill();
    child.wait().ok()
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let pgid = pid as libc::pid_t;
    // SAFETY: kill(2) takes no pointers. The group was created at spawn with
    // `process_group(0)`, so its id is the child's pid and a negative value
    // addresses that group only. ESRCH for an empty group is ignored.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });
        rx
    })
}

/// Wait for a reader until `until`. A pipe still held open by a process
/// that left the group yields nothing rather than blocking the run.
fn collect(reader: Option<Receiver<String>>, until: Instant) -> String {
    reader
        .and_then(|rx| rx.recv_timeout(until.saturating_duration_since(Instant::now())).ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn limits(token: &CancelToken, secs: Option<u64>) -> RunLimits<'_> {
        RunLimits {
            timeout: secs.map(Duration::from_secs),
            cancel: token,
        }
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let token = CancelToken::new();
        let out = run_shell("echo hello; echo oops >&2; exit 3", &[], limits(&token, Some(10)));
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success);
    }

    #[test]
    fn passes_extra_environment() {
        let token = CancelToken::new();
        let env = vec![("KUBECONFIG".to_string(), "/tmp/kc".to_string())];
        let out = run_shell("printf %s \"$KUBECONFIG\"", &env, limits(&token, Some(10)));
        assert!(out.success);
        assert_eq!(out.stdout, "/tmp/kc");
    }

    #[test]
    fn timeout_kills_the_process_group() {
        let token = CancelToken::new();
        let started = Instant::now();
        let out = run_shell("sleep 30; echo done", &[], limits(&token, Some(1)));
        assert!(out.timed_out);
        assert!(!out.success);
        assert!(out.stderr.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn background_child_does_not_outlive_the_deadline() {
        let token = CancelToken::new();
        let started = Instant::now();
        let out = run_shell("sleep 8 & echo started", &[], limits(&token, Some(1)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(out.stdout, "started\n");
        assert!(out.success);
    }

    #[test]
    fn escaped_grandchild_cannot_hold_the_run_open() {
        let token = CancelToken::new();
        let started = Instant::now();
        let out = run_shell(
            "setsid sleep 8 2>/dev/null || sleep 8 & echo started",
            &[],
            limits(&token, Some(1)),
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn cancelled_token_stops_the_command() {
        let token = CancelToken::new();
        token.cancel();
        let out = run_shell("sleep 30", &[], limits(&token, None));
        assert!(out.cancelled);
        assert!(!out.success);
    }

    #[test]
    fn missing_program_reports_spawn_error() {
        let token = CancelToken::new();
        let out = run(
            Command::new("definitely-not-a-real-program-xyz"),
            limits(&token, Some(5)),
        );
        assert!(!out.success);
        assert!(out.stderr.starts_with("Command error:"));
    }
}
