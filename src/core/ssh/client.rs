use crate::cancel::CancelToken;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::process::{self, CommandOutput, RunLimits};
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::{Duration, Instant};

const BACKOFF_SLICE: Duration = Duration::from_millis(100);

/// How the remote node's host key is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Host must already be in known_hosts.
    Strict,
    /// Trust on first use, then pin.
    #[default]
    AcceptNew,
    /// No verification at all. Only for throwaway test clusters.
    Insecure,
}

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    password: Option<String>,
    host_key_policy: HostKeyPolicy,
    connect_timeout_secs: u64,
    connect_attempts: u32,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

impl SshClient {
    pub fn from_config(host: &str, remote: &RemoteConfig) -> Result<Self> {
        let identity_file = match &remote.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(host, expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", host);
        }

        Ok(Self {
            host: host.to_string(),
            user: remote.user.clone(),
            port: remote.port,
            identity_file,
            password: remote.password.clone().filter(|p| !p.is_empty()),
            host_key_policy: remote.host_key_policy,
            connect_timeout_secs: remote.connect_timeout_secs,
            connect_attempts: remote.connect_attempts.max(1),
            is_local,
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Password auth needs the prompt, which BatchMode would suppress.
        if self.password.is_none() {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }

        args.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        match self.host_key_policy {
            HostKeyPolicy::Strict => {
                args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()]);
            }
            HostKeyPolicy::AcceptNew => {
                args.extend([
                    "-o".to_string(),
                    "StrictHostKeyChecking=accept-new".to_string(),
                ]);
            }
            HostKeyPolicy::Insecure => {
                args.extend([
                    "-o".to_string(),
                    "StrictHostKeyChecking=no".to_string(),
                    "-o".to_string(),
                    "UserKnownHostsFile=/dev/null".to_string(),
                ]);
            }
        }

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    fn build_command(&self, command: &str) -> Command {
        let args = self.build_ssh_args(command);
        match &self.password {
            // sshpass -e reads the password from SSHPASS, keeping it off argv.
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh").args(&args);
                cmd.env("SSHPASS", password);
                cmd
            }
            None => {
                let mut cmd = Command::new("ssh");
                cmd.args(&args);
                cmd
            }
        }
    }

    /// Run `command` on the host over a fresh connection.
    pub fn execute(&self, command: &str, limits: RunLimits<'_>) -> CommandOutput {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3

        let mut attempt = 0;
        loop {
            let result = self.execute_once(command, limits);
            attempt += 1;

            // Only retry on transient connection errors, not command failures
            if result.success
                || attempt >= self.connect_attempts
                || !is_transient_ssh_error(&result)
                || limits.cancel.is_cancelled()
            {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt,
                self.connect_attempts,
                delay
            );
            if !sleep_unless_cancelled(Duration::from_secs(delay), limits.cancel) {
                return result;
            }
        }
    }

    fn execute_once(&self, command: &str, limits: RunLimits<'_>) -> CommandOutput {
        if self.is_local {
            return process::run_shell(command, &[], limits);
        }
        process::run(self.build_command(command), limits)
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// ssh exits 255 when the connection itself failed rather than the remote command.
pub fn is_connection_error(output: &CommandOutput) -> bool {
    !output.timed_out && !output.cancelled && output.exit_code == 255
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    if !is_connection_error(output) {
        return false;
    }
    let stderr = output.stderr.to_lowercase();

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    transient_patterns.iter().any(|p| stderr.contains(p))
}

/// Sleep for `delay` in short slices. Returns false as soon as `cancel` trips.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancelToken) -> bool {
    let until = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let left = until.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        std::thread::sleep(left.min(BACKOFF_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteConfig {
        crate::config::DocvalConfig::default().remote
    }

    fn output(exit_code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: exit_code == 0,
            exit_code,
            timed_out: false,
            cancelled: false,
        }
    }

    #[test]
    fn args_target_user_at_host_and_whole_line() {
        let client = SshClient::from_config("10.0.0.5", &remote()).unwrap();
        let args = client.build_ssh_args("pxctl status");

        assert_eq!(args[args.len() - 2], "root@10.0.0.5");
        assert_eq!(args[args.len() - 1], "pxctl status");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn insecure_policy_skips_known_hosts() {
        let mut cfg = remote();
        cfg.host_key_policy = HostKeyPolicy::Insecure;
        cfg.port = 2222;
        let client = SshClient::from_config("node1", &cfg).unwrap();
        let args = client.build_ssh_args("pxctl status");

        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "2222"));
    }

    #[test]
    fn password_auth_drops_batch_mode_and_uses_sshpass() {
        let mut cfg = remote();
        cfg.password = Some("secret".to_string());
        let client = SshClient::from_config("node1", &cfg).unwrap();

        assert!(!client
            .build_ssh_args("pxctl status")
            .contains(&"BatchMode=yes".to_string()));
        let cmd = client.build_command("pxctl status");
        assert_eq!(cmd.get_program(), "sshpass");
        assert!(!cmd
            .get_args()
            .any(|a| a.to_string_lossy().contains("secret")));
    }

    #[test]
    fn missing_identity_file_is_rejected() {
        let mut cfg = remote();
        cfg.identity_file = Some("/nonexistent/id_rsa".to_string());
        let err = SshClient::from_config("node1", &cfg).err().unwrap();
        assert_eq!(err.code.as_str(), "ssh.identity_file_not_found");
    }

    #[test]
    fn connection_errors_are_exit_255() {
        assert!(is_connection_error(&output(255, "ssh: connect to host x port 22: Connection refused")));
        assert!(!is_connection_error(&output(1, "pxctl: command failed")));
        assert!(is_transient_ssh_error(&output(255, "Connection refused")));
        assert!(!is_transient_ssh_error(&output(255, "Permission denied (publickey)")));
    }

    #[cfg(unix)]
    #[test]
    fn localhost_runs_commands_locally() {
        let client = SshClient::from_config("localhost", &remote()).unwrap();
        assert!(client.is_local);

        let token = CancelToken::new();
        let out = client.execute(
            "echo via-local",
            RunLimits {
                timeout: Some(std::time::Duration::from_secs(10)),
                cancel: &token,
            },
        );
        assert!(out.success);
        assert_eq!(out.stdout, "via-local\n");
    }

    #[test]
    fn backoff_returns_early_when_cancelled_mid_sleep() {
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            remote.cancel();
        });

        let started = Instant::now();
        assert!(!sleep_unless_cancelled(Duration::from_secs(5), &token));
        assert!(started.elapsed() < Duration::from_secs(2));
        canceller.join().unwrap();
    }

    #[test]
    fn backoff_sleeps_full_delay_without_cancellation() {
        let token = CancelToken::new();
        let started = Instant::now();
        assert!(sleep_unless_cancelled(Duration::from_millis(150), &token));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
