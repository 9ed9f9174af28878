//! OpenSSH-backed [`RemoteSession`].

use async_trait::async_trait;
use gs_types::{Credentials, MachineUnreachable};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::session::{CommandOutput, OutputBuffer, RemoteSession};

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILED: i32 = 255;
/// sshpass: wrong password / unknown host key.
const SSHPASS_AUTH_FAILURES: [i32; 2] = [5, 6];
/// Trailer printed by the remote shell after the command, carrying its exit
/// status. ssh forwards the remote status as its own, so the trailer is the
/// only way to tell a workload exiting 255 from a failed connection.
const EXIT_MARKER: &str = "__gridsweep_exit=";

/// Connection settings for [`SshSession`].
#[derive(Clone, PartialEq)]
pub struct SshConfig {
    pub username: String,
    /// Fed to `sshpass` through the environment; `None` uses key auth.
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub port: Option<u16>,
    pub ssh_program: PathBuf,
    pub sshpass_program: PathBuf,
}

impl SshConfig {
    pub fn from_credentials(credentials: &Credentials, connect_timeout: Duration) -> Self {
        Self {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            connect_timeout,
            port: None,
            ssh_program: PathBuf::from("ssh"),
            sshpass_program: PathBuf::from("sshpass"),
        }
    }
}

impl std::fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("port", &self.port)
            .field("ssh_program", &self.ssh_program)
            .field("sshpass_program", &self.sshpass_program)
            .finish()
    }
}

/// Runs commands through the local `ssh` client.
#[derive(Debug, Clone)]
pub struct SshSession {
    config: SshConfig,
}

impl SshSession {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn command(&self, host: &str, remote_command: &str) -> Command {
        let mut cmd = match &self.config.password {
            Some(password) => {
                let mut cmd = Command::new(&self.config.sshpass_program);
                cmd.arg("-e")
                    .env("SSHPASS", password)
                    .arg(&self.config.ssh_program);
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.config.ssh_program);
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };

        cmd.arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout.as_secs().max(1)
            ))
            .args(["-o", "StrictHostKeyChecking=accept-new"]);
        if let Some(port) = self.config.port {
            cmd.arg("-p").arg(port.to_string());
        }
        cmd.arg(format!("{}@{}", self.config.username, host))
            .arg(with_exit_marker(remote_command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn is_connection_failure(&self, exit_code: Option<i32>) -> bool {
        match exit_code {
            Some(SSH_CONNECTION_FAILED) => true,
            Some(code) if self.config.password.is_some() => SSHPASS_AUTH_FAILURES.contains(&code),
            _ => false,
        }
    }
}

fn with_exit_marker(command: &str) -> String {
    format!("{command}; printf '\\n{EXIT_MARKER}%d\\n' \"$?\"")
}

/// Split the exit-status trailer off `stdout`. Returns the command's own
/// output and status, or `None` if the remote shell never printed it.
fn split_exit_marker(stdout: &str) -> Option<(&str, i32)> {
    let body = stdout.strip_suffix('\n').unwrap_or(stdout);
    let (before, last) = match body.rfind('\n') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => ("", body),
    };
    let code = last.strip_prefix(EXIT_MARKER)?.trim().parse().ok()?;
    Some((before, code))
}

/// Read `stdout` line by line, mirroring everything but the trailer into
/// `progress`.
async fn stream_stdout<R: AsyncRead + Unpin>(
    stdout: Option<R>,
    progress: &OutputBuffer,
) -> std::io::Result<String> {
    let mut collected = String::new();
    let Some(stdout) = stdout else {
        return Ok(collected);
    };
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        if !text.starts_with(EXIT_MARKER) {
            progress.push_str(&text);
        }
        collected.push_str(&text);
    }
    Ok(collected)
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// The remote side already merges the workload's stderr into stdout; what
/// is left on stderr comes from ssh itself.
fn combine(stdout: &str, stderr: &str) -> String {
    let mut combined = stdout.to_string();
    if !stderr.trim().is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(stderr);
    }
    combined
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(
        &self,
        host: &str,
        command: &str,
        progress: &OutputBuffer,
    ) -> Result<CommandOutput, MachineUnreachable> {
        debug!(host, user = %self.config.username, "opening ssh session");

        let mut child = self
            .command(host, command)
            .spawn()
            .map_err(|e| MachineUnreachable::new(host, format!("failed to launch ssh: {e}")))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr, status) = tokio::try_join!(
            stream_stdout(stdout, progress),
            read_all(stderr),
            child.wait(),
        )
        .map_err(|e| MachineUnreachable::new(host, format!("ssh session failed: {e}")))?;
        let transport_code = status.code();

        if let Some((output, exit_code)) = split_exit_marker(&stdout) {
            return Ok(CommandOutput::new(combine(output, &stderr), Some(exit_code)));
        }

        // No trailer: either contact was never made, or the session died
        // after the command had started producing output.
        if stdout.trim().is_empty() && self.is_connection_failure(transport_code) {
            let reason = stderr.trim();
            return Err(MachineUnreachable::new(
                host,
                if reason.is_empty() {
                    format!("ssh exited with status {transport_code:?}")
                } else {
                    reason.to_string()
                },
            ));
        }

        warn!(host, status = ?transport_code, "remote command ended without reporting its exit status");
        Ok(CommandOutput::new(combine(&stdout, &stderr), None))
    }
}
