//! Remote command execution abstraction.

use async_trait::async_trait;
use gs_types::MachineUnreachable;
use parking_lot::Mutex;
use std::sync::Arc;

/// What a finished remote command left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout/stderr of the command.
    pub output: String,
    /// `None` if the remote side never reported a status (killed by a
    /// signal, or the session dropped mid-run).
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            output: output.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Output received so far from a running command. Shared with the caller so
/// that whatever was printed survives a session that is dropped mid-run.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<String>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&self, chunk: &str) {
        self.inner.lock().push_str(chunk);
    }

    pub fn snapshot(&self) -> String {
        self.inner.lock().clone()
    }
}

/// Core remote-execution interface.
///
/// Implementations may shell out to an SSH client or fake the remote side
/// entirely in tests. Dropping the returned future must terminate the
/// remote command.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run `command` on `host` and wait for it to exit, appending output to
    /// `progress` as it arrives.
    ///
    /// A nonzero exit status is still `Ok`; `Err` means the host could not
    /// be reached and nothing ran.
    async fn run(
        &self,
        host: &str,
        command: &str,
        progress: &OutputBuffer,
    ) -> Result<CommandOutput, MachineUnreachable>;
}

#[async_trait]
impl<T: RemoteSession + ?Sized> RemoteSession for Arc<T> {
    async fn run(
        &self,
        host: &str,
        command: &str,
        progress: &OutputBuffer,
    ) -> Result<CommandOutput, MachineUnreachable> {
        (**self).run(host, command, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_buffer_is_shared_between_clones() {
        let buffer = OutputBuffer::new();
        let writer = buffer.clone();
        writer.push_str("Train Epoch: 1\n");
        writer.push_str("Train Epoch: 2\n");
        assert_eq!(buffer.snapshot(), "Train Epoch: 1\nTrain Epoch: 2\n");
    }

    #[test]
    fn test_success_requires_zero_status() {
        assert!(CommandOutput::new("", Some(0)).success());
        assert!(!CommandOutput::new("", Some(255)).success());
        assert!(!CommandOutput::new("", None).success());
    }
}
