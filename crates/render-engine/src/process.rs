//! Child process plumbing for the ffmpeg tools.

use std::io::{BufReader, Read};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use clipfx_common::{FxError, FxResult};

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A running ffmpeg-family process with its stderr drained on a side thread.
///
/// Dropping an unfinished process kills it.
#[derive(Debug)]
pub(crate) struct ToolProcess {
    label: &'static str,
    decodes: bool,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
}

impl ToolProcess {
    pub(crate) fn spawn(
        binary: &str,
        label: &'static str,
        args: &[String],
        pipe_stdin: bool,
        pipe_stdout: bool,
    ) -> FxResult<Self> {
        tracing::debug!(binary, label, ?args, "Spawning tool process");
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(if pipe_stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| FxError::resource(format!("Failed to start {binary} ({label}): {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FxError::resource(format!("Failed to capture {label} stderr")))?;

        // Drain stderr concurrently so the child never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read stderr: {err}>"),
            }
        });

        tracing::debug!(pid = child.id(), label, "Tool process started");
        Ok(Self {
            label,
            decodes: pipe_stdout,
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            child: Some(child),
            stderr_task: Some(stderr_task),
        })
    }

    pub(crate) fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn stdin(&mut self) -> FxResult<&mut ChildStdin> {
        self.stdin
            .as_mut()
            .ok_or_else(|| FxError::invalid_state(format!("{} stdin is closed", self.label)))
    }

    pub(crate) fn stdout(&mut self) -> FxResult<&mut ChildStdout> {
        self.stdout
            .as_mut()
            .ok_or_else(|| FxError::invalid_state(format!("{} stdout is not piped", self.label)))
    }

    /// Close stdin, wait for the process to exit and fail on a non-zero
    /// status with its stderr attached. Processes read from report a
    /// decode error, all others an encode error.
    pub(crate) fn finish(&mut self) -> FxResult<()> {
        self.stdin.take();
        self.stdout.take();
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .map_err(|e| FxError::resource(format!("Failed to wait on {}: {e}", self.label)))?;

        let stderr_output = self
            .stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default();

        if !status.success() {
            let message = format!(
                "{} failed (status {}): {}",
                self.label,
                status,
                stderr_output.trim()
            );
            return Err(if self.decodes {
                FxError::decode(message)
            } else {
                FxError::encode(message)
            });
        }
        if !stderr_output.trim().is_empty() {
            tracing::debug!(label = self.label, stderr = %stderr_output.trim(), "Tool stderr");
        }
        Ok(())
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                tracing::trace!(label = self.label, error = %err, "Kill on drop failed");
            }
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists_for_shell() {
        assert!(command_exists("sh"));
        assert!(!command_exists("clipfx-definitely-not-a-binary"));
    }

    #[test]
    fn test_missing_binary_is_resource_error() {
        let err = ToolProcess::spawn("clipfx-definitely-not-a-binary", "probe", &[], false, false)
            .unwrap_err();
        assert!(matches!(err, FxError::ResourceInit { .. }));
    }

    #[test]
    fn test_failing_process_reports_stderr() {
        let args = vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()];
        let mut process = ToolProcess::spawn("sh", "failing", &args, false, false).unwrap();
        let err = process.finish().unwrap_err().to_string();
        assert!(err.contains("failing"));
        assert!(err.contains("broken"));
    }

    #[test]
    fn test_stdin_round_trip_through_cat() {
        use std::io::Write;

        let mut process = ToolProcess::spawn("cat", "cat", &[], true, true).unwrap();
        process.stdin().unwrap().write_all(b"frame").unwrap();
        process.stdin.take();
        let mut out = String::new();
        process.stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "frame");
        process.finish().unwrap();
    }
}
