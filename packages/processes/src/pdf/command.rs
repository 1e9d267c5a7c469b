//! Running external tools with a deadline.

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use yao_process::Exception;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("{tool} is not available")]
    Unavailable { tool: String },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("cannot run {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    pub fn status(&self) -> u16 {
        match self {
            CommandError::Unavailable { .. } => 501,
            _ => 500,
        }
    }
}

impl From<CommandError> for Exception {
    fn from(err: CommandError) -> Self {
        Exception::new(err.status(), err.to_string())
    }
}

/// Resolve `tool` on `PATH` (or check it when it is a path). Never runs it.
pub fn resolve(tool: &Path) -> Option<PathBuf> {
    which::which(tool).ok()
}

pub fn available(tool: &Path) -> bool {
    resolve(tool).is_some()
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf);
        }
        buf
    })
}

/// Run `tool` with `args`, killing it once `timeout` elapses.
pub fn run<I, S>(tool: &Path, args: I, timeout: Duration) -> Result<Output, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = tool.display().to_string();
    let program = resolve(tool).ok_or_else(|| CommandError::Unavailable { tool: name.clone() })?;

    let mut command = Command::new(&program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    tracing::debug!(command = ?command, "run");

    let io = |source| CommandError::Io {
        tool: name.clone(),
        source,
    };
    let mut child = command.spawn().map_err(io)?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait().map_err(io)? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(tool = %name, ?timeout, "killed after timeout");
            return Err(CommandError::Timeout {
                tool: name,
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = Output {
        stdout: String::from_utf8_lossy(&stdout.join().unwrap_or_default()).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.join().unwrap_or_default()).into_owned(),
    };
    if !status.success() {
        return Err(CommandError::Failed {
            tool: name,
            status: status.to_string(),
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_unavailable() {
        let err = run(Path::new("yao-no-such-tool"), ["x"], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CommandError::Unavailable { .. }));
        assert_eq!(Exception::from(err).code, 501);
        assert!(!available(Path::new("yao-no-such-tool")));
    }

    #[cfg(unix)]
    #[test]
    fn output_and_failures() {
        let out = run(Path::new("sh"), ["-c", "echo hello"], Duration::from_secs(5)).unwrap();
        assert_eq!(out.stdout.trim(), "hello");

        let err = run(Path::new("sh"), ["-c", "echo bad >&2; exit 3"], Duration::from_secs(5))
            .unwrap_err();
        match err {
            CommandError::Failed { stderr, .. } => assert_eq!(stderr, "bad"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_tool_is_killed() {
        let started = Instant::now();
        let err = run(Path::new("sh"), ["-c", "sleep 5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
