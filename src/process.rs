//! External program invocation with ordered fallback
//!
//! Local playback and desktop notifications both work by trying a list of
//! programs until one succeeds. The actual spawning goes through
//! [`CommandRunner`] so the chains can be exercised without real binaries.

use crate::error::CommandError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// One candidate program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The same arguments tried at an absolute path first, then via PATH
    pub fn with_absolute_first(dir: &str, program: &str, args: &[String]) -> [Self; 2] {
        [
            Self::new(format!("{}/{}", dir.trim_end_matches('/'), program), args.to_vec()),
            Self::new(program, args.to_vec()),
        ]
    }
}

/// Capability to run an external program to completion
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation, succeeding only on a zero exit status
    async fn run(&self, invocation: &Invocation, limit: Duration) -> Result<(), CommandError>;
}

/// Runs programs with tokio's process support
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation, limit: Duration) -> Result<(), CommandError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::SpawnFailed {
                program: invocation.program.clone(),
                source,
            })?;

        // On timeout the child is dropped and killed
        let status = timeout(limit, child.wait())
            .await
            .map_err(|_| CommandError::Timeout {
                program: invocation.program.clone(),
                timeout: limit,
            })?
            .map_err(|source| CommandError::SpawnFailed {
                program: invocation.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::NonZeroExit {
                program: invocation.program.clone(),
                code: status.code(),
            })
        }
    }
}

/// Try each candidate in order until one succeeds.
///
/// Returns the index of the successful candidate, or the error of the last
/// attempt when every candidate failed.
pub async fn run_first_success(
    runner: &dyn CommandRunner,
    candidates: &[Invocation],
    limit: Duration,
) -> Result<usize, CommandError> {
    let mut last = CommandError::NoCandidates;

    for (index, candidate) in candidates.iter().enumerate() {
        match runner.run(candidate, limit).await {
            Ok(()) => {
                tracing::debug!("{} succeeded", candidate.program);
                return Ok(index);
            }
            Err(e) => {
                tracing::debug!("{}, trying next", e);
                last = e;
            }
        }
    }

    Err(last)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeRunner;
    use super::*;

    fn chain() -> Vec<Invocation> {
        vec![
            Invocation::new("/usr/bin/first", ["-q"]),
            Invocation::new("first", ["-q"]),
            Invocation::new("second", Vec::<String>::new()),
        ]
    }

    #[test]
    fn test_absolute_first_pair() {
        let args = vec!["-q".to_string(), "file.mp3".to_string()];
        let [abs, bare] = Invocation::with_absolute_first("/usr/bin/", "mpg123", &args);
        assert_eq!(abs.program, "/usr/bin/mpg123");
        assert_eq!(bare.program, "mpg123");
        assert_eq!(abs.args, args);
        assert_eq!(bare.args, args);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let runner = FakeRunner::with(&[("first", 0), ("second", 0)]);
        let index = run_first_success(&runner, &chain(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(index, 1);
        assert_eq!(runner.programs(), vec!["/usr/bin/first", "first"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_advances() {
        let runner = FakeRunner::with(&[("/usr/bin/first", 1), ("first", 2), ("second", 0)]);
        let index = run_first_success(&runner, &chain(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(index, 2);
        assert_eq!(runner.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let runner = FakeRunner::with(&[("second", 3)]);
        let err = run_first_success(&runner, &chain(), Duration::from_secs(1))
            .await
            .unwrap_err();

        match err {
            CommandError::NonZeroExit { program, code } => {
                assert_eq!(program, "second");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let runner = FakeRunner::default();
        let err = run_first_success(&runner, &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NoCandidates));
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let invocation = Invocation::new("/nonexistent/paivoice-test-binary", ["x"]);
        let err = SystemRunner
            .run(&invocation, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_exit_status() {
        let ok = Invocation::new("sh", ["-c", "exit 0"]);
        assert!(SystemRunner.run(&ok, Duration::from_secs(5)).await.is_ok());

        let fail = Invocation::new("sh", ["-c", "exit 7"]);
        let err = SystemRunner.run(&fail, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { code: Some(7), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout() {
        let slow = Invocation::new("sh", ["-c", "sleep 5"]);
        let err = SystemRunner
            .run(&slow, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}
