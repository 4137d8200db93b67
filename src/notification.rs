//! Platform-specific desktop notifications
//!
//! Provides a unified interface for sending desktop notifications on
//! different platforms:
//! - Linux: Uses notify-send (libnotify)
//! - macOS: Uses terminal-notifier, falling back to osascript (AppleScript)
//!
//! Notifications are best-effort. Headless machines, containers and WSL
//! usually have no notification daemon, and that is not an error.

use crate::config::NotifierConfig;
use crate::error::NotifierError;
use crate::process::{run_first_success, CommandRunner, Invocation, SystemRunner};
use std::sync::Arc;
use std::time::Duration;

/// Display hint passed to notify-send, in milliseconds
const EXPIRE_MS: &str = "5000";

/// Best-effort desktop notifier
pub struct DesktopNotifier {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            runner: Arc::new(SystemRunner),
            timeout: Duration::from_secs(config.timeout_secs),
            enabled: config.enabled,
        }
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            enabled: true,
        }
    }

    /// Candidate invocations for this platform, in priority order
    pub fn candidates(title: &str, body: &str) -> Vec<Invocation> {
        if cfg!(target_os = "macos") {
            macos_candidates(title, body)
        } else {
            linux_candidates(title, body)
        }
    }

    /// Send a notification, logging but never returning failures
    pub async fn notify(&self, title: &str, body: &str) {
        if let Err(e) = self.try_notify(title, body).await {
            tracing::debug!("{}", e);
        }
    }

    /// Send a notification and report whether any candidate succeeded
    pub async fn try_notify(&self, title: &str, body: &str) -> Result<(), NotifierError> {
        if !self.enabled {
            return Ok(());
        }

        let candidates = Self::candidates(title, body);
        run_first_success(self.runner.as_ref(), &candidates, self.timeout)
            .await
            .map(|index| tracing::debug!("Desktop notification via {}", candidates[index].program))
            .map_err(NotifierError::Unavailable)
    }
}

fn linux_candidates(title: &str, body: &str) -> Vec<Invocation> {
    let args: Vec<String> = ["-u", "normal", "-t", EXPIRE_MS, title, body]
        .into_iter()
        .map(String::from)
        .collect();
    Invocation::with_absolute_first("/usr/bin", "notify-send", &args).into()
}

fn macos_candidates(title: &str, body: &str) -> Vec<Invocation> {
    // terminal-notifier supports grouping so repeated notifications replace each other
    let notifier_args: Vec<String> = ["-title", title, "-message", body, "-group", "paivoice"]
        .into_iter()
        .map(String::from)
        .collect();

    let escaped_title = title.replace('"', "\\\"");
    let escaped_body = body.replace('"', "\\\"");
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        escaped_body, escaped_title
    );

    let mut chain = vec![Invocation::new("terminal-notifier", notifier_args)];
    chain.extend(Invocation::with_absolute_first(
        "/usr/bin",
        "osascript",
        &["-e".to_string(), script],
    ));
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeRunner;

    #[test]
    fn test_linux_candidates() {
        let chain = linux_candidates("Build", "Done");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].program, "/usr/bin/notify-send");
        assert_eq!(chain[1].program, "notify-send");
        assert_eq!(chain[0].args, vec!["-u", "normal", "-t", "5000", "Build", "Done"]);
    }

    #[test]
    fn test_macos_candidates_quote_escaping() {
        let chain = macos_candidates(r#"Test "title""#, "body");
        assert_eq!(chain[0].program, "terminal-notifier");
        assert_eq!(chain[1].program, "/usr/bin/osascript");
        assert_eq!(
            chain[2].args[1],
            r#"display notification "body" with title "Test \"title\"""#
        );
    }

    #[tokio::test]
    async fn test_all_candidates_missing_is_unavailable() {
        let runner = Arc::new(FakeRunner::default());
        let notifier = DesktopNotifier::with_runner(runner.clone(), Duration::from_secs(1));

        let err = notifier.try_notify("t", "m").await.unwrap_err();
        assert!(matches!(err, NotifierError::Unavailable(_)));
        assert_eq!(runner.calls.lock().unwrap().len(), DesktopNotifier::candidates("t", "m").len());

        // notify swallows the same failure
        notifier.notify("t", "m").await;
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let first = DesktopNotifier::candidates("t", "m")[0].program.clone();
        let runner = Arc::new(FakeRunner::with(&[(first.as_str(), 0)]));
        let notifier = DesktopNotifier::with_runner(runner.clone(), Duration::from_secs(1));

        notifier.try_notify("t", "m").await.unwrap();
        assert_eq!(runner.programs(), vec![first]);
    }

    #[tokio::test]
    async fn test_disabled_notifier_runs_nothing() {
        let runner = Arc::new(FakeRunner::default());
        let mut notifier = DesktopNotifier::with_runner(runner.clone(), Duration::from_secs(1));
        notifier.enabled = false;

        notifier.try_notify("t", "m").await.unwrap();
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
