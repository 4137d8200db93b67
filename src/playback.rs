//! Local audio playback through external players
//!
//! Fallback chain:
//! 1. afplay (macOS only)
//! 2. mpg123 - small, plays MP3 directly
//! 3. ffplay - from ffmpeg, for systems without mpg123
//!
//! Each player is tried at its usual absolute path first, then via PATH.

use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::process::{run_first_success, CommandRunner, Invocation, SystemRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Plays synthesized audio on the local machine
pub struct LocalAudioPlayer {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl LocalAudioPlayer {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self::with_runner(Arc::new(SystemRunner), Duration::from_secs(config.timeout_secs))
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Player invocations for `file`, in priority order
    pub fn candidates(file: &Path) -> Vec<Invocation> {
        let file = file.to_string_lossy().to_string();
        let mut chain = Vec::new();

        if cfg!(target_os = "macos") {
            chain.extend(Invocation::with_absolute_first(
                "/usr/bin",
                "afplay",
                &[file.clone()],
            ));
        }

        chain.extend(Invocation::with_absolute_first(
            "/usr/bin",
            "mpg123",
            &["-q".to_string(), file.clone()],
        ));

        let ffplay_args: Vec<String> = ["-nodisp", "-autoexit", "-v", "quiet"]
            .into_iter()
            .map(String::from)
            .chain(std::iter::once(file))
            .collect();
        chain.extend(Invocation::with_absolute_first("/usr/bin", "ffplay", &ffplay_args));

        chain
    }

    /// Play MP3 audio, removing the temporary file whatever the outcome
    pub async fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        let temp_file = tempfile::Builder::new()
            .prefix("voice-")
            .suffix(".mp3")
            .tempfile()?;

        // Dropping temp_file on an early return removes it too
        tokio::fs::write(temp_file.path(), audio).await?;

        let candidates = Self::candidates(temp_file.path());
        let result = run_first_success(self.runner.as_ref(), &candidates, self.timeout).await;

        let path = temp_file.path().to_path_buf();
        if let Err(e) = temp_file.close() {
            tracing::warn!("Failed to remove temporary audio file {:?}: {}", path, e);
        }

        match result {
            Ok(index) => {
                tracing::debug!("Played audio via {}", candidates[index].program);
                Ok(())
            }
            Err(last) => Err(PlaybackError::NoPlayerAvailable { last }),
        }
    }
}
