//! Notification dispatch
//!
//! One dispatch validates the request, sanitizes it, optionally synthesizes
//! speech, broadcasts the event to realtime clients, shows a desktop
//! notification and optionally plays the audio locally. Only validation
//! failures are reported to the caller; every downstream failure reduces
//! what gets delivered instead.

use crate::broadcast::{now_millis, NotificationEvent, RealtimeBroadcaster};
use crate::error::{DispatchError, ValidationError};
use crate::notification::DesktopNotifier;
use crate::playback::LocalAudioPlayer;
use crate::tts::SpeechSynthesizer;
use crate::validate::{sanitize_for_display, validate};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

/// A notification to deliver, after defaults have been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub message: String,
    pub voice_enabled: bool,
    /// Voice override; the synthesizer's default when `None`
    pub voice_id: Option<String>,
}

/// What a successful dispatch delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Realtime clients that received the event
    pub delivered: usize,
    /// Whether audio was synthesized
    pub audio: bool,
}

/// Coordinates the components of a single notification
pub struct NotificationDispatcher {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    broadcaster: Arc<RealtimeBroadcaster>,
    notifier: Arc<DesktopNotifier>,
    player: Option<Arc<LocalAudioPlayer>>,
}

impl NotificationDispatcher {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        broadcaster: Arc<RealtimeBroadcaster>,
        notifier: Arc<DesktopNotifier>,
        player: Option<Arc<LocalAudioPlayer>>,
    ) -> Self {
        Self {
            synthesizer,
            broadcaster,
            notifier,
            player,
        }
    }

    pub fn synthesizer(&self) -> &dyn SpeechSynthesizer {
        self.synthesizer.as_ref()
    }

    pub fn broadcaster(&self) -> &Arc<RealtimeBroadcaster> {
        &self.broadcaster
    }

    pub async fn dispatch(
        &self,
        request: NotificationRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let title = checked_field("title", &request.title)?;
        let message = checked_field("message", &request.message)?;

        let voice_id = request
            .voice_id
            .as_deref()
            .unwrap_or_else(|| self.synthesizer.default_voice_id())
            .to_string();

        let audio = if request.voice_enabled && self.synthesizer.is_configured() {
            match self.synthesizer.synthesize(&message, &voice_id).await {
                Ok(audio) => Some(audio),
                Err(e) => {
                    tracing::warn!("Speech synthesis failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let event = NotificationEvent::Notification {
            title: title.clone(),
            message: message.clone(),
            voice_enabled: request.voice_enabled,
            voice_id,
            audio: audio.as_deref().map(|bytes| STANDARD.encode(bytes)),
            timestamp: now_millis(),
        };
        let delivered = self.broadcaster.broadcast(&event);
        tracing::info!(
            "Notification \"{}\" delivered to {} client(s), audio: {}",
            title,
            delivered,
            audio.is_some()
        );

        self.notifier.notify(&title, &message).await;

        let has_audio = audio.is_some();
        if let (Some(player), Some(audio)) = (self.player.clone(), audio) {
            tokio::spawn(async move {
                if let Err(e) = player.play(&audio).await {
                    tracing::warn!("Local playback failed: {}", e);
                }
            });
        }

        Ok(DispatchOutcome {
            delivered,
            audio: has_audio,
        })
    }
}

/// Validate then sanitize one field, rejecting text that sanitizes to nothing
fn checked_field(field: &'static str, raw: &str) -> Result<String, DispatchError> {
    let invalid = |source| DispatchError::Invalid { field, source };

    validate(raw).map_err(invalid)?;
    let clean = sanitize_for_display(raw);
    if clean.is_empty() {
        return Err(invalid(ValidationError::Empty));
    }
    Ok(clean)
}
