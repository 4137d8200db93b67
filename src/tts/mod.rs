//! Text-to-speech synthesis
//!
//! Provides synthesis via:
//! - ElevenLabs HTTP API (the only provider today)

pub mod elevenlabs;

use crate::config::ProviderConfig;
use crate::error::SynthesisError;
use std::sync::Arc;

pub use elevenlabs::ElevenLabsSynthesizer;

/// Trait for speech synthesis providers
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Whether a credential is available; when false `synthesize` always
    /// fails with [`SynthesisError::NotConfigured`]
    fn is_configured(&self) -> bool;

    /// Voice used when a request does not name one
    fn default_voice_id(&self) -> &str;

    /// Model identifier sent with every request
    fn model(&self) -> &str;

    /// Synthesize `text` with `voice_id`, returning encoded audio (MP3)
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Factory function to create the configured synthesizer
pub fn create_synthesizer(config: &ProviderConfig) -> Arc<dyn SpeechSynthesizer> {
    if !config.has_api_key() {
        tracing::warn!("ELEVENLABS_API_KEY not configured, notifications will have no audio");
        tracing::warn!("Add ELEVENLABS_API_KEY=your_key_here to ~/.env");
    }
    Arc::new(ElevenLabsSynthesizer::new(config))
}
