//! ElevenLabs text-to-speech client
//!
//! `POST {base_url}/v1/text-to-speech/{voice_id}` with a JSON body naming the
//! model and voice settings; the response body is MP3 audio.

use super::SpeechSynthesizer;
use crate::config::ProviderConfig;
use crate::error::SynthesisError;
use std::io::Read;
use std::time::Duration;

/// Upper bound on accepted audio, far above any 500-character utterance
const MAX_AUDIO_BYTES: u64 = 20 * 1024 * 1024;

const STABILITY: f32 = 0.5;
const SIMILARITY_BOOST: f32 = 0.5;

/// ElevenLabs synthesizer
#[derive(Clone)]
pub struct ElevenLabsSynthesizer {
    /// API origin (e.g., "https://api.elevenlabs.io")
    base_url: String,
    api_key: Option<String>,
    voice_id: String,
    model: String,
    /// Request timeout
    timeout: Duration,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &ProviderConfig) -> Self {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToOwned::to_owned);

        tracing::info!(
            "Configured ElevenLabs synthesizer: model={}, voice={}, timeout={}s",
            config.model,
            config.voice_id,
            config.timeout_secs
        );

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            voice_id: config.voice_id.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url,
            encode_path_segment(voice_id)
        )
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "text": text,
            "model_id": self.model,
            "voice_settings": {
                "stability": STABILITY,
                "similarity_boost": SIMILARITY_BOOST,
            },
        })
    }

    /// Blocking request; run from `spawn_blocking`
    fn synthesize_blocking(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        let api_key = self.api_key.as_deref().ok_or(SynthesisError::NotConfigured)?;
        let start = std::time::Instant::now();

        let response = ureq::post(&self.endpoint(voice_id))
            .timeout(self.timeout)
            .set("Accept", "audio/mpeg")
            .set("xi-api-key", api_key)
            .send_json(self.request_body(text))
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => {
                    let body = resp.into_string().unwrap_or_default();
                    classify_provider_error(code, body, &self.model)
                }
                ureq::Error::Transport(t) => {
                    SynthesisError::Network(format!("Request failed: {}", t))
                }
            })?;

        let audio = read_capped(response.into_reader(), MAX_AUDIO_BYTES)?;

        tracing::debug!(
            "Synthesized {} chars into {} bytes in {:.2}s",
            text.chars().count(),
            audio.len(),
            start.elapsed().as_secs_f32()
        );

        Ok(audio)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn default_voice_id(&self) -> &str {
        &self.voice_id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        if !self.is_configured() {
            return Err(SynthesisError::NotConfigured);
        }

        let client = self.clone();
        let text = text.to_string();
        let voice_id = voice_id.to_string();

        tokio::task::spawn_blocking(move || client.synthesize_blocking(&text, &voice_id))
            .await
            .map_err(|e| SynthesisError::Network(format!("Synthesis task failed: {}", e)))?
    }
}

/// Map a non-success provider response to a domain error.
///
/// Unprocessable-entity responses and any error mentioning the model point
/// at a bad model id rather than a transient failure.
pub fn classify_provider_error(status: u16, body: String, model: &str) -> SynthesisError {
    if status == 422 || body.to_lowercase().contains("model") {
        SynthesisError::InvalidModel {
            model: model.to_string(),
        }
    } else {
        SynthesisError::Provider { status, body }
    }
}

/// Read a response body, failing instead of truncating when it exceeds `limit`
fn read_capped(reader: impl Read, limit: u64) -> Result<Vec<u8>, SynthesisError> {
    let mut audio = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut audio)
        .map_err(|e| SynthesisError::Network(format!("Failed to read audio: {}", e)))?;

    if audio.len() as u64 > limit {
        return Err(SynthesisError::Network(format!(
            "Audio response exceeds {} bytes",
            limit
        )));
    }
    Ok(audio)
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Captured {
        voice_id: Option<String>,
        api_key: Option<String>,
        body: Option<serde_json::Value>,
    }

    #[derive(Clone)]
    struct MockProvider {
        status: StatusCode,
        body: &'static [u8],
        captured: Arc<Mutex<Captured>>,
    }

    async fn mock_tts(
        State(mock): State<MockProvider>,
        Path(voice_id): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, Vec<u8>) {
        let mut captured = mock.captured.lock().unwrap();
        captured.voice_id = Some(voice_id);
        captured.api_key = headers
            .get("xi-api-key")
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        captured.body = serde_json::from_slice(&body).ok();
        (mock.status, mock.body.to_vec())
    }

    async fn spawn_mock_provider(
        status: StatusCode,
        body: &'static [u8],
    ) -> (String, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let app = Router::new()
            .route("/v1/text-to-speech/:voice_id", post(mock_tts))
            .with_state(MockProvider {
                status,
                body,
                captured: captured.clone(),
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), captured)
    }

    fn config(base_url: &str, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: api_key.map(ToOwned::to_owned),
            base_url: base_url.to_string(),
            model: "eleven_multilingual_v2".to_string(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_read_capped_accepts_body_at_limit() {
        let audio = read_capped(std::io::Cursor::new(vec![7u8; 16]), 16).unwrap();
        assert_eq!(audio.len(), 16);
    }

    #[test]
    fn test_read_capped_rejects_oversized_body() {
        let err = read_capped(std::io::Cursor::new(vec![7u8; 17]), 16).unwrap_err();
        assert!(matches!(err, SynthesisError::Network(ref msg) if msg.contains("exceeds 16 bytes")));
    }

    #[test]
    fn test_classify_422_is_invalid_model() {
        let err = classify_provider_error(422, "{}".to_string(), "bogus_model");
        assert!(matches!(err, SynthesisError::InvalidModel { ref model } if model == "bogus_model"));
        assert!(err.to_string().contains("ELEVENLABS_MODEL"));
    }

    #[test]
    fn test_classify_model_mention_is_invalid_model() {
        let err = classify_provider_error(
            400,
            r#"{"detail":{"status":"model_not_found"}}"#.to_string(),
            "old_model",
        );
        assert!(matches!(err, SynthesisError::InvalidModel { .. }));
    }

    #[test]
    fn test_classify_other_is_provider_error() {
        let err = classify_provider_error(401, "invalid api key".to_string(), "m");
        match err {
            SynthesisError::Provider { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let synth = ElevenLabsSynthesizer::new(&config("http://localhost", Some("k")));
        let body = synth.request_body("Hello there");
        assert_eq!(body["text"], "Hello there");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
        assert_eq!(body["voice_settings"]["stability"], 0.5);
        assert_eq!(body["voice_settings"]["similarity_boost"], 0.5);
    }

    #[test]
    fn test_endpoint_encodes_voice_id() {
        let synth = ElevenLabsSynthesizer::new(&config("http://localhost:1/", Some("k")));
        assert_eq!(
            synth.endpoint("abc123"),
            "http://localhost:1/v1/text-to-speech/abc123"
        );
        assert_eq!(
            synth.endpoint("a/b?c"),
            "http://localhost:1/v1/text-to-speech/a%2Fb%3Fc"
        );
    }

    #[test]
    fn test_blank_api_key_is_unconfigured() {
        let synth = ElevenLabsSynthesizer::new(&config("http://localhost", Some("  ")));
        assert!(!synth.is_configured());
    }

    #[tokio::test]
    async fn test_not_configured_skips_request() {
        let synth = ElevenLabsSynthesizer::new(&config("http://127.0.0.1:9", None));
        let err = synth.synthesize("hi", "voice").await.unwrap_err();
        assert!(matches!(err, SynthesisError::NotConfigured));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_success_returns_audio_bytes() {
        let (base_url, captured) = spawn_mock_provider(StatusCode::OK, b"ID3fake-mp3").await;
        let synth = ElevenLabsSynthesizer::new(&config(&base_url, Some("sk-test")));

        let audio = synth.synthesize("Build done", "voice-1").await.unwrap();
        assert_eq!(audio, b"ID3fake-mp3");

        let captured = captured.lock().unwrap();
        assert_eq!(captured.voice_id.as_deref(), Some("voice-1"));
        assert_eq!(captured.api_key.as_deref(), Some("sk-test"));
        let body = captured.body.as_ref().unwrap();
        assert_eq!(body["text"], "Build done");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unprocessable_entity_maps_to_invalid_model() {
        let (base_url, _) =
            spawn_mock_provider(StatusCode::UNPROCESSABLE_ENTITY, b"{\"detail\":\"bad\"}").await;
        let synth = ElevenLabsSynthesizer::new(&config(&base_url, Some("sk-test")));

        let err = synth.synthesize("hello", "v").await.unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidModel { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_server_error_maps_to_provider_error() {
        let (base_url, _) =
            spawn_mock_provider(StatusCode::SERVICE_UNAVAILABLE, b"overloaded").await;
        let synth = ElevenLabsSynthesizer::new(&config(&base_url, Some("sk-test")));

        let err = synth.synthesize("hello", "v").await.unwrap_err();
        match err {
            SynthesisError::Provider { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreachable_provider_is_network_error() {
        // Bind and drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let synth = ElevenLabsSynthesizer::new(&config(
            &format!("http://127.0.0.1:{}", port),
            Some("sk-test"),
        ));

        let err = synth.synthesize("hello", "v").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Network(_)));
    }
}
