//! Error types for paivoice
//!
//! Uses thiserror for ergonomic error definitions. Only validation errors
//! ever reach an HTTP caller; every other kind is contained by the component
//! that owns it and downgraded to reduced functionality.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for startup and serving paths
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections of untrusted text fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message too long (max {max} characters)")]
    TooLong { max: usize },

    #[error("Invalid input type")]
    InvalidType,

    #[error("Invalid characters in input")]
    InvalidCharacters,

    #[error("Input is empty after sanitization")]
    Empty,
}

/// Errors from the text-to-speech provider
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("ElevenLabs API key not configured.\n  Set ELEVENLABS_API_KEY in ~/.env or the environment.")]
    NotConfigured,

    #[error("ElevenLabs API error: Invalid model \"{model}\". Update ELEVENLABS_MODEL in ~/.env (or [provider] model in config.toml). See https://elevenlabs.io/docs/models")]
    InvalidModel { model: String },

    #[error("ElevenLabs API error: {status} - {body}")]
    Provider { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),
}

/// Failure of a single external program invocation
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code:?}")]
    NonZeroExit { program: String, code: Option<i32> },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("no candidate programs configured")]
    NoCandidates,
}

/// Errors from local audio playback
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to write temporary audio file: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("No audio player found. Install mpg123 or ffmpeg ({last})")]
    NoPlayerAvailable { last: CommandError },
}

/// Errors from the desktop notification facility
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Desktop notifications unavailable: {0}")]
    Unavailable(CommandError),
}

/// Errors a dispatch can surface to its caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid {field}: {source}")]
    Invalid {
        field: &'static str,
        #[source]
        source: ValidationError,
    },
}

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
