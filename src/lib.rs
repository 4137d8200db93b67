//! paivoice: local notification relay
//!
//! This library provides the core functionality for:
//! - Accepting notifications over HTTP with validation and per-origin rate limiting
//! - Synthesizing speech through the ElevenLabs API
//! - Broadcasting events to WebSocket clients
//! - Showing desktop notifications via notify-send/osascript fallback chain
//! - Optionally playing audio locally via mpg123/ffplay fallback chain
//!
//! # Architecture
//!
//! ```text
//!        POST /notify, /pai                      GET /ws
//!                │                                  │
//!                ▼                                  ▼
//!       ┌─────────────────┐               ┌─────────────────┐
//!       │  Rate Limiter   │               │  Writer task    │
//!       │  (per origin)   │               │  per client     │
//!       └─────────────────┘               └─────────────────┘
//!                │                                  ▲
//!                ▼                                  │ serialized event
//!       ┌─────────────────────────────┐   ┌─────────────────┐
//!       │         Dispatcher          │──▶│   Broadcaster   │
//!       │ validate ─▶ sanitize ─▶ TTS │   │ (snapshot+prune)│
//!       └─────────────────────────────┘   └─────────────────┘
//!                │              │
//!                ▼              ▼
//!       ┌──────────────┐ ┌──────────────┐
//!       │   Notifier   │ │    Player    │ (optional)
//!       │ notify-send  │ │mpg123/ffplay │
//!       └──────────────┘ └──────────────┘
//! ```

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notification;
pub mod playback;
pub mod process;
pub mod rate_limit;
pub mod service;
pub mod tts;
pub mod validate;

pub use config::Config;
pub use dispatch::{DispatchOutcome, NotificationDispatcher, NotificationRequest};
pub use error::{RelayError, Result};
pub use service::ServiceHandle;
