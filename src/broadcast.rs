//! Fan-out of notification events to connected realtime clients
//!
//! The broadcaster owns the live client set. Every broadcast serializes the
//! event once, sends to a snapshot of the set taken under the lock, and then
//! prunes the clients whose send failed. Delivery is best-effort with no
//! retry or acknowledgement. Each connection gets a bounded queue, and a
//! client that lets it fill up is treated as gone.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Identifier assigned to a client on registration
pub type ClientId = u64;

/// Sent to a newly registered client
pub const WELCOME_MESSAGE: &str = "Connected to PAI Voice Server";

/// Events buffered per connection before the client is dropped
pub const CLIENT_QUEUE_CAPACITY: usize = 32;

/// Events pushed to realtime clients
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Welcome {
        message: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    Notification {
        title: String,
        message: String,
        voice_enabled: bool,
        voice_id: String,
        /// Base64-encoded MP3, `null` when no audio was synthesized
        audio: Option<String>,
        timestamp: i64,
    },
}

impl NotificationEvent {
    pub fn welcome() -> Self {
        Self::Welcome {
            message: WELCOME_MESSAGE.to_string(),
            timestamp: now_millis(),
        }
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Send failure for a single client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientGone;

/// A connected endpoint that accepts serialized events
pub trait RealtimeClient: Send + Sync {
    fn send(&self, payload: Arc<str>) -> Result<(), ClientGone>;
}

/// Production client: forwards payloads to the connection's writer task
/// over a bounded channel. A full queue counts as a dead client.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelClient {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }
}

impl RealtimeClient for ChannelClient {
    fn send(&self, payload: Arc<str>) -> Result<(), ClientGone> {
        self.tx.try_send(payload).map_err(|_| ClientGone)
    }
}

/// Owner of the live realtime client set
#[derive(Default)]
pub struct RealtimeBroadcaster {
    next_id: AtomicU64,
    clients: Mutex<HashMap<ClientId, Arc<dyn RealtimeClient>>>,
}

impl RealtimeBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, Arc<dyn RealtimeClient>>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Greet a client with a welcome event and add it to the set.
    ///
    /// The welcome is sent under the lock, so no broadcast can reach the
    /// client ahead of it.
    pub fn register(&self, client: Arc<dyn RealtimeClient>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let welcome = serialize(&NotificationEvent::welcome());

        let total = {
            let mut clients = self.lock();
            if let Some(payload) = welcome {
                if client.send(payload).is_err() {
                    drop(clients);
                    tracing::debug!("Client {} went away before welcome", id);
                    return id;
                }
            }
            clients.insert(id, client);
            clients.len()
        };

        tracing::info!("Realtime client {} connected ({} total)", id, total);
        id
    }

    /// Remove a client; unknown ids are ignored
    pub fn unregister(&self, id: ClientId) {
        if self.lock().remove(&id).is_some() {
            tracing::info!(
                "Realtime client {} disconnected ({} remaining)",
                id,
                self.client_count()
            );
        }
    }

    /// Deliver an event to every live client, returning how many received it
    pub fn broadcast(&self, event: &NotificationEvent) -> usize {
        let Some(payload) = serialize(event) else {
            return 0;
        };

        let snapshot: Vec<(ClientId, Arc<dyn RealtimeClient>)> = self
            .lock()
            .iter()
            .map(|(id, client)| (*id, client.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, client) in snapshot {
            match client.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(ClientGone) => failed.push(id),
            }
        }

        if !failed.is_empty() {
            tracing::warn!("Dropping {} unreachable realtime client(s)", failed.len());
            let mut clients = self.lock();
            for id in failed {
                clients.remove(&id);
            }
        }

        delivered
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }
}

fn serialize(event: &NotificationEvent) -> Option<Arc<str>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::error!("Failed to serialize event: {}", e);
            None
        }
    }
}
