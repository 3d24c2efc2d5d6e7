// =============================================================================
// FitPulse Social Fitness Backend - Cross-Instance Bus
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Publish/subscribe fan-out between stateless server instances, backed by
//   Redis pub/sub. The bus carries room-scoped envelopes; it has no
//   room-membership knowledge of its own. Each instance filters incoming
//   envelopes against its locally joined sockets.
//
//   The bus is a two-state capability: Available (Redis reachable) or
//   Degraded (local-only delivery). Publishing never fails; a transport
//   outage downgrades the instance to single-instance mode and is logged
//   once per state transition.
//
// =============================================================================

use futures_util::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Room chat fan-out channel.
pub const CHAT_CHANNEL: &str = "chat:broadcast";
/// One-to-one chat fan-out channel.
pub const DIRECT_CHANNEL: &str = "direct:broadcast";
/// Challenge admission fan-out channel.
pub const ENTRY_CHANNEL: &str = "entry:broadcast";

const CHANNELS: [&str; 3] = [CHAT_CHANNEL, DIRECT_CHANNEL, ENTRY_CHANNEL];
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const LOCAL_QUEUE_DEPTH: usize = 256;

/// A room-scoped event as it travels between instances. `exclude` names the
/// originating connection so ephemeral events (typing) can skip their sender
/// on the instance that owns that socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub room: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Uuid>,
}

#[derive(Debug)]
struct Shared {
    available: AtomicBool,
    chat: broadcast::Sender<Envelope>,
    direct: broadcast::Sender<Envelope>,
    entry: broadcast::Sender<Envelope>,
}

impl Shared {
    fn new() -> Self {
        Self {
            available: AtomicBool::new(false),
            chat: broadcast::channel(LOCAL_QUEUE_DEPTH).0,
            direct: broadcast::channel(LOCAL_QUEUE_DEPTH).0,
            entry: broadcast::channel(LOCAL_QUEUE_DEPTH).0,
        }
    }

    fn sender(&self, channel: &str) -> &broadcast::Sender<Envelope> {
        match channel {
            DIRECT_CHANNEL => &self.direct,
            ENTRY_CHANNEL => &self.entry,
            _ => &self.chat,
        }
    }

    fn local_publish(&self, channel: &str, envelope: Envelope) {
        // send only errors when no subscriber exists, which is fine
        let _ = self.sender(channel).send(envelope);
    }

    fn note_available(&self) {
        if !self.available.swap(true, Ordering::SeqCst) {
            info!("cross-instance bus available");
        }
    }

    fn note_degraded(&self, reason: &str) {
        if self.available.swap(false, Ordering::SeqCst) {
            warn!(reason, "cross-instance bus degraded, falling back to local delivery");
        }
    }
}

pub struct Service {
    publisher: Option<ConnectionManager>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("bus::Service")
            .field("clustered", &self.publisher.is_some())
            .field("available", &self.is_available())
            .finish()
    }
}

impl Service {
    /// Connect the bus. Transport unavailability at startup is not an error:
    /// the instance runs in single-instance mode and every broadcast is
    /// delivered locally only.
    pub async fn new(redis_url: Option<&str>) -> Self {
        let shared = Arc::new(Shared::new());
        let Some(url) = redis_url else {
            info!("no redis configured, bus running in single-instance mode");
            return Self {
                publisher: None,
                shared,
            };
        };

        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "invalid redis url, bus running in single-instance mode");
                return Self {
                    publisher: None,
                    shared,
                };
            }
        };

        let publisher = match ConnectionManager::new(client.clone()).await {
            Ok(manager) => manager,
            Err(e) => {
                warn!(error = %e, "redis unreachable at startup, bus running in single-instance mode");
                return Self {
                    publisher: None,
                    shared,
                };
            }
        };

        shared.note_available();
        tokio::spawn(run_subscriber(client, Arc::clone(&shared)));
        Self {
            publisher: Some(publisher),
            shared,
        }
    }

    /// Local-only bus, used when clustering is not configured and by tests.
    pub fn local() -> Self {
        Self {
            publisher: None,
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::SeqCst)
    }

    /// Best-effort publish; never fails. When the transport is available the
    /// envelope travels through Redis and comes back through this instance's
    /// own subscription. Otherwise it is handed straight to local receivers.
    pub async fn publish(&self, channel: &str, envelope: Envelope) {
        if let Some(manager) = &self.publisher {
            if self.is_available() {
                let payload = match serde_json::to_string(&envelope) {
                    Ok(payload) => payload,
                    Err(e) => {
                        debug!(error = %e, "unserializable bus envelope dropped");
                        return;
                    }
                };
                let mut conn = manager.clone();
                match conn.publish::<_, _, i64>(channel, payload).await {
                    Ok(_) => return,
                    Err(e) => self.shared.note_degraded(&e.to_string()),
                }
            }
        }
        self.shared.local_publish(channel, envelope);
    }

    /// Receiver of every envelope this instance sees on `channel`, whether it
    /// arrived over Redis or through the local fallback path.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Envelope> {
        self.shared.sender(channel).subscribe()
    }
}

async fn run_subscriber(client: redis::Client, shared: Arc<Shared>) {
    loop {
        match pump_messages(&client, &shared).await {
            Ok(()) => shared.note_degraded("subscription stream ended"),
            Err(e) => shared.note_degraded(&e.to_string()),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn pump_messages(client: &redis::Client, shared: &Arc<Shared>) -> redis::RedisResult<()> {
    let mut pubsub = client.get_async_connection().await?.into_pubsub();
    for channel in CHANNELS {
        pubsub.subscribe(channel).await?;
    }
    shared.note_available();

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_owned();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(_) => continue,
        };
        match serde_json::from_str::<Envelope>(&payload) {
            Ok(envelope) => shared.local_publish(&channel, envelope),
            Err(e) => debug!(error = %e, channel, "discarding malformed bus envelope"),
        }
    }
    Ok(())
}
