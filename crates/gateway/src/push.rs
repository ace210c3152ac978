use {
    async_trait::async_trait,
    charla_transport::{SessionEvent, SessionEventSink},
    tokio::sync::broadcast,
    tracing::warn,
};

const EVENT_CAPACITY: usize = 256;

/// Fans session events out to every connected WebSocket client as JSON.
///
/// Slow or absent consumers never block the engine: the broadcast channel
/// drops the oldest frames for laggards and a send with no receivers is
/// a no-op.
pub struct BroadcastEventSink {
    events: broadcast::Sender<String>,
}

impl BroadcastEventSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionEventSink for BroadcastEventSink {
    async fn emit(&self, event: SessionEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize session event");
                return;
            },
        };
        let _ = self.events.send(json);
    }
}
