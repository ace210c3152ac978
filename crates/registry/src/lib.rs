//! Session registry and transport event router.
//!
//! Owns the set of active tenant sessions (at most one per tenant), routes
//! each session's transport events into the aggregation window and dispatch
//! pipeline, and guarantees that all derived state — aggregation buffers,
//! pending QR values, the connection handle — is torn down on disconnect.

pub mod registry;
mod router;

use std::{sync::Arc, time::Duration};

use {
    charla_aggregator::{AggregationWindow, Dispatcher},
    charla_dispatch::{AnswerBackend, DispatchPipeline, OutboundLookup},
    charla_store::SessionStore,
    charla_transport::{SessionEventSink, TransportFactory},
};

pub use registry::{CreateOutcome, SessionRegistry, SessionView};

/// Wire up the full engine: dispatch pipeline → aggregation window →
/// registry, with the pipeline's registry reference late-bound to close the
/// cycle.
pub fn build(
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn AnswerBackend>,
    sink: Arc<dyn SessionEventSink>,
    quiet_period: Duration,
) -> Arc<SessionRegistry> {
    let pipeline = Arc::new(DispatchPipeline::new(backend, Arc::clone(&store)));
    let window = AggregationWindow::new(
        quiet_period,
        Arc::clone(&pipeline) as Arc<dyn Dispatcher>,
    );
    let registry = Arc::new(SessionRegistry::new(factory, store, window, sink));
    pipeline.bind(Arc::clone(&registry) as Arc<dyn OutboundLookup>);
    registry
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use {
        anyhow::{Result, bail},
        async_trait::async_trait,
        charla_common::{ConversationInfo, Credentials},
        charla_dispatch::{Answer, AnswerBackend},
        charla_transport::{
            EventStream, SessionEvent, SessionEventSink, TransportClient, TransportEvent,
            TransportFactory,
        },
        tokio::sync::mpsc,
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        SendText(String, String),
        Archive(String),
        MarkUnread(String),
        Disconnect,
    }

    /// Scriptable in-memory transport connection.
    #[derive(Default)]
    pub struct FakeTransport {
        pub calls: Mutex<Vec<Call>>,
        pub conversations: Mutex<HashMap<String, ConversationInfo>>,
    }

    impl FakeTransport {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn sent_texts(&self) -> Vec<(String, String)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::SendText(conversation, text) => Some((conversation, text)),
                    _ => None,
                })
                .collect()
        }

        pub fn set_conversation(&self, conversation_id: &str, info: ConversationInfo) {
            self.conversations
                .lock()
                .unwrap()
                .insert(conversation_id.to_string(), info);
        }
    }

    #[async_trait]
    impl TransportClient for FakeTransport {
        async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::SendText(conversation_id.into(), text.into()));
            Ok(())
        }

        async fn conversation_info(&self, conversation_id: &str) -> Result<ConversationInfo> {
            Ok(self
                .conversations
                .lock()
                .unwrap()
                .get(conversation_id)
                .copied()
                .unwrap_or_default())
        }

        async fn archive_conversation(&self, conversation_id: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Archive(conversation_id.into()));
            Ok(())
        }

        async fn mark_unread(&self, conversation_id: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::MarkUnread(conversation_id.into()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Disconnect);
            Ok(())
        }
    }

    /// Factory that keeps every handed-out connection reachable so tests can
    /// drive events and inspect sends per tenant.
    #[derive(Default)]
    pub struct FakeFactory {
        pub clients: Mutex<HashMap<String, Arc<FakeTransport>>>,
        pub senders: Mutex<HashMap<String, mpsc::Sender<TransportEvent>>>,
        pub fail_connect: std::sync::atomic::AtomicBool,
    }

    impl FakeFactory {
        pub fn client(&self, tenant_id: &str) -> Arc<FakeTransport> {
            Arc::clone(&self.clients.lock().unwrap()[tenant_id])
        }

        pub async fn emit(&self, tenant_id: &str, event: TransportEvent) {
            let sender = self.senders.lock().unwrap()[tenant_id].clone();
            sender.send(event).await.unwrap();
        }
    }

    #[async_trait]
    impl TransportFactory for FakeFactory {
        async fn connect(
            &self,
            tenant_id: &str,
        ) -> Result<(Arc<dyn TransportClient>, EventStream)> {
            if self.fail_connect.load(std::sync::atomic::Ordering::SeqCst) {
                bail!("transport refused the connection");
            }
            let client = Arc::new(FakeTransport::default());
            let (tx, rx) = mpsc::channel(16);
            self.clients
                .lock()
                .unwrap()
                .insert(tenant_id.to_string(), Arc::clone(&client));
            self.senders.lock().unwrap().insert(tenant_id.to_string(), tx);
            Ok((client, rx))
        }
    }

    /// Backend that records questions and always answers the same text.
    pub struct RecordingBackend {
        pub questions: Mutex<Vec<(String, String)>>,
        pub answer: Answer,
    }

    impl RecordingBackend {
        pub fn answering(answer: Answer) -> Arc<Self> {
            Arc::new(Self {
                questions: Mutex::new(Vec::new()),
                answer,
            })
        }

        pub fn questions(&self) -> Vec<(String, String)> {
            self.questions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnswerBackend for RecordingBackend {
        async fn query(
            &self,
            question: &str,
            conversation_id: &str,
            _credentials: &Credentials,
        ) -> Answer {
            self.questions
                .lock()
                .unwrap()
                .push((question.to_string(), conversation_id.to_string()));
            self.answer.clone()
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<SessionEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionEventSink for RecordingSink {
        async fn emit(&self, event: SessionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    pub fn credentials() -> Credentials {
        Credentials::new("https://ai.example/api/v1/prediction/abc", "k1")
    }
}
