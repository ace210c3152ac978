use std::sync::Arc;

use {
    anyhow::{Context, Result},
    charla_aggregator::clean_text,
    charla_common::{ConvKey, InboundMessage, SessionStatus},
    charla_dispatch::{contains_handoff_trigger, replies, request_human_handoff},
    charla_transport::{EventStream, SessionEvent, TransportEvent},
    tracing::{debug, info, warn},
};

use crate::registry::SessionRegistry;

/// Per-session event loop. One runs per live session; it ends when the
/// transport signals a disconnect or closes the stream, and tears the
/// session down either way.
pub(crate) async fn run(
    registry: Arc<SessionRegistry>,
    tenant_id: String,
    mut events: EventStream,
) {
    while let Some(event) = events.recv().await {
        if matches!(event, TransportEvent::Disconnected) {
            info!(tenant_id, "transport disconnected");
            break;
        }
        if let Err(e) = handle_event(&registry, &tenant_id, event).await {
            warn!(tenant_id, error = %e, "failed to handle transport event");
        }
    }

    // A closed stream without an explicit disconnect gets the same teardown.
    if registry.delete_session(&tenant_id).await {
        registry
            .sink()
            .emit(SessionEvent::Disconnected {
                tenant_id: tenant_id.clone(),
            })
            .await;
    }
    debug!(tenant_id, "event router stopped");
}

async fn handle_event(
    registry: &Arc<SessionRegistry>,
    tenant_id: &str,
    event: TransportEvent,
) -> Result<()> {
    match event {
        TransportEvent::AuthChallenge(challenge) => {
            info!(tenant_id, "authentication challenge received");
            registry.cache_auth_challenge(tenant_id, challenge.clone());
            registry.set_status(tenant_id, SessionStatus::AwaitingAuth);
            registry
                .sink()
                .emit(SessionEvent::AuthChallenge {
                    tenant_id: tenant_id.to_string(),
                    challenge,
                })
                .await;
        },
        TransportEvent::Ready => {
            info!(tenant_id, "session ready");
            registry.clear_auth_challenge(tenant_id);
            registry.set_status(tenant_id, SessionStatus::Ready);
            if let Err(e) = registry
                .store()
                .set_status(tenant_id, SessionStatus::Ready, true)
                .await
            {
                warn!(tenant_id, error = %e, "failed to persist ready status");
            }
            registry
                .sink()
                .emit(SessionEvent::Ready {
                    tenant_id: tenant_id.to_string(),
                })
                .await;
        },
        TransportEvent::Message(message) => {
            handle_message(registry, tenant_id, message).await?;
        },
        // Handled in the loop itself.
        TransportEvent::Disconnected => {},
    }
    Ok(())
}

/// Route one inbound message: gate, then escalate, reply, or buffer.
async fn handle_message(
    registry: &Arc<SessionRegistry>,
    tenant_id: &str,
    message: InboundMessage,
) -> Result<()> {
    if message.is_status {
        return Ok(());
    }
    let Some(client) = registry.client(tenant_id) else {
        // Session deleted while the event was queued.
        return Ok(());
    };

    let info = client
        .conversation_info(&message.conversation_id)
        .await
        .context("conversation lookup failed")?;
    if info.is_group || info.archived {
        debug!(
            tenant_id,
            conversation_id = message.conversation_id,
            is_group = info.is_group,
            archived = info.archived,
            "conversation gated, ignoring message"
        );
        return Ok(());
    }

    if !message.kind.is_text() {
        client
            .send_text(&message.conversation_id, replies::MEDIA_NOT_SUPPORTED)
            .await
            .context("failed to send media reply")?;
        return Ok(());
    }

    // Checked on the raw body so an emoji-adjacent trigger still escalates.
    if contains_handoff_trigger(&message.body) {
        info!(
            tenant_id,
            conversation_id = message.conversation_id,
            "handoff requested"
        );
        request_human_handoff(client.as_ref(), &message.conversation_id).await;
        return Ok(());
    }

    let cleaned = clean_text(&message.body);
    if cleaned.is_empty() {
        return Ok(());
    }
    registry
        .window()
        .push(ConvKey::new(tenant_id, &message.conversation_id), &cleaned);
    Ok(())
}
