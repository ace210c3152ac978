use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

// ── Keys ────────────────────────────────────────────────────────────────────

/// Composite key for one conversation under one tenant.
///
/// A real tuple key rather than string concatenation, so tenant or
/// conversation ids containing a delimiter can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvKey {
    pub tenant_id: String,
    pub conversation_id: String,
}

impl ConvKey {
    pub fn new(tenant_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl fmt::Display for ConvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.conversation_id)
    }
}

// ── Messages ────────────────────────────────────────────────────────────────

/// Content kind of an inbound chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    Audio,
    Video,
    Document,
    Sticker,
}

impl ContentKind {
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(self, Self::Text)
    }
}

/// One inbound message delivered by the transport for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub body: String,
    pub kind: ContentKind,
    /// Status broadcasts are delivered by some transports but never answered.
    #[serde(default)]
    pub is_status: bool,
}

/// Conversation attributes the router gates on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub is_group: bool,
    pub archived: bool,
}

// ── Credentials ─────────────────────────────────────────────────────────────

/// Downstream AI endpoint credentials for one tenant.
///
/// `endpoint` is the full prediction URL; no path construction happens
/// anywhere downstream of session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub endpoint: String,
    pub key: String,
}

impl Credentials {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
        }
    }

    /// Both fields must be present for a session to be created.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.endpoint.trim().is_empty() && !self.key.trim().is_empty()
    }
}

// ── Session lifecycle ───────────────────────────────────────────────────────

/// Lifecycle status of a tenant session.
///
/// `Disconnected` is terminal: a session never leaves it, a new one must be
/// created fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    AwaitingAuth,
    Ready,
    Disconnected,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "awaiting_auth" => Ok(Self::AwaitingAuth),
            "ready" => Ok(Self::Ready),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(crate::Error::message(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}
