use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownSignalKind;

impl FromStr for SignalKind {
    type Err = UnknownSignalKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer" => Ok(SignalKind::Offer),
            "answer" => Ok(SignalKind::Answer),
            "candidate" => Ok(SignalKind::Candidate),
            _ => Err(UnknownSignalKind),
        }
    }
}

/// One signaling envelope. Immutable once created.
///
/// `data` is opaque to the store: a session description for offers and
/// answers, an ICE candidate for candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Sender tag, lets a peer skip its own messages in the shared queue.
    #[serde(rename = "peerId", default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl NegotiationMessage {
    pub fn new(kind: SignalKind, session_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            peer_id: None,
            data,
        }
    }

    pub fn from_peer(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }
}
