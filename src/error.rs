use crate::peer::state::PeerState;
use thiserror::Error;

/// Errors surfaced by the signaling store, the peer session and the frame codec.
///
/// An unknown signaling session is not an error: reads against it return an
/// empty queue.
#[derive(Debug, Error)]
pub enum Error {
    /// Local capture was denied or the requested device kind is not available.
    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    /// A second remote description arrived for the same negotiation round.
    #[error("remote description already applied, renegotiation is not supported")]
    UnexpectedRenegotiation,

    /// Data-channel payload that does not decode into an expression frame.
    #[error("malformed expression frame: {0}")]
    MalformedFrame(String),

    /// Negotiation payload that does not match its declared kind.
    #[error("malformed signaling message: {0}")]
    MalformedSignal(String),

    /// Posting to or polling the signaling service failed.
    #[error("signaling transport unreachable: {0}")]
    TransportUnreachable(String),

    #[error("cannot {op} while session is {state:?}")]
    InvalidState { op: &'static str, state: PeerState },

    #[error("data channel is not open")]
    ChannelNotOpen,

    /// Detached signaling work panicked before reporting back.
    #[error("signaling task failed: {0}")]
    SignalingTask(String),

    /// The reply backend failed to produce text.
    #[error("reply backend error: {0}")]
    Backend(String),

    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
