use crate::expression::ExpressionFrame;

/// Something that happened to a peer session, yielded by
/// [`PeerSessionManager::next_event`](super::PeerSessionManager::next_event).
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// The expression data channel is open and [`send_frame`] will succeed.
    ///
    /// [`send_frame`]: super::PeerSessionManager::send_frame
    ChannelOpen,
    Connected,
    /// The transport reported failure or disconnect. Terminal; no reconnect is attempted.
    Failed { reason: String },
    FrameReceived(ExpressionFrame),
    /// A remote negotiation message was refused; the session keeps its state.
    Rejected { reason: String },
    /// Posting or polling signaling failed. Automatic polling pauses until a
    /// manual `poll_signaling` succeeds.
    SignalingFailed { reason: String },
    Closed,
}

impl PeerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerEvent::Failed { .. } | PeerEvent::Closed)
    }
}
