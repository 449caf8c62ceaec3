/// Lifecycle of one peer session.
///
/// `Idle → LocalMediaReady → Negotiating → Connected`, with `Failed`
/// reachable from `Negotiating` or `Connected` and `Closed` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    LocalMediaReady,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PeerState::Failed | PeerState::Closed)
    }

    /// States in which remote signaling is read and applied.
    pub fn accepts_signals(self) -> bool {
        matches!(
            self,
            PeerState::LocalMediaReady | PeerState::Negotiating | PeerState::Connected
        )
    }

    /// States a transport failure notification moves to `Failed`.
    pub fn can_fail(self) -> bool {
        matches!(self, PeerState::Negotiating | PeerState::Connected)
    }
}

/// Which side of the offer/answer exchange this peer took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

