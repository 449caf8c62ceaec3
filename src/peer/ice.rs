use crate::peer::types::IceCandidate;

/// Remote candidates that arrived before the remote description.
///
/// Released in arrival order once the description is applied.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: Vec<IceCandidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        tracing::debug!(
            candidate = %candidate.candidate,
            queued = self.pending.len() + 1,
            "remote description not set yet, queuing candidate"
        );
        self.pending.push(candidate);
    }

    pub fn take(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending)
    }

    /// Puts back candidates handed out by [`take`](Self::take) that were not
    /// applied, ahead of anything queued since.
    pub fn restore(&mut self, mut candidates: Vec<IceCandidate>) {
        if candidates.is_empty() {
            return;
        }
        candidates.append(&mut self.pending);
        self.pending = candidates;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Counts of candidate types seen in one gathering round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

pub fn analyze_candidates(candidates: &[IceCandidate]) -> CandidateSummary {
    let mut summary = CandidateSummary::default();
    for candidate in candidates {
        match candidate.kind() {
            Some("host") => summary.host += 1,
            Some("srflx") => summary.srflx += 1,
            Some("relay") => summary.relay += 1,
            _ => {}
        }
    }

    tracing::info!(
        host = summary.host,
        srflx = summary.srflx,
        relay = summary.relay,
        "candidate analysis"
    );
    if summary.relay == 0 {
        tracing::warn!("no TURN relay candidates found, connection through NAT may fail");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_releases_in_arrival_order() {
        let mut buf = CandidateBuffer::new();
        buf.push(IceCandidate::new("candidate:a 1 udp 1 10.0.0.1 1 typ host"));
        buf.push(IceCandidate::new("candidate:b 1 udp 1 10.0.0.2 2 typ host"));

        let released = buf.take();
        assert_eq!(released.len(), 2);
        assert!(released[0].candidate.starts_with("candidate:a"));
        assert!(buf.is_empty());
    }

    #[test]
    fn restored_candidates_go_first() {
        let mut buf = CandidateBuffer::new();
        buf.push(IceCandidate::new("candidate:a 1 udp 1 10.0.0.1 1 typ host"));
        let taken = buf.take();
        buf.push(IceCandidate::new("candidate:b 1 udp 1 10.0.0.2 2 typ host"));
        buf.restore(taken);

        let order: Vec<_> = buf.take().into_iter().map(|c| c.candidate).collect();
        assert!(order[0].starts_with("candidate:a"));
        assert!(order[1].starts_with("candidate:b"));
    }

    #[test]
    fn summary_counts_by_type() {
        let summary = analyze_candidates(&[
            IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 1 typ host"),
            IceCandidate::new("candidate:2 1 udp 1 203.0.113.1 2 typ srflx raddr 10.0.0.1 rport 1"),
            IceCandidate::new("candidate:3 1 udp 1 198.51.100.1 3 typ relay raddr 203.0.113.1 rport 2"),
            IceCandidate::new("candidate:4 1 udp 1 10.0.0.3 4 typ host"),
        ]);
        assert_eq!(summary, CandidateSummary { host: 2, srflx: 1, relay: 1 });
    }
}
