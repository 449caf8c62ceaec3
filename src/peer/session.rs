use crate::config::PeerConfig;
use crate::error::{Error, Result};
use crate::expression::{codec, ExpressionFrame, ExpressionSink};
use crate::peer::connection::{
    FrameChannel, Notification, NotificationReceivers, Notifier, PeerConnection, PeerConnector,
    RtcConnector,
};
use crate::peer::events::PeerEvent;
use crate::peer::ice::{analyze_candidates, CandidateBuffer};
use crate::peer::media::{LocalMedia, MediaConstraints, MediaSource, SyntheticMediaSource};
use crate::peer::state::{PeerState, Role};
use crate::peer::types::{ConnectionState, IceCandidate, SdpKind, SessionDescription};
use crate::signaling::{HttpTransport, NegotiationMessage, SignalKind, SignalingTransport};
use crate::utils::random_id;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CHANNEL_LABEL: &str = "expressionData";

/// One peer's side of a session: local media, offer/answer/candidate
/// exchange through a [`SignalingTransport`], and the expression data channel.
///
/// Owned by a single consumer. Connection progress is reported through
/// [`next_event`](Self::next_event), never as the return value of a call.
///
/// [`next_event`](Self::next_event) and
/// [`poll_signaling`](Self::poll_signaling) are cancel-safe: work on a remote
/// message runs detached and is committed by whichever call comes next, so
/// dropping either future never loses or repeats a message.
pub struct PeerSessionManager {
    session_id: String,
    peer_id: String,
    state: PeerState,
    role: Option<Role>,

    connector: Arc<dyn PeerConnector>,
    media_source: Arc<dyn MediaSource>,
    transport: Arc<dyn SignalingTransport>,
    label: String,

    local_media: Option<LocalMedia>,
    connection: Option<Arc<dyn PeerConnection>>,
    data_channel: Option<Arc<dyn FrameChannel>>,
    channel_open: bool,
    remote_description_set: bool,
    pending: CandidateBuffer,

    read: ReadMark,
    inflight: Option<InFlight>,

    notifier: Option<Notifier>,
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,
    gathered: Option<mpsc::UnboundedReceiver<Option<IceCandidate>>>,
    closed: Arc<AtomicBool>,

    events: VecDeque<PeerEvent>,
    poll_interval: Duration,
    ticker: Option<Interval>,
    polling_suspended: bool,
}

/// How far this peer has read the shared, non-destructive signaling queue.
#[derive(Debug, Clone, Default)]
struct ReadMark {
    cursor: usize,
    // last message read, to notice a queue that was evicted and recreated
    last: Option<NegotiationMessage>,
}

impl ReadMark {
    fn advance(&mut self, index: usize, message: &NegotiationMessage) {
        self.cursor = index + 1;
        self.last = Some(message.clone());
    }

    /// False when `messages` is not the queue this mark was taken on.
    fn matches(&self, messages: &[NegotiationMessage]) -> bool {
        match self.cursor.checked_sub(1) {
            None => true,
            Some(last) => messages.get(last) == self.last.as_ref(),
        }
    }
}

/// Connection built for one negotiation, not yet owned by the session.
struct Link {
    pc: Arc<dyn PeerConnection>,
    notifier: Notifier,
    receivers: NotificationReceivers,
}

/// Remote message being applied by a detached task.
struct InFlight {
    kind: SignalKind,
    // read mark to go back to if the work fails on the transport
    rewind: Option<ReadMark>,
    task: JoinHandle<Settled>,
}

/// What detached signaling work hands back to the session.
struct Settled {
    /// Carries the answering connection when the message was an offer.
    result: Result<Option<Link>>,
    /// Queued remote candidates the work did not get to apply.
    unapplied: Vec<IceCandidate>,
}

impl Settled {
    fn done(link: Option<Link>) -> Self {
        Self {
            result: Ok(link),
            unapplied: Vec::new(),
        }
    }

    fn failed(error: Error, unapplied: Vec<IceCandidate>) -> Self {
        Self {
            result: Err(error),
            unapplied,
        }
    }
}

/// Posts this peer's own messages to the session queue.
#[derive(Clone)]
struct Outbox {
    transport: Arc<dyn SignalingTransport>,
    session_id: String,
    peer_id: String,
}

impl Outbox {
    async fn post(&self, kind: SignalKind, data: Value) -> Result<()> {
        let message = NegotiationMessage::new(kind, self.session_id.as_str(), data)
            .from_peer(self.peer_id.as_str());
        self.transport.post(message).await?;
        tracing::debug!(session = %self.session_id, %kind, "posted");
        Ok(())
    }
}

enum Step {
    Notification(Notification),
    NotifierGone,
    Poll,
    Stalled,
}

impl PeerSessionManager {
    pub fn new(
        session_id: impl Into<String>,
        connector: Arc<dyn PeerConnector>,
        media_source: Arc<dyn MediaSource>,
        transport: Arc<dyn SignalingTransport>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            peer_id: random_id(),
            state: PeerState::Idle,
            role: None,
            connector,
            media_source,
            transport,
            label: DEFAULT_CHANNEL_LABEL.to_owned(),
            local_media: None,
            connection: None,
            data_channel: None,
            channel_open: false,
            remote_description_set: false,
            pending: CandidateBuffer::new(),
            read: ReadMark::default(),
            inflight: None,
            notifier: None,
            notifications: None,
            gathered: None,
            closed: Arc::new(AtomicBool::new(false)),
            events: VecDeque::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            ticker: None,
            polling_suspended: false,
        }
    }

    /// WebRTC connector, synthetic capture and HTTP signaling built from `config`.
    pub fn from_config(session_id: impl Into<String>, config: &PeerConfig) -> Self {
        Self::new(
            session_id,
            Arc::new(RtcConnector::new(config.ice_servers.clone())),
            Arc::new(SyntheticMediaSource::new(config.audio, config.video)),
            Arc::new(HttpTransport::new(&config.signaling_url)),
        )
        .with_label(config.data_channel_label.clone())
        .with_poll_interval(config.poll_interval())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_peer_id(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = peer_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn local_media(&self) -> Option<&LocalMedia> {
        self.local_media.as_ref()
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn is_channel_open(&self) -> bool {
        self.channel_open
    }

    /// `Idle → LocalMediaReady`. Denial is returned as-is and not retried.
    pub async fn acquire_media(&mut self, constraints: MediaConstraints) -> Result<()> {
        self.require("acquire media", PeerState::Idle)?;

        match self.media_source.acquire(constraints).await {
            Ok(media) => {
                tracing::info!(session = %self.session_id, kinds = ?media.kinds(), "local media ready");
                self.local_media = Some(media);
                self.state = PeerState::LocalMediaReady;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "local media unavailable");
                Err(e)
            }
        }
    }

    /// Creates the data channel and an offer, then posts the offer.
    ///
    /// On failure the connection is discarded and the session stays in
    /// `LocalMediaReady`, so the call may be repeated.
    pub async fn start_offer(&mut self) -> Result<()> {
        self.settle_and_tally().await?;
        self.require("start offer", PeerState::LocalMediaReady)?;
        if self.role == Some(Role::Answerer) || self.remote_description_set {
            return Err(Error::UnexpectedRenegotiation);
        }

        let link = open_link(self.connector.as_ref(), self.local_media.as_ref()).await?;
        let pc = self.adopt(link);
        match self.offer_on(&pc).await {
            Ok(()) => {
                self.role = Some(Role::Offerer);
                self.enter_negotiating();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "offer failed");
                self.abandon_connection().await;
                Err(e)
            }
        }
    }

    async fn offer_on(&mut self, pc: &Arc<dyn PeerConnection>) -> Result<()> {
        // the offer has to advertise the channel
        let channel = pc.create_data_channel(&self.label).await?;
        self.data_channel = Some(channel);

        let offer = pc.create_offer().await?;
        pc.set_local_description(offer.clone()).await?;
        tracing::debug!(session = %self.session_id, "local offer set");
        self.outbox()
            .post(SignalKind::Offer, description_payload(&offer)?)
            .await
    }

    /// Applies one message read from the session queue.
    ///
    /// Candidates that arrive before the remote description are buffered and
    /// applied, in arrival order, right after it. A second remote description
    /// is refused with [`Error::UnexpectedRenegotiation`] and leaves the
    /// session unchanged.
    pub async fn apply_remote(&mut self, message: &NegotiationMessage) -> Result<()> {
        self.settle_and_tally().await?;
        self.apply_at(message, None).await
    }

    /// `index` is the message position when it came from the session queue.
    async fn apply_at(&mut self, message: &NegotiationMessage, index: Option<usize>) -> Result<()> {
        if !self.state.accepts_signals() {
            return Err(Error::InvalidState {
                op: "apply signaling message",
                state: self.state,
            });
        }

        let task = match message.kind {
            SignalKind::Offer => {
                if self.remote_description_set || self.role.is_some() {
                    return Err(Error::UnexpectedRenegotiation);
                }
                let offer = parse_description(&message.data, SdpKind::Offer)?;
                tracing::info!(session = %self.session_id, "remote offer received");
                tokio::spawn(answer_offer(
                    self.connector.clone(),
                    self.local_media.as_ref().map(LocalMedia::share),
                    self.outbox(),
                    offer,
                    self.pending.take(),
                ))
            }
            SignalKind::Answer => {
                if self.remote_description_set {
                    return Err(Error::UnexpectedRenegotiation);
                }
                if self.role != Some(Role::Offerer) {
                    return Err(Error::InvalidState {
                        op: "apply answer",
                        state: self.state,
                    });
                }
                let answer = parse_description(&message.data, SdpKind::Answer)?;
                let pc = self.current_connection()?;
                tokio::spawn(apply_answer(
                    pc,
                    answer,
                    self.pending.take(),
                    self.session_id.clone(),
                ))
            }
            SignalKind::Candidate => {
                let candidate: IceCandidate = serde_json::from_value(message.data.clone())
                    .map_err(|e| Error::MalformedSignal(format!("candidate: {e}")))?;
                if !self.remote_description_set {
                    self.pending.push(candidate);
                    return Ok(());
                }
                let pc = self.current_connection()?;
                tokio::spawn(add_candidate(pc, candidate))
            }
        };

        // From here the message counts as read even if this call is dropped.
        let rewind = index.map(|index| {
            let before = self.read.clone();
            self.read.advance(index, message);
            before
        });
        self.inflight = Some(InFlight {
            kind: message.kind,
            rewind,
            task,
        });
        self.settle().await.map_or(Ok(()), |(_, result)| result)
    }

    /// Waits for detached signaling work and commits its outcome. Dropping
    /// this future leaves the work in place for the next call.
    async fn settle(&mut self) -> Option<(SignalKind, Result<()>)> {
        let joined = (&mut self.inflight.as_mut()?.task).await;
        let InFlight { kind, rewind, .. } = self.inflight.take()?;

        let outcome = match joined {
            Ok(Settled { result, unapplied }) => {
                self.pending.restore(unapplied);
                self.commit(kind, result)
            }
            Err(e) => Err(Error::SignalingTask(e.to_string())),
        };
        if let (Err(Error::TransportUnreachable(_)), Some(rewind)) = (&outcome, rewind) {
            // reread the message on the next poll
            self.read = rewind;
        }
        Some((kind, outcome))
    }

    fn commit(&mut self, kind: SignalKind, result: Result<Option<Link>>) -> Result<()> {
        match (kind, result?) {
            (SignalKind::Offer, Some(link)) => {
                self.adopt(link);
                self.remote_description_set = true;
                self.role = Some(Role::Answerer);
                self.enter_negotiating();
            }
            (SignalKind::Answer, _) => {
                self.remote_description_set = true;
                tracing::info!(session = %self.session_id, "remote answer applied");
            }
            _ => {}
        }
        Ok(())
    }

    /// Counts an applied message or reports a refused one as
    /// [`PeerEvent::Rejected`]. Transport failures are passed through.
    fn tally(&mut self, kind: SignalKind, result: Result<()>) -> Result<usize> {
        match result {
            Ok(()) => Ok(1),
            Err(e @ Error::TransportUnreachable(_)) => Err(e),
            Err(e) => {
                tracing::warn!(
                    session = %self.session_id,
                    %kind,
                    error = %e,
                    "signaling message rejected"
                );
                self.events.push_back(PeerEvent::Rejected {
                    reason: e.to_string(),
                });
                Ok(0)
            }
        }
    }

    async fn settle_and_tally(&mut self) -> Result<usize> {
        match self.settle().await {
            Some((kind, result)) => self.tally(kind, result),
            None => Ok(0),
        }
    }

    /// Reads the session queue once and applies every message not yet seen.
    ///
    /// Own messages are skipped. A refused message is reported as
    /// [`PeerEvent::Rejected`] and counts as seen; a transport failure while
    /// answering stops the batch and the message is retried on the next poll.
    /// Returns the number of messages applied.
    pub async fn poll_signaling(&mut self) -> Result<usize> {
        if !self.state.accepts_signals() {
            return Ok(0);
        }
        let mut applied = self.settle_and_tally().await?;

        let messages = self.transport.poll(&self.session_id).await?;
        if self.closed.load(Ordering::SeqCst) {
            return Ok(0);
        }
        if !self.read.matches(&messages) {
            tracing::debug!(session = %self.session_id, "signaling queue was recreated, rereading");
            self.read = ReadMark::default();
        }

        for (index, message) in messages.iter().enumerate().skip(self.read.cursor) {
            if message.peer_id.as_deref() == Some(self.peer_id.as_str()) {
                self.read.advance(index, message);
                continue;
            }

            let result = self.apply_at(message, Some(index)).await;
            if !matches!(result, Err(Error::TransportUnreachable(_))) {
                self.read.advance(index, message);
            }
            applied += self.tally(message.kind, result)?;

            if !self.state.accepts_signals() {
                break;
            }
        }

        self.polling_suspended = false;
        Ok(applied)
    }

    /// Waits for the next event, polling signaling every poll interval in
    /// the meantime.
    ///
    /// Returns `None` once the session is idle, closed or failed and every
    /// queued event was delivered, or while automatic polling is paused and
    /// no connection exists to report anything.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if self.state.is_terminal() || self.state == PeerState::Idle {
                return None;
            }
            if self.inflight.is_some() {
                // left behind by a dropped call
                if let Err(e) = self.settle_and_tally().await {
                    self.signaling_failed(e.to_string());
                }
                continue;
            }

            match self.next_step().await {
                Step::Notification(notification) => self.on_notification(notification),
                Step::NotifierGone => self.notifications = None,
                Step::Poll => self.poll_tick().await,
                Step::Stalled => return None,
            }
        }
    }

    async fn next_step(&mut self) -> Step {
        let interval = self.poll_interval;
        let polling = !self.polling_suspended;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        match self.notifications.as_mut() {
            Some(rx) => tokio::select! {
                notification = rx.recv() => match notification {
                    Some(n) => Step::Notification(n),
                    None => Step::NotifierGone,
                },
                _ = ticker.tick(), if polling => Step::Poll,
            },
            None if polling => {
                ticker.tick().await;
                Step::Poll
            }
            None => Step::Stalled,
        }
    }

    async fn poll_tick(&mut self) {
        match self.poll_signaling().await {
            Ok(0) => {}
            Ok(applied) => tracing::debug!(session = %self.session_id, applied, "signaling applied"),
            Err(e) => self.signaling_failed(e.to_string()),
        }
    }

    fn signaling_failed(&mut self, reason: String) {
        tracing::warn!(session = %self.session_id, %reason, "signaling failed, pausing polling");
        self.polling_suspended = true;
        self.events.push_back(PeerEvent::SignalingFailed { reason });
    }

    fn on_notification(&mut self, notification: Notification) {
        if self.state.is_terminal() {
            return;
        }

        match notification {
            Notification::StateChanged(ConnectionState::Connected) => {
                if self.state == PeerState::Negotiating {
                    tracing::info!(session = %self.session_id, "peer connected");
                    self.state = PeerState::Connected;
                    self.events.push_back(PeerEvent::Connected);
                }
            }
            Notification::StateChanged(st @ (ConnectionState::Failed | ConnectionState::Disconnected)) => {
                if self.state.can_fail() {
                    tracing::error!(session = %self.session_id, state = ?st, "peer connection lost");
                    self.state = PeerState::Failed;
                    self.channel_open = false;
                    self.events.push_back(PeerEvent::Failed {
                        reason: format!("connection {}", connection_state_name(st)),
                    });
                }
            }
            Notification::StateChanged(st) => {
                tracing::debug!(session = %self.session_id, state = ?st, "connection state");
            }
            Notification::ChannelOpened(channel) => {
                tracing::info!(session = %self.session_id, label = %channel.label(), "expression channel open");
                self.data_channel = Some(channel);
                self.channel_open = true;
                self.events.push_back(PeerEvent::ChannelOpen);
            }
            Notification::ChannelMessage(payload) => match codec::decode(&payload) {
                Ok(frame) => self.events.push_back(PeerEvent::FrameReceived(frame)),
                Err(e) => {
                    tracing::warn!(session = %self.session_id, error = %e, "dropping expression frame")
                }
            },
            Notification::ChannelClosed => {
                tracing::debug!(session = %self.session_id, "expression channel closed");
                self.channel_open = false;
            }
            Notification::SignalingFailed(reason) => self.signaling_failed(reason),
        }
    }

    /// Pumps events until the session ends, handing every received frame to
    /// `sink`. Returns the final state.
    pub async fn run(&mut self, sink: &mut dyn ExpressionSink) -> PeerState {
        while let Some(event) = self.next_event().await {
            match event {
                PeerEvent::FrameReceived(frame) => sink.apply(&frame),
                other => tracing::debug!(session = %self.session_id, event = ?other, "peer event"),
            }
        }
        self.state
    }

    /// Encodes `frame` and sends it over the expression channel.
    pub async fn send_frame(&self, frame: &ExpressionFrame) -> Result<()> {
        let channel = match &self.data_channel {
            Some(channel) if self.channel_open && !self.state.is_terminal() => channel,
            _ => return Err(Error::ChannelNotOpen),
        };
        channel.send_text(codec::encode(frame)?).await
    }

    /// Stops local media, closes the data channel and the connection.
    ///
    /// In-flight signaling results are discarded. Closing a closed session
    /// does nothing.
    pub async fn close(&mut self) {
        if self.state == PeerState::Closed {
            return;
        }
        self.closed.store(true, Ordering::SeqCst);
        if let Some(inflight) = self.inflight.take() {
            inflight.task.abort();
        }

        if let Some(mut media) = self.local_media.take() {
            media.stop();
        }
        if let Some(channel) = self.data_channel.take() {
            if let Err(e) = channel.close().await {
                tracing::debug!(session = %self.session_id, error = %e, "data channel close failed");
            }
        }
        if let Some(pc) = self.connection.take() {
            if let Err(e) = pc.close().await {
                tracing::warn!(session = %self.session_id, error = %e, "peer connection close failed");
            }
        }

        self.notifier = None;
        self.notifications = None;
        self.gathered = None;
        self.ticker = None;
        self.pending.clear();
        self.channel_open = false;
        self.events.clear();
        self.events.push_back(PeerEvent::Closed);
        self.state = PeerState::Closed;
        tracing::info!(session = %self.session_id, "session closed");
    }

    fn require(&self, op: &'static str, expected: PeerState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    fn current_connection(&self) -> Result<Arc<dyn PeerConnection>> {
        self.connection.clone().ok_or(Error::InvalidState {
            op: "use connection",
            state: self.state,
        })
    }

    fn adopt(&mut self, link: Link) -> Arc<dyn PeerConnection> {
        let Link {
            pc,
            notifier,
            receivers,
        } = link;
        self.connection = Some(pc.clone());
        self.notifier = Some(notifier);
        self.notifications = Some(receivers.events);
        self.gathered = Some(receivers.candidates);
        pc
    }

    fn outbox(&self) -> Outbox {
        Outbox {
            transport: self.transport.clone(),
            session_id: self.session_id.clone(),
            peer_id: self.peer_id.clone(),
        }
    }

    async fn abandon_connection(&mut self) {
        self.data_channel = None;
        self.channel_open = false;
        self.remote_description_set = false;
        self.notifier = None;
        self.notifications = None;
        self.gathered = None;
        if let Some(pc) = self.connection.take() {
            if let Err(e) = pc.close().await {
                tracing::debug!(session = %self.session_id, error = %e, "discarded connection close failed");
            }
        }
    }

    fn enter_negotiating(&mut self) {
        tracing::info!(session = %self.session_id, role = ?self.role, "negotiating");
        self.state = PeerState::Negotiating;
        self.spawn_candidate_forwarder();
    }

    /// Posts locally gathered candidates one by one until end-of-candidates.
    /// Started only after the local description was posted.
    fn spawn_candidate_forwarder(&mut self) {
        let (Some(mut gathered), Some(notifier)) = (self.gathered.take(), self.notifier.clone()) else {
            return;
        };
        let outbox = self.outbox();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(next) = gathered.recv().await {
                let Some(candidate) = next else {
                    analyze_candidates(&seen);
                    break;
                };
                if closed.load(Ordering::SeqCst) {
                    break;
                }

                let data = match serde_json::to_value(&candidate) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot encode local candidate");
                        continue;
                    }
                };
                let result = outbox.post(SignalKind::Candidate, data).await;
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                match result {
                    Ok(()) => seen.push(candidate),
                    Err(e) => notifier.notify(Notification::SignalingFailed(e.to_string())),
                }
            }
            tracing::debug!(session = %outbox.session_id, "candidate forwarding finished");
        });
    }
}

impl Drop for PeerSessionManager {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(inflight) = self.inflight.take() {
            inflight.task.abort();
        }
        if let Some(pc) = self.connection.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = pc.close().await;
                });
            }
        }
    }
}

async fn open_link(connector: &dyn PeerConnector, media: Option<&LocalMedia>) -> Result<Link> {
    let (notifier, receivers) = Notifier::channel();
    let pc = connector.connect(notifier.clone()).await?;

    if let Some(media) = media {
        if let Err(e) = pc.add_media(media).await {
            let _ = pc.close().await;
            return Err(e);
        }
    }
    Ok(Link {
        pc,
        notifier,
        receivers,
    })
}

/// Answers `offer` on a fresh connection. Queued candidates are applied only
/// after the answer was posted.
async fn answer_offer(
    connector: Arc<dyn PeerConnector>,
    media: Option<LocalMedia>,
    outbox: Outbox,
    offer: SessionDescription,
    pending: Vec<IceCandidate>,
) -> Settled {
    let link = match open_link(connector.as_ref(), media.as_ref()).await {
        Ok(link) => link,
        Err(e) => return Settled::failed(e, pending),
    };
    if let Err(e) = answer_on(&link.pc, &outbox, offer).await {
        if let Err(close) = link.pc.close().await {
            tracing::debug!(session = %outbox.session_id, error = %close, "discarded connection close failed");
        }
        return Settled::failed(e, pending);
    }
    flush_pending(&link.pc, pending, &outbox.session_id).await;
    Settled::done(Some(link))
}

async fn answer_on(pc: &Arc<dyn PeerConnection>, outbox: &Outbox, offer: SessionDescription) -> Result<()> {
    pc.set_remote_description(offer).await?;
    let answer = pc.create_answer().await?;
    pc.set_local_description(answer.clone()).await?;
    tracing::debug!(session = %outbox.session_id, "local answer set");
    outbox.post(SignalKind::Answer, description_payload(&answer)?).await
}

async fn apply_answer(
    pc: Arc<dyn PeerConnection>,
    answer: SessionDescription,
    pending: Vec<IceCandidate>,
    session_id: String,
) -> Settled {
    if let Err(e) = pc.set_remote_description(answer).await {
        return Settled::failed(e, pending);
    }
    flush_pending(&pc, pending, &session_id).await;
    Settled::done(None)
}

async fn add_candidate(pc: Arc<dyn PeerConnection>, candidate: IceCandidate) -> Settled {
    match pc.add_ice_candidate(candidate).await {
        Ok(()) => Settled::done(None),
        Err(e) => Settled::failed(e, Vec::new()),
    }
}

async fn flush_pending(pc: &Arc<dyn PeerConnection>, pending: Vec<IceCandidate>, session_id: &str) {
    if pending.is_empty() {
        return;
    }
    tracing::debug!(session = %session_id, count = pending.len(), "applying queued remote candidates");
    for candidate in pending {
        if let Err(e) = pc.add_ice_candidate(candidate).await {
            tracing::warn!(session = %session_id, error = %e, "queued candidate rejected");
        }
    }
}

fn description_payload(desc: &SessionDescription) -> Result<Value> {
    serde_json::to_value(desc).map_err(|e| Error::MalformedSignal(e.to_string()))
}

fn parse_description(data: &Value, expected: SdpKind) -> Result<SessionDescription> {
    let desc: SessionDescription = serde_json::from_value(data.clone())
        .map_err(|e| Error::MalformedSignal(format!("session description: {e}")))?;
    if desc.kind != expected {
        return Err(Error::MalformedSignal(format!(
            "expected {expected:?} description, got {:?}",
            desc.kind
        )));
    }
    Ok(desc)
}

fn connection_state_name(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::New => "new",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Failed => "failed",
        ConnectionState::Closed => "closed",
    }
}
