mod common;

use async_trait::async_trait;
use avatar_rtc::expression::{AvatarPose, Expression, ExpressionFrame, HeadMovement};
use avatar_rtc::peer::{
    ConnectionState, IceCandidate, MediaConstraints, Notification, PeerEvent, PeerSessionManager,
    PeerState, Role, SyntheticMediaSource,
};
use avatar_rtc::signaling::{
    HttpTransport, LocalTransport, NegotiationMessage, SignalKind, SignalingStore,
    SignalingTransport,
};
use avatar_rtc::{Error, Result};
use bytes::Bytes;
use common::{eventually, ScriptedConnector};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SESSION: &str = "room-1";
const HOST_CANDIDATE: &str = "candidate:1 1 udp 2122260223 10.0.0.1 50000 typ host";

fn peer_with(
    connector: &ScriptedConnector,
    transport: Arc<dyn SignalingTransport>,
    peer_id: &str,
) -> PeerSessionManager {
    PeerSessionManager::new(
        SESSION,
        Arc::new(connector.clone()),
        Arc::new(SyntheticMediaSource::new(true, false)),
        transport,
    )
    .with_peer_id(peer_id)
    .with_poll_interval(Duration::from_millis(10))
}

fn peer(store: &Arc<SignalingStore>, connector: &ScriptedConnector, peer_id: &str) -> PeerSessionManager {
    peer_with(connector, Arc::new(LocalTransport::new(store.clone())), peer_id)
}

fn unreachable_transport() -> Arc<dyn SignalingTransport> {
    Arc::new(HttpTransport::new("http://127.0.0.1:9"))
}

/// Store-backed transport whose posts take `delay` to land.
struct SlowPosts {
    inner: LocalTransport,
    delay: Duration,
}

#[async_trait]
impl SignalingTransport for SlowPosts {
    async fn post(&self, message: NegotiationMessage) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.post(message).await
    }

    async fn poll(&self, session_id: &str) -> Result<Vec<NegotiationMessage>> {
        self.inner.poll(session_id).await
    }
}

async fn next(peer: &mut PeerSessionManager) -> Option<PeerEvent> {
    tokio::time::timeout(Duration::from_secs(2), peer.next_event())
        .await
        .expect("timed out waiting for a peer event")
}

async fn offering(store: &Arc<SignalingStore>, connector: &ScriptedConnector) -> PeerSessionManager {
    let mut alice = peer(store, connector, "alice");
    alice.acquire_media(MediaConstraints::default()).await.unwrap();
    alice.start_offer().await.unwrap();
    alice
}

async fn answering(store: &Arc<SignalingStore>, connector: &ScriptedConnector) -> PeerSessionManager {
    let mut bob = peer(store, connector, "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();
    assert_eq!(bob.poll_signaling().await.unwrap(), 1);
    bob
}

fn remote(kind: SignalKind, data: serde_json::Value) -> NegotiationMessage {
    NegotiationMessage::new(kind, SESSION, data).from_peer("remote")
}

fn smile_frame() -> ExpressionFrame {
    let mut frame = ExpressionFrame::default();
    frame.expressions.set(Expression::Smile, 0.5);
    frame.expressions.set(Expression::MouthOpen, 0.25);
    frame.head_movement = HeadMovement { x: 0.0625, y: -0.03125, z: 0.0 };
    frame
}

#[tokio::test]
async fn offer_and_answer_meet_through_the_store() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());

    let mut alice = offering(&store, &a).await;
    assert_eq!(alice.state(), PeerState::Negotiating);
    assert_eq!(alice.role(), Some(Role::Offerer));
    assert_eq!(
        a.script.calls(),
        vec![
            "connect",
            "add_media:1",
            "create_data_channel:expressionData",
            "create_offer",
            "set_local:offer",
        ]
    );

    let queued = store.drain(SESSION);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].kind, SignalKind::Offer);
    assert_eq!(queued[0].peer_id.as_deref(), Some("alice"));
    assert_eq!(queued[0].data["type"], "offer");

    let bob = answering(&store, &b).await;
    assert_eq!(bob.state(), PeerState::Negotiating);
    assert_eq!(bob.role(), Some(Role::Answerer));
    assert!(bob.remote_description_set());
    assert!(b.script.position("set_remote:offer") < b.script.position("set_local:answer"));
    assert_eq!(b.script.count("create_data_channel:expressionData"), 0);

    // alice skips her own offer and applies the answer exactly once
    assert_eq!(alice.poll_signaling().await.unwrap(), 1);
    assert!(alice.remote_description_set());
    assert_eq!(alice.poll_signaling().await.unwrap(), 0);
    assert_eq!(a.script.count("set_remote:answer"), 1);
}

#[tokio::test]
async fn connection_is_reported_as_an_event() {
    let store = Arc::new(SignalingStore::new());
    let a = ScriptedConnector::new();
    let mut alice = offering(&store, &a).await;

    let notifier = a.script.notifier();
    notifier.notify(Notification::StateChanged(ConnectionState::Connecting));
    notifier.notify(Notification::StateChanged(ConnectionState::Connected));
    assert_eq!(next(&mut alice).await, Some(PeerEvent::Connected));
    assert_eq!(alice.state(), PeerState::Connected);

    notifier.notify(Notification::ChannelOpened(a.channel("expressionData")));
    assert_eq!(next(&mut alice).await, Some(PeerEvent::ChannelOpen));
    assert!(alice.is_channel_open());

    alice.send_frame(&smile_frame()).await.unwrap();
    let sent = a.script.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("\"headMovement\""));
}

#[tokio::test]
async fn frames_sent_by_one_peer_reach_the_other() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let mut alice = offering(&store, &a).await;
    let mut bob = answering(&store, &b).await;

    a.script
        .notifier()
        .notify(Notification::ChannelOpened(a.channel("expressionData")));
    assert_eq!(next(&mut alice).await, Some(PeerEvent::ChannelOpen));
    alice.send_frame(&smile_frame()).await.unwrap();

    let wire = a.script.sent().remove(0);
    b.script
        .notifier()
        .notify(Notification::ChannelMessage(Bytes::from(wire)));
    assert_eq!(next(&mut bob).await, Some(PeerEvent::FrameReceived(smile_frame())));
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let _alice = offering(&store, &a).await;
    let mut bob = answering(&store, &b).await;

    let notifier = b.script.notifier();
    notifier.notify(Notification::ChannelMessage(Bytes::from_static(b"not json")));
    notifier.notify(Notification::ChannelMessage(Bytes::from_static(
        br#"{"expressions":{"smile":0.4}}"#,
    )));
    notifier.notify(Notification::ChannelMessage(Bytes::from_static(
        br#"{"expressions":{"blink":1.0},"headMovement":{"x":0.0,"y":0.0,"z":0.0}}"#,
    )));

    match next(&mut bob).await {
        Some(PeerEvent::FrameReceived(frame)) => {
            assert_eq!(frame.expressions.get(Expression::Blink), Some(1.0));
            assert_eq!(frame.expressions.get(Expression::Smile), None);
        }
        other => panic!("expected a frame, got {other:?}"),
    }
    assert_eq!(bob.state(), PeerState::Negotiating);
}

#[tokio::test]
async fn candidate_before_offer_waits_for_the_description() {
    let store = Arc::new(SignalingStore::new());
    let b = ScriptedConnector::new();
    let mut bob = peer(&store, &b, "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();

    store.submit(remote(
        SignalKind::Candidate,
        json!({ "candidate": HOST_CANDIDATE, "sdpMid": "0", "sdpMLineIndex": 0 }),
    ));
    assert_eq!(bob.poll_signaling().await.unwrap(), 1);
    assert_eq!(bob.pending_candidates(), 1);
    assert!(b.script.calls().is_empty());

    store.submit(remote(SignalKind::Offer, json!({ "type": "offer", "sdp": "v=0 remote" })));
    assert_eq!(bob.poll_signaling().await.unwrap(), 1);
    assert_eq!(bob.pending_candidates(), 0);

    let applied = format!("add_candidate:{HOST_CANDIDATE}");
    assert_eq!(b.script.count(&applied), 1);
    assert!(b.script.position("set_remote:offer") < b.script.position(&applied));
}

#[tokio::test]
async fn candidate_before_answer_waits_on_the_offerer() {
    let store = Arc::new(SignalingStore::new());
    let a = ScriptedConnector::new();
    let mut alice = offering(&store, &a).await;
    let applied = format!("add_candidate:{HOST_CANDIDATE}");

    store.submit(remote(
        SignalKind::Candidate,
        json!({ "candidate": HOST_CANDIDATE, "sdpMid": "0", "sdpMLineIndex": 0 }),
    ));
    assert_eq!(alice.poll_signaling().await.unwrap(), 1);
    assert_eq!(alice.pending_candidates(), 1);
    assert_eq!(a.script.count(&applied), 0);

    store.submit(remote(SignalKind::Answer, json!({ "type": "answer", "sdp": "v=0 remote" })));
    assert_eq!(alice.poll_signaling().await.unwrap(), 1);
    assert!(alice.remote_description_set());
    assert_eq!(alice.pending_candidates(), 0);

    assert_eq!(a.script.count(&applied), 1);
    let set_remote = a.script.position("set_remote:answer").unwrap();
    assert!(set_remote < a.script.position(&applied).unwrap());
}

#[tokio::test]
async fn candidates_after_the_description_apply_in_order() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let _alice = offering(&store, &a).await;
    let mut bob = answering(&store, &b).await;

    for n in 1..=3 {
        store.submit(
            NegotiationMessage::new(
                SignalKind::Candidate,
                SESSION,
                json!({ "candidate": format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host") }),
            )
            .from_peer("alice"),
        );
    }
    assert_eq!(bob.poll_signaling().await.unwrap(), 3);

    let applied: Vec<String> = b
        .script
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("add_candidate:"))
        .collect();
    assert_eq!(applied.len(), 3);
    assert!(applied[0].contains("candidate:1"));
    assert!(applied[2].contains("candidate:3"));
}

#[tokio::test]
async fn second_remote_description_is_refused() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let _alice = offering(&store, &a).await;
    let mut bob = answering(&store, &b).await;

    let again = remote(SignalKind::Offer, json!({ "type": "offer", "sdp": "v=0 again" }));
    assert!(matches!(
        bob.apply_remote(&again).await,
        Err(Error::UnexpectedRenegotiation)
    ));
    assert_eq!(bob.state(), PeerState::Negotiating);
    assert_eq!(b.script.count("set_remote:offer"), 1);

    // the same refusal through the polling path surfaces as an event
    store.submit(again);
    assert_eq!(bob.poll_signaling().await.unwrap(), 0);
    assert!(matches!(next(&mut bob).await, Some(PeerEvent::Rejected { .. })));
    assert_eq!(bob.state(), PeerState::Negotiating);
}

#[tokio::test]
async fn malformed_signal_is_rejected_and_skipped() {
    let store = Arc::new(SignalingStore::new());
    let b = ScriptedConnector::new();
    let mut bob = peer(&store, &b, "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();

    store.submit(remote(SignalKind::Offer, json!({ "sdp": 42 })));
    store.submit(remote(SignalKind::Offer, json!({ "type": "offer", "sdp": "v=0 ok" })));
    assert_eq!(bob.poll_signaling().await.unwrap(), 1);
    assert!(matches!(next(&mut bob).await, Some(PeerEvent::Rejected { .. })));
    assert_eq!(bob.state(), PeerState::Negotiating);
}

#[tokio::test]
async fn local_candidates_are_posted_until_gathering_completes() {
    let store = Arc::new(SignalingStore::new());
    let a = ScriptedConnector::new();
    let _alice = offering(&store, &a).await;

    let notifier = a.script.notifier();
    notifier.local_candidate(IceCandidate::new(HOST_CANDIDATE));
    notifier.local_candidate(IceCandidate::new(
        "candidate:2 1 udp 1686052607 203.0.113.7 50001 typ srflx raddr 10.0.0.1 rport 50000",
    ));
    notifier.gathering_complete();
    notifier.local_candidate(IceCandidate::new("candidate:9 1 udp 1 10.0.0.9 9 typ host"));

    assert!(eventually(|| store.drain(SESSION).len() == 3).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let queued = store.drain(SESSION);
    assert_eq!(queued.len(), 3);
    let kinds: Vec<SignalKind> = queued.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![SignalKind::Offer, SignalKind::Candidate, SignalKind::Candidate]);
    assert_eq!(queued[1].data["candidate"], HOST_CANDIDATE);
    assert!(queued.iter().all(|m| m.peer_id.as_deref() == Some("alice")));
}

#[tokio::test]
async fn failure_notification_is_terminal() {
    let store = Arc::new(SignalingStore::new());
    let a = ScriptedConnector::new();
    let mut alice = offering(&store, &a).await;

    a.script
        .notifier()
        .notify(Notification::StateChanged(ConnectionState::Disconnected));
    match next(&mut alice).await {
        Some(PeerEvent::Failed { reason }) => assert!(reason.contains("disconnected")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(alice.state(), PeerState::Failed);
    assert_eq!(next(&mut alice).await, None);
    assert!(matches!(
        alice.send_frame(&smile_frame()).await,
        Err(Error::ChannelNotOpen)
    ));
    assert_eq!(a.script.count("close"), 0);
}

#[tokio::test]
async fn closing_twice_is_a_no_op() {
    let store = Arc::new(SignalingStore::new());
    let a = ScriptedConnector::new();
    let mut alice = offering(&store, &a).await;
    let notifier = a.script.notifier();

    alice.close().await;
    alice.close().await;

    assert_eq!(alice.state(), PeerState::Closed);
    assert!(alice.local_media().is_none());
    assert_eq!(a.script.count("close"), 1);
    assert_eq!(a.script.count("channel_close"), 1);
    assert_eq!(next(&mut alice).await, Some(PeerEvent::Closed));
    assert_eq!(next(&mut alice).await, None);
    assert_eq!(alice.poll_signaling().await.unwrap(), 0);

    // gathering after close is not forwarded
    notifier.local_candidate(IceCandidate::new(HOST_CANDIDATE));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.drain(SESSION).len(), 1);
}

#[tokio::test]
async fn unavailable_device_is_reported() {
    let store = Arc::new(SignalingStore::new());
    let mut alice = peer(&store, &ScriptedConnector::new(), "alice");
    let err = alice
        .acquire_media(MediaConstraints { audio: true, video: true })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MediaUnavailable(_)));
    assert_eq!(alice.state(), PeerState::Idle);
}

#[tokio::test]
async fn unreachable_signaling_keeps_offer_retryable() {
    let a = ScriptedConnector::new();
    let mut alice = peer_with(&a, unreachable_transport(), "alice");
    alice.acquire_media(MediaConstraints::default()).await.unwrap();

    let err = alice.start_offer().await.unwrap_err();
    assert!(matches!(err, Error::TransportUnreachable(_)));
    assert_eq!(alice.state(), PeerState::LocalMediaReady);
    assert_eq!(alice.role(), None);
    assert_eq!(a.script.count("close"), 1);
}

#[tokio::test]
async fn polling_failure_pauses_automatic_polling() {
    let b = ScriptedConnector::new();
    let mut bob = peer_with(&b, unreachable_transport(), "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();

    assert!(matches!(
        next(&mut bob).await,
        Some(PeerEvent::SignalingFailed { .. })
    ));
    assert_eq!(next(&mut bob).await, None);
    assert!(matches!(
        bob.poll_signaling().await,
        Err(Error::TransportUnreachable(_))
    ));
    assert_eq!(bob.state(), PeerState::LocalMediaReady);
}

#[tokio::test]
async fn next_event_answers_in_the_background() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let _alice = offering(&store, &a).await;

    let mut bob = peer(&store, &b, "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();
    let waited = tokio::time::timeout(Duration::from_millis(200), bob.next_event()).await;
    assert!(waited.is_err());
    assert_eq!(bob.state(), PeerState::Negotiating);
    assert_eq!(store.drain(SESSION).len(), 2);
}

#[tokio::test]
async fn dropped_next_event_still_answers_exactly_once() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let _alice = offering(&store, &a).await;

    let slow = SlowPosts {
        inner: LocalTransport::new(store.clone()),
        delay: Duration::from_millis(100),
    };
    let mut bob = peer_with(&b, Arc::new(slow), "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();

    // give up while the answer is still being posted
    let gave_up = tokio::time::timeout(Duration::from_millis(50), bob.next_event()).await;
    assert!(gave_up.is_err());
    assert_eq!(bob.state(), PeerState::LocalMediaReady);
    assert_eq!(bob.role(), None);
    assert!(!bob.remote_description_set());

    // the next call finishes the answer instead of refusing the offer again
    let waited = tokio::time::timeout(Duration::from_millis(300), bob.next_event()).await;
    assert!(waited.is_err(), "unexpected event {waited:?}");
    assert_eq!(bob.state(), PeerState::Negotiating);
    assert_eq!(bob.role(), Some(Role::Answerer));
    assert_eq!(b.script.count("set_remote:offer"), 1);

    let answers = store
        .drain(SESSION)
        .into_iter()
        .filter(|m| m.kind == SignalKind::Answer)
        .count();
    assert_eq!(answers, 1);
}

#[tokio::test]
async fn dropped_poll_keeps_queued_candidates() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let _alice = offering(&store, &a).await;
    store.submit(
        NegotiationMessage::new(SignalKind::Candidate, SESSION, json!({ "candidate": HOST_CANDIDATE }))
            .from_peer("alice"),
    );

    let slow = SlowPosts {
        inner: LocalTransport::new(store.clone()),
        delay: Duration::from_millis(100),
    };
    let mut bob = peer_with(&b, Arc::new(slow), "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(50), bob.poll_signaling()).await;
    assert!(gave_up.is_err());

    // the interrupted answer is committed first, then the candidate is read
    assert_eq!(bob.poll_signaling().await.unwrap(), 2);
    assert_eq!(bob.state(), PeerState::Negotiating);
    let applied = format!("add_candidate:{HOST_CANDIDATE}");
    assert_eq!(b.script.count(&applied), 1);
    assert!(b.script.position("set_local:answer").unwrap() < b.script.position(&applied).unwrap());
}

#[tokio::test]
async fn recreated_queue_is_read_from_the_start() {
    let store = Arc::new(SignalingStore::new());
    let b = ScriptedConnector::new();
    let mut bob = peer(&store, &b, "bob");
    bob.acquire_media(MediaConstraints::default()).await.unwrap();

    // leftovers from an earlier run of this peer
    for n in 0..3 {
        store.submit(
            NegotiationMessage::new(SignalKind::Candidate, SESSION, json!({ "candidate": format!("stale {n}") }))
                .from_peer("bob"),
        );
    }
    assert_eq!(bob.poll_signaling().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.prune_idle(Duration::from_millis(5)), 1);

    store.submit(remote(SignalKind::Offer, json!({ "type": "offer", "sdp": "v=0 remote" })));
    for n in 1..=3 {
        store.submit(remote(
            SignalKind::Candidate,
            json!({ "candidate": format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host") }),
        ));
    }

    assert_eq!(bob.poll_signaling().await.unwrap(), 4);
    assert_eq!(bob.state(), PeerState::Negotiating);
    assert_eq!(b.script.count("set_remote:offer"), 1);
}

#[tokio::test]
async fn run_feeds_frames_to_the_sink_until_failure() {
    let store = Arc::new(SignalingStore::new());
    let (a, b) = (ScriptedConnector::new(), ScriptedConnector::new());
    let _alice = offering(&store, &a).await;
    let mut bob = answering(&store, &b).await;

    let notifier = b.script.notifier();
    notifier.notify(Notification::ChannelMessage(Bytes::from(
        avatar_rtc::expression::encode(&smile_frame()).unwrap(),
    )));
    notifier.notify(Notification::StateChanged(ConnectionState::Failed));

    let mut pose = AvatarPose::new();
    let end = tokio::time::timeout(Duration::from_secs(2), bob.run(&mut pose))
        .await
        .unwrap();
    assert_eq!(end, PeerState::Failed);
    assert_eq!(pose.frames_applied(), 1);
    assert_eq!(pose.target(Expression::Smile), Some(0.5));
}
