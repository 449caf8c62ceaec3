use crate::error::Result;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::data_channel::{attach_dc, RtcFrameChannel};
use crate::peer::media::LocalMedia;
use crate::peer::types::{ConnectionState, IceCandidate, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::track::track_local::TrackLocal;
use webrtc::{
    api::APIBuilder,
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        RTCPeerConnection,
    },
};

/// Asynchronous signal raised by the connection backend.
pub enum Notification {
    StateChanged(ConnectionState),
    ChannelOpened(Arc<dyn FrameChannel>),
    ChannelMessage(Bytes),
    ChannelClosed,
    /// A candidate could not be posted to the signaling transport.
    SignalingFailed(String),
}

/// Receiving halves paired with a [`Notifier`].
pub struct NotificationReceivers {
    /// Local candidates in gathering order; `None` marks end-of-candidates.
    pub candidates: mpsc::UnboundedReceiver<Option<IceCandidate>>,
    pub events: mpsc::UnboundedReceiver<Notification>,
}

/// Sending side handed to a connection backend.
///
/// Sends after the session dropped its receivers are discarded.
#[derive(Clone)]
pub struct Notifier {
    candidates: mpsc::UnboundedSender<Option<IceCandidate>>,
    events: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Notifier, NotificationReceivers) {
        let (candidates_tx, candidates_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Notifier {
                candidates: candidates_tx,
                events: events_tx,
            },
            NotificationReceivers {
                candidates: candidates_rx,
                events: events_rx,
            },
        )
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        let _ = self.candidates.send(Some(candidate));
    }

    pub fn gathering_complete(&self) {
        let _ = self.candidates.send(None);
    }

    pub fn notify(&self, notification: Notification) {
        let _ = self.events.send(notification);
    }
}

/// Message stream opened once negotiation completes.
#[async_trait]
pub trait FrameChannel: Send + Sync {
    fn label(&self) -> String;

    async fn send_text(&self, text: String) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// One peer-to-peer connection as seen by the session state machine.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_media(&self, media: &LocalMedia) -> Result<()>;

    /// Must be called before the offer is created so the offer advertises it.
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn FrameChannel>>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Factory for connections; the backend reports through `notifier`.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, notifier: Notifier) -> Result<Arc<dyn PeerConnection>>;
}

/// [`PeerConnector`] backed by the `webrtc` crate.
#[derive(Debug, Clone)]
pub struct RtcConnector {
    ice_servers: Vec<ServerConfig>,
}

impl RtcConnector {
    pub fn new(ice_servers: Vec<ServerConfig>) -> Self {
        Self { ice_servers }
    }
}

/// Peer connection configuration for the given ICE servers.
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

fn map_state(st: RTCPeerConnectionState) -> ConnectionState {
    match st {
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
        _ => ConnectionState::New,
    }
}

#[async_trait]
impl PeerConnector for RtcConnector {
    async fn connect(&self, notifier: Notifier) -> Result<Arc<dyn PeerConnection>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(&self.ice_servers)).await?);

        let n = notifier.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let n = n.clone();
            Box::pin(async move {
                match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => {
                            let candidate = IceCandidate::from(init);
                            dump_candidate("LOCAL", &candidate);
                            n.local_candidate(candidate);
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to serialize local candidate"),
                    },
                    None => {
                        tracing::debug!("ICE candidate gathering completed");
                        n.gathering_complete();
                    }
                }
            })
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            tracing::debug!(?state, "ICE gathering state changed");
            Box::pin(async {})
        }));

        let n = notifier.clone();
        let weak = Arc::downgrade(&pc);
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            tracing::info!(state = %st, "peer connection state changed");
            if matches!(
                st,
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed
            ) {
                if let Some(pc) = weak.upgrade() {
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, "BEFORE-FAIL").await;
                    });
                }
            }
            n.notify(Notification::StateChanged(map_state(st)));
            Box::pin(async {})
        }));

        // the answering side adopts the channel the offer advertised
        let n = notifier.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            tracing::debug!(label = dc.label(), "remote data channel announced");
            attach_dc(&dc, n.clone());
            Box::pin(async {})
        }));

        Ok(Arc::new(RtcPeerConnection { pc, notifier }))
    }
}

pub struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
    notifier: Notifier,
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn add_media(&self, media: &LocalMedia) -> Result<()> {
        for (kind, track) in media.tracks() {
            let track: Arc<dyn TrackLocal + Send + Sync> = track.clone();
            let sender = self.pc.add_track(track).await?;
            tracing::debug!(?kind, "local track added");
            // drain RTCP so interceptors keep working
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn FrameChannel>> {
        let dc = self
            .pc
            .create_data_channel(label, Some(RTCDataChannelInit::default()))
            .await?;
        attach_dc(&dc, self.notifier.clone());
        Ok(Arc::new(RtcFrameChannel::new(dc)))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.pc.create_offer(None).await?.try_into()
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.pc.create_answer(None).await?.try_into()
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(desc.try_into()?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(desc.try_into()?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        dump_candidate("REMOTE", &candidate);
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
