pub mod connection;
pub mod data_channel;
pub mod events;
pub mod ice;
pub mod media;
pub mod session;
pub mod state;
pub mod types;

pub use connection::{
    FrameChannel, Notification, NotificationReceivers, Notifier, PeerConnection, PeerConnector,
    RtcConnector,
};
pub use events::PeerEvent;
pub use media::{LocalMedia, MediaConstraints, MediaSource, SyntheticMediaSource, TrackKind};
pub use session::PeerSessionManager;
pub use state::{PeerState, Role};
pub use types::{
    ConnectionState, IceCandidate, IceServerKind, SdpKind, ServerConfig, SessionDescription,
};
