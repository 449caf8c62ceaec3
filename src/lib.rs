//! Real-time expression frames for a talking avatar over WebRTC.
//!
//! Two peers meet through a session-keyed signaling relay, negotiate a
//! direct connection and stream small expression frames over a data channel.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod expression;
pub mod logger;
pub mod peer;
pub mod signaling;
pub mod utils;

pub use error::{Error, Result};
pub use expression::{ExpressionFrame, ExpressionGenerator};
pub use peer::{PeerEvent, PeerSessionManager, PeerState};
pub use signaling::{SignalingStore, SignalingTransport};
