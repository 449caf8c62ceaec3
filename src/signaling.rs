//! Session-keyed rendezvous for negotiation messages.
//!
//! Two peers that cannot reach each other directly post offers, answers and
//! ICE candidates into a shared per-session queue and poll it back.

pub mod store;
pub mod transport;
pub mod types;

pub use store::SignalingStore;
pub use transport::{HttpTransport, LocalTransport, SignalingTransport};
pub use types::{NegotiationMessage, SignalKind};
