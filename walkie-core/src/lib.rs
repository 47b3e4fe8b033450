//! Walkie peer protocol reference implementation.
//! Host-driven: no I/O; host passes events and receives frames and deliveries.

pub mod bearing;
pub mod connection;
pub mod data_uri;
pub mod dispatch;
pub mod envelope;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod wire;

pub use bearing::{bearing, distance_m, relative_bearing, LocationSample};
pub use connection::{
    ChannelConfig, Connection, ConnectionState, NegotiationError, Role, SdpKind,
    SessionDescription,
};
pub use dispatch::{dispatch, dispatch_frame, HandlerSet};
pub use envelope::{open, open_bytes, seal, DecryptionError, Envelope, Key, KeyError};
pub use presence::{MemoryPresence, PresenceClient, PresenceDirectory, PresenceRecord, SessionId};
pub use protocol::{MessageKind, PeerMessage};
pub use session::{CompassReading, Delivery, Session, SessionError};
pub use wire::{decode, encode, ProtocolError};
