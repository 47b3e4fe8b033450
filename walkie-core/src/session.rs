//! Host-driven API: `Session` receives events from the host and returns frames to send
//! or deliveries to show.

use crate::bearing::{self, LocationSample};
use crate::connection::{Connection, ConnectionState, NegotiationError};
use crate::dispatch::{self, HandlerSet};
use crate::envelope::{self, DecryptionError, Key, SealError};
use crate::protocol::PeerMessage;
use crate::wire::{self, ProtocolError};

/// Compass state derived from the latest local and remote samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompassReading {
    /// Bearing from us to the peer, 0 = north.
    pub bearing_deg: f64,
    pub distance_m: f64,
    /// Arrow rotation for the current device heading; equals `bearing_deg` when heading is unknown.
    pub arrow_deg: f64,
}

/// Inbound message after decryption and state updates, ready for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Chat {
        text: String,
        sent_at: String,
    },
    File {
        filename: String,
        bytes: Vec<u8>,
    },
    Snapshot {
        data_uri: String,
    },
    Location {
        remote: LocationSample,
        compass: Option<CompassReading>,
    },
}

/// One page session: the connection, the shared key and both location samples.
pub struct Session {
    connection: Connection,
    key: Key,
    local_location: Option<LocationSample>,
    remote_location: Option<LocationSample>,
    heading: Option<f64>,
}

impl Session {
    pub fn new(key: Key) -> Self {
        Self::with_connection(key, Connection::new())
    }

    pub fn with_connection(key: Key, connection: Connection) -> Self {
        Self {
            connection,
            key,
            local_location: None,
            remote_location: None,
            heading: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Lifecycle events go through here; nothing else mutates the connection.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn local_location(&self) -> Option<LocationSample> {
        self.local_location
    }

    pub fn remote_location(&self) -> Option<LocationSample> {
        self.remote_location
    }

    /// Chat frame stamped with the current UTC time.
    pub fn chat(&self, text: &str) -> Result<String, SessionError> {
        self.ensure_open()?;
        let msg = PeerMessage::Chat {
            text: text.to_owned(),
            sent_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        };
        Ok(wire::encode(&msg)?)
    }

    /// Seal `bytes` and wrap them in a file frame.
    pub fn file(&self, filename: &str, bytes: &[u8]) -> Result<String, SessionError> {
        self.ensure_open()?;
        let sealed = envelope::seal(bytes, &self.key)?;
        let msg = PeerMessage::File {
            filename: filename.to_owned(),
            size_bytes: bytes.len() as u64,
            ciphertext: sealed.to_bytes(),
        };
        Ok(wire::encode(&msg)?)
    }

    pub fn snapshot(&self, data_uri: &str) -> Result<String, SessionError> {
        self.ensure_open()?;
        let msg = PeerMessage::Snapshot {
            image_data: data_uri.to_owned(),
        };
        Ok(wire::encode(&msg)?)
    }

    /// Record the local sample and build a location frame for the peer.
    pub fn share_location(&mut self, sample: LocationSample) -> Result<String, SessionError> {
        self.ensure_open()?;
        self.update_local_location(sample)?;
        Ok(wire::encode(&PeerMessage::location(sample))?)
    }

    /// Replace the local sample without sending it.
    pub fn update_local_location(
        &mut self,
        sample: LocationSample,
    ) -> Result<Option<CompassReading>, SessionError> {
        if !sample.is_valid() {
            return Err(SessionError::InvalidLocation(sample));
        }
        self.local_location = Some(sample);
        Ok(self.compass())
    }

    /// Device compass heading in degrees.
    pub fn set_heading(&mut self, heading: f64) -> Option<CompassReading> {
        if heading.is_finite() {
            self.heading = Some(heading);
        }
        self.compass()
    }

    pub fn compass(&self) -> Option<CompassReading> {
        let from = self.local_location?;
        let to = self.remote_location?;
        let bearing_deg = bearing::bearing(from, to);
        Some(CompassReading {
            bearing_deg,
            distance_m: bearing::distance_m(from, to),
            arrow_deg: match self.heading {
                Some(h) => bearing::relative_bearing(bearing_deg, h),
                None => bearing_deg,
            },
        })
    }

    /// Process one received frame. Errors are scoped to this frame; the channel
    /// stays up. Unknown kinds yield `Ok(None)`. Frames arriving while the
    /// channel is not open are dropped with `NotConnected`.
    pub fn on_frame(&mut self, frame: &str) -> Result<Option<Delivery>, SessionError> {
        self.ensure_open()?;
        match dispatch::dispatch_frame(frame, &mut Inbox { session: self })? {
            Some((_, delivery)) => delivery.map(Some),
            None => Ok(None),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.connection.is_open() {
            Ok(())
        } else {
            Err(SessionError::NotConnected(self.connection.state()))
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .field("local_location", &self.local_location)
            .field("remote_location", &self.remote_location)
            .field("heading", &self.heading)
            .finish_non_exhaustive()
    }
}

/// Inbound handlers bound to a session.
struct Inbox<'a> {
    session: &'a mut Session,
}

impl HandlerSet for Inbox<'_> {
    type Output = Result<Delivery, SessionError>;

    fn chat(&mut self, text: String, sent_at: String) -> Self::Output {
        Ok(Delivery::Chat { text, sent_at })
    }

    fn file(&mut self, filename: String, size_bytes: u64, sealed: Vec<u8>) -> Self::Output {
        let bytes = envelope::open_bytes(&sealed, &self.session.key).map_err(|source| {
            SessionError::Decryption {
                filename: filename.clone(),
                source,
            }
        })?;
        if bytes.len() as u64 != size_bytes {
            tracing::warn!(
                %filename,
                declared = size_bytes,
                actual = bytes.len(),
                "file size does not match declared size"
            );
        }
        Ok(Delivery::File { filename, bytes })
    }

    fn snapshot(&mut self, image_data: String) -> Self::Output {
        Ok(Delivery::Snapshot {
            data_uri: image_data,
        })
    }

    fn location(&mut self, sample: LocationSample) -> Self::Output {
        if !sample.is_valid() {
            return Err(SessionError::InvalidLocation(sample));
        }
        self.session.remote_location = Some(sample);
        Ok(Delivery::Location {
            remote: sample,
            compass: self.session.compass(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("channel not open (state {0})")]
    NotConnected(ConnectionState),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("could not encrypt file: {0}")]
    Seal(#[from] SealError),
    #[error("could not decrypt `{filename}`: {source}")]
    Decryption {
        filename: String,
        #[source]
        source: DecryptionError,
    },
    #[error("invalid location {0:?}")]
    InvalidLocation(LocationSample),
}
