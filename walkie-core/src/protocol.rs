//! Walkie wire protocol: message types carried over the single data channel.

use serde::{Deserialize, Serialize};

use crate::bearing::LocationSample;

/// All message kinds. Encoding is one JSON object per frame with a `type` discriminant (see wire module).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PeerMessage {
    /// Chat line and the sender's timestamp, as the sender formatted it.
    Chat {
        #[serde(rename = "message")]
        text: String,
        #[serde(rename = "timestamp")]
        sent_at: String,
    },
    /// Encrypted file. `data` is a sealed envelope (`iv || ciphertext`), base64 on the wire.
    File {
        filename: String,
        #[serde(rename = "size")]
        size_bytes: u64,
        #[serde(rename = "data", with = "base64_bytes")]
        ciphertext: Vec<u8>,
    },
    /// Webcam snapshot as a data URI.
    Snapshot {
        #[serde(rename = "data")]
        image_data: String,
    },
    /// Sender's current position.
    Location { lat: f64, lon: f64 },
}

impl PeerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            PeerMessage::Chat { .. } => MessageKind::Chat,
            PeerMessage::File { .. } => MessageKind::File,
            PeerMessage::Snapshot { .. } => MessageKind::Snapshot,
            PeerMessage::Location { .. } => MessageKind::Location,
        }
    }

    pub fn location(sample: LocationSample) -> Self {
        PeerMessage::Location {
            lat: sample.lat,
            lon: sample.lon,
        }
    }
}

/// Discriminant values understood by this version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Chat,
    File,
    Snapshot,
    Location,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Chat,
        MessageKind::File,
        MessageKind::Snapshot,
        MessageKind::Location,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::File => "file",
            MessageKind::Snapshot => "snapshot",
            MessageKind::Location => "location",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s: String = Deserialize::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
