//! Route a decoded message to exactly one handler.

use crate::bearing::LocationSample;
use crate::protocol::{MessageKind, PeerMessage};
use crate::wire::{self, ProtocolError};

/// One handler per message kind. Adding a kind to `PeerMessage` breaks every
/// implementor until it is handled.
pub trait HandlerSet {
    type Output;

    fn chat(&mut self, text: String, sent_at: String) -> Self::Output;
    fn file(&mut self, filename: String, size_bytes: u64, sealed: Vec<u8>) -> Self::Output;
    fn snapshot(&mut self, image_data: String) -> Self::Output;
    fn location(&mut self, sample: LocationSample) -> Self::Output;
}

pub fn dispatch<H: HandlerSet>(msg: PeerMessage, handlers: &mut H) -> H::Output {
    match msg {
        PeerMessage::Chat { text, sent_at } => handlers.chat(text, sent_at),
        PeerMessage::File {
            filename,
            size_bytes,
            ciphertext,
        } => handlers.file(filename, size_bytes, ciphertext),
        PeerMessage::Snapshot { image_data } => handlers.snapshot(image_data),
        PeerMessage::Location { lat, lon } => handlers.location(LocationSample { lat, lon }),
    }
}

/// Decode and dispatch one frame. Unknown kinds are logged and yield `Ok(None)`;
/// any other decode failure is returned so the caller can drop the frame.
pub fn dispatch_frame<H: HandlerSet>(
    frame: &str,
    handlers: &mut H,
) -> Result<Option<(MessageKind, H::Output)>, ProtocolError> {
    match wire::decode(frame) {
        Ok(msg) => {
            let kind = msg.kind();
            tracing::trace!(%kind, "dispatching frame");
            Ok(Some((kind, dispatch(msg, handlers))))
        }
        Err(ProtocolError::UnsupportedKind(tag)) => {
            tracing::warn!(kind = %tag, "ignoring frame of unsupported kind");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
