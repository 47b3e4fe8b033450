//! Connection lifecycle for one data channel negotiated by manual description exchange.
//!
//! The host owns the actual peer connection. It tells `Connection` what happened
//! (gathering finished, blob pasted, channel opened/closed) and `Connection`
//! decides the state transition and which blob, if any, to hand to the user.

use serde::{Deserialize, Serialize};

/// Default label for the single data channel.
pub const DEFAULT_CHANNEL_LABEL: &str = "walkie";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    OfferCreated,
    AnswerAwaited,
    Connected,
    Closed,
    Failed,
}

impl ConnectionState {
    /// `Closed` and `Failed` only leave via `reset`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the channel and the offer.
    Offerer,
    /// Receives the channel and replies with an answer.
    Answerer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Connection description as exchanged out of band: `{"type": "...", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Text form for copy/paste or QR.
    pub fn serialize(&self) -> String {
        // A struct of two strings cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a pasted blob. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self, NegotiationError> {
        let desc: SessionDescription =
            serde_json::from_str(text.trim()).map_err(NegotiationError::Malformed)?;
        if desc.sdp.trim().is_empty() {
            return Err(NegotiationError::EmptySdp);
        }
        Ok(desc)
    }
}

/// How the host must allocate the data channel. Ordered delivery is required:
/// chat and location updates rely on send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub label: String,
    pub ordered: bool,
}

/// Lifecycle of one peer connection. Failure is terminal until `reset`.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    role: Option<Role>,
    label: String,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    channel_open: bool,
    failure: Option<String>,
}

impl Connection {
    pub fn new() -> Self {
        Self::with_label(DEFAULT_CHANNEL_LABEL)
    }

    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Idle,
            role: None,
            label: label.into(),
            local: None,
            remote: None,
            channel_open: false,
            failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote.as_ref()
    }

    /// Reason recorded by the transition into `Failed`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Connected and the channel's open event has fired.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Connected && self.channel_open
    }

    /// Local "initiate": `Idle -> OfferCreated`. The host allocates the channel with
    /// the returned config, registers its handlers, creates the offer and starts
    /// gathering candidates.
    pub fn initiate(&mut self) -> Result<ChannelConfig, NegotiationError> {
        self.expect_state(ConnectionState::Idle, "initiate")?;
        if self.role.is_some() {
            return Err(self.invalid("initiate"));
        }
        self.role = Some(Role::Offerer);
        self.transition(ConnectionState::OfferCreated);
        Ok(ChannelConfig {
            label: self.label.clone(),
            ordered: true,
        })
    }

    /// Answering side: accept the pasted offer. The state stays `Idle` until the
    /// host has created the answer and finished gathering. A bad blob fails the
    /// connection.
    pub fn accept_offer(&mut self, blob: &str) -> Result<SessionDescription, NegotiationError> {
        self.expect_state(ConnectionState::Idle, "accept offer")?;
        if self.role.is_some() {
            return Err(self.invalid("accept offer"));
        }
        let desc = match self.parse_remote(blob, SdpKind::Offer) {
            Ok(d) => d,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e);
            }
        };
        self.role = Some(Role::Answerer);
        self.remote = Some(desc.clone());
        tracing::debug!("remote offer accepted");
        Ok(desc)
    }

    /// End-of-candidates: the complete local description is known. Returns the
    /// blob the user must transfer to the peer.
    ///
    /// Offerer: `OfferCreated -> AnswerAwaited`. Answerer: `Idle -> Connected`.
    pub fn on_gathering_complete(
        &mut self,
        local: SessionDescription,
    ) -> Result<String, NegotiationError> {
        let (expected_state, expected_kind, next) = match self.role {
            Some(Role::Offerer) => (
                ConnectionState::OfferCreated,
                SdpKind::Offer,
                ConnectionState::AnswerAwaited,
            ),
            Some(Role::Answerer) => (
                ConnectionState::Idle,
                SdpKind::Answer,
                ConnectionState::Connected,
            ),
            None => return Err(self.invalid("gathering complete")),
        };
        self.expect_state(expected_state, "gathering complete")?;
        if local.kind != expected_kind {
            let err = NegotiationError::UnexpectedKind {
                expected: expected_kind,
                found: local.kind,
            };
            self.fail(err.to_string());
            return Err(err);
        }
        let blob = local.serialize();
        self.local = Some(local);
        self.transition(next);
        Ok(blob)
    }

    /// Offering side: accept the pasted answer, `AnswerAwaited -> Connected`.
    /// Anything else (no local description yet, bad blob, wrong kind) fails the connection.
    pub fn accept_answer(&mut self, blob: &str) -> Result<SessionDescription, NegotiationError> {
        if self.state.is_terminal() || self.state == ConnectionState::Connected {
            return Err(self.invalid("accept answer"));
        }
        if self.local.is_none() || self.role != Some(Role::Offerer) {
            self.fail(NegotiationError::NoLocalDescription.to_string());
            return Err(NegotiationError::NoLocalDescription);
        }
        if self.state != ConnectionState::AnswerAwaited {
            let err = self.invalid("accept answer");
            self.fail(err.to_string());
            return Err(err);
        }
        let desc = match self.parse_remote(blob, SdpKind::Answer) {
            Ok(d) => d,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e);
            }
        };
        self.remote = Some(desc.clone());
        self.transition(ConnectionState::Connected);
        Ok(desc)
    }

    /// Host-reported negotiation error. Not retried.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.state == ConnectionState::Failed {
            return;
        }
        tracing::warn!(from = %self.state, %reason, "connection failed");
        self.failure = Some(reason);
        self.channel_open = false;
        self.transition(ConnectionState::Failed);
    }

    /// Channel open event. Only meaningful once `Connected`.
    pub fn on_channel_open(&mut self) -> Result<(), NegotiationError> {
        if self.state != ConnectionState::Connected {
            return Err(self.invalid("channel open"));
        }
        tracing::info!(label = %self.label, "data channel open");
        self.channel_open = true;
        Ok(())
    }

    /// Channel close event: `Connected -> Closed`. A close before the connection
    /// was established counts as a failed negotiation.
    pub fn on_channel_close(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                self.channel_open = false;
                self.transition(ConnectionState::Closed);
            }
            ConnectionState::Closed | ConnectionState::Failed => {}
            _ => self.fail("channel closed during negotiation"),
        }
    }

    /// Channel error event. After connection the close event follows and decides
    /// the state; before it, the negotiation fails.
    pub fn on_channel_error(&mut self, reason: &str) {
        match self.state {
            ConnectionState::Connected => {
                tracing::warn!(%reason, "data channel error");
            }
            ConnectionState::Closed | ConnectionState::Failed => {}
            _ => self.fail(format!("channel error: {reason}")),
        }
    }

    /// Peer connection reported failure. Once connected this ends the session
    /// like a close; before that the negotiation fails.
    pub fn on_transport_failed(&mut self, reason: &str) {
        match self.state {
            ConnectionState::Connected => {
                tracing::warn!(%reason, "transport lost");
                self.on_channel_close();
            }
            _ => self.fail(format!("transport failed: {reason}")),
        }
    }

    /// Fresh `Idle`, as after a page reload.
    pub fn reset(&mut self) {
        tracing::debug!(from = %self.state, "connection reset");
        *self = Self::with_label(std::mem::take(&mut self.label));
    }

    fn parse_remote(
        &self,
        blob: &str,
        expected: SdpKind,
    ) -> Result<SessionDescription, NegotiationError> {
        let desc = SessionDescription::parse(blob)?;
        if desc.kind != expected {
            return Err(NegotiationError::UnexpectedKind {
                expected,
                found: desc.kind,
            });
        }
        Ok(desc)
    }

    fn expect_state(
        &self,
        expected: ConnectionState,
        action: &'static str,
    ) -> Result<(), NegotiationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> NegotiationError {
        NegotiationError::InvalidTransition {
            from: self.state,
            action,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::debug!(from = %self.state, to = %next, "connection state");
        self.state = next;
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("malformed connection description: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("connection description has an empty sdp")]
    EmptySdp,
    #[error("expected {expected:?} description, got {found:?}")]
    UnexpectedKind { expected: SdpKind, found: SdpKind },
    #[error("no local description yet")]
    NoLocalDescription,
    #[error("cannot {action} in state {from}")]
    InvalidTransition {
        from: ConnectionState,
        action: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER_SDP: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\n";
    const ANSWER_SDP: &str = "v=0\r\no=- 3 4 IN IP4 127.0.0.1\r\ns=-\r\n";

    fn answer_blob() -> String {
        SessionDescription::answer(ANSWER_SDP).serialize()
    }

    #[test]
    fn offerer_happy_path() {
        let mut c = Connection::new();
        assert_eq!(c.state(), ConnectionState::Idle);

        let cfg = c.initiate().unwrap();
        assert!(cfg.ordered);
        assert_eq!(cfg.label, DEFAULT_CHANNEL_LABEL);
        assert_eq!(c.state(), ConnectionState::OfferCreated);

        let blob = c
            .on_gathering_complete(SessionDescription::offer(OFFER_SDP))
            .unwrap();
        assert_eq!(c.state(), ConnectionState::AnswerAwaited);
        assert_eq!(
            SessionDescription::parse(&blob).unwrap(),
            SessionDescription::offer(OFFER_SDP)
        );

        c.accept_answer(&answer_blob()).unwrap();
        assert_eq!(c.state(), ConnectionState::Connected);
        assert!(!c.is_open());
        // Pasting the answer twice does not tear the connection down.
        assert!(c.accept_answer(&answer_blob()).is_err());
        assert_eq!(c.state(), ConnectionState::Connected);
        c.on_channel_open().unwrap();
        assert!(c.is_open());

        c.on_channel_close();
        assert_eq!(c.state(), ConnectionState::Closed);
        assert!(!c.is_open());
    }

    #[test]
    fn answerer_skips_offer_states() {
        let mut c = Connection::new();
        let offer = SessionDescription::offer(OFFER_SDP).serialize();
        c.accept_offer(&offer).unwrap();
        assert_eq!(c.role(), Some(Role::Answerer));
        assert_eq!(c.state(), ConnectionState::Idle);

        let blob = c
            .on_gathering_complete(SessionDescription::answer(ANSWER_SDP))
            .unwrap();
        assert_eq!(c.state(), ConnectionState::Connected);
        assert_eq!(SessionDescription::parse(&blob).unwrap().kind, SdpKind::Answer);
        c.on_channel_open().unwrap();
        assert!(c.is_open());
    }

    #[test]
    fn accept_answer_without_local_description_fails() {
        let mut c = Connection::new();
        let err = c.accept_answer(&answer_blob()).unwrap_err();
        assert!(matches!(err, NegotiationError::NoLocalDescription));
        assert_eq!(c.state(), ConnectionState::Failed);
        assert!(c.failure().is_some());
    }

    #[test]
    fn accept_answer_before_gathering_fails() {
        let mut c = Connection::new();
        c.initiate().unwrap();
        assert!(c.accept_answer(&answer_blob()).is_err());
        assert_eq!(c.state(), ConnectionState::Failed);
    }

    #[test]
    fn malformed_answer_fails() {
        let mut c = Connection::new();
        c.initiate().unwrap();
        c.on_gathering_complete(SessionDescription::offer(OFFER_SDP))
            .unwrap();
        let err = c.accept_answer("{\"type\":\"answer\"").unwrap_err();
        assert!(matches!(err, NegotiationError::Malformed(_)));
        assert_eq!(c.state(), ConnectionState::Failed);
    }

    #[test]
    fn malformed_offer_fails() {
        let mut c = Connection::new();
        let err = c.accept_offer("{not json").unwrap_err();
        assert!(matches!(err, NegotiationError::Malformed(_)));
        assert_eq!(c.state(), ConnectionState::Failed);
        assert!(c.failure().is_some());

        let mut c = Connection::new();
        let err = c
            .accept_offer(&SessionDescription::answer("v=0").serialize())
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::UnexpectedKind {
                expected: SdpKind::Offer,
                found: SdpKind::Answer
            }
        ));
        assert_eq!(c.state(), ConnectionState::Failed);
    }

    #[test]
    fn transport_failure_closes_once_connected() {
        let mut c = Connection::new();
        c.initiate().unwrap();
        c.on_gathering_complete(SessionDescription::offer(OFFER_SDP))
            .unwrap();
        c.on_transport_failed("ice failed");
        assert_eq!(c.state(), ConnectionState::Failed);

        let mut c = Connection::new();
        c.initiate().unwrap();
        c.on_gathering_complete(SessionDescription::offer(OFFER_SDP))
            .unwrap();
        c.accept_answer(&answer_blob()).unwrap();
        c.on_channel_open().unwrap();
        c.on_transport_failed("ice failed");
        assert_eq!(c.state(), ConnectionState::Closed);
        assert!(c.failure().is_none());
        assert!(!c.is_open());
    }

    #[test]
    fn offer_pasted_as_answer_fails() {
        let mut c = Connection::new();
        c.initiate().unwrap();
        c.on_gathering_complete(SessionDescription::offer(OFFER_SDP))
            .unwrap();
        let err = c
            .accept_answer(&SessionDescription::offer(OFFER_SDP).serialize())
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::UnexpectedKind {
                expected: SdpKind::Answer,
                found: SdpKind::Offer
            }
        ));
        assert_eq!(c.state(), ConnectionState::Failed);
    }

    #[test]
    fn failure_is_terminal_until_reset() {
        let mut c = Connection::with_label("walkie-test");
        c.fail("ice failed");
        assert_eq!(c.state(), ConnectionState::Failed);
        assert!(matches!(
            c.initiate(),
            Err(NegotiationError::InvalidTransition {
                from: ConnectionState::Failed,
                ..
            })
        ));
        assert!(c.accept_answer(&answer_blob()).is_err());
        assert_eq!(c.failure(), Some("ice failed"));

        c.reset();
        assert_eq!(c.state(), ConnectionState::Idle);
        assert!(c.failure().is_none());
        assert_eq!(c.initiate().unwrap().label, "walkie-test");
    }

    #[test]
    fn close_or_error_during_negotiation_fails() {
        let mut c = Connection::new();
        c.initiate().unwrap();
        c.on_channel_close();
        assert_eq!(c.state(), ConnectionState::Failed);

        let mut c = Connection::new();
        c.initiate().unwrap();
        c.on_channel_error("sctp abort");
        assert_eq!(c.state(), ConnectionState::Failed);
    }

    #[test]
    fn error_after_connect_waits_for_close() {
        let mut c = Connection::new();
        c.initiate().unwrap();
        c.on_gathering_complete(SessionDescription::offer(OFFER_SDP))
            .unwrap();
        c.accept_answer(&answer_blob()).unwrap();
        c.on_channel_open().unwrap();
        c.on_channel_error("transient");
        assert!(c.is_open());
        c.on_channel_close();
        assert_eq!(c.state(), ConnectionState::Closed);
    }

    #[test]
    fn channel_open_before_connect_is_rejected() {
        let mut c = Connection::new();
        assert!(c.on_channel_open().is_err());
        assert_eq!(c.state(), ConnectionState::Idle);
    }

    #[test]
    fn cannot_initiate_twice_or_after_accepting_offer() {
        let mut c = Connection::new();
        c.initiate().unwrap();
        assert!(c.initiate().is_err());

        let mut c = Connection::new();
        c.accept_offer(&SessionDescription::offer(OFFER_SDP).serialize())
            .unwrap();
        assert!(c.initiate().is_err());
    }

    #[test]
    fn parse_rejects_bad_blobs() {
        assert!(matches!(
            SessionDescription::parse("not json"),
            Err(NegotiationError::Malformed(_))
        ));
        assert!(matches!(
            SessionDescription::parse(r#"{"type":"pranswer","sdp":"v=0"}"#),
            Err(NegotiationError::Malformed(_))
        ));
        assert!(matches!(
            SessionDescription::parse(r#"{"type":"offer","sdp":"  "}"#),
            Err(NegotiationError::EmptySdp)
        ));
        let ok = SessionDescription::parse("  {\"type\":\"offer\",\"sdp\":\"v=0\"}\n").unwrap();
        assert_eq!(ok.kind, SdpKind::Offer);
    }
}
