// WebRTC transport: one peer connection, one ordered data channel.
// Callbacks only forward events; the peer task owns all state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, Mutex};
use walkie_core::{ChannelConfig, SdpKind, SessionDescription};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::config::Config;

/// Transport event delivered to the peer task.
#[derive(Debug)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Close,
    Error(String),
    PeerState(RTCPeerConnectionState),
}

pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;

/// Default SCTP max message size of the webrtc stack. Larger frames are refused.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Refuse frames the data channel cannot carry as one message.
pub fn check_frame_len(len: usize) -> Result<()> {
    if len > MAX_MESSAGE_LEN {
        bail!(
            "frame is {len} bytes, the data channel carries at most {MAX_MESSAGE_LEN}; \
             send a smaller file"
        );
    }
    Ok(())
}

pub struct Transport {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    events: EventSender,
    gather_timeout: Duration,
}

impl Transport {
    pub async fn new(cfg: &Config, events: EventSender) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if cfg.stun_urls.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: cfg.stun_urls.clone(),
                ..Default::default()
            }]
        };
        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .context("create peer connection")?,
        );

        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = tx.clone();
            Box::pin(async move {
                tracing::debug!(%state, "peer connection state");
                let _ = tx.send(ChannelEvent::PeerState(state));
            })
        }));

        let channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&channel);
        let tx = events.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let slot = Arc::clone(&slot);
            let tx = tx.clone();
            Box::pin(async move {
                tracing::info!(label = %dc.label(), "data channel announced by peer");
                wire_channel(&dc, tx);
                *slot.lock().await = Some(dc);
            })
        }));

        Ok(Self {
            pc,
            channel,
            events,
            gather_timeout: Duration::from_secs(cfg.gather_timeout_secs),
        })
    }

    /// Offering side: create the channel and the offer, then wait for gathering.
    pub async fn offer(&self, config: &ChannelConfig) -> Result<SessionDescription> {
        let init = RTCDataChannelInit {
            ordered: Some(config.ordered),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(&config.label, Some(init))
            .await
            .context("create data channel")?;
        wire_channel(&dc, self.events.clone());
        *self.channel.lock().await = Some(dc);

        let offer = self.pc.create_offer(None).await.context("create offer")?;
        self.pc
            .set_local_description(offer)
            .await
            .context("set local description")?;
        self.gathered(SdpKind::Offer).await
    }

    /// Answering side: apply the remote offer, create the answer, wait for gathering.
    pub async fn answer(&self, remote: &SessionDescription) -> Result<SessionDescription> {
        self.pc
            .set_remote_description(to_rtc(remote)?)
            .await
            .context("set remote offer")?;
        let answer = self.pc.create_answer(None).await.context("create answer")?;
        self.pc
            .set_local_description(answer)
            .await
            .context("set local description")?;
        self.gathered(SdpKind::Answer).await
    }

    /// Offering side: apply the pasted answer.
    pub async fn accept_answer(&self, remote: &SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc(remote)?)
            .await
            .context("set remote answer")
    }

    pub async fn send(&self, frame: String) -> Result<()> {
        check_frame_len(frame.len())?;
        let dc = self
            .channel
            .lock()
            .await
            .clone()
            .context("data channel not available")?;
        dc.send_text(frame).await.context("send frame")?;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if let Some(dc) = self.channel.lock().await.take() {
            let _ = dc.close().await;
        }
        self.pc.close().await.context("close peer connection")
    }

    /// Wait for end-of-candidates and return the complete local description.
    async fn gathered(&self, kind: SdpKind) -> Result<SessionDescription> {
        let mut done = self.pc.gathering_complete_promise().await;
        if tokio::time::timeout(self.gather_timeout, done.recv())
            .await
            .is_err()
        {
            bail!(
                "candidate gathering did not finish within {}s",
                self.gather_timeout.as_secs()
            );
        }
        let local = self
            .pc
            .local_description()
            .await
            .context("no local description after gathering")?;
        tracing::debug!(?kind, sdp_len = local.sdp.len(), "gathering complete");
        Ok(match kind {
            SdpKind::Offer => SessionDescription::offer(local.sdp),
            SdpKind::Answer => SessionDescription::answer(local.sdp),
        })
    }
}

fn to_rtc(desc: &SessionDescription) -> Result<RTCSessionDescription> {
    let sdp = desc.sdp.clone();
    Ok(match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
    })
}

fn wire_channel(dc: &Arc<RTCDataChannel>, tx: EventSender) {
    let open_tx = tx.clone();
    dc.on_open(Box::new(move || {
        let tx = open_tx.clone();
        Box::pin(async move {
            let _ = tx.send(ChannelEvent::Open);
        })
    }));

    let msg_tx = tx.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = msg_tx.clone();
        Box::pin(async move {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => {
                    let _ = tx.send(ChannelEvent::Message(text));
                }
                Err(_) => tracing::warn!(len = msg.data.len(), "dropping non-text frame"),
            }
        })
    }));

    let close_tx = tx.clone();
    dc.on_close(Box::new(move || {
        let tx = close_tx.clone();
        Box::pin(async move {
            let _ = tx.send(ChannelEvent::Close);
        })
    }));

    dc.on_error(Box::new(move |err: webrtc::Error| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(ChannelEvent::Error(err.to_string()));
        })
    }));
}
