//! Terminal peer: negotiation over stdin/stdout, then the console loop.
//!
//! All `Session` access happens on this task; transport callbacks arrive as
//! `ChannelEvent`s through an mpsc channel.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use walkie_core::connection::Connection;
use walkie_core::data_uri;
use walkie_core::{CompassReading, Delivery, Key, LocationSample, Session, SessionError};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::config::Config;
use crate::console::{self, Command};
use crate::rtc::{ChannelEvent, Transport};

type Input = Lines<BufReader<Stdin>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Offer,
    Answer,
}

pub async fn run(mode: Mode, cfg: Config) -> Result<()> {
    let key = Key::from_passphrase(&cfg.passphrase).context("invalid passphrase")?;
    let mut session = Session::with_connection(key, Connection::with_label(cfg.channel_label.clone()));
    let (tx, mut events) = mpsc::unbounded_channel();
    let transport = Transport::new(&cfg, tx).await?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let negotiated = match mode {
        Mode::Offer => offer(&mut session, &transport, &mut input).await,
        Mode::Answer => answer(&mut session, &transport, &mut input).await,
    };
    if let Err(e) = negotiated {
        session.connection_mut().fail(format!("{e:#}"));
        let _ = transport.close().await;
        return Err(e);
    }

    eprintln!("waiting for the channel to open...");
    let result = console_loop(&mut session, &transport, &mut events, &mut input, &cfg.download_dir).await;
    let _ = transport.close().await;
    tracing::info!(state = %session.state(), "session ended");
    result
}

async fn offer(session: &mut Session, transport: &Transport, input: &mut Input) -> Result<()> {
    let channel = session.connection_mut().initiate()?;
    let local = transport.offer(&channel).await?;
    let blob = session.connection_mut().on_gathering_complete(local)?;
    eprintln!("send this offer to your peer:");
    println!("{blob}");
    eprintln!("paste the answer:");
    let line = next_blob(input).await?;
    let remote = session.connection_mut().accept_answer(&line)?;
    transport.accept_answer(&remote).await?;
    tracing::info!("answer applied");
    Ok(())
}

async fn answer(session: &mut Session, transport: &Transport, input: &mut Input) -> Result<()> {
    eprintln!("paste the offer:");
    let line = next_blob(input).await?;
    let remote = session.connection_mut().accept_offer(&line)?;
    let local = transport.answer(&remote).await?;
    let blob = session.connection_mut().on_gathering_complete(local)?;
    eprintln!("send this answer to your peer:");
    println!("{blob}");
    Ok(())
}

async fn next_blob(input: &mut Input) -> Result<String> {
    while let Some(line) = input.next_line().await.context("read stdin")? {
        if !line.trim().is_empty() {
            return Ok(line);
        }
    }
    bail!("stdin closed before a description was pasted")
}

async fn console_loop(
    session: &mut Session,
    transport: &Transport,
    events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    input: &mut Input,
    download_dir: &Path,
) -> Result<()> {
    let mut stdin_open = true;
    loop {
        tokio::select! {
            ev = events.recv() => {
                let Some(ev) = ev else { break };
                if !on_event(session, ev, download_dir).await {
                    break;
                }
            }
            line = input.next_line(), if stdin_open => {
                match line.context("read stdin")? {
                    Some(line) => {
                        if !on_line(session, transport, &line).await {
                            break;
                        }
                    }
                    None => stdin_open = false,
                }
            }
        }
    }
    if let Some(reason) = session.connection().failure() {
        bail!("connection failed: {reason}");
    }
    Ok(())
}

/// Returns false once the session is over.
async fn on_event(session: &mut Session, ev: ChannelEvent, download_dir: &Path) -> bool {
    match ev {
        ChannelEvent::Open => {
            if let Err(e) = session.connection_mut().on_channel_open() {
                tracing::warn!(error = %e, "unexpected channel open");
                return true;
            }
            tracing::info!("channel open");
            eprintln!("connected. type a message or /help");
        }
        ChannelEvent::Close => {
            session.connection_mut().on_channel_close();
            eprintln!("peer closed the channel");
            return false;
        }
        ChannelEvent::Error(reason) => session.connection_mut().on_channel_error(&reason),
        ChannelEvent::PeerState(RTCPeerConnectionState::Failed) => {
            session.connection_mut().on_transport_failed("peer connection failed");
            eprintln!("connection to the peer was lost");
            return false;
        }
        ChannelEvent::PeerState(state) => tracing::debug!(%state, "peer connection"),
        ChannelEvent::Message(frame) => match session.on_frame(&frame) {
            Ok(Some(delivery)) => {
                if let Err(e) = show(delivery, download_dir).await {
                    eprintln!("! {e:#}");
                }
            }
            Ok(None) => {}
            Err(e @ SessionError::Decryption { .. }) => eprintln!("! {e}"),
            Err(e) => tracing::warn!(error = %e, "dropping frame"),
        },
    }
    !session.state().is_terminal()
}

/// Returns false on /quit.
async fn on_line(session: &mut Session, transport: &Transport, line: &str) -> bool {
    let cmd = match console::parse(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return true,
        Err(e) => {
            eprintln!("! {e:#}");
            return true;
        }
    };
    match run_command(session, transport, cmd).await {
        Ok(go_on) => go_on,
        Err(e) => {
            eprintln!("! {e:#}");
            true
        }
    }
}

async fn run_command(session: &mut Session, transport: &Transport, cmd: Command) -> Result<bool> {
    match cmd {
        Command::Chat(text) => transport.send(session.chat(&text)?).await?,
        Command::File(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("read {}", path.display()))?;
            let name = file_name(&path)?;
            transport.send(session.file(&name, &bytes)?).await?;
            eprintln!("sent {name} ({} bytes, encrypted)", bytes.len());
        }
        Command::Snap(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("read {}", path.display()))?;
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let mime = data_uri::mime_for_extension(ext);
            transport.send(session.snapshot(&data_uri::encode(mime, &bytes))?).await?;
            eprintln!("snapshot sent");
        }
        Command::Loc { lat, lon } => {
            let frame = session.share_location(LocationSample::new(lat, lon))?;
            transport.send(frame).await?;
            print_compass(session.compass());
        }
        Command::Heading(deg) => print_compass(session.set_heading(deg)),
        Command::Where => print_compass(session.compass()),
        Command::Help => eprintln!("{}", console::HELP),
        Command::Quit => {
            session.connection_mut().on_channel_close();
            return Ok(false);
        }
    }
    Ok(true)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .with_context(|| format!("no file name in {}", path.display()))
}

async fn show(delivery: Delivery, download_dir: &Path) -> Result<()> {
    match delivery {
        Delivery::Chat { text, sent_at } => println!("[{sent_at}] peer: {text}"),
        Delivery::File { filename, bytes } => {
            let path = save(download_dir, &console::sanitize_filename(&filename), &bytes).await?;
            println!("received file {filename} ({} bytes) -> {}", bytes.len(), path.display());
        }
        Delivery::Snapshot { data_uri: uri } => {
            let (mime, bytes) = data_uri::decode(&uri).context("bad snapshot")?;
            let name = format!("snapshot.{}", data_uri::extension_for(&mime));
            let path = save(download_dir, &name, &bytes).await?;
            println!("received snapshot ({mime}) -> {}", path.display());
        }
        Delivery::Location { remote, compass } => {
            println!("peer is at {:.5}, {:.5}", remote.lat, remote.lon);
            print_compass(compass);
        }
    }
    Ok(())
}

async fn save(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create {}", dir.display()))?;
    let path = console::unique_path(dir, name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn print_compass(reading: Option<CompassReading>) {
    match reading {
        Some(r) => println!(
            "peer: {:.0} m, bearing {:.1}°, arrow {:.1}°",
            r.distance_m, r.bearing_deg, r.arrow_deg
        ),
        None => eprintln!("need both positions for a bearing (/loc, and one from the peer)"),
    }
}
