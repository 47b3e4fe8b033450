// Walkie Linux: terminal peer over one WebRTC data channel.

mod config;
mod console;
mod peer;
mod rtc;

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "usage: walkie-linux <offer|answer> | --version";

fn main() -> Result<()> {
    let mut mode = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("walkie-linux {}", VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(());
            }
            "offer" => mode = Some(peer::Mode::Offer),
            "answer" => mode = Some(peer::Mode::Answer),
            other => bail!("unexpected argument {other:?}\n{USAGE}"),
        }
    }
    let Some(mode) = mode else {
        bail!("{USAGE}");
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load();
    if cfg.uses_demo_passphrase() {
        tracing::warn!("using the built-in demo passphrase; set WALKIE_PASSPHRASE to protect files");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        tokio::select! {
            res = peer::run(mode, cfg) => res,
            res = shutdown_signal() => {
                tracing::info!("interrupted");
                res
            }
        }
    })
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
