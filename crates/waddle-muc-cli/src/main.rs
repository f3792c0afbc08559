// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Waddle Social

//! Waddle MUC - replay a stanza transcript through the MUC session manager.
//!
//! Each non-empty line of the transcript is one inbound stanza. Lines
//! starting with `#` are comments. Channel events and the stanzas the
//! session manager would send are printed once the transcript is done.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use minidom::Element;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use waddle_caps::{initial_caps, verification_hash, CapabilitySet, FeatureRegistry, Identity};
use waddle_muc::{
    ChannelKind, HandleContext, HandleRef, HandleType, Handles, MucConfig, MucFactory,
    RecordingTransport,
};

/// muc-replay - transcript runner for the multi-user chat session manager
#[derive(Parser)]
#[command(name = "muc-replay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Account JID, used when no configuration file is given
    #[arg(short, long)]
    jid: Option<String>,

    /// Join this room before replaying the transcript (repeatable)
    #[arg(short, long = "request")]
    requests: Vec<String>,

    /// Print our entity capabilities verification string and exit
    #[arg(long)]
    caps: bool,

    /// Transcript of inbound stanzas, one per line
    transcript: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<MucConfig> {
    if let Some(path) = &cli.config {
        return MucConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }
    let Some(jid) = &cli.jid else {
        bail!("either --config or --jid is required");
    };
    MucConfig::from_toml_str(&format!("[account]\njid = \"{}\"\n", jid))
        .context("invalid account JID")
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_caps() -> Result<()> {
    let registry = FeatureRegistry::new();
    let pool = registry.init();
    let features = CapabilitySet::from_flags(&pool, initial_caps());
    let ver = verification_hash(&[Identity::client_pc("Waddle")], &features);
    println!("ver={}", ver);
    for ns in features.namespaces() {
        println!("  {}", ns);
    }
    registry.finalize()?;
    Ok(())
}

fn read_transcript(path: &Path) -> Result<Vec<Element>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read transcript {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            line.trim()
                .parse::<Element>()
                .with_context(|| format!("line {}: not a well-formed stanza", n + 1))
        })
        .collect()
}

fn render(element: &Element) -> String {
    let mut out = Vec::new();
    match element.write_to(&mut out) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(e) => format!("<unprintable: {}>", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.caps {
        return print_caps();
    }

    let config = load_config(&cli)?;
    init_tracing(&config.logging.level);

    let stanzas = match &cli.transcript {
        Some(path) => read_transcript(path)?,
        None => Vec::new(),
    };

    let (mut factory, mut events) =
        MucFactory::new(&config, RecordingTransport::new(), Handles::in_memory())?;
    factory.attach()?;

    // Requested rooms stay interned until the transcript is done.
    let mut rooms = Vec::new();
    for jid in &cli.requests {
        let room = HandleRef::ensure(&factory.handles().rooms, jid, HandleContext::Normal)
            .with_context(|| format!("invalid room {}", jid))?;
        match factory.request_channel(ChannelKind::Text, Some(HandleType::Room), Some(room.handle())) {
            Ok(outcome) => info!(room = %jid, ?outcome, "room requested"),
            Err(e) => warn!(room = %jid, error = %e, "room request failed"),
        }
        rooms.push(room);
    }

    let (tx, rx) = mpsc::channel(64);
    let runner = tokio::spawn(factory.run(rx));
    for stanza in stanzas {
        if tx.send(stanza).await.is_err() {
            break;
        }
    }
    drop(tx);
    let mut factory = runner.await.context("session manager task failed")?;
    debug!(rooms = rooms.len(), "transcript done");

    while let Ok(event) = events.try_recv() {
        println!("event: {:?}", event);
    }
    for stanza in factory.transport_mut().take_outbound() {
        println!("sent: {}", render(&stanza));
    }

    Ok(())
}
