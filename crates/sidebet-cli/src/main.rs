//! Sidebet CLI - operator tooling for the private-market encryption subsystem
//!
//! Bundles, initial messages and envelopes are read and written as JSON with
//! hex-encoded key material, matching what the dApp publishes to external
//! storage.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sidebet_app::MarketClient;
use sidebet_core::crypto::{InitialMessage, KeyBundle};
use sidebet_core::EncryptedEnvelope;

/// Sidebet - encrypted private markets between friends
#[derive(Parser)]
#[command(name = "sidebet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(long, env = "SIDEBET_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new identity from a wallet-derived seed
    Init {
        /// 32-byte identity seed, hex-encoded (random if omitted)
        #[arg(long)]
        seed: Option<String>,
    },

    /// Show your identity information
    Identity,

    /// Generate a fresh key bundle and print the publishable half
    Bundle {
        /// Write the bundle JSON to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Start a session with a counterparty from their bundle
    Invite {
        /// Path to the counterparty's bundle JSON
        bundle: PathBuf,
        /// Write the initial message JSON to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Accept a session from a counterparty's initial message
    Accept {
        /// Path to the initial message JSON
        message: PathBuf,
    },

    /// List established sessions
    Sessions,

    /// Encrypt market metadata for a counterparty
    Seal {
        /// Counterparty fingerprint
        peer: String,
        /// Path to the payload JSON (stdin if omitted)
        #[arg(short, long)]
        payload: Option<PathBuf>,
        /// Write the envelope JSON to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Decrypt an envelope from a counterparty
    Open {
        /// Counterparty fingerprint
        peer: String,
        /// Path to the envelope JSON
        envelope: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sidebet")
    });

    let mut client = MarketClient::new(&data_dir);

    match cli.command {
        Commands::Init { seed } => cmd_init(&mut client, seed.as_deref())?,
        Commands::Identity => cmd_identity(&mut client)?,
        Commands::Bundle { out } => cmd_bundle(&mut client, out.as_deref())?,
        Commands::Invite { bundle, out } => cmd_invite(&mut client, &bundle, out.as_deref())?,
        Commands::Accept { message } => cmd_accept(&mut client, &message)?,
        Commands::Sessions => cmd_sessions(&mut client)?,
        Commands::Seal { peer, payload, out } => {
            cmd_seal(&mut client, &peer, payload.as_deref(), out.as_deref())?
        }
        Commands::Open { peer, envelope } => cmd_open(&mut client, &peer, &envelope)?,
    }

    Ok(())
}

fn prompt_password(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let password = rpassword::read_password()?;
    Ok(password)
}

fn unlock_client(client: &mut MarketClient) -> Result<String> {
    if !client.is_initialized() {
        anyhow::bail!("Not initialized. Run 'sidebet init' first.");
    }

    let password = prompt_password("Password: ")?;
    client
        .unlock(&password)
        .context("Failed to unlock. Wrong password?")?;

    Ok(password)
}

fn cmd_init(client: &mut MarketClient, seed_hex: Option<&str>) -> Result<()> {
    if client.is_initialized() {
        anyhow::bail!("Already initialized. Use a different data directory or delete the existing one.");
    }

    let seed: [u8; 32] = match seed_hex {
        Some(s) => hex::decode(s)
            .context("Seed must be hex")?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Seed must be exactly 32 bytes"))?,
        None => {
            use rand::RngCore;
            let mut bytes = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            bytes
        }
    };

    println!("Creating new Sidebet identity...\n");

    let password = prompt_password("Enter password: ")?;
    let password_confirm = prompt_password("Confirm password: ")?;

    if password != password_confirm {
        anyhow::bail!("Passwords don't match.");
    }

    if password.len() < 8 {
        anyhow::bail!("Password must be at least 8 characters.");
    }

    let fingerprint = client.init(&password, &seed)?;

    println!("\n✓ Identity created successfully!\n");
    println!("Your fingerprint: {}", fingerprint);
    println!("\nRun 'sidebet bundle' to publish a key bundle for counterparties.");

    Ok(())
}

fn cmd_identity(client: &mut MarketClient) -> Result<()> {
    unlock_client(client)?;

    println!("Identity Information");
    println!("====================");
    println!("Fingerprint: {}", client.fingerprint()?);
    println!("One-Time Pre-Keys remaining: {}", client.one_time_prekey_count()?);
    println!("Sessions: {}", client.session_peers().len());

    Ok(())
}

fn cmd_bundle(client: &mut MarketClient, out: Option<&std::path::Path>) -> Result<()> {
    let password = unlock_client(client)?;

    let bundle = client.publish_bundle(&password)?;
    let json = serde_json::to_string_pretty(&bundle)?;

    write_artifact(out, &json, "bundle")?;
    Ok(())
}

fn cmd_invite(
    client: &mut MarketClient,
    bundle_path: &std::path::Path,
    out: Option<&std::path::Path>,
) -> Result<()> {
    let password = unlock_client(client)?;

    let bundle_json = std::fs::read_to_string(bundle_path)
        .with_context(|| format!("Failed to read {}", bundle_path.display()))?;
    let bundle: KeyBundle = serde_json::from_str(&bundle_json).context("Invalid bundle JSON")?;

    let peer = bundle.identity.fingerprint();
    let message = client.invite(&password, &bundle)?;
    let json = serde_json::to_string_pretty(&message)?;

    println!("Session established with {}", peer);
    write_artifact(out, &json, "initial message")?;
    Ok(())
}

fn cmd_accept(client: &mut MarketClient, message_path: &std::path::Path) -> Result<()> {
    let password = unlock_client(client)?;

    let message_json = std::fs::read_to_string(message_path)
        .with_context(|| format!("Failed to read {}", message_path.display()))?;
    let message: InitialMessage =
        serde_json::from_str(&message_json).context("Invalid initial message JSON")?;

    let peer = client.accept(&password, &message)?;
    println!("Session established with {}", peer);

    Ok(())
}

fn cmd_sessions(client: &mut MarketClient) -> Result<()> {
    unlock_client(client)?;

    let peers = client.session_peers();
    if peers.is_empty() {
        println!("No sessions yet. Exchange bundles with 'sidebet bundle' and 'sidebet invite'.");
        return Ok(());
    }

    println!("Sessions");
    println!("========");
    for peer in peers {
        println!("{}", peer);
    }

    Ok(())
}

fn cmd_seal(
    client: &mut MarketClient,
    peer: &str,
    payload_path: Option<&std::path::Path>,
    out: Option<&std::path::Path>,
) -> Result<()> {
    unlock_client(client)?;

    let payload_json = match payload_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let payload: serde_json::Value =
        serde_json::from_str(&payload_json).context("Payload must be valid JSON")?;

    let envelope = client.seal(peer, &payload)?;
    let json = serde_json::to_string_pretty(&envelope)?;

    write_artifact(out, &json, "envelope")?;
    Ok(())
}

fn cmd_open(client: &mut MarketClient, peer: &str, envelope_path: &std::path::Path) -> Result<()> {
    unlock_client(client)?;

    let envelope_json = std::fs::read_to_string(envelope_path)
        .with_context(|| format!("Failed to read {}", envelope_path.display()))?;
    let envelope: EncryptedEnvelope =
        serde_json::from_str(&envelope_json).context("Invalid envelope JSON")?;

    let payload = client.open_envelope(peer, &envelope)?;
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn write_artifact(out: Option<&std::path::Path>, json: &str, kind: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Wrote {} to {}", kind, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
