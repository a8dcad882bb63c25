//! Stem CLI
//!
//! Command-line interface for the Stem contact and private channel protocol.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use solana_program::pubkey::Pubkey;
use tokio::sync::broadcast;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stem_core::codec::{decode_channel, decode_descriptor};
use stem_core::types::{parse_identity, Channel, Identity, OperationKind, RelationshipStatus};
use stem_crypto::{channel_identifier, opcode_for, ProgramAddresses};
use stem_engine::{Stem, StemConfig, StemEvent};
use stem_ledger::{DevSigner, MemoryLedger};

const DEMO_TIMEOUT: Duration = Duration::from_secs(10);

/// Stem - contacts and private channels on an immutable ledger
#[derive(Parser)]
#[command(name = "stem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Program id (defaults to the deployed program)
    #[arg(long, global = true, env = "STEM_PROGRAM_ID")]
    program_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive program addresses
    Derive {
        #[command(subcommand)]
        target: DeriveTarget,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print operation opcodes
    Opcode {
        /// Operation name (all operations if omitted)
        name: Option<String>,
    },

    /// Decode raw account data
    Decode {
        #[command(subcommand)]
        record: DecodeTarget,
    },

    /// Run a two-party conversation against an in-memory ledger
    Demo {
        /// Number of messages to exchange
        #[arg(short, long, default_value = "3")]
        messages: usize,
    },
}

#[derive(Subcommand)]
enum DeriveTarget {
    /// Descriptor account of an identity
    Descriptor {
        /// Identity (base58)
        identity: String,
    },
    /// Channel identifier and account shared by two identities
    Channel {
        /// First identity (base58)
        a: String,
        /// Second identity (base58)
        b: String,
    },
}

#[derive(Subcommand)]
enum DecodeTarget {
    /// Descriptor account data (hex, including the 8-byte tag)
    Descriptor {
        /// Account data
        hex: String,
    },
    /// Channel account data (hex, including the 8-byte tag)
    Channel {
        /// Account data
        hex: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "stem=debug,stem_engine=debug,stem_ledger=debug,info"
    } else {
        "stem=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = engine_config(cli.program_id.as_deref())?;

    match cli.command {
        Commands::Derive { target, json } => cmd_derive(&config, target, json),
        Commands::Opcode { name } => cmd_opcode(name.as_deref()),
        Commands::Decode { record } => cmd_decode(record),
        Commands::Demo { messages } => cmd_demo(config, messages).await,
    }
}

fn engine_config(program_id: Option<&str>) -> Result<StemConfig> {
    let config = StemConfig::from_env().context("Invalid STEM_* environment")?;
    match program_id {
        Some(id) => Ok(config.program_id(parse_identity(id).context("Invalid program id")?)),
        None => Ok(config),
    }
}

/// Derive descriptor or channel addresses
fn cmd_derive(config: &StemConfig, target: DeriveTarget, json: bool) -> Result<()> {
    let addresses = ProgramAddresses::new(config.program_id);

    match target {
        DeriveTarget::Descriptor { identity } => {
            let identity = parse_identity(&identity).context("Invalid identity")?;
            let derived = addresses.descriptor(&identity)?;
            if json {
                let out = serde_json::json!({
                    "identity": identity.to_string(),
                    "descriptor": derived.address.to_string(),
                    "bump": derived.bump,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            println!("{}", "Descriptor account".cyan().bold());
            println!("   {} {}", "Identity:".dimmed(), identity);
            println!("   {} {}", "Address:".green(), derived.address);
            println!("   {} {}", "Bump:".dimmed(), derived.bump);
        }
        DeriveTarget::Channel { a, b } => {
            let a = parse_identity(&a).context("Invalid first identity")?;
            let b = parse_identity(&b).context("Invalid second identity")?;
            let id = channel_identifier(&a, &b).context("Cannot derive a channel with yourself")?;
            let derived = addresses.channel_for_id(&id)?;
            if json {
                let out = serde_json::json!({
                    "participants": [a.to_string(), b.to_string()],
                    "identifier": hex::encode(id),
                    "channel": derived.address.to_string(),
                    "bump": derived.bump,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            println!("{}", "Channel account".cyan().bold());
            println!("   {} {}", "Participants:".dimmed(), format!("{a}, {b}"));
            println!("   {} {}", "Identifier:".yellow(), hex::encode(id));
            println!("   {} {}", "Address:".green(), derived.address);
            println!("   {} {}", "Bump:".dimmed(), derived.bump);
        }
    }
    Ok(())
}

/// Print opcodes
fn cmd_opcode(name: Option<&str>) -> Result<()> {
    let kinds: Vec<OperationKind> = match name {
        Some(name) => match OperationKind::ALL.into_iter().find(|k| k.name() == name) {
            Some(kind) => vec![kind],
            None => bail!(
                "Unknown operation {name:?} (expected one of: {})",
                OperationKind::ALL.map(|k| k.name()).join(", ")
            ),
        },
        None => OperationKind::ALL.to_vec(),
    };
    for kind in kinds {
        println!("{:<12} {}", kind.name().yellow(), hex::encode(opcode_for(kind)));
    }
    Ok(())
}

/// Decode account data
fn cmd_decode(record: DecodeTarget) -> Result<()> {
    let parse = |raw: &str| hex::decode(raw.trim().trim_start_matches("0x")).context("Invalid hex");

    match record {
        DecodeTarget::Descriptor { hex } => {
            let descriptor = decode_descriptor(&parse(&hex)?).context("Failed to decode descriptor")?;
            println!("{} {} peer(s)", "Descriptor:".cyan().bold(), descriptor.len());
            for peer in &descriptor.peers {
                println!("   {} {}", peer.identity, colored_status(peer.status));
            }
        }
        DecodeTarget::Channel { hex } => {
            let channel = decode_channel(&parse(&hex)?).context("Failed to decode channel")?;
            print_channel(&channel);
        }
    }
    Ok(())
}

fn colored_status(status: RelationshipStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        RelationshipStatus::Invited => label.yellow(),
        RelationshipStatus::Requested => label.cyan(),
        RelationshipStatus::Accepted => label.green(),
        RelationshipStatus::Rejected => label.red(),
    }
}

fn print_channel(channel: &Channel) {
    println!("{} {} message(s)", "Channel:".cyan().bold(), channel.message_count);
    println!(
        "   {} {}, {}",
        "Participants:".dimmed(),
        channel.participants[0],
        channel.participants[1]
    );
    for message in &channel.messages {
        println!(
            "   [{}] {}: {}",
            message.timestamp.to_rfc3339().dimmed(),
            short(&message.sender).yellow(),
            message.content
        );
    }
}

fn short(identity: &Identity) -> String {
    let full = identity.to_string();
    format!("{}..", &full[..8.min(full.len())])
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEMO
// ═══════════════════════════════════════════════════════════════════════════════

async fn wait_for<F>(events: &mut broadcast::Receiver<StemEvent>, what: &str, mut pred: F) -> Result<()>
where
    F: FnMut(&StemEvent) -> bool,
{
    tokio::time::timeout(DEMO_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(event = event.name(), "Demo event");
                    if pred(&event) {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Demo receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => bail!("event stream closed"),
            }
        }
    })
    .await
    .with_context(|| format!("Timed out waiting for {what}"))?
}

fn registered(event: &StemEvent) -> bool {
    *event == StemEvent::RegistrationChanged { registered: true }
}

fn channel_with(count: u32) -> impl FnMut(&StemEvent) -> bool {
    move |event| matches!(event, StemEvent::ChannelUpdated { channel, .. } if channel.message_count >= count)
}

/// Run the scripted conversation
async fn cmd_demo(config: StemConfig, messages: usize) -> Result<()> {
    println!("{}", "Stem demo (in-memory ledger)".cyan().bold());

    let ledger = Arc::new(MemoryLedger::with_program_id(config.program_id));
    let config = config.subscribe(true);
    let alice: Identity = Pubkey::new_from_array(rand::random());
    let bob: Identity = Pubkey::new_from_array(rand::random());

    let a = Stem::with_config(alice, ledger.clone(), config.clone());
    let b = Stem::with_config(bob, ledger.clone(), config);
    let (sa, sb) = (DevSigner::new(alice), DevSigner::new(bob));
    let mut a_events = a.subscribe_events();
    let mut b_events = b.subscribe_events();

    println!("   {} {}", "Alice:".dimmed(), alice);
    println!("   {} {}", "Bob:".dimmed(), bob);

    println!("\n{}", "1. Loading and registering...".dimmed());
    a.load().await?;
    b.load().await?;
    a.submit(a.create_register_tx()?, &sa).await?;
    b.submit(b.create_register_tx()?, &sb).await?;
    wait_for(&mut a_events, "alice's registration", registered).await?;
    wait_for(&mut b_events, "bob's registration", registered).await?;
    println!("   ✓ Both registered");

    println!("\n{}", "2. Alice invites Bob...".dimmed());
    a.submit(a.create_invite_tx(&bob)?, &sa).await?;
    wait_for(&mut b_events, "bob to see the invitation", |e| {
        matches!(e, StemEvent::PeersUpdated { peers } if peers.iter().any(|p| p.identity == alice))
    })
    .await?;
    for peer in b.peers() {
        println!("   Bob sees {} as {}", short(&peer.identity), colored_status(peer.status));
    }

    println!("\n{}", "3. Bob accepts...".dimmed());
    b.submit(b.create_accept_tx(&alice)?, &sb).await?;
    wait_for(&mut a_events, "alice's channel", channel_with(0)).await?;
    wait_for(&mut b_events, "bob's channel", channel_with(0)).await?;
    println!("   ✓ Channel open at {}", ProgramAddresses::new(a.config().program_id).channel(&alice, &bob)?.address);

    println!("\n{}", format!("4. Exchanging {messages} message(s)...").dimmed());
    for i in 0..messages {
        let (stem, signer, peer, events) = if i % 2 == 0 {
            (&a, &sa, bob, &mut b_events)
        } else {
            (&b, &sb, alice, &mut a_events)
        };
        let text = format!("message #{} from {}", i + 1, short(stem.owner()));
        stem.submit(stem.create_send_message_tx(&peer, &text)?, signer).await?;
        wait_for(events, "message delivery", channel_with(i as u32 + 1)).await?;
    }

    println!();
    match b.get_channel(&alice)? {
        Some(channel) => print_channel(&channel),
        None => bail!("Bob has no channel content"),
    }

    let stats = ledger.stats();
    println!("\n{}", "Ledger:".green().bold());
    println!("   Submissions: {}", stats.submissions);
    println!("   Rejected:    {}", stats.rejected);
    println!("   Fetches:     {}", stats.fetches);
    println!("   Pushes:      {}", stats.notifications);

    Ok(())
}
