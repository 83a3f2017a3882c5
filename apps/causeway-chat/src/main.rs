//! # Causeway Chat
//!
//! An interactive chat room where every participant sees messages in an
//! order consistent with causality: a reply never shows up before the
//! message it answers.
//!
//! ```text
//! $ cat peers.txt
//! 10.0.0.1/8081
//! 10.0.0.2/8081
//! 10.0.0.3/8081
//! $ causeway-chat 8081 --peers peers.txt
//! ```
//!
//! Every line typed is multicast to the other peers. Lines starting with
//! `/` are local commands; `/help` lists them.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use causeway_clock::Message;
use causeway_net::{
    ChatNode, Membership, NodeConfigBuilder, PeerAddr, SendOutcome, TcpServer, TcpTransport,
    DEFAULT_PEERS_FILE, DEFAULT_PORT,
};
use chrono::Local;
use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "causeway-chat")]
#[command(about = "Causally ordered peer-to-peer chat room")]
#[command(version)]
struct Cli {
    /// Port to accept peer connections on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// File listing every member as `ip/port`, one per line
    #[arg(long, default_value = DEFAULT_PEERS_FILE)]
    peers: PathBuf,

    /// Address this process appears as in the peers file
    #[arg(long)]
    ip: Option<IpAddr>,

    /// Delay sends to the peer in slot `i` by `i * MS` milliseconds
    #[arg(long, value_name = "MS")]
    stagger_ms: Option<u64>,

    /// Give up on a peer that has not acknowledged a message after MS
    /// milliseconds
    #[arg(long, value_name = "MS")]
    reply_timeout_ms: Option<u64>,

    /// Log filter, e.g. `debug` or `causeway_delivery=trace`
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

type Node = ChatNode<TcpTransport>;

enum Flow {
    Continue,
    Quit,
}

// ─── Start-up ──────────────────────────────────────────────────────────────

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// First non-loopback IPv4 address of this host, or loopback if none.
fn detect_ip() -> IpAddr {
    let interfaces = if_addrs::get_if_addrs().unwrap_or_default();

    interfaces
        .into_iter()
        .filter(|interface| !interface.is_loopback())
        .find_map(|interface| match interface.ip() {
            IpAddr::V4(ip) => Some(IpAddr::V4(ip)),
            IpAddr::V6(_) => None,
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn banner(node: &Node) {
    let bar = "═".repeat(60);
    println!("{}", bar.bright_cyan());
    println!(
        "  Welcome to the chat room, {}",
        node.identity().bold().bright_white()
    );
    println!(
        "  Slot {} of {}  {}",
        node.membership().self_index().to_string().bright_yellow(),
        node.membership().clock_size(),
        "(/help for commands)".dimmed()
    );
    println!("{}", bar.bright_cyan());
}

fn print_delivered(msg: &Message) {
    println!(
        "{} {} {} {}",
        Local::now().format("%H:%M:%S").to_string().dimmed(),
        format!("{}:", msg.origin()).bright_magenta(),
        msg.payload(),
        msg.timestamp().to_string().dimmed()
    );
}

fn print_failure(outcome: &SendOutcome) {
    if let Err(e) = &outcome.result {
        println!("  {} {}", "!".bright_red(), e);
    }
}

fn print_help() {
    println!("  /clock    show the local vector clock");
    println!("  /pending  list held messages and what they wait for");
    println!("  /log      replay every delivered message");
    println!("  /peers    list the room members and their slots");
    println!("  /quit     leave the room");
}

// ─── Commands ──────────────────────────────────────────────────────────────

fn run_command(command: &str, node: &Node) -> Flow {
    match command.trim() {
        "clock" | "c" => {
            println!("  {} {}", "clock".bold(), node.clock());
        }

        "pending" | "p" => {
            let held: Vec<_> = node.engine().with(|engine| {
                engine
                    .pending()
                    .iter()
                    .map(|msg| {
                        let readiness = engine
                            .clock()
                            .readiness(msg.timestamp(), msg.sender_index());
                        (msg.clone(), readiness)
                    })
                    .collect()
            });
            if held.is_empty() {
                println!("  {}", "(nothing held)".dimmed());
            }
            for (msg, readiness) in held {
                println!(
                    "  {} {} {}",
                    "•".bright_yellow(),
                    msg,
                    format!("[{}]", readiness).dimmed()
                );
            }
        }

        "log" | "l" => {
            let log = node.engine().delivered();
            if log.is_empty() {
                println!("  {}", "(nothing delivered yet)".dimmed());
            }
            for (position, msg) in log.iter().enumerate() {
                println!(
                    "  {:>4} {} {}",
                    position.to_string().dimmed(),
                    msg,
                    msg.timestamp().to_string().dimmed()
                );
            }
        }

        "peers" => {
            let me = node.membership().self_index();
            for (slot, addr) in node.membership().members().iter().enumerate() {
                let marker = if slot == me {
                    "(you)".bright_green().to_string()
                } else {
                    String::new()
                };
                println!("  {:>3}  {} {}", slot, addr, marker);
            }
        }

        "quit" | "exit" | "q" => {
            println!("  {}", "Goodbye!".dimmed());
            return Flow::Quit;
        }

        "help" | "h" | "?" => print_help(),

        other => {
            println!(
                "  {} Unknown command '/{}', try /help",
                "?".bright_yellow(),
                other
            );
        }
    }
    Flow::Continue
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    let self_addr = PeerAddr::new(cli.ip.unwrap_or_else(detect_ip), cli.port);
    let mut builder = NodeConfigBuilder::new()
        .listen_port(cli.port)
        .peers_file(&cli.peers);
    if let Some(ms) = cli.stagger_ms {
        builder = builder.send_stagger(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.reply_timeout_ms {
        builder = builder.request_timeout(Duration::from_millis(ms));
    }
    let config = builder.build();

    let membership = Membership::load(&config.peers_file, self_addr).with_context(|| {
        format!(
            "could not load peers from {}",
            config.peers_file.display()
        )
    })?;
    info!(peers = membership.peer_count(), "loaded membership");

    let server = TcpServer::bind((Ipv4Addr::UNSPECIFIED, config.listen_port))
        .await
        .with_context(|| format!("could not listen on port {}", config.listen_port))?;
    let transport = Arc::new(TcpTransport::from_config(&config));
    let node = ChatNode::new(membership, transport, config);
    server.spawn(node.engine().clone());

    banner(&node);

    let mut events = node.events().context("delivery stream already taken")?;
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel::<SendOutcome>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(msg) = events.recv() => print_delivered(&msg),
            Some(outcome) = failures_rx.recv() => print_failure(&outcome),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if let Some(command) = input.strip_prefix('/') {
                    match run_command(command, &node) {
                        Flow::Continue => continue,
                        Flow::Quit => break,
                    }
                }

                let report = node.send(input).await;
                let failures_tx = failures_tx.clone();
                tokio::spawn(async move {
                    for outcome in report.failures().await {
                        // Closed only once the loop has exited.
                        let _ = failures_tx.send(outcome);
                    }
                });
            }
        }
    }

    Ok(())
}
