use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use volley::{MAX_DATAGRAM_SIZE, NetSettings, NetTransport, parse_addr};

#[derive(Parser)]
#[command(name = "volley-echo")]
#[command(about = "Datagram transport diagnostic tool")]
struct Args {
    #[arg(long, default_value = "", help = "Local address or adapter to listen on")]
    host: String,

    #[arg(short, long, default_value_t = volley::DEFAULT_PORT)]
    port: u16,

    #[arg(long, help = "Peer address to send to (e.g. 127.0.0.1 or ::1)")]
    peer: Option<String>,

    #[arg(long, default_value_t = volley::DEFAULT_PORT)]
    peer_port: u16,

    #[arg(long, default_value = "ping", help = "Payload sent to the peer each tick")]
    payload: String,

    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    #[arg(long, default_value_t = 0, help = "Tick count before exiting, 0 for no limit")]
    ticks: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let peer = args
        .peer
        .as_deref()
        .map(|text| {
            parse_addr(text)
                .with_context(|| format!("bad peer address '{}'", text))
                .map(|a| a.with_port(args.peer_port))
        })
        .transpose()?;

    let mut settings = NetSettings::new();
    settings.set_host(&args.host);
    settings.set_port(args.port);

    let mut transport = NetTransport::init(settings)?;
    anyhow::ensure!(transport.is_listening(), "transport failed to start");

    log::info!("listening on port {}", transport.bound_port().unwrap_or(args.port));
    for local in transport.local_addresses() {
        log::info!("local address {} ({})", local.name, local.adapter);
    }

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut tick = 0u64;
    loop {
        while let Some((from, len)) = transport.poll(&mut buf)? {
            log::info!(
                "{} bytes from {} port {}: {}",
                len,
                from,
                from.port,
                String::from_utf8_lossy(&buf[..len])
            );
        }

        if let Some(peer) = peer {
            transport.send(args.payload.as_bytes(), &peer)?;
        }

        tick += 1;
        if args.ticks != 0 && tick >= args.ticks {
            break;
        }
        thread::sleep(Duration::from_millis(args.interval_ms));
    }

    let stats = transport.stats();
    log::info!(
        "sent {} packets ({} bytes), received {} packets ({} bytes), opened {} channels",
        stats.packets_sent,
        stats.bytes_sent,
        stats.packets_received,
        stats.bytes_received,
        stats.channels_opened
    );
    transport.shutdown();
    Ok(())
}
