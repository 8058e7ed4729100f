use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::addr::{self, AddrParseError, NetAddr};
use crate::bridge::{AsyncBridge, BridgeError, DEFAULT_BRIDGE_TIMEOUT};
use crate::channel::{ChannelCache, OutputChannel};
use crate::iface::{self, LocalAddress};
use crate::queue::{self, DatagramEvent, MessageQueue, QueuedEvent};
use crate::settings::NetSettings;

pub const DEFAULT_PORT: u16 = 27960;
/// Largest datagram the transport will hand to a caller.
pub const MAX_DATAGRAM_SIZE: usize = 16384;
/// How many consecutive ports to try when the configured one is taken,
/// so several instances can run side by side without configuration.
pub const PORT_SCAN_RANGE: u16 = 10;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("received {len} byte datagram exceeds the {cap} byte buffer")]
    BufferOverflow { len: usize, cap: usize },
    #[error("sender address unparseable: {0}")]
    BadSender(#[from] AddrParseError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("channel write failed: {0}")]
    ChannelWrite(#[source] io::Error),
}

#[derive(Default)]
struct StatsInner {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    channels_opened: AtomicU64,
    events_dropped: AtomicU64,
}

/// Counter snapshot, taken with [`NetTransport::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub channels_opened: u64,
    pub events_dropped: u64,
}

/// Everything that exists only while listening. Torn down and rebuilt as
/// a unit; reconfiguration never mutates a live session.
struct Session {
    socket: Arc<UdpSocket>,
    bound_port: u16,
    recv_task: JoinHandle<()>,
    cache: ChannelCache<OutputChannel>,
}

/// The transport facade: a datagram socket driven by an async runtime,
/// exposed to a synchronous, poll-driven caller.
///
/// Two states: Disabled (no session) and Listening. `poll` and `send`
/// are meant for a single game-loop thread; inbound datagrams are queued
/// by a runtime task and consumed one per `poll`.
pub struct NetTransport {
    runtime: Runtime,
    bridge_timeout: Duration,
    settings: NetSettings,
    queue: MessageQueue,
    stats: Arc<StatsInner>,
    enabled: bool,
    session: Option<Session>,
}

impl NetTransport {
    /// Builds the runtime, logs the local address table and brings the
    /// transport up (unless the settings disable it).
    pub fn init(settings: NetSettings) -> Result<Self, NetError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(NetError::Runtime)?;

        log::info!("net: initializing datagram transport");
        log::info!("net: set the host setting to use a specific local address");
        log::info!("net: set the port setting to pick a listening port");
        for local in iface::local_addresses() {
            log::info!("net: ... address: {} / adapter: {}", local.name, local.adapter);
        }

        let mut transport = Self {
            runtime,
            bridge_timeout: DEFAULT_BRIDGE_TIMEOUT,
            settings,
            queue: MessageQueue::new(),
            stats: Arc::new(StatsInner::default()),
            enabled: false,
            session: None,
        };
        transport.configure(true);
        Ok(transport)
    }

    /// Tears the session down. The transport can be re-enabled afterwards
    /// with [`configure`](Self::configure).
    pub fn shutdown(&mut self) {
        self.configure(false);
        log::info!("net: shutdown datagram transport");
    }

    /// Applies the requested enable state plus any latched settings
    /// changes. No-op when neither changed; otherwise stops and/or starts
    /// the session. The settings' master switch vetoes enabling.
    pub fn configure(&mut self, enable: bool) {
        let modified = self.settings.take_modified();
        let enable = enable && self.settings.enabled();

        if enable == self.enabled && !modified {
            return;
        }

        let (stop, start) = if enable == self.enabled {
            // Settings changed under a live state: bounce if we're up.
            (enable, enable)
        } else if enable {
            (false, true)
        } else {
            (true, false)
        };
        self.enabled = enable;

        if stop {
            self.stop_listening();
        }
        if start {
            self.start_listening();
        }
    }

    /// Forces a stop/start cycle with the current enable state, picking
    /// up any latched settings changes. Does nothing while disabled.
    pub fn restart(&mut self) {
        let was_enabled = self.enabled;
        if was_enabled {
            self.stop_listening();
            self.enabled = false;
        }
        self.configure(was_enabled);
    }

    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }

    /// The port actually bound, which may differ from the configured one
    /// after a port scan.
    pub fn bound_port(&self) -> Option<u16> {
        self.session.as_ref().map(|s| s.bound_port)
    }

    pub fn settings(&self) -> &NetSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut NetSettings {
        &mut self.settings
    }

    pub fn set_bridge_timeout(&mut self, timeout: Duration) {
        self.bridge_timeout = timeout;
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            packets_sent: self.stats.packets_sent.load(Ordering::Relaxed),
            packets_received: self.stats.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.stats.bytes_received.load(Ordering::Relaxed),
            channels_opened: self.stats.channels_opened.load(Ordering::Relaxed),
            events_dropped: self.stats.events_dropped.load(Ordering::Relaxed),
        }
    }

    /// Fresh enumeration of local addresses for diagnostics.
    pub fn local_addresses(&self) -> impl Iterator<Item = LocalAddress> {
        iface::local_addresses()
    }

    /// Takes one queued datagram, if any: payload into `buf`, sender
    /// parsed into a [`NetAddr`]. `Ok(None)` when the queue is empty.
    /// A datagram larger than `buf` is an error, never a truncation.
    pub fn poll(&mut self, buf: &mut [u8]) -> Result<Option<(NetAddr, usize)>, NetError> {
        let dgram = match self.queue.pop() {
            None => return Ok(None),
            Some(QueuedEvent::Datagram(dgram)) => dgram,
            Some(QueuedEvent::Unhandled { kind }) => {
                // Only the receive task feeds this queue; an unknown kind
                // here means the bridging between them broke.
                debug_assert!(false, "unhandled event kind {kind} reached poll");
                log::error!("net: dropped unhandled event kind {kind}");
                self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        if dgram.payload.len() > buf.len() {
            return Err(NetError::BufferOverflow {
                len: dgram.payload.len(),
                cap: buf.len(),
            });
        }
        buf[..dgram.payload.len()].copy_from_slice(&dgram.payload);

        let from = addr::parse_addr(&dgram.sender_host)?.with_port(dgram.sender_port);
        Ok(Some((from, dgram.payload.len())))
    }

    /// Sends one datagram to `peer`, opening and caching an output
    /// channel on the first send to that peer. Silently does nothing
    /// while disabled.
    pub fn send(&mut self, bytes: &[u8], peer: &NetAddr) -> Result<(), NetError> {
        let Some(session) = &self.session else {
            return Ok(());
        };

        let bridge = AsyncBridge::with_timeout(self.runtime.handle().clone(), self.bridge_timeout);
        let stats = Arc::clone(&self.stats);
        let channel = session.cache.get_or_create(*peer, || {
            stats.channels_opened.fetch_add(1, Ordering::Relaxed);
            let socket = Arc::clone(&session.socket);
            bridge
                .wait(OutputChannel::open(socket, *peer))
                .map_err(NetError::from)
        })?;

        let sent = channel.write(bytes).map_err(NetError::ChannelWrite)?;
        if sent > 0 {
            self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn start_listening(&mut self) {
        let locals: Vec<LocalAddress> = iface::local_addresses().collect();
        if locals.is_empty() {
            log::warn!("net: no local addresses with address information, staying offline");
            return;
        }

        // Prefer the configured host, matched against address text or
        // adapter name; otherwise take the first usable entry.
        let preference = self.settings.host().to_string();
        let chosen = locals
            .iter()
            .find(|l| !preference.is_empty() && (l.name == preference || l.adapter == preference))
            .unwrap_or(&locals[0])
            .clone();
        log::info!("net: local address {} ({})", chosen.name, chosen.adapter);
        self.settings.record_host(&chosen.name);

        let bind_ip: IpAddr = match chosen.name.parse() {
            Ok(ip) => ip,
            Err(_) => {
                log::warn!("net: '{}' is not an address literal, binding any", chosen.name);
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }
        };

        let bridge = AsyncBridge::with_timeout(self.runtime.handle().clone(), self.bridge_timeout);
        let first_port = self.settings.port();
        for attempt in 0..PORT_SCAN_RANGE {
            let Some(try_port) = first_port.checked_add(attempt) else {
                break;
            };
            let bind_addr = SocketAddr::new(bind_ip, try_port);
            match bridge.wait(UdpSocket::bind(bind_addr)) {
                Ok(socket) => {
                    let socket = Arc::new(socket);
                    let bound_port = socket
                        .local_addr()
                        .map(|a| a.port())
                        .unwrap_or(try_port);

                    let recv_task = self.runtime.handle().spawn(receive_loop(
                        Arc::clone(&socket),
                        self.queue.clone(),
                        Arc::clone(&self.stats),
                    ));

                    self.session = Some(Session {
                        socket,
                        bound_port,
                        recv_task,
                        cache: ChannelCache::new(),
                    });
                    self.settings.record_port(bound_port);
                    log::info!("net: listening on {}:{}", bind_ip, bound_port);
                    return;
                }
                Err(e) => {
                    log::debug!("net: couldn't bind port {}: {}", try_port, e);
                }
            }
        }
        log::warn!(
            "net: couldn't allocate a port in {}..{}",
            first_port,
            first_port.saturating_add(PORT_SCAN_RANGE)
        );
    }

    fn stop_listening(&mut self) {
        // Queued records may hold payloads; pop them all so they are
        // released before the socket goes away.
        let drained = self.queue.drain();
        if drained > 0 {
            log::debug!("net: discarded {} queued events", drained);
        }

        if let Some(session) = self.session.take() {
            let dropped = session.cache.clear();
            if dropped > 0 {
                log::debug!("net: dropped {} cached channels", dropped);
            }
            // Join the aborted task so its socket handle is gone before we
            // return; an immediate rebind of the same port relies on it.
            session.recv_task.abort();
            let _ = self.runtime.block_on(session.recv_task);
            log::info!("net: closed socket on port {}", session.bound_port);
        }
    }
}

impl Drop for NetTransport {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

/// The registered arrival callback: runs on the runtime, does nothing
/// but stamp and enqueue. All processing happens at the poll boundary.
async fn receive_loop(socket: Arc<UdpSocket>, queue: MessageQueue, stats: Arc<StatsInner>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                stats.packets_received.fetch_add(1, Ordering::Relaxed);
                stats.bytes_received.fetch_add(len as u64, Ordering::Relaxed);

                let event = QueuedEvent::Datagram(DatagramEvent {
                    // Canonical form so a v4-mapped v6 sender parses as v4.
                    sender_host: from.ip().to_canonical().to_string(),
                    sender_port: from.port(),
                    payload: buf[..len].to_vec(),
                    timestamp_ms: queue::now_ms(),
                });
                if !queue.post(event) {
                    stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                log::error!("net: receive failed: {}", e);
                break;
            }
        }
    }
}
