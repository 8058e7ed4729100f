use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::UdpSocket;

use crate::addr::{self, NetAddr};

/// A per-peer outbound handle: the listening socket plus the peer's
/// resolved endpoint. Opening one is the async half (name resolution);
/// writing through one never blocks.
#[derive(Clone)]
pub struct OutputChannel {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl OutputChannel {
    pub(crate) async fn open(socket: Arc<UdpSocket>, peer: NetAddr) -> io::Result<Self> {
        let host = addr::format_addr(&peer);
        let resolved = tokio::net::lookup_host((host.as_str(), peer.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "peer did not resolve")
            })?;
        Ok(Self {
            socket,
            peer: resolved,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes one datagram. Returns the byte count, or 0 if the socket
    /// had no send capacity right now - the datagram is dropped, which an
    /// unreliable transport is allowed to do.
    pub fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        match self.socket.try_send_to(bytes, self.peer) {
            Ok(sent) => Ok(sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::debug!("net: send buffer full, dropped {} bytes to {}", bytes.len(), self.peer);
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}

/// Peer address -> open output channel, filled lazily on first send and
/// cleared wholesale when the session closes. No other eviction: entries
/// live as long as the listening session does.
///
/// Concurrent misses for the same peer would race and open redundant
/// channels; the send path is single-threaded by contract, so the race
/// cannot occur and no per-key creation lock is taken.
pub struct ChannelCache<C = OutputChannel> {
    entries: Mutex<HashMap<NetAddr, C>>,
}

impl<C> Default for ChannelCache<C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clone> ChannelCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NetAddr, C>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached channel for `peer`, or runs `create` and caches
    /// its result. A failed `create` caches nothing, so the next send to
    /// that peer retries.
    pub fn get_or_create<E>(
        &self,
        peer: NetAddr,
        create: impl FnOnce() -> Result<C, E>,
    ) -> Result<C, E> {
        if let Some(channel) = self.lock().get(&peer) {
            return Ok(channel.clone());
        }
        // Not held across `create`: channel opening blocks on the bridge.
        let channel = create()?;
        self.lock().insert(peer, channel.clone());
        Ok(channel)
    }

    /// Drops every cached channel.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
