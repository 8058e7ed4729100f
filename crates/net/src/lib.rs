pub mod addr;
pub mod bridge;
pub mod channel;
pub mod iface;
pub mod queue;
pub mod settings;
pub mod transport;

pub use addr::{
    AddrKind, AddrParseError, NetAddr, format_addr, format_ipv4, format_ipv6, parse_addr,
    parse_ipv4, parse_ipv6,
};
pub use bridge::{AsyncBridge, BridgeError, DEFAULT_BRIDGE_TIMEOUT};
pub use channel::{ChannelCache, OutputChannel};
pub use iface::{LocalAddress, local_addresses};
pub use queue::{DatagramEvent, MessageQueue, QueuedEvent};
pub use settings::NetSettings;
pub use transport::{
    DEFAULT_PORT, MAX_DATAGRAM_SIZE, NetError, NetTransport, PORT_SCAN_RANGE, TransportStats,
};
