use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use volley::{NetAddr, NetError, NetSettings, NetTransport};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(42000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(20, Ordering::SeqCst)
}

fn loopback_settings(port: u16) -> NetSettings {
    let mut settings = NetSettings::new();
    settings.set_host("127.0.0.1");
    settings.set_port(port);
    settings
}

fn wait_for_datagram(
    transport: &mut NetTransport,
    buf: &mut [u8],
    timeout_ms: u64,
) -> Option<(NetAddr, usize)> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if let Some(received) = transport.poll(buf).unwrap() {
            return Some(received);
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

fn wait_for_receive_count(transport: &NetTransport, count: u64, timeout_ms: u64) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if transport.stats().packets_received >= count {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn test_send_poll_round_trip() {
    let mut receiver = NetTransport::init(loopback_settings(next_port())).unwrap();
    let mut sender = NetTransport::init(loopback_settings(next_port())).unwrap();

    assert!(receiver.is_listening());
    assert!(sender.is_listening());

    let peer = NetAddr::v4([127, 0, 0, 1], receiver.bound_port().unwrap());
    sender.send(b"hello transport", &peer).unwrap();

    let mut buf = [0u8; 64];
    let (from, len) = wait_for_datagram(&mut receiver, &mut buf, 2000).expect("datagram arrives");

    assert_eq!(&buf[..len], b"hello transport");
    assert_eq!(
        from,
        NetAddr::v4([127, 0, 0, 1], sender.bound_port().unwrap())
    );

    let stats = sender.stats();
    assert_eq!(stats.packets_sent, 1);
    assert_eq!(stats.channels_opened, 1);
}

#[test]
fn test_port_scan_skips_occupied_ports() {
    let base = next_port();

    // Occupy the first five ports so the scan has to walk past them.
    let blockers: Vec<std::net::UdpSocket> = (0..5)
        .map(|i| std::net::UdpSocket::bind(("127.0.0.1", base + i)).unwrap())
        .collect();

    let transport = NetTransport::init(loopback_settings(base)).unwrap();

    assert!(transport.is_listening());
    assert_eq!(transport.bound_port(), Some(base + 5));
    // The configuration reflects where we actually ended up.
    assert_eq!(transport.settings().port(), base + 5);

    drop(blockers);
}

#[test]
fn test_settings_record_chosen_host() {
    let transport = NetTransport::init(loopback_settings(next_port())).unwrap();
    assert_eq!(transport.settings().host(), "127.0.0.1");
}

#[test]
fn test_reconfigure_clears_channel_cache() {
    let mut receiver = NetTransport::init(loopback_settings(next_port())).unwrap();
    let mut sender = NetTransport::init(loopback_settings(next_port())).unwrap();

    let peer = NetAddr::v4([127, 0, 0, 1], receiver.bound_port().unwrap());

    // Two sends to the same peer open exactly one channel.
    sender.send(b"one", &peer).unwrap();
    sender.send(b"two", &peer).unwrap();
    assert_eq!(sender.stats().channels_opened, 1);
    assert!(wait_for_receive_count(&receiver, 2, 2000));

    // Bounce the sender: the cache dies with the session, so the next
    // send has to open a fresh channel.
    sender.configure(false);
    assert!(!sender.is_listening());
    sender.configure(true);
    assert!(sender.is_listening());

    sender.send(b"three", &peer).unwrap();
    assert_eq!(sender.stats().channels_opened, 2);
}

#[test]
fn test_poll_on_empty_queue_is_none() {
    let mut settings = loopback_settings(next_port());
    settings.set_enabled(false);
    let mut transport = NetTransport::init(settings).unwrap();

    assert!(!transport.is_listening());
    let mut buf = [0u8; 16];
    assert!(transport.poll(&mut buf).unwrap().is_none());

    // Send while disabled is a quiet no-op.
    let peer = NetAddr::v4([127, 0, 0, 1], 27960);
    transport.send(b"dropped", &peer).unwrap();
    assert_eq!(transport.stats().packets_sent, 0);
}

#[test]
fn test_oversized_datagram_is_an_error_not_a_truncation() {
    let mut receiver = NetTransport::init(loopback_settings(next_port())).unwrap();
    let mut sender = NetTransport::init(loopback_settings(next_port())).unwrap();

    let peer = NetAddr::v4([127, 0, 0, 1], receiver.bound_port().unwrap());
    sender.send(&[0xAB; 64], &peer).unwrap();
    assert!(wait_for_receive_count(&receiver, 1, 2000));

    let mut small = [0u8; 8];
    match receiver.poll(&mut small) {
        Err(NetError::BufferOverflow { len, cap }) => {
            assert_eq!(len, 64);
            assert_eq!(cap, 8);
        }
        other => panic!("expected buffer overflow, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_restart_picks_up_new_port() {
    let first = next_port();
    let second = first + 10;

    let mut transport = NetTransport::init(loopback_settings(first)).unwrap();
    assert_eq!(transport.bound_port(), Some(first));

    transport.settings_mut().set_port(second);
    transport.restart();

    assert!(transport.is_listening());
    assert_eq!(transport.bound_port(), Some(second));
}

#[test]
fn test_shutdown_then_reenable() {
    let port = next_port();
    let mut transport = NetTransport::init(loopback_settings(port)).unwrap();
    assert!(transport.is_listening());

    transport.shutdown();
    assert!(!transport.is_listening());

    transport.configure(true);
    assert!(transport.is_listening());
    assert_eq!(transport.bound_port(), Some(port));
}
