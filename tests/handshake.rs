#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end handshake scenarios against a real loopback bridge.

use bridgelink::core::wire;
use bridgelink::error::LinkError;
use bridgelink::{LinkConfig, LinkEngine, LinkState, Packet, PacketRegistry};
use bytes::{BufMut, BytesMut};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What the fake bridge observed from the client.
struct BridgeCapture {
    discriminant: u8,
    identity: String,
    /// One more frame read after the verdict, when requested.
    followup: Option<(u8, String)>,
}

fn read_frame(stream: &mut TcpStream) -> (u8, String) {
    let mut id = [0u8; 1];
    stream.read_exact(&mut id).unwrap();
    let payload = wire::read_str(stream).unwrap();
    (id[0], payload)
}

fn write_packet(stream: &mut TcpStream, packet: &Packet) {
    let mut buf = BytesMut::new();
    packet.encode(&mut buf);
    stream.write_all(&buf).unwrap();
    stream.flush().unwrap();
}

/// Accept one client, read its Connect, send `reply` (optionally preceded by
/// `padding` zero bytes), and optionally read one follow-up frame.
fn spawn_bridge(
    reply: Packet,
    padding: usize,
    expect_followup: bool,
) -> (SocketAddr, JoinHandle<BridgeCapture>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let (discriminant, identity) = read_frame(&mut stream);

        if padding > 0 {
            stream.write_all(&vec![0u8; padding]).unwrap();
        }
        write_packet(&mut stream, &reply);

        let followup = expect_followup.then(|| read_frame(&mut stream));
        BridgeCapture {
            discriminant,
            identity,
            followup,
        }
    });
    (addr, handle)
}

fn engine_for(addr: SocketAddr) -> Arc<LinkEngine> {
    let config = LinkConfig::default_with_overrides(|c| {
        c.bridge.address = addr.to_string();
        c.client.identity = "HostApp/Test/1.0".into();
    });
    LinkEngine::new(config).unwrap()
}

fn wait_for_state(engine: &LinkEngine, wanted: LinkState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = engine.state();
        if state == wanted {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {wanted:?}, stuck in {state:?}");
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn accepted_handshake_reaches_established() {
    let (addr, bridge) = spawn_bridge(
        Packet::Advance {
            bridge_info: "bridge v1.0".into(),
        },
        0,
        true,
    );
    let engine = engine_for(addr);
    engine.connect();
    wait_for_state(&engine, LinkState::Established);

    assert_eq!(engine.bridge_info().as_deref(), Some("bridge v1.0"));
    assert_eq!(engine.reject_reason(), None);

    // The established pipe still moves outbound packets.
    engine
        .send_packet(Packet::Disconnect {
            reason: "bye".into(),
        })
        .unwrap();

    let capture = bridge.join().unwrap();
    assert_eq!(capture.discriminant, Packet::CONNECT);
    assert_eq!(capture.identity, "HostApp/Test/1.0");
    assert_eq!(capture.followup, Some((Packet::DISCONNECT, "bye".into())));

    engine.shutdown();
    assert!(engine.metrics().snapshot().packets_sent >= 2);
}

#[test]
fn rejected_handshake_closes_socket() {
    let (addr, bridge) = spawn_bridge(
        Packet::Disconnect {
            reason: "banned".into(),
        },
        0,
        false,
    );
    let engine = engine_for(addr);
    engine.connect();
    wait_for_state(&engine, LinkState::Rejected);

    assert_eq!(engine.reject_reason().as_deref(), Some("banned"));
    assert_eq!(engine.bridge_info(), None);
    // Teardown closed the rx side: reads no longer block.
    assert_eq!(engine.read_packet(), None);

    bridge.join().unwrap();
}

#[test]
fn zero_bytes_are_skipped_as_padding() {
    let (addr, bridge) = spawn_bridge(
        Packet::Advance {
            bridge_info: "bridge v1.0".into(),
        },
        3,
        false,
    );
    let engine = engine_for(addr);
    engine.connect();
    wait_for_state(&engine, LinkState::Established);

    assert_eq!(engine.bridge_info().as_deref(), Some("bridge v1.0"));
    bridge.join().unwrap();
    engine.shutdown();
}

#[test]
fn connect_failure_is_logged_not_fatal() {
    // Bind-then-drop guarantees nothing listens on the port.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let engine = engine_for(addr);
    engine.connect();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if engine.metrics().snapshot().connection_failures == 1
            && engine.state() == LinkState::Idle
        {
            break;
        }
        if Instant::now() > deadline {
            panic!("connect failure never recorded");
        }
        thread::sleep(Duration::from_millis(10));
    }
    // No session, so the host-facing API degrades cleanly.
    assert!(engine.send_packet(Packet::Disconnect { reason: "x".into() }).is_err());
    assert_eq!(engine.read_packet(), None);
}

#[test]
fn reconnect_replaces_live_session() {
    const ROUNDS: usize = 25;
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let bridge = thread::spawn(move || {
        // Hold every served socket open so each reconnect races against a
        // still-live predecessor session.
        let mut served = Vec::with_capacity(ROUNDS);
        for _ in 0..ROUNDS {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream);
            write_packet(
                &mut stream,
                &Packet::Advance {
                    bridge_info: "bridge v1.0".into(),
                },
            );
            served.push(stream);
        }
        served.len()
    });

    let engine = engine_for(addr);
    for _ in 0..ROUNDS {
        // The old reader is still parked in a blocking read here; its exit
        // must not tear down the session that replaces it.
        engine.connect();
        wait_for_state(&engine, LinkState::Established);
    }

    assert_eq!(bridge.join().unwrap(), ROUNDS);
    engine.shutdown();
}

#[test]
fn failed_reconnect_leaves_engine_disconnected() {
    let (addr, bridge) = spawn_bridge(
        Packet::Advance {
            bridge_info: "bridge v1.0".into(),
        },
        0,
        false,
    );
    let engine = engine_for(addr);
    engine.connect();
    wait_for_state(&engine, LinkState::Established);

    // Bridge thread ends: socket and listener both gone.
    bridge.join().unwrap();

    engine.connect();
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if engine.metrics().snapshot().connection_failures == 1
            && engine.state() == LinkState::Idle
        {
            break;
        }
        if Instant::now() > deadline {
            panic!("reconnect failure never recorded");
        }
        thread::sleep(Duration::from_millis(10));
    }

    // The stale session was cleared, not left behind half-alive.
    let err = engine
        .send_packet(Packet::Disconnect { reason: "x".into() })
        .unwrap_err();
    assert!(matches!(err, LinkError::NotConnected));
    assert_eq!(engine.read_packet(), None);
}

#[test]
fn non_verdict_reply_leaves_handshake_pending() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let bridge = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_frame(&mut stream);
        // A decodable frame that is neither verdict, via the extension
        // decoder registered below.
        let mut buf = BytesMut::new();
        buf.put_u8(0x10);
        wire::write_str(&mut buf, "mystery");
        stream.write_all(&buf).unwrap();
        stream.flush().unwrap();
        stream
    });

    let registry = PacketRegistry::with_builtin();
    registry
        .register(0x10, |r| {
            Ok(Packet::Connect {
                identity: wire::read_str(r)?,
            })
        })
        .unwrap();
    let config = LinkConfig::default_with_overrides(|c| {
        c.bridge.address = addr.to_string();
        c.client.identity = "HostApp/Test/1.0".into();
    });
    let engine = LinkEngine::with_registry(config, registry).unwrap();
    engine.connect();
    wait_for_state(&engine, LinkState::Handshaking);

    // The anomaly arm must leave the state alone; give it time to run.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(engine.state(), LinkState::Handshaking);
    assert_eq!(engine.bridge_info(), None);
    assert_eq!(engine.reject_reason(), None);

    let _held = bridge.join().unwrap();
    engine.shutdown();
}

#[test]
fn peer_disappearing_closes_the_link() {
    let (addr, bridge) = spawn_bridge(
        Packet::Advance {
            bridge_info: "bridge v1.0".into(),
        },
        0,
        false,
    );
    let engine = engine_for(addr);
    engine.connect();
    wait_for_state(&engine, LinkState::Established);

    // Bridge thread returns and drops its socket: the reader sees EOF.
    bridge.join().unwrap();
    wait_for_state(&engine, LinkState::Closed);
    assert_eq!(engine.read_packet(), None);
}
