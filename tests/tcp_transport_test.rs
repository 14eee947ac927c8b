//! TCP transport tests - real sockets on localhost
//!
//! The transport owns its runtime and is driven from plain threads, so these
//! are ordinary `#[test]`s that poll with a deadline.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use net_tetris::net::{
    Device, GameConfig, ScriptedDevice, Session, Target, TcpTransport, Transport, TransportEvent,
};

const DEADLINE: Duration = Duration::from_secs(5);

fn any_port() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn wait_event(transport: &mut TcpTransport) -> TransportEvent {
    let start = Instant::now();
    loop {
        if let Some(event) = transport.try_recv() {
            return event;
        }
        assert!(start.elapsed() < DEADLINE, "timed out waiting for an event");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < DEADLINE, "timed out");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_hello_assigns_connection_ids() {
    let mut server = TcpTransport::listen(any_port()).unwrap();
    let addr = server.local_addr();

    let first = TcpTransport::connect(addr).unwrap();
    assert_eq!(first.id(), 1);
    assert_eq!(wait_event(&mut server), TransportEvent::PeerConnected { id: 1 });

    let second = TcpTransport::connect(addr).unwrap();
    assert_eq!(second.id(), 2);
    assert_eq!(wait_event(&mut server), TransportEvent::PeerConnected { id: 2 });
}

#[test]
fn test_packets_keep_their_sender() {
    let mut server = TcpTransport::listen(any_port()).unwrap();
    let addr = server.local_addr();
    let mut a = TcpTransport::connect(addr).unwrap();
    wait_event(&mut server);
    let mut b = TcpTransport::connect(addr).unwrap();
    wait_event(&mut server);

    a.send(Target::All, &[4, 1, 2, 0]);
    assert_eq!(
        wait_event(&mut server),
        TransportEvent::Received { from: 1, bytes: vec![4, 1, 2, 0] }
    );

    server.send_from(Target::AllExcept(1), 1, &[4, 1, 2, 0]);
    assert_eq!(
        wait_event(&mut b),
        TransportEvent::Received { from: 1, bytes: vec![4, 1, 2, 0] }
    );

    server.send(Target::Peer(1), &[9]);
    assert_eq!(wait_event(&mut a), TransportEvent::Received { from: 0, bytes: vec![9] });
    std::thread::sleep(Duration::from_millis(50));
    assert!(b.try_recv().is_none());
}

#[test]
fn test_disconnect_and_shutdown() {
    let mut server = TcpTransport::listen(any_port()).unwrap();
    let addr = server.local_addr();
    let mut a = TcpTransport::connect(addr).unwrap();
    wait_event(&mut server);
    let mut b = TcpTransport::connect(addr).unwrap();
    wait_event(&mut server);

    server.disconnect(1);
    assert_eq!(wait_event(&mut a), TransportEvent::Closed);
    drop(a);
    assert_eq!(wait_event(&mut server), TransportEvent::PeerDisconnected { id: 1 });

    drop(server);
    assert_eq!(wait_event(&mut b), TransportEvent::Closed);
}

#[test]
fn test_sessions_start_over_tcp() {
    let config = GameConfig {
        columns: 10,
        rows: 20,
        ..GameConfig::default()
    };
    let transport = TcpTransport::listen(any_port()).unwrap();
    let addr = transport.local_addr();
    let mut server = Session::new(config.clone());
    let host: Vec<Box<dyn Device>> = vec![Box::new(ScriptedDevice::idle("host"))];
    server.create_server_game(host, Box::new(transport));

    let mut client = Session::new(config);
    let guest: Vec<Box<dyn Device>> = vec![Box::new(ScriptedDevice::idle("guest"))];
    client.create_client_game(guest, Box::new(TcpTransport::connect(addr).unwrap()));

    wait_until(|| {
        server.update(0).unwrap();
        client.update(0).unwrap();
        client.players().count() == 2
    });
    client.set_ready(true);
    wait_until(|| {
        server.update(0).unwrap();
        server.connections().iter().all(|c| c.is_local() || c.is_ready())
    });
    assert!(server.start_game());

    wait_until(|| {
        client.update(0).unwrap();
        client.is_started()
    });
    assert!(server.push_move(0, net_tetris::types::Move::Left));
    wait_until(|| {
        client.update(0).unwrap();
        client.player(0).map(|p| p.board().current_block())
            == server.player(0).map(|p| p.board().current_block())
    });
}
