//! Transport seam between the session and the wire
//!
//! A transport moves opaque packet bytes between connections and reports peer
//! lifecycle. It never blocks: the session drains it with [`Transport::try_recv`]
//! once per frame.
//!
//! Topology is a star. The server (connection [`SERVER_ID`]) talks to every
//! client; a client only talks to the server, which relays on its behalf. Each
//! message keeps the id of the connection that produced it so relayed packets
//! can still be checked against their original sender.
//!
//! [`SERVER_ID`]: net_tetris_types::SERVER_ID

use net_tetris_types::ConnectionId;

/// Which peers a message goes to; only meaningful on the server side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    AllExcept(ConnectionId),
    Peer(ConnectionId),
}

impl Target {
    pub fn includes(&self, id: ConnectionId) -> bool {
        match *self {
            Target::All => true,
            Target::AllExcept(excluded) => id != excluded,
            Target::Peer(peer) => id == peer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer opened a connection (server side)
    PeerConnected { id: ConnectionId },
    /// A peer went away (server side)
    PeerDisconnected { id: ConnectionId },
    /// Packet bytes produced by connection `from`
    Received { from: ConnectionId, bytes: Vec<u8> },
    /// The link to the server is gone (client side)
    Closed,
}

pub trait Transport {
    /// Id of this endpoint
    fn id(&self) -> ConnectionId;

    fn try_recv(&mut self) -> Option<TransportEvent>;

    /// Send `bytes` on behalf of connection `from`
    fn send_from(&mut self, target: Target, from: ConnectionId, bytes: &[u8]);

    /// Drop a peer (server side)
    fn disconnect(&mut self, id: ConnectionId);

    fn send(&mut self, target: Target, bytes: &[u8]) {
        let from = self.id();
        self.send_from(target, from, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_includes() {
        assert!(Target::All.includes(3));
        assert!(!Target::AllExcept(3).includes(3));
        assert!(Target::AllExcept(3).includes(4));
        assert!(Target::Peer(2).includes(2));
        assert!(!Target::Peer(2).includes(1));
    }
}
