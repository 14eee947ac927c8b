//! Connections - the players that belong to one participating machine

use net_tetris_core::Player;
use net_tetris_types::ConnectionId;

use crate::device::Device;

/// Per local player steering state
pub(crate) struct Control {
    pub(crate) device: Box<dyn Device>,
    pub(crate) gravity_ms: u32,
}

impl Control {
    pub(crate) fn new(device: Box<dyn Device>) -> Self {
        Self {
            device,
            gravity_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Players driven by devices on this machine
    Local,
    /// Mirrors of players owned by another machine
    Remote,
}

/// A group of players owned by one participant
///
/// Local connections carry one [`Control`] per player, in player order.
pub struct Connection {
    id: ConnectionId,
    ready: bool,
    kind: ConnectionKind,
    pub(crate) players: Vec<Player>,
    pub(crate) controls: Vec<Control>,
}

impl Connection {
    pub(crate) fn local(id: ConnectionId, players: Vec<Player>, controls: Vec<Control>) -> Self {
        Self {
            id,
            ready: false,
            kind: ConnectionKind::Local,
            players,
            controls,
        }
    }

    pub(crate) fn remote(id: ConnectionId, players: Vec<Player>) -> Self {
        Self {
            id,
            ready: false,
            kind: ConnectionKind::Remote,
            players,
            controls: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn is_local(&self) -> bool {
        self.kind == ConnectionKind::Local
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("ready", &self.ready)
            .field("kind", &self.kind)
            .field("players", &self.players.len())
            .finish()
    }
}
