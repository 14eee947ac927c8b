//! Session - the game lifecycle and the multiplayer sync protocol
//!
//! A session owns every [`Connection`], the transport and the block bag. It
//! is driven by a single thread calling [`Session::update`] once per frame:
//! pending network traffic is drained and dispatched first, then the local
//! boards advance in fixed steps.
//!
//! # Lifecycle
//!
//! ```text
//! WaitingToConnect -> Local | Server | Client -> started -> (paused <-> running) -> WaitingToConnect
//! ```
//!
//! Only the server side (a local game is its own server) may start a round,
//! and only once every remote connection is ready.
//!
//! # Synchronization
//!
//! Each player's moves are produced only by the machine that owns it. Every
//! accepted local move is sent as `(player, move, next)`, where `next` is the
//! next block type as it was before the move took effect. The receivers set
//! their mirror's next block to it and then apply the move, so a placement
//! spawns the same block everywhere. Block types and garbage rows are rolled
//! only by the owner; everybody else takes the values from the wire.
//!
//! Garbage is rolled by the owner of the clearing player and addressed to the
//! target. The target's owner enqueues it and re-broadcasts it, and mirrors
//! only enqueue the owner's copy, so the rows land at the same point of the
//! target's move stream everywhere.

use std::collections::VecDeque;

use log::{debug, error, info, warn};

use net_tetris_core::{gravity_interval_ms, BlockBag, Board, Player, PlayerInteraction, Rules};
use net_tetris_types::{
    BlockType, ConnectionId, GameEvent, Move, PacketType, PlayerId, MAX_COLUMNS, MIN_COLUMNS,
    SERVER_ID, SPAWN_BUFFER_ROWS,
};

use crate::config::GameConfig;
use crate::connection::{Connection, Control};
use crate::device::Device;
use crate::protocol::{ClientPlayer, Packet, ProtocolError, RosterPlayer};
use crate::transport::{Target, Transport, TransportEvent};

/// Blocks shown on a mirrored board until its owner sends the real ones
const PLACEHOLDER_BLOCK: BlockType = BlockType::I;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    WaitingToConnect,
    Local,
    Server,
    Client,
}

/// Notification for the embedding application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection joined, left, or changed its roster
    NewConnection { connection_id: ConnectionId },
    GameReady {
        connection_id: ConnectionId,
        ready: bool,
    },
    GameStart,
    GamePause { paused: bool },
    /// Every player is out. `high_score` carries the points of a default
    /// single player game that should be checked against the high score list.
    GameOver { high_score: Option<u32> },
}

enum Order {
    AddRows { player_id: PlayerId, rows: u32 },
    ForceGameOver(PlayerId),
    GameIsOver(u32),
    SetLevel { player_id: PlayerId, level: u32 },
}

/// Collects rule side effects until the roster borrow is released
#[derive(Default)]
struct Orders(Vec<Order>);

impl PlayerInteraction for Orders {
    fn add_rows(&mut self, player_id: PlayerId, rows: u32) {
        self.0.push(Order::AddRows { player_id, rows });
    }

    fn force_game_over(&mut self, player_id: PlayerId) {
        self.0.push(Order::ForceGameOver(player_id));
    }

    fn game_is_over(&mut self, points: u32) {
        self.0.push(Order::GameIsOver(points));
    }

    fn set_level(&mut self, player_id: PlayerId, level: u32) {
        self.0.push(Order::SetLevel { player_id, level });
    }
}

fn drain_events(board: &mut Board) -> Vec<GameEvent> {
    std::iter::from_fn(|| board.poll_game_event()).collect()
}

pub struct Session {
    config: GameConfig,
    /// Board size in use; a client adopts the server's
    columns: usize,
    rows: usize,
    mode: Mode,
    id: ConnectionId,
    transport: Option<Box<dyn Transport>>,
    connections: Vec<Connection>,
    rules: Rules,
    bag: BlockBag,
    started: bool,
    round_over: bool,
    paused: bool,
    accept_new_connections: bool,
    next_player_id: PlayerId,
    accumulator_ms: u32,
    high_score: Option<u32>,
    events: VecDeque<SessionEvent>,
}

impl Session {
    /// Out of range board sizes and timings are clamped, see [`GameConfig::clamped`]
    pub fn new(config: GameConfig) -> Self {
        let config = config.clamped();
        Self {
            columns: config.columns,
            rows: config.rows,
            rules: Rules::new(config.max_level),
            bag: BlockBag::new(config.seed),
            config,
            mode: Mode::WaitingToConnect,
            id: SERVER_ID,
            transport: None,
            connections: Vec::new(),
            started: false,
            round_over: false,
            paused: false,
            accept_new_connections: false,
            next_player_id: 0,
            accumulator_ms: 0,
            high_score: None,
            events: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Connection id of this machine
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_round_over(&self) -> bool {
        self.round_over
    }

    pub fn accepts_new_connections(&self) -> bool {
        self.accept_new_connections
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.connections.iter().flat_map(|c| c.players.iter())
    }

    pub fn local_players(&self) -> impl Iterator<Item = &Player> {
        self.connections
            .iter()
            .filter(|c| c.is_local())
            .flat_map(|c| c.players.iter())
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players().find(|p| p.id() == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.connections
            .iter_mut()
            .flat_map(|c| c.players.iter_mut())
            .find(|p| p.id() == id)
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Start a game with no network; this machine acts as its own server
    pub fn create_local_game(&mut self, devices: Vec<Box<dyn Device>>) {
        self.close_game();
        self.mode = Mode::Local;
        self.id = SERVER_ID;
        self.add_local_connection(devices, true);
        self.events.push_back(SessionEvent::NewConnection {
            connection_id: self.id,
        });
    }

    /// Host a lobby on `transport`
    pub fn create_server_game(&mut self, devices: Vec<Box<dyn Device>>, transport: Box<dyn Transport>) {
        self.close_game();
        self.mode = Mode::Server;
        self.id = transport.id();
        self.transport = Some(transport);
        self.accept_new_connections = true;
        self.add_local_connection(devices, true);
        info!("hosting game as connection {}", self.id);
        self.events.push_back(SessionEvent::NewConnection {
            connection_id: self.id,
        });
    }

    /// Join a server through `transport` and announce the local players
    pub fn create_client_game(&mut self, devices: Vec<Box<dyn Device>>, transport: Box<dyn Transport>) {
        self.close_game();
        self.mode = Mode::Client;
        self.id = transport.id();
        self.transport = Some(transport);
        self.add_local_connection(devices, false);

        let players: Vec<ClientPlayer> = self
            .local_players()
            .map(|p| ClientPlayer {
                name: p.name().to_string(),
                ai: p.is_ai(),
            })
            .collect();
        let human_count = players.iter().filter(|p| !p.ai).count().min(u8::MAX as usize) as u8;
        info!("joining game as connection {} with {} players", self.id, players.len());
        self.send(&Packet::ClientInfo {
            connection_id: self.id,
            human_count,
            players,
        });
    }

    fn add_local_connection(&mut self, devices: Vec<Box<dyn Device>>, mint_ids: bool) {
        let mut players = Vec::with_capacity(devices.len());
        let mut controls = Vec::with_capacity(devices.len());
        for (i, device) in devices.into_iter().enumerate() {
            // Clients use provisional ids until the server assigns real ones.
            let id = if mint_ids {
                self.mint_player_id()
            } else {
                PlayerId::MAX.wrapping_sub(i as u8)
            };
            let board = self.new_local_board();
            players.push(Player::new(id, device.name(), device.is_ai(), board));
            controls.push(Control::new(device));
        }
        self.connections
            .push(Connection::local(self.id, players, controls));
    }

    fn new_local_board(&mut self) -> Board {
        let current = self.bag.draw();
        let next = self.bag.draw();
        Board::new(self.columns, self.rows, current, next)
    }

    fn mint_player_id(&mut self) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id = self.next_player_id.wrapping_add(1);
        id
    }

    /// Tear down the transport and forget every connection, without draining
    pub fn close_game(&mut self) {
        if self.mode != Mode::WaitingToConnect {
            info!("closing {:?} game", self.mode);
        }
        self.transport = None;
        self.connections.clear();
        self.mode = Mode::WaitingToConnect;
        self.started = false;
        self.round_over = false;
        self.paused = false;
        self.accept_new_connections = false;
        self.next_player_id = 0;
        self.accumulator_ms = 0;
        self.high_score = None;
        self.columns = self.config.columns;
        self.rows = self.config.rows;
    }

    /// Mark this machine's connection ready or not
    pub fn set_ready(&mut self, ready: bool) {
        let id = self.id;
        let Some(conn) = self.connections.iter_mut().find(|c| c.is_local()) else {
            return;
        };
        if conn.is_ready() == ready {
            return;
        }
        conn.set_ready(ready);
        match self.mode {
            Mode::Client => self.send(&Packet::Ready {
                connection_id: id,
                ready,
            }),
            Mode::Server => self.broadcast_roster(),
            _ => {}
        }
        self.events.push_back(SessionEvent::GameReady {
            connection_id: id,
            ready,
        });
    }

    /// Start a round; returns false if this side may not start it now
    pub fn start_game(&mut self) -> bool {
        if !matches!(self.mode, Mode::Local | Mode::Server) || self.id != SERVER_ID {
            return false;
        }
        if self.started && !self.round_over {
            return false;
        }
        if let Some(conn) = self
            .connections
            .iter()
            .find(|c| !c.is_local() && !c.is_ready())
        {
            debug!("connection {} is not ready", conn.id());
            return false;
        }
        if self.players().next().is_none() {
            return false;
        }

        self.send(&Packet::StartGame);
        self.begin_round();
        true
    }

    fn begin_round(&mut self) {
        self.started = true;
        self.round_over = false;
        self.paused = false;
        self.accept_new_connections = false;
        self.high_score = None;
        self.accumulator_ms = 0;

        let mut total = 0;
        for ci in 0..self.connections.len() {
            let local = self.connections[ci].is_local();
            for pi in 0..self.connections[ci].players.len() {
                let (current, next) = if local {
                    (self.bag.draw(), self.bag.draw())
                } else {
                    let board = self.connections[ci].players[pi].board();
                    (board.current_block().block_type(), board.next_block_type())
                };
                let player = &mut self.connections[ci].players[pi];
                player.reset_stats();
                player.board_mut().restart(current, next);
                drain_events(player.board_mut());
                total += 1;
            }
            for control in &mut self.connections[ci].controls {
                control.gravity_ms = 0;
            }
        }
        self.rules.reset(total);
        info!("round started with {} players", total);
        self.events.push_back(SessionEvent::GameStart);

        if let Some(conn) = self.connections.iter().find(|c| c.is_local()) {
            let packet = Packet::StartBlock {
                connection_id: conn.id(),
                blocks: conn
                    .players()
                    .iter()
                    .map(|p| (p.board().current_block().block_type(), p.board().next_block_type()))
                    .collect(),
            };
            self.send(&packet);
        }
    }

    /// Toggle pause for everybody
    pub fn pause(&mut self) {
        if !self.started {
            return;
        }
        self.send(&Packet::Pause);
        self.toggle_pause();
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        info!("game {}", if self.paused { "paused" } else { "resumed" });
        self.events.push_back(SessionEvent::GamePause {
            paused: self.paused,
        });
    }

    fn is_running(&self) -> bool {
        self.started && !self.paused && !self.round_over
    }

    /// Apply `mv` to a local player right away, outside of its device
    pub fn push_move(&mut self, player_id: PlayerId, mv: Move) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.locate(player_id) {
            Some((ci, pi)) if self.connections[ci].is_local() => {
                self.apply_local_move(ci, pi, mv);
                true
            }
            _ => false,
        }
    }

    /// Rename a local player
    pub fn set_player_name(&mut self, player_id: PlayerId, name: &str) -> bool {
        match self.locate(player_id) {
            Some((ci, pi)) if self.connections[ci].is_local() => {
                self.connections[ci].players[pi].set_name(name);
                self.send(&Packet::PlayerName {
                    player_id,
                    name: name.to_string(),
                });
                true
            }
            _ => false,
        }
    }

    /// Advance the session by `delta_ms` of wall time
    ///
    /// A protocol violation closes the game and is returned.
    pub fn update(&mut self, delta_ms: u32) -> Result<(), ProtocolError> {
        if self.mode == Mode::WaitingToConnect {
            return Ok(());
        }
        if let Err(e) = self.poll_network() {
            error!("protocol error: {}", e);
            self.close_game();
            return Err(e);
        }
        if self.mode == Mode::WaitingToConnect {
            return Ok(());
        }

        self.accumulator_ms = (self.accumulator_ms + delta_ms).min(self.config.max_frame_ms);
        let step_ms = self.config.step_ms.max(1);
        while self.accumulator_ms >= step_ms {
            self.accumulator_ms -= step_ms;
            self.step(step_ms);
        }
        Ok(())
    }

    fn step(&mut self, step_ms: u32) {
        for ci in 0..self.connections.len() {
            if !self.connections[ci].is_local() {
                continue;
            }
            for pi in 0..self.connections[ci].players.len() {
                if !self.is_running() {
                    return;
                }
                let conn = &mut self.connections[ci];
                if conn.players[pi].is_game_over() {
                    continue;
                }
                if let Some(mv) = conn.controls[pi].device.poll_move(conn.players[pi].board()) {
                    self.apply_local_move(ci, pi, mv);
                }

                let conn = &mut self.connections[ci];
                let interval = gravity_interval_ms(conn.players[pi].level());
                let control = &mut conn.controls[pi];
                control.gravity_ms += step_ms;
                if control.gravity_ms >= interval {
                    control.gravity_ms = 0;
                    self.apply_local_move(ci, pi, Move::DownGravity);
                }
            }
        }
    }

    fn send(&mut self, packet: &Packet) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match packet.encode() {
            Ok(bytes) => {
                debug!("send {:?}", packet.packet_type());
                transport.send(Target::All, &bytes);
            }
            Err(e) => error!("dropping {:?}: {}", packet.packet_type(), e),
        }
    }

    fn poll_network(&mut self) -> Result<(), ProtocolError> {
        while let Some(event) = self.transport.as_mut().and_then(|t| t.try_recv()) {
            match event {
                TransportEvent::PeerConnected { id } => self.peer_connected(id),
                TransportEvent::PeerDisconnected { id } => self.peer_disconnected(id),
                TransportEvent::Received { from, bytes } => self.handle_packet(from, &bytes)?,
                TransportEvent::Closed => {
                    warn!("connection to the server was lost");
                    self.close_game();
                }
            }
        }
        Ok(())
    }

    fn peer_connected(&mut self, id: ConnectionId) {
        if self.mode == Mode::Server && self.accept_new_connections {
            info!("connection {} is in the lobby", id);
            return;
        }
        info!("refusing connection {}", id);
        if let Some(transport) = self.transport.as_mut() {
            transport.disconnect(id);
        }
    }

    fn peer_disconnected(&mut self, id: ConnectionId) {
        let Some(ci) = self
            .connections
            .iter()
            .position(|c| c.id() == id && !c.is_local())
        else {
            return;
        };

        if self.started && !self.round_over {
            info!("connection {} left during the round", id);
            for pi in 0..self.connections[ci].players.len() {
                let player = &self.connections[ci].players[pi];
                if player.is_game_over() {
                    continue;
                }
                let player_id = player.id();
                let next = player.board().next_block_type();
                self.send(&Packet::Input {
                    player_id,
                    mv: Move::GameOver,
                    next,
                });
                self.apply_remote_move(ci, pi, Move::GameOver, next);
            }
            return;
        }

        info!("connection {} left the lobby", id);
        self.connections.remove(ci);
        let packet = Packet::ServerInfo {
            connection_id: id,
            ready: false,
            columns: self.wire_columns(),
            rows: self.wire_rows(),
            players: Vec::new(),
        };
        self.send(&packet);
        self.events
            .push_back(SessionEvent::NewConnection { connection_id: id });
    }

    /// Decode and dispatch one packet produced by connection `from`
    ///
    /// Unlike [`Session::update`] this does not close the game on error.
    pub fn handle_packet(&mut self, from: ConnectionId, bytes: &[u8]) -> Result<(), ProtocolError> {
        let packet = Packet::decode(bytes)?;
        debug!("received {:?} from connection {}", packet.packet_type(), from);
        match self.mode {
            Mode::Server => self.send_through(from, &packet, bytes)?,
            Mode::Client => {}
            Mode::Local | Mode::WaitingToConnect => {
                return Err(ProtocolError::IllegalState {
                    packet: packet.packet_type(),
                    state: "without a network game",
                })
            }
        }
        self.dispatch(from, packet)
    }

    /// Server relay filter: vet a client packet and forward it to the other clients
    fn send_through(
        &mut self,
        from: ConnectionId,
        packet: &Packet,
        bytes: &[u8],
    ) -> Result<(), ProtocolError> {
        let packet_type = packet.packet_type();
        let forward = match packet {
            Packet::ClientInfo { .. } => {
                if self.started {
                    return Err(ProtocolError::IllegalState {
                        packet: packet_type,
                        state: "after the game started",
                    });
                }
                false
            }
            Packet::ServerInfo { .. } | Packet::StartGame => {
                return Err(ProtocolError::WrongSender {
                    packet: packet_type,
                    sender: from,
                })
            }
            Packet::Ready { connection_id, .. } => {
                if *connection_id != from {
                    return Err(ProtocolError::WrongSender {
                        packet: packet_type,
                        sender: from,
                    });
                }
                false
            }
            Packet::Input { .. } | Packet::StartBlock { .. } | Packet::Tetris { .. }
                if !self.started =>
            {
                return Err(ProtocolError::IllegalState {
                    packet: packet_type,
                    state: "before the game started",
                });
            }
            Packet::Input { player_id, .. }
            | Packet::PlayerLevel { player_id, .. }
            | Packet::PlayerName { player_id, .. } => {
                self.remote_player(from, *player_id, packet_type)?;
                true
            }
            Packet::StartBlock { connection_id, .. } => {
                if *connection_id != from {
                    return Err(ProtocolError::WrongSender {
                        packet: packet_type,
                        sender: from,
                    });
                }
                true
            }
            Packet::Tetris { player_id, blocks } => {
                self.locate(*player_id)
                    .ok_or(ProtocolError::UnknownPlayer(*player_id))?;
                self.check_garbage(blocks)?;
                true
            }
            Packet::Pause => true,
        };

        if forward {
            if let Some(transport) = self.transport.as_mut() {
                transport.send_from(Target::AllExcept(from), from, bytes);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, from: ConnectionId, packet: Packet) -> Result<(), ProtocolError> {
        match packet {
            Packet::ClientInfo {
                connection_id,
                players,
                ..
            } => self.on_client_info(from, connection_id, players),
            Packet::ServerInfo {
                connection_id,
                ready,
                columns,
                rows,
                players,
            } => self.on_server_info(from, connection_id, ready, columns, rows, players),
            Packet::StartGame => {
                if from != SERVER_ID || self.mode != Mode::Client {
                    return Err(ProtocolError::WrongSender {
                        packet: PacketType::StartGame,
                        sender: from,
                    });
                }
                self.begin_round();
                Ok(())
            }
            Packet::StartBlock {
                connection_id,
                blocks,
            } => self.on_start_block(from, connection_id, blocks),
            Packet::Input { player_id, mv, next } => self.on_input(from, player_id, mv, next),
            Packet::Tetris { player_id, blocks } => self.on_tetris(from, player_id, blocks),
            Packet::Ready {
                connection_id,
                ready,
            } => self.on_ready(from, connection_id, ready),
            Packet::PlayerLevel { player_id, level } => {
                let (ci, pi) = self.remote_player(from, player_id, PacketType::PlayerLevel)?;
                self.connections[ci].players[pi].set_level(level as u32);
                Ok(())
            }
            Packet::PlayerName { player_id, name } => {
                let (ci, pi) = self.remote_player(from, player_id, PacketType::PlayerName)?;
                self.connections[ci].players[pi].set_name(name);
                let connection_id = self.connections[ci].id();
                self.events
                    .push_back(SessionEvent::NewConnection { connection_id });
                Ok(())
            }
            Packet::Pause => {
                self.toggle_pause();
                Ok(())
            }
        }
    }

    fn on_client_info(
        &mut self,
        from: ConnectionId,
        connection_id: ConnectionId,
        entries: Vec<ClientPlayer>,
    ) -> Result<(), ProtocolError> {
        if self.mode != Mode::Server || connection_id != from {
            return Err(ProtocolError::WrongSender {
                packet: PacketType::ClientInfo,
                sender: from,
            });
        }

        let mut players = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = self.mint_player_id();
            let board = Board::new(self.columns, self.rows, PLACEHOLDER_BLOCK, PLACEHOLDER_BLOCK);
            players.push(Player::new(id, entry.name, entry.ai, board));
        }
        info!("connection {} joined with {} players", from, players.len());

        match self.connections.iter_mut().find(|c| c.id() == from) {
            Some(conn) if !conn.is_local() => conn.players = players,
            Some(_) => {
                return Err(ProtocolError::WrongSender {
                    packet: PacketType::ClientInfo,
                    sender: from,
                })
            }
            None => self.connections.push(Connection::remote(from, players)),
        }

        self.broadcast_roster();
        self.events
            .push_back(SessionEvent::NewConnection { connection_id: from });
        Ok(())
    }

    fn on_server_info(
        &mut self,
        from: ConnectionId,
        connection_id: ConnectionId,
        ready: bool,
        columns: u8,
        rows: u8,
        roster: Vec<RosterPlayer>,
    ) -> Result<(), ProtocolError> {
        if from != SERVER_ID || self.mode != Mode::Client {
            return Err(ProtocolError::WrongSender {
                packet: PacketType::ServerInfo,
                sender: from,
            });
        }
        if self.started && !self.round_over {
            return Err(ProtocolError::IllegalState {
                packet: PacketType::ServerInfo,
                state: "while a round is running",
            });
        }

        let (columns, rows) = (columns as usize, rows as usize);
        if columns != self.columns || rows != self.rows {
            if !(MIN_COLUMNS..=MAX_COLUMNS).contains(&columns) || rows < SPAWN_BUFFER_ROWS {
                return Err(ProtocolError::MalformedPacket(format!(
                    "board {}x{} is out of range",
                    columns, rows
                )));
            }
            self.adopt_board_size(columns, rows);
        }

        if connection_id == self.id {
            let Some(conn) = self.connections.iter_mut().find(|c| c.is_local()) else {
                return Ok(());
            };
            for (player, entry) in conn.players.iter_mut().zip(&roster) {
                if player.id() != entry.player_id {
                    debug!("local player {} is now player {}", player.id(), entry.player_id);
                    player.set_id(entry.player_id);
                }
            }
            if conn.is_ready() != ready {
                conn.set_ready(ready);
                self.events.push_back(SessionEvent::GameReady {
                    connection_id,
                    ready,
                });
            }
            return Ok(());
        }

        let position = self.connections.iter().position(|c| c.id() == connection_id);
        if roster.is_empty() {
            if let Some(ci) = position {
                info!("connection {} left", connection_id);
                self.connections.remove(ci);
                self.events
                    .push_back(SessionEvent::NewConnection { connection_id });
            }
            return Ok(());
        }

        let players: Vec<Player> = roster
            .into_iter()
            .map(|entry| {
                let board = Board::new(self.columns, self.rows, entry.current, entry.next);
                let mut player = Player::new(entry.player_id, entry.name, entry.ai, board);
                player.set_level(entry.level as u32);
                player.set_points(entry.points);
                player
            })
            .collect();

        match position {
            Some(ci) => {
                let conn = &mut self.connections[ci];
                conn.players = players;
                if conn.is_ready() != ready {
                    conn.set_ready(ready);
                    self.events.push_back(SessionEvent::GameReady {
                        connection_id,
                        ready,
                    });
                }
            }
            None => {
                let mut conn = Connection::remote(connection_id, players);
                conn.set_ready(ready);
                self.connections.push(conn);
                self.events
                    .push_back(SessionEvent::NewConnection { connection_id });
            }
        }
        Ok(())
    }

    fn adopt_board_size(&mut self, columns: usize, rows: usize) {
        info!("using the server's {}x{} board", columns, rows);
        self.columns = columns;
        self.rows = rows;
        for ci in 0..self.connections.len() {
            let local = self.connections[ci].is_local();
            for pi in 0..self.connections[ci].players.len() {
                let board = if local {
                    self.new_local_board()
                } else {
                    Board::new(columns, rows, PLACEHOLDER_BLOCK, PLACEHOLDER_BLOCK)
                };
                *self.connections[ci].players[pi].board_mut() = board;
            }
        }
    }

    fn on_start_block(
        &mut self,
        from: ConnectionId,
        connection_id: ConnectionId,
        blocks: Vec<(BlockType, BlockType)>,
    ) -> Result<(), ProtocolError> {
        if !self.started {
            return Err(ProtocolError::IllegalState {
                packet: PacketType::StartBlock,
                state: "before the game started",
            });
        }
        let ci = self
            .connections
            .iter()
            .position(|c| c.id() == connection_id)
            .ok_or(ProtocolError::UnknownConnection(connection_id))?;
        let conn = &mut self.connections[ci];
        if from != connection_id || conn.is_local() {
            return Err(ProtocolError::WrongSender {
                packet: PacketType::StartBlock,
                sender: from,
            });
        }
        if blocks.len() != conn.players.len()
            || blocks.iter().any(|(c, n)| !c.is_piece() || !n.is_piece())
        {
            return Err(ProtocolError::MalformedPacket(format!(
                "StartBlock for connection {} does not match its {} players",
                connection_id,
                conn.players.len()
            )));
        }

        for (player, (current, next)) in conn.players.iter_mut().zip(blocks) {
            player.board_mut().restart(current, next);
            drain_events(player.board_mut());
        }
        Ok(())
    }

    fn on_input(
        &mut self,
        from: ConnectionId,
        player_id: PlayerId,
        mv: Move,
        next: BlockType,
    ) -> Result<(), ProtocolError> {
        if !self.started {
            return Err(ProtocolError::IllegalState {
                packet: PacketType::Input,
                state: "before the game started",
            });
        }
        let (ci, pi) = self.remote_player(from, player_id, PacketType::Input)?;
        if !next.is_piece() {
            return Err(ProtocolError::MalformedPacket(format!(
                "next block {:?} for player {}",
                next, player_id
            )));
        }
        self.apply_remote_move(ci, pi, mv, next);
        Ok(())
    }

    fn on_tetris(
        &mut self,
        from: ConnectionId,
        player_id: PlayerId,
        blocks: Vec<BlockType>,
    ) -> Result<(), ProtocolError> {
        if !self.started {
            return Err(ProtocolError::IllegalState {
                packet: PacketType::Tetris,
                state: "before the game started",
            });
        }
        let (ci, pi) = self
            .locate(player_id)
            .ok_or(ProtocolError::UnknownPlayer(player_id))?;
        self.check_garbage(&blocks)?;
        let conn = &mut self.connections[ci];
        if conn.is_local() {
            conn.players[pi].board_mut().add_rows(&blocks);
            self.send(&Packet::Tetris { player_id, blocks });
        } else if from == conn.id() {
            conn.players[pi].board_mut().add_rows(&blocks);
        } else {
            debug!("garbage for player {} waits for its owner", player_id);
        }
        Ok(())
    }

    /// Garbage must be whole rows of this board holding no walls
    fn check_garbage(&self, blocks: &[BlockType]) -> Result<(), ProtocolError> {
        if blocks.is_empty() || blocks.len() % self.columns != 0 {
            return Err(ProtocolError::MalformedPacket(format!(
                "{} garbage cells for a board {} columns wide",
                blocks.len(),
                self.columns
            )));
        }
        if blocks.contains(&BlockType::Wall) {
            return Err(ProtocolError::MalformedPacket(
                "garbage row contains a wall".to_string(),
            ));
        }
        Ok(())
    }

    fn on_ready(
        &mut self,
        from: ConnectionId,
        connection_id: ConnectionId,
        ready: bool,
    ) -> Result<(), ProtocolError> {
        if self.mode != Mode::Server || connection_id != from {
            return Err(ProtocolError::WrongSender {
                packet: PacketType::Ready,
                sender: from,
            });
        }
        let conn = self
            .connections
            .iter_mut()
            .find(|c| c.id() == from && !c.is_local())
            .ok_or(ProtocolError::UnknownConnection(from))?;
        conn.set_ready(ready);
        info!("connection {} is {}", from, if ready { "ready" } else { "not ready" });
        self.events.push_back(SessionEvent::GameReady {
            connection_id: from,
            ready,
        });
        self.broadcast_roster();
        Ok(())
    }

    fn wire_columns(&self) -> u8 {
        u8::try_from(self.columns).unwrap_or(u8::MAX)
    }

    fn wire_rows(&self) -> u8 {
        u8::try_from(self.rows).unwrap_or(u8::MAX)
    }

    fn roster_packet(&self, conn: &Connection) -> Packet {
        Packet::ServerInfo {
            connection_id: conn.id(),
            ready: conn.is_ready(),
            columns: self.wire_columns(),
            rows: self.wire_rows(),
            players: conn
                .players()
                .iter()
                .map(|p| RosterPlayer {
                    player_id: p.id(),
                    name: p.name().to_string(),
                    level: p.level().min(u8::MAX as u32) as u8,
                    points: p.points(),
                    ai: p.is_ai(),
                    current: p.board().current_block().block_type(),
                    next: p.board().next_block_type(),
                })
                .collect(),
        }
    }

    fn broadcast_roster(&mut self) {
        let packets: Vec<Packet> = self
            .connections
            .iter()
            .map(|c| self.roster_packet(c))
            .collect();
        for packet in &packets {
            self.send(packet);
        }
    }

    fn locate(&self, player_id: PlayerId) -> Option<(usize, usize)> {
        self.connections.iter().enumerate().find_map(|(ci, c)| {
            c.players
                .iter()
                .position(|p| p.id() == player_id)
                .map(|pi| (ci, pi))
        })
    }

    fn is_local_player(&self, player_id: PlayerId) -> bool {
        self.locate(player_id)
            .map_or(false, |(ci, _)| self.connections[ci].is_local())
    }

    /// Find a mirrored player that `from` may speak for
    fn remote_player(
        &self,
        from: ConnectionId,
        player_id: PlayerId,
        packet: PacketType,
    ) -> Result<(usize, usize), ProtocolError> {
        let (ci, pi) = self
            .locate(player_id)
            .ok_or(ProtocolError::UnknownPlayer(player_id))?;
        let conn = &self.connections[ci];
        if conn.is_local() || (from != conn.id() && from != SERVER_ID) {
            return Err(ProtocolError::WrongSender {
                packet,
                sender: from,
            });
        }
        Ok((ci, pi))
    }

    fn apply_local_move(&mut self, ci: usize, pi: usize, mv: Move) {
        let player = &mut self.connections[ci].players[pi];
        let player_id = player.id();
        let board = player.board_mut();
        let next = board.next_block_type();
        board.update(mv);
        let mut events = drain_events(board);
        if events.is_empty() {
            return;
        }
        if events.contains(&GameEvent::CurrentBlockUpdated) {
            board.set_next_block_type(self.bag.draw());
            events.extend(drain_events(board));
        }

        if self.started {
            self.send(&Packet::Input { player_id, mv, next });
        }
        self.process_events(player_id, events);
    }

    fn apply_remote_move(&mut self, ci: usize, pi: usize, mv: Move, next: BlockType) {
        let player = &mut self.connections[ci].players[pi];
        let player_id = player.id();
        let board = player.board_mut();
        if board.next_block_type() != next {
            board.set_next_block_type(next);
        }
        board.update(mv);
        let events = drain_events(board);
        self.process_events(player_id, events);
    }

    /// Run the rules over one player's events and carry out what they order
    fn process_events(&mut self, source: PlayerId, events: Vec<GameEvent>) {
        if !self.started {
            return;
        }
        let source_local = self.is_local_player(source);
        for event in events {
            let mut orders = Orders::default();
            {
                let mut players: Vec<&mut Player> = self
                    .connections
                    .iter_mut()
                    .flat_map(|c| c.players.iter_mut())
                    .collect();
                let Some(index) = players.iter().position(|p| p.id() == source) else {
                    continue;
                };
                self.rules.apply(&mut players, index, event, &mut orders);
            }
            for order in orders.0 {
                self.execute(source_local, order);
            }
        }
        self.check_round_over();
    }

    fn execute(&mut self, source_local: bool, order: Order) {
        match order {
            Order::AddRows { player_id, rows } => {
                if source_local {
                    self.send_garbage(player_id, rows);
                }
            }
            Order::ForceGameOver(player_id) => {
                if let Some((ci, pi)) = self.locate(player_id) {
                    if self.connections[ci].is_local() {
                        info!("player {} is the last one standing", player_id);
                        self.apply_local_move(ci, pi, Move::GameOver);
                    }
                }
            }
            Order::GameIsOver(points) => self.high_score = Some(points),
            Order::SetLevel { player_id, level } => {
                if self.is_local_player(player_id) {
                    debug!("player {} reached level {}", player_id, level);
                    self.send(&Packet::PlayerLevel {
                        player_id,
                        level: level.min(u8::MAX as u32) as u8,
                    });
                }
            }
        }
    }

    fn send_garbage(&mut self, target: PlayerId, rows: u32) {
        let Some((ci, pi)) = self.locate(target) else {
            return;
        };
        let blocks = self.bag.garbage_rows(rows, self.columns);
        if self.connections[ci].is_local() {
            self.connections[ci].players[pi]
                .board_mut()
                .add_rows(&blocks);
        }
        debug!("sending {} garbage rows to player {}", rows, target);
        self.send(&Packet::Tetris {
            player_id: target,
            blocks,
        });
    }

    fn check_round_over(&mut self) {
        if self.started && !self.round_over && self.rules.alive_players() == 0 {
            self.round_over = true;
            info!("round over");
            self.events.push_back(SessionEvent::GameOver {
                high_score: self.high_score.take(),
            });
        }
    }
}
