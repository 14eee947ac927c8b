//! Multiplayer layer - sessions, the packet codec and transports
//!
//! Networking wraps the pure core crate: boards and rules stay deterministic,
//! and this crate decides which machine produces which moves and how they
//! travel.
//!
//! # Module Structure
//!
//! - [`config`]: board size, timing, seed and endpoint settings
//! - [`connection`]: players grouped by owning machine
//! - [`device`]: move sources for local players
//! - [`protocol`]: binary packet codec and protocol errors
//! - [`session`]: game lifecycle and the sync protocol
//! - [`transport`]: the seam between a session and the wire
//! - [`memory`]: in-process transport for tests and tools
//! - [`tcp`]: framed TCP transport on a private tokio runtime
//!
//! # Example
//!
//! ```
//! use net_tetris_net::{GameConfig, MemoryNetwork, ScriptedDevice, Session, Device};
//!
//! let net = MemoryNetwork::new();
//! let mut server = Session::new(GameConfig::default());
//! let host: Vec<Box<dyn Device>> = vec![Box::new(ScriptedDevice::idle("host"))];
//! server.create_server_game(host, Box::new(net.listen()));
//!
//! let mut client = Session::new(GameConfig::default());
//! let guest: Vec<Box<dyn Device>> = vec![Box::new(ScriptedDevice::idle("guest"))];
//! client.create_client_game(guest, Box::new(net.connect().unwrap()));
//!
//! server.update(0).unwrap();
//! client.update(0).unwrap();
//! client.set_ready(true);
//! server.update(0).unwrap();
//! assert!(server.start_game());
//! client.update(0).unwrap();
//! assert!(client.is_started());
//! ```

pub mod config;
pub mod connection;
pub mod device;
pub mod memory;
pub mod protocol;
pub mod session;
pub mod tcp;
pub mod transport;

pub use config::GameConfig;
pub use connection::{Connection, ConnectionKind};
pub use device::{Device, RandomDevice, ScriptedDevice};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use protocol::{ClientPlayer, Packet, ProtocolError, RosterPlayer};
pub use session::{Mode, Session, SessionEvent};
pub use tcp::{TcpTransport, TRANSPORT_VERSION};
pub use transport::{Target, Transport, TransportEvent};
