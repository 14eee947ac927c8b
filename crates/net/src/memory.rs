//! In-process transport
//!
//! A [`MemoryNetwork`] is a hub of per-endpoint inboxes living on one thread.
//! It follows the same star topology and sender rules as the TCP transport, so
//! several sessions can be wired together and stepped in lockstep without
//! sockets or a runtime.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use log::debug;

use crate::transport::{Target, Transport, TransportEvent};
use net_tetris_types::{ConnectionId, SERVER_ID};

#[derive(Debug, Default)]
struct Hub {
    inboxes: HashMap<ConnectionId, VecDeque<TransportEvent>>,
    /// Clients the server dropped; their traffic is discarded
    dropped: HashSet<ConnectionId>,
    next_id: ConnectionId,
    listening: bool,
}

impl Hub {
    fn push(&mut self, to: ConnectionId, event: TransportEvent) {
        if let Some(inbox) = self.inboxes.get_mut(&to) {
            inbox.push_back(event);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the server endpoint
    pub fn listen(&self) -> MemoryTransport {
        let mut hub = self.hub.borrow_mut();
        hub.listening = true;
        hub.next_id = SERVER_ID + 1;
        hub.inboxes.insert(SERVER_ID, VecDeque::new());
        MemoryTransport {
            id: SERVER_ID,
            hub: Rc::clone(&self.hub),
        }
    }

    /// Open a client endpoint, or `None` if nobody is listening
    pub fn connect(&self) -> Option<MemoryTransport> {
        let mut hub = self.hub.borrow_mut();
        if !hub.listening {
            return None;
        }
        let id = hub.next_id;
        hub.next_id = id.checked_add(1)?;
        hub.inboxes.insert(id, VecDeque::new());
        hub.push(SERVER_ID, TransportEvent::PeerConnected { id });
        debug!("memory connection {} opened", id);
        Some(MemoryTransport {
            id,
            hub: Rc::clone(&self.hub),
        })
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    id: ConnectionId,
    hub: Rc<RefCell<Hub>>,
}

impl Transport for MemoryTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.hub.borrow_mut().inboxes.get_mut(&self.id)?.pop_front()
    }

    fn send_from(&mut self, target: Target, from: ConnectionId, bytes: &[u8]) {
        let mut hub = self.hub.borrow_mut();
        if self.id == SERVER_ID {
            let Hub {
                inboxes, dropped, ..
            } = &mut *hub;
            for (&id, inbox) in inboxes.iter_mut() {
                if id != SERVER_ID && !dropped.contains(&id) && target.includes(id) {
                    inbox.push_back(TransportEvent::Received {
                        from,
                        bytes: bytes.to_vec(),
                    });
                }
            }
        } else if !hub.dropped.contains(&self.id) {
            hub.push(
                SERVER_ID,
                TransportEvent::Received {
                    from: self.id,
                    bytes: bytes.to_vec(),
                },
            );
        }
    }

    fn disconnect(&mut self, id: ConnectionId) {
        if self.id != SERVER_ID || id == SERVER_ID {
            return;
        }
        let mut hub = self.hub.borrow_mut();
        if hub.dropped.insert(id) {
            hub.push(id, TransportEvent::Closed);
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let mut hub = self.hub.borrow_mut();
        hub.inboxes.remove(&self.id);
        if self.id == SERVER_ID {
            hub.listening = false;
            for inbox in hub.inboxes.values_mut() {
                inbox.push_back(TransportEvent::Closed);
            }
        } else if !hub.dropped.contains(&self.id) {
            let id = self.id;
            hub.push(SERVER_ID, TransportEvent::PeerDisconnected { id });
        }
    }
}
