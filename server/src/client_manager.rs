//! Connection registry for the pong server
//!
//! Tracks every accepted connection together with its display name, role,
//! lobby status, held paddle keys and the buffered read/write halves used by
//! the game loop. Display names are unique across all live connections.

use crate::game::PaddleInput;
use log::{debug, info};
use shared::{
    encode_line, LineBuffer, LobbyEntry, Role, ServerMessage, Status, TransportError,
};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;

pub type ClientId = u32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("name `{0}` is already in use")]
    NameTaken(String),

    #[error("no client with id {0}")]
    UnknownClient(ClientId),
}

/// Non-blocking source of inbound bytes for one connection.
///
/// Follows socket conventions: `Ok(0)` is end of stream and
/// [`io::ErrorKind::WouldBlock`] means nothing is available yet.
pub trait Inbound: Send {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl Inbound for OwnedReadHalf {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.try_read(buf)
    }
}

/// Inbound side that never yields data, for connections driven without a socket.
#[derive(Debug, Default)]
pub struct Detached;

impl Inbound for Detached {
    fn read_available(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }
}

/// One live connection.
pub struct Client {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub name: Option<String>,
    pub role: Role,
    pub status: Status,
    pub input: PaddleInput,
    inbox: LineBuffer,
    reader: Box<dyn Inbound>,
    outbox: mpsc::Sender<String>,
}

impl Client {
    pub fn new(
        id: ClientId,
        addr: SocketAddr,
        reader: Box<dyn Inbound>,
        outbox: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id,
            addr,
            name: None,
            role: Role::Spectator,
            status: Status::Waiting,
            input: PaddleInput::default(),
            inbox: LineBuffer::new(),
            reader,
            outbox,
        }
    }

    /// Reads whatever is available without blocking and returns the complete lines.
    pub fn poll_lines(&mut self) -> Result<Vec<String>, TransportError> {
        let reader = &mut self.reader;
        self.inbox.poll(|buf| reader.read_available(buf))
    }

    /// Queues one message for the writer task.
    ///
    /// Returns false when the outbox is full or its writer has gone away;
    /// the caller treats that connection as dead.
    pub fn send(&self, message: &ServerMessage) -> bool {
        match self.outbox.try_send(encode_line(message)) {
            Ok(()) => true,
            Err(e) => {
                debug!("Client {} outbox rejected message: {}", self.id, e);
                false
            }
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("?")
    }

    pub fn lobby_entry(&self) -> Option<LobbyEntry> {
        self.name.as_ref().map(|name| LobbyEntry {
            name: name.clone(),
            role: self.role,
            status: self.status,
        })
    }
}

/// All live connections, ordered by id so the lobby lists them in join order.
pub struct ClientManager {
    clients: BTreeMap<ClientId, Client>,
    names: HashMap<String, ClientId>,
    next_client_id: ClientId,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
            names: HashMap::new(),
            next_client_id: 1,
        }
    }

    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        reader: Box<dyn Inbound>,
        outbox: mpsc::Sender<String>,
    ) -> ClientId {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(id, Client::new(id, addr, reader, outbox));
        info!("Client {} connected from {}", id, addr);
        id
    }

    /// Removes a connection and frees its name. Removing twice is a no-op.
    pub fn remove_client(&mut self, id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        if let Some(name) = &client.name {
            if self.names.get(name) == Some(&id) {
                self.names.remove(name);
            }
        }
        info!(
            "Client {} ({}) from {} disconnected",
            id,
            client.display_name(),
            client.addr
        );
        Some(client)
    }

    /// Binds `name` to `id`, releasing any name the connection held before.
    ///
    /// Claiming the name the connection already holds succeeds.
    pub fn claim_name(&mut self, id: ClientId, name: &str) -> Result<(), RegistryError> {
        if let Some(&owner) = self.names.get(name) {
            if owner != id {
                return Err(RegistryError::NameTaken(name.to_string()));
            }
        }
        let client = self
            .clients
            .get_mut(&id)
            .ok_or(RegistryError::UnknownClient(id))?;

        if let Some(old) = client.name.replace(name.to_string()) {
            if old != name {
                self.names.remove(&old);
            }
        }
        self.names.insert(name.to_string(), id);
        Ok(())
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn is_named(&self, id: ClientId) -> bool {
        self.clients.get(&id).is_some_and(|c| c.name.is_some())
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Lobby roster of every named connection.
    pub fn lobby(&self) -> Vec<LobbyEntry> {
        self.clients.values().filter_map(Client::lobby_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
