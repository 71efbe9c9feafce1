//! Everything guarded by the server's single state lock
//!
//! [`ServerState`] ties the connection registry, the play queue and match
//! lifecycle, and the physics simulation together. The accept task and the
//! game loop both go through it, so every transition below is serialized.
//!
//! Sends never block: each connection owns a bounded outbox drained by its own
//! writer task. A send that cannot be queued marks the connection dead, and
//! dead connections are only unregistered after the current fan-out is done.

use crate::client_manager::{ClientId, ClientManager, Inbound, RegistryError};
use crate::game::{FixedTimestep, GameState, PaddleInput, StepOutcome};
use crate::matchmaking::Matchmaking;
use log::{debug, info, warn};
use shared::{
    ClientMessage, ErrorCode, InputKey, MatchState, ProtocolError, Role, ServerMessage, Status,
    TransportError,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub const WELCOME: &str = "Welcome! Send REQ_PLAY to join the queue.";
pub const OPPONENT_LEFT: &str = "Opponent disconnected. Back to lobby.";

pub struct ServerState {
    clients: ClientManager,
    matchmaking: Matchmaking,
    game: GameState,
    timestep: FixedTimestep,
    dead: Vec<ClientId>,
}

impl ServerState {
    pub fn new(game: GameState) -> Self {
        Self {
            clients: ClientManager::new(),
            matchmaking: Matchmaking::new(),
            game,
            timestep: FixedTimestep::default(),
            dead: Vec::new(),
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn matchmaking(&self) -> &Matchmaking {
        &self.matchmaking
    }

    pub fn match_state(&self) -> MatchState {
        self.matchmaking.state()
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut GameState {
        &mut self.game
    }

    /// Registers a freshly accepted connection and greets it.
    pub fn accept(
        &mut self,
        addr: SocketAddr,
        reader: Box<dyn Inbound>,
        outbox: mpsc::Sender<String>,
    ) -> ClientId {
        let id = self.clients.add_client(addr, reader, outbox);
        self.send(id, &ServerMessage::Role(Role::Spectator));
        self.send(id, &ServerMessage::Match(self.matchmaking.state()));
        self.broadcast_lobby();
        id
    }

    /// One pass of the game loop: drain sockets, pair players, run due ticks.
    pub fn run_iteration(&mut self, elapsed: Duration, now: Instant) {
        self.poll_clients();
        self.maybe_start_match();

        let ticks = self.timestep.advance(elapsed);
        for _ in 0..ticks {
            self.tick(now);
            self.broadcast_state();
        }

        self.reap_dead();
    }

    /// Reads every connection once without blocking and dispatches complete lines.
    pub fn poll_clients(&mut self) {
        for id in self.clients.ids() {
            let polled = match self.clients.get_mut(id) {
                Some(client) => client.poll_lines(),
                None => continue,
            };
            match polled {
                Ok(lines) => {
                    for line in lines {
                        self.handle_line(id, &line);
                    }
                }
                Err(TransportError::PeerClosed) => {
                    debug!("Client {} closed the connection", id);
                    self.mark_dead(id);
                }
                Err(e) => {
                    warn!("Read from client {} failed: {}", id, e);
                    self.mark_dead(id);
                }
            }
        }
    }

    /// Parses and applies one inbound line. Malformed lines are dropped.
    pub fn handle_line(&mut self, id: ClientId, line: &str) {
        match line.parse::<ClientMessage>() {
            Ok(message) => self.handle_message(id, message),
            Err(ProtocolError::InvalidName) => {
                self.send(id, &ServerMessage::Error(ErrorCode::InvalidName));
            }
            Err(e) => debug!("Dropping line from client {}: {:?} ({})", id, line, e),
        }
    }

    pub fn handle_message(&mut self, id: ClientId, message: ClientMessage) {
        if !self.clients.is_named(id) && !matches!(message, ClientMessage::Hello(_)) {
            debug!("Client {} must send HELLO first", id);
            return;
        }

        match message {
            ClientMessage::Hello(name) => self.hello(id, &name),
            ClientMessage::ReqPlay => self.request_play(id),
            ClientMessage::CancelPlay => self.cancel_play(id),
            ClientMessage::Input { key, pressed } => self.set_input(id, key, pressed),
            ClientMessage::Chat(text) => self.chat(id, &text),
        }
    }

    fn hello(&mut self, id: ClientId, name: &str) {
        match self.clients.claim_name(id, name) {
            Ok(()) => {
                info!("Client {} is now known as {}", id, name);
                let role = self.clients.get(id).map_or(Role::Spectator, |c| c.role);
                self.send(id, &ServerMessage::Role(role));
                self.send(id, &ServerMessage::Match(self.matchmaking.state()));
                self.send(id, &ServerMessage::system(WELCOME));
                self.broadcast_lobby();
            }
            Err(RegistryError::NameTaken(name)) => {
                debug!("Client {} asked for taken name {}", id, name);
                self.send(id, &ServerMessage::Error(ErrorCode::NameTaken));
            }
            Err(e) => warn!("Name claim for client {} failed: {}", id, e),
        }
    }

    fn request_play(&mut self, id: ClientId) {
        let Some(client) = self.clients.get_mut(id) else {
            return;
        };
        if client.status == Status::Playing {
            return;
        }
        client.status = Status::Queued;
        if self.matchmaking.enqueue(id) {
            debug!("Client {} queued", id);
        }
        self.broadcast_lobby();
        self.maybe_start_match();
    }

    fn cancel_play(&mut self, id: ClientId) {
        if !self.matchmaking.dequeue(id) {
            return;
        }
        if let Some(client) = self.clients.get_mut(id) {
            client.status = Status::Waiting;
        }
        debug!("Client {} left the queue", id);
        self.broadcast_lobby();
    }

    fn set_input(&mut self, id: ClientId, key: InputKey, pressed: bool) {
        let Some(client) = self.clients.get_mut(id) else {
            return;
        };
        if !client.role.is_player() {
            return;
        }
        match key {
            InputKey::Up => client.input.up = pressed,
            InputKey::Down => client.input.down = pressed,
        }
    }

    fn chat(&mut self, id: ClientId, text: &str) {
        let Some(client) = self.clients.get(id) else {
            return;
        };
        let line = format!("{}: {}", client.display_name(), text);
        self.broadcast(&ServerMessage::Chat(line));
    }

    /// Starts a match from the two oldest eligible queued connections, if any.
    pub fn maybe_start_match(&mut self) {
        if self.matchmaking.state() != MatchState::Waiting {
            return;
        }

        let clients = &self.clients;
        let dead = &self.dead;
        self.matchmaking.retain_eligible(|id| {
            !dead.contains(&id)
                && clients
                    .get(id)
                    .is_some_and(|c| c.name.is_some() && c.status == Status::Queued)
        });

        let Some((left, right)) = self.matchmaking.pop_pair() else {
            return;
        };

        self.matchmaking.begin(left, right);
        self.game.reset(true);

        for (id, role) in [(left, Role::Left), (right, Role::Right)] {
            if let Some(client) = self.clients.get_mut(id) {
                client.role = role;
                client.status = Status::Playing;
                client.input = PaddleInput::default();
            }
            self.send(id, &ServerMessage::Role(role));
            self.send(id, &ServerMessage::Match(MatchState::Playing));
        }

        info!(
            "Match started: {} (LEFT) vs {} (RIGHT)",
            self.name_of(left),
            self.name_of(right)
        );
        self.broadcast_lobby();
    }

    /// Advances the match lifecycle by one fixed tick.
    pub fn tick(&mut self, now: Instant) {
        match self.matchmaking.state() {
            MatchState::Waiting => {}
            MatchState::Ended => {
                if self.matchmaking.grace_elapsed(now) {
                    self.finish_match();
                }
            }
            MatchState::Playing => {
                let (Some(left), Some(right)) = self.matchmaking.participants() else {
                    warn!("Match running without both players, returning to lobby");
                    self.release_match();
                    self.broadcast_lobby();
                    return;
                };

                let left_input = self.input_of(left);
                let right_input = self.input_of(right);
                let dt = self.timestep.dt();

                match self.game.step(dt, left_input, right_input) {
                    StepOutcome::Won(winner) => self.end_match(winner, now),
                    StepOutcome::Point(_) | StepOutcome::Rally => {}
                }

                if self.game.tick % 600 == 0 {
                    debug!(
                        "Tick {}: {} clients, score {}:{}",
                        self.game.tick,
                        self.clients.len(),
                        self.game.sl,
                        self.game.sr
                    );
                }
            }
        }
    }

    fn end_match(&mut self, winner: Role, now: Instant) {
        let (sl, sr) = (self.game.sl, self.game.sr);
        info!("Match over: {} wins {}:{}", winner, sl, sr);

        self.broadcast(&ServerMessage::End { winner, sl, sr });
        self.matchmaking.end(now);

        let (left, right) = self.matchmaking.participants();
        for id in [left, right].into_iter().flatten() {
            self.send(id, &ServerMessage::Match(MatchState::Ended));
        }
    }

    /// Grace period over: both players go back to the lobby.
    fn finish_match(&mut self) {
        self.release_match();
        self.broadcast_lobby();
        self.maybe_start_match();
    }

    /// Clears both slots, demotes whoever was seated and fully resets the simulation.
    fn release_match(&mut self) -> Vec<ClientId> {
        let (left, right) = self.matchmaking.release();
        let released: Vec<ClientId> = [left, right].into_iter().flatten().collect();
        for &id in &released {
            self.demote(id);
        }
        self.game.reset(true);
        released
    }

    fn demote(&mut self, id: ClientId) {
        if let Some(client) = self.clients.get_mut(id) {
            client.role = Role::Spectator;
            client.status = Status::Waiting;
            client.input = PaddleInput::default();
        }
        self.send(id, &ServerMessage::Role(Role::Spectator));
        self.send(id, &ServerMessage::Match(MatchState::Waiting));
    }

    /// Removes a connection and everything that references it. Idempotent.
    pub fn unregister(&mut self, id: ClientId) {
        if self.clients.remove_client(id).is_none() {
            return;
        }
        self.matchmaking.dequeue(id);

        if self.matchmaking.side_of(id).is_some() {
            for other in self.release_match() {
                if other != id {
                    self.send(other, &ServerMessage::system(OPPONENT_LEFT));
                }
            }
            info!("Participant {} left, match cancelled", id);
        }

        self.broadcast_lobby();
    }

    /// Unregisters every connection marked dead, including ones that fail
    /// during the resulting lobby broadcasts.
    pub fn reap_dead(&mut self) -> usize {
        let mut reaped = 0;
        while !self.dead.is_empty() {
            for id in std::mem::take(&mut self.dead) {
                if self.clients.contains(id) {
                    self.unregister(id);
                    reaped += 1;
                }
            }
        }
        reaped
    }

    pub fn broadcast_lobby(&mut self) {
        let entries = self.clients.lobby();
        self.broadcast(&ServerMessage::Lobby(entries));
    }

    /// Sends the current snapshot to everyone while a match is visible.
    pub fn broadcast_state(&mut self) {
        match self.matchmaking.state() {
            MatchState::Playing | MatchState::Ended => {
                let snapshot = self.game.snapshot();
                self.broadcast(&ServerMessage::State(snapshot));
            }
            MatchState::Waiting => {}
        }
    }

    fn broadcast(&mut self, message: &ServerMessage) {
        let failed: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|client| !client.send(message))
            .map(|client| client.id)
            .collect();
        for id in failed {
            self.mark_dead(id);
        }
    }

    fn send(&mut self, id: ClientId, message: &ServerMessage) {
        let delivered = self.clients.get(id).map(|client| client.send(message));
        if delivered == Some(false) {
            self.mark_dead(id);
        }
    }

    fn mark_dead(&mut self, id: ClientId) {
        if !self.dead.contains(&id) {
            self.dead.push(id);
        }
    }

    fn input_of(&self, id: ClientId) -> PaddleInput {
        self.clients.get(id).map(|c| c.input).unwrap_or_default()
    }

    fn name_of(&self, id: ClientId) -> String {
        self.clients
            .get(id)
            .map_or_else(|| id.to_string(), |c| c.display_name().to_string())
    }
}
