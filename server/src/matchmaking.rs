//! Play queue and the single match slot
//!
//! Owns the FIFO queue of connections waiting to play, the two participant
//! slots and the process-wide [`MatchState`]. It only tracks identities and
//! transitions; roles, notifications and physics resets are applied by the
//! server state that drives it.

use crate::client_manager::ClientId;
use shared::{MatchState, Role, END_GRACE};
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug)]
pub struct Matchmaking {
    state: MatchState,
    left: Option<ClientId>,
    right: Option<ClientId>,
    queue: VecDeque<ClientId>,
    ended_at: Option<Instant>,
}

impl Default for Matchmaking {
    fn default() -> Self {
        Self::new()
    }
}

impl Matchmaking {
    pub fn new() -> Self {
        Self {
            state: MatchState::Waiting,
            left: None,
            right: None,
            queue: VecDeque::new(),
            ended_at: None,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Adds a connection to the back of the queue.
    ///
    /// Returns false if it was already queued; a connection is never queued twice.
    pub fn enqueue(&mut self, id: ClientId) -> bool {
        if self.queue.contains(&id) {
            return false;
        }
        self.queue.push_back(id);
        true
    }

    /// Removes a connection from the queue, returning whether it was there.
    pub fn dequeue(&mut self, id: ClientId) -> bool {
        match self.queue.iter().position(|&queued| queued == id) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_queued(&self, id: ClientId) -> bool {
        self.queue.contains(&id)
    }

    pub fn queue(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.queue.iter().copied()
    }

    /// Drops queued connections that are no longer eligible, keeping order.
    pub fn retain_eligible<F>(&mut self, mut eligible: F)
    where
        F: FnMut(ClientId) -> bool,
    {
        self.queue.retain(|&id| eligible(id));
    }

    /// Pops the two oldest queued connections if a match can start now.
    ///
    /// Matches only start from WAITING. The first popped becomes LEFT.
    pub fn pop_pair(&mut self) -> Option<(ClientId, ClientId)> {
        if self.state != MatchState::Waiting || self.queue.len() < 2 {
            return None;
        }
        let left = self.queue.pop_front()?;
        let right = self.queue.pop_front()?;
        Some((left, right))
    }

    pub fn begin(&mut self, left: ClientId, right: ClientId) {
        self.left = Some(left);
        self.right = Some(right);
        self.state = MatchState::Playing;
        self.ended_at = None;
    }

    pub fn end(&mut self, now: Instant) {
        self.state = MatchState::Ended;
        self.ended_at = Some(now);
    }

    /// True once an ended match has been shown for the full grace period.
    pub fn grace_elapsed(&self, now: Instant) -> bool {
        match (self.state, self.ended_at) {
            (MatchState::Ended, Some(ended_at)) => {
                now.saturating_duration_since(ended_at) >= END_GRACE
            }
            _ => false,
        }
    }

    /// Clears both slots and returns to WAITING, handing back who was seated.
    pub fn release(&mut self) -> (Option<ClientId>, Option<ClientId>) {
        self.state = MatchState::Waiting;
        self.ended_at = None;
        (self.left.take(), self.right.take())
    }

    /// Which side `id` is seated on, if any.
    pub fn side_of(&self, id: ClientId) -> Option<Role> {
        if self.left == Some(id) {
            Some(Role::Left)
        } else if self.right == Some(id) {
            Some(Role::Right)
        } else {
            None
        }
    }

    pub fn participants(&self) -> (Option<ClientId>, Option<ClientId>) {
        (self.left, self.right)
    }
}
