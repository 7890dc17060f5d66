//! Drag Arbiter — per-marker epoch/sequence state machine that arbitrates
//! concurrent drags of the same marker.
//!
//! Every drag attempt owns an *epoch*: a monotonically increasing number
//! that identifies one continuous drag gesture. Within an epoch, `seq`
//! orders the individual move updates. When two peers start dragging the
//! same marker in the same tick, the peer with the lexicographically
//! smaller id wins the tiebreak and the other's local drag is cancelled
//! locally without sending anything (owner-wins).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ids::EntityId;
use crate::model::Pos;

pub const WATCHDOG_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);
pub const WATCHDOG_MAX_DURATION: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct DragState {
    pub marker_id: EntityId,
    /// Monotonic per-marker epoch counter; bumped every time a fresh drag
    /// starts (local or adopted from a remote).
    pub epoch: u32,
    /// True once the current epoch has been ended (MoveState End observed
    /// or finalized locally); a closed epoch never accepts further moves.
    pub closed: bool,
    pub last_seq: u32,
    pub owner_peer_id: Option<String>,
    pub locally_dragging: bool,
    pub locally_proposed_epoch: Option<u32>,
    pub local_seq: u32,
    pub started_at: Instant,
    pub last_activity: Instant,
}

impl DragState {
    fn idle(marker_id: EntityId, now: Instant) -> Self {
        Self {
            marker_id,
            epoch: 0,
            closed: true,
            last_seq: 0,
            owner_peer_id: None,
            locally_dragging: false,
            locally_proposed_epoch: None,
            local_seq: 0,
            started_at: now,
            last_activity: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragWatchdogEvent {
    /// No activity for `WATCHDOG_INACTIVITY_TIMEOUT`; report-only.
    Stalled { marker_id: EntityId, epoch: u32 },
    /// A single epoch has been open longer than `WATCHDOG_MAX_DURATION`.
    OverLong { marker_id: EntityId, epoch: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterAction {
    /// Apply this position to the model and forward to other peers.
    Apply { pos: Pos },
    /// Apply and forward, and also mark the marker not-moving.
    ApplyAndClose { pos: Option<Pos> },
    /// Ignore — this is our own echo, a stale epoch, or a stale seq.
    Ignore,
}

/// One arbiter per table, keyed by marker id.
pub struct DragArbiter {
    states: HashMap<EntityId, DragState>,
}

impl DragArbiter {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    fn entry(&mut self, marker_id: EntityId, now: Instant) -> &mut DragState {
        self.states
            .entry(marker_id)
            .or_insert_with(|| DragState::idle(marker_id, now))
    }

    /// The local user started dragging `marker_id`. Proposes a new epoch
    /// unconditionally; if another peer already owns an open epoch with a
    /// lexicographically smaller peer id, the caller must not actually
    /// start (owner-wins) — that check happens in `can_start_local_drag`.
    pub fn can_start_local_drag(&self, marker_id: EntityId, self_peer_id: &str) -> bool {
        match self.states.get(&marker_id) {
            None => true,
            Some(s) if s.closed => true,
            Some(s) => match &s.owner_peer_id {
                None => true,
                Some(owner) => self_peer_id < owner.as_str(),
            },
        }
    }

    pub fn on_local_drag_start(&mut self, marker_id: EntityId, self_peer_id: &str, now: Instant) -> u32 {
        let state = self.entry(marker_id, now);
        state.epoch += 1;
        state.closed = false;
        state.owner_peer_id = Some(self_peer_id.to_string());
        state.locally_dragging = true;
        state.locally_proposed_epoch = Some(state.epoch);
        state.local_seq = 0;
        state.last_seq = 0;
        state.started_at = now;
        state.last_activity = now;
        state.epoch
    }

    pub fn on_local_drag_move(&mut self, marker_id: EntityId, now: Instant) -> Option<(u32, u32)> {
        let state = self.states.get_mut(&marker_id)?;
        if !state.locally_dragging {
            return None;
        }
        state.local_seq += 1;
        state.last_seq = state.local_seq;
        state.last_activity = now;
        Some((state.epoch, state.local_seq))
    }

    pub fn on_local_drag_end(&mut self, marker_id: EntityId, now: Instant) {
        if let Some(state) = self.states.get_mut(&marker_id) {
            state.closed = true;
            state.locally_dragging = false;
            state.locally_proposed_epoch = None;
            state.last_activity = now;
        }
    }

    /// Handle an inbound `MarkerMove` from `sender_peer_id`. Applies
    /// owner-wins tiebreak, epoch adoption, and echo suppression.
    pub fn on_remote_marker_move(
        &mut self,
        marker_id: EntityId,
        sender_peer_id: &str,
        self_peer_id: &str,
        epoch: u32,
        seq: u32,
        pos: Pos,
        now: Instant,
    ) -> ArbiterAction {
        if sender_peer_id == self_peer_id {
            return ArbiterAction::Ignore;
        }
        let state = self.entry(marker_id, now);

        if epoch < state.epoch {
            return ArbiterAction::Ignore;
        }

        if epoch > state.epoch {
            // A strictly newer epoch always supersedes whatever came
            // before, including a local drag of our own — there's no tie
            // to break here, the remote epoch is simply ahead.
            state.locally_dragging = false;
            state.locally_proposed_epoch = None;
            state.epoch = epoch;
            state.closed = false;
            state.owner_peer_id = Some(sender_peer_id.to_string());
            state.last_seq = seq;
            state.last_activity = now;
            return ArbiterAction::Apply { pos };
        }

        // Same epoch: a closed epoch never accepts further moves.
        if state.closed {
            return ArbiterAction::Ignore;
        }
        if state.owner_peer_id.as_deref() != Some(sender_peer_id) {
            // Two peers started dragging the same marker in the same
            // epoch: owner-wins, smaller peer id keeps it.
            let current_owner = state.owner_peer_id.as_deref().unwrap_or(self_peer_id);
            if sender_peer_id >= current_owner {
                return ArbiterAction::Ignore;
            }
            state.owner_peer_id = Some(sender_peer_id.to_string());
            state.locally_dragging = false;
            state.locally_proposed_epoch = None;
        }
        if seq <= state.last_seq {
            return ArbiterAction::Ignore;
        }
        state.last_seq = seq;
        state.last_activity = now;
        ArbiterAction::Apply { pos }
    }

    pub fn on_remote_marker_move_state(
        &mut self,
        marker_id: EntityId,
        sender_peer_id: &str,
        self_peer_id: &str,
        epoch: u32,
        ending: bool,
        final_pos: Option<Pos>,
        now: Instant,
    ) -> ArbiterAction {
        if sender_peer_id == self_peer_id {
            return ArbiterAction::Ignore;
        }
        let state = self.entry(marker_id, now);
        if epoch < state.epoch {
            return ArbiterAction::Ignore;
        }
        if ending {
            state.closed = true;
            state.last_activity = now;
            return ArbiterAction::ApplyAndClose { pos: final_pos };
        }
        state.epoch = epoch;
        state.closed = false;
        state.owner_peer_id = Some(sender_peer_id.to_string());
        state.last_activity = now;
        ArbiterAction::Apply {
            pos: final_pos.unwrap_or_default(),
        }
    }

    /// A peer disconnected: force-close any epoch it owned so the marker
    /// doesn't stay stuck mid-drag forever.
    pub fn on_peer_disconnected(&mut self, peer_id: &str) -> Vec<EntityId> {
        let mut closed = Vec::new();
        for (marker_id, state) in self.states.iter_mut() {
            if !state.closed && state.owner_peer_id.as_deref() == Some(peer_id) {
                state.closed = true;
                closed.push(*marker_id);
            }
        }
        closed
    }

    /// Report-only watchdog sweep; callers log these, they never mutate
    /// state themselves.
    pub fn poll_watchdogs(&self, now: Instant) -> Vec<DragWatchdogEvent> {
        let mut events = Vec::new();
        for state in self.states.values() {
            if state.closed {
                continue;
            }
            if now.duration_since(state.last_activity) >= WATCHDOG_INACTIVITY_TIMEOUT {
                events.push(DragWatchdogEvent::Stalled {
                    marker_id: state.marker_id,
                    epoch: state.epoch,
                });
            }
            if now.duration_since(state.started_at) >= WATCHDOG_MAX_DURATION {
                events.push(DragWatchdogEvent::OverLong {
                    marker_id: state.marker_id,
                    epoch: state.epoch,
                });
            }
        }
        events
    }
}

impl Default for DragArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simultaneous_drag_owner_wins_by_smaller_peer_id() {
        let mut arbiter = DragArbiter::new();
        let now = Instant::now();
        arbiter.on_local_drag_start(1, "bob", now);

        // "alice" < "bob" lexicographically, so alice's remote move wins.
        let action = arbiter.on_remote_marker_move(
            1,
            "alice",
            "bob",
            1,
            1,
            Pos { x: 5.0, y: 5.0 },
            now,
        );
        assert_eq!(action, ArbiterAction::Apply { pos: Pos { x: 5.0, y: 5.0 } });
        assert!(!arbiter.states.get(&1).unwrap().locally_dragging);
    }

    #[test]
    fn simultaneous_drag_loser_ignored_when_we_are_smaller() {
        let mut arbiter = DragArbiter::new();
        let now = Instant::now();
        arbiter.on_local_drag_start(1, "alice", now);

        let action = arbiter.on_remote_marker_move(
            1,
            "bob",
            "alice",
            1,
            1,
            Pos { x: 5.0, y: 5.0 },
            now,
        );
        assert_eq!(action, ArbiterAction::Ignore);
        assert!(arbiter.states.get(&1).unwrap().locally_dragging);
    }

    #[test]
    fn stale_sequence_within_same_epoch_is_ignored() {
        let mut arbiter = DragArbiter::new();
        let now = Instant::now();
        arbiter.on_remote_marker_move(1, "bob", "alice", 1, 5, Pos::default(), now);
        let action = arbiter.on_remote_marker_move(1, "bob", "alice", 1, 3, Pos::default(), now);
        assert_eq!(action, ArbiterAction::Ignore);
    }

    #[test]
    fn echo_of_own_move_is_ignored() {
        let mut arbiter = DragArbiter::new();
        let now = Instant::now();
        arbiter.on_local_drag_start(1, "alice", now);
        let action = arbiter.on_remote_marker_move(1, "alice", "alice", 1, 1, Pos::default(), now);
        assert_eq!(action, ArbiterAction::Ignore);
    }

    #[test]
    fn move_state_end_closes_epoch() {
        let mut arbiter = DragArbiter::new();
        let now = Instant::now();
        arbiter.on_remote_marker_move(1, "bob", "alice", 1, 1, Pos::default(), now);
        let action = arbiter.on_remote_marker_move_state(
            1,
            "bob",
            "alice",
            1,
            true,
            Some(Pos { x: 9.0, y: 9.0 }),
            now,
        );
        assert_eq!(
            action,
            ArbiterAction::ApplyAndClose {
                pos: Some(Pos { x: 9.0, y: 9.0 })
            }
        );
        assert!(arbiter.states.get(&1).unwrap().closed);
    }

    #[test]
    fn peer_disconnect_force_closes_owned_epochs() {
        let mut arbiter = DragArbiter::new();
        let now = Instant::now();
        arbiter.on_remote_marker_move(1, "bob", "alice", 1, 1, Pos::default(), now);
        let closed = arbiter.on_peer_disconnected("bob");
        assert_eq!(closed, vec![1]);
        assert!(arbiter.states.get(&1).unwrap().closed);
    }

    #[test]
    fn watchdog_reports_stalled_epoch_without_mutating() {
        let mut arbiter = DragArbiter::new();
        let t0 = Instant::now();
        arbiter.on_remote_marker_move(1, "bob", "alice", 1, 1, Pos::default(), t0);
        let later = t0 + WATCHDOG_INACTIVITY_TIMEOUT + Duration::from_secs(1);
        let events = arbiter.poll_watchdogs(later);
        assert!(events.contains(&DragWatchdogEvent::Stalled { marker_id: 1, epoch: 1 }));
        assert!(!arbiter.states.get(&1).unwrap().closed);
    }

    #[test]
    fn newer_epoch_always_adopted_over_closed_state() {
        let mut arbiter = DragArbiter::new();
        let now = Instant::now();
        arbiter.on_remote_marker_move_state(1, "bob", "alice", 1, true, None, now);
        let action = arbiter.on_remote_marker_move(1, "bob", "alice", 2, 1, Pos::default(), now);
        assert!(matches!(action, ArbiterAction::Apply { .. }));
    }
}
