//! Dispatch Core — the single-threaded owner of world-model mutation.
//!
//! Every inbound frame, from any peer link, lands in one queue. A single
//! drain loop pulls at most `MAX_PER_TICK` messages per tick so one noisy
//! peer can't starve the others or block the event loop indefinitely. An
//! optional pre-decode worker pool can run `Frame::decode` off the main
//! thread and hand back already-decoded `ReadyMessage`s — decoding is pure
//! and side-effect free, so it's safe to parallelize; only the apply step
//! touches shared state and must stay single-threaded.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::codec::{CodecError, Frame};
use crate::model::Role;
use crate::peer_link::BAD_FRAME_DISCONNECT_THRESHOLD;

/// Bounded per-tick drain count, so one noisy peer link can't starve the
/// others in a single dispatch tick.
pub const MAX_PER_TICK: usize = 32;

#[derive(Debug, Clone)]
pub struct ReadyMessage {
    pub sender_peer_id: String,
    pub sender_role: Role,
    pub sender_user_id: String,
    pub frame: Frame,
}

/// A raw, not-yet-decoded inbound payload.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub sender_peer_id: String,
    pub sender_role: Role,
    pub sender_user_id: String,
    pub bytes: Vec<u8>,
}

/// The shared, lock-protected inbound queue. Cheap to clone (it's an
/// `Arc`), so every peer link task gets its own handle to push into.
#[derive(Clone)]
pub struct InboundQueue {
    inner: Arc<Mutex<VecDeque<ReadyMessage>>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub async fn push(&self, message: ReadyMessage) {
        self.inner.lock().await.push_back(message);
    }

    /// Drain up to `MAX_PER_TICK` messages. Returns fewer than that only
    /// when the queue itself is shorter.
    pub async fn drain_tick(&self) -> Vec<ReadyMessage> {
        let mut guard = self.inner.lock().await;
        let n = guard.len().min(MAX_PER_TICK);
        guard.drain(..n).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a raw payload off the main thread. Pure function — safe to run
/// on a worker pool since it touches no shared state.
pub fn pre_decode(raw: RawMessage) -> Result<ReadyMessage, (String, CodecError)> {
    Frame::decode(&raw.bytes)
        .map(|frame| ReadyMessage {
            sender_peer_id: raw.sender_peer_id.clone(),
            sender_role: raw.sender_role,
            sender_user_id: raw.sender_user_id,
            frame,
        })
        .map_err(|e| (raw.sender_peer_id, e))
}

/// Tracks malformed-frame counts per peer so the dispatch core can decide
/// when to close a link.
pub struct BadFrameTracker {
    counts: std::collections::HashMap<String, u32>,
}

impl BadFrameTracker {
    pub fn new() -> Self {
        Self {
            counts: std::collections::HashMap::new(),
        }
    }

    /// Record one bad frame from `peer_id`; returns true if the peer has
    /// now crossed the disconnect threshold.
    pub fn record(&mut self, peer_id: &str) -> bool {
        let count = self.counts.entry(peer_id.to_string()).or_insert(0);
        *count += 1;
        *count >= BAD_FRAME_DISCONNECT_THRESHOLD
    }

    pub fn reset(&mut self, peer_id: &str) {
        self.counts.remove(peer_id);
    }
}

impl Default for BadFrameTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(peer: &str) -> ReadyMessage {
        ReadyMessage {
            sender_peer_id: peer.to_string(),
            sender_role: Role::Player,
            sender_user_id: "alice".to_string(),
            frame: Frame::MarkerDelete {
                table_id: 1,
                board_id: 2,
                marker_id: 3,
            },
        }
    }

    #[tokio::test]
    async fn drain_tick_caps_at_max_per_tick() {
        let queue = InboundQueue::new();
        for i in 0..(MAX_PER_TICK + 10) {
            queue.push(sample_message(&format!("peer-{i}"))).await;
        }
        let drained = queue.drain_tick().await;
        assert_eq!(drained.len(), MAX_PER_TICK);
        assert_eq!(queue.len().await, 10);
    }

    #[tokio::test]
    async fn drain_tick_returns_fewer_when_queue_is_short() {
        let queue = InboundQueue::new();
        queue.push(sample_message("a")).await;
        queue.push(sample_message("b")).await;
        let drained = queue.drain_tick().await;
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn pre_decode_roundtrips_a_valid_frame() {
        let frame = Frame::MarkerDelete {
            table_id: 1,
            board_id: 2,
            marker_id: 3,
        };
        let raw = RawMessage {
            sender_peer_id: "p1".to_string(),
            sender_role: Role::Player,
            sender_user_id: "alice".to_string(),
            bytes: frame.encode(),
        };
        let ready = pre_decode(raw).unwrap();
        assert_eq!(ready.frame, frame);
    }

    #[test]
    fn pre_decode_surfaces_codec_errors_with_peer_id() {
        let raw = RawMessage {
            sender_peer_id: "p1".to_string(),
            sender_role: Role::Player,
            sender_user_id: "alice".to_string(),
            bytes: vec![250, 0, 0, 0, 0, 0, 0, 0, 0],
        };
        let err = pre_decode(raw).unwrap_err();
        assert_eq!(err.0, "p1");
        assert_eq!(err.1, CodecError::UnknownKind(250));
    }

    #[test]
    fn bad_frame_tracker_trips_threshold() {
        let mut tracker = BadFrameTracker::new();
        let mut tripped = false;
        for _ in 0..BAD_FRAME_DISCONNECT_THRESHOLD {
            tripped = tracker.record("peer-1");
        }
        assert!(tripped);
    }

    #[test]
    fn bad_frame_tracker_resets_per_peer() {
        let mut tracker = BadFrameTracker::new();
        tracker.record("peer-1");
        tracker.reset("peer-1");
        assert!(!tracker.record("peer-1") || BAD_FRAME_DISCONNECT_THRESHOLD == 1);
    }
}
