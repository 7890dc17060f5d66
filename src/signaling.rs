//! Signaling Router — the GM-hosted broker peers use to exchange WebRTC
//! offers/answers/candidates before a direct Peer Link exists.
//!
//! The router speaks small JSON envelopes over a reliable, ordered,
//! bidirectional carrier; this crate terminates it as a `tokio-tungstenite`
//! WebSocket server. Every client must authenticate with the table password
//! before anything other than an `Auth` envelope is routed for it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How long an unauthenticated connection may sit before being dropped.
pub const PENDING_AUTH_TIMEOUT: Duration = Duration::from_secs(60);

pub type PeerId = String;

/// Wire envelope for the signaling channel. `#[serde(tag = "type")]` gives
/// each variant its own JSON `"type"` discriminant, matching the shape the
/// pack's other signaling examples use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    /// Client → router: shared table password, plus the display name the
    /// client would like to use. The router resolves collisions against
    /// names already present on the table and echoes the final name back
    /// in `AuthOk` — it becomes this client's peer id for the rest of the
    /// session, so `sender_user_id` on every frame this peer sends is
    /// always a real, collision-free display name.
    Auth { password: String, display_name: String },
    /// Router → client: accepted, with the peer id assigned to this
    /// connection and the ids of peers already present.
    AuthOk {
        peer_id: PeerId,
        present: Vec<PeerId>,
    },
    /// Router → client: rejected (wrong password or auth window expired).
    AuthFailed { reason: String },
    /// Router → all authenticated clients: a peer joined.
    PeerJoined { peer_id: PeerId },
    /// Router → all authenticated clients: a peer left.
    PeerLeft { peer_id: PeerId },
    /// Client → router → target client: SDP offer.
    Offer {
        from: PeerId,
        to: PeerId,
        sdp: String,
    },
    /// Client → router → target client: SDP answer.
    Answer {
        from: PeerId,
        to: PeerId,
        sdp: String,
    },
    /// Client → router → target client: one trickled ICE candidate.
    Candidate {
        from: PeerId,
        to: PeerId,
        candidate: String,
    },
    /// Either direction: liveness probe.
    Ping,
    Pong,
    /// Router → client: the router is shutting down or the client was
    /// force-disconnected.
    ServerDisconnect { reason: String },
}

impl Envelope {
    /// Only `Auth` is accepted before a connection is authenticated; every
    /// other envelope is dropped and logged.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Envelope::Auth { .. } | Envelope::Ping | Envelope::Pong)
    }

    /// Target peer id, for envelopes that route point-to-point.
    pub fn target(&self) -> Option<&str> {
        match self {
            Envelope::Offer { to, .. } | Envelope::Answer { to, .. } | Envelope::Candidate { to, .. } => {
                Some(to)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Authenticated,
}

struct ClientEntry {
    state: AuthState,
    connected_at: Instant,
    last_seen: Instant,
}

/// The router's authoritative session state — peer table plus password.
/// Transport I/O (accept loop, per-socket read/write tasks) lives in
/// `main.rs`/`bootstrap.rs`; this struct is the pure state machine so it can
/// be driven by tests without a real socket.
pub struct SignalingRouter {
    password: String,
    clients: HashMap<PeerId, ClientEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Send this envelope to this one peer.
    Unicast(PeerId, Box<EnvelopeKey>),
    /// Send this envelope to every authenticated peer except `exclude`.
    Broadcast(Option<PeerId>, Box<EnvelopeKey>),
    /// Drop silently (e.g. unauthenticated sender, unknown target).
    Drop(&'static str),
}

/// A cheap, comparable stand-in for an `Envelope` used only in test
/// assertions — the real payload always travels as the `Envelope` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKey {
    AuthOk,
    AuthFailed,
    PeerJoined,
    PeerLeft,
    Offer,
    Answer,
    Candidate,
    Pong,
    ServerDisconnect,
}

impl SignalingRouter {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            clients: HashMap::new(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_authenticated(&self, peer_id: &str) -> bool {
        matches!(
            self.clients.get(peer_id).map(|c| c.state),
            Some(AuthState::Authenticated)
        )
    }

    /// Register a new, not-yet-authenticated connection.
    pub fn register_pending(&mut self, peer_id: PeerId, now: Instant) {
        self.clients.insert(
            peer_id,
            ClientEntry {
                state: AuthState::Pending,
                connected_at: now,
                last_seen: now,
            },
        );
    }

    /// Peers that have sat unauthenticated past `PENDING_AUTH_TIMEOUT` and
    /// should be dropped.
    pub fn expired_pending(&self, now: Instant) -> Vec<PeerId> {
        self.clients
            .iter()
            .filter(|(_, c)| {
                c.state == AuthState::Pending
                    && now.duration_since(c.connected_at) >= PENDING_AUTH_TIMEOUT
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn remove(&mut self, peer_id: &str) {
        self.clients.remove(peer_id);
    }

    pub fn touch(&mut self, peer_id: &str, now: Instant) {
        if let Some(c) = self.clients.get_mut(peer_id) {
            c.last_seen = now;
        }
    }

    /// Authenticate one pending client; returns whether it succeeded.
    pub fn authenticate(&mut self, peer_id: &str, password: &str) -> bool {
        let ok = password == self.password;
        if ok {
            if let Some(c) = self.clients.get_mut(peer_id) {
                c.state = AuthState::Authenticated;
            }
        }
        ok
    }

    /// Check a password against the table's without touching any client
    /// entry — used to decide a final peer id before `register_pending`.
    pub fn check_password(&self, password: &str) -> bool {
        password == self.password
    }

    pub fn present_peers(&self, exclude: &str) -> Vec<PeerId> {
        self.clients
            .iter()
            .filter(|(id, c)| id.as_str() != exclude && c.state == AuthState::Authenticated)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Decide what to do with an inbound envelope from `from`. This is the
    /// router's whole routing policy in one place: unauthenticated senders
    /// only ever get to send `Auth`; offer/answer/candidate route only
    /// between two authenticated peers; everything else either broadcasts
    /// or is dropped.
    pub fn route(&self, from: &str, envelope: &Envelope) -> RouteOutcome {
        if envelope.requires_auth() && !self.is_authenticated(from) {
            return RouteOutcome::Drop("unauthenticated sender");
        }
        match envelope {
            Envelope::Offer { to, .. } => self.route_point_to_point(to, EnvelopeKey::Offer),
            Envelope::Answer { to, .. } => self.route_point_to_point(to, EnvelopeKey::Answer),
            Envelope::Candidate { to, .. } => self.route_point_to_point(to, EnvelopeKey::Candidate),
            Envelope::Ping => RouteOutcome::Unicast(from.to_string(), Box::new(EnvelopeKey::Pong)),
            _ => RouteOutcome::Drop("not a client-originated routable envelope"),
        }
    }

    fn route_point_to_point(&self, to: &str, key: EnvelopeKey) -> RouteOutcome {
        if self.is_authenticated(to) {
            RouteOutcome::Unicast(to.to_string(), Box::new(key))
        } else {
            RouteOutcome::Drop("unknown or unauthenticated target")
        }
    }
}

/// Client-side counterpart: the thin state machine every peer (including the
/// table host's own local client) drives against its websocket connection to
/// the router.
pub struct SignalingClient {
    pub self_id: Option<PeerId>,
    pub authenticated: bool,
}

impl SignalingClient {
    pub fn new() -> Self {
        Self {
            self_id: None,
            authenticated: false,
        }
    }

    pub fn on_auth_ok(&mut self, peer_id: PeerId) {
        self.self_id = Some(peer_id);
        self.authenticated = true;
    }
}

impl Default for SignalingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_client_cannot_route_offer() {
        let mut router = SignalingRouter::new("hunter2");
        let now = Instant::now();
        router.register_pending("p1".into(), now);
        router.register_pending("p2".into(), now);
        router.authenticate("p2", "hunter2");

        let envelope = Envelope::Offer {
            from: "p1".into(),
            to: "p2".into(),
            sdp: "v=0".into(),
        };
        assert_eq!(
            router.route("p1", &envelope),
            RouteOutcome::Drop("unauthenticated sender")
        );
    }

    #[test]
    fn offer_routes_to_authenticated_target() {
        let mut router = SignalingRouter::new("hunter2");
        let now = Instant::now();
        router.register_pending("p1".into(), now);
        router.register_pending("p2".into(), now);
        router.authenticate("p1", "hunter2");
        router.authenticate("p2", "hunter2");

        let envelope = Envelope::Offer {
            from: "p1".into(),
            to: "p2".into(),
            sdp: "v=0".into(),
        };
        assert_eq!(
            router.route("p1", &envelope),
            RouteOutcome::Unicast("p2".into(), Box::new(EnvelopeKey::Offer))
        );
    }

    #[test]
    fn wrong_password_does_not_authenticate() {
        let mut router = SignalingRouter::new("hunter2");
        let now = Instant::now();
        router.register_pending("p1".into(), now);
        assert!(!router.authenticate("p1", "wrong"));
        assert!(!router.is_authenticated("p1"));
    }

    #[test]
    fn pending_auth_expires_after_timeout() {
        let mut router = SignalingRouter::new("hunter2");
        let t0 = Instant::now();
        router.register_pending("p1".into(), t0);
        assert!(router.expired_pending(t0).is_empty());
        let later = t0 + PENDING_AUTH_TIMEOUT + Duration::from_secs(1);
        assert_eq!(router.expired_pending(later), vec!["p1".to_string()]);
    }

    #[test]
    fn candidate_to_unknown_target_is_dropped() {
        let mut router = SignalingRouter::new("hunter2");
        let now = Instant::now();
        router.register_pending("p1".into(), now);
        router.authenticate("p1", "hunter2");
        let envelope = Envelope::Candidate {
            from: "p1".into(),
            to: "ghost".into(),
            candidate: "candidate:1".into(),
        };
        assert_eq!(
            router.route("p1", &envelope),
            RouteOutcome::Drop("unknown or unauthenticated target")
        );
    }

    #[test]
    fn present_peers_excludes_self_and_pending() {
        let mut router = SignalingRouter::new("hunter2");
        let now = Instant::now();
        router.register_pending("p1".into(), now);
        router.register_pending("p2".into(), now);
        router.register_pending("p3".into(), now);
        router.authenticate("p1", "hunter2");
        router.authenticate("p2", "hunter2");
        let present = router.present_peers("p1");
        assert_eq!(present, vec!["p2".to_string()]);
    }
}
