//! Peer Link — one `RTCPeerConnection` plus its four labeled data channels:
//! `game`, `chat`, `notes`, `marker_move`. Buffers ICE candidates until the
//! remote description lands, and decides offerer vs answerer deterministically
//! so both sides agree without a coin flip over the signaling channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

/// The four data channels every Peer Link establishes. `game` carries
/// table/board/marker/fog frames, `chat` carries chat frames, `notes` is
/// reserved for a future Notes feature (opaque to this crate), and
/// `marker_move` is split out so high-frequency drag traffic never
/// head-of-line blocks chat or game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLabel {
    Game,
    Chat,
    Notes,
    MarkerMove,
}

impl ChannelLabel {
    pub const ALL: [ChannelLabel; 4] = [
        ChannelLabel::Game,
        ChannelLabel::Chat,
        ChannelLabel::Notes,
        ChannelLabel::MarkerMove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelLabel::Game => "game",
            ChannelLabel::Chat => "chat",
            ChannelLabel::Notes => "notes",
            ChannelLabel::MarkerMove => "marker_move",
        }
    }
}

/// Mirrors `RTCPeerConnectionState` at the granularity the dispatch core
/// cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Decide who creates the SDP offer. Both sides run this same function
/// against the same two peer ids and always agree, with no extra
/// round-trip over the signaling channel.
pub fn is_offerer(self_id: &str, remote_id: &str) -> bool {
    self_id < remote_id
}

/// Build a fresh `RTCPeerConnection` against the given STUN/TURN servers.
/// One call per remote peer — `webrtc-rs` connections aren't reusable
/// across peers.
pub async fn new_peer_connection(
    ice_urls: &[String],
) -> webrtc::error::Result<Arc<RTCPeerConnection>> {
    let api = APIBuilder::new().build();
    let config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: ice_urls.to_vec(),
            ..Default::default()
        }],
        ..Default::default()
    };
    Ok(Arc::new(api.new_peer_connection(config).await?))
}

/// The offerer creates all four labeled data channels up front; the
/// answerer receives them via `on_data_channel` (wired by the caller before
/// `set_remote_description`, per the `webrtc-rs` contract that the
/// negotiated-channel callback must be registered before the offer is
/// applied).
pub async fn create_offerer_channels(
    pc: &RTCPeerConnection,
) -> webrtc::error::Result<HashMap<ChannelLabel, Arc<RTCDataChannel>>> {
    let mut channels = HashMap::new();
    for label in ChannelLabel::ALL {
        let dc = pc.create_data_channel(label.as_str(), None).await?;
        channels.insert(label, dc);
    }
    Ok(channels)
}

pub fn channel_label_from_str(s: &str) -> Option<ChannelLabel> {
    ChannelLabel::ALL.into_iter().find(|l| l.as_str() == s)
}

/// Register `on_message` on every one of `link`'s channels so inbound bytes
/// start flowing into its `inbound_tx`. Call once the channel map is fully
/// populated, for both the offerer (channels created up front) and the
/// answerer (channels captured via `on_data_channel`).
pub fn wire_inbound(link: &PeerLink) {
    for (&label, dc) in link.channels.iter() {
        let inbound_tx = link.inbound_tx.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let inbound_tx = inbound_tx.clone();
            let bytes = msg.data.to_vec();
            Box::pin(async move {
                let _ = inbound_tx.send((label, bytes));
            })
        }));
    }
}

/// An ICE candidate received before the remote description was set. Buffered
/// and replayed once `set_remote_description` completes, since `webrtc-rs`
/// (like every WebRTC stack) rejects `add_ice_candidate` calls made too
/// early.
#[derive(Debug, Clone)]
pub struct BufferedCandidate(pub RTCIceCandidateInit);

pub struct PeerLink {
    pub remote_peer_id: String,
    pub pc: Arc<RTCPeerConnection>,
    pub channels: HashMap<ChannelLabel, Arc<RTCDataChannel>>,
    pub state: Mutex<PcState>,
    pending_candidates: Mutex<Vec<BufferedCandidate>>,
    remote_description_set: Mutex<bool>,
    /// Malformed-frame counter. Crossing `BAD_FRAME_DISCONNECT_THRESHOLD` in
    /// `dispatch.rs` closes the link.
    pub bad_frame_count: Mutex<u32>,
    inbound_tx: mpsc::UnboundedSender<(ChannelLabel, Vec<u8>)>,
}

pub const BAD_FRAME_DISCONNECT_THRESHOLD: u32 = 16;

impl PeerLink {
    pub fn new(
        remote_peer_id: String,
        pc: Arc<RTCPeerConnection>,
        inbound_tx: mpsc::UnboundedSender<(ChannelLabel, Vec<u8>)>,
    ) -> Self {
        Self {
            remote_peer_id,
            pc,
            channels: HashMap::new(),
            state: Mutex::new(PcState::New),
            pending_candidates: Mutex::new(Vec::new()),
            remote_description_set: Mutex::new(false),
            bad_frame_count: Mutex::new(0),
            inbound_tx,
        }
    }

    pub fn dc_open(&self, label: ChannelLabel) -> bool {
        self.channels
            .get(&label)
            .map(|dc| dc.ready_state() == webrtc::data_channel::data_channel_state::RTCDataChannelState::Open)
            .unwrap_or(false)
    }

    /// Send a frame on the given channel. Returns `Err` if the channel isn't
    /// open yet rather than silently dropping — callers decide whether to
    /// queue or surface the failure.
    pub async fn send(&self, label: ChannelLabel, bytes: Vec<u8>) -> Result<(), SendError> {
        let dc = self.channels.get(&label).ok_or(SendError::NoSuchChannel)?;
        if !self.dc_open(label) {
            return Err(SendError::ChannelNotOpen);
        }
        dc.send(&bytes.into())
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Buffer or immediately apply a trickled ICE candidate, per the "buffer
    /// until remote description set" rule.
    pub async fn on_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), webrtc::Error> {
        if *self.remote_description_set.lock().await {
            self.pc.add_ice_candidate(candidate).await
        } else {
            self.pending_candidates
                .lock()
                .await
                .push(BufferedCandidate(candidate));
            Ok(())
        }
    }

    /// Call once the remote SDP description has been applied; replays any
    /// candidates that arrived early.
    pub async fn on_remote_description_set(&self) -> Result<(), webrtc::Error> {
        *self.remote_description_set.lock().await = true;
        let pending = std::mem::take(&mut *self.pending_candidates.lock().await);
        for c in pending {
            self.pc.add_ice_candidate(c.0).await?;
        }
        Ok(())
    }

    pub async fn record_bad_frame(&self) -> u32 {
        let mut count = self.bad_frame_count.lock().await;
        *count += 1;
        *count
    }

    pub async fn set_state(&self, state: PcState) {
        *self.state.lock().await = state;
    }

    pub async fn current_state(&self) -> PcState {
        *self.state.lock().await
    }

    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<(ChannelLabel, Vec<u8>)> {
        self.inbound_tx.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    NoSuchChannel,
    ChannelNotOpen,
    Transport(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::NoSuchChannel => write!(f, "no such data channel"),
            SendError::ChannelNotOpen => write!(f, "data channel not open"),
            SendError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for SendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offerer_selection_is_symmetric_and_exclusive() {
        assert!(is_offerer("alice", "bob"));
        assert!(!is_offerer("bob", "alice"));
        // Exactly one side offers for any distinct pair.
        assert_ne!(is_offerer("alice", "bob"), is_offerer("bob", "alice"));
    }

    #[test]
    fn channel_labels_round_trip_through_as_str() {
        for label in ChannelLabel::ALL {
            let s = label.as_str();
            assert!(["game", "chat", "notes", "marker_move"].contains(&s));
        }
    }

    #[test]
    fn bad_frame_threshold_is_reasonable() {
        assert!(BAD_FRAME_DISCONNECT_THRESHOLD > 0);
    }

    #[test]
    fn channel_label_from_str_round_trips() {
        for label in ChannelLabel::ALL {
            assert_eq!(channel_label_from_str(label.as_str()), Some(label));
        }
        assert_eq!(channel_label_from_str("bogus"), None);
    }
}
