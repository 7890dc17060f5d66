//! # runic-sync — a demo peer-to-peer virtual tabletop sync client
//!
//! This binary is the thinnest possible shell around `runic_sync`: it hosts
//! or joins a table, brings up the signaling router/client and the WebRTC
//! peer links it routes, and renders a TUI with a chat pane, a peers
//! sidebar, and a one-line table/board summary. It never draws boards,
//! markers, or fog — those stay opaque to this crate by design.
//!
//! ## Architecture
//!
//! | Stream              | Source                    | What it produces               |
//! |----------------------|----------------------------|---------------------------------|
//! | Keyboard input       | `crossterm::EventStream`  | Key presses from the user       |
//! | Decoded peer frames  | `dispatch::InboundQueue`  | `ReadyMessage`s ready to apply  |
//! | Signaling events     | signaling socket task     | peer join/leave, offer/answer   |
//! | UI tick (50 ms)      | `tokio::time::interval`   | Periodic redraw + watchdog poll |
//!
//! `tokio::select!` merges these into one event loop.
//!
//! Peer connections negotiate with full (non-trickled) ICE: the offerer and
//! answerer each wait out their own gathering-complete promise before
//! sending SDP, so no `Candidate` envelope ever needs to cross the wire.
//! Simpler to get right without live testing than a trickle pipeline, at
//! the cost of one extra round-trip of gathering latency per peer.

mod app;
mod theme;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{Event as TermEvent, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use runic_sync::bootstrap;
use runic_sync::chat::{self, ChatManager, DiceRoll};
use runic_sync::codec::{Frame, ImageOwnerKind, Moving};
use runic_sync::config::{Cli, Command, ConnectionString};
use runic_sync::dispatch::{BadFrameTracker, InboundQueue, ReadyMessage};
use runic_sync::drag::{ArbiterAction, DragArbiter};
use runic_sync::identity::IdentityRegistry;
use runic_sync::ids::{EntityId, IdMinter};
use runic_sync::image_transfer::{ImageKey, ImageReceiver};
use runic_sync::model::{ChatGroup, ChatMessage as ModelChatMessage, GameTable, Role};
use runic_sync::peer_link::{self, ChannelLabel, PeerLink};
use runic_sync::replicator::Replicator;
use runic_sync::signaling::{Envelope, SignalingRouter};

use app::{App, PeerRow};
use theme::Theme;

const DEFAULT_ICE_SERVERS: &str = "stun:stun.l.google.com:19302";

/// Per-process runtime state threaded through the event loop. Only the
/// event loop (running on the main task) ever touches `table`/`chat`/`drag`
/// — every other task only pushes into `inbound`, keeping world-model
/// mutation on a single thread.
struct Session {
    role: Role,
    self_peer_id: String,
    display_name: String,
    table: GameTable,
    chat: ChatManager,
    drag: DragArbiter,
    identity: IdentityRegistry,
    image_receiver: ImageReceiver,
    /// Role of each connected remote peer, decided at link setup time from
    /// table topology (see `remote_role_for`) rather than trusted off the
    /// wire for every frame.
    peer_roles: HashMap<String, Role>,
    /// Peers we learned about via the router's `PeerJoined` broadcast — by
    /// construction that's every Player, since the GM's own session never
    /// registers as a router-tracked client.
    known_via_peer_joined: HashSet<String>,
    peer_links: HashMap<String, Arc<PeerLink>>,
    bad_frames: BadFrameTracker,
}

impl Session {
    fn new(
        role: Role,
        display_name: String,
        table_id: EntityId,
        table_name: String,
        identity: IdentityRegistry,
    ) -> Self {
        Self {
            role,
            self_peer_id: display_name.clone(),
            display_name: display_name.clone(),
            table: GameTable::new(table_id, table_name),
            chat: ChatManager::new(display_name),
            drag: DragArbiter::new(),
            identity,
            image_receiver: ImageReceiver::new(),
            peer_roles: HashMap::new(),
            known_via_peer_joined: HashSet::new(),
            peer_links: HashMap::new(),
            bad_frames: BadFrameTracker::new(),
        }
    }

    fn role_label(&self) -> &'static str {
        match self.role {
            Role::GameMaster => "hosting",
            Role::Player => "joining",
        }
    }

    /// Decide the role of a peer we're about to link to. The GM never
    /// appears in anyone's `PeerJoined` broadcasts (it isn't a router-tracked
    /// client), so a peer not learned that way must be the GM.
    fn remote_role_for(&self, peer_id: &str) -> Role {
        if self.role.is_gm() {
            Role::Player
        } else if self.known_via_peer_joined.contains(peer_id) {
            Role::Player
        } else {
            Role::GameMaster
        }
    }

    /// Apply one decoded frame. `MarkerMove`/`MarkerMoveState` are first run
    /// through the drag arbiter, which decides whether they're even
    /// admissible; inbound image chunks and chat-group changes land in
    /// `chat`/`image_receiver` directly since they don't live on
    /// `GameTable`. Everything ends up handed to the replicator too, which
    /// either performs the board/marker mutation or no-ops for frame kinds
    /// already fully handled above it.
    fn apply(&mut self, message: ReadyMessage) -> Option<(String, String)> {
        let now = std::time::Instant::now();

        match &message.frame {
            Frame::MarkerMove {
                marker_id,
                pos,
                epoch,
                seq,
                ..
            } => {
                let action = self.drag.on_remote_marker_move(
                    *marker_id,
                    &message.sender_peer_id,
                    &self.self_peer_id,
                    *epoch,
                    *seq,
                    *pos,
                    now,
                );
                if !matches!(action, ArbiterAction::Apply { .. }) {
                    return None;
                }
            }
            Frame::MarkerMoveState {
                marker_id,
                moving,
                final_pos,
                epoch,
                ..
            } => {
                let action = self.drag.on_remote_marker_move_state(
                    *marker_id,
                    &message.sender_peer_id,
                    &self.self_peer_id,
                    *epoch,
                    matches!(moving, Moving::End),
                    *final_pos,
                    now,
                );
                if matches!(action, ArbiterAction::Ignore) {
                    return None;
                }
            }
            Frame::CommitBoard {
                meta,
                image_bytes_total,
                ..
            } => {
                let key = ImageKey {
                    owner_kind: ImageOwnerKind::Board,
                    id: meta.board_id,
                };
                self.image_receiver.begin(key.clone(), *image_bytes_total);
                self.image_receiver.mark_commit_requested(&key);
            }
            Frame::CommitMarker {
                meta,
                image_bytes_total,
                ..
            } => {
                let key = ImageKey {
                    owner_kind: ImageOwnerKind::Marker,
                    id: meta.marker_id,
                };
                self.image_receiver.begin(key.clone(), *image_bytes_total);
                self.image_receiver.mark_commit_requested(&key);
            }
            Frame::ImageChunk {
                owner_kind,
                id,
                offset,
                bytes,
                ..
            } => {
                let key = ImageKey {
                    owner_kind: *owner_kind,
                    id: *id,
                };
                if let Ok(true) = self.image_receiver.on_chunk(&key, *offset, bytes) {
                    if let Some(data) = self.image_receiver.take_completed(&key) {
                        match owner_kind {
                            ImageOwnerKind::Board => {
                                if let Some(board) = self.table.boards.get_mut(id) {
                                    board.image = data;
                                }
                            }
                            ImageOwnerKind::Marker => {
                                if let Some(marker) =
                                    self.table.boards.values_mut().find_map(|b| b.markers.get_mut(id))
                                {
                                    marker.image = data;
                                }
                            }
                        }
                    }
                }
                return None;
            }
            Frame::ChatGroupCreate {
                group_id,
                name,
                participants,
                owner_user_id,
                ..
            }
            | Frame::ChatGroupUpdate {
                group_id,
                name,
                participants,
                owner_user_id,
                ..
            } => {
                let participants: BTreeSet<String> = participants.iter().cloned().collect();
                match self.chat.groups.get_mut(group_id) {
                    Some(group) => {
                        group.name = name.clone();
                        group.participants = participants;
                        group.owner_user_id = owner_user_id.clone();
                    }
                    None => {
                        self.chat.groups.insert(
                            *group_id,
                            ChatGroup {
                                group_id: *group_id,
                                name: name.clone(),
                                participants,
                                owner_user_id: owner_user_id.clone(),
                                messages: std::collections::VecDeque::new(),
                                unread: 0,
                            },
                        );
                    }
                }
                return None;
            }
            Frame::ChatGroupDelete { group_id, .. } => {
                if *group_id != runic_sync::ids::GENERAL_GROUP_ID {
                    self.chat.groups.remove(group_id);
                }
                return None;
            }
            Frame::ChatMessage {
                group_id,
                sender_user_id,
                display_name,
                text,
                ts,
                ..
            } => {
                let chat_message =
                    ModelChatMessage::new(sender_user_id.clone(), display_name.clone(), text.clone(), *ts);
                self.chat.record_message(*group_id, chat_message, false);
                return Some((display_name.clone(), text.clone()));
            }
            _ => {}
        }

        Replicator::new(&mut self.table).apply(&message.frame, message.sender_role, &message.sender_user_id);
        None
    }
}

/// Send one side of the bootstrap sequence down a freshly opened Peer Link
/// (GM side only — a player's table is learned entirely from this sequence).
async fn send_bootstrap_frames(link: &PeerLink, table_frames: &[Frame], chat_frames: &[Frame]) -> Result<()> {
    for frame in table_frames {
        link.send(ChannelLabel::Game, frame.encode()).await?;
    }
    for frame in chat_frames {
        link.send(ChannelLabel::Chat, frame.encode()).await?;
    }
    Ok(())
}

/// Poll `link`'s `game` channel until it opens (or give up after a few
/// seconds) and then replay the table onto it. Runs detached from the
/// event loop so a slow handshake never blocks keyboard/frame processing;
/// the frames are computed up front so the task owns plain data rather than
/// a borrow into `Session`.
fn spawn_bootstrap_when_ready(link: Arc<PeerLink>, table_frames: Vec<Frame>, chat_frames: Vec<Frame>) {
    tokio::spawn(async move {
        for _ in 0..100 {
            if link.dc_open(ChannelLabel::Game) {
                if let Err(e) = send_bootstrap_frames(&link, &table_frames, &chat_frames).await {
                    tracing::warn!(error = %e, peer = %link.remote_peer_id, "bootstrap send failed");
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tracing::warn!(peer = %link.remote_peer_id, "game channel never opened, bootstrap skipped");
    });
}

/// Spawn the task that owns a link's inbound channel: every message its
/// `on_message` callbacks forward gets decoded and pushed into the shared
/// `InboundQueue` for the main loop to pick up on its next `drain_tick`.
/// `sender_role` is fixed for the life of the link — a peer's role never
/// changes once its connection topology is known.
fn spawn_inbound_consumer(
    link: Arc<PeerLink>,
    peer_id: String,
    sender_role: Role,
    inbound: InboundQueue,
    mut inbound_rx: mpsc::UnboundedReceiver<(ChannelLabel, Vec<u8>)>,
) {
    tokio::spawn(async move {
        while let Some((_label, bytes)) = inbound_rx.recv().await {
            match Frame::decode(&bytes) {
                Ok(frame) => {
                    inbound
                        .push(ReadyMessage {
                            sender_peer_id: peer_id.clone(),
                            sender_role,
                            sender_user_id: peer_id.clone(),
                            frame,
                        })
                        .await;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, peer = %peer_id, "dropping malformed frame");
                    if link.record_bad_frame().await >= peer_link::BAD_FRAME_DISCONNECT_THRESHOLD {
                        tracing::warn!(peer = %peer_id, "closing link after too many malformed frames");
                        let _ = link.pc.close().await;
                        return;
                    }
                }
            }
        }
    });
}

/// Offerer side of one peer connection: creates all four data channels,
/// waits out ICE gathering, and sends the resulting offer over the
/// signaling channel.
async fn initiate_offer(
    session: &mut Session,
    peer_id: &str,
    outbound_tx: &mpsc::UnboundedSender<Envelope>,
    inbound: &InboundQueue,
) -> Result<()> {
    let pc = peer_link::new_peer_connection(&[DEFAULT_ICE_SERVERS.to_string()])
        .await
        .context("building offerer peer connection")?;
    let channels = peer_link::create_offerer_channels(&pc)
        .await
        .context("creating offerer data channels")?;

    let offer = pc.create_offer(None).await.context("creating offer")?;
    let mut gathering_done = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await.context("setting local description")?;
    let _ = gathering_done.recv().await;
    let local_desc = pc
        .local_description()
        .await
        .context("missing local description after gathering")?;

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let mut link = PeerLink::new(peer_id.to_string(), pc, inbound_tx);
    link.channels = channels;
    let link = Arc::new(link);
    peer_link::wire_inbound(&link);
    session.peer_links.insert(peer_id.to_string(), link.clone());

    let remote_role = session.remote_role_for(peer_id);
    session.peer_roles.insert(peer_id.to_string(), remote_role);
    spawn_inbound_consumer(link.clone(), peer_id.to_string(), remote_role, inbound.clone(), inbound_rx);

    if session.role.is_gm() {
        let table_frames = bootstrap::build_sequence(&session.table);
        let chat_frames = bootstrap::build_chat_group_frames(session.table.table_id, &session.chat.groups);
        spawn_bootstrap_when_ready(link, table_frames, chat_frames);
    }

    outbound_tx
        .send(Envelope::Offer {
            from: session.self_peer_id.clone(),
            to: peer_id.to_string(),
            sdp: local_desc.sdp,
        })
        .ok();
    Ok(())
}

/// Answerer side: registers the `on_data_channel` handler before applying
/// the remote offer (channels announced during `set_remote_description`
/// would otherwise be missed), waits for the offerer's four channels to
/// show up, and sends back an answer.
async fn accept_offer(
    session: &mut Session,
    peer_id: &str,
    sdp: &str,
    outbound_tx: &mpsc::UnboundedSender<Envelope>,
    inbound: &InboundQueue,
) -> Result<()> {
    let pc = peer_link::new_peer_connection(&[DEFAULT_ICE_SERVERS.to_string()])
        .await
        .context("building answerer peer connection")?;

    let received = Arc::new(Mutex::new(HashMap::new()));
    {
        let received = received.clone();
        pc.on_data_channel(Box::new(move |dc| {
            let received = received.clone();
            Box::pin(async move {
                if let Some(label) = peer_link::channel_label_from_str(&dc.label()) {
                    received.lock().await.insert(label, dc);
                }
            })
        }));
    }

    let offer = RTCSessionDescription::offer(sdp.to_string()).context("parsing remote offer")?;
    pc.set_remote_description(offer).await.context("setting remote description")?;

    let answer = pc.create_answer(None).await.context("creating answer")?;
    let mut gathering_done = pc.gathering_complete_promise().await;
    pc.set_local_description(answer).await.context("setting local description")?;
    let _ = gathering_done.recv().await;
    let local_desc = pc
        .local_description()
        .await
        .context("missing local description after gathering")?;

    for _ in 0..20 {
        if received.lock().await.len() >= ChannelLabel::ALL.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let mut link = PeerLink::new(peer_id.to_string(), pc, inbound_tx);
    link.channels = received.lock().await.clone();
    let link = Arc::new(link);
    peer_link::wire_inbound(&link);
    session.peer_links.insert(peer_id.to_string(), link.clone());

    let remote_role = session.remote_role_for(peer_id);
    session.peer_roles.insert(peer_id.to_string(), remote_role);
    spawn_inbound_consumer(link.clone(), peer_id.to_string(), remote_role, inbound.clone(), inbound_rx);

    if session.role.is_gm() {
        let table_frames = bootstrap::build_sequence(&session.table);
        let chat_frames = bootstrap::build_chat_group_frames(session.table.table_id, &session.chat.groups);
        spawn_bootstrap_when_ready(link, table_frames, chat_frames);
    }

    outbound_tx
        .send(Envelope::Answer {
            from: session.self_peer_id.clone(),
            to: peer_id.to_string(),
            sdp: local_desc.sdp,
        })
        .ok();
    Ok(())
}

async fn accept_answer(session: &Session, peer_id: &str, sdp: &str) -> Result<()> {
    let Some(link) = session.peer_links.get(peer_id) else {
        return Ok(());
    };
    let answer = RTCSessionDescription::answer(sdp.to_string()).context("parsing remote answer")?;
    link.pc.set_remote_description(answer).await.context("setting remote description")?;
    Ok(())
}

/// Host side of the signaling channel: one `SignalingRouter` shared across
/// every accepted connection, plus a map of authenticated peer id to the
/// outbound sender for that peer's socket. `self_outbound_rx` carries
/// envelopes the GM's own session wants forwarded to a specific peer
/// (offers/answers it originates), routed by `Envelope::target()`.
struct HostSignaling {
    router: Mutex<SignalingRouter>,
    outbound: Mutex<HashMap<String, mpsc::UnboundedSender<Envelope>>>,
    /// The GM's own peer id. The GM's session never registers itself as a
    /// router-tracked client, so envelopes addressed to it (an `Answer`, or
    /// an `Offer` when the GM happens to sort after the sender) are routed
    /// around `SignalingRouter` entirely, straight to `peer_events_tx`.
    self_peer_id: String,
}

async fn run_signaling_host(
    port: u16,
    password: String,
    self_peer_id: String,
    peer_events_tx: mpsc::UnboundedSender<Envelope>,
    mut self_outbound_rx: mpsc::UnboundedReceiver<Envelope>,
) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .context("binding signaling listener")?;
    let host = Arc::new(HostSignaling {
        router: Mutex::new(SignalingRouter::new(password)),
        outbound: Mutex::new(HashMap::new()),
        self_peer_id,
    });

    let forward_host = host.clone();
    tokio::spawn(async move {
        while let Some(envelope) = self_outbound_rx.recv().await {
            if let Some(to) = envelope.target() {
                if let Some(tx) = forward_host.outbound.lock().await.get(to) {
                    let _ = tx.send(envelope);
                }
            }
        }
    });

    loop {
        let (stream, _addr) = listener.accept().await?;
        let host = host.clone();
        let peer_events_tx = peer_events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_signaling_connection(stream, host, peer_events_tx).await {
                tracing::warn!(error = %e, "signaling connection ended with error");
            }
        });
    }
}

async fn handle_signaling_connection(
    stream: tokio::net::TcpStream,
    host: Arc<HostSignaling>,
    peer_events_tx: mpsc::UnboundedSender<Envelope>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    // No peer id is assigned until the first `Auth` arrives: the id a peer
    // uses for the rest of the connection is its collision-resolved display
    // name, so there's nothing to register with the router before then.
    let mut peer_id: Option<String> = None;
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    let write_task = tokio::spawn(async move {
        use futures_util::SinkExt;
        while let Some(envelope) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&envelope) {
                if write.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = read.next().await {
        let WsMessage::Text(text) = msg else { continue };
        let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
            continue;
        };

        if let Envelope::Auth { password, display_name } = &envelope {
            if peer_id.is_some() {
                continue; // already authenticated on this connection
            }
            let router = host.router.lock().await;
            let password_ok = router.check_password(password);
            drop(router);
            if !password_ok {
                let _ = tx.send(Envelope::AuthFailed {
                    reason: "bad password".to_string(),
                });
                continue;
            }

            let outbound = host.outbound.lock().await;
            let mut taken: std::collections::HashSet<String> = outbound.keys().cloned().collect();
            taken.insert(host.self_peer_id.clone());
            let final_id = match runic_sync::identity::resolve_collision(display_name, &taken, false) {
                runic_sync::identity::CollisionOutcome::Accepted => display_name.clone(),
                runic_sync::identity::CollisionOutcome::Rebound(name) => name,
                runic_sync::identity::CollisionOutcome::AlreadyRebound => display_name.clone(),
            };
            drop(outbound);

            let mut router = host.router.lock().await;
            router.register_pending(final_id.clone(), std::time::Instant::now());
            router.authenticate(&final_id, password);
            let present = router.present_peers(&final_id);
            drop(router);

            let mut outbound = host.outbound.lock().await;
            outbound.insert(final_id.clone(), tx.clone());
            let _ = tx.send(Envelope::AuthOk {
                peer_id: final_id.clone(),
                present,
            });
            for (other_id, other_tx) in outbound.iter() {
                if *other_id != final_id {
                    let _ = other_tx.send(Envelope::PeerJoined {
                        peer_id: final_id.clone(),
                    });
                }
            }
            drop(outbound);

            let _ = peer_events_tx.send(Envelope::PeerJoined {
                peer_id: final_id.clone(),
            });
            peer_id = Some(final_id);
            continue;
        }

        let Some(peer_id) = peer_id.as_deref() else {
            continue; // everything but Auth requires a resolved peer id
        };

        if envelope.target() == Some(host.self_peer_id.as_str()) {
            let _ = peer_events_tx.send(envelope);
            continue;
        }

        let router = host.router.lock().await;
        let outcome = router.route(peer_id, &envelope);
        drop(router);
        if let runic_sync::signaling::RouteOutcome::Unicast(to, _) = outcome {
            if let Some(tx) = host.outbound.lock().await.get(&to) {
                let _ = tx.send(envelope);
            }
        }
    }

    if let Some(peer_id) = peer_id {
        host.router.lock().await.remove(&peer_id);
        host.outbound.lock().await.remove(&peer_id);
        let _ = peer_events_tx.send(Envelope::PeerLeft { peer_id });
    }
    write_task.abort();
    Ok(())
}

/// Player side: connect to the host's signaling socket, authenticate, and
/// forward every envelope (both directions) through the given channels.
async fn run_signaling_client(
    cs: ConnectionString,
    display_name: String,
    peer_events_tx: mpsc::UnboundedSender<Envelope>,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
) -> Result<()> {
    let scheme = if cs.secure { "wss" } else { "ws" };
    let port_part = cs.port.map(|p| format!(":{p}")).unwrap_or_default();
    let path_part = cs.path.as_deref().unwrap_or("/");
    let url = format!("{scheme}://{}{port_part}{path_part}", cs.host);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .context("connecting to signaling host")?;
    let (mut write, mut read) = ws.split();

    use futures_util::SinkExt;
    let auth = serde_json::to_string(&Envelope::Auth {
        password: cs.password,
        display_name,
    })?;
    write.send(WsMessage::Text(auth.into())).await?;

    let write_task = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if let Ok(text) = serde_json::to_string(&envelope) {
                if write.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = read.next().await {
        let WsMessage::Text(text) = msg else { continue };
        if let Ok(envelope) = serde_json::from_str::<Envelope>(&text) {
            let _ = peer_events_tx.send(envelope);
        }
    }
    write_task.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let inbound = InboundQueue::new();
    let (signaling_events_tx, mut signaling_events_rx) = mpsc::unbounded_channel::<Envelope>();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Envelope>();

    let mut session = match cli.command {
        Command::Create {
            password,
            port,
            mode: _mode,
            name,
        } => {
            let table_id = IdMinter::new().mint();
            let mut identity = IdentityRegistry::load(IdentityRegistry::default_path())
                .unwrap_or_else(|_| IdentityRegistry::new(IdentityRegistry::default_path()));
            let display_name = identity.resolve(table_id, name.as_deref());
            identity.set_saved_name(table_id, display_name.clone());
            let _ = identity.save();

            let session = Session::new(
                Role::GameMaster,
                display_name.clone(),
                table_id,
                format!("{display_name}'s Table"),
                identity,
            );
            let events_tx = signaling_events_tx.clone();
            let self_peer_id = session.self_peer_id.clone();
            tokio::spawn(async move {
                if let Err(e) = run_signaling_host(port, password, self_peer_id, events_tx, outbound_rx).await {
                    tracing::error!(error = %e, "signaling host task exited");
                }
            });
            session
        }
        Command::Join { connection, name } => {
            let cs = ConnectionString::parse(&connection)
                .context("invalid connection string (expected https://, wss://, or runic: scheme)")?;
            // The real table id isn't known until the first snapshot frame
            // arrives, so the saved-name lookup below is keyed on a
            // placeholder; the override/fallback behavior is unaffected.
            let identity = IdentityRegistry::load(IdentityRegistry::default_path())
                .unwrap_or_else(|_| IdentityRegistry::new(IdentityRegistry::default_path()));
            let display_name = identity.resolve(0, name.as_deref());

            let session = Session::new(
                Role::Player,
                display_name.clone(),
                0,
                "(awaiting snapshot)".to_string(),
                identity,
            );
            let events_tx = signaling_events_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = run_signaling_client(cs, display_name, events_tx, outbound_rx).await {
                    tracing::error!(error = %e, "signaling client task exited");
                }
            });
            session
        }
    };

    let mut app = App::new(session.table.name.clone());
    app.push_system_message(format!("{} as {}", session.role_label(), session.display_name));

    enable_raw_mode()?;
    execute!(std::io::stdout(), EnterAlternateScreen)?;
    let mut terminal = ratatui::Terminal::new(ratatui::backend::CrosstermBackend::new(std::io::stdout()))?;

    let theme = Theme::dark();
    let mut keyboard_events = EventStream::new();
    let mut ui_tick = interval(Duration::from_millis(50));

    loop {
        sync_peer_rows(&mut app, &session).await;
        terminal.draw(|frame| app::render_ui(frame, &app, &theme))?;

        tokio::select! {
            keyboard_event = keyboard_events.next() => {
                if let Some(Ok(TermEvent::Key(key))) = keyboard_event {
                    if key.kind != KeyEventKind::Press { continue; }
                    if let Some(text) = app.handle_key_press(key.code) {
                        handle_submitted_line(&mut session, &mut app, &text).await;
                    }
                }
            }

            ready = inbound.drain_tick() => {
                for message in ready {
                    if let Some((display_name, text)) = session.apply(message) {
                        app.push_chat_message(display_name, text);
                    }
                }
            }

            envelope = signaling_events_rx.recv() => {
                if let Some(envelope) = envelope {
                    handle_signaling_envelope(&mut session, &mut app, envelope, &outbound_tx, &inbound).await;
                }
            }

            _ = ui_tick.tick() => {
                let now = std::time::Instant::now();
                for event in session.drag.poll_watchdogs(now) {
                    tracing::warn!(?event, "drag watchdog");
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    disable_raw_mode()?;
    execute!(std::io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

async fn sync_peer_rows(app: &mut App, session: &Session) {
    app.peers.clear();
    for link in session.peer_links.values() {
        app.peers.push(PeerRow {
            display_name: link.remote_peer_id.clone(),
            pc_state: link.current_state().await,
        });
    }
    let board_count = session.table.boards.len();
    let marker_count = session.table.boards.values().map(|b| b.markers.len()).sum();
    app.set_board_summary(board_count, marker_count);
}

/// Send `frame` on `channel`, to every peer if `group_id` is a broadcast
/// group, or only to that group's participants otherwise.
async fn send_group_frame(session: &mut Session, group_id: EntityId, frame: &Frame, channel: ChannelLabel) {
    let targeted = session.chat.delivery_for(group_id) == chat::Delivery::Targeted;
    let participants = if targeted {
        session.chat.groups.get(&group_id).map(|g| g.participants.clone())
    } else {
        None
    };
    let bytes = frame.encode();
    let mut bad = Vec::new();
    for (peer_id, link) in session.peer_links.iter() {
        if let Some(participants) = &participants {
            if !participants.contains(peer_id) {
                continue;
            }
        }
        if link.send(channel, bytes.clone()).await.is_err() {
            bad.push(peer_id.clone());
        }
    }
    for peer_id in bad {
        session.bad_frames.record(&peer_id);
    }
}

async fn send_chat_message(session: &mut Session, app: &mut App, group_id: EntityId, text: &str) {
    let frame = Frame::ChatMessage {
        table_id: session.table.table_id,
        group_id,
        ts: 0,
        sender_user_id: session.self_peer_id.clone(),
        display_name: session.display_name.clone(),
        text: text.to_string(),
    };
    let message = ModelChatMessage::new(session.self_peer_id.clone(), session.display_name.clone(), text, 0);
    session.chat.record_message(group_id, message, true);
    app.push_chat_message(session.display_name.clone(), text.to_string());
    send_group_frame(session, group_id, &frame, ChannelLabel::Chat).await;
}

async fn handle_submitted_line(session: &mut Session, app: &mut App, text: &str) {
    if let Ok(roll) = DiceRoll::parse(text) {
        let mut rng = rand::rng();
        let (values, total) = roll.roll_with(&mut rng);
        app.push_system_message(format!("{} rolled {values:?} = {total}", session.display_name));
        return;
    }

    if let Some(rest) = text.strip_prefix("/whisper ") {
        let Some((target, body)) = rest.split_once(' ') else {
            app.push_system_message("usage: /whisper <name> <message>".to_string());
            return;
        };
        if body.is_empty() {
            app.push_system_message("usage: /whisper <name> <message>".to_string());
            return;
        }
        let mut participants = BTreeSet::new();
        participants.insert(session.self_peer_id.clone());
        participants.insert(target.to_string());
        let is_new = !session
            .chat
            .groups
            .contains_key(&chat::group_id_for_participants(&participants));
        let group_id = session.chat.group_for(participants.clone(), session.self_peer_id.clone());
        if is_new {
            let name = session
                .chat
                .groups
                .get(&group_id)
                .map(|g| g.name.clone())
                .unwrap_or_default();
            let create_frame = Frame::ChatGroupCreate {
                table_id: session.table.table_id,
                group_id,
                name,
                participants: participants.into_iter().collect(),
                owner_user_id: session.self_peer_id.clone(),
            };
            send_group_frame(session, group_id, &create_frame, ChannelLabel::Chat).await;
        }
        send_chat_message(session, app, group_id, body).await;
        return;
    }

    send_chat_message(session, app, runic_sync::ids::GENERAL_GROUP_ID, text).await;
}

async fn handle_signaling_envelope(
    session: &mut Session,
    app: &mut App,
    envelope: Envelope,
    outbound_tx: &mpsc::UnboundedSender<Envelope>,
    inbound: &InboundQueue,
) {
    match envelope {
        Envelope::PeerJoined { peer_id } => {
            app.push_system_message(format!("{peer_id} joined"));
            session.known_via_peer_joined.insert(peer_id.clone());
            // The GM always initiates: it's the only peer every other peer
            // can discover without first receiving an offer from it (it
            // never shows up in anyone's PeerJoined broadcasts), so leaving
            // this to id-lexicographic tiebreak alone could deadlock.
            if session.role.is_gm() || peer_link::is_offerer(&session.self_peer_id, &peer_id) {
                if let Err(e) = initiate_offer(session, &peer_id, outbound_tx, inbound).await {
                    tracing::warn!(error = %e, peer = %peer_id, "failed to initiate offer");
                }
            }
        }
        Envelope::Offer { from, sdp, .. } => {
            if let Err(e) = accept_offer(session, &from, &sdp, outbound_tx, inbound).await {
                tracing::warn!(error = %e, peer = %from, "failed to accept offer");
            }
        }
        Envelope::Answer { from, sdp, .. } => {
            if let Err(e) = accept_answer(session, &from, &sdp).await {
                tracing::warn!(error = %e, peer = %from, "failed to accept answer");
            }
        }
        Envelope::PeerLeft { peer_id } => {
            let closed = session.drag.on_peer_disconnected(&peer_id);
            if !closed.is_empty() {
                tracing::info!(?closed, peer = %peer_id, "force-closed drags on disconnect");
            }
            session.peer_links.remove(&peer_id);
            session.peer_roles.remove(&peer_id);
            app.push_system_message(format!("{peer_id} left"));
        }
        Envelope::AuthFailed { reason } => {
            app.push_system_message(format!("auth failed: {reason}"));
            app.should_quit = true;
        }
        Envelope::ServerDisconnect { reason } => {
            app.push_system_message(format!("disconnected: {reason}"));
            app.should_quit = true;
        }
        Envelope::AuthOk { peer_id, present } => {
            if peer_id != session.self_peer_id {
                // The router resolved a name collision against peers
                // already on the table; adopt the name it actually
                // registered us under.
                app.push_system_message(format!("name collided, now known as {peer_id}"));
                session.self_peer_id = peer_id.clone();
                session.display_name = peer_id.clone();
            }
            app.push_system_message(format!("connected as {peer_id}, {} peer(s) present", present.len()));
        }
        // Not used by this demo, which waits out full ICE gathering instead
        // of trickling candidates; the router still relays them for any
        // peer that does trickle.
        Envelope::Candidate { .. } | Envelope::Ping | Envelope::Pong => {}
    }
}
