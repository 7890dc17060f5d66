//! The in-memory world model: tables, boards, markers, fog, grid, and chat.
//!
//! This module owns the shared table/board/marker/fog/chat data types. It
//! has no network awareness — `replicator.rs` and `chat.rs` are what translate wire frames
//! into mutations here. Keeping the model free of protocol concerns means it
//! can be unit tested without a single byte ever crossing the wire.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::ids::EntityId;

/// A peer's authority level on the table. The GM authored the table and has
/// elevated authority over fog, grid, and marker ownership attributes;
/// Players are bound by marker ownership rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    GameMaster,
    Player,
}

impl Role {
    pub fn is_gm(self) -> bool {
        matches!(self, Role::GameMaster)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pos {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub w: f32,
    pub h: f32,
}

/// Pan/zoom state for a board. Active-board and pan state are per-peer UI
/// concerns that happen to live on the shared `Board` record; they do not
/// need to agree across peers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PanState {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub offset: Pos,
    pub cell_size: f32,
    pub is_hex: bool,
    pub snap_to_grid: bool,
    pub visible: bool,
    pub opacity: f32,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            offset: Pos::default(),
            cell_size: 64.0,
            is_hex: false,
            snap_to_grid: true,
            visible: true,
            opacity: 1.0,
        }
    }
}

/// Advisory ownership attributes for a marker.
///
/// Ownership never blocks the GM: `can_move` below is the single source of
/// truth for the move-authority check, so the rule only has to be gotten
/// right once.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerOwner {
    pub owner_user_id: String,
    pub allow_all_players_move: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub marker_id: EntityId,
    pub board_id: EntityId,
    pub pos: Pos,
    pub size: Size,
    pub visible: bool,
    pub moving: bool,
    pub owner: MarkerOwner,
    pub image: Vec<u8>,
}

impl Marker {
    /// Can `user_id` (with the given role) move this marker right now?
    /// GM authority always wins; otherwise the mover must be the owner or
    /// the marker must allow any player to move it, and it must not be
    /// locked.
    pub fn can_move(&self, user_id: &str, role: Role) -> bool {
        if role.is_gm() {
            return true;
        }
        if self.owner.locked {
            return false;
        }
        self.owner.owner_user_id == user_id || self.owner.allow_all_players_move
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fog {
    pub fog_id: EntityId,
    pub board_id: EntityId,
    pub pos: Pos,
    pub size: Size,
    pub visible: bool,
}

#[derive(Debug, Clone)]
pub struct Board {
    pub board_id: EntityId,
    pub name: String,
    pub size: (u32, u32),
    pub grid: Grid,
    pub pan: PanState,
    pub image: Vec<u8>,
    pub markers: HashMap<EntityId, Marker>,
    pub fogs: HashMap<EntityId, Fog>,
}

impl Board {
    pub fn new(board_id: EntityId, name: impl Into<String>, size: (u32, u32)) -> Self {
        Self {
            board_id,
            name: name.into(),
            size,
            grid: Grid::default(),
            pan: PanState::default(),
            image: Vec::new(),
            markers: HashMap::new(),
            fogs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameTable {
    pub table_id: EntityId,
    pub name: String,
    pub boards: HashMap<EntityId, Board>,
}

impl GameTable {
    pub fn new(table_id: EntityId, name: impl Into<String>) -> Self {
        Self {
            table_id,
            name: name.into(),
            boards: HashMap::new(),
        }
    }

    pub fn board_mut(&mut self, board_id: EntityId) -> Option<&mut Board> {
        self.boards.get_mut(&board_id)
    }

    pub fn marker_mut(&mut self, board_id: EntityId, marker_id: EntityId) -> Option<&mut Marker> {
        self.boards.get_mut(&board_id)?.markers.get_mut(&marker_id)
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMessageKind {
    Text,
    Image,
    Link,
}

impl ChatMessageKind {
    /// Classify a chat message body: a URL prefix makes it a link, a
    /// recognized image extension makes it an image, otherwise it's plain
    /// text.
    pub fn classify(content: &str) -> Self {
        const IMAGE_EXTS: [&str; 5] = [".png", ".jpg", ".jpeg", ".gif", ".webp"];
        let lower = content.trim().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            if IMAGE_EXTS.iter().any(|ext| lower.ends_with(ext)) {
                ChatMessageKind::Image
            } else {
                ChatMessageKind::Link
            }
        } else {
            ChatMessageKind::Text
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender_user_id: String,
    pub display_name: String,
    pub kind: ChatMessageKind,
    pub content: String,
    pub ts_seconds: u64,
}

impl ChatMessage {
    pub fn new(
        sender_user_id: impl Into<String>,
        display_name: impl Into<String>,
        content: impl Into<String>,
        ts_seconds: u64,
    ) -> Self {
        let content = content.into();
        let kind = ChatMessageKind::classify(&content);
        Self {
            sender_user_id: sender_user_id.into(),
            display_name: display_name.into(),
            kind,
            content,
            ts_seconds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatGroup {
    pub group_id: EntityId,
    pub name: String,
    /// Empty (outside of General) is never valid for a created group; General
    /// itself is the one group whose empty participant set means "broadcast
    /// to everyone on the table".
    pub participants: BTreeSet<String>,
    pub owner_user_id: String,
    pub messages: VecDeque<ChatMessage>,
    pub unread: u32,
}

impl ChatGroup {
    pub fn general(owner_user_id: impl Into<String>) -> Self {
        Self {
            group_id: crate::ids::GENERAL_GROUP_ID,
            name: "General".to_string(),
            participants: BTreeSet::new(),
            owner_user_id: owner_user_id.into(),
            messages: VecDeque::new(),
            unread: 0,
        }
    }

    pub fn is_general(&self) -> bool {
        self.group_id == crate::ids::GENERAL_GROUP_ID
    }

    /// General (or any group with an empty participant set) delivers by
    /// broadcast; anything else is targeted.
    pub fn is_broadcast(&self) -> bool {
        self.is_general() || self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: &str, allow_all: bool, locked: bool) -> MarkerOwner {
        MarkerOwner {
            owner_user_id: id.to_string(),
            allow_all_players_move: allow_all,
            locked,
        }
    }

    fn marker_with(owner_attrs: MarkerOwner) -> Marker {
        Marker {
            marker_id: 1,
            board_id: 1,
            pos: Pos::default(),
            size: Size::default(),
            visible: true,
            moving: false,
            owner: owner_attrs,
            image: Vec::new(),
        }
    }

    #[test]
    fn gm_can_always_move() {
        let m = marker_with(owner("alice", false, true));
        assert!(m.can_move("bob", Role::GameMaster));
    }

    #[test]
    fn owner_can_move_when_unlocked() {
        let m = marker_with(owner("alice", false, false));
        assert!(m.can_move("alice", Role::Player));
        assert!(!m.can_move("bob", Role::Player));
    }

    #[test]
    fn allow_all_players_move_grants_non_owners() {
        let m = marker_with(owner("alice", true, false));
        assert!(m.can_move("bob", Role::Player));
    }

    #[test]
    fn locked_blocks_every_player_including_owner() {
        let m = marker_with(owner("alice", true, true));
        assert!(!m.can_move("alice", Role::Player));
        assert!(!m.can_move("bob", Role::Player));
        assert!(m.can_move("anyone", Role::GameMaster));
    }

    #[test]
    fn chat_message_kind_classification() {
        assert_eq!(ChatMessageKind::classify("hello"), ChatMessageKind::Text);
        assert_eq!(
            ChatMessageKind::classify("https://example.com/map.png"),
            ChatMessageKind::Image
        );
        assert_eq!(
            ChatMessageKind::classify("https://example.com"),
            ChatMessageKind::Link
        );
    }

    #[test]
    fn general_group_is_broadcast_and_reserved() {
        let g = ChatGroup::general("gm-user");
        assert_eq!(g.group_id, crate::ids::GENERAL_GROUP_ID);
        assert!(g.is_broadcast());
    }
}
