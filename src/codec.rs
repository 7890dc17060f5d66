//! Wire Codec — framed binary encode/decode of data-channel messages.
//!
//! Frame layout: `[ u8 kind ][ body ]`, one data-channel message per frame.
//! Every frame is table-scoped and begins its body with `tableId: u64`.
//! Multi-byte integers are little-endian; booleans are one byte (0/1);
//! strings are `i32` byte-length followed by UTF-8 bytes; raw byte arrays
//! (image chunks) are `u32` byte-length followed by bytes — a distinct
//! width from strings because chunk payloads can be far larger than any
//! reasonable string.
//!
//! Decoding never panics: every read checks remaining bytes first, and a
//! truncated or unknown frame returns a `CodecError` instead of touching
//! any state.

use crate::ids::EntityId;
use crate::model::{Grid, Pos, Size};

// ── Primitives ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    UnexpectedEof,
    InvalidUtf8,
    InvalidBool,
    UnknownKind(u8),
    NegativeStringLength,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::UnexpectedEof => write!(f, "frame truncated"),
            CodecError::InvalidUtf8 => write!(f, "invalid utf-8 in string field"),
            CodecError::InvalidBool => write!(f, "invalid bool byte"),
            CodecError::UnknownKind(k) => write!(f, "unknown frame kind {k}"),
            CodecError::NegativeStringLength => write!(f, "negative string length"),
        }
    }
}

impl std::error::Error for CodecError {}

pub type DecodeResult<T> = Result<T, CodecError>;

/// Appends primitives to a growing byte buffer.
pub struct Writer(Vec<u8>);

impl Writer {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.0.push(v as u8);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// `i32` byte-length prefix followed by UTF-8 bytes.
    pub fn str(&mut self, v: &str) -> &mut Self {
        self.i32(v.len() as i32);
        self.0.extend_from_slice(v.as_bytes());
        self
    }

    /// `u32` byte-length prefix followed by raw bytes.
    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.u32(v.len() as u32);
        self.0.extend_from_slice(v);
        self
    }

    pub fn pos(&mut self, p: Pos) -> &mut Self {
        self.f32(p.x).f32(p.y)
    }

    pub fn size(&mut self, s: Size) -> &mut Self {
        self.f32(s.w).f32(s.h)
    }

    pub fn grid(&mut self, g: &Grid) -> &mut Self {
        self.pos(g.offset)
            .f32(g.cell_size)
            .bool(g.is_hex)
            .bool(g.snap_to_grid)
            .bool(g.visible)
            .f32(g.opacity)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads primitives off a byte slice, checking remaining length at every
/// step so a truncated frame surfaces as `CodecError::UnexpectedEof`
/// instead of a panic.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.buf.len() < self.pos + n {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> DecodeResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(CodecError::InvalidBool),
        }
    }

    pub fn u32(&mut self) -> DecodeResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn i32(&mut self) -> DecodeResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> DecodeResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn f32(&mut self) -> DecodeResult<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn str(&mut self) -> DecodeResult<String> {
        let len = self.i32()?;
        if len < 0 {
            return Err(CodecError::NegativeStringLength);
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn bytes(&mut self) -> DecodeResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn pos(&mut self) -> DecodeResult<Pos> {
        Ok(Pos {
            x: self.f32()?,
            y: self.f32()?,
        })
    }

    pub fn size(&mut self) -> DecodeResult<Size> {
        Ok(Size {
            w: self.f32()?,
            h: self.f32()?,
        })
    }

    pub fn grid(&mut self) -> DecodeResult<Grid> {
        Ok(Grid {
            offset: self.pos()?,
            cell_size: self.f32()?,
            is_hex: self.bool()?,
            snap_to_grid: self.bool()?,
            visible: self.bool()?,
            opacity: self.f32()?,
        })
    }

    /// Bytes left unconsumed — trailing garbage isn't an error by itself,
    /// callers may check this to be strict.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

// ── Frame kinds ──────────────────────────────────────────────────────────────

/// Numeric discriminants for every op-frame kind, assigned a dense
/// `1..=17` range rather than the sparse values a `uint8_t`-backed enum
/// with a member like `300` would overflow into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    SnapshotGameTable = 1,
    CommitBoard = 2,
    CommitMarker = 3,
    ImageChunk = 4,
    MarkerMove = 5,
    MarkerMoveState = 6,
    MarkerUpdate = 7,
    MarkerDelete = 8,
    FogCreate = 9,
    FogUpdate = 10,
    FogDelete = 11,
    GridUpdate = 12,
    ChatGroupCreate = 13,
    ChatGroupUpdate = 14,
    ChatGroupDelete = 15,
    ChatMessage = 16,
    UserNameUpdate = 17,
}

impl FrameKind {
    fn from_u8(v: u8) -> DecodeResult<Self> {
        use FrameKind::*;
        Ok(match v {
            1 => SnapshotGameTable,
            2 => CommitBoard,
            3 => CommitMarker,
            4 => ImageChunk,
            5 => MarkerMove,
            6 => MarkerMoveState,
            7 => MarkerUpdate,
            8 => MarkerDelete,
            9 => FogCreate,
            10 => FogUpdate,
            11 => FogDelete,
            12 => GridUpdate,
            13 => ChatGroupCreate,
            14 => ChatGroupUpdate,
            15 => ChatGroupDelete,
            16 => ChatMessage,
            17 => UserNameUpdate,
            other => return Err(CodecError::UnknownKind(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageOwnerKind {
    Board = 0,
    Marker = 1,
}

impl ImageOwnerKind {
    fn from_u8(v: u8) -> DecodeResult<Self> {
        match v {
            0 => Ok(ImageOwnerKind::Board),
            1 => Ok(ImageOwnerKind::Marker),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SenderRole {
    GameMaster = 0,
    Player = 1,
}

impl SenderRole {
    fn from_u8(v: u8) -> DecodeResult<Self> {
        match v {
            0 => Ok(SenderRole::GameMaster),
            1 => Ok(SenderRole::Player),
            other => Err(CodecError::UnknownKind(other)),
        }
    }

    pub fn from_role(role: crate::model::Role) -> Self {
        match role {
            crate::model::Role::GameMaster => SenderRole::GameMaster,
            crate::model::Role::Player => SenderRole::Player,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardMeta {
    pub board_id: EntityId,
    pub name: String,
    pub size: (u32, u32),
    pub grid: Grid,
    pub pan: crate::model::PanState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerMeta {
    pub marker_id: EntityId,
    pub pos: Pos,
    pub size: Size,
    pub visible: bool,
    pub owner_user_id: String,
    pub allow_all_players_move: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moving {
    Start,
    End,
}

/// Every frame decodes to one of these variants — a tagged union dispatched
/// with a single `match`, never virtual-method lookup keyed by enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SnapshotGameTable {
        table_id: EntityId,
        name: String,
    },
    CommitBoard {
        table_id: EntityId,
        meta: BoardMeta,
        image_bytes_total: u64,
    },
    CommitMarker {
        table_id: EntityId,
        board_id: EntityId,
        meta: MarkerMeta,
        image_bytes_total: u64,
    },
    ImageChunk {
        table_id: EntityId,
        owner_kind: ImageOwnerKind,
        id: EntityId,
        offset: u64,
        bytes: Vec<u8>,
    },
    MarkerMove {
        table_id: EntityId,
        board_id: EntityId,
        marker_id: EntityId,
        pos: Pos,
        epoch: u32,
        seq: u32,
        ts: u64,
        sender_role: SenderRole,
    },
    MarkerMoveState {
        table_id: EntityId,
        board_id: EntityId,
        marker_id: EntityId,
        moving: Moving,
        final_pos: Option<Pos>,
        epoch: u32,
        seq: u32,
        ts: u64,
        sender_role: SenderRole,
    },
    MarkerUpdate {
        table_id: EntityId,
        board_id: EntityId,
        marker_id: EntityId,
        size: Option<Size>,
        visible: Option<bool>,
        owner: Option<(String, bool, bool)>, // (owner_user_id, allow_all, locked)
    },
    MarkerDelete {
        table_id: EntityId,
        board_id: EntityId,
        marker_id: EntityId,
    },
    FogCreate {
        table_id: EntityId,
        board_id: EntityId,
        fog_id: EntityId,
        pos: Pos,
        size: Size,
        visible: bool,
    },
    FogUpdate {
        table_id: EntityId,
        board_id: EntityId,
        fog_id: EntityId,
        pos: Option<Pos>,
        size: Option<Size>,
        visible: Option<bool>,
    },
    FogDelete {
        table_id: EntityId,
        board_id: EntityId,
        fog_id: EntityId,
    },
    GridUpdate {
        table_id: EntityId,
        board_id: EntityId,
        grid: Grid,
    },
    ChatGroupCreate {
        table_id: EntityId,
        group_id: EntityId,
        name: String,
        participants: Vec<String>,
        owner_user_id: String,
    },
    ChatGroupUpdate {
        table_id: EntityId,
        group_id: EntityId,
        name: String,
        participants: Vec<String>,
        owner_user_id: String,
    },
    ChatGroupDelete {
        table_id: EntityId,
        group_id: EntityId,
    },
    ChatMessage {
        table_id: EntityId,
        group_id: EntityId,
        ts: u64,
        sender_user_id: String,
        display_name: String,
        text: String,
    },
    UserNameUpdate {
        table_id: EntityId,
        user_id: String,
        old_name: String,
        new_name: String,
        rebound: bool,
    },
}

fn write_option_size(w: &mut Writer, v: Option<Size>) {
    match v {
        Some(s) => {
            w.bool(true).size(s);
        }
        None => {
            w.bool(false);
        }
    }
}

fn write_option_pos(w: &mut Writer, v: Option<Pos>) {
    match v {
        Some(p) => {
            w.bool(true).pos(p);
        }
        None => {
            w.bool(false);
        }
    }
}

fn write_option_bool(w: &mut Writer, v: Option<bool>) {
    match v {
        Some(b) => {
            w.bool(true).bool(b);
        }
        None => {
            w.bool(false);
        }
    }
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        use Frame::*;
        match self {
            SnapshotGameTable { .. } => FrameKind::SnapshotGameTable,
            CommitBoard { .. } => FrameKind::CommitBoard,
            CommitMarker { .. } => FrameKind::CommitMarker,
            ImageChunk { .. } => FrameKind::ImageChunk,
            MarkerMove { .. } => FrameKind::MarkerMove,
            MarkerMoveState { .. } => FrameKind::MarkerMoveState,
            MarkerUpdate { .. } => FrameKind::MarkerUpdate,
            MarkerDelete { .. } => FrameKind::MarkerDelete,
            FogCreate { .. } => FrameKind::FogCreate,
            FogUpdate { .. } => FrameKind::FogUpdate,
            FogDelete { .. } => FrameKind::FogDelete,
            GridUpdate { .. } => FrameKind::GridUpdate,
            ChatGroupCreate { .. } => FrameKind::ChatGroupCreate,
            ChatGroupUpdate { .. } => FrameKind::ChatGroupUpdate,
            ChatGroupDelete { .. } => FrameKind::ChatGroupDelete,
            ChatMessage { .. } => FrameKind::ChatMessage,
            UserNameUpdate { .. } => FrameKind::UserNameUpdate,
        }
    }

    /// The table this frame belongs to — every frame starts with it, so
    /// receivers can discard frames for a table they don't have open
    /// without decoding the rest of the body.
    pub fn table_id(&self) -> EntityId {
        use Frame::*;
        match self {
            SnapshotGameTable { table_id, .. }
            | CommitBoard { table_id, .. }
            | CommitMarker { table_id, .. }
            | ImageChunk { table_id, .. }
            | MarkerMove { table_id, .. }
            | MarkerMoveState { table_id, .. }
            | MarkerUpdate { table_id, .. }
            | MarkerDelete { table_id, .. }
            | FogCreate { table_id, .. }
            | FogUpdate { table_id, .. }
            | FogDelete { table_id, .. }
            | GridUpdate { table_id, .. }
            | ChatGroupCreate { table_id, .. }
            | ChatGroupUpdate { table_id, .. }
            | ChatGroupDelete { table_id, .. }
            | ChatMessage { table_id, .. }
            | UserNameUpdate { table_id, .. } => *table_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u8(self.kind() as u8);
        w.u64(self.table_id());
        match self {
            Frame::SnapshotGameTable { name, .. } => {
                w.str(name);
            }
            Frame::CommitBoard {
                meta,
                image_bytes_total,
                ..
            } => {
                w.u64(meta.board_id)
                    .str(&meta.name)
                    .u32(meta.size.0)
                    .u32(meta.size.1)
                    .grid(&meta.grid)
                    .f32(meta.pan.x)
                    .f32(meta.pan.y)
                    .f32(meta.pan.zoom)
                    .u64(*image_bytes_total);
            }
            Frame::CommitMarker {
                board_id,
                meta,
                image_bytes_total,
                ..
            } => {
                w.u64(*board_id)
                    .u64(meta.marker_id)
                    .pos(meta.pos)
                    .size(meta.size)
                    .bool(meta.visible)
                    .str(&meta.owner_user_id)
                    .bool(meta.allow_all_players_move)
                    .bool(meta.locked)
                    .u64(*image_bytes_total);
            }
            Frame::ImageChunk {
                owner_kind,
                id,
                offset,
                bytes,
                ..
            } => {
                w.u8(*owner_kind as u8).u64(*id).u64(*offset).bytes(bytes);
            }
            Frame::MarkerMove {
                board_id,
                marker_id,
                pos,
                epoch,
                seq,
                ts,
                sender_role,
                ..
            } => {
                w.u64(*board_id)
                    .u64(*marker_id)
                    .pos(*pos)
                    .u32(*epoch)
                    .u32(*seq)
                    .u64(*ts)
                    .u8(*sender_role as u8);
            }
            Frame::MarkerMoveState {
                board_id,
                marker_id,
                moving,
                final_pos,
                epoch,
                seq,
                ts,
                sender_role,
                ..
            } => {
                w.u64(*board_id).u64(*marker_id).u8(match moving {
                    Moving::Start => 1,
                    Moving::End => 0,
                });
                write_option_pos(&mut w, *final_pos);
                w.u32(*epoch).u32(*seq).u64(*ts).u8(*sender_role as u8);
            }
            Frame::MarkerUpdate {
                board_id,
                marker_id,
                size,
                visible,
                owner,
                ..
            } => {
                w.u64(*board_id).u64(*marker_id);
                write_option_size(&mut w, *size);
                write_option_bool(&mut w, *visible);
                match owner {
                    Some((owner_user_id, allow_all, locked)) => {
                        w.bool(true)
                            .str(owner_user_id)
                            .bool(*allow_all)
                            .bool(*locked);
                    }
                    None => {
                        w.bool(false);
                    }
                }
            }
            Frame::MarkerDelete {
                board_id,
                marker_id,
                ..
            } => {
                w.u64(*board_id).u64(*marker_id);
            }
            Frame::FogCreate {
                board_id,
                fog_id,
                pos,
                size,
                visible,
                ..
            } => {
                w.u64(*board_id)
                    .u64(*fog_id)
                    .pos(*pos)
                    .size(*size)
                    .bool(*visible);
            }
            Frame::FogUpdate {
                board_id,
                fog_id,
                pos,
                size,
                visible,
                ..
            } => {
                w.u64(*board_id).u64(*fog_id);
                write_option_pos(&mut w, *pos);
                write_option_size(&mut w, *size);
                write_option_bool(&mut w, *visible);
            }
            Frame::FogDelete {
                board_id, fog_id, ..
            } => {
                w.u64(*board_id).u64(*fog_id);
            }
            Frame::GridUpdate { board_id, grid, .. } => {
                w.u64(*board_id).grid(grid);
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
                w.u64(*group_id).str(name).u32(participants.len() as u32);
                for p in participants {
                    w.str(p);
                }
                w.str(owner_user_id);
            }
            Frame::ChatGroupDelete { group_id, .. } => {
                w.u64(*group_id);
            }
            Frame::ChatMessage {
                group_id,
                ts,
                sender_user_id,
                display_name,
                text,
                ..
            } => {
                w.u64(*group_id)
                    .u64(*ts)
                    .str(sender_user_id)
                    .str(display_name)
                    .str(text);
            }
            Frame::UserNameUpdate {
                user_id,
                old_name,
                new_name,
                rebound,
                ..
            } => {
                w.str(user_id).str(old_name).str(new_name).bool(*rebound);
            }
        }
        w.into_vec()
    }

    pub fn decode(bytes: &[u8]) -> DecodeResult<Frame> {
        let mut r = Reader::new(bytes);
        let kind = FrameKind::from_u8(r.u8()?)?;
        let table_id = r.u64()?;
        Ok(match kind {
            FrameKind::SnapshotGameTable => Frame::SnapshotGameTable {
                table_id,
                name: r.str()?,
            },
            FrameKind::CommitBoard => {
                let board_id = r.u64()?;
                let name = r.str()?;
                let w = r.u32()?;
                let h = r.u32()?;
                let grid = r.grid()?;
                let pan = crate::model::PanState {
                    x: r.f32()?,
                    y: r.f32()?,
                    zoom: r.f32()?,
                };
                let image_bytes_total = r.u64()?;
                Frame::CommitBoard {
                    table_id,
                    meta: BoardMeta {
                        board_id,
                        name,
                        size: (w, h),
                        grid,
                        pan,
                    },
                    image_bytes_total,
                }
            }
            FrameKind::CommitMarker => {
                let board_id = r.u64()?;
                let marker_id = r.u64()?;
                let pos = r.pos()?;
                let size = r.size()?;
                let visible = r.bool()?;
                let owner_user_id = r.str()?;
                let allow_all_players_move = r.bool()?;
                let locked = r.bool()?;
                let image_bytes_total = r.u64()?;
                Frame::CommitMarker {
                    table_id,
                    board_id,
                    meta: MarkerMeta {
                        marker_id,
                        pos,
                        size,
                        visible,
                        owner_user_id,
                        allow_all_players_move,
                        locked,
                    },
                    image_bytes_total,
                }
            }
            FrameKind::ImageChunk => Frame::ImageChunk {
                table_id,
                owner_kind: ImageOwnerKind::from_u8(r.u8()?)?,
                id: r.u64()?,
                offset: r.u64()?,
                bytes: r.bytes()?,
            },
            FrameKind::MarkerMove => Frame::MarkerMove {
                table_id,
                board_id: r.u64()?,
                marker_id: r.u64()?,
                pos: r.pos()?,
                epoch: r.u32()?,
                seq: r.u32()?,
                ts: r.u64()?,
                sender_role: SenderRole::from_u8(r.u8()?)?,
            },
            FrameKind::MarkerMoveState => {
                let board_id = r.u64()?;
                let marker_id = r.u64()?;
                let moving = if r.u8()? == 1 { Moving::Start } else { Moving::End };
                let final_pos = if r.bool()? { Some(r.pos()?) } else { None };
                let epoch = r.u32()?;
                let seq = r.u32()?;
                let ts = r.u64()?;
                let sender_role = SenderRole::from_u8(r.u8()?)?;
                Frame::MarkerMoveState {
                    table_id,
                    board_id,
                    marker_id,
                    moving,
                    final_pos,
                    epoch,
                    seq,
                    ts,
                    sender_role,
                }
            }
            FrameKind::MarkerUpdate => {
                let board_id = r.u64()?;
                let marker_id = r.u64()?;
                let size = if r.bool()? { Some(r.size()?) } else { None };
                let visible = if r.bool()? { Some(r.bool()?) } else { None };
                let owner = if r.bool()? {
                    let owner_user_id = r.str()?;
                    let allow_all = r.bool()?;
                    let locked = r.bool()?;
                    Some((owner_user_id, allow_all, locked))
                } else {
                    None
                };
                Frame::MarkerUpdate {
                    table_id,
                    board_id,
                    marker_id,
                    size,
                    visible,
                    owner,
                }
            }
            FrameKind::MarkerDelete => Frame::MarkerDelete {
                table_id,
                board_id: r.u64()?,
                marker_id: r.u64()?,
            },
            FrameKind::FogCreate => Frame::FogCreate {
                table_id,
                board_id: r.u64()?,
                fog_id: r.u64()?,
                pos: r.pos()?,
                size: r.size()?,
                visible: r.bool()?,
            },
            FrameKind::FogUpdate => {
                let board_id = r.u64()?;
                let fog_id = r.u64()?;
                let pos = if r.bool()? { Some(r.pos()?) } else { None };
                let size = if r.bool()? { Some(r.size()?) } else { None };
                let visible = if r.bool()? { Some(r.bool()?) } else { None };
                Frame::FogUpdate {
                    table_id,
                    board_id,
                    fog_id,
                    pos,
                    size,
                    visible,
                }
            }
            FrameKind::FogDelete => Frame::FogDelete {
                table_id,
                board_id: r.u64()?,
                fog_id: r.u64()?,
            },
            FrameKind::GridUpdate => Frame::GridUpdate {
                table_id,
                board_id: r.u64()?,
                grid: r.grid()?,
            },
            FrameKind::ChatGroupCreate | FrameKind::ChatGroupUpdate => {
                let group_id = r.u64()?;
                let name = r.str()?;
                let count = r.u32()?;
                let mut participants = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    participants.push(r.str()?);
                }
                let owner_user_id = r.str()?;
                if kind == FrameKind::ChatGroupCreate {
                    Frame::ChatGroupCreate {
                        table_id,
                        group_id,
                        name,
                        participants,
                        owner_user_id,
                    }
                } else {
                    Frame::ChatGroupUpdate {
                        table_id,
                        group_id,
                        name,
                        participants,
                        owner_user_id,
                    }
                }
            }
            FrameKind::ChatGroupDelete => Frame::ChatGroupDelete {
                table_id,
                group_id: r.u64()?,
            },
            FrameKind::ChatMessage => Frame::ChatMessage {
                table_id,
                group_id: r.u64()?,
                ts: r.u64()?,
                sender_user_id: r.str()?,
                display_name: r.str()?,
                text: r.str()?,
            },
            FrameKind::UserNameUpdate => Frame::UserNameUpdate {
                table_id,
                user_id: r.str()?,
                old_name: r.str()?,
                new_name: r.str()?,
                rebound: r.bool()?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Grid;

    #[test]
    fn marker_move_roundtrip() {
        let frame = Frame::MarkerMove {
            table_id: 42,
            board_id: 7,
            marker_id: 99,
            pos: Pos { x: 1.5, y: -2.25 },
            epoch: 3,
            seq: 10,
            ts: 1_700_000_000,
            sender_role: SenderRole::Player,
        };
        let bytes = frame.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn marker_move_state_with_final_pos_roundtrip() {
        let frame = Frame::MarkerMoveState {
            table_id: 1,
            board_id: 2,
            marker_id: 3,
            moving: Moving::End,
            final_pos: Some(Pos { x: 120.0, y: 80.0 }),
            epoch: 7,
            seq: 43,
            ts: 123,
            sender_role: SenderRole::GameMaster,
        };
        let bytes = frame.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn commit_board_roundtrip_preserves_grid_and_pan() {
        let frame = Frame::CommitBoard {
            table_id: 1,
            meta: BoardMeta {
                board_id: 5,
                name: "Dungeon".to_string(),
                size: (2000, 1500),
                grid: Grid {
                    cell_size: 48.0,
                    is_hex: true,
                    ..Grid::default()
                },
                pan: crate::model::PanState {
                    x: 10.0,
                    y: -5.0,
                    zoom: 1.25,
                },
            },
            image_bytes_total: 20000,
        };
        let bytes = frame.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn image_chunk_roundtrip() {
        let frame = Frame::ImageChunk {
            table_id: 1,
            owner_kind: ImageOwnerKind::Board,
            id: 5,
            offset: 8192,
            bytes: vec![0xAB; 8192],
        };
        let bytes = frame.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn chat_group_create_roundtrip_with_participants() {
        let frame = Frame::ChatGroupCreate {
            table_id: 1,
            group_id: 55,
            name: "Party".to_string(),
            participants: vec!["alice".to_string(), "bob".to_string()],
            owner_user_id: "alice".to_string(),
        };
        let bytes = frame.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn user_name_update_roundtrip() {
        let frame = Frame::UserNameUpdate {
            table_id: 1,
            user_id: "u2".to_string(),
            old_name: "Jamie".to_string(),
            new_name: "Alex".to_string(),
            rebound: false,
        };
        let bytes = frame.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn truncated_frame_is_an_error_not_a_panic() {
        let frame = Frame::MarkerDelete {
            table_id: 1,
            board_id: 2,
            marker_id: 3,
        };
        let mut bytes = frame.encode();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(Frame::decode(&bytes), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let bytes = vec![250u8, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(Frame::decode(&bytes), Err(CodecError::UnknownKind(250)));
    }

    #[test]
    fn frame_reports_its_table_id() {
        let frame = Frame::MarkerDelete {
            table_id: 77,
            board_id: 1,
            marker_id: 1,
        };
        assert_eq!(frame.table_id(), 77);
    }
}
