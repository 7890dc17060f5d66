//! Bootstrap Orchestrator — the GM-only sequence run against a newly
//! connected peer to bring it up to the table's current state.
//!
//! Order matters: a board must exist before its markers/fog are sent, and
//! image chunks for a board/marker must follow that board/marker's Commit
//! frame (so the receiver already has a `PendingImage` slot to apply them
//! to — see `image_transfer.rs`). Chat groups are sent last, as metadata
//! only; message history never replays to a joining peer.

use crate::codec::{BoardMeta, Frame, ImageOwnerKind, MarkerMeta};
use crate::ids::EntityId;
use crate::image_transfer::{chunk, DEFAULT_CHUNK_SIZE};
use crate::model::GameTable;

/// One step of the bootstrap sequence, in the exact order a GM emits them
/// for a newly joined peer. Rendered as a flat `Vec<Frame>` so callers (the
/// dispatch core) can just iterate and send, pacing image chunks as
/// `image_transfer` prescribes.
pub fn build_sequence(table: &GameTable) -> Vec<Frame> {
    let mut frames = Vec::new();

    frames.push(Frame::SnapshotGameTable {
        table_id: table.table_id,
        name: table.name.clone(),
    });

    let mut board_ids: Vec<EntityId> = table.boards.keys().copied().collect();
    board_ids.sort_unstable();

    for board_id in board_ids {
        let board = &table.boards[&board_id];
        frames.push(Frame::CommitBoard {
            table_id: table.table_id,
            meta: BoardMeta {
                board_id: board.board_id,
                name: board.name.clone(),
                size: board.size,
                grid: board.grid,
                pan: board.pan,
            },
            image_bytes_total: board.image.len() as u64,
        });
        for (i, piece) in chunk(&board.image, DEFAULT_CHUNK_SIZE).into_iter().enumerate() {
            frames.push(Frame::ImageChunk {
                table_id: table.table_id,
                owner_kind: ImageOwnerKind::Board,
                id: board.board_id,
                offset: (i * DEFAULT_CHUNK_SIZE) as u64,
                bytes: piece.to_vec(),
            });
        }

        let mut marker_ids: Vec<EntityId> = board.markers.keys().copied().collect();
        marker_ids.sort_unstable();
        for marker_id in marker_ids {
            let marker = &board.markers[&marker_id];
            frames.push(Frame::CommitMarker {
                table_id: table.table_id,
                board_id: board.board_id,
                meta: MarkerMeta {
                    marker_id: marker.marker_id,
                    pos: marker.pos,
                    size: marker.size,
                    visible: marker.visible,
                    owner_user_id: marker.owner.owner_user_id.clone(),
                    allow_all_players_move: marker.owner.allow_all_players_move,
                    locked: marker.owner.locked,
                },
                image_bytes_total: marker.image.len() as u64,
            });
            for (i, piece) in chunk(&marker.image, DEFAULT_CHUNK_SIZE).into_iter().enumerate() {
                frames.push(Frame::ImageChunk {
                    table_id: table.table_id,
                    owner_kind: ImageOwnerKind::Marker,
                    id: marker.marker_id,
                    offset: (i * DEFAULT_CHUNK_SIZE) as u64,
                    bytes: piece.to_vec(),
                });
            }
        }

        let mut fog_ids: Vec<EntityId> = board.fogs.keys().copied().collect();
        fog_ids.sort_unstable();
        for fog_id in fog_ids {
            let fog = &board.fogs[&fog_id];
            frames.push(Frame::FogCreate {
                table_id: table.table_id,
                board_id: board.board_id,
                fog_id: fog.fog_id,
                pos: fog.pos,
                size: fog.size,
                visible: fog.visible,
            });
        }
    }

    frames
}

/// Chat group metadata only — no message history.
pub fn build_chat_group_frames(
    table_id: EntityId,
    groups: &std::collections::HashMap<EntityId, crate::model::ChatGroup>,
) -> Vec<Frame> {
    let mut ids: Vec<EntityId> = groups.keys().copied().collect();
    ids.sort_unstable();
    ids.into_iter()
        .filter(|id| *id != crate::ids::GENERAL_GROUP_ID)
        .map(|id| {
            let g = &groups[&id];
            Frame::ChatGroupCreate {
                table_id,
                group_id: g.group_id,
                name: g.name.clone(),
                participants: g.participants.iter().cloned().collect(),
                owner_user_id: g.owner_user_id.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Board, Fog, Marker, MarkerOwner, Pos, Size};

    fn table_with_one_board_marker_and_fog() -> GameTable {
        let mut table = GameTable::new(1, "Table");
        let mut board = Board::new(10, "Dungeon", (100, 100));
        board.markers.insert(
            20,
            Marker {
                marker_id: 20,
                board_id: 10,
                pos: Pos::default(),
                size: Size::default(),
                visible: true,
                moving: false,
                owner: MarkerOwner {
                    owner_user_id: "gm".into(),
                    allow_all_players_move: false,
                    locked: false,
                },
                image: Vec::new(),
            },
        );
        board.fogs.insert(
            30,
            Fog {
                fog_id: 30,
                board_id: 10,
                pos: Pos::default(),
                size: Size::default(),
                visible: true,
            },
        );
        table.boards.insert(10, board);
        table
    }

    #[test]
    fn sequence_order_is_snapshot_then_board_then_marker_then_fog() {
        let table = table_with_one_board_marker_and_fog();
        let frames = build_sequence(&table);
        let kinds: Vec<_> = frames.iter().map(|f| f.kind()).collect();
        use crate::codec::FrameKind::*;
        assert_eq!(
            kinds,
            vec![SnapshotGameTable, CommitBoard, CommitMarker, FogCreate]
        );
    }

    #[test]
    fn image_chunks_follow_their_owning_commit_frame() {
        let mut table = table_with_one_board_marker_and_fog();
        table.boards.get_mut(&10).unwrap().image = vec![7u8; DEFAULT_CHUNK_SIZE + 10];
        let frames = build_sequence(&table);
        let commit_idx = frames
            .iter()
            .position(|f| f.kind() == crate::codec::FrameKind::CommitBoard)
            .unwrap();
        assert_eq!(
            frames[commit_idx + 1].kind(),
            crate::codec::FrameKind::ImageChunk
        );
        assert_eq!(
            frames[commit_idx + 2].kind(),
            crate::codec::FrameKind::ImageChunk
        );
    }

    #[test]
    fn chat_groups_carry_no_message_history() {
        let mut groups = std::collections::HashMap::new();
        let mut g = crate::model::ChatGroup::general("gm");
        g.group_id = 5;
        g.participants.insert("alice".to_string());
        g.messages.push_back(crate::model::ChatMessage::new("alice", "Alice", "hi", 0));
        groups.insert(5, g);
        let frames = build_chat_group_frames(1, &groups);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::ChatGroupCreate { .. }));
    }

    #[test]
    fn general_group_is_never_sent_as_a_create_frame() {
        let mut groups = std::collections::HashMap::new();
        let g = crate::model::ChatGroup::general("gm");
        groups.insert(g.group_id, g);
        let frames = build_chat_group_frames(1, &groups);
        assert!(frames.is_empty());
    }
}
