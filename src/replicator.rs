//! State Replicator — applies inbound wire frames to the `GameTable` model,
//! enforcing per-op sender authority.
//!
//! Create and Delete ops are idempotent: creating an id that already
//! exists overwrites it in place, deleting an id that doesn't exist is a
//! no-op. An Update for an id the receiver has never seen is dropped —
//! there is nothing to update, and fabricating a partial record from an
//! Update would leave a marker/fog/board with undefined fields.

use crate::codec::{Frame, SenderRole};
use crate::ids::EntityId;
use crate::model::{Board, Fog, GameTable, Grid, Marker, MarkerOwner, Pos, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatorOutcome {
    Applied,
    /// Dropped because the sender lacked authority for this op (a GM-only
    /// op from a non-GM sender, or a marker move that fails `can_move`).
    Unauthorized,
    /// Dropped because an Update/Delete named an id that doesn't exist.
    UnknownTarget,
    /// This frame doesn't belong to the table this replicator owns.
    WrongTable,
}

pub struct Replicator<'a> {
    pub table: &'a mut GameTable,
}

impl<'a> Replicator<'a> {
    pub fn new(table: &'a mut GameTable) -> Self {
        Self { table }
    }

    /// Apply one frame. `sender_role` and `sender_user_id` identify who
    /// sent it, for the authority checks below.
    pub fn apply(
        &mut self,
        frame: &Frame,
        sender_role: Role,
        sender_user_id: &str,
    ) -> ReplicatorOutcome {
        if frame.table_id() != self.table.table_id {
            return ReplicatorOutcome::WrongTable;
        }
        match frame {
            Frame::CommitBoard { meta, .. } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                let board = self
                    .table
                    .boards
                    .entry(meta.board_id)
                    .or_insert_with(|| Board::new(meta.board_id, meta.name.clone(), meta.size));
                board.name = meta.name.clone();
                board.size = meta.size;
                board.grid = meta.grid;
                board.pan = meta.pan;
                ReplicatorOutcome::Applied
            }
            Frame::CommitMarker { board_id, meta, .. } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                let Some(board) = self.table.boards.get_mut(board_id) else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                board.markers.insert(
                    meta.marker_id,
                    Marker {
                        marker_id: meta.marker_id,
                        board_id: *board_id,
                        pos: meta.pos,
                        size: meta.size,
                        visible: meta.visible,
                        moving: false,
                        owner: MarkerOwner {
                            owner_user_id: meta.owner_user_id.clone(),
                            allow_all_players_move: meta.allow_all_players_move,
                            locked: meta.locked,
                        },
                        image: Vec::new(),
                    },
                );
                ReplicatorOutcome::Applied
            }
            Frame::MarkerMove {
                board_id,
                marker_id,
                pos,
                ..
            } => self.apply_marker_move(*board_id, *marker_id, *pos, sender_role, sender_user_id),
            Frame::MarkerMoveState {
                board_id,
                marker_id,
                final_pos,
                moving,
                ..
            } => {
                let Some(marker) = self.table.marker_mut(*board_id, *marker_id) else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                if !marker.can_move(sender_user_id, sender_role) {
                    return ReplicatorOutcome::Unauthorized;
                }
                marker.moving = matches!(moving, crate::codec::Moving::Start);
                if let Some(p) = final_pos {
                    marker.pos = *p;
                }
                ReplicatorOutcome::Applied
            }
            Frame::MarkerUpdate {
                board_id,
                marker_id,
                size,
                visible,
                owner,
                ..
            } => {
                let Some(marker) = self.table.marker_mut(*board_id, *marker_id) else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                // Attribute changes (ownership/lock) are GM-only; position
                // is handled by MarkerMove/MarkerMoveState, not here.
                if owner.is_some() && !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                if let Some(s) = size {
                    marker.size = *s;
                }
                if let Some(v) = visible {
                    marker.visible = *v;
                }
                if let Some((owner_user_id, allow_all, locked)) = owner {
                    marker.owner.owner_user_id = owner_user_id.clone();
                    marker.owner.allow_all_players_move = *allow_all;
                    marker.owner.locked = *locked;
                }
                ReplicatorOutcome::Applied
            }
            Frame::MarkerDelete {
                board_id,
                marker_id,
                ..
            } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                let Some(board) = self.table.boards.get_mut(board_id) else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                board.markers.remove(marker_id);
                ReplicatorOutcome::Applied
            }
            Frame::FogCreate {
                board_id,
                fog_id,
                pos,
                size,
                visible,
                ..
            } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                let Some(board) = self.table.boards.get_mut(board_id) else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                board.fogs.insert(
                    *fog_id,
                    Fog {
                        fog_id: *fog_id,
                        board_id: *board_id,
                        pos: *pos,
                        size: *size,
                        visible: *visible,
                    },
                );
                ReplicatorOutcome::Applied
            }
            Frame::FogUpdate {
                board_id,
                fog_id,
                pos,
                size,
                visible,
                ..
            } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                let Some(fog) = self
                    .table
                    .boards
                    .get_mut(board_id)
                    .and_then(|b| b.fogs.get_mut(fog_id))
                else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                if let Some(p) = pos {
                    fog.pos = *p;
                }
                if let Some(s) = size {
                    fog.size = *s;
                }
                if let Some(v) = visible {
                    fog.visible = *v;
                }
                ReplicatorOutcome::Applied
            }
            Frame::FogDelete { board_id, fog_id, .. } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                let Some(board) = self.table.boards.get_mut(board_id) else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                board.fogs.remove(fog_id);
                ReplicatorOutcome::Applied
            }
            Frame::GridUpdate { board_id, grid, .. } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                let Some(board) = self.table.boards.get_mut(board_id) else {
                    return ReplicatorOutcome::UnknownTarget;
                };
                board.grid = *grid;
                ReplicatorOutcome::Applied
            }
            Frame::SnapshotGameTable { name, .. } => {
                if !sender_role.is_gm() {
                    return ReplicatorOutcome::Unauthorized;
                }
                self.table.name = name.clone();
                ReplicatorOutcome::Applied
            }
            // Chat and identity frames are handled by chat.rs/identity.rs,
            // not the world-model replicator.
            Frame::ChatGroupCreate { .. }
            | Frame::ChatGroupUpdate { .. }
            | Frame::ChatGroupDelete { .. }
            | Frame::ChatMessage { .. }
            | Frame::UserNameUpdate { .. }
            | Frame::ImageChunk { .. } => ReplicatorOutcome::Applied,
        }
    }

    fn apply_marker_move(
        &mut self,
        board_id: EntityId,
        marker_id: EntityId,
        pos: Pos,
        sender_role: Role,
        sender_user_id: &str,
    ) -> ReplicatorOutcome {
        let Some(marker) = self.table.marker_mut(board_id, marker_id) else {
            return ReplicatorOutcome::UnknownTarget;
        };
        if !marker.can_move(sender_user_id, sender_role) {
            return ReplicatorOutcome::Unauthorized;
        }
        marker.pos = pos;
        marker.moving = true;
        ReplicatorOutcome::Applied
    }
}

pub fn sender_role_from_wire(role: SenderRole) -> Role {
    match role {
        SenderRole::GameMaster => Role::GameMaster,
        SenderRole::Player => Role::Player,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BoardMeta;
    use crate::model::{PanState, Size};

    fn table_with_board() -> GameTable {
        let mut table = GameTable::new(1, "Test Table");
        table.boards.insert(10, Board::new(10, "Dungeon", (100, 100)));
        table
    }

    #[test]
    fn commit_board_is_gm_only() {
        let mut table = GameTable::new(1, "Test Table");
        let frame = Frame::CommitBoard {
            table_id: 1,
            meta: BoardMeta {
                board_id: 10,
                name: "Dungeon".into(),
                size: (100, 100),
                grid: Grid::default(),
                pan: PanState::default(),
            },
            image_bytes_total: 0,
        };
        let outcome = Replicator::new(&mut table).apply(&frame, Role::Player, "alice");
        assert_eq!(outcome, ReplicatorOutcome::Unauthorized);
        assert!(table.boards.is_empty());
    }

    #[test]
    fn commit_board_is_idempotent() {
        let mut table = GameTable::new(1, "Test Table");
        let meta = BoardMeta {
            board_id: 10,
            name: "Dungeon".into(),
            size: (100, 100),
            grid: Grid::default(),
            pan: PanState::default(),
        };
        let frame = Frame::CommitBoard {
            table_id: 1,
            meta: meta.clone(),
            image_bytes_total: 0,
        };
        let mut repl = Replicator::new(&mut table);
        assert_eq!(repl.apply(&frame, Role::GameMaster, "gm"), ReplicatorOutcome::Applied);
        assert_eq!(repl.apply(&frame, Role::GameMaster, "gm"), ReplicatorOutcome::Applied);
        assert_eq!(table.boards.len(), 1);
    }

    #[test]
    fn marker_update_on_unknown_id_is_dropped() {
        let mut table = table_with_board();
        let frame = Frame::MarkerDelete {
            table_id: 1,
            board_id: 10,
            marker_id: 999,
        };
        let outcome = Replicator::new(&mut table).apply(&frame, Role::GameMaster, "gm");
        assert_eq!(outcome, ReplicatorOutcome::UnknownTarget);
    }

    #[test]
    fn marker_delete_is_idempotent() {
        let mut table = table_with_board();
        table.boards.get_mut(&10).unwrap().markers.insert(
            1,
            Marker {
                marker_id: 1,
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
        let frame = Frame::MarkerDelete {
            table_id: 1,
            board_id: 10,
            marker_id: 1,
        };
        let mut repl = Replicator::new(&mut table);
        assert_eq!(repl.apply(&frame, Role::GameMaster, "gm"), ReplicatorOutcome::Applied);
        assert_eq!(repl.apply(&frame, Role::GameMaster, "gm"), ReplicatorOutcome::Applied);
        assert!(!table.boards.get(&10).unwrap().markers.contains_key(&1));
    }

    #[test]
    fn marker_move_rejects_non_owner_locked_marker() {
        let mut table = table_with_board();
        table.boards.get_mut(&10).unwrap().markers.insert(
            1,
            Marker {
                marker_id: 1,
                board_id: 10,
                pos: Pos::default(),
                size: Size::default(),
                visible: true,
                moving: false,
                owner: MarkerOwner {
                    owner_user_id: "alice".into(),
                    allow_all_players_move: false,
                    locked: true,
                },
                image: Vec::new(),
            },
        );
        let frame = Frame::MarkerMove {
            table_id: 1,
            board_id: 10,
            marker_id: 1,
            pos: Pos { x: 1.0, y: 1.0 },
            epoch: 1,
            seq: 1,
            ts: 0,
            sender_role: SenderRole::Player,
        };
        let outcome = Replicator::new(&mut table).apply(&frame, Role::Player, "alice");
        assert_eq!(outcome, ReplicatorOutcome::Unauthorized);
    }

    #[test]
    fn gm_can_move_any_marker_even_locked() {
        let mut table = table_with_board();
        table.boards.get_mut(&10).unwrap().markers.insert(
            1,
            Marker {
                marker_id: 1,
                board_id: 10,
                pos: Pos::default(),
                size: Size::default(),
                visible: true,
                moving: false,
                owner: MarkerOwner {
                    owner_user_id: "alice".into(),
                    allow_all_players_move: false,
                    locked: true,
                },
                image: Vec::new(),
            },
        );
        let frame = Frame::MarkerMove {
            table_id: 1,
            board_id: 10,
            marker_id: 1,
            pos: Pos { x: 1.0, y: 1.0 },
            epoch: 1,
            seq: 1,
            ts: 0,
            sender_role: SenderRole::GameMaster,
        };
        let outcome = Replicator::new(&mut table).apply(&frame, Role::GameMaster, "gm");
        assert_eq!(outcome, ReplicatorOutcome::Applied);
    }
}
