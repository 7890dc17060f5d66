//! Runic sync core — peer-to-peer virtual tabletop synchronization.
//!
//! This crate owns the wire protocol, the signaling/peer-connection layer,
//! and the world-model replication logic a VTT client needs to keep boards,
//! markers, fog, grid, and chat in sync across a group of directly
//! connected peers. Rendering, asset storage, and local persistence are
//! deliberately out of scope — callers own those and hand this crate
//! decoded frames and model mutations to apply.

pub mod bootstrap;
pub mod chat;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod drag;
pub mod identity;
pub mod ids;
pub mod image_transfer;
pub mod model;
pub mod peer_link;
pub mod replicator;
pub mod signaling;
