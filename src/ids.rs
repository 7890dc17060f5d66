//! 64-bit entity identifiers.
//!
//! Every table-scoped entity (board, marker, fog, chat group) is named by a
//! `u64` made of a random high half chosen once per process and a monotonic
//! low half. Two peers minting ids concurrently only collide if they share
//! both the same 32-bit random prefix and the same counter value — cheap
//! insurance without any cross-peer coordination.

use std::sync::atomic::{AtomicU32, Ordering};

pub type EntityId = u64;

/// Mints entity ids for one process's lifetime.
///
/// `high` is chosen once (at table-open) and stays fixed; `low` increments
/// for every id minted. `Self` is intentionally `Clone`-free — a process
/// has exactly one table open at a time, so one minter is shared by
/// reference.
pub struct IdMinter {
    high: u32,
    low: AtomicU32,
}

impl IdMinter {
    /// Create a minter with a fresh random high half.
    pub fn new() -> Self {
        Self {
            high: rand::random(),
            low: AtomicU32::new(0),
        }
    }

    /// Create a minter with an explicit high half — used by tests that need
    /// deterministic ids.
    pub fn with_high(high: u32) -> Self {
        Self {
            high,
            low: AtomicU32::new(0),
        }
    }

    /// Mint the next id. Never returns 0 (low starts at 0 but the first
    /// mint bumps it to 1 before combining, so id 0 is never handed out and
    /// can be reserved as a sentinel by callers, as `ChatGroup` id 1 is
    /// reserved for General).
    pub fn mint(&self) -> EntityId {
        let low = self.low.fetch_add(1, Ordering::Relaxed) + 1;
        ((self.high as u64) << 32) | (low as u64)
    }
}

impl Default for IdMinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reserved id for the always-present "General" chat group.
pub const GENERAL_GROUP_ID: EntityId = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_is_monotonic_within_a_minter() {
        let minter = IdMinter::with_high(0xAAAA_BBBB);
        let a = minter.mint();
        let b = minter.mint();
        assert!(b > a);
        assert_eq!(a >> 32, 0xAAAA_BBBB);
        assert_eq!(b >> 32, 0xAAAA_BBBB);
    }

    #[test]
    fn different_minters_rarely_collide() {
        let a = IdMinter::with_high(1);
        let b = IdMinter::with_high(2);
        assert_ne!(a.mint(), b.mint());
    }

    #[test]
    fn mint_never_yields_zero() {
        let minter = IdMinter::with_high(0);
        assert_ne!(minter.mint(), 0);
    }
}
