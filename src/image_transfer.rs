//! Image Transfer — chunked send/receive of board and marker images over
//! the `game` data channel.
//!
//! A sender slices an image into fixed-size chunks and yields periodically
//! so a large image never starves other traffic on the same channel. A
//! receiver accumulates chunks keyed by `(owner kind, id)` and is complete
//! only once every byte has arrived *and* a `Commit*` frame has been seen —
//! receiving all bytes before the commit frame (network reordering) must
//! not be mistaken for completion.

use std::collections::HashMap;

use crate::codec::ImageOwnerKind;
use crate::ids::EntityId;

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
/// Yield to the executor every this many chunks sent, so a large image
/// transfer doesn't monopolize the task.
pub const YIELD_EVERY_CHUNKS: usize = 48;

/// Split `data` into `chunk_size`-sized pieces, in order. The caller is
/// responsible for pacing (yielding) between sends — this just does the
/// slicing.
pub fn chunk(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }
    data.chunks(chunk_size).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub owner_kind: ImageOwnerKind,
    pub id: EntityId,
}

/// One in-flight inbound image transfer.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub total_bytes: u64,
    pub received_bytes: u64,
    pub buffer: Vec<u8>,
    /// Set once the corresponding `CommitBoard`/`CommitMarker` frame has
    /// been seen. Completion requires both this and all bytes received.
    pub commit_requested: bool,
}

impl PendingImage {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            received_bytes: 0,
            buffer: vec![0u8; total_bytes as usize],
            commit_requested: false,
        }
    }

    /// Apply one chunk at `offset`. Out-of-range or overlapping-the-end
    /// chunks are rejected rather than panicking on a bad peer.
    pub fn apply_chunk(&mut self, offset: u64, bytes: &[u8]) -> Result<(), ImageTransferError> {
        let end = offset
            .checked_add(bytes.len() as u64)
            .ok_or(ImageTransferError::OffsetOverflow)?;
        if end > self.total_bytes {
            return Err(ImageTransferError::ChunkOutOfRange);
        }
        let start = offset as usize;
        self.buffer[start..end as usize].copy_from_slice(bytes);
        self.received_bytes += bytes.len() as u64;
        Ok(())
    }

    pub fn mark_commit_requested(&mut self) {
        self.commit_requested = true;
    }

    /// Complete iff every byte has arrived *and* the commit frame was seen,
    /// and the image is non-empty — an image with `total_bytes == 0` is
    /// never considered "complete" by this rule, since it's never created
    /// with a commit in the first place.
    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.received_bytes == self.total_bytes && self.commit_requested
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTransferError {
    OffsetOverflow,
    ChunkOutOfRange,
}

impl std::fmt::Display for ImageTransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageTransferError::OffsetOverflow => write!(f, "chunk offset overflowed"),
            ImageTransferError::ChunkOutOfRange => write!(f, "chunk extends past declared total"),
        }
    }
}

impl std::error::Error for ImageTransferError {}

/// Tracks every in-flight inbound transfer for one peer link.
pub struct ImageReceiver {
    pending: HashMap<ImageKey, PendingImage>,
}

impl ImageReceiver {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    pub fn begin(&mut self, key: ImageKey, total_bytes: u64) {
        self.pending.insert(key, PendingImage::new(total_bytes));
    }

    pub fn mark_commit_requested(&mut self, key: &ImageKey) {
        if let Some(p) = self.pending.get_mut(key) {
            p.mark_commit_requested();
        }
    }

    pub fn on_chunk(
        &mut self,
        key: &ImageKey,
        offset: u64,
        bytes: &[u8],
    ) -> Result<bool, ImageTransferError> {
        let Some(p) = self.pending.get_mut(key) else {
            // Chunk for an image we never started (or already finished);
            // drop silently rather than erroring the whole link.
            return Ok(false);
        };
        p.apply_chunk(offset, bytes)?;
        Ok(p.is_complete())
    }

    /// Remove and return a completed transfer's bytes.
    pub fn take_completed(&mut self, key: &ImageKey) -> Option<Vec<u8>> {
        let p = self.pending.get(key)?;
        if !p.is_complete() {
            return None;
        }
        self.pending.remove(key).map(|p| p.buffer)
    }
}

impl Default for ImageReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_splits_into_expected_sizes() {
        let data = vec![0u8; 20_000];
        let chunks = chunk(&data, DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks[2].len(), 20_000 - 2 * DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn empty_data_chunks_to_nothing() {
        assert!(chunk(&[], DEFAULT_CHUNK_SIZE).is_empty());
    }

    #[test]
    fn completion_requires_both_all_bytes_and_commit_frame() {
        let mut img = PendingImage::new(10);
        img.apply_chunk(0, &[0u8; 10]).unwrap();
        assert!(!img.is_complete(), "bytes alone aren't enough");
        img.mark_commit_requested();
        assert!(img.is_complete());
    }

    #[test]
    fn commit_before_bytes_also_waits_for_bytes() {
        let mut img = PendingImage::new(10);
        img.mark_commit_requested();
        assert!(!img.is_complete());
        img.apply_chunk(0, &[0u8; 10]).unwrap();
        assert!(img.is_complete());
    }

    #[test]
    fn zero_length_image_never_completes() {
        let mut img = PendingImage::new(0);
        img.mark_commit_requested();
        assert!(!img.is_complete());
    }

    #[test]
    fn chunk_past_declared_total_is_rejected() {
        let mut img = PendingImage::new(4);
        assert_eq!(
            img.apply_chunk(2, &[0u8; 4]),
            Err(ImageTransferError::ChunkOutOfRange)
        );
    }

    #[test]
    fn receiver_ignores_chunk_for_unknown_image() {
        let mut recv = ImageReceiver::new();
        let key = ImageKey {
            owner_kind: ImageOwnerKind::Board,
            id: 1,
        };
        assert_eq!(recv.on_chunk(&key, 0, &[1, 2, 3]), Ok(false));
    }

    #[test]
    fn receiver_full_flow_completes_and_yields_bytes() {
        let mut recv = ImageReceiver::new();
        let key = ImageKey {
            owner_kind: ImageOwnerKind::Marker,
            id: 7,
        };
        recv.begin(key.clone(), 6);
        recv.mark_commit_requested(&key);
        assert_eq!(recv.on_chunk(&key, 0, &[1, 2, 3]).unwrap(), false);
        assert_eq!(recv.on_chunk(&key, 3, &[4, 5, 6]).unwrap(), true);
        assert_eq!(recv.take_completed(&key), Some(vec![1, 2, 3, 4, 5, 6]));
    }
}
