//! Shared-payload handle for `EncodedVideoChunk`/`EncodedAudioChunk` (the
//! ChunkResource model). Unlike `MediaResource`, a chunk's payload is immutable
//! for its whole lifetime and `close` is a no-op kept only for API symmetry, so
//! there is no independent closed flag to manage — cloning is just an `Arc` bump.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    Key,
    Delta,
}

/// Immutable `{type, timestamp, duration, payload}` per §3.3.
///
/// Generic over the payload representation `D` so a caller needing a zero-copy
/// backend type alongside plain bytes (e.g. an FFmpeg packet for muxing) can
/// still share the ChunkResource shape instead of re-deriving it.
#[derive(Clone)]
pub struct ChunkHandle<D> {
    pub chunk_type: ChunkType,
    pub timestamp_us: i64,
    pub duration_us: Option<i64>,
    data: Arc<D>,
}

impl<D> ChunkHandle<D> {
    pub fn new(chunk_type: ChunkType, timestamp_us: i64, duration_us: Option<i64>, data: D) -> Self {
        Self {
            chunk_type,
            timestamp_us,
            duration_us,
            data: Arc::new(data),
        }
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_arc(&self) -> &Arc<D> {
        &self.data
    }
}

impl<D: AsRef<[u8]>> ChunkHandle<D> {
    pub fn byte_length(&self) -> usize {
        self.data.as_ref().as_ref().len()
    }

    /// Copy the payload into a caller-owned buffer. Fails if `dest` is smaller
    /// than `byteLength`.
    pub fn copy_to(&self, dest: &mut [u8]) -> Result<(), ChunkCopyError> {
        let bytes = self.data.as_ref().as_ref();
        if dest.len() < bytes.len() {
            return Err(ChunkCopyError::DestinationTooSmall {
                needed: bytes.len(),
                got: dest.len(),
            });
        }
        dest[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkCopyError {
    DestinationTooSmall { needed: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_to_rejects_undersized_destination() {
        let chunk = ChunkHandle::new(ChunkType::Key, 0, None, vec![1, 2, 3, 4]);
        let mut dest = [0u8; 2];
        assert!(chunk.copy_to(&mut dest).is_err());
    }

    #[test]
    fn copy_to_copies_full_payload() {
        let chunk = ChunkHandle::new(ChunkType::Delta, 1_000, Some(500), vec![9, 8, 7]);
        let mut dest = [0u8; 3];
        chunk.copy_to(&mut dest).unwrap();
        assert_eq!(dest, [9, 8, 7]);
    }

    #[test]
    fn clone_shares_payload_arc() {
        let chunk = ChunkHandle::new(ChunkType::Key, 0, None, vec![1]);
        let clone = chunk.clone();
        assert_eq!(chunk.data(), clone.data());
    }
}
