//! Buffer sizing and decode limits.

/// Tunables for encoding buffers and decode-side bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecLimits {
    /// Initial capacity of the encoder's output buffer.
    pub initial_buffer_bytes: usize,
    /// Growth granularity when an encode overflows the buffer.
    pub buffer_chunk_bytes: usize,
    /// Maximum byte length of a decoded string.
    pub max_string_bytes: usize,
    /// Maximum collection slot index accepted by the decoder.
    pub max_collection_index: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            initial_buffer_bytes: 8 * 1024,
            buffer_chunk_bytes: 8 * 1024,
            max_string_bytes: 64 * 1024,
            max_collection_index: 65_536,
        }
    }
}

impl CodecLimits {
    /// Creates limits with tiny buffers so ordinary tests exercise growth.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            initial_buffer_bytes: 16,
            buffer_chunk_bytes: 32,
            max_string_bytes: 1024,
            max_collection_index: 1024,
        }
    }

    /// Creates limits with no decode restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            initial_buffer_bytes: 8 * 1024,
            buffer_chunk_bytes: 8 * 1024,
            max_string_bytes: usize::MAX,
            max_collection_index: usize::MAX,
        }
    }

    /// Returns the smallest multiple of the growth chunk that holds `needed` bytes.
    #[must_use]
    pub const fn grown_capacity(&self, needed: usize) -> usize {
        let chunk = if self.buffer_chunk_bytes == 0 {
            1
        } else {
            self.buffer_chunk_bytes
        };
        needed.div_ceil(chunk).saturating_mul(chunk)
    }
}
