//! Payload masking and mask-key generation (RFC 6455 Section 5.3).

/// Size of the refillable pool of secure random bytes used for mask keys.
///
/// The pool is refilled whole when exhausted, amortizing the cost of the
/// system random source over 2048 keys.
const RANDOM_POOL_SIZE: usize = 8 * 1024;

/// XOR-mask `data` in place against a 4-byte key, byte `i` against
/// `key[i % 4]`. Self-inverse.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    let key_u32 = u32::from_ne_bytes(key);
    let (chunks, tail) = data.split_at_mut(data.len() & !3);

    for chunk in chunks.chunks_exact_mut(4) {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(word ^ key_u32).to_ne_bytes());
    }
    for (i, byte) in tail.iter_mut().enumerate() {
        *byte ^= key[i];
    }
}

/// A freshly drawn mask key together with the transform decision for it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MaskKey {
    /// The 4-byte key, always written into the frame header.
    pub key: [u8; 4],
    /// Whether the XOR transform may be skipped. True only for a pool-drawn
    /// all-zero key, where masking is a no-op.
    pub skip_masking: bool,
}

/// Source of outbound mask keys.
///
/// Holds either a caller-supplied deterministic generator (for reproducible
/// tests) or a pool of cryptographically strong random bytes. One source is
/// owned per sender; it is not shared across connections.
pub struct MaskKeySource {
    generator: Option<Box<dyn FnMut(&mut [u8; 4]) + Send>>,
    pool: Box<[u8; RANDOM_POOL_SIZE]>,
    // Starts exhausted so the pool is only filled on first use.
    pos: usize,
}

impl Default for MaskKeySource {
    fn default() -> Self {
        Self::random()
    }
}

impl std::fmt::Debug for MaskKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskKeySource")
            .field("deterministic", &self.generator.is_some())
            .field("pool_pos", &self.pos)
            .finish()
    }
}

impl MaskKeySource {
    /// Create a source drawing keys from the secure random pool.
    #[must_use]
    pub fn random() -> Self {
        Self {
            generator: None,
            pool: Box::new([0; RANDOM_POOL_SIZE]),
            pos: RANDOM_POOL_SIZE,
        }
    }

    /// Create a source that fills keys with the given generator.
    ///
    /// Generator-produced keys are always applied, even when all-zero.
    #[must_use]
    pub fn with_generator(generator: impl FnMut(&mut [u8; 4]) + Send + 'static) -> Self {
        Self {
            generator: Some(Box::new(generator)),
            pool: Box::new([0; RANDOM_POOL_SIZE]),
            pos: RANDOM_POOL_SIZE,
        }
    }

    /// Draw the next mask key.
    pub(crate) fn next_key(&mut self) -> MaskKey {
        if let Some(generator) = self.generator.as_mut() {
            let mut key = [0; 4];
            generator(&mut key);
            return MaskKey {
                key,
                skip_masking: false,
            };
        }

        if self.pos == RANDOM_POOL_SIZE {
            // Refill the whole pool in one call rather than per key.
            getrandom::getrandom(self.pool.as_mut_slice())
                .expect("system random source unavailable");
            self.pos = 0;
        }

        let key = [
            self.pool[self.pos],
            self.pool[self.pos + 1],
            self.pool[self.pos + 2],
            self.pool[self.pos + 3],
        ];
        self.pos += 4;

        // Masking with an all-zero key is a no-op; skip the transform but
        // still advertise the key on the wire.
        MaskKey {
            key,
            skip_masking: key == [0, 0, 0, 0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_reversible() {
        let key = [0x12, 0x34, 0x56, 0x78];
        let original = b"Hello, WebSocket!".to_vec();
        let mut data = original.clone();

        apply_mask(&mut data, key);
        assert_ne!(data, original);

        apply_mask(&mut data, key);
        assert_eq!(data, original);
    }

    #[test]
    fn test_masking_example_from_rfc() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = b"Hello".to_vec();

        apply_mask(&mut data, key);
        assert_eq!(data, vec![0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_masking_empty_and_short() {
        let key = [0xff, 0x00, 0xff, 0x00];
        let mut empty: Vec<u8> = vec![];
        apply_mask(&mut empty, key);
        assert!(empty.is_empty());

        let mut one = vec![0xaa];
        apply_mask(&mut one, key);
        assert_eq!(one, vec![0x55]);
    }

    #[test]
    fn test_masking_unaligned_lengths() {
        let key = [0x11, 0x22, 0x33, 0x44];
        for len in [1usize, 2, 3, 4, 5, 7, 8, 9, 15, 16, 17, 100] {
            let mut data = vec![0u8; len];
            apply_mask(&mut data, key);
            let expected: Vec<u8> = (0..len).map(|i| key[i % 4]).collect();
            assert_eq!(data, expected, "length {}", len);
        }
    }

    #[test]
    fn test_generator_keys_are_deterministic() {
        let mut source = MaskKeySource::with_generator(|key| *key = [1, 2, 3, 4]);
        let drawn = source.next_key();
        assert_eq!(drawn.key, [1, 2, 3, 4]);
        assert!(!drawn.skip_masking);
    }

    #[test]
    fn test_generator_zero_key_still_masks() {
        let mut source = MaskKeySource::with_generator(|key| *key = [0; 4]);
        let drawn = source.next_key();
        assert_eq!(drawn.key, [0; 4]);
        assert!(!drawn.skip_masking);
    }

    #[test]
    fn test_pool_advances_per_key() {
        let mut source = MaskKeySource::random();
        assert_eq!(source.pos, RANDOM_POOL_SIZE);
        source.next_key();
        assert_eq!(source.pos, 4);
        source.next_key();
        assert_eq!(source.pos, 8);
    }

    #[test]
    fn test_pool_refills_when_exhausted() {
        let mut source = MaskKeySource::random();
        for _ in 0..RANDOM_POOL_SIZE / 4 {
            source.next_key();
        }
        assert_eq!(source.pos, RANDOM_POOL_SIZE);
        source.next_key();
        assert_eq!(source.pos, 4);
    }

    #[test]
    fn test_pool_keys_look_random() {
        let mut source = MaskKeySource::random();
        let keys: Vec<[u8; 4]> = (0..64).map(|_| source.next_key().key).collect();
        // 64 consecutive equal 4-byte keys from a CSPRNG is not credible.
        assert!(keys.windows(2).any(|w| w[0] != w[1]));
    }
}
