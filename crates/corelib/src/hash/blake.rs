//! BLAKE3 provider, truncated to the first four digest bytes.

use super::HashFunction;

#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hash;

impl HashFunction for Blake3Hash {
    fn hash(&self, bytes: &[u8]) -> u32 {
        let digest = blake3::hash(bytes);
        let mut word = [0u8; 4];
        word.copy_from_slice(&digest.as_bytes()[..4]);
        u32::from_le_bytes(word)
    }

    fn name(&self) -> &'static str {
        "blake3"
    }
}
