//! XXH3 provider.

use xxhash_rust::xxh3::xxh3_64;

use super::{fold64, HashFunction};

#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3Hash;

impl HashFunction for Xxh3Hash {
    fn hash(&self, bytes: &[u8]) -> u32 {
        fold64(xxh3_64(bytes))
    }

    fn name(&self) -> &'static str {
        "xxh3"
    }
}
