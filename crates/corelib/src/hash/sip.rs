//! SipHash-1-3 provider with fixed zero keys.

use siphasher::sip::SipHasher13;
use std::hash::Hasher;

use super::{fold64, HashFunction};

/// SipHash-1-3, the default provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sip13Hash;

impl HashFunction for Sip13Hash {
    fn hash(&self, bytes: &[u8]) -> u32 {
        let mut hasher = SipHasher13::new();
        hasher.write(bytes);
        fold64(hasher.finish())
    }

    fn name(&self) -> &'static str {
        "sip13"
    }
}
