//! Hash providers.
//!
//! A hash provider turns arbitrary bytes into a 32-bit value. The same
//! provider positions members on the wheel and maps keys to segments, so it
//! must be identical on every member of a cluster: implementations carry no
//! per-process seed.

pub mod blake;
pub mod sip;
pub mod xxh3;

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use blake::Blake3Hash;
pub use sip::Sip13Hash;
pub use xxh3::Xxh3Hash;

/// Deterministic 32-bit hash of key bytes.
///
/// Implementations are stateless and thread-safe, allowing concurrent
/// hashing without synchronization.
pub trait HashFunction: Send + Sync + Debug + 'static {
    /// Hash `bytes` to a 32-bit value.
    fn hash(&self, bytes: &[u8]) -> u32;

    /// Returns the name of this hash function.
    fn name(&self) -> &'static str;
}

/// Fold a 64-bit digest into 32 bits without discarding the high half.
#[inline]
pub(crate) fn fold64(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

/// Configurable choice of hash provider.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashKind {
    #[default]
    Sip13,
    Xxh3,
    Blake3,
}

impl HashKind {
    pub fn build(self) -> Arc<dyn HashFunction> {
        match self {
            HashKind::Sip13 => Arc::new(Sip13Hash),
            HashKind::Xxh3 => Arc::new(Xxh3Hash),
            HashKind::Blake3 => Arc::new(Blake3Hash),
        }
    }
}

impl std::str::FromStr for HashKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "sip13" => Ok(HashKind::Sip13),
            "xxh3" => Ok(HashKind::Xxh3),
            "blake3" => Ok(HashKind::Blake3),
            other => Err(crate::Error::config(format!("unknown hash function {other:?}"))),
        }
    }
}
