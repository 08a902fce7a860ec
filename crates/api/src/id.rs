//! Types dealing with data identity or hashing.

use crate::*;

/// Byte length of every identifier in the mesh.
pub const ID_LEN: usize = 32;

macro_rules! imp_deref {
    ($i:ty, $t:ty) => {
        impl std::ops::Deref for $i {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

macro_rules! imp_from {
    ($a:ty, $b:ty, $i:ident => $e:expr) => {
        impl From<$b> for $a {
            fn from($i: $b) -> Self {
                $e
            }
        }
    };
}

/// Defines a 32 byte identifier newtype.
macro_rules! imp_id {
    ($(#[$meta:meta])* $name:ident, $disp:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; ID_LEN]);

        imp_deref!($name, [u8; ID_LEN]);
        imp_from!($name, [u8; ID_LEN], b => $name(b));

        impl $name {
            /// Parse a wire field, which must be exactly [ID_LEN] bytes.
            pub fn from_wire(field: &'static str, b: &[u8]) -> MsResult<Self> {
                let inner: [u8; ID_LEN] = b.try_into().map_err(|_| {
                    MsError::bad_request(Violation::InvalidLength {
                        field,
                        expected: ID_LEN,
                        observed: b.len(),
                    })
                })?;
                Ok(Self(inner))
            }

            /// The wire representation of this id.
            pub fn to_bytes(&self) -> bytes::Bytes {
                bytes::Bytes::copy_from_slice(&self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $disp(&self.0, f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $disp(&self.0, f)
            }
        }
    };
}

// Hashes are printed as a short hex prefix, which is what shows up in logs
// of every other node implementation as well.
fn hex_short(b: &[u8; ID_LEN], f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    for byte in &b[..5] {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

// Peer and node identities are public keys, encoded as base64.
// This makes debugging so much easier than rust's default of decimal array.
fn base64_full(b: &[u8; ID_LEN], f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use base64::prelude::*;
    f.write_str(&BASE64_URL_SAFE_NO_PAD.encode(b))
}

imp_id!(
    /// Content-addressing identifier of an artifact.
    ///
    /// Equal hashes denote equal content.
    ContentHash,
    hex_short
);

imp_id!(
    /// Identifies a remote peer on the network.
    PeerId,
    base64_full
);

imp_id!(
    /// Identifies a node (smeshing identity).
    NodeId,
    base64_full
);

imp_id!(
    /// Identifies an activation record.
    AtxId,
    hex_short
);

imp_id!(
    /// Identifies a ballot.
    BallotId,
    hex_short
);

imp_id!(
    /// Identifies a block.
    BlockId,
    hex_short
);

impl ContentHash {
    /// Compute the content hash (SHA-256) of some data.
    pub fn digest(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        Self(Sha256::digest(data).into())
    }
}

/// A discrete, monotonically increasing round of the ledger.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct LayerId(pub u32);

imp_from!(LayerId, u32, l => LayerId(l));

impl LayerId {
    /// The number of layers from `other` up to `self`.
    /// Zero if `other` is not before `self`.
    pub fn difference(&self, other: LayerId) -> u32 {
        self.0.saturating_sub(other.0)
    }

    /// The layer `n` layers after this one, saturating at the last layer.
    pub fn plus(&self, n: u32) -> LayerId {
        LayerId(self.0.saturating_add(n))
    }

    /// The previous layer, if any.
    pub fn prev(&self) -> Option<LayerId> {
        self.0.checked_sub(1).map(LayerId)
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

/// A group of consecutive layers.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct EpochId(pub u32);

imp_from!(EpochId, u32, e => EpochId(e));

impl std::fmt::Display for EpochId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for EpochId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EpochId({})", self.0)
    }
}
