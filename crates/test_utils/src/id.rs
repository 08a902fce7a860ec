//! Test utilities associated with ids.

use meshsync_api::*;
use rand::Rng;

fn random_id() -> [u8; ID_LEN] {
    let mut out = [0u8; ID_LEN];
    rand::thread_rng().fill(&mut out);
    out
}

/// Create a random content hash.
pub fn random_hash() -> ContentHash {
    ContentHash(random_id())
}

/// Create a random peer id.
pub fn random_peer_id() -> PeerId {
    PeerId(random_id())
}

/// Create a random node id.
pub fn random_node_id() -> NodeId {
    NodeId(random_id())
}

/// Create a random artifact and its content hash.
pub fn random_artifact() -> (ContentHash, bytes::Bytes) {
    let data = bytes::Bytes::from(crate::random_bytes(64));
    (ContentHash::digest(&data), data)
}
