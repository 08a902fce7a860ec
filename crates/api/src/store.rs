//! Boundary with local storage.
//!
//! Persistence of artifacts and mesh state is not part of meshsync. The
//! peer-side responder reads from these stores, the fork finder compares
//! remote layer hashes with [MeshStore::layer_hash].

use crate::*;
#[cfg(feature = "mockall")]
use mockall::automock;
use std::sync::Arc;

/// Content addressed artifact storage.
#[cfg_attr(feature = "mockall", automock)]
pub trait ArtifactStore: 'static + Send + Sync + std::fmt::Debug {
    /// Look up an artifact by hint and hash.
    ///
    /// `Ok(None)` means the artifact is not held locally.
    fn lookup(
        &self,
        hint: Hint,
        hash: ContentHash,
    ) -> BoxFut<'_, MsResult<Option<bytes::Bytes>>>;
}

/// Trait object [ArtifactStore].
pub type DynArtifactStore = Arc<dyn ArtifactStore>;

/// Local mesh state.
#[cfg_attr(feature = "mockall", automock)]
pub trait MeshStore: 'static + Send + Sync + std::fmt::Debug {
    /// The aggregated hash of a layer, if the layer is known.
    fn layer_hash(
        &self,
        layer: LayerId,
    ) -> BoxFut<'_, MsResult<Option<ContentHash>>>;

    /// All activation ids targeting an epoch.
    fn epoch_atxs(&self, epoch: EpochId) -> BoxFut<'_, MsResult<Vec<AtxId>>>;

    /// All ballot ids of a layer.
    fn layer_ballots(
        &self,
        layer: LayerId,
    ) -> BoxFut<'_, MsResult<Vec<BallotId>>>;

    /// All identities known to be malicious.
    fn malicious_ids(&self) -> BoxFut<'_, MsResult<Vec<NodeId>>>;

    /// The local opinion on a layer, if there is one.
    fn layer_opinion(
        &self,
        request: OpinionRequest,
    ) -> BoxFut<'_, MsResult<Option<LayerOpinion>>>;
}

/// Trait object [MeshStore].
pub type DynMeshStore = Arc<dyn MeshStore>;

/// Integrity check of fetched artifact data against the hash it was
/// requested by.
#[cfg_attr(feature = "mockall", automock)]
pub trait ArtifactVerifier: 'static + Send + Sync + std::fmt::Debug {
    /// Return true if `data` is the artifact identified by `hash`.
    fn verify(&self, hint: Hint, hash: &ContentHash, data: &[u8]) -> bool;
}

/// Trait object [ArtifactVerifier].
pub type DynArtifactVerifier = Arc<dyn ArtifactVerifier>;

/// The default [ArtifactVerifier]: the hash must be the SHA-256 of the data.
#[derive(Debug)]
pub struct DigestVerifier;

impl ArtifactVerifier for DigestVerifier {
    fn verify(&self, _hint: Hint, hash: &ContentHash, data: &[u8]) -> bool {
        ContentHash::digest(data) == *hash
    }
}
