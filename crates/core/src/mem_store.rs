//! In-memory store implementations.
//!
//! These are NOT production modules, they hold everything in memory and
//! are meant for testing and for wiring up example nodes.

use bytes::Bytes;
use meshsync_api::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// An in-memory [ArtifactStore].
#[derive(Debug, Default)]
pub struct MemArtifactStore(Mutex<HashMap<(Hint, ContentHash), Bytes>>);

impl MemArtifactStore {
    /// Construct a new, empty MemArtifactStore.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store an artifact under its content hash.
    pub fn insert(&self, hint: Hint, data: Bytes) -> ContentHash {
        let hash = ContentHash::digest(&data);
        self.insert_unchecked(hint, hash, data);
        hash
    }

    /// Store data under an arbitrary hash, which lets tests play a peer
    /// serving bad data.
    pub fn insert_unchecked(&self, hint: Hint, hash: ContentHash, data: Bytes) {
        self.0.lock().unwrap().insert((hint, hash), data);
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemArtifactStore {
    fn lookup(
        &self,
        hint: Hint,
        hash: ContentHash,
    ) -> BoxFut<'_, MsResult<Option<Bytes>>> {
        let out = self.0.lock().unwrap().get(&(hint, hash)).cloned();
        Box::pin(async move { Ok(out) })
    }
}

#[derive(Debug, Default)]
struct MeshState {
    layer_hashes: BTreeMap<LayerId, ContentHash>,
    epoch_atxs: HashMap<EpochId, Vec<AtxId>>,
    layer_ballots: HashMap<LayerId, Vec<BallotId>>,
    malicious: HashSet<NodeId>,
    opinions: HashMap<LayerId, LayerOpinion>,
}

/// An in-memory [MeshStore].
#[derive(Debug, Default)]
pub struct MemMeshStore(Mutex<MeshState>);

impl MemMeshStore {
    /// Construct a new, empty MemMeshStore.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set the aggregated hash of a layer.
    pub fn set_layer_hash(&self, layer: LayerId, hash: ContentHash) {
        self.0.lock().unwrap().layer_hashes.insert(layer, hash);
    }

    /// Set the aggregated hashes of consecutive layers starting at `from`.
    pub fn set_layer_hashes(&self, from: LayerId, hashes: &[ContentHash]) {
        let mut lock = self.0.lock().unwrap();
        for (i, hash) in hashes.iter().enumerate() {
            lock.layer_hashes.insert(from.plus(i as u32), *hash);
        }
    }

    /// Add activation ids to an epoch.
    pub fn add_epoch_atxs(&self, epoch: EpochId, atxs: &[AtxId]) {
        self.0
            .lock()
            .unwrap()
            .epoch_atxs
            .entry(epoch)
            .or_default()
            .extend_from_slice(atxs);
    }

    /// Set the ballots of a layer.
    pub fn set_layer_ballots(&self, layer: LayerId, ballots: Vec<BallotId>) {
        self.0.lock().unwrap().layer_ballots.insert(layer, ballots);
    }

    /// Mark an identity as malicious.
    pub fn add_malicious(&self, node: NodeId) {
        self.0.lock().unwrap().malicious.insert(node);
    }

    /// Set the local opinion on a layer.
    pub fn set_layer_opinion(&self, layer: LayerId, opinion: LayerOpinion) {
        self.0.lock().unwrap().opinions.insert(layer, opinion);
    }
}

impl MeshStore for MemMeshStore {
    fn layer_hash(
        &self,
        layer: LayerId,
    ) -> BoxFut<'_, MsResult<Option<ContentHash>>> {
        let out = self.0.lock().unwrap().layer_hashes.get(&layer).copied();
        Box::pin(async move { Ok(out) })
    }

    fn epoch_atxs(&self, epoch: EpochId) -> BoxFut<'_, MsResult<Vec<AtxId>>> {
        let out = self
            .0
            .lock()
            .unwrap()
            .epoch_atxs
            .get(&epoch)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(out) })
    }

    fn layer_ballots(
        &self,
        layer: LayerId,
    ) -> BoxFut<'_, MsResult<Vec<BallotId>>> {
        let out = self
            .0
            .lock()
            .unwrap()
            .layer_ballots
            .get(&layer)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(out) })
    }

    fn malicious_ids(&self) -> BoxFut<'_, MsResult<Vec<NodeId>>> {
        let mut out = self
            .0
            .lock()
            .unwrap()
            .malicious
            .iter()
            .copied()
            .collect::<Vec<_>>();
        out.sort();
        Box::pin(async move { Ok(out) })
    }

    fn layer_opinion(
        &self,
        request: OpinionRequest,
    ) -> BoxFut<'_, MsResult<Option<LayerOpinion>>> {
        let out = self
            .0
            .lock()
            .unwrap()
            .opinions
            .get(&request.layer)
            .copied()
            .filter(|opinion| match request.block {
                // asking about a specific block only yields an opinion
                // certifying that block
                Some(block) => opinion.certified == Some(block),
                None => true,
            });
        Box::pin(async move { Ok(out) })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn artifact_lookup_respects_hint() {
        let store = MemArtifactStore::create();
        let hash = store.insert(Hint::Ballot, Bytes::from_static(b"ballot"));
        assert_eq!(
            Some(Bytes::from_static(b"ballot")),
            store.lookup(Hint::Ballot, hash).await.unwrap()
        );
        assert_eq!(None, store.lookup(Hint::Block, hash).await.unwrap());
        assert_eq!(1, store.len());
    }

    #[tokio::test]
    async fn opinion_for_block() {
        let store = MemMeshStore::create();
        let opinion = LayerOpinion {
            prev_agg_hash: ContentHash([1; 32]),
            certified: Some(BlockId([2; 32])),
        };
        store.set_layer_opinion(LayerId(5), opinion);

        let req = |block| OpinionRequest {
            layer: LayerId(5),
            block,
        };
        assert_eq!(Some(opinion), store.layer_opinion(req(None)).await.unwrap());
        assert_eq!(
            Some(opinion),
            store
                .layer_opinion(req(Some(BlockId([2; 32]))))
                .await
                .unwrap()
        );
        assert_eq!(
            None,
            store
                .layer_opinion(req(Some(BlockId([3; 32]))))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn layer_hashes() {
        let store = MemMeshStore::create();
        store.set_layer_hashes(
            LayerId(10),
            &[ContentHash([1; 32]), ContentHash([2; 32])],
        );
        assert_eq!(
            Some(ContentHash([2; 32])),
            store.layer_hash(LayerId(11)).await.unwrap()
        );
        assert_eq!(None, store.layer_hash(LayerId(12)).await.unwrap());
    }
}
