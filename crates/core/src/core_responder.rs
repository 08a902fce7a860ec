//! The peer side of the fetch protocol: answer requests from the local
//! stores.

use bytes::Bytes;
use meshsync_api::{transport::*, *};
use std::sync::Arc;

/// A production-ready [Responder].
#[derive(Debug)]
pub struct CoreResponder {
    artifacts: DynArtifactStore,
    mesh: DynMeshStore,
}

impl CoreResponder {
    /// Construct a new responder answering from the given stores.
    pub fn create(artifacts: DynArtifactStore, mesh: DynMeshStore) -> DynResponder {
        let out: DynResponder = Arc::new(Self { artifacts, mesh });
        out
    }

    async fn hash_batch(&self, batch: RequestBatch) -> MsResult<Bytes> {
        let mut responses = Vec::with_capacity(batch.requests().len());
        for request in batch.requests() {
            let Some(data) =
                self.artifacts.lookup(request.hint, request.hash).await?
            else {
                continue;
            };
            match ResponseMessage::new(request.hash, data) {
                Ok(response) => responses.push(response),
                Err(err) => {
                    tracing::warn!("not serving {}: {err}", request.hash)
                }
            }
        }
        Ok(ResponseBatch::new(*batch.id(), responses)?.encode())
    }

    async fn mesh_hashes(&self, request: MeshHashRequest) -> MsResult<Bytes> {
        let mut hashes = Vec::with_capacity(request.count().unwrap_or(0));
        for layer in request.layers() {
            hashes.push(
                self.mesh
                    .layer_hash(layer)
                    .await?
                    .ok_or(MsError::MissingLocalLayer(layer))?,
            );
        }
        Ok(MeshHashes::new(hashes)?.encode())
    }

    async fn handle(&self, request: PeerRequest) -> MsResult<Bytes> {
        match request {
            PeerRequest::HashBatch(batch) => self.hash_batch(batch).await,
            PeerRequest::MeshHashes(request) => self.mesh_hashes(request).await,
            PeerRequest::EpochData(EpochRequest { epoch }) => {
                Ok(EpochData::new(self.mesh.epoch_atxs(epoch).await?)?.encode())
            }
            PeerRequest::LayerData(LayerRequest { layer }) => Ok(LayerData::new(
                self.mesh.layer_ballots(layer).await?,
            )?
            .encode()),
            PeerRequest::MaliciousIds(MaliciousIdsRequest) => {
                Ok(MaliciousIds::new(self.mesh.malicious_ids().await?)?.encode())
            }
            PeerRequest::LayerOpinion(request) => Ok(self
                .mesh
                .layer_opinion(request)
                .await?
                .ok_or_else(|| {
                    MsError::other(format!("no opinion on layer {}", request.layer))
                })?
                .encode()),
        }
    }
}

impl Responder for CoreResponder {
    fn respond(&self, peer: PeerId, data: Bytes) -> BoxFut<'_, MsResult<Bytes>> {
        Box::pin(async move {
            let request = PeerRequest::decode(data).map_err(|err| {
                tracing::debug!("rejecting request from {peer}: {err}");
                err
            })?;
            tracing::trace!("answering {request:?} from {peer}");
            self.handle(request).await.map_err(|err| {
                tracing::debug!("could not answer request from {peer}: {err}");
                err
            })
        })
    }
}
