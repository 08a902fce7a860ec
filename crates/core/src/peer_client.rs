//! Single-shot typed requests to a peer.
//!
//! Every request is wrapped in its fetch message envelope, sent through the
//! [Transport] and the response decoded with the bounded codec. Transport
//! errors and timeouts surface as [MsError::TransportFailure], responses
//! that fail to decode as [MsError::ValidationFailed] blaming the peer.

use meshsync_api::{transport::*, *};
use std::time::Duration;

/// PeerClient configuration types.
pub mod config {
    /// Configuration parameters for [PeerClient](super::PeerClient).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct PeerClientConfig {
        /// How long to wait for the answer to a request. Default: 10 s.
        pub request_timeout_ms: u32,
    }

    impl Default for PeerClientConfig {
        fn default() -> Self {
            Self {
                request_timeout_ms: 10_000,
            }
        }
    }

    impl meshsync_api::config::ModConfig for PeerClientConfig {
        const MODULE_NAME: &'static str = "peerClient";
    }
}

use config::*;

/// Typed request/response exchanges with peers.
#[derive(Debug, Clone)]
pub struct PeerClient {
    transport: DynTransport,
    timeout: Duration,
}

impl PeerClient {
    /// Construct a new client.
    pub fn new(config: &PeerClientConfig, transport: DynTransport) -> Self {
        Self::with_timeout(
            Duration::from_millis(config.request_timeout_ms as u64),
            transport,
        )
    }

    /// Construct a new client with an explicit request deadline.
    pub fn with_timeout(timeout: Duration, transport: DynTransport) -> Self {
        Self { transport, timeout }
    }

    /// Construct a new client from the module config.
    pub fn create(
        config: &meshsync_api::config::Config,
        transport: DynTransport,
    ) -> MsResult<Self> {
        let config: PeerClientConfig = config.get_module_config()?;
        Ok(Self::new(&config, transport))
    }

    /// Request a batch of artifacts by hash.
    ///
    /// A response for a different batch is a transport failure, its content
    /// cannot be attributed to the request.
    pub async fn hash_batch(
        &self,
        peer: PeerId,
        batch: RequestBatch,
    ) -> MsResult<ResponseBatch> {
        let id = *batch.id();
        let response: ResponseBatch =
            self.exchange(peer, PeerRequest::HashBatch(batch)).await?;
        if *response.id() != id {
            return Err(MsError::transport(
                peer,
                format!(
                    "response batch id {} does not match request batch id {id}",
                    response.id()
                ),
            ));
        }
        Ok(response)
    }

    /// Request sampled layer hashes.
    pub async fn mesh_hashes(
        &self,
        peer: PeerId,
        request: MeshHashRequest,
    ) -> MsResult<MeshHashes> {
        request.validate()?;
        self.exchange(peer, PeerRequest::MeshHashes(request)).await
    }

    /// Request the activation ids of an epoch.
    pub async fn epoch_data(
        &self,
        peer: PeerId,
        epoch: EpochId,
    ) -> MsResult<EpochData> {
        self.exchange(peer, PeerRequest::EpochData(EpochRequest { epoch }))
            .await
    }

    /// Request the ballot ids of a layer.
    pub async fn layer_data(
        &self,
        peer: PeerId,
        layer: LayerId,
    ) -> MsResult<LayerData> {
        self.exchange(peer, PeerRequest::LayerData(LayerRequest { layer }))
            .await
    }

    /// Request the identities the peer knows to be malicious.
    pub async fn malicious_ids(&self, peer: PeerId) -> MsResult<MaliciousIds> {
        self.exchange(peer, PeerRequest::MaliciousIds(MaliciousIdsRequest))
            .await
    }

    /// Request the peer's opinion on a layer.
    pub async fn layer_opinion(
        &self,
        peer: PeerId,
        request: OpinionRequest,
    ) -> MsResult<PeerOpinion> {
        let opinion: LayerOpinion = self
            .exchange(peer, PeerRequest::LayerOpinion(request))
            .await?;
        Ok(PeerOpinion { peer, opinion })
    }

    async fn exchange<R: WireMessage>(
        &self,
        peer: PeerId,
        request: PeerRequest,
    ) -> MsResult<R> {
        tracing::trace!("sending {request:?} to {peer}");
        let data = request.encode();
        let response =
            match tokio::time::timeout(self.timeout, self.transport.send(peer, data))
                .await
            {
                Err(_) => {
                    return Err(MsError::transport(
                        peer,
                        format!("no response within {:?}", self.timeout),
                    ))
                }
                Ok(Err(err @ MsError::TransportFailure { .. })) => {
                    return Err(err)
                }
                Ok(Err(err)) => {
                    return Err(MsError::transport_src(
                        peer,
                        "request failed",
                        err,
                    ))
                }
                Ok(Ok(response)) => response,
            };
        R::decode(response).map_err(|err| {
            tracing::debug!("invalid {} from {peer}: {err}", R::NAME);
            err.blame(&peer)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use meshsync_test_utils::id::random_peer_id;
    use std::sync::Arc;

    fn client_answering(
        answer: impl Fn(PeerRequest) -> MsResult<bytes::Bytes>
            + Send
            + Sync
            + 'static,
    ) -> PeerClient {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(move |_, data| {
            let out = PeerRequest::decode(data).and_then(&answer);
            Box::pin(async move { out })
        });
        PeerClient::with_timeout(Duration::from_secs(1), Arc::new(transport))
    }

    #[tokio::test]
    async fn layer_opinion_attaches_peer() {
        let opinion = LayerOpinion {
            prev_agg_hash: ContentHash([1; 32]),
            certified: None,
        };
        let client = client_answering(move |request| match request {
            PeerRequest::LayerOpinion(r) => {
                assert_eq!(LayerId(9), r.layer);
                Ok(opinion.encode())
            }
            oth => panic!("unexpected request {oth:?}"),
        });
        let peer = random_peer_id();
        let res = client
            .layer_opinion(
                peer,
                OpinionRequest {
                    layer: LayerId(9),
                    block: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(PeerOpinion { peer, opinion }, res);
    }

    #[tokio::test]
    async fn invalid_response_blames_peer() {
        let client = client_answering(|_| {
            let too_many = (0..=MAX_LAYER_BALLOTS)
                .map(|_| ContentHash([2; 32]).to_bytes())
                .collect();
            Ok(prost::Message::encode_to_vec(&proto::LayerData {
                ballots: too_many,
            })
            .into())
        });
        let peer = random_peer_id();
        match client.layer_data(peer, LayerId(3)).await {
            Err(MsError::ValidationFailed {
                peer: p,
                violation: Violation::ExceedsBound { field: "ballots", .. },
            }) => assert_eq!(peer, p),
            oth => panic!("unexpected {oth:?}"),
        }
    }

    #[tokio::test]
    async fn mismatched_batch_id_is_transport_failure() {
        let client = client_answering(|_| {
            Ok(ResponseBatch::new(ContentHash([9; 32]), vec![])
                .unwrap()
                .encode())
        });
        let batch = RequestBatch::new(vec![RequestMessage {
            hint: Hint::Tx,
            hash: ContentHash([1; 32]),
        }])
        .unwrap();
        assert!(matches!(
            client.hash_batch(random_peer_id(), batch).await,
            Err(MsError::TransportFailure { .. })
        ));
    }

    #[tokio::test]
    async fn transport_error_is_transport_failure() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|_, _| {
            Box::pin(async { Err(MsError::other("connection reset")) })
        });
        let client =
            PeerClient::with_timeout(Duration::from_secs(1), Arc::new(transport));
        let peer = random_peer_id();
        match client.malicious_ids(peer).await {
            Err(MsError::TransportFailure { peer: p, .. }) => {
                assert_eq!(peer, p)
            }
            oth => panic!("unexpected {oth:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_transport_failure() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|_, _| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(bytes::Bytes::new())
            })
        });
        let client = PeerClient::new(
            &PeerClientConfig::default(),
            Arc::new(transport),
        );
        assert!(matches!(
            client.epoch_data(random_peer_id(), EpochId(1)).await,
            Err(MsError::TransportFailure { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_mesh_hash_request_is_not_sent() {
        let client = client_answering(|_| panic!("must not be sent"));
        let request = MeshHashRequest {
            from: LayerId(10),
            to: LayerId(1),
            step: 1,
        };
        assert!(matches!(
            client.mesh_hashes(random_peer_id(), request).await,
            Err(MsError::BadRequest(_))
        ));
    }
}
